use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rao_algo::{JsonSink, Rao, RaoParameters, ResultSink, TracingSink};
use rao_cli::CaseFile;
use tracing::info;

use crate::commands::util::{build_solver, parse_threads, render_table};

pub fn handle(
    case: &Path,
    params: Option<&PathBuf>,
    out: Option<&PathBuf>,
    threads: Option<&str>,
) -> Result<()> {
    let case = CaseFile::load(case)?;
    let mut params = match params {
        Some(path) => RaoParameters::load(path)
            .with_context(|| format!("loading parameters '{}'", path.display()))?,
        None => RaoParameters::default(),
    };
    if let Some(spec) = threads {
        let count = parse_threads(spec)?;
        params.multithreading.preventive_leaves_in_parallel = count;
        params.multithreading.curative_leaves_in_parallel = count;
    }
    let solver = build_solver()?;
    info!(
        "running optimization on '{}' with {} solver",
        case.network.name,
        solver.name()
    );

    let mut sink = JsonSink::new();
    let outcome = Rao::new(&case.catalog, &params, &case.model, solver.as_ref())
        .run(case.network.clone(), &mut sink)
        .context("running optimization")?;

    let mut tracing_sink = TracingSink;
    for report in sink.reports() {
        tracing_sink.report(report)?;
    }

    let rows: Vec<String> = sink
        .reports()
        .iter()
        .map(|r| {
            let cost = r
                .final_cost
                .as_ref()
                .map_or_else(|| "-".to_string(), |c| format!("{:.2}", c.total));
            format!(
                "{}\t{:?}\t{}\t{}\t{}",
                r.perimeter,
                r.status,
                if r.secure { "yes" } else { "no" },
                cost,
                r.discrete_actions.join(",")
            )
        })
        .collect();
    print!(
        "{}",
        render_table("Perimeter\tStatus\tSecure\tCost\tActions", &rows)?
    );
    println!(
        "Overall: {}",
        if outcome.is_secure() { "secure" } else { "unsecure" }
    );

    if let Some(out) = out {
        sink.write(out)
            .with_context(|| format!("writing results to '{}'", out.display()))?;
        info!("results written to {}", out.display());
    }
    Ok(())
}
