use std::path::Path;

use anyhow::Result;
use rao_algo::StateTree;
use rao_cli::CaseFile;
use rao_core::StateId;

use crate::commands::util::render_table;

pub fn handle(case: &Path) -> Result<()> {
    let case = CaseFile::load(case)?;
    let tree = StateTree::new(&case.catalog, &StateId::preventive())?;

    let rows: Vec<String> = std::iter::once(tree.preventive_perimeter())
        .chain(tree.curative_perimeters())
        .map(|p| {
            let states: Vec<String> = p.states.iter().map(|s| s.to_string()).collect();
            format!("{}\t{}", p.optimized_state, states.join(", "))
        })
        .collect();
    print!("{}", render_table("Perimeter\tStates", &rows)?);

    let operators: Vec<&str> = tree
        .operators_not_sharing_cras()
        .iter()
        .map(|o| o.as_str())
        .collect();
    if operators.is_empty() {
        println!("Every operator has curative remedial actions");
    } else {
        println!("Operators without curative remedial actions: {}", operators.join(", "));
    }
    Ok(())
}
