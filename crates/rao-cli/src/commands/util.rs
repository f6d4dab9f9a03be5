use anyhow::{anyhow, Result};
use rao_algo::LinearSolver;
use std::io::Write;
use tabwriter::TabWriter;

/// Thread count from "auto" or a positive integer.
pub fn parse_threads(spec: &str) -> Result<usize> {
    if spec.eq_ignore_ascii_case("auto") {
        return Ok(num_cpus::get());
    }
    match spec.parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(anyhow!("invalid thread count '{}', expected 'auto' or a positive integer", spec)),
    }
}

pub fn build_solver() -> Result<Box<dyn LinearSolver>> {
    #[cfg(feature = "solver-clarabel")]
    {
        Ok(Box::new(rao_algo::ClarabelSolver::new()))
    }
    #[cfg(not(feature = "solver-clarabel"))]
    {
        Err(anyhow!("no LP solver compiled in, enable the solver-clarabel feature"))
    }
}

/// Renders tab-separated rows as an aligned table.
pub fn render_table(header: &str, rows: &[String]) -> Result<String> {
    let mut writer = TabWriter::new(Vec::new()).padding(2);
    writeln!(writer, "{}", header)?;
    for row in rows {
        writeln!(writer, "{}", row)?;
    }
    writer.flush()?;
    Ok(String::from_utf8(writer.into_inner()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threads() {
        assert_eq!(parse_threads("3").unwrap(), 3);
        assert!(parse_threads("AUTO").unwrap() >= 1);
        assert!(parse_threads("0").is_err());
        assert!(parse_threads("many").is_err());
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let table = render_table("a\tb", &["long-value\tx".to_string()]).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].find('b'), lines[1].find('x'));
    }
}
