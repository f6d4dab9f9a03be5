pub mod case;
pub mod cli;

pub use case::CaseFile;
pub use cli::{Cli, Commands};
