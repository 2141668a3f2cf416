//! CLI command implementations

pub mod datasets;
pub mod error;
pub mod sync;

pub use datasets::DatasetsCommand;
pub use error::CliError;
pub use sync::{Cli, Commands, SyncArgs};
