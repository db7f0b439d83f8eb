//! CLI command implementations
//!
//! All command logic lives in [`handlers`], extracted from main.rs for
//! testability; this module owns the dispatch.

// CLI glue code - relaxed lint requirements
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]

use crate::error::Result;

pub mod handlers;
pub use handlers::{Cli, Commands, RunMatrixArgs, RunSingleArgs, VisualizeArgs};

/// Main CLI entrypoint - dispatches commands to handlers
pub fn entrypoint(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::RunSingle(args) => handlers::handle_run_single(args),
        Commands::RunMatrix(args) => handlers::handle_run_matrix(args),
        Commands::Visualize(args) => handlers::handle_visualize(args),
    }
}
