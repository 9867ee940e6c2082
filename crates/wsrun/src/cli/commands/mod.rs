//! CLI commands

mod batch;
mod plan;
mod run;

pub use plan::PlanCommand;
pub use run::RunCommand;
