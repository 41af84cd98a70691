//! CLI command handling

pub mod app;
pub mod output;
pub mod run;

pub use app::{build_notifier, App};
pub use output::*;
pub use run::*;
