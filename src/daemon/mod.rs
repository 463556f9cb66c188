//! The TCP-table service: socket handling, statistics, runner.

pub mod run;
pub mod server;
pub mod stats;

pub use run::{run_server, serve};
pub use server::{Identity, MAX_LINE, Preprocessor, handle_client, processor_for};
pub use stats::{BUCKET_NAMES, StatsRegistry, Timer};
