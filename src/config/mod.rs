//! Configuration parsing, the compiled set, and reload machinery.

mod parser;
mod schema;
pub mod watch;

pub use parser::{compile, compile_path};
pub use schema::{ConfigurationSet, LogLevel, Options, SharedConfig};
