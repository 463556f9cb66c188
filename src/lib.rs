#![forbid(unsafe_code)]

//! Trualias: a Postfix TCP-table service answering verified-alias lookups.
//!
//! An alias specification pairs a match pattern with a calculation; a lookup
//! is accepted only when the code embedded in the address equals the value
//! recomputed from the matched identifier fields. The crate splits into the
//! pure resolution core (`core`), configuration compilation and reload
//! (`config`), and the socket service (`daemon`).

pub mod cli;
pub mod config;
pub mod core;
pub mod daemon;
pub mod error;
pub mod telemetry;

pub use error::{Diagnostic, DiagnosticKind, DiagnosticList, Error};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the main entry points at the crate root.
pub use crate::config::{ConfigurationSet, Options, SharedConfig, compile, compile_path};
pub use crate::core::{AliasSpec, Aliases, CharClass, Mode, Resolved, resolve};
