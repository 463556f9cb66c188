//! Compiled configuration: global options plus the specification set.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::core::AliasSpec;

/// Log verbosity names accepted by the `LOGGING` config item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<LogLevel> {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "critical" => Some(LogLevel::Critical),
            _ => None,
        }
    }

    /// Directive for a tracing `EnvFilter`. `critical` maps onto `error`,
    /// the strictest level tracing knows.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

/// Global options, config statements other than alias specifications.
#[derive(Debug, Clone, Serialize)]
pub struct Options {
    pub case_sensitive: bool,
    pub host: IpAddr,
    pub port: u16,
    pub log_level: LogLevel,
    pub debug_account: Option<String>,
    /// Domains eligible for virtual-form resolution, lower-cased. Empty in
    /// account-form deployments.
    pub alias_domains: BTreeSet<String>,
    /// Cadence of periodic statistics reports; `None` disables them.
    pub statistics: Option<Duration>,
    /// Pre/post-processing hook selector, consumed by the daemon.
    pub processor: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            case_sensitive: false,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3047,
            log_level: LogLevel::Warning,
            debug_account: None,
            alias_domains: BTreeSet::new(),
            statistics: Some(Duration::from_secs(60)),
            processor: None,
        }
    }
}

/// An immutable bundle of options and compiled specifications.
///
/// Built in one shot by `config::compile`; queries share it by `Arc` and a
/// reload replaces the whole snapshot or nothing.
#[derive(Debug)]
pub struct ConfigurationSet {
    pub options: Options,
    pub specs: Vec<AliasSpec>,
}

/// Process-wide handle to the current configuration snapshot.
///
/// Readers clone the inner `Arc` and never hold the lock while resolving, so
/// a query in flight during a reload keeps its snapshot.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<ConfigurationSet>>>,
}

impl SharedConfig {
    pub fn new(set: ConfigurationSet) -> SharedConfig {
        SharedConfig {
            inner: Arc::new(RwLock::new(Arc::new(set))),
        }
    }

    pub fn current(&self) -> Arc<ConfigurationSet> {
        Arc::clone(&self.inner.read().expect("configuration lock poisoned"))
    }

    pub fn install(&self, set: ConfigurationSet) {
        *self.inner.write().expect("configuration lock poisoned") = Arc::new(set);
    }
}
