//! Configuration file watcher.
//!
//! Polls the configuration file's mtime and recompiles on change. A failed
//! compile logs its diagnostics and keeps the installed set; queries in
//! flight keep whatever snapshot they already hold. Host/port changes need a
//! restart and are only reported.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crossbeam::channel::{Receiver, never, tick};

use crate::config::parser::compile_path;
use crate::config::schema::SharedConfig;
use crate::daemon::stats::StatsRegistry;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Run the watcher loop until `shutdown` is signalled. Also emits periodic
/// statistics reports when the installed configuration asks for them.
pub fn run_watcher(
    path: PathBuf,
    shared: SharedConfig,
    stats: StatsRegistry,
    shutdown: Receiver<()>,
) {
    let mut last_mtime = mtime(&path);
    let poll = tick(POLL_INTERVAL);
    let report = match shared.current().options.statistics {
        Some(cadence) => tick(cadence),
        None => never(),
    };

    loop {
        crossbeam::select! {
            recv(shutdown) -> _ => return,
            recv(report) -> _ => {
                tracing::info!(target: "stats", "{}", stats.render_text());
            }
            recv(poll) -> _ => {
                let current = mtime(&path);
                if current <= last_mtime {
                    continue;
                }
                last_mtime = current;
                reload(&path, &shared);
            }
        }
    }
}

fn reload(path: &std::path::Path, shared: &SharedConfig) {
    tracing::info!(path = %path.display(), "reloading configuration");
    match compile_path(path) {
        Ok(set) => {
            let old = shared.current();
            if old.options.host != set.options.host || old.options.port != set.options.port {
                tracing::warn!("HOST/PORT changed; restart the service to apply them");
            }
            tracing::info!(specs = set.specs.len(), "configuration installed");
            shared.install(set);
        }
        Err(e) => {
            tracing::error!("unable to reload configuration, keeping the old one: {e}");
        }
    }
}

fn mtime(path: &std::path::Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::compile;
    use crate::core::{Mode, resolve};
    use std::io::Write;

    #[test]
    fn reload_swaps_on_success_and_keeps_old_set_on_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trualias.conf");
        std::fs::write(
            &path,
            "ACCOUNT foo MATCHES %account%-%ident%-%code% WITH CHAR(1,-), CHARS();\n",
        )
        .expect("write config");

        let shared = SharedConfig::new(compile("").unwrap());
        assert_eq!(
            resolve(&shared.current(), Mode::Account, "foo-macys-m5"),
            crate::core::Resolved::NotFound
        );

        reload(&path, &shared);
        assert!(matches!(
            resolve(&shared.current(), Mode::Account, "foo-macys-m5"),
            crate::core::Resolved::Match { .. }
        ));

        // Break the file: the installed set must survive.
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open config");
        writeln!(f, "ACCOUNT bad MATCHES %ident%%ident%-%code% WITH CHARS(1);").expect("append");
        reload(&path, &shared);
        assert!(matches!(
            resolve(&shared.current(), Mode::Account, "foo-macys-m5"),
            crate::core::Resolved::Match { .. }
        ));
    }
}
