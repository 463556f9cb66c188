//! Service runner.
//!
//! Binds the listener, wires up the configuration watcher and signal
//! handling, and accepts connections until shutdown. This never returns on
//! success until SIGINT/SIGTERM.

use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::{SharedConfig, compile_path, watch};
use crate::core::Mode;
use crate::daemon::server::{Preprocessor, handle_client, processor_for};
use crate::daemon::stats::StatsRegistry;

pub fn run_server(config_path: PathBuf, mode: Mode) -> crate::Result<()> {
    let set = compile_path(&config_path)?;
    let options = set.options.clone();
    let processor = processor_for(options.processor.as_deref())?;

    let addr = SocketAddr::new(options.host, options.port);
    let listener =
        TcpListener::bind(addr).map_err(|source| crate::Error::Bind { addr, source })?;
    tracing::info!(%addr, ?mode, "serving");

    let shared = SharedConfig::new(set);
    let stats = StatsRegistry::new();

    let shutdown = Arc::new(AtomicBool::new(false));
    let _ = signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown));
    let _ = signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown));

    let (watch_tx, watch_rx) = crossbeam::channel::bounded::<()>(1);
    let watcher = std::thread::spawn({
        let shared = shared.clone();
        let stats = stats.clone();
        move || watch::run_watcher(config_path, shared, stats, watch_rx)
    });

    serve(listener, shared, stats, mode, processor, shutdown)
        .map_err(|source| crate::Error::Bind { addr, source })?;

    let _ = watch_tx.send(());
    let _ = watcher.join();
    tracing::info!("shutdown complete");
    Ok(())
}

/// Accept loop. Public so tests can drive a bound listener directly.
pub fn serve(
    listener: TcpListener,
    shared: SharedConfig,
    stats: StatsRegistry,
    mode: Mode,
    processor: Arc<dyn Preprocessor>,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<()> {
    listener.set_nonblocking(true)?;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown signal received");
            return Ok(());
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let shared = shared.clone();
                let stats = stats.clone();
                let processor = Arc::clone(&processor);
                std::thread::spawn(move || {
                    let _ = stream.set_nonblocking(false);
                    handle_client(stream, shared, stats, mode, processor);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                tracing::error!("accept error: {e}");
            }
        }
    }
}
