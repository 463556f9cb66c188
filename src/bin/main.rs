use trualias::{Error, cli, config, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    // The base log level lives in the configuration; fall back to defaults
    // when it does not load so the failure itself is reported.
    let level = config::compile_path(&cli.config)
        .map(|set| set.options.log_level)
        .unwrap_or(config::LogLevel::Warning);
    telemetry::init(level, cli.verbose);

    if let Err(e) = cli::run(cli) {
        eprintln!("error: {e}");
        let code = match e {
            Error::Config(_) | Error::Io { .. } | Error::UnknownProcessor(_) => 2,
            Error::Bind { .. } => 3,
            _ => 1,
        };
        std::process::exit(code);
    }
}
