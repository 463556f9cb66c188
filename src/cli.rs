//! CLI surface.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::config::compile_path;
use crate::core::Mode;
use crate::daemon::run_server;

#[derive(Parser, Debug)]
#[command(
    name = "trualias",
    version,
    about = "Postfix TCP-table service resolving verified aliases",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, global = true, value_name = "FILE", default_value = "trualias.conf")]
    pub config: PathBuf,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve aliases(5)-style lookups: bare local part in, account out.
    Table,
    /// Serve virtual(5)-style lookups: local@domain in, account@domain out.
    #[command(name = "virtual")]
    Virtual,
    /// Compile the configuration and report diagnostics.
    Check,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

pub fn run(cli: Cli) -> crate::Result<()> {
    match cli.command {
        Commands::Check => {
            let set = compile_path(&cli.config)?;
            println!(
                "OK: {} specification{}",
                set.specs.len(),
                if set.specs.len() == 1 { "" } else { "s" }
            );
            Ok(())
        }
        Commands::Table => run_server(cli.config, Mode::Account),
        Commands::Virtual => run_server(cli.config, Mode::Virtual),
    }
}
