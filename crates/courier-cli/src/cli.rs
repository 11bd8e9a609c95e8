//! Command-line interface definitions and parsing

use clap::error::ErrorKind;
use clap::Parser;

/// Send a text message through the courier messenger
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
pub struct Cli {
    /// The target address [amqp[s]://domain[/name]]
    #[arg(short, long, default_value = "amqp://0.0.0.0")]
    pub address: String,

    /// A text string to send
    #[arg(default_value = "Hello World!")]
    pub message: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse arguments. Usage errors go to stderr and exit with code 1;
    /// help and version print and exit 0.
    pub fn parse_or_die() -> Self {
        match Self::try_parse() {
            Ok(cli) => cli,
            Err(err) => {
                let fatal = !matches!(
                    err.kind(),
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
                );
                let _ = err.print();
                std::process::exit(if fatal { 1 } else { 0 });
            }
        }
    }
}
