//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`init`], or [`validate`]. Each handler
//! lives in its own submodule.

pub mod init;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::DirectorError;

pub async fn dispatch(cli: Cli) -> Result<(), DirectorError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(args).await,
        Some(Commands::Init(ref args)) => init::execute(args),
        Some(Commands::Validate(ref args)) => validate::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  director v{version}: primary forwarding with secondary replay\n\n  \
         No command provided. To get started:\n\n    \
         director init                  Generate a starter config\n    \
         director run                   Start (auto-detects ./director.yaml)\n    \
         director run -c FILE           Start with a specific config file\n    \
         director --help                See all commands and options\n"
    );
}
