use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use eyre::Result as EyreResult;

use crate::defaults;

mod init;
mod run;

use init::InitCommand;
use run::RunCommand;

/// The strata plane daemon.
#[derive(Debug, Parser)]
#[command(name = "stratad", version, about)]
pub struct RootCommand {
    /// Directory holding config.toml and the data directory.
    #[arg(long, global = true, default_value_t = defaults::default_home())]
    pub home: Utf8PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Init(InitCommand),
    Run(RunCommand),
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.command {
            Command::Init(command) => command.run(&self.home),
            Command::Run(command) => command.run(&self.home).await,
        }
    }
}
