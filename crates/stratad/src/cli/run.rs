use camino::Utf8Path;
use clap::Parser;
use eyre::{bail, Result as EyreResult, WrapErr};
use strata_config::ConfigFile;
use strata_node::Node;
use tracing::info;

/// Runs the node until interrupted.
#[derive(Debug, Parser)]
pub struct RunCommand {}

impl RunCommand {
    pub async fn run(self, home: &Utf8Path) -> EyreResult<()> {
        if !ConfigFile::exists(home) {
            bail!("{home} is not initialized (run `stratad init` first)");
        }

        let config = ConfigFile::load(home)?;
        let node = Node::start(config)
            .await
            .wrap_err("node failed to start")?;

        tokio::signal::ctrl_c()
            .await
            .wrap_err("failed to listen for shutdown signal")?;
        info!("interrupt received");

        node.shutdown().await;
        Ok(())
    }
}
