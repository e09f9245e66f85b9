mod app;
mod config;
mod item;
mod profile;
mod protocol;
mod search;
mod server;
mod state;
mod tui;
mod ui;

use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing()?;

    let config = config::Config::parse();
    let app = app::NetpaneApp::bootstrap(config).await?;
    app.run().await
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("netpane=info,netpane::state=debug"))?;

    // stdout belongs to the terminal UI.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| eyre!(err))?;

    Ok(())
}
