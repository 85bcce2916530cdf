use anyhow::{Context, Result};
use clap::Parser;
use spread_client::Connection;
use tracing::info;

mod cli;
mod demo;

use cli::{Cli, Command};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let options = cli.daemon.connect_options();
    let connection = tokio::task::spawn_blocking(move || Connection::open(&options))
        .await?
        .with_context(|| format!("failed to connect to {}", cli.daemon.host))?;

    if let Some(mailbox) = connection.local_mailbox() {
        info!("connected as {mailbox}");
    }

    match cli.command {
        Command::User(args) => demo::user::run(connection, args).await?,
        Command::Flood(args) => {
            tokio::task::spawn_blocking(move || demo::flood::run(&connection, &args)).await??
        }
        Command::Listen(args) => {
            tokio::task::spawn_blocking(move || demo::listen::run(&connection, &args)).await??
        }
    }

    Ok(())
}
