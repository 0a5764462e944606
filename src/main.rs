use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use file_courier::client;
use file_courier::server::Server;

mod cli;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(cli::Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: cli::Args) -> anyhow::Result<()> {
    match args.command {
        cli::Commands::Serve { port, root } => {
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            Server::bind(addr, root)?.run()
        }
        cli::Commands::Put { address, file } => client::put(&address, &file),
        cli::Commands::Get { address, file, dest } => client::get(&address, &file, &dest),
    }
}
