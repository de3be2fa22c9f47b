mod application;
mod configuration;
mod cursor;
mod errors;
mod http;
mod prometheus;
mod register;
mod server_ctx;
mod storages;

use clap::Parser;
use configuration::*;
use env_logger::Env;
use register::*;

use anyhow::Result;
use log::info;
use tokio::signal;
use tokio::signal::unix::{signal, SignalKind};

use crate::server_ctx::QueryServingCtx;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Config file
    #[clap(short, long, default_value = "./Config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Starting bid_query");

    let register = Register::new(Configuration::new(&Args::parse().config)?);

    let ctx = QueryServingCtx::setup_and_run(&register).await?;

    wait_termination().await;

    info!("Shutting down bid_query");
    ctx.shutdown().await;
    Ok(())
}

async fn wait_termination() {
    let mut term = signal(SignalKind::terminate()).unwrap();
    let mut inter = signal(SignalKind::interrupt()).unwrap();

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Ctrl-C pressed");
        },
        _ = term.recv() => {
            info!("terminate signal received");
        },
        _ = inter.recv() => {
            info!("interrupt signal received");
        },
    }
}
