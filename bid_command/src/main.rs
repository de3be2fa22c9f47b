mod actors;
mod application;
mod bidding_ctx;
mod configuration;
mod domain;
mod errors;
mod http;
mod register;
mod storages;

use clap::Parser;
use configuration::*;
use env_logger::Env;
use register::*;

use anyhow::Result;
use log::info;
use tokio::signal;
use tokio::signal::unix::{signal, SignalKind};

use crate::bidding_ctx::BiddingCtx;
use crate::storages::bid_repository::connect_bid_storage;
use crate::storages::migrations::{Migrations, SCRIPTS_UP};

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

    info!("Starting bid_command");

    let register = Register::new(Configuration::new(&Args::parse().config)?);

    // Run migrations. The pool is dropped right after that and connections are closed.
    {
        let pool = connect_bid_storage(register.config.get_bid_storage_config()).await?;

        let migrations = Migrations::new();
        migrations.up(&pool, &SCRIPTS_UP).await?;
    }

    let ctx = BiddingCtx::setup_and_run(&register).await?;

    wait_termination().await;

    info!("Shutting down bid_command");
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
