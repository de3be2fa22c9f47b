mod configuration;
mod errors;
mod events;
mod projections;
mod projector_ctx;
mod prometheus;
mod register;
mod storages;

use clap::{crate_name, App, Arg};
use configuration::*;
use env_logger::Env;
use register::*;

use anyhow::Result;
use log::info;
use tokio::signal;
use tokio::signal::unix::{signal, SignalKind};

use crate::projector_ctx::BidsProjectingCtx;
use crate::storages::history_storage::connect_history_storage;
use crate::storages::migrations::{Migrations, SCRIPTS_UP};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new(crate_name!())
        .arg(
            Arg::with_name("config-file")
                .short('c')
                .long("config-file")
                .takes_value(true)
                .default_value("./Config.toml")
                .help("The name of the configuration file"),
        )
        .get_matches();

    let register = Register::new(Configuration::new(
        matches.value_of("config-file").unwrap_or_default(),
    )?);

    info!("Starting bid_projector");

    // Run migrations. The pool is dropped right after that and connections are closed.
    {
        let pool = connect_history_storage(register.config.get_history_storage_config()).await?;

        let migrations = Migrations::new();
        migrations.up(&pool, &SCRIPTS_UP).await?;
    }

    let ctx = BidsProjectingCtx::setup_and_run(&register).await?;

    wait_termination().await;

    info!("Shutting down bid_projector");
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
