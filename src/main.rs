use clap::Parser;
use rand::RngCore;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use voice_control_plane::{api, config, db, sweeper};

mod cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::GenSecret => {
            let mut buf = [0u8; 32];
            rand::rng().fill_bytes(&mut buf);
            println!("{}", hex::encode(buf));
            Ok(())
        }
        cli::Command::Serve { host, port } => {
            let config = std::sync::Arc::new(config::Config::from_env()?);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(api::serve(&host, port, config))
        }
        cli::Command::Sweep => {
            let config = config::Config::from_env()?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async move {
                let db_path = config.data_dir.join("voice-control-plane.db");
                let db = db::open(&db_path)?;
                let sweeper = sweeper::AttestationSweeper::new(
                    db,
                    config.oracle_private_key.clone(),
                    Box::new(sweeper::NoopSettlementSubmitter),
                );
                let attested = sweeper.sweep().await?;
                tracing::info!(attested, "sweep complete");
                Ok(())
            })
        }
    }
}
