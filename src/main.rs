//! replica-transfer: upload or download one file and exit

use clap::Parser;
use tracing::{error, info};

use replica_transfer::cli::{Cli, Intent, Invocation};
use replica_transfer::{Config, Orchestrator, OrchestratorError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("replica_transfer=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let invocation = match Cli::parse().validate() {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match run(invocation).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(step = ?e.step(), "{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(invocation: Invocation) -> Result<String, OrchestratorError> {
    let mut config = Config::load(&invocation.config_path)?;

    // Apply CLI overrides
    if let Some(replicas) = invocation.replicas {
        match &invocation.intent {
            Intent::Upload { .. } => config.transfer.upload_replicas = replicas,
            Intent::Download { .. } => config.transfer.download_replicas = replicas,
        }
    }
    if let Some(secs) = invocation.timeout_secs {
        config.transfer.upload_timeout_secs = secs;
        config.transfer.download_timeout_secs = secs;
    }

    info!(tier = ?invocation.tier, chain = %config.chain.rpc_url, "Connecting");
    let orchestrator =
        Orchestrator::connect(&config, &invocation.credential, invocation.tier).await?;

    let result = match &invocation.intent {
        Intent::Upload { path } => orchestrator.upload_default(path).await.map(|record| {
            format!(
                "Upload successful!\nTx hash: {}\nRoot hash: {}",
                record.transaction_ref, record.content_root
            )
        }),
        Intent::Download { root, output } => orchestrator
            .download_default(root, output)
            .await
            .map(|path| format!("Download successful! File saved to: {}", path.display())),
    };

    orchestrator.close().await;
    result
}
