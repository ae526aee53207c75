use clap::Parser;
use ipvlan_cni_orchestrator::azure::AzureCli;
use ipvlan_cni_orchestrator::config::Cli;
use ipvlan_cni_orchestrator::run::run;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    setup_subscriber();
    let cli = Cli::parse();

    let az = AzureCli::new(&cli.az);
    run(&cli, &az).await?;
    Ok(())
}

fn setup_subscriber() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ipvlan_cni_orchestrator=info,ipvlan_cni=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
