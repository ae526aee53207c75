use clap::Parser;
use ipvlan_cni::command::SystemRunner;
use ipvlan_cni_agent::imds::{ImdsClient, ImdsSource};
use ipvlan_cni_agent::{Result, apply, config::Cli};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup_subscriber();
    let cli = Cli::parse();

    let client = ImdsClient::new(&cli.imds_endpoint, cli.imds_api_version.as_str(), cli.imds_timeout())?;
    let mut source = ImdsSource::fetch(&client, cli.address_version).await?;
    match apply::apply(&cli, &mut source, SystemRunner).await {
        Ok(path) => {
            info!(path = %path.display(), "ipvlan setup completed");
            Ok(())
        }
        Err(e) => {
            error!("ipvlan setup failed: {e}");
            Err(e)
        }
    }
}

fn setup_subscriber() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ipvlan_cni_agent=info,ipvlan_cni=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
