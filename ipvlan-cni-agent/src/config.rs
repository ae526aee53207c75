use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ipvlan_cni::CNI_CONF_DIR;
use ipvlan_cni::types::AddressFamily;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Configure ipvlan address blocks on this node", long_about = None)]
pub struct Cli {
    /// Address family of the delegated blocks
    #[arg(long, value_enum, default_value_t = AddressFamily::Ipv4)]
    pub address_version: AddressFamily,

    /// Interface the blocks are assigned to and the ipvlan master
    #[arg(long, default_value = "eth0")]
    pub interface: String,

    /// Name of the CNI network
    #[arg(long, default_value = "ipvlan-eth0")]
    pub cni_name: String,

    /// CNI configuration directory
    #[arg(long, env = "CNI_CONF_DIR", default_value = CNI_CONF_DIR)]
    pub cni_conf_dir: PathBuf,

    /// Instance metadata service endpoint
    #[arg(long, default_value = "http://169.254.169.254")]
    pub imds_endpoint: String,

    #[arg(long, default_value = "2025-04-07")]
    pub imds_api_version: String,

    /// Timeout for the metadata request in seconds
    #[arg(long, default_value_t = 10)]
    pub imds_timeout_secs: u64,
}

impl Cli {
    pub fn imds_timeout(&self) -> Duration {
        Duration::from_secs(self.imds_timeout_secs)
    }
}
