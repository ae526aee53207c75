use std::path::PathBuf;

use clap::{ArgAction, Parser};
use ipvlan_cni::types::AddressFamily;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Sync ipvlan IP configurations for cluster nodes", long_about = None)]
pub struct Cli {
    /// Resource group of the cluster
    #[arg(long)]
    pub resource_group: String,

    /// Name of the managed cluster
    #[arg(long)]
    pub cluster_name: String,

    /// Address family of the delegated blocks
    #[arg(long, value_enum, default_value_t = AddressFamily::Ipv4)]
    pub address_version: AddressFamily,

    /// Number of ipvlan IP configurations every NIC should carry
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub ipvlan_config_count: u16,

    /// Push the generated CNI config and host rules to each node
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub bootstrap_cni_config: bool,

    /// Prefix length of each delegated block, defaults to 28 for IPv4 and 80 for IPv6
    #[arg(long)]
    pub ipvlan_prefix_length: Option<u8>,

    /// Interface on the node used as the ipvlan master
    #[arg(long, default_value = "eth1")]
    pub interface: String,

    /// Name of the CNI network written to the node
    #[arg(long, default_value = "ipvlan-eth1")]
    pub cni_name: String,

    /// Only process NICs whose name ends with this suffix
    #[arg(long)]
    pub nic_name_suffix: Option<String>,

    /// Path to the az cli
    #[arg(long, default_value = "az")]
    pub az: PathBuf,
}

impl Cli {
    pub fn prefix_len(&self) -> u8 {
        self.ipvlan_prefix_length
            .unwrap_or(self.address_version.delegated_prefix_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        let base = ["ipvlan-orchestrator", "--resource-group", "rg", "--cluster-name", "aks"];
        Cli::try_parse_from(base.iter().chain(args.iter()).copied())
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.address_version, AddressFamily::Ipv4);
        assert_eq!(cli.ipvlan_config_count, 1);
        assert!(!cli.bootstrap_cni_config);
        assert_eq!(cli.prefix_len(), 28);
        assert_eq!(cli.interface, "eth1");
    }

    #[test]
    fn explicit_values() {
        let cli = parse(&[
            "--address-version",
            "IPv6",
            "--ipvlan-config-count",
            "3",
            "--bootstrap-cni-config",
            "true",
        ])
        .unwrap();
        assert_eq!(cli.address_version, AddressFamily::Ipv6);
        assert_eq!(cli.ipvlan_config_count, 3);
        assert!(cli.bootstrap_cni_config);
        assert_eq!(cli.prefix_len(), 80);
    }

    #[test]
    fn rejects_zero_configs() {
        assert!(parse(&["--ipvlan-config-count", "0"]).is_err());
        assert!(parse(&["--address-version", "ipv4"]).is_err());
    }
}
