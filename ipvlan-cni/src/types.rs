use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use clap::ValueEnum;
use ipnetwork::IpNetwork;

use crate::{Error, Result};

/// Name prefix shared by every secondary IP configuration this tool owns.
pub const IPVLAN_CONFIG_PREFIX: &str = "ipvlan";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum AddressFamily {
    #[default]
    #[value(name = "IPv4")]
    Ipv4,
    #[value(name = "IPv6")]
    Ipv6,
}

impl AddressFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "IPv4",
            AddressFamily::Ipv6 => "IPv6",
        }
    }

    /// Route handed to pods through the host-local IPAM.
    pub fn default_route(&self) -> IpNetwork {
        let unspecified = match self {
            AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        // a zero prefix is valid for both families
        IpNetwork::new(unspecified, 0).unwrap_or(IpNetwork::from(unspecified))
    }

    pub fn iptables(&self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "iptables",
            AddressFamily::Ipv6 => "ip6tables",
        }
    }

    /// Prefix length requested for each delegated block.
    pub fn delegated_prefix_len(&self) -> u8 {
        match self {
            AddressFamily::Ipv4 => 28,
            AddressFamily::Ipv6 => 80,
        }
    }

    pub fn max_prefix_len(&self) -> u8 {
        match self {
            AddressFamily::Ipv4 => 32,
            AddressFamily::Ipv6 => 128,
        }
    }

    pub fn contains(&self, network: &IpNetwork) -> bool {
        match self {
            AddressFamily::Ipv4 => network.is_ipv4(),
            AddressFamily::Ipv6 => network.is_ipv6(),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One IP configuration on a NIC as discovered or provisioned.
///
/// `ip` carries the delegated prefix when the control plane reports one
/// (`10.0.0.16/28`); a bare address parses as a host route.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpConfigView {
    pub name: String,
    pub primary: bool,
    pub ip: Option<IpNetwork>,
    pub subnet_id: String,
    pub subnet_prefix: Option<IpNetwork>,
}

impl IpConfigView {
    pub fn is_ipvlan(&self) -> bool {
        self.name.starts_with(IPVLAN_CONFIG_PREFIX)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NicView {
    pub name: String,
    /// Empty when the NIC is detached.
    pub vm_name: String,
    pub ip_configs: Vec<IpConfigView>,
}

impl NicView {
    pub fn is_attached(&self) -> bool {
        !self.vm_name.is_empty()
    }

    pub fn primary_config(&self) -> Option<&IpConfigView> {
        self.ip_configs.iter().find(|c| c.primary)
    }

    pub fn ipvlan_configs(&self) -> Vec<&IpConfigView> {
        self.ip_configs.iter().filter(|c| c.is_ipvlan()).collect()
    }
}

/// A delegated address block together with the subnet it was carved from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressBlock {
    pub block: IpNetwork,
    pub subnet: IpNetwork,
}

impl AddressBlock {
    pub fn new(block: IpNetwork, subnet: IpNetwork) -> Self {
        Self { block, subnet }
    }
}

impl TryFrom<&IpConfigView> for AddressBlock {
    type Error = Error;

    fn try_from(view: &IpConfigView) -> Result<Self> {
        let Some(block) = view.ip else {
            return Err(Error::MissingSubnetMetadata(format!(
                "ip configuration {} has no address",
                view.name
            )));
        };
        let Some(subnet) = view.subnet_prefix else {
            return Err(Error::MissingSubnetMetadata(format!(
                "ip configuration {} has no subnet prefix",
                view.name
            )));
        };
        Ok(Self { block, subnet })
    }
}
