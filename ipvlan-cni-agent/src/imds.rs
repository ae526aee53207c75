//! Instance metadata client and the read-only address source built on it.

use std::time::Duration;

use ipnetwork::IpNetwork;
use ipvlan_cni::cidr::parse_network;
use ipvlan_cni::source::AddressSource;
use ipvlan_cni::types::{AddressFamily, IpConfigView, NicView};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use crate::Result;

const NETWORK_PATH: &str = "/metadata/instance/network";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NetworkMetadata {
    #[serde(default)]
    pub interface: Vec<InterfaceMetadata>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceMetadata {
    #[serde(default)]
    pub mac_address: Option<String>,

    #[serde(default)]
    pub ipv4: Option<FamilyMetadata>,

    #[serde(default)]
    pub ipv6: Option<FamilyMetadata>,
}

impl InterfaceMetadata {
    fn family(&self, family: AddressFamily) -> Option<&IpAddressMetadata> {
        let meta = match family {
            AddressFamily::Ipv4 => self.ipv4.as_ref(),
            AddressFamily::Ipv6 => self.ipv6.as_ref(),
        };
        meta.and_then(|m| m.ip_address.as_ref())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMetadata {
    #[serde(default)]
    pub ip_address: Option<IpAddressMetadata>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAddressMetadata {
    #[serde(default)]
    pub subnet: Vec<SubnetMetadata>,

    #[serde(default)]
    pub ip_address_block: Vec<AddressBlockMetadata>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubnetMetadata {
    #[serde(default)]
    pub address: String,

    #[serde(default, deserialize_with = "prefix_len")]
    pub prefix: Option<u8>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBlockMetadata {
    #[serde(default)]
    pub private_ip_address: Option<String>,
}

/// IMDS reports the prefix length as a string, older API versions as a
/// number. Both are accepted.
fn prefix_len<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Prefix {
        Number(u8),
        Text(String),
    }

    match Option::<Prefix>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Prefix::Number(n)) => Ok(Some(n)),
        Some(Prefix::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Prefix::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid prefix {s}: {e}"))),
    }
}

pub struct ImdsClient {
    http: reqwest::Client,
    url: String,
    api_version: String,
}

impl ImdsClient {
    pub fn new(endpoint: &str, api_version: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).no_proxy().build()?;
        Ok(Self {
            http,
            url: format!("{}{NETWORK_PATH}", endpoint.trim_end_matches('/')),
            api_version: api_version.into(),
        })
    }

    pub async fn network(&self) -> Result<NetworkMetadata> {
        debug!(url = %self.url, api_version = %self.api_version, "querying instance metadata");
        let metadata = self
            .http
            .get(&self.url)
            .header("Metadata", "true")
            .query(&[("api-version", self.api_version.as_str()), ("format", "json")])
            .send()
            .await?
            .error_for_status()?
            .json::<NetworkMetadata>()
            .await?;
        info!(interfaces = metadata.interface.len(), "found network interfaces");
        Ok(metadata)
    }
}

/// Address source over one metadata snapshot. It never provisions, a NIC
/// is returned with exactly the blocks the platform already assigned.
pub struct ImdsSource {
    metadata: NetworkMetadata,
    family: AddressFamily,
}

impl ImdsSource {
    pub fn new(metadata: NetworkMetadata, family: AddressFamily) -> Self {
        Self { metadata, family }
    }

    pub async fn fetch(client: &ImdsClient, family: AddressFamily) -> Result<Self> {
        Ok(Self::new(client.network().await?, family))
    }
}

fn missing(what: &str, nic: &str) -> ipvlan_cni::Error {
    ipvlan_cni::Error::MissingSubnetMetadata(format!("{what} for interface {nic}"))
}

fn nic_view(
    index: usize,
    iface: &InterfaceMetadata,
    family: AddressFamily,
) -> ipvlan_cni::Result<NicView> {
    let name = iface
        .mac_address
        .clone()
        .unwrap_or_else(|| format!("interface{index}"));
    let meta = iface
        .family(family)
        .ok_or_else(|| missing("no ip address metadata", &name))?;

    let subnet = meta
        .subnet
        .first()
        .ok_or_else(|| missing("no subnet", &name))?;
    let prefix = subnet
        .prefix
        .ok_or_else(|| missing("no subnet prefix length", &name))?;
    let subnet_prefix: IpNetwork =
        parse_network(&format!("{}/{prefix}", subnet.address), family)?;

    if meta.ip_address_block.is_empty() {
        return Err(missing("no address blocks", &name));
    }
    let ip_configs = meta
        .ip_address_block
        .iter()
        .enumerate()
        .map(|(i, block)| {
            let addr = block
                .private_ip_address
                .as_deref()
                .ok_or_else(|| missing("address block without an address", &name))?;
            Ok(IpConfigView {
                name: format!("block{i}"),
                primary: false,
                ip: Some(parse_network(addr, family)?),
                subnet_id: String::new(),
                subnet_prefix: Some(subnet_prefix),
            })
        })
        .collect::<ipvlan_cni::Result<Vec<_>>>()?;

    Ok(NicView {
        name,
        vm_name: String::new(),
        ip_configs,
    })
}

impl AddressSource for ImdsSource {
    async fn list_nics(&mut self) -> ipvlan_cni::Result<Vec<NicView>> {
        self.metadata
            .interface
            .iter()
            .enumerate()
            .map(|(i, iface)| nic_view(i, iface, self.family))
            .collect()
    }

    async fn ensure_ip_configs(
        &mut self,
        nic: &NicView,
        _family: AddressFamily,
        _count: usize,
    ) -> ipvlan_cni::Result<Option<Vec<IpConfigView>>> {
        Ok(Some(nic.ip_configs.clone()))
    }
}
