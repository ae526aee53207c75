use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ipnetwork::IpNetwork;
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cidr::derive_range;
use crate::types::{AddressBlock, AddressFamily};
use crate::{CNI_VERSION, Error, Result};

pub const PLUGIN_TYPE: &str = "ipvlan";
pub const IPAM_TYPE: &str = "host-local";

/// https://www.cni.dev/plugins/current/ipam/host-local/#network-configuration-reference
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetRange {
    #[serde(
        serialize_with = "crate::serialize_to_string",
        deserialize_with = "crate::deserialize_from_str"
    )]
    pub subnet: IpNetwork,
    pub range_start: IpAddr,
    pub range_end: IpAddr,
}

impl SubnetRange {
    pub fn new(subnet: IpNetwork, family: AddressFamily) -> Result<Self> {
        let (range_start, range_end) = derive_range(&subnet, family)?;
        Ok(Self {
            subnet,
            range_start,
            range_end,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpvlanMode {
    #[serde(rename = "l2")]
    L2,
    #[serde(rename = "l3")]
    L3,
    #[default]
    #[serde(rename = "l3s")]
    L3s,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    #[serde(
        serialize_with = "crate::serialize_to_string",
        deserialize_with = "crate::deserialize_from_str"
    )]
    pub dst: IpNetwork,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamConfig {
    pub r#type: String,

    /// A list of pools, each pool a list of ranges. Only one pool is ever
    /// generated but the nesting is part of the host-local contract.
    pub ranges: Vec<Vec<SubnetRange>>,

    pub routes: Vec<Route>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpvlanConfig {
    #[serde(
        serialize_with = "crate::serialize_to_string",
        deserialize_with = "crate::deserialize_from_str"
    )]
    pub cni_version: Version,

    pub name: String,

    pub r#type: String,

    /// Parent interface the ipvlan links hang off.
    pub master: String,

    pub link_in_container: bool,

    pub mode: IpvlanMode,

    pub ipam: IpamConfig,
}

impl IpvlanConfig {
    pub fn file_name(&self) -> String {
        conf_file_name(&self.name)
    }

    pub fn path(&self, cni_conf_dir: impl AsRef<Path>) -> PathBuf {
        cni_conf_dir.as_ref().join(self.file_name())
    }

    pub fn ranges(&self) -> impl Iterator<Item = &SubnetRange> {
        self.ipam.ranges.iter().flatten()
    }

    pub fn to_vec_pretty(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| e.into())
    }
}

pub fn conf_file_name(cni_name: &str) -> String {
    format!("01-{cni_name}.conf")
}

/// Builds the ipvlan config for `blocks`. Every block must yield a usable
/// range; no config is produced otherwise.
pub fn build_config(
    blocks: &[AddressBlock],
    family: AddressFamily,
    master: &str,
    cni_name: &str,
) -> Result<(IpvlanConfig, Vec<SubnetRange>)> {
    if blocks.is_empty() {
        return Err(Error::MissingSubnetMetadata(format!(
            "no address blocks for {cni_name}"
        )));
    }
    let ranges = blocks
        .iter()
        .map(|b| SubnetRange::new(b.block, family))
        .collect::<Result<Vec<_>>>()?;
    debug!(cni_name, ranges = ranges.len(), "built ipvlan ranges");

    let config = IpvlanConfig {
        cni_version: CNI_VERSION,
        name: cni_name.to_owned(),
        r#type: PLUGIN_TYPE.into(),
        master: master.to_owned(),
        link_in_container: false,
        mode: IpvlanMode::L3s,
        ipam: IpamConfig {
            r#type: IPAM_TYPE.into(),
            ranges: vec![ranges.clone()],
            routes: vec![Route {
                dst: family.default_route(),
            }],
        },
    };
    Ok((config, ranges))
}
