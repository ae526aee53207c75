use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use ipvlan_cni::command::CommandRunner;
use ipvlan_cni::config::{IpvlanConfig, build_config};
use ipvlan_cni::host::HostNetwork;
use ipvlan_cni::source::{AddressSource, address_blocks};
use tracing::info;

use crate::config::Cli;
use crate::{Error, Result};

/// Configures the local node from `source`. Blocks of every interface go
/// into the one pool of the config written for `cli.interface`.
pub async fn apply<S, R>(cli: &Cli, source: &mut S, runner: R) -> Result<PathBuf>
where
    S: AddressSource,
    R: CommandRunner,
{
    let family = cli.address_version;
    let nics = source.list_nics().await?;
    if nics.is_empty() {
        return Err(Error::NoInterfaces);
    }

    let mut configs = Vec::new();
    for nic in &nics {
        let found = source
            .ensure_ip_configs(nic, family, nic.ip_configs.len())
            .await?
            .ok_or_else(|| {
                ipvlan_cni::Error::MissingSubnetMetadata(format!(
                    "no address blocks for interface {}",
                    nic.name
                ))
            })?;
        configs.extend(found);
    }

    let blocks = address_blocks(&configs)?;
    let (config, ranges) = build_config(&blocks, family, &cli.interface, &cli.cni_name)?;
    for range in &ranges {
        info!(
            subnet = %range.subnet,
            range_start = %range.range_start,
            range_end = %range.range_end,
            "ipvlan range"
        );
    }

    HostNetwork::new(runner, cli.interface.as_str(), family)
        .apply(&blocks)
        .await?;
    write_config(&config, &cli.cni_conf_dir)
}

/// Writes `config` next to its final path and renames it into place, so the
/// runtime never reads a half written file.
pub fn write_config(config: &IpvlanConfig, cni_conf_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = cni_conf_dir.as_ref();
    fs::create_dir_all(dir)?;

    let path = config.path(dir);
    let tmp = dir.join(format!("{}.tmp", config.file_name()));
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(&config.to_vec_pretty()?)?;
    file.sync_all()?;
    fs::rename(&tmp, &path)?;

    info!(path = %path.display(), "wrote cni config");
    Ok(path)
}
