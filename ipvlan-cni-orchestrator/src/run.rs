use ipvlan_cni::config::build_config;
use ipvlan_cni::source::{AddressSource, address_blocks};
use ipvlan_cni::types::NicView;
use tracing::{error, info, warn};

use crate::azure::ControlPlane;
use crate::config::Cli;
use crate::script::node_script;
use crate::source::ControlPlaneSource;
use crate::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub nics: usize,
    pub configured: usize,
    pub skipped: usize,
    pub pushed: usize,
    pub push_failures: usize,
}

/// One provisioning pass over every NIC of the cluster's node resource
/// group. A NIC that fails is logged and skipped, the pass carries on with
/// the next one.
pub async fn run<C: ControlPlane>(cli: &Cli, cp: &C) -> Result<Summary> {
    let node_rg = cp
        .node_resource_group(&cli.resource_group, &cli.cluster_name)
        .await?;
    if node_rg.is_empty() {
        return Err(Error::NodeResourceGroup(cli.cluster_name.clone()));
    }
    info!(resource_group = %node_rg, "discovering nics");

    let mut source =
        ControlPlaneSource::new(cp, node_rg.as_str(), cli.nic_name_suffix.clone(), cli.prefix_len());
    let nics = source.list_nics().await?;
    let mut summary = Summary {
        nics: nics.len(),
        ..Default::default()
    };

    for nic in &nics {
        if !nic.is_attached() {
            warn!(nic = %nic.name, "skipping nic, not attached to a vm");
            summary.skipped += 1;
            continue;
        }

        let lines = match prepare_nic(cli, &mut source, nic).await {
            Ok(Some(lines)) => lines,
            Ok(None) => {
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!(nic = %nic.name, "skipping nic: {e}");
                summary.skipped += 1;
                continue;
            }
        };
        summary.configured += 1;

        if !cli.bootstrap_cni_config {
            continue;
        }
        info!(nic = %nic.name, vm = %nic.vm_name, lines = lines.len(), "pushing cni config");
        match cp.run_shell_script(&node_rg, &nic.vm_name, &lines).await {
            Ok(()) => summary.pushed += 1,
            Err(e) => {
                error!(nic = %nic.name, vm = %nic.vm_name, "failed to push cni config: {e}");
                summary.push_failures += 1;
            }
        }
    }

    info!(
        nics = summary.nics,
        configured = summary.configured,
        skipped = summary.skipped,
        pushed = summary.pushed,
        "provisioning pass finished"
    );
    if summary.push_failures > 0 {
        return Err(Error::Bootstrap {
            failed: summary.push_failures,
        });
    }
    Ok(summary)
}

/// Provisions the NIC and renders its node script. `None` when the NIC has
/// to be skipped; the reason has been logged already.
async fn prepare_nic<S: AddressSource>(
    cli: &Cli,
    source: &mut S,
    nic: &NicView,
) -> ipvlan_cni::Result<Option<Vec<String>>> {
    let family = cli.address_version;
    let count = usize::from(cli.ipvlan_config_count);

    let Some(configs) = source.ensure_ip_configs(nic, family, count).await? else {
        return Ok(None);
    };
    if configs.len() < count {
        warn!(
            nic = %nic.name,
            found = configs.len(),
            wanted = count,
            "skipping nic, not enough ipvlan ip configurations"
        );
        return Ok(None);
    }

    let blocks = address_blocks(&configs)?;
    let (config, ranges) = build_config(&blocks, family, &cli.interface, &cli.cni_name)?;
    for range in &ranges {
        info!(
            nic = %nic.name,
            subnet = %range.subnet,
            range_start = %range.range_start,
            range_end = %range.range_end,
            "ipvlan range"
        );
    }
    Ok(Some(node_script(&config, &blocks, family)?))
}
