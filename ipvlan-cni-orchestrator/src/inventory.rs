use ipnetwork::IpNetwork;
use ipvlan_cni::Result;
use ipvlan_cni::types::{IPVLAN_CONFIG_PREFIX, IpConfigView, NicView};
use tracing::{debug, warn};

use crate::azure::{ControlPlane, IpConfiguration};
use crate::subnet::SubnetCache;

/// Lists the NICs of the node resource group with their primary and ipvlan
/// IP configurations. Detached NICs are kept with an empty VM name and their
/// subnets are not looked up.
///
/// A subnet that cannot be resolved leaves `subnet_prefix` empty and the NIC
/// is skipped later on; it never fails the listing.
pub async fn list_nics<C: ControlPlane>(
    cp: &C,
    cache: &mut SubnetCache,
    resource_group: &str,
    name_suffix: Option<&str>,
) -> Result<Vec<NicView>> {
    let mut nics = Vec::new();
    for nic in cp.list_nics(resource_group).await? {
        if !name_suffix.is_none_or(|suffix| nic.name.ends_with(suffix)) {
            debug!(nic = %nic.name, "ignoring nic, name suffix does not match");
            continue;
        }

        let vm_name = nic.vm_name();
        let mut ip_configs = Vec::new();
        for cfg in nic.ip_configurations.iter().flatten().filter(|c| is_tracked(c)) {
            let mut view = unresolved_view(cfg);
            if vm_name.is_empty() {
                ip_configs.push(view);
                continue;
            }
            match cache.resolve(cp, &view.subnet_id).await {
                Ok(prefix) => view.subnet_prefix = prefix,
                Err(e) => warn!(
                    nic = %nic.name,
                    ip_config = %cfg.name,
                    subnet_id = %view.subnet_id,
                    "unable to resolve subnet: {e}"
                ),
            }
            ip_configs.push(view);
        }
        nics.push(NicView {
            vm_name,
            name: nic.name,
            ip_configs,
        });
    }
    Ok(nics)
}

fn is_tracked(cfg: &IpConfiguration) -> bool {
    cfg.primary.unwrap_or_default() || cfg.name.starts_with(IPVLAN_CONFIG_PREFIX)
}

fn unresolved_view(cfg: &IpConfiguration) -> IpConfigView {
    let ip = cfg.address().and_then(|addr| match addr.parse::<IpNetwork>() {
        Ok(ip) => Some(ip),
        Err(e) => {
            warn!(ip_config = %cfg.name, address = %addr, "unparsable address: {e}");
            None
        }
    });
    IpConfigView {
        name: cfg.name.clone(),
        primary: cfg.primary.unwrap_or_default(),
        ip,
        subnet_id: cfg.subnet_id().to_owned(),
        subnet_prefix: None,
    }
}

/// View of a single configuration with its subnet resolved. Lookup failures
/// are returned to the caller.
pub async fn ip_config_view<C: ControlPlane>(
    cp: &C,
    cache: &mut SubnetCache,
    cfg: &IpConfiguration,
) -> Result<IpConfigView> {
    let mut view = unresolved_view(cfg);
    view.subnet_prefix = cache.resolve(cp, &view.subnet_id).await?;
    Ok(view)
}
