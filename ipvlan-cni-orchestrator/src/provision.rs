//! Brings the ipvlan IP configurations of a NIC up to a target count.

use ipvlan_cni::Result;
use ipvlan_cni::types::{AddressFamily, IPVLAN_CONFIG_PREFIX, IpConfigView, NicView};
use tracing::{info, warn};

use crate::azure::{ControlPlane, IpConfigRequest};
use crate::inventory::ip_config_view;
use crate::subnet::SubnetCache;

pub fn ipvlan_config_name(index: usize) -> String {
    format!("{IPVLAN_CONFIG_PREFIX}{index}")
}

/// Ensures `nic` carries `count` ipvlan configurations named
/// `ipvlan1..ipvlanN`.
///
/// Returns the existing configurations unchanged when the count already
/// matches. Otherwise every missing name is created on the subnet of the
/// primary configuration and read back for its assigned block. `None` means
/// the NIC has no primary configuration to take a subnet from.
pub async fn ensure_ip_configs<C: ControlPlane>(
    cp: &C,
    cache: &mut SubnetCache,
    resource_group: &str,
    nic: &NicView,
    family: AddressFamily,
    count: usize,
    prefix_len: u8,
) -> Result<Option<Vec<IpConfigView>>> {
    let existing = nic.ipvlan_configs();
    if existing.len() == count {
        return Ok(Some(existing.into_iter().cloned().collect()));
    }

    let Some(primary) = nic.primary_config() else {
        warn!(nic = %nic.name, "no primary ip configuration");
        return Ok(None);
    };
    if primary.subnet_id.is_empty() {
        warn!(nic = %nic.name, ip_config = %primary.name, "primary ip configuration has no subnet");
        return Ok(None);
    }

    let mut configs = Vec::with_capacity(count);
    for index in 1..=count {
        let name = ipvlan_config_name(index);
        if let Some(found) = existing.iter().find(|c| c.name == name) {
            configs.push((*found).clone());
            continue;
        }

        let request = IpConfigRequest {
            name,
            subnet_id: primary.subnet_id.clone(),
            family,
            prefix_len,
        };
        info!(
            nic = %nic.name,
            ip_config = %request.name,
            family = %family,
            prefix_len,
            "creating ip configuration"
        );
        cp.create_ip_config(resource_group, &nic.name, &request).await?;

        let created = cp
            .show_ip_config(resource_group, &nic.name, &request.name)
            .await?;
        configs.push(ip_config_view(cp, cache, &created).await?);
    }
    Ok(Some(configs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::list_nics;
    use crate::run::tests::FakeControlPlane;

    async fn nic(cp: &FakeControlPlane, cache: &mut SubnetCache) -> NicView {
        list_nics(cp, cache, "mc_rg", None).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn creates_delegated_blocks() {
        let cp = FakeControlPlane::with_nic("eth0", "aks-node-0", "10.0.0.0/24");
        let mut cache = SubnetCache::new();
        let nic = nic(&cp, &mut cache).await;

        let configs = ensure_ip_configs(&cp, &mut cache, "mc_rg", &nic, AddressFamily::Ipv4, 2, 28)
            .await
            .unwrap()
            .unwrap();

        let names: Vec<_> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["ipvlan1", "ipvlan2"]);
        assert_eq!(configs[0].ip.unwrap().to_string(), "10.0.0.16/28");
        assert_eq!(configs[1].ip.unwrap().to_string(), "10.0.0.32/28");
        assert!(configs.iter().all(|c| c.subnet_prefix == Some("10.0.0.0/24".parse().unwrap())));

        let created = cp.created();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|r| r.prefix_len == 28 && r.family == AddressFamily::Ipv4));
    }

    #[tokio::test]
    async fn second_pass_creates_nothing() {
        let cp = FakeControlPlane::with_nic("eth0", "aks-node-0", "10.0.0.0/24");
        let mut cache = SubnetCache::new();

        let first = nic(&cp, &mut cache).await;
        ensure_ip_configs(&cp, &mut cache, "mc_rg", &first, AddressFamily::Ipv4, 2, 28)
            .await
            .unwrap();
        assert_eq!(cp.created().len(), 2);

        let second = nic(&cp, &mut cache).await;
        let configs = ensure_ip_configs(&cp, &mut cache, "mc_rg", &second, AddressFamily::Ipv4, 2, 28)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(cp.created().len(), 2);
    }

    #[tokio::test]
    async fn tops_up_missing_names() {
        let cp = FakeControlPlane::with_nic("eth0", "aks-node-0", "10.0.0.0/24");
        let mut cache = SubnetCache::new();

        let first = nic(&cp, &mut cache).await;
        ensure_ip_configs(&cp, &mut cache, "mc_rg", &first, AddressFamily::Ipv4, 1, 28)
            .await
            .unwrap();

        let second = nic(&cp, &mut cache).await;
        let configs = ensure_ip_configs(&cp, &mut cache, "mc_rg", &second, AddressFamily::Ipv4, 3, 28)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(configs.len(), 3);
        let created: Vec<_> = cp.created().into_iter().map(|r| r.name).collect();
        assert_eq!(created, ["ipvlan1", "ipvlan2", "ipvlan3"]);
    }

    #[tokio::test]
    async fn no_primary_skips() {
        let cp = FakeControlPlane::default();
        let nic = NicView {
            name: "eth0".into(),
            vm_name: "aks-node-0".into(),
            ip_configs: vec![],
        };
        let mut cache = SubnetCache::new();
        let res = ensure_ip_configs(&cp, &mut cache, "mc_rg", &nic, AddressFamily::Ipv4, 1, 28)
            .await
            .unwrap();
        assert!(res.is_none());
        assert!(cp.created().is_empty());
    }

    #[tokio::test]
    async fn ipv6_requests_slash_80() {
        let cp = FakeControlPlane::with_nic("eth0", "aks-node-0", "fd00:10::/64");
        let mut cache = SubnetCache::new();
        let nic = nic(&cp, &mut cache).await;

        let configs = ensure_ip_configs(
            &cp,
            &mut cache,
            "mc_rg",
            &nic,
            AddressFamily::Ipv6,
            1,
            AddressFamily::Ipv6.delegated_prefix_len(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(configs[0].ip.unwrap().prefix(), 80);
        assert_eq!(cp.created()[0].family, AddressFamily::Ipv6);
    }
}
