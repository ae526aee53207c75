use ipvlan_cni::Result;
use ipvlan_cni::source::AddressSource;
use ipvlan_cni::types::{AddressFamily, IpConfigView, NicView};

use crate::azure::ControlPlane;
use crate::inventory;
use crate::provision;
use crate::subnet::SubnetCache;

/// Address source backed by the control plane. It owns the subnet cache for
/// the run and can create missing configurations.
pub struct ControlPlaneSource<'a, C> {
    cp: &'a C,
    resource_group: String,
    name_suffix: Option<String>,
    prefix_len: u8,
    cache: SubnetCache,
}

impl<'a, C: ControlPlane> ControlPlaneSource<'a, C> {
    pub fn new(
        cp: &'a C,
        resource_group: impl Into<String>,
        name_suffix: Option<String>,
        prefix_len: u8,
    ) -> Self {
        Self {
            cp,
            resource_group: resource_group.into(),
            name_suffix,
            prefix_len,
            cache: SubnetCache::new(),
        }
    }
}

impl<C: ControlPlane> AddressSource for ControlPlaneSource<'_, C> {
    async fn list_nics(&mut self) -> Result<Vec<NicView>> {
        inventory::list_nics(
            self.cp,
            &mut self.cache,
            &self.resource_group,
            self.name_suffix.as_deref(),
        )
        .await
    }

    async fn ensure_ip_configs(
        &mut self,
        nic: &NicView,
        family: AddressFamily,
        count: usize,
    ) -> Result<Option<Vec<IpConfigView>>> {
        provision::ensure_ip_configs(
            self.cp,
            &mut self.cache,
            &self.resource_group,
            nic,
            family,
            count,
            self.prefix_len,
        )
        .await
    }
}
