use std::collections::HashMap;

use ipnetwork::IpNetwork;
use ipvlan_cni::{Error, Result};
use tracing::{debug, warn};

use crate::azure::ControlPlane;

/// Subnet id to address prefix, filled lazily for the lifetime of one run.
/// Subnets without a usable prefix are remembered as `None` so they are
/// only looked up once.
#[derive(Debug, Default)]
pub struct SubnetCache {
    prefixes: HashMap<String, Option<IpNetwork>>,
}

impl SubnetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub async fn resolve<C: ControlPlane>(
        &mut self,
        cp: &C,
        subnet_id: &str,
    ) -> Result<Option<IpNetwork>> {
        if subnet_id.is_empty() {
            return Ok(None);
        }
        if let Some(prefix) = self.prefixes.get(subnet_id) {
            return Ok(*prefix);
        }

        let subnet = cp.show_subnet(subnet_id).await?;
        let prefix = match subnet.prefix() {
            Some(p) => Some(
                p.parse::<IpNetwork>()
                    .map_err(|e| Error::Parse(format!("subnet {subnet_id} prefix {p}: {e}")))?,
            ),
            None => {
                warn!(subnet_id, "subnet has no address prefix");
                None
            }
        };
        debug!(subnet_id, prefix = ?prefix, "resolved subnet");
        self.prefixes.insert(subnet_id.to_owned(), prefix);
        Ok(prefix)
    }
}
