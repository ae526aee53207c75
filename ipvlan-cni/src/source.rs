use crate::Result;
use crate::types::{AddressBlock, AddressFamily, IpConfigView, NicView};

/// Where a deployment discovers NICs and their ipvlan address blocks.
///
/// The control-plane source can create missing configurations, the metadata
/// source only reports what the node already has.
pub trait AddressSource {
    async fn list_nics(&mut self) -> Result<Vec<NicView>>;

    /// Returns the ipvlan configurations of `nic`, creating up to `count`
    /// of them when the source supports it. `None` means the NIC cannot be
    /// provisioned and should be skipped.
    async fn ensure_ip_configs(
        &mut self,
        nic: &NicView,
        family: AddressFamily,
        count: usize,
    ) -> Result<Option<Vec<IpConfigView>>>;
}

/// Converts views into blocks, failing on the first incomplete one.
pub fn address_blocks(configs: &[IpConfigView]) -> Result<Vec<AddressBlock>> {
    configs.iter().map(AddressBlock::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn incomplete_view_fails_conversion() {
        let good = IpConfigView {
            name: "ipvlan1".into(),
            ip: Some("10.0.0.16/28".parse().unwrap()),
            subnet_prefix: Some("10.0.0.0/24".parse().unwrap()),
            ..Default::default()
        };
        let missing = IpConfigView {
            name: "ipvlan2".into(),
            ..Default::default()
        };
        assert_eq!(address_blocks(std::slice::from_ref(&good)).unwrap().len(), 1);
        assert!(matches!(
            address_blocks(&[good, missing]),
            Err(Error::MissingSubnetMetadata(_))
        ));
    }
}
