//! Usable host range math for delegated blocks.
//!
//! Host bits in the input are ignored. The first usable address is the
//! network address plus one and the last is the final address of the block
//! minus one. IPv6 has no broadcast address but gets the same treatment so
//! the host-local ranges look the same for both families.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::IpNetwork;

use crate::types::AddressFamily;
use crate::{Error, Result};

/// Parses `cidr` and checks it belongs to `family`. A bare address is taken
/// as a single-host network.
pub fn parse_network(cidr: &str, family: AddressFamily) -> Result<IpNetwork> {
    let network: IpNetwork = cidr
        .trim()
        .parse()
        .map_err(|e| Error::Parse(format!("{cidr}: {e}")))?;
    if !family.contains(&network) {
        return Err(Error::AddressFamilyMismatch { network, family });
    }
    Ok(network)
}

/// Returns the first and last usable host of `network`.
pub fn derive_range(network: &IpNetwork, family: AddressFamily) -> Result<(IpAddr, IpAddr)> {
    if !family.contains(network) {
        return Err(Error::AddressFamilyMismatch {
            network: *network,
            family,
        });
    }
    // two addresses or fewer leaves nothing between network and last
    if network.prefix() + 1 >= family.max_prefix_len() {
        return Err(Error::InsufficientAddressSpace(*network));
    }

    let range = match network.ip() {
        IpAddr::V4(ip) => {
            let mask = u32::MAX.checked_shl(32 - network.prefix() as u32).unwrap_or(0);
            let first = u32::from(ip) & mask;
            let last = first | !mask;
            (
                IpAddr::V4(Ipv4Addr::from(first + 1)),
                IpAddr::V4(Ipv4Addr::from(last - 1)),
            )
        }
        IpAddr::V6(ip) => {
            let mask = u128::MAX
                .checked_shl(128 - network.prefix() as u32)
                .unwrap_or(0);
            let first = u128::from(ip) & mask;
            let last = first | !mask;
            (
                IpAddr::V6(Ipv6Addr::from(first + 1)),
                IpAddr::V6(Ipv6Addr::from(last - 1)),
            )
        }
    };
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(cidr: &str) -> Result<(IpAddr, IpAddr)> {
        derive_range(&parse_network(cidr, AddressFamily::Ipv4)?, AddressFamily::Ipv4)
    }

    fn v6(cidr: &str) -> Result<(IpAddr, IpAddr)> {
        derive_range(&parse_network(cidr, AddressFamily::Ipv6)?, AddressFamily::Ipv6)
    }

    #[test]
    fn ipv4_slash_28() {
        let (start, end) = v4("10.0.0.0/28").unwrap();
        assert_eq!(start.to_string(), "10.0.0.1");
        assert_eq!(end.to_string(), "10.0.0.14");
    }

    #[test]
    fn ipv4_ignores_host_bits() {
        let (start, end) = v4("10.0.0.21/28").unwrap();
        assert_eq!(start.to_string(), "10.0.0.17");
        assert_eq!(end.to_string(), "10.0.0.30");
    }

    #[test]
    fn ipv4_prefix_bounds() {
        let (start, end) = v4("192.168.4.8/30").unwrap();
        assert_eq!(start.to_string(), "192.168.4.9");
        assert_eq!(end.to_string(), "192.168.4.10");

        let (start, end) = v4("0.0.0.0/0").unwrap();
        assert_eq!(start.to_string(), "0.0.0.1");
        assert_eq!(end.to_string(), "255.255.255.254");
    }

    #[test]
    fn ipv4_narrow_prefixes_fail() {
        for cidr in ["10.0.0.0/31", "10.0.0.1/32", "10.0.0.1"] {
            assert!(
                matches!(v4(cidr), Err(Error::InsufficientAddressSpace(_))),
                "{cidr} should have no usable range"
            );
        }
    }

    #[test]
    fn ipv6_delegated_block() {
        let (start, end) = v6("fd00:10::/80").unwrap();
        assert_eq!(start.to_string(), "fd00:10::1");
        assert_eq!(end.to_string(), "fd00:10::ffff:ffff:fffe");
    }

    #[test]
    fn ipv6_narrow_prefixes_fail() {
        assert!(matches!(v6("fd00::/127"), Err(Error::InsufficientAddressSpace(_))));
        assert!(matches!(v6("fd00::1/128"), Err(Error::InsufficientAddressSpace(_))));
        assert!(v6("fd00::/126").is_ok());
    }

    #[test]
    fn family_mismatch() {
        assert!(matches!(
            parse_network("fd00::/80", AddressFamily::Ipv4),
            Err(Error::AddressFamilyMismatch { .. })
        ));
        let net: IpNetwork = "10.0.0.0/28".parse().unwrap();
        assert!(matches!(
            derive_range(&net, AddressFamily::Ipv6),
            Err(Error::AddressFamilyMismatch { .. })
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_network("not-a-cidr", AddressFamily::Ipv4),
            Err(Error::Parse(_))
        ));
    }
}
