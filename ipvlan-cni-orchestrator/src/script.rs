use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ipvlan_cni::CNI_CONF_DIR;
use ipvlan_cni::Result;
use ipvlan_cni::config::IpvlanConfig;
use ipvlan_cni::host::{MasqueradeRule, assign_address, ipv6_forwarding, link_up, subnet_route};
use ipvlan_cni::types::{AddressBlock, AddressFamily};

/// Shell lines that configure one node for `config`, one line per remote
/// `--scripts` value.
///
/// The config document travels base64 encoded so it survives the remote
/// shell untouched. Masquerade rules are appended without a check, running
/// the same script twice duplicates them.
pub fn node_script(
    config: &IpvlanConfig,
    blocks: &[AddressBlock],
    family: AddressFamily,
) -> Result<Vec<String>> {
    let interface = config.master.as_str();
    let mut lines: Vec<String> = blocks
        .iter()
        .map(|b| assign_address(&b.block, interface).to_string())
        .collect();

    lines.push(link_up(interface).to_string());

    let mut subnets = Vec::new();
    for block in blocks {
        if !subnets.contains(&block.subnet) {
            subnets.push(block.subnet);
        }
    }
    lines.extend(
        subnets
            .iter()
            .map(|s| format!("{} || true", subnet_route(s, interface))),
    );

    let payload = STANDARD.encode(config.to_vec_pretty()?);
    lines.push(format!(
        "echo {payload} | base64 -d | tee {}",
        config.path(CNI_CONF_DIR).display()
    ));

    lines.extend(
        blocks
            .iter()
            .map(|b| MasqueradeRule::new(family, b).append().to_string()),
    );

    if family == AddressFamily::Ipv6 {
        lines.extend(ipv6_forwarding(interface).iter().map(ToString::to_string));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use ipvlan_cni::config::build_config;

    use super::*;

    fn blocks(cidrs: &[&str], subnet: &str) -> Vec<AddressBlock> {
        cidrs
            .iter()
            .map(|c| AddressBlock::new(c.parse().unwrap(), subnet.parse().unwrap()))
            .collect()
    }

    #[test]
    fn ipv4_script_order() {
        let blocks = blocks(&["10.0.0.16/28", "10.0.0.32/28"], "10.0.0.0/24");
        let (config, _) = build_config(&blocks, AddressFamily::Ipv4, "eth1", "ipvlan-eth1").unwrap();
        let lines = node_script(&config, &blocks, AddressFamily::Ipv4).unwrap();

        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "ip addr replace 10.0.0.16/28 dev eth1");
        assert_eq!(lines[1], "ip addr replace 10.0.0.32/28 dev eth1");
        assert_eq!(lines[2], "ip link set eth1 up");
        assert_eq!(lines[3], "ip route add 10.0.0.0/24 dev eth1 || true");
        assert!(lines[4].starts_with("echo "));
        assert!(lines[4].ends_with(" | base64 -d | tee /etc/cni/net.d/01-ipvlan-eth1.conf"));
        assert_eq!(
            lines[6],
            "iptables -t nat -A POSTROUTING -s 10.0.0.32/28 ! -d 10.0.0.0/24 -j MASQUERADE"
        );
    }

    #[test]
    fn payload_decodes_to_config() {
        let blocks = blocks(&["10.0.0.16/28"], "10.0.0.0/24");
        let (config, _) = build_config(&blocks, AddressFamily::Ipv4, "eth1", "ipvlan-eth1").unwrap();
        let lines = node_script(&config, &blocks, AddressFamily::Ipv4).unwrap();

        let payload = lines[3]
            .strip_prefix("echo ")
            .and_then(|l| l.split(' ').next())
            .unwrap();
        let decoded = STANDARD.decode(payload).unwrap();
        let round: IpvlanConfig = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(round, config);
    }

    #[test]
    fn ipv6_adds_sysctls() {
        let blocks = blocks(&["fd00:10:0:0:1::/80"], "fd00:10::/64");
        let (config, _) = build_config(&blocks, AddressFamily::Ipv6, "eth1", "ipvlan-eth1").unwrap();
        let lines = node_script(&config, &blocks, AddressFamily::Ipv6).unwrap();

        assert!(lines.iter().any(|l| l.starts_with("ip6tables -t nat -A POSTROUTING")));
        assert!(lines.contains(&"sysctl -w net.ipv6.conf.eth1.accept_ra=0".to_string()));
        assert_eq!(lines.len(), 5 + 8);
    }
}
