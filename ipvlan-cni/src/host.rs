use ipnetwork::IpNetwork;
use tracing::{debug, info};

use crate::command::{CommandRunner, HostCommand};
use crate::types::{AddressBlock, AddressFamily};
use crate::{Error, Result};

/// `ip addr replace` is idempotent, re-running it leaves one address.
pub fn assign_address(block: &IpNetwork, interface: &str) -> HostCommand {
    HostCommand::new("ip").args(["addr", "replace", &block.to_string(), "dev", interface])
}

pub fn link_up(interface: &str) -> HostCommand {
    HostCommand::new("ip").args(["link", "set", interface, "up"])
}

pub fn subnet_route(subnet: &IpNetwork, interface: &str) -> HostCommand {
    HostCommand::new("ip").args(["route", "add", &subnet.to_string(), "dev", interface])
}

/// Kernel knobs l3s needs to route IPv6 pod traffic through `interface`.
pub fn ipv6_forwarding(interface: &str) -> Vec<HostCommand> {
    let sysctl = |key: String| HostCommand::new("sysctl").args(["-w".to_string(), key]);
    vec![
        sysctl("net.ipv6.conf.all.forwarding=1".into()),
        sysctl("net.ipv6.conf.default.forwarding=1".into()),
        sysctl("net.ipv6.conf.eth0.forwarding=1".into()),
        sysctl(format!("net.ipv6.conf.{interface}.forwarding=1")),
        sysctl("net.ipv6.conf.all.accept_local=1".into()),
        sysctl(format!("net.ipv6.conf.{interface}.accept_local=1")),
        sysctl(format!("net.ipv6.conf.{interface}.accept_ra=0")),
        sysctl(format!("net.ipv6.conf.{interface}.proxy_ndp=1")),
    ]
}

/// NAT rule masquerading pod traffic from `source` unless it stays inside
/// `exclude`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasqueradeRule {
    pub family: AddressFamily,
    pub source: IpNetwork,
    pub exclude: IpNetwork,
}

impl MasqueradeRule {
    pub fn new(family: AddressFamily, block: &AddressBlock) -> Self {
        Self {
            family,
            source: block.block,
            exclude: block.subnet,
        }
    }

    fn command(&self, op: &str) -> HostCommand {
        HostCommand::new(self.family.iptables())
            .args(["-t", "nat", op, "POSTROUTING", "-s"])
            .arg(self.source)
            .args(["!", "-d"])
            .arg(self.exclude)
            .args(["-j", "MASQUERADE"])
    }

    pub fn check(&self) -> HostCommand {
        self.command("-C")
    }

    pub fn append(&self) -> HostCommand {
        self.command("-A")
    }
}

pub trait NatTable {
    async fn rule_exists(&self, rule: &MasqueradeRule) -> Result<bool>;
    async fn insert_rule(&self, rule: &MasqueradeRule) -> Result<()>;
}

/// iptables exits 1 from `-C` when the rule is absent; anything else
/// non-zero is a real failure.
const IPTABLES_RULE_ABSENT: i32 = 1;

pub struct Iptables<R> {
    runner: R,
}

impl<R: CommandRunner> Iptables<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> NatTable for Iptables<R> {
    async fn rule_exists(&self, rule: &MasqueradeRule) -> Result<bool> {
        let cmd = rule.check();
        let out = self.runner.run(&cmd).await?;
        match out.code {
            Some(0) => Ok(true),
            Some(IPTABLES_RULE_ABSENT) => Ok(false),
            code => Err(Error::ApplyFailure(format!(
                "`{cmd}` exited with {code:?}: {}",
                out.stderr.trim()
            ))),
        }
    }

    async fn insert_rule(&self, rule: &MasqueradeRule) -> Result<()> {
        self.runner.run_checked(&rule.append()).await?;
        Ok(())
    }
}

/// Appends `rule` unless it is already present. Returns whether it was added.
pub async fn ensure_masquerade<N: NatTable>(nat: &N, rule: &MasqueradeRule) -> Result<bool> {
    if nat.rule_exists(rule).await? {
        debug!(source = %rule.source, "masquerade rule already present");
        return Ok(false);
    }
    info!(source = %rule.source, exclude = %rule.exclude, "adding masquerade rule");
    nat.insert_rule(rule).await?;
    Ok(true)
}

/// Applies address blocks to an interface of the local host.
pub struct HostNetwork<R> {
    runner: R,
    interface: String,
    family: AddressFamily,
}

impl<R: CommandRunner> HostNetwork<R> {
    pub fn new(runner: R, interface: impl Into<String>, family: AddressFamily) -> Self {
        Self {
            runner,
            interface: interface.into(),
            family,
        }
    }

    pub async fn apply(&self, blocks: &[AddressBlock]) -> Result<()> {
        let nat = Iptables::new(&self.runner);
        for block in blocks {
            info!(block = %block.block, interface = %self.interface, "assigning address block");
            self.runner
                .run_checked(&assign_address(&block.block, &self.interface))
                .await?;
            ensure_masquerade(&nat, &MasqueradeRule::new(self.family, block)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::command::CommandOutput;

    /// Keeps a POSTROUTING chain in memory and answers iptables the way the
    /// real binary does.
    #[derive(Default)]
    struct FakeHost {
        executed: Mutex<Vec<String>>,
        postrouting: Mutex<Vec<String>>,
        check_exit: Option<i32>,
    }

    impl CommandRunner for FakeHost {
        async fn run(&self, cmd: &HostCommand) -> Result<CommandOutput> {
            self.executed.lock().unwrap().push(cmd.to_string());
            let args = cmd.args_list();
            let code = if cmd.program().ends_with("tables") {
                let rule = args[4..].join(" ");
                let mut chain = self.postrouting.lock().unwrap();
                match args[2].as_str() {
                    "-C" => self
                        .check_exit
                        .unwrap_or(if chain.contains(&rule) { 0 } else { 1 }),
                    "-A" => {
                        chain.push(rule);
                        0
                    }
                    _ => 2,
                }
            } else {
                0
            };
            Ok(CommandOutput {
                code: Some(code),
                ..Default::default()
            })
        }
    }

    fn block(cidr: &str) -> AddressBlock {
        AddressBlock::new(cidr.parse().unwrap(), "10.0.0.0/24".parse().unwrap())
    }

    #[test]
    fn masquerade_commands() {
        let rule = MasqueradeRule::new(AddressFamily::Ipv4, &block("10.0.0.16/28"));
        assert_eq!(
            rule.check().to_string(),
            "iptables -t nat -C POSTROUTING -s 10.0.0.16/28 ! -d 10.0.0.0/24 -j MASQUERADE"
        );
        assert_eq!(
            rule.append().to_string(),
            "iptables -t nat -A POSTROUTING -s 10.0.0.16/28 ! -d 10.0.0.0/24 -j MASQUERADE"
        );

        let v6 = AddressBlock::new("fd00::/80".parse().unwrap(), "fd00::/64".parse().unwrap());
        assert!(
            MasqueradeRule::new(AddressFamily::Ipv6, &v6)
                .append()
                .to_string()
                .starts_with("ip6tables -t nat -A")
        );
    }

    #[tokio::test]
    async fn masquerade_is_added_once() {
        let host = FakeHost::default();
        let nat = Iptables::new(&host);
        let rule = MasqueradeRule::new(AddressFamily::Ipv4, &block("10.0.0.16/28"));

        assert!(ensure_masquerade(&nat, &rule).await.unwrap());
        assert!(!ensure_masquerade(&nat, &rule).await.unwrap());
        assert_eq!(host.postrouting.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn check_failure_is_not_absence() {
        let host = FakeHost {
            check_exit: Some(4),
            ..Default::default()
        };
        let rule = MasqueradeRule::new(AddressFamily::Ipv4, &block("10.0.0.16/28"));
        assert!(matches!(
            ensure_masquerade(&Iptables::new(&host), &rule).await,
            Err(Error::ApplyFailure(_))
        ));
        assert!(host.postrouting.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_twice_is_idempotent() {
        let host = FakeHost::default();
        let network = HostNetwork::new(&host, "eth0", AddressFamily::Ipv4);
        let blocks = [block("10.0.0.16/28"), block("10.0.0.32/28")];

        network.apply(&blocks).await.unwrap();
        network.apply(&blocks).await.unwrap();

        assert_eq!(host.postrouting.lock().unwrap().len(), 2);
        let executed = host.executed.lock().unwrap();
        let appends = executed.iter().filter(|c| c.contains(" -A ")).count();
        assert_eq!(appends, 2);
        assert_eq!(executed[0], "ip addr replace 10.0.0.16/28 dev eth0");
    }

    #[test]
    fn ipv6_sysctls_target_interface() {
        let cmds = ipv6_forwarding("eth1");
        assert_eq!(cmds.len(), 8);
        assert!(
            cmds.iter()
                .any(|c| c.to_string() == "sysctl -w net.ipv6.conf.eth1.proxy_ndp=1")
        );
    }
}
