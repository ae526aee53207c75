//! Control-plane access. `ControlPlane` is the seam the provisioning logic
//! works against; `AzureCli` implements it by shelling out to `az`.

use std::path::PathBuf;

use ipvlan_cni::Error;
use ipvlan_cni::Result;
use ipvlan_cni::command::{CommandRunner, HostCommand, SystemRunner};
use ipvlan_cni::types::AddressFamily;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResourceRef {
    #[serde(default)]
    pub id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub virtual_machine: Option<ResourceRef>,

    #[serde(default)]
    pub ip_configurations: Option<Vec<IpConfiguration>>,
}

impl NetworkInterface {
    /// Last segment of the attached VM id, empty when detached.
    pub fn vm_name(&self) -> String {
        let id = self
            .virtual_machine
            .as_ref()
            .map(|vm| vm.id.as_str())
            .unwrap_or_default();
        match id.rsplit('/').next() {
            Some(name) if name != "null" => name.to_owned(),
            _ => String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpConfiguration {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub primary: Option<bool>,

    #[serde(default, rename = "privateIPAddress")]
    pub private_ip_address: Option<String>,

    #[serde(default, rename = "privateIPAddressPrefixLength")]
    pub private_ip_address_prefix_length: Option<u8>,

    #[serde(default)]
    pub subnet: Option<ResourceRef>,
}

impl IpConfiguration {
    pub fn subnet_id(&self) -> &str {
        self.subnet.as_ref().map(|s| s.id.as_str()).unwrap_or_default()
    }

    /// The private address in CIDR form. The prefix is taken from the
    /// address itself or from the separate prefix length when present.
    pub fn address(&self) -> Option<String> {
        let ip = self.private_ip_address.as_deref()?.trim();
        if ip.is_empty() {
            return None;
        }
        match self.private_ip_address_prefix_length {
            Some(len) if !ip.contains('/') => Some(format!("{ip}/{len}")),
            _ => Some(ip.to_owned()),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    #[serde(default)]
    pub address_prefix: Option<String>,

    #[serde(default)]
    pub address_prefixes: Option<Vec<String>>,
}

impl Subnet {
    /// Dual-stack subnets carry no singular prefix; their second listed
    /// prefix is used instead.
    pub fn prefix(&self) -> Option<&str> {
        match self.address_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => Some(prefix),
            _ => self
                .address_prefixes
                .as_ref()
                .and_then(|p| p.get(1))
                .map(String::as_str),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpConfigRequest {
    pub name: String,
    pub subnet_id: String,
    pub family: AddressFamily,
    pub prefix_len: u8,
}

pub trait ControlPlane {
    async fn node_resource_group(&self, resource_group: &str, cluster: &str) -> Result<String>;

    async fn list_nics(&self, resource_group: &str) -> Result<Vec<NetworkInterface>>;

    async fn show_subnet(&self, subnet_id: &str) -> Result<Subnet>;

    async fn create_ip_config(
        &self,
        resource_group: &str,
        nic: &str,
        request: &IpConfigRequest,
    ) -> Result<()>;

    async fn show_ip_config(
        &self,
        resource_group: &str,
        nic: &str,
        name: &str,
    ) -> Result<IpConfiguration>;

    async fn run_shell_script(&self, resource_group: &str, vm: &str, lines: &[String])
    -> Result<()>;
}

#[derive(Debug, Default, Deserialize)]
struct RunCommandResult {
    #[serde(default)]
    value: Vec<InstanceViewStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct InstanceViewStatus {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Logs the per-step status of a run-command response and returns how many
/// steps were reported. The command exits 0 even when the script failed on
/// the node, so these messages are all an operator gets.
fn log_run_command_output(vm: &str, out: &str) -> usize {
    if out.is_empty() {
        warn!(vm, "run-command returned no output");
        return 0;
    }
    match serde_json::from_str::<RunCommandResult>(out) {
        Ok(result) => {
            for status in &result.value {
                info!(vm, code = %status.code, "{}", status.message.trim());
            }
            result.value.len()
        }
        Err(e) => {
            warn!(vm, output = %out, "unable to parse run-command output: {e}");
            0
        }
    }
}

pub struct AzureCli<R = SystemRunner> {
    binary: PathBuf,
    runner: R,
}

impl AzureCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self::with_runner(binary, SystemRunner)
    }
}

impl<R: CommandRunner> AzureCli<R> {
    pub fn with_runner(binary: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            binary: binary.into(),
            runner,
        }
    }

    fn command<I, S>(&self, args: I) -> HostCommand
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        HostCommand::new(self.binary.to_string_lossy()).args(args)
    }

    async fn az(&self, cmd: HostCommand) -> Result<String> {
        let out = self.runner.run(&cmd).await?;
        if !out.success() {
            return Err(Error::ProvisioningFailure(format!(
                "`{cmd}` exited with {:?}: {}",
                out.code,
                out.stderr.trim()
            )));
        }
        Ok(out.stdout.trim().to_owned())
    }

    async fn az_json<T: for<'de> Deserialize<'de>>(&self, cmd: HostCommand) -> Result<T> {
        let out = self.az(cmd).await?;
        Ok(serde_json::from_str(&out)?)
    }
}

impl<R: CommandRunner> ControlPlane for AzureCli<R> {
    async fn node_resource_group(&self, resource_group: &str, cluster: &str) -> Result<String> {
        self.az(self.command([
            "aks",
            "show",
            "-g",
            resource_group,
            "-n",
            cluster,
            "--query",
            "nodeResourceGroup",
            "-o",
            "tsv",
        ]))
        .await
    }

    async fn list_nics(&self, resource_group: &str) -> Result<Vec<NetworkInterface>> {
        let out = self
            .az(self.command([
                "network",
                "nic",
                "list",
                "--resource-group",
                resource_group,
                "-o",
                "json",
            ]))
            .await?;
        if out.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&out)?)
    }

    async fn show_subnet(&self, subnet_id: &str) -> Result<Subnet> {
        debug!(subnet_id, "looking up subnet");
        self.az_json(self.command([
            "network", "vnet", "subnet", "show", "--ids", subnet_id, "-o", "json",
        ]))
        .await
    }

    async fn create_ip_config(
        &self,
        resource_group: &str,
        nic: &str,
        request: &IpConfigRequest,
    ) -> Result<()> {
        let cmd = self
            .command([
                "network",
                "nic",
                "ip-config",
                "create",
                "--resource-group",
                resource_group,
                "--nic-name",
                nic,
                "--name",
                request.name.as_str(),
                "--subnet",
                request.subnet_id.as_str(),
                "--private-ip-address-version",
                request.family.as_str(),
                "--private-ip-address-prefix-length",
            ])
            .arg(request.prefix_len);
        self.az(cmd).await?;
        Ok(())
    }

    async fn show_ip_config(
        &self,
        resource_group: &str,
        nic: &str,
        name: &str,
    ) -> Result<IpConfiguration> {
        self.az_json(self.command([
            "network",
            "nic",
            "ip-config",
            "show",
            "--resource-group",
            resource_group,
            "--nic-name",
            nic,
            "--name",
            name,
            "-o",
            "json",
        ]))
        .await
    }

    async fn run_shell_script(
        &self,
        resource_group: &str,
        vm: &str,
        lines: &[String],
    ) -> Result<()> {
        let cmd = self
            .command([
                "vm",
                "run-command",
                "invoke",
                "--resource-group",
                resource_group,
                "--name",
                vm,
                "--command-id",
                "RunShellScript",
                "--scripts",
            ])
            .args(lines);
        let out = self.az(cmd).await.map_err(|e| match e {
            Error::ProvisioningFailure(msg) => Error::ApplyFailure(msg),
            e => e,
        })?;
        log_run_command_output(vm, &out);
        Ok(())
    }
}
