//! Infrastructure implementation of the `CloudProvisioner` port.
//!
//! `AwsCliProvisioner<R>` routes every `kubectl` and `aws` call through a
//! `CommandRunner`, so tests can inject a scripted runner without spawning
//! real processes or touching a cloud account.

use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::application::ports::{CloudProvisioner, CommandRunner};
use crate::domain::cloud::{
    ClusterInfo, Subnet, parse_created_security_group, parse_first_security_group,
    parse_first_subnet, parse_infrastructure, parse_launched_instance, parse_password,
    parse_public_ip,
};
use crate::domain::config::{RDP_PORT, SSH_PORT, WINRM_HTTPS_PORT};
use crate::domain::{Credentials, ProvisionConfig, VmRecord};
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, TokioCommandRunner, WAITER_TIMEOUT};
use crate::infra::network::{self, CHECK_IP_URL};
use crate::infra::vm_record::VmRecordStore;

/// Ports opened to the allowed CIDR on the VM's own security group.
const INGRESS_PORTS: [u16; 3] = [SSH_PORT, WINRM_HTTPS_PORT, RDP_PORT];

/// User data run by EC2Launch on first boot: a self-signed WinRM HTTPS
/// listener with Basic auth, and the OpenSSH server capability.
const USER_DATA: &str = r#"<powershell>
$cert = New-SelfSignedCertificate -DnsName $env:COMPUTERNAME -CertStoreLocation Cert:\LocalMachine\My
New-Item -Path WSMan:\LocalHost\Listener -Transport HTTPS -Address * -CertificateThumbPrint $cert.Thumbprint -Force
Set-Item -Path WSMan:\localhost\Service\Auth\Basic -Value $true
New-NetFirewallRule -DisplayName 'WinRM HTTPS' -Direction Inbound -Protocol TCP -LocalPort 5986 -Action Allow
Add-WindowsCapability -Online -Name OpenSSH.Server~~~~0.0.1.0
New-NetFirewallRule -DisplayName 'OpenSSH Server' -Direction Inbound -Protocol TCP -LocalPort 22 -Action Allow
</powershell>"#;

/// How long to wait for EC2 to generate the Administrator password.
#[derive(Debug, Clone, Copy)]
pub struct PasswordPoll {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PasswordPoll {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(900),
            interval: Duration::from_secs(15),
        }
    }
}

/// Infrastructure adapter that drives `kubectl` and the AWS CLI.
///
/// Resources created through this value are tracked in memory and mirrored
/// to the record file. `destroy_windows_vms` only ever acts on the in-memory
/// record; the file exists so `cleanup` can finish the job after a crash.
pub struct AwsCliProvisioner<R: CommandRunner> {
    runner: R,
    config: ProvisionConfig,
    store: VmRecordStore,
    password_poll: PasswordPoll,
    created: Mutex<Option<VmRecord>>,
}

impl<R: CommandRunner> AwsCliProvisioner<R> {
    pub fn new(runner: R, config: ProvisionConfig) -> Self {
        let store = VmRecordStore::new(config.record_path());
        Self {
            runner,
            config,
            store,
            password_poll: PasswordPoll::default(),
            created: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_password_poll(mut self, poll: PasswordPoll) -> Self {
        self.password_poll = poll;
        self
    }

    #[must_use]
    pub fn store(&self) -> &VmRecordStore {
        &self.store
    }

    /// Take over the resources named in the record file, so the next
    /// `destroy_windows_vms` removes them. Returns the adopted record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record file exists but cannot be read.
    pub async fn adopt_recorded(&self) -> Result<Option<VmRecord>> {
        let record = self.store.load().await?;
        if let Some(record) = &record {
            tracing::info!(?record, "adopting recorded resources");
        }
        self.created.lock().await.clone_from(&record);
        Ok(record)
    }

    /// Remember `record` as this run's resources and persist it.
    async fn track(&self, record: &VmRecord) -> Result<()> {
        *self.created.lock().await = Some(record.clone());
        self.store.save(record).await
    }

    /// Fail when an earlier run left resources behind. Overwriting its
    /// record would orphan them.
    async fn ensure_no_leftovers(&self) -> Result<()> {
        match self.store.load().await? {
            Some(stale) if !stale.is_empty() => anyhow::bail!(
                "{} still lists {} from an earlier run; run `winvm-e2e cleanup` first",
                self.store.path().display(),
                describe_record(&stale)
            ),
            _ => Ok(()),
        }
    }

    async fn destroy_record(&self, mut record: VmRecord) -> Result<()> {
        if !record.instance_ids.is_empty() {
            let ids: Vec<&str> = record.instance_ids.iter().map(String::as_str).collect();
            let mut terminate = vec!["ec2", "terminate-instances", "--instance-ids"];
            terminate.extend_from_slice(&ids);
            self.aws(&record.region, &terminate).await?;
            let mut wait = vec!["ec2", "wait", "instance-terminated", "--instance-ids"];
            wait.extend_from_slice(&ids);
            self.aws_with_timeout(&record.region, &wait, WAITER_TIMEOUT)
                .await?;
            tracing::info!(instances = ?record.instance_ids, "instances terminated");
            record.instance_ids.clear();
            self.track(&record).await?;
        }
        if let Some(group_id) = record.security_group_id.clone() {
            self.aws(
                &record.region,
                &["ec2", "delete-security-group", "--group-id", &group_id],
            )
            .await?;
            tracing::info!(security_group = %group_id, "security group deleted");
        }
        *self.created.lock().await = None;
        self.store.clear().await
    }

    async fn kubectl(&self, args: &[&str]) -> Result<Vec<u8>> {
        let kubeconfig = self.config.kubeconfig.to_string_lossy();
        let mut full = vec!["--kubeconfig", &*kubeconfig];
        full.extend_from_slice(args);
        let output = self
            .runner
            .run("kubectl", &full)
            .await
            .with_context(|| format!("kubectl {}", args.join(" ")))?;
        stdout_if_success(output, "kubectl", args)
    }

    async fn aws(&self, region: &str, args: &[&str]) -> Result<Vec<u8>> {
        self.aws_with_timeout(region, args, DEFAULT_CMD_TIMEOUT).await
    }

    async fn aws_with_timeout(
        &self,
        region: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let mut full = vec![
            "--region",
            region,
            "--profile",
            self.config.aws_profile.as_str(),
            "--output",
            "json",
        ];
        full.extend_from_slice(args);
        let output = self
            .runner
            .run_with_timeout("aws", &full, timeout)
            .await
            .with_context(|| format!("aws {}", args.join(" ")))?;
        stdout_if_success(output, "aws", args)
    }

    async fn discover_cluster(&self) -> Result<ClusterInfo> {
        let stdout = self
            .kubectl(&["get", "infrastructure", "cluster", "-o", "json"])
            .await?;
        let cluster = parse_infrastructure(&stdout)?;
        tracing::info!(infra = %cluster.infra_name, region = %cluster.region, "cluster discovered");
        Ok(cluster)
    }

    async fn find_public_subnet(&self, cluster: &ClusterInfo) -> Result<Subnet> {
        let tag_filter = format!("Name=tag-key,Values={}", cluster.ownership_tag());
        let stdout = self
            .aws(
                &cluster.region,
                &[
                    "ec2",
                    "describe-subnets",
                    "--filters",
                    &tag_filter,
                    "Name=map-public-ip-on-launch,Values=true",
                ],
            )
            .await?;
        let subnet = parse_first_subnet(&stdout)?;
        tracing::info!(subnet = %subnet.subnet_id, vpc = %subnet.vpc_id, "public subnet selected");
        Ok(subnet)
    }

    async fn find_worker_security_group(
        &self,
        cluster: &ClusterInfo,
        vpc_id: &str,
    ) -> Result<String> {
        let name_filter = format!(
            "Name=tag:Name,Values={}",
            cluster.worker_security_group_name()
        );
        let vpc_filter = format!("Name=vpc-id,Values={vpc_id}");
        let stdout = self
            .aws(
                &cluster.region,
                &[
                    "ec2",
                    "describe-security-groups",
                    "--filters",
                    &name_filter,
                    &vpc_filter,
                ],
            )
            .await?;
        parse_first_security_group(&stdout)
    }

    async fn allowed_cidr(&self) -> Result<String> {
        match &self.config.allowed_cidr {
            Some(cidr) => Ok(cidr.clone()),
            None => network::caller_cidr(CHECK_IP_URL)
                .await
                .context("resolving the caller's public IP for the security group"),
        }
    }

    async fn create_vm_security_group(
        &self,
        cluster: &ClusterInfo,
        vpc_id: &str,
        name: &str,
        record: &mut VmRecord,
    ) -> Result<String> {
        let stdout = self
            .aws(
                &cluster.region,
                &[
                    "ec2",
                    "create-security-group",
                    "--group-name",
                    name,
                    "--description",
                    "Windows VM e2e remote access",
                    "--vpc-id",
                    vpc_id,
                ],
            )
            .await?;
        let group_id = parse_created_security_group(&stdout)?;
        record.security_group_id = Some(group_id.clone());
        self.track(record).await?;
        tracing::info!(security_group = %group_id, "security group created");

        let cidr = self.allowed_cidr().await?;
        for port in INGRESS_PORTS {
            let port = port.to_string();
            self.aws(
                &cluster.region,
                &[
                    "ec2",
                    "authorize-security-group-ingress",
                    "--group-id",
                    &group_id,
                    "--protocol",
                    "tcp",
                    "--port",
                    &port,
                    "--cidr",
                    &cidr,
                ],
            )
            .await?;
        }
        tracing::info!(%cidr, ports = ?INGRESS_PORTS, "ingress authorized");
        Ok(group_id)
    }

    async fn launch_instance(
        &self,
        cluster: &ClusterInfo,
        subnet: &Subnet,
        security_groups: [&str; 2],
        name: &str,
        record: &mut VmRecord,
    ) -> Result<String> {
        let tags = format!("ResourceType=instance,Tags=[{{Key=Name,Value={name}}}]");
        let stdout = self
            .aws(
                &cluster.region,
                &[
                    "ec2",
                    "run-instances",
                    "--image-id",
                    &self.config.image_id,
                    "--instance-type",
                    &self.config.instance_type,
                    "--key-name",
                    &self.config.ssh_key_name,
                    "--subnet-id",
                    &subnet.subnet_id,
                    "--security-group-ids",
                    security_groups[0],
                    security_groups[1],
                    "--count",
                    "1",
                    "--user-data",
                    USER_DATA,
                    "--tag-specifications",
                    &tags,
                ],
            )
            .await?;
        let instance_id = parse_launched_instance(&stdout)?;
        record.instance_ids.push(instance_id.clone());
        self.track(record).await?;
        tracing::info!(instance = %instance_id, "instance launched");
        Ok(instance_id)
    }

    async fn public_ip(&self, region: &str, instance_id: &str) -> Result<String> {
        self.aws_with_timeout(
            region,
            &["ec2", "wait", "instance-running", "--instance-ids", instance_id],
            WAITER_TIMEOUT,
        )
        .await?;
        let stdout = self
            .aws(
                region,
                &["ec2", "describe-instances", "--instance-ids", instance_id],
            )
            .await?;
        parse_public_ip(&stdout, instance_id)
    }

    async fn administrator_password(&self, region: &str, instance_id: &str) -> Result<String> {
        let key = self.config.private_key.to_string_lossy();
        let deadline = tokio::time::Instant::now() + self.password_poll.timeout;
        loop {
            let stdout = self
                .aws(
                    region,
                    &[
                        "ec2",
                        "get-password-data",
                        "--instance-id",
                        instance_id,
                        "--priv-launch-key",
                        &*key,
                    ],
                )
                .await?;
            if let Some(password) = parse_password(&stdout)? {
                return Ok(password);
            }
            if tokio::time::Instant::now() + self.password_poll.interval > deadline {
                anyhow::bail!(
                    "Administrator password for {instance_id} not available after {}s",
                    self.password_poll.timeout.as_secs()
                );
            }
            tracing::debug!(instance = %instance_id, "password not generated yet");
            tokio::time::sleep(self.password_poll.interval).await;
        }
    }
}

impl AwsCliProvisioner<TokioCommandRunner> {
    /// Production constructor: the runner exports the AWS credentials file
    /// to every spawned CLI.
    #[must_use]
    pub fn from_config(config: ProvisionConfig) -> Self {
        let runner = TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT)
            .with_env("AWS_SHARED_CREDENTIALS_FILE", &config.aws_credentials);
        Self::new(runner, config)
    }
}

impl<R: CommandRunner> CloudProvisioner for AwsCliProvisioner<R> {
    async fn create_windows_vm(&self) -> Result<Credentials> {
        self.ensure_no_leftovers().await?;
        let cluster = self.discover_cluster().await?;
        let subnet = self.find_public_subnet(&cluster).await?;
        let worker_sg = self
            .find_worker_security_group(&cluster, &subnet.vpc_id)
            .await?;

        let name = cluster.resource_name(&run_suffix());
        let mut record = VmRecord::new(cluster.region.clone());
        let vm_sg = self
            .create_vm_security_group(&cluster, &subnet.vpc_id, &name, &mut record)
            .await?;
        let instance_id = self
            .launch_instance(
                &cluster,
                &subnet,
                [worker_sg.as_str(), vm_sg.as_str()],
                &name,
                &mut record,
            )
            .await?;

        let address = self.public_ip(&cluster.region, &instance_id).await?;
        let password = self
            .administrator_password(&cluster.region, &instance_id)
            .await?;
        tracing::info!(instance = %instance_id, %address, "Windows VM reachable");
        Ok(Credentials::new(address, password))
    }

    async fn destroy_windows_vms(&self) -> Result<()> {
        let created = self.created.lock().await.clone();
        let Some(record) = created else {
            tracing::info!("no resources created by this run; nothing to destroy");
            return Ok(());
        };
        self.destroy_record(record).await
    }
}

/// Short random suffix keeping resource names of concurrent runs apart.
fn run_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn stdout_if_success(output: Output, program: &str, args: &[&str]) -> Result<Vec<u8>> {
    if output.status.success() {
        return Ok(output.stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!(
        "{program} {} exited with {}: {}",
        args.iter().take(2).copied().collect::<Vec<_>>().join(" "),
        output.status,
        stderr.trim()
    )
}

/// One-line summary of a record, shown by the `cleanup` command.
#[must_use]
pub fn describe_record(record: &VmRecord) -> String {
    let mut parts: Vec<String> = record.instance_ids.clone();
    if let Some(sg) = &record.security_group_id {
        parts.push(sg.clone());
    }
    if parts.is_empty() {
        "nothing".to_string()
    } else {
        format!("{} in {}", parts.join(", "), record.region)
    }
}
