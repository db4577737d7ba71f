//! Cloud-side domain types: cluster discovery results, CLI JSON payloads,
//! and the persisted record of resources created by a run.
//!
//! This module is intentionally free of I/O. Parsers take the raw stdout of
//! `kubectl` / `aws` and return typed values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ── Cluster ──────────────────────────────────────────────────────────────────

/// The OpenShift cluster the Windows VM joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Infrastructure name, used as the prefix of every AWS tag.
    pub infra_name: String,
    pub region: String,
}

impl ClusterInfo {
    /// Tag key AWS resources of this cluster carry.
    #[must_use]
    pub fn ownership_tag(&self) -> String {
        format!("kubernetes.io/cluster/{}", self.infra_name)
    }

    /// `Name` tag of the cluster's worker security group.
    #[must_use]
    pub fn worker_security_group_name(&self) -> String {
        format!("{}-worker-sg", self.infra_name)
    }

    /// Name given to resources created for this run.
    #[must_use]
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}-winvm-{suffix}", self.infra_name)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Infrastructure {
    status: InfrastructureStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfrastructureStatus {
    infrastructure_name: String,
    platform_status: Option<PlatformStatus>,
}

#[derive(Deserialize)]
struct PlatformStatus {
    aws: Option<AwsPlatformStatus>,
}

#[derive(Deserialize)]
struct AwsPlatformStatus {
    region: String,
}

/// Parse `kubectl get infrastructure cluster -o json`.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or the cluster is not on AWS.
pub fn parse_infrastructure(stdout: &[u8]) -> Result<ClusterInfo> {
    let infra: Infrastructure =
        serde_json::from_slice(stdout).context("parsing cluster infrastructure")?;
    let region = infra
        .status
        .platform_status
        .and_then(|p| p.aws)
        .map(|aws| aws.region)
        .ok_or_else(|| anyhow::anyhow!("cluster is not running on AWS (no platformStatus.aws)"))?;
    anyhow::ensure!(
        !infra.status.infrastructure_name.is_empty(),
        "cluster infrastructure name is empty"
    );
    Ok(ClusterInfo {
        infra_name: infra.status.infrastructure_name,
        region,
    })
}

// ── AWS payloads ─────────────────────────────────────────────────────────────

/// A subnet the VM can be launched into.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subnet {
    pub subnet_id: String,
    pub vpc_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSubnets {
    subnets: Vec<Subnet>,
}

/// First subnet from `aws ec2 describe-subnets`.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or no subnet matched.
pub fn parse_first_subnet(stdout: &[u8]) -> Result<Subnet> {
    let parsed: DescribeSubnets =
        serde_json::from_slice(stdout).context("parsing describe-subnets output")?;
    parsed
        .subnets
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no public subnet found for the cluster"))
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroup {
    group_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroups {
    security_groups: Vec<SecurityGroup>,
}

/// First group id from `aws ec2 describe-security-groups`.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or no group matched.
pub fn parse_first_security_group(stdout: &[u8]) -> Result<String> {
    let parsed: DescribeSecurityGroups =
        serde_json::from_slice(stdout).context("parsing describe-security-groups output")?;
    parsed
        .security_groups
        .into_iter()
        .next()
        .map(|g| g.group_id)
        .ok_or_else(|| anyhow::anyhow!("worker security group not found"))
}

/// Group id from `aws ec2 create-security-group`.
///
/// # Errors
///
/// Returns an error if the JSON is malformed.
pub fn parse_created_security_group(stdout: &[u8]) -> Result<String> {
    let parsed: SecurityGroup =
        serde_json::from_slice(stdout).context("parsing create-security-group output")?;
    Ok(parsed.group_id)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    #[serde(default)]
    public_ip_address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstances {
    instances: Vec<Instance>,
}

/// Instance id from `aws ec2 run-instances`.
///
/// # Errors
///
/// Returns an error unless exactly one instance was launched.
pub fn parse_launched_instance(stdout: &[u8]) -> Result<String> {
    let parsed: RunInstances =
        serde_json::from_slice(stdout).context("parsing run-instances output")?;
    let count = parsed.instances.len();
    match <[Instance; 1]>::try_from(parsed.instances) {
        Ok([instance]) => Ok(instance.instance_id),
        Err(_) => anyhow::bail!("expected exactly one instance, got {count}"),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    instances: Vec<Instance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstances {
    reservations: Vec<Reservation>,
}

/// Public IPv4 address of `instance_id` from `aws ec2 describe-instances`.
///
/// # Errors
///
/// Returns an error if the instance is missing or has no public address.
pub fn parse_public_ip(stdout: &[u8], instance_id: &str) -> Result<String> {
    let parsed: DescribeInstances =
        serde_json::from_slice(stdout).context("parsing describe-instances output")?;
    parsed
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .find(|i| i.instance_id == instance_id)
        .ok_or_else(|| anyhow::anyhow!("instance {instance_id} not found"))?
        .public_ip_address
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| anyhow::anyhow!("instance {instance_id} has no public IP address"))
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PasswordData {
    #[serde(default)]
    password_data: String,
}

/// Decrypted password from `aws ec2 get-password-data --priv-launch-key`.
///
/// Returns `Ok(None)` while EC2 has not generated the password yet.
///
/// # Errors
///
/// Returns an error if the JSON is malformed.
pub fn parse_password(stdout: &[u8]) -> Result<Option<String>> {
    let parsed: PasswordData =
        serde_json::from_slice(stdout).context("parsing get-password-data output")?;
    let password = parsed.password_data.trim();
    Ok((!password.is_empty()).then(|| password.to_string()))
}

// ── VM record ────────────────────────────────────────────────────────────────

/// Cloud resources created by a run, persisted in the artifact directory so
/// `cleanup` can destroy them after a crash. A run refuses to start while a
/// non-empty record is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRecord {
    pub region: String,
    #[serde(default)]
    pub instance_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group_id: Option<String>,
}

impl VmRecord {
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Self::default()
        }
    }

    /// `true` when there is nothing left to destroy.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instance_ids.is_empty() && self.security_group_id.is_none()
    }
}
