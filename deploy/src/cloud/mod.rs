//! EC2 resources and the API surface the orchestrator drives.

mod query_client;
mod signing;
mod xml;

#[cfg(test)]
pub(crate) mod fake;

pub use query_client::QueryClient;
pub use signing::Credentials;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InstanceState::Pending),
            "running" => Ok(InstanceState::Running),
            "shutting-down" => Ok(InstanceState::ShuttingDown),
            "terminated" => Ok(InstanceState::Terminated),
            "stopping" => Ok(InstanceState::Stopping),
            "stopped" => Ok(InstanceState::Stopped),
            other => Err(format!("unknown instance state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: String,
    pub state: InstanceState,
    pub instance_type: String,
    /// Empty until the instance is running
    pub public_dns_name: String,
    pub ip_address: Option<String>,
    pub availability_zone: String,
    pub tags: HashMap<String, String>,
}

impl Instance {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeAttachment {
    pub instance_id: String,
    pub device: String,
    /// attaching, attached, detaching
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub id: String,
    pub size_gb: u32,
    pub availability_zone: String,
    /// creating, available, in-use, deleting
    pub status: String,
    pub attachment: Option<VolumeAttachment>,
    pub tags: HashMap<String, String>,
}

impl Volume {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Attachment status, `None` once the volume is fully detached.
    pub fn attachment_state(&self) -> Option<&str> {
        self.attachment.as_ref().map(|a| a.status.as_str())
    }

    pub fn is_attached_to(&self, instance_id: &str, device: &str) -> bool {
        self.attachment
            .as_ref()
            .is_some_and(|a| a.instance_id == instance_id && a.device == device)
    }
}

/// Server-side filter, e.g. `tag:Name = web`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn tag(key: &str, value: &str) -> Self {
        Self {
            name: format!("tag:{}", key),
            values: vec![value.to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunInstancesRequest {
    pub image_id: String,
    pub count: u32,
    pub key_name: String,
    pub security_groups: Vec<String>,
    pub user_data: String,
    pub instance_type: String,
}

/// The EC2 calls the orchestrator needs. Every error is returned as is;
/// implementations never retry.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    /// Launch exactly `request.count` instances.
    async fn run_instances(&self, request: &RunInstancesRequest) -> Result<Vec<Instance>>;

    /// Instances matching all filters; empty `instance_ids` means any.
    /// Recently terminated instances are included.
    async fn describe_instances(&self, filters: &[Filter], instance_ids: &[String]) -> Result<Vec<Instance>>;

    async fn create_tags(&self, resource_ids: &[String], key: &str, value: &str) -> Result<()>;

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()>;

    async fn describe_volumes(&self, filters: &[Filter], volume_ids: &[String]) -> Result<Vec<Volume>>;

    async fn create_volume(
        &self,
        size_gb: u32,
        availability_zone: &str,
        snapshot_id: Option<&str>,
    ) -> Result<Volume>;

    async fn attach_volume(&self, volume_id: &str, instance_id: &str, device: &str) -> Result<()>;

    async fn delete_volume(&self, volume_id: &str) -> Result<()>;

    /// Public IPs of the account's Elastic IP addresses.
    async fn describe_addresses(&self) -> Result<Vec<String>>;
}
