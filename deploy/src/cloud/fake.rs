//! In-memory EC2 used by the orchestrator tests.
//!
//! Every describe call advances transitional states by one step, so wait
//! loops observe pending -> running and shutting-down -> terminated the way
//! they would against the real service. Deleting an attached volume fails
//! with `VolumeInUse`, like EC2 does.

use super::{Ec2Api, Filter, Instance, InstanceState, RunInstancesRequest, Volume, VolumeAttachment};
use crate::error::{DeployError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct State {
    next_id: u32,
    instances: BTreeMap<String, Instance>,
    volumes: BTreeMap<String, Volume>,
    addresses: Vec<String>,
    calls: Vec<String>,
    launches: Vec<RunInstancesRequest>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:08x}", prefix, self.next_id)
    }

    fn advance(&mut self) {
        for instance in self.instances.values_mut() {
            match instance.state {
                InstanceState::Pending => {
                    instance.state = InstanceState::Running;
                    instance.public_dns_name = format!("{}.compute-1.amazonaws.com", instance.id);
                }
                InstanceState::ShuttingDown => instance.state = InstanceState::Terminated,
                _ => {}
            }
        }

        let terminated: Vec<String> = self
            .instances
            .values()
            .filter(|i| i.state == InstanceState::Terminated)
            .map(|i| i.id.clone())
            .collect();
        for volume in self.volumes.values_mut() {
            let Some(attachment) = volume.attachment.as_mut() else {
                continue;
            };
            if attachment.status == "detaching" {
                volume.attachment = None;
                volume.status = "available".to_string();
            } else if terminated.contains(&attachment.instance_id) {
                attachment.status = "detaching".to_string();
            }
        }
    }
}

fn matches_tags(tags: &HashMap<String, String>, filter: &Filter) -> bool {
    filter
        .name
        .strip_prefix("tag:")
        .and_then(|key| tags.get(key))
        .is_some_and(|value| filter.values.contains(value))
}

fn instance_matches(instance: &Instance, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches_tags(&instance.tags, filter))
}

fn volume_matches(volume: &Volume, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter.name.as_str() {
        "attachment.instance-id" => volume
            .attachment
            .as_ref()
            .is_some_and(|a| filter.values.contains(&a.instance_id)),
        _ => matches_tags(&volume.tags, filter),
    })
}

#[derive(Default)]
pub struct FakeEc2 {
    state: Mutex<State>,
}

impl FakeEc2 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addresses(addresses: &[&str]) -> Self {
        let fake = Self::new();
        fake.state.lock().addresses = addresses.iter().map(|a| a.to_string()).collect();
        fake
    }

    /// Names of the mutating calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn launches(&self) -> Vec<RunInstancesRequest> {
        self.state.lock().launches.clone()
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.state.lock().instances.get(id).cloned()
    }

    pub fn volume(&self, id: &str) -> Option<Volume> {
        self.state.lock().volumes.get(id).cloned()
    }

    pub fn set_ip_address(&self, instance_id: &str, ip: &str) {
        if let Some(instance) = self.state.lock().instances.get_mut(instance_id) {
            instance.ip_address = Some(ip.to_string());
        }
    }
}

#[async_trait]
impl Ec2Api for FakeEc2 {
    async fn run_instances(&self, request: &RunInstancesRequest) -> Result<Vec<Instance>> {
        let mut state = self.state.lock();
        state.calls.push("RunInstances".to_string());
        state.launches.push(request.clone());

        let mut launched = Vec::new();
        for n in 0..request.count {
            let instance = Instance {
                id: state.next_id("i"),
                state: InstanceState::Pending,
                instance_type: request.instance_type.clone(),
                public_dns_name: String::new(),
                ip_address: None,
                availability_zone: if n % 2 == 0 { "us-east-1b" } else { "us-east-1c" }.to_string(),
                tags: HashMap::new(),
            };
            state.instances.insert(instance.id.clone(), instance.clone());
            launched.push(instance);
        }
        Ok(launched)
    }

    async fn describe_instances(&self, filters: &[Filter], instance_ids: &[String]) -> Result<Vec<Instance>> {
        let mut state = self.state.lock();
        state.advance();
        Ok(state
            .instances
            .values()
            .filter(|i| instance_ids.is_empty() || instance_ids.contains(&i.id))
            .filter(|i| instance_matches(i, filters))
            .cloned()
            .collect())
    }

    async fn create_tags(&self, resource_ids: &[String], key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("CreateTags".to_string());
        for id in resource_ids {
            if let Some(instance) = state.instances.get_mut(id) {
                instance.tags.insert(key.to_string(), value.to_string());
            } else if let Some(volume) = state.volumes.get_mut(id) {
                volume.tags.insert(key.to_string(), value.to_string());
            } else {
                return Err(DeployError::NotFound(id.clone()));
            }
        }
        Ok(())
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("TerminateInstances".to_string());
        for id in instance_ids {
            let instance = state
                .instances
                .get_mut(id)
                .ok_or_else(|| DeployError::NotFound(id.clone()))?;
            if instance.state != InstanceState::Terminated {
                instance.state = InstanceState::ShuttingDown;
            }
        }
        Ok(())
    }

    async fn describe_volumes(&self, filters: &[Filter], volume_ids: &[String]) -> Result<Vec<Volume>> {
        let mut state = self.state.lock();
        state.advance();
        Ok(state
            .volumes
            .values()
            .filter(|v| volume_ids.is_empty() || volume_ids.contains(&v.id))
            .filter(|v| volume_matches(v, filters))
            .cloned()
            .collect())
    }

    async fn create_volume(
        &self,
        size_gb: u32,
        availability_zone: &str,
        _snapshot_id: Option<&str>,
    ) -> Result<Volume> {
        let mut state = self.state.lock();
        state.calls.push("CreateVolume".to_string());
        let volume = Volume {
            id: state.next_id("vol"),
            size_gb,
            availability_zone: availability_zone.to_string(),
            status: "available".to_string(),
            attachment: None,
            tags: HashMap::new(),
        };
        state.volumes.insert(volume.id.clone(), volume.clone());
        Ok(volume)
    }

    async fn attach_volume(&self, volume_id: &str, instance_id: &str, device: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("AttachVolume".to_string());
        if !state.instances.contains_key(instance_id) {
            return Err(DeployError::NotFound(instance_id.to_string()));
        }
        let volume = state
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| DeployError::NotFound(volume_id.to_string()))?;
        volume.status = "in-use".to_string();
        volume.attachment = Some(VolumeAttachment {
            instance_id: instance_id.to_string(),
            device: device.to_string(),
            status: "attached".to_string(),
        });
        Ok(())
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("DeleteVolume".to_string());
        let volume = state
            .volumes
            .get(volume_id)
            .ok_or_else(|| DeployError::NotFound(volume_id.to_string()))?;
        if volume.attachment.is_some() {
            return Err(DeployError::Api {
                status: 400,
                code: "VolumeInUse".to_string(),
                message: format!("{} is attached", volume_id),
            });
        }
        state.volumes.remove(volume_id);
        Ok(())
    }

    async fn describe_addresses(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().addresses.clone())
    }
}
