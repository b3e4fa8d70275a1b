//! Instance and volume lifecycle on top of [`Ec2Api`].
//!
//! Every wait loop polls at a fixed interval and has no deadline; API errors
//! are never retried.

use crate::cloud::{Ec2Api, Filter, Instance, InstanceState, RunInstancesRequest, Volume};
use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What `stack start` brought up.
#[derive(Debug, Clone)]
pub struct Stack {
    pub instance: Instance,
    pub volume: Volume,
}

pub struct Orchestrator<C> {
    client: C,
    config: DeployConfig,
    poll_interval: Duration,
}

impl<C: Ec2Api> Orchestrator<C> {
    pub fn new(client: C, config: DeployConfig) -> Self {
        let poll_interval = config.poll_interval();
        Self {
            client,
            config,
            poll_interval,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    fn filters(&self, tag: Option<&str>) -> Vec<Filter> {
        tag.map(|tag| vec![Filter::tag(&self.config.tag_name, tag)])
            .unwrap_or_default()
    }

    /// Launch `count` instances, wait until they run, then tag them.
    #[instrument(skip(self))]
    pub async fn run(&self, tag: &str, count: u32, instance_type: &str) -> Result<Vec<Instance>> {
        if count == 0 {
            return Err(DeployError::InvalidArgument(
                "instance count must be at least 1".to_string(),
            ));
        }

        info!("Launching {} {} ...", count, instance_type);
        let request = RunInstancesRequest {
            image_id: self.config.ami.clone(),
            count,
            key_name: self.config.key_pair.clone(),
            security_groups: self.config.security_groups.clone(),
            user_data: self.config.user_data.clone(),
            instance_type: instance_type.to_string(),
        };
        let launched = self.client.run_instances(&request).await?;
        let ids: Vec<String> = launched.iter().map(|i| i.id.clone()).collect();

        self.wait_for_instances(&ids, InstanceState::Running).await?;
        self.client
            .create_tags(&ids, &self.config.tag_name, tag)
            .await?;

        self.client.describe_instances(&[], &ids).await
    }

    /// Instances that are not terminated, optionally restricted to `tag`.
    pub async fn instances(&self, tag: Option<&str>) -> Result<Vec<Instance>> {
        let instances = self
            .client
            .describe_instances(&self.filters(tag), &[])
            .await?;
        Ok(instances
            .into_iter()
            .filter(|i| i.state != InstanceState::Terminated)
            .collect())
    }

    pub async fn volumes(&self, tag: Option<&str>) -> Result<Vec<Volume>> {
        self.client.describe_volumes(&self.filters(tag), &[]).await
    }

    /// Number of live instances in each state.
    pub async fn status(&self, tag: Option<&str>) -> Result<BTreeMap<InstanceState, usize>> {
        let mut states = BTreeMap::new();
        for instance in self.instances(tag).await? {
            *states.entry(instance.state).or_insert(0) += 1;
        }
        Ok(states)
    }

    /// Create a volume in `zone` and tag it.
    #[instrument(skip(self))]
    pub async fn add_volume(
        &self,
        tag: &str,
        zone: &str,
        size_gb: u32,
        snapshot_id: Option<&str>,
    ) -> Result<Volume> {
        info!("Creating {}GB volume in {} ...", size_gb, zone);
        let mut volume = self
            .client
            .create_volume(size_gb, zone, snapshot_id)
            .await?;
        self.client
            .create_tags(std::slice::from_ref(&volume.id), &self.config.tag_name, tag)
            .await?;
        volume
            .tags
            .insert(self.config.tag_name.clone(), tag.to_string());
        Ok(volume)
    }

    /// The volume must live in the instance's availability zone.
    #[instrument(skip(self))]
    pub async fn attach_volume(&self, instance_id: &str, volume_id: &str, device: &str) -> Result<()> {
        info!("Attaching {} to {} ...", volume_id, instance_id);
        self.client
            .attach_volume(volume_id, instance_id, device)
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.client.delete_volume(volume_id).await
    }

    /// Volume attached to `instance_id` at `device`.
    pub async fn instance_volume(&self, instance_id: &str, device: &str) -> Result<Option<Volume>> {
        let filters = [Filter {
            name: "attachment.instance-id".to_string(),
            values: vec![instance_id.to_string()],
        }];
        let volumes = self.client.describe_volumes(&filters, &[]).await?;
        Ok(volumes
            .into_iter()
            .find(|v| v.is_attached_to(instance_id, device)))
    }

    /// Terminate the matching instances, then delete their data volumes once
    /// they have detached. Returns the ids of the terminated instances.
    #[instrument(skip(self))]
    pub async fn terminate(&self, tag: Option<&str>) -> Result<Vec<String>> {
        let instances = self.instances(tag).await?;
        if instances.is_empty() {
            info!("No instances to terminate");
            return Ok(Vec::new());
        }

        let elastic_ips = self.client.describe_addresses().await?;
        let mut ids = Vec::with_capacity(instances.len());
        let mut volumes = Vec::new();
        for instance in &instances {
            ids.push(instance.id.clone());
            if let Some(volume) = self
                .instance_volume(&instance.id, &self.config.volume_device)
                .await?
            {
                volumes.push(volume);
            }
            if let Some(ip) = &instance.ip_address {
                if elastic_ips.contains(ip) {
                    warn!("Elastic IP {} mapped to {}", ip, instance.id);
                }
            }
        }

        info!("Terminating {} instances ...", ids.len());
        self.client.terminate_instances(&ids).await?;
        self.wait_for_instances(&ids, InstanceState::Terminated)
            .await?;

        for volume in volumes {
            let device = volume
                .attachment
                .as_ref()
                .map(|a| a.device.as_str())
                .unwrap_or("-");
            info!("Deleting {} ({}) ...", volume.id, device);
            self.wait_for_detached(&volume.id).await?;
            self.client.delete_volume(&volume.id).await?;
        }
        Ok(ids)
    }

    /// Poll until every instance in `ids` reports `state`.
    async fn wait_for_instances(&self, ids: &[String], state: InstanceState) -> Result<()> {
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let instances = self.client.describe_instances(&[], ids).await?;
            let pending = instances.iter().filter(|i| i.state != state).count();
            if pending == 0 && instances.len() >= ids.len() {
                return Ok(());
            }
            debug!("Waiting for {} of {} instances to be {}", pending, ids.len(), state);
        }
    }

    async fn wait_for_detached(&self, volume_id: &str) -> Result<()> {
        let ids = [volume_id.to_string()];
        loop {
            let volume = self
                .client
                .describe_volumes(&[], &ids)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DeployError::NotFound(volume_id.to_string()))?;
            match volume.attachment_state() {
                None => return Ok(()),
                Some(state) => debug!("Volume {} is {}", volume_id, state),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Launch the application instance and attach a fresh database volume.
    #[instrument(skip(self))]
    pub async fn start_stack(&self, volume_size_gb: u32) -> Result<Stack> {
        let instance = self
            .run(&self.config.app_name, 1, &self.config.stack_instance_type)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::UnexpectedResponse("no instance launched".to_string()))?;

        let volume = self
            .add_volume(
                &self.config.stack_volume_tag(),
                &instance.availability_zone,
                volume_size_gb,
                None,
            )
            .await?;
        self.attach_volume(&instance.id, &volume.id, &self.config.volume_device)
            .await?;

        Ok(Stack { instance, volume })
    }

    pub async fn kill_stack(&self) -> Result<Vec<String>> {
        self.terminate(Some(&self.config.app_name)).await
    }

    /// Application instances and database volumes.
    pub async fn stack_listing(&self) -> Result<(Vec<Instance>, Vec<Volume>)> {
        let instances = self.instances(Some(&self.config.app_name)).await?;
        let volumes = self.volumes(Some(&self.config.stack_volume_tag())).await?;
        Ok((instances, volumes))
    }
}

/// One listing line per instance: name tag, public DNS name, id.
pub fn instance_lines(instances: &[Instance], tag_name: &str) -> Vec<String> {
    if instances.is_empty() {
        return vec!["\tNo running instances.".to_string()];
    }
    instances
        .iter()
        .map(|i| {
            format!(
                "\t{:25} {:50} {:15}",
                i.tag(tag_name).unwrap_or(""),
                i.public_dns_name,
                i.id
            )
        })
        .collect()
}

/// One listing line per volume: name tag (root when untagged), size, id,
/// attachment state, instance, device.
pub fn volume_lines(volumes: &[Volume], tag_name: &str) -> Vec<String> {
    if volumes.is_empty() {
        return vec!["\tNone.".to_string()];
    }
    volumes
        .iter()
        .map(|v| {
            let attachment = v.attachment.as_ref();
            format!(
                "\t{:25} {:2}GB {:15} {:15} {} {}",
                v.tag(tag_name).unwrap_or("root"),
                v.size_gb,
                v.id,
                v.attachment_state().unwrap_or("-"),
                attachment.map(|a| a.instance_id.as_str()).unwrap_or("-"),
                attachment.map(|a| a.device.as_str()).unwrap_or("-"),
            )
        })
        .collect()
}

pub fn status_lines(states: &BTreeMap<InstanceState, usize>) -> Vec<String> {
    if states.is_empty() {
        return vec!["\tNone.".to_string()];
    }
    states
        .iter()
        .map(|(state, count)| format!("\t{} {}", state, count))
        .collect()
}
