//! Shapes of the EC2 Query API XML responses, decoded with quick-xml's serde support.
//!
//! Only the elements the orchestrator reads are declared; everything else
//! in a response is skipped.

use super::{Instance, InstanceState, Volume, VolumeAttachment};
use serde::Deserialize;
use std::collections::HashMap;

/// EC2 wraps every list in `<xxxSet><item>..</item></xxxSet>`.
#[derive(Debug, Deserialize)]
pub struct ItemSet<T> {
    #[serde(rename = "item", default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
pub struct Tag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

fn tag_map(tags: ItemSet<Tag>) -> HashMap<String, String> {
    tags.items.into_iter().map(|t| (t.key, t.value)).collect()
}

#[derive(Debug, Deserialize)]
pub struct StateName {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    #[serde(default)]
    pub availability_zone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceItem {
    pub instance_id: String,
    pub instance_state: StateName,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub dns_name: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub tag_set: ItemSet<Tag>,
}

impl InstanceItem {
    pub fn into_instance(self) -> Result<Instance, String> {
        Ok(Instance {
            id: self.instance_id,
            state: self.instance_state.name.parse::<InstanceState>()?,
            instance_type: self.instance_type,
            public_dns_name: self.dns_name,
            ip_address: self.ip_address.filter(|ip| !ip.is_empty()),
            availability_zone: self.placement.availability_zone,
            tags: tag_map(self.tag_set),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    #[serde(default)]
    pub instances_set: ItemSet<InstanceItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeInstancesResponse {
    #[serde(default)]
    pub reservation_set: ItemSet<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInstancesResponse {
    #[serde(default)]
    pub instances_set: ItemSet<InstanceItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentItem {
    pub instance_id: String,
    pub device: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeItem {
    pub volume_id: String,
    pub size: u32,
    #[serde(default)]
    pub availability_zone: String,
    pub status: String,
    #[serde(default)]
    pub attachment_set: ItemSet<AttachmentItem>,
    #[serde(default)]
    pub tag_set: ItemSet<Tag>,
}

impl VolumeItem {
    pub fn into_volume(self) -> Volume {
        let attachment = self
            .attachment_set
            .items
            .into_iter()
            .next()
            .map(|a| VolumeAttachment {
                instance_id: a.instance_id,
                device: a.device,
                status: a.status,
            });
        Volume {
            id: self.volume_id,
            size_gb: self.size,
            availability_zone: self.availability_zone,
            status: self.status,
            attachment,
            tags: tag_map(self.tag_set),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeVolumesResponse {
    #[serde(default)]
    pub volume_set: ItemSet<VolumeItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeResponse {
    pub volume_id: String,
    pub size: u32,
    #[serde(default)]
    pub availability_zone: String,
    pub status: String,
}

impl CreateVolumeResponse {
    pub fn into_volume(self) -> Volume {
        Volume {
            id: self.volume_id,
            size_gb: self.size,
            availability_zone: self.availability_zone,
            status: self.status,
            attachment: None,
            tags: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressItem {
    pub public_ip: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeAddressesResponse {
    #[serde(default)]
    pub addresses_set: ItemSet<AddressItem>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Errors")]
    pub errors: ErrorList,
}

#[derive(Debug, Deserialize)]
pub struct ErrorList {
    #[serde(rename = "Error", default = "Vec::new")]
    pub errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorItem {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}
