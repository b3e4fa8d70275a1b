use super::signing::{self, CanonicalRequest, Credentials, SigningScope, uri_encode};
use super::xml::{
    CreateVolumeResponse, DescribeAddressesResponse, DescribeInstancesResponse,
    DescribeVolumesResponse, ErrorResponse, InstanceItem, RunInstancesResponse, VolumeItem,
};
use super::{Ec2Api, Filter, Instance, RunInstancesRequest, Volume};
use crate::error::{DeployError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

const API_VERSION: &str = "2016-11-15";
const SERVICE: &str = "ec2";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Request parameters in the flattened `Name.N.Field` form the Query API uses.
#[derive(Debug, Default)]
struct Params(Vec<(String, String)>);

impl Params {
    fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    fn push_list(&mut self, prefix: &str, values: &[String]) {
        for (i, value) in values.iter().enumerate() {
            self.push(format!("{}.{}", prefix, i + 1), value.clone());
        }
    }

    fn push_filters(&mut self, filters: &[Filter]) {
        for (i, filter) in filters.iter().enumerate() {
            let prefix = format!("Filter.{}", i + 1);
            self.push(format!("{}.Name", prefix), filter.name.clone());
            self.push_list(&format!("{}.Value", prefix), &filter.values);
        }
    }

    /// Form-encoded request body for `action`.
    fn encode(&self, action: &str) -> String {
        let mut pairs = vec![
            ("Action".to_string(), action.to_string()),
            ("Version".to_string(), API_VERSION.to_string()),
        ];
        pairs.extend(self.0.iter().cloned());
        pairs
            .iter()
            .map(|(name, value)| format!("{}={}", uri_encode(name), uri_encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// EC2 client for one region, speaking the Query API over HTTPS.
pub struct QueryClient {
    http: reqwest::Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: Credentials,
}

impl QueryClient {
    pub fn new(endpoint: &str, region: &str, credentials: Credentials) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| DeployError::Configuration(format!("invalid endpoint {}: {}", endpoint, e)))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(DeployError::Configuration(format!(
                    "endpoint has no host: {}",
                    endpoint
                )));
            }
        };

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            host,
            region: region.to_string(),
            credentials,
        })
    }

    /// Send a signed request and return the raw response body.
    #[instrument(skip(self, params))]
    async fn send(&self, action: &str, params: Params) -> Result<String> {
        let body = params.encode(action);
        let now = Utc::now();

        let mut headers = vec![
            ("content-type".to_string(), FORM_CONTENT_TYPE.to_string()),
            ("host".to_string(), self.host.clone()),
            ("x-amz-date".to_string(), signing::amz_date(now)),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let authorization = signing::authorization(
            &CanonicalRequest {
                method: "POST",
                path: self.endpoint.path(),
                query: "",
                headers: &headers,
                payload: body.as_bytes(),
            },
            &SigningScope {
                credentials: &self.credentials,
                region: &self.region,
                service: SERVICE,
                time: now,
            },
        );

        let mut request = self.http.post(self.endpoint.clone());
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .header("authorization", authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!("{} answered HTTP {}", action, status);

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &text));
        }
        Ok(text)
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, params: Params) -> Result<T> {
        let text = self.send(action, params).await?;
        Ok(quick_xml::de::from_str(&text)?)
    }
}

fn api_error(status: u16, body: &str) -> DeployError {
    match quick_xml::de::from_str::<ErrorResponse>(body) {
        Ok(response) if !response.errors.errors.is_empty() => {
            let error = &response.errors.errors[0];
            DeployError::Api {
                status,
                code: error.code.clone(),
                message: error.message.clone(),
            }
        }
        _ => DeployError::Api {
            status,
            code: "Unknown".to_string(),
            message: body.trim().to_string(),
        },
    }
}

fn into_instances(items: Vec<InstanceItem>) -> Result<Vec<Instance>> {
    items
        .into_iter()
        .map(|item| item.into_instance().map_err(DeployError::UnexpectedResponse))
        .collect()
}

#[async_trait]
impl Ec2Api for QueryClient {
    async fn run_instances(&self, request: &RunInstancesRequest) -> Result<Vec<Instance>> {
        let mut params = Params::default();
        params.push("ImageId", request.image_id.clone());
        params.push("MinCount", request.count.to_string());
        params.push("MaxCount", request.count.to_string());
        params.push("KeyName", request.key_name.clone());
        params.push_list("SecurityGroup", &request.security_groups);
        params.push("UserData", STANDARD.encode(&request.user_data));
        params.push("InstanceType", request.instance_type.clone());

        let response: RunInstancesResponse = self.call("RunInstances", params).await?;
        into_instances(response.instances_set.items)
    }

    async fn describe_instances(&self, filters: &[Filter], instance_ids: &[String]) -> Result<Vec<Instance>> {
        let mut params = Params::default();
        params.push_filters(filters);
        params.push_list("InstanceId", instance_ids);

        let response: DescribeInstancesResponse = self.call("DescribeInstances", params).await?;
        into_instances(
            response
                .reservation_set
                .items
                .into_iter()
                .flat_map(|r| r.instances_set.items)
                .collect(),
        )
    }

    async fn create_tags(&self, resource_ids: &[String], key: &str, value: &str) -> Result<()> {
        let mut params = Params::default();
        params.push_list("ResourceId", resource_ids);
        params.push("Tag.1.Key", key);
        params.push("Tag.1.Value", value);
        self.send("CreateTags", params).await?;
        Ok(())
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()> {
        let mut params = Params::default();
        params.push_list("InstanceId", instance_ids);
        self.send("TerminateInstances", params).await?;
        Ok(())
    }

    async fn describe_volumes(&self, filters: &[Filter], volume_ids: &[String]) -> Result<Vec<Volume>> {
        let mut params = Params::default();
        params.push_filters(filters);
        params.push_list("VolumeId", volume_ids);

        let response: DescribeVolumesResponse = self.call("DescribeVolumes", params).await?;
        Ok(response
            .volume_set
            .items
            .into_iter()
            .map(VolumeItem::into_volume)
            .collect())
    }

    async fn create_volume(
        &self,
        size_gb: u32,
        availability_zone: &str,
        snapshot_id: Option<&str>,
    ) -> Result<Volume> {
        let mut params = Params::default();
        params.push("Size", size_gb.to_string());
        params.push("AvailabilityZone", availability_zone);
        if let Some(snapshot_id) = snapshot_id {
            params.push("SnapshotId", snapshot_id);
        }

        let response: CreateVolumeResponse = self.call("CreateVolume", params).await?;
        Ok(response.into_volume())
    }

    async fn attach_volume(&self, volume_id: &str, instance_id: &str, device: &str) -> Result<()> {
        let mut params = Params::default();
        params.push("VolumeId", volume_id);
        params.push("InstanceId", instance_id);
        params.push("Device", device);
        self.send("AttachVolume", params).await?;
        Ok(())
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        let mut params = Params::default();
        params.push("VolumeId", volume_id);
        self.send("DeleteVolume", params).await?;
        Ok(())
    }

    async fn describe_addresses(&self) -> Result<Vec<String>> {
        let response: DescribeAddressesResponse =
            self.call("DescribeAddresses", Params::default()).await?;
        Ok(response
            .addresses_set
            .items
            .into_iter()
            .map(|a| a.public_ip)
            .collect())
    }
}
