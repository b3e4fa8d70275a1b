use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_region")]
    pub region: String,

    /// Query API endpoint; derived from the region when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Machine image every instance boots from
    #[serde(default = "default_ami")]
    pub ami: String,

    /// Key pair name; `EC2_KEYPAIR` overrides
    #[serde(default = "default_key_pair")]
    pub key_pair: String,

    #[serde(default = "default_security_groups")]
    pub security_groups: Vec<String>,

    /// Script run as root on first boot
    #[serde(default = "default_user_data")]
    pub user_data: String,

    /// Tag key holding the instance/volume name
    #[serde(default = "default_tag_name")]
    pub tag_name: String,

    #[serde(default = "default_volume_size_gb")]
    pub volume_size_gb: u32,

    #[serde(default = "default_volume_device")]
    pub volume_device: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_instance_type")]
    pub default_instance_type: String,

    /// Name used to tag the application stack
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_stack_instance_type")]
    pub stack_instance_type: String,

    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

// 32-bit Ubuntu 10.04 LTS, EBS boot, us-east-1
fn default_ami() -> String {
    "ami-71dc0b18".to_string()
}

fn default_key_pair() -> String {
    "default".to_string()
}

fn default_security_groups() -> Vec<String> {
    vec!["webserver".to_string()]
}

fn default_user_data() -> String {
    "#!/bin/bash\nset -e\n: # noop\n".to_string()
}

fn default_tag_name() -> String {
    "Name".to_string()
}

fn default_volume_size_gb() -> u32 {
    10
}

// Newer kernels expose this as /dev/xvdf
fn default_volume_device() -> String {
    "/dev/sdf".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_instance_type() -> String {
    "t1.micro".to_string()
}

fn default_app_name() -> String {
    "gmap".to_string()
}

fn default_stack_instance_type() -> String {
    "m1.small".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            ami: default_ami(),
            key_pair: default_key_pair(),
            security_groups: default_security_groups(),
            user_data: default_user_data(),
            tag_name: default_tag_name(),
            volume_size_gb: default_volume_size_gb(),
            volume_device: default_volume_device(),
            poll_interval_secs: default_poll_interval_secs(),
            default_instance_type: default_instance_type(),
            app_name: default_app_name(),
            stack_instance_type: default_stack_instance_type(),
            log_level: default_log_level(),
        }
    }
}

impl DeployConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: DeployConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`DeployConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://ec2.{}.amazonaws.com/", self.region))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Tag value of the stack's database volume.
    pub fn stack_volume_tag(&self) -> String {
        format!("{} database", self.app_name)
    }
}
