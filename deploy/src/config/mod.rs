mod deploy_config;

pub use deploy_config::DeployConfig;
