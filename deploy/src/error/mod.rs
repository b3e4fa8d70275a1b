mod deploy_error;

pub use deploy_error::DeployError;
pub type Result<T> = std::result::Result<T, DeployError>;
