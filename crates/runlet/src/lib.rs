use std::path::PathBuf;
use std::time::Duration;

pub mod error;
pub mod request;
pub mod response;
pub mod runtime;
pub mod sandbox;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub python_path: String,
    pub base_tempdir_path: PathBuf,
    pub default_entrypoint: String,
    pub timeout: Duration,
}
