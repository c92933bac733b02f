pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod volume;

pub use config::{Config, Framework};
pub use engine::{
    DEFAULT_ENVIRONMENT, ExecutionRequest, execute, run_container, run_container_and_log,
};
pub use error::{EngineError, OwnershipRepairWarning};
pub use fingerprint::{hash_filename, hash_params};
pub use volume::{Volume, VolumeSet, virtualize};
