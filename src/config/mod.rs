// Engine configuration: framework choice, registry prefix, hashing and backend settings.

mod loader;
mod types;

pub use loader::{CONFIG_FILE, load_file, parse};
pub use types::{
    CloudConfig, Config, Framework, OwnershipMode, RegistryConfig, RuntimeBins, UnknownFramework,
};
