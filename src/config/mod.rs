//! Run configuration: built-in defaults, an optional YAML file, then CLI flags.

mod collection_config;

pub use collection_config::{load_config, CollectionConfig, ConfigOverrides};
