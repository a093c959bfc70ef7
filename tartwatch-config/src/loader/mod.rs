pub mod layers;

mod builder;
mod config;
mod manager;
mod merge;

#[cfg(test)]
mod tests;

pub use builder::ConfigBuilder;
pub use config::TartConfig;
pub use manager::ConfigManager;
pub use merge::{insert_dotted_key, merge_toml_values};
