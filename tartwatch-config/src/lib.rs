//! Settings for tartwatch: the backend API URL, roster refresh rate,
//! reconnect policy, retention windows and tracing filters.
//!
//! Configuration is assembled from layered TOML files (system, user,
//! workspace or an explicit file), the `TARTWATCH_API_URL` environment
//! variable and command-line overrides, in increasing precedence. The
//! result is validated once and shared at runtime through a
//! [`SettingsHandle`], which broadcasts accepted changes.

pub mod connection;
pub mod constants;
pub mod debug;
pub mod endpoint;
pub mod loader;
pub mod retention;
pub mod settings;

pub use connection::ConnectionConfig;
pub use debug::{DebugConfig, TraceLevel};
pub use endpoint::{EndpointError, parse_api_url, push_url};
pub use loader::layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};
pub use loader::{ConfigBuilder, ConfigManager, TartConfig, merge_toml_values};
pub use retention::RetentionConfig;
pub use settings::SettingsHandle;
