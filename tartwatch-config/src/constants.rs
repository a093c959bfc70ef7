/// Default values for every configurable setting
pub mod defaults {
    pub const DEFAULT_API_URL: &str = "http://localhost:8080";
    pub const DEFAULT_REFRESH_RATE_SECS: u64 = 5;
    pub const MIN_REFRESH_RATE_SECS: u64 = 1;

    pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
    pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
    pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1_024;

    pub const DEFAULT_RETAINED_BLOCKS: usize = 500;
    pub const MIN_RETAINED_BLOCKS: usize = 500;
    pub const DEFAULT_NODE_EVENT_WINDOW: usize = 500;
    pub const DEFAULT_HISTORY_LIMIT: usize = 500;

    pub const DEFAULT_TRACE_TARGETS: &[&str] = &["tartwatch_core", "tartwatch"];
}

/// File and directory names used when resolving configuration layers
pub mod paths {
    pub const CONFIG_FILE_NAME: &str = "tartwatch.toml";
    pub const HOME_CONFIG_DIR: &str = ".tartwatch";
    pub const SYSTEM_CONFIG_PATH: &str = "/etc/tartwatch/tartwatch.toml";
}

/// Environment variables consulted by the loader
pub mod env {
    pub const CONFIG_PATH: &str = "TARTWATCH_CONFIG_PATH";
    pub const WORKSPACE: &str = "TARTWATCH_WORKSPACE";
    pub const API_URL: &str = "TARTWATCH_API_URL";
}

/// Backend endpoint paths
pub mod api {
    pub const PUSH_PATH: &str = "/api/ws";
}
