//! Environment variables recognised by `Config::merge_env`

pub const ENV_TICK_INTERVAL_MS: &str = "STAGEHAND_TICK_INTERVAL_MS";
pub const ENV_COMPLETION_PROBABILITY: &str = "STAGEHAND_COMPLETION_PROBABILITY";
pub const ENV_FAILURE_PROBABILITY: &str = "STAGEHAND_FAILURE_PROBABILITY";
pub const ENV_MAX_LOG_LINES: &str = "STAGEHAND_MAX_LOG_LINES";
pub const ENV_LOG_FORMAT: &str = "STAGEHAND_LOG_FORMAT";

/// Config file name under the platform config directory
pub const CONFIG_DIR_NAME: &str = "stagehand";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Ids of the templates the engine ships with; configured templates may not reuse them
pub const BUILTIN_TEMPLATE_IDS: [&str; 5] = [
    "react-app",
    "rust-service",
    "static-site",
    "marketplace-sync",
    "inventory-sync",
];
