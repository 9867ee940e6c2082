//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "wsrun.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "wsrun.yaml";

/// Get list of config file names to search for, in priority order
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".wsrun.toml",
        ".wsrun.yaml",
    ]
}
