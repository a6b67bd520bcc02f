//! Configuration system for the persona engine.
//!
//! Supports multiple configuration sources with the following precedence
//! (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (PERSONA_ENGINE_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// HTTP server settings
    pub server: ServerSettings,

    /// Datastore settings
    pub database: DatabaseSettings,

    /// Logging configuration
    pub logging: LoggingSettings,

    /// Rule-engine behavior settings
    pub engine: EngineSettings,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to listen on
    pub bind_addr: String,

    /// Seconds to wait for in-flight work during shutdown
    pub shutdown_grace_secs: u64,
}

/// Datastore settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file
    pub path: String,

    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

/// Rule-engine behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Identity recorded as changed_by for automatic evaluation
    pub system_actor: String,

    /// Identity recorded as changed_by for configuration changes
    /// when the caller supplies none
    pub admin_actor: String,
}

// Default implementations

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            logging: LoggingSettings::default(),
            engine: EngineSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            shutdown_grace_secs: 5,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "~/.persona-engine/engine.db".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            system_actor: "SYSTEM".to_string(),
            admin_actor: "ADMIN".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
            config = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let expanded = shellexpand::tilde(path);
            let path = PathBuf::from(expanded.as_ref());
            if path.exists() {
                return Ok(Some(path));
            } else {
                return Err(Error::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
        }

        // Search in standard locations
        let search_paths = [
            // Current directory
            PathBuf::from("persona-engine.toml"),
            PathBuf::from("config.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("persona-engine").join("engine.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".persona-engine").join("engine.toml"))
                .unwrap_or_default(),
            // System config (Linux)
            PathBuf::from("/etc/persona-engine/engine.toml"),
        ];

        for path in &search_paths {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Server settings
        if let Ok(val) = std::env::var("PERSONA_ENGINE_BIND_ADDR") {
            self.server.bind_addr = val;
        }
        if let Ok(val) = std::env::var("PERSONA_ENGINE_SHUTDOWN_GRACE_SECS") {
            if let Ok(n) = val.parse() {
                self.server.shutdown_grace_secs = n;
            }
        }

        // Database settings
        if let Ok(val) = std::env::var("PERSONA_ENGINE_DB_PATH") {
            self.database.path = val;
        }
        if let Ok(val) = std::env::var("PERSONA_ENGINE_DB_BUSY_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.database.busy_timeout_ms = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("PERSONA_ENGINE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PERSONA_ENGINE_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("PERSONA_ENGINE_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }

        // Engine settings
        if let Ok(val) = std::env::var("PERSONA_ENGINE_SYSTEM_ACTOR") {
            self.engine.system_actor = val;
        }
        if let Ok(val) = std::env::var("PERSONA_ENGINE_ADMIN_ACTOR") {
            self.engine.admin_actor = val;
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        self.database.path = expand_path(&self.database.path);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        // Validate bind address
        if self.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(Error::Config(format!(
                "Invalid bind address '{}'. Expected host:port, e.g. 127.0.0.1:8080",
                self.server.bind_addr
            )));
        }

        // Validate database path
        if self.database.path.is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        // Validate actor identities
        if self.engine.system_actor.is_empty() {
            return Err(Error::Config("system_actor cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Get the database path as a PathBuf
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<()> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".persona-engine")
                .join("engine.toml")
        });

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
    }

    // Generate default config with comments
    let config_content = generate_default_config();

    fs::write(&config_path, config_content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

    println!("Configuration file created: {}", config_path.display());
    Ok(())
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Persona Engine Configuration

[server]
# Socket address to listen on
bind_addr = "127.0.0.1:8080"

# Seconds to wait for in-flight work during shutdown
shutdown_grace_secs = 5

[database]
# Path to the SQLite database file
path = "~/.persona-engine/engine.db"

# SQLite busy timeout in milliseconds
busy_timeout_ms = 5000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.persona-engine/logs/engine.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false

[engine]
# Identity recorded as changed_by for automatic evaluation
system_actor = "SYSTEM"

# Identity recorded as changed_by for configuration changes
# when the caller supplies none
admin_actor = "ADMIN"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.engine.system_actor, "SYSTEM");
    }

    #[test]
    fn test_env_override() {
        env::set_var("PERSONA_ENGINE_BIND_ADDR", "0.0.0.0:9999");
        env::set_var("PERSONA_ENGINE_LOG_LEVEL", "debug");

        let mut config = EngineConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.server.bind_addr, "0.0.0.0:9999");
        assert_eq!(config.logging.level, "debug");

        env::remove_var("PERSONA_ENGINE_BIND_ADDR");
        env::remove_var("PERSONA_ENGINE_LOG_LEVEL");
    }

    #[test]
    fn test_validation_invalid_bind_addr() {
        let mut config = EngineConfig::default();
        config.server.bind_addr = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = EngineConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_db_path() {
        let mut config = EngineConfig::default();
        config.database.path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_valid_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_path_expansion() {
        let mut config = EngineConfig::default();
        config.database.path = "~/engine/test.db".to_string();
        config.expand_paths();
        assert!(!config.database.path.contains('~'));
    }

    #[test]
    fn test_database_path_accessor() {
        let mut config = EngineConfig::default();
        config.database.path = "/var/lib/persona-engine/engine.db".to_string();
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/persona-engine/engine.db")
        );
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.server.bind_addr, parsed.server.bind_addr);
        assert_eq!(config.database.path, parsed.database.path);
    }

    #[test]
    fn test_parse_config_file() {
        let config_str = r#"
[server]
bind_addr = "0.0.0.0:8081"

[database]
path = "/var/lib/persona-engine/engine.db"
busy_timeout_ms = 10000

[logging]
level = "debug"

[engine]
system_actor = "AUTOPILOT"
"#;

        let config: EngineConfig = toml::from_str(config_str).unwrap();

        assert_eq!(config.server.bind_addr, "0.0.0.0:8081");
        assert_eq!(config.database.path, "/var/lib/persona-engine/engine.db");
        assert_eq!(config.database.busy_timeout_ms, 10000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.engine.system_actor, "AUTOPILOT");
    }

    #[test]
    fn test_default_config_template_parses() {
        let parsed: EngineConfig = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(parsed.server.bind_addr, "127.0.0.1:8080");
    }
}
