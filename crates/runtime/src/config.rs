//! Configuration management for Wayfarer
//!
//! Configuration is read from a TOML file (`wayfarer.toml` by default), then
//! overlaid with environment variables, then validated. Every section has
//! working defaults except the cloud project and the licensed product, which
//! must be supplied.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

use crate::generation::SearchToolPreference;
use crate::licensing::ProductField;
use crate::types::{ModelId, Region};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "wayfarer.toml";

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error reading config file {path}: {message}")]
    IoError { path: String, message: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub discovery: DiscoveryConfig,
    pub licensing: LicensingConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Generative service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Cloud project that owns the model endpoints
    pub project_id: String,
    /// Endpoint template, `{region}` is substituted per candidate
    pub endpoint: String,
    /// Bearer token for the service (usually from `GOOGLE_ACCESS_TOKEN`)
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Which grounding tool to attach to the model
    pub search_tool: SearchToolPreference,
    /// Overrides the built-in planner instruction
    pub system_instruction: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            endpoint: "https://{region}-aiplatform.googleapis.com/v1".to_string(),
            access_token: None,
            timeout_secs: 120,
            search_tool: SearchToolPreference::Auto,
            system_instruction: None,
        }
    }
}

impl ServiceConfig {
    /// Base URL for one region
    pub fn endpoint_for(&self, region: &Region) -> String {
        self.endpoint
            .replace("{region}", region.as_str())
            .trim_end_matches('/')
            .to_string()
    }
}

/// Candidate lists for discovery, newest model first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub regions: Vec<Region>,
    pub models: Vec<ModelId>,
    /// Pin a single known-good pair instead of discovering
    pub safe_mode: Option<PinnedCandidate>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            regions: ["us-central1", "us-east4", "us-west1", "europe-west4"]
                .into_iter()
                .map(Region::from)
                .collect(),
            models: [
                "gemini-2.0-flash-001",
                "gemini-1.5-flash-002",
                "gemini-1.5-flash-001",
                "gemini-1.5-pro-002",
            ]
            .into_iter()
            .map(ModelId::from)
            .collect(),
            safe_mode: None,
        }
    }
}

/// A single region/model pair used by safe mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedCandidate {
    pub region: Region,
    pub model: ModelId,
}

/// License gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LicensingConfig {
    /// Verification endpoint
    pub endpoint: String,
    /// Product identifier sent with every verification
    pub product_id: String,
    /// Form field name the product identifier is sent under
    pub product_field: ProductField,
    pub timeout_secs: u64,
}

impl Default for LicensingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.gumroad.com/v2/licenses/verify".to_string(),
            product_id: String::new(),
            product_field: ProductField::ProductId,
            timeout_secs: 15,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Maximum size of a form submission in bytes
    pub max_body_bytes: usize,
    /// Name of the session cookie
    pub session_cookie: String,
    /// Emit request spans through tower-http
    pub request_tracing: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8501,
            max_body_bytes: 16 * 1024,
            session_cookie: "wayfarer_session".to_string(),
            request_tracing: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                reason: format!("unknown format '{}'", other),
            }),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from `wayfarer.toml` when present, then apply the
    /// environment and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`AppConfig::load`] but without validation
    pub fn read(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };

        config.apply_env()?;
        config.logging.level = config.logging.level.trim().to_ascii_lowercase();
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }

    /// Overlay environment variables on top of the loaded values
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(project) = env::var("WAYFARER_PROJECT_ID") {
            self.service.project_id = project;
        }

        if let Ok(endpoint) = env::var("WAYFARER_ENDPOINT") {
            self.service.endpoint = endpoint;
        }

        if let Ok(token) = env::var("GOOGLE_ACCESS_TOKEN") {
            if !token.trim().is_empty() {
                self.service.access_token = Some(token.trim().to_string());
            }
        }

        if let Ok(tool) = env::var("WAYFARER_SEARCH_TOOL") {
            self.service.search_tool = tool.parse()?;
        }

        if let Ok(regions) = env::var("WAYFARER_REGIONS") {
            self.discovery.regions = split_list(&regions).map(Region::from).collect();
        }

        if let Ok(models) = env::var("WAYFARER_MODELS") {
            self.discovery.models = split_list(&models).map(ModelId::from).collect();
        }

        if let Ok(product) = env::var("GUMROAD_PRODUCT_ID") {
            self.licensing.product_id = product;
        }

        if let Ok(host) = env::var("WAYFARER_HOST") {
            self.server.bind_address = host;
        }

        if let Ok(port) = env::var("WAYFARER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "WAYFARER_PORT".to_string(),
                reason: format!("'{}' is not a port number", port),
            })?;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_service()?;
        self.validate_licensing()?;
        self.validate_server()
    }

    /// Checks needed before discovery can run
    pub fn validate_service(&self) -> Result<(), ConfigError> {
        if self.service.project_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "service.project_id".to_string(),
            });
        }

        if !self.service.endpoint.contains("{region}") {
            return Err(ConfigError::InvalidValue {
                key: "service.endpoint".to_string(),
                reason: "must contain a {region} placeholder".to_string(),
            });
        }

        let sample = self.service.endpoint_for(&Region::from("region"));
        if let Err(e) = url::Url::parse(&sample) {
            return Err(ConfigError::InvalidValue {
                key: "service.endpoint".to_string(),
                reason: e.to_string(),
            });
        }

        if self.service.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "service.timeout_secs".to_string(),
                reason: "timeout must be > 0".to_string(),
            });
        }

        if self.discovery.regions.is_empty() || self.discovery.models.is_empty() {
            tracing::warn!("Discovery has no candidates configured; the planner will stay unresolved");
        }

        Ok(())
    }

    pub fn validate_licensing(&self) -> Result<(), ConfigError> {
        if self.licensing.product_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "licensing.product_id".to_string(),
            });
        }

        if let Err(e) = url::Url::parse(&self.licensing.endpoint) {
            return Err(ConfigError::InvalidValue {
                key: "licensing.endpoint".to_string(),
                reason: e.to_string(),
            });
        }

        if self.licensing.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "licensing.timeout_secs".to_string(),
                reason: "timeout must be > 0".to_string(),
            });
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.port".to_string(),
                reason: "Port cannot be 0".to_string(),
            });
        }

        if self.server.session_cookie.is_empty()
            || !self
                .server
                .session_cookie
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidValue {
                key: "server.session_cookie".to_string(),
                reason: "cookie name must be non-empty [A-Za-z0-9_-]".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: format!("Must be one of: {}", valid_levels.join(", ")),
            });
        }

        Ok(())
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_KEYS: &[&str] = &[
        "WAYFARER_PROJECT_ID",
        "WAYFARER_ENDPOINT",
        "GOOGLE_ACCESS_TOKEN",
        "WAYFARER_SEARCH_TOOL",
        "WAYFARER_REGIONS",
        "WAYFARER_MODELS",
        "GUMROAD_PRODUCT_ID",
        "WAYFARER_HOST",
        "WAYFARER_PORT",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.service.project_id = "travel-app-plan-01".to_string();
        config.licensing.product_id = "mELAK3OMYuHEWyMiVJQtkA==".to_string();
        config
    }

    #[test]
    fn defaults_need_project_and_product() {
        let config = AppConfig::default();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingRequired {
                key: "service.project_id".to_string()
            })
        );

        let mut config = AppConfig::default();
        config.service.project_id = "p".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingRequired {
                key: "licensing.product_id".to_string()
            })
        );

        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn parses_partial_toml_over_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [service]
            project_id = "travel-app-plan-01"
            search_tool = "legacy"

            [discovery]
            regions = ["us-central1", "europe-west1"]
            models = ["gemini-1.5-flash-001"]

            [discovery.safe_mode]
            region = "us-central1"
            model = "gemini-1.5-flash-001"

            [licensing]
            product_id = "abc"
            product_field = "product_permalink"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.service.search_tool, SearchToolPreference::Legacy);
        assert_eq!(config.service.timeout_secs, 120);
        assert_eq!(config.discovery.regions.len(), 2);
        assert_eq!(config.discovery.models, vec![ModelId::from("gemini-1.5-flash-001")]);
        assert_eq!(
            config.discovery.safe_mode,
            Some(PinnedCandidate {
                region: Region::from("us-central1"),
                model: ModelId::from("gemini-1.5-flash-001"),
            })
        );
        assert_eq!(config.licensing.product_field, ProductField::ProductPermalink);
        assert_eq!(config.server.port, 8501);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_toml() {
        let err = AppConfig::from_toml("[service\nproject_id = 1").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn endpoint_template_substitutes_region() {
        let service = ServiceConfig::default();
        assert_eq!(
            service.endpoint_for(&Region::from("us-east4")),
            "https://us-east4-aiplatform.googleapis.com/v1"
        );

        let mut config = valid_config();
        config.service.endpoint = "https://aiplatform.googleapis.com/v1".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "service.endpoint"
        ));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.server.session_cookie = "bad cookie".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.licensing.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        // Empty candidate lists are a valid (if useless) configuration.
        let mut config = valid_config();
        config.discovery.regions.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn environment_overrides_file_values() {
        clear_env();
        env::set_var("WAYFARER_PROJECT_ID", "env-project");
        env::set_var("WAYFARER_REGIONS", "asia-northeast1, us-central1,,");
        env::set_var("WAYFARER_MODELS", "gemini-2.0-flash-001");
        env::set_var("GOOGLE_ACCESS_TOKEN", " ya29.token ");
        env::set_var("GUMROAD_PRODUCT_ID", "env-product");
        env::set_var("WAYFARER_PORT", "9000");
        env::set_var("LOG_LEVEL", "DEBUG");

        let mut config = AppConfig::default();
        config.apply_env().unwrap();
        clear_env();

        assert_eq!(config.service.project_id, "env-project");
        assert_eq!(
            config.discovery.regions,
            vec![Region::from("asia-northeast1"), Region::from("us-central1")]
        );
        assert_eq!(config.discovery.models.len(), 1);
        assert_eq!(config.service.access_token.as_deref(), Some("ya29.token"));
        assert_eq!(config.licensing.product_id, "env-product");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "DEBUG");
    }

    #[test]
    #[serial]
    fn invalid_port_in_environment_is_reported() {
        clear_env();
        env::set_var("WAYFARER_PORT", "eighty");
        let mut config = AppConfig::default();
        let err = config.apply_env().unwrap_err();
        clear_env();

        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "WAYFARER_PORT"));
    }

    #[test]
    #[serial]
    fn load_reads_explicit_file() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[service]\nproject_id = \"file-project\"\n[licensing]\nproduct_id = \"file-product\""
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.service.project_id, "file-project");
        assert_eq!(config.licensing.product_id, "file-product");

        let missing = AppConfig::load(Some(Path::new("/nonexistent/wayfarer.toml")));
        assert!(matches!(missing, Err(ConfigError::IoError { .. })));
    }

    #[test]
    #[serial]
    fn log_level_is_case_insensitive_from_file_and_environment() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[service]\nproject_id = \"p\"\n[licensing]\nproduct_id = \"q\"\n[logging]\nlevel = \"INFO\""
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.logging.level, "info");

        env::set_var("LOG_LEVEL", " Debug ");
        let config = AppConfig::load(Some(file.path()));
        clear_env();
        assert_eq!(config.unwrap().logging.level, "debug");
    }
}
