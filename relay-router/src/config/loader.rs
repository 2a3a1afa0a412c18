//! Routing document loading with fallback to built-in defaults.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::RouterConfig;
use crate::{Error, Result};

/// Path used when neither `--config` nor `ROUTING_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/routing.yaml";

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick a format from the file extension. Anything unknown is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => Self::Toml,
            Some("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// A configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RouterConfig,
    pub path: PathBuf,
    /// Set when the file could not be used and the defaults were substituted.
    pub fallback_reason: Option<String>,
}

impl LoadedConfig {
    pub fn used_defaults(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

impl RouterConfig {
    /// Parse a routing document from a string.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config: RouterConfig = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| Error::config(format!("invalid YAML: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| Error::config(format!("invalid TOML: {}", e)))?,
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::config(format!("invalid JSON: {}", e)))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a routing document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content, ConfigFormat::from_path(path))
    }

    /// Load a routing document, substituting the defaults on any failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> LoadedConfig {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                info!(
                    path = %path.display(),
                    default_priority = ?config.routing.default.priority,
                    rules = config.routing.rules.len(),
                    "Loaded routing configuration"
                );
                LoadedConfig {
                    config,
                    path: path.to_path_buf(),
                    fallback_reason: None,
                }
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Using default routing configuration"
                );
                LoadedConfig {
                    config: RouterConfig::default(),
                    path: path.to_path_buf(),
                    fallback_reason: Some(e.to_string()),
                }
            }
        }
    }
}

/// Environment variable naming the routing document.
pub const CONFIG_PATH_ENV: &str = "ROUTING_CONFIG";

/// Resolve the routing document path from an explicit value or the environment.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    resolve_config_path_with(explicit, std::env::var(CONFIG_PATH_ENV).ok())
}

/// Resolve the routing document path given the value of `ROUTING_CONFIG`.
pub fn resolve_config_path_with(explicit: Option<&Path>, env_value: Option<String>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match env_value {
        Some(path) if !path.trim().is_empty() => {
            debug!(path = %path, "Routing config path taken from {}", CONFIG_PATH_ENV);
            PathBuf::from(path.trim())
        }
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_YAML: &str = r#"
routing:
  default:
    priority: [webhook, email]
  by_tenant:
    acme:
      priority: [email]
  by_usecase:
    invoices:
      priority: [telegram]
  rules:
    - if:
        sensitivity: high
      then:
        priority: [telegram]
    - if:
        data_size_mb: ">=10"
      then:
        priority: [webhook]
retry:
  max_attempts: 4
  backoff_ms: [2000, 4000]
circuit_breaker:
  failure_threshold: 3
  cool_down_sec: 30
"#;

    #[test]
    fn test_parse_full_yaml() {
        let config = RouterConfig::parse(FULL_YAML, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.routing.default.priority, vec!["webhook", "email"]);
        assert_eq!(config.routing.by_tenant["acme"].priority, vec!["email"]);
        assert_eq!(
            config.routing.by_usecase["invoices"].priority,
            vec!["telegram"]
        );
        assert_eq!(config.routing.rules.len(), 2);
        assert_eq!(
            config.routing.rules[1].condition["data_size_mb"],
            serde_json::json!(">=10")
        );
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.retry_after_seconds(), 2);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.cool_down_sec, 30);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let yaml = "circuit_breaker:\n  failure_threshold: 2\n";
        let config = RouterConfig::parse(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.cool_down_sec, 60);
        assert_eq!(
            config.routing.default.priority,
            vec!["telegram", "email", "webhook"]
        );
        assert_eq!(config.retry.backoff_ms, vec![1000, 2000, 5000]);
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
[routing.default]
priority = ["email", "webhook"]

[[routing.rules]]
if = { sensitivity = "high" }
then = { priority = ["telegram"] }

[retry]
backoff_ms = [500]
"#;
        let config = RouterConfig::parse(content, ConfigFormat::Toml).unwrap();
        assert_eq!(config.routing.default.priority, vec!["email", "webhook"]);
        assert_eq!(config.routing.rules[0].then.priority, vec!["telegram"]);
        assert_eq!(config.retry.retry_after_seconds(), 1);
    }

    #[test]
    fn test_parse_json() {
        let content = r#"{
            "routing": {
                "default": {"priority": ["email"]},
                "by_usecase": {"alerts": {"priority": ["telegram", "webhook"]}},
                "rules": [{"if": {"data_size_mb": "<=1"}, "then": {"priority": ["telegram"]}}]
            },
            "circuit_breaker": {"cool_down_sec": 5}
        }"#;
        let config = RouterConfig::parse(content, ConfigFormat::Json).unwrap();
        assert_eq!(config.routing.default.priority, vec!["email"]);
        assert_eq!(
            config.routing.by_usecase["alerts"].priority,
            vec!["telegram", "webhook"]
        );
        assert_eq!(
            config.routing.rules[0].condition["data_size_mb"],
            serde_json::json!("<=1")
        );
        assert_eq!(config.circuit_breaker.cool_down_sec, 5);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);

        assert!(RouterConfig::parse("{\"routing\": ", ConfigFormat::Json).is_err());
    }

    #[test]
    fn test_json_file_is_detected_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"retry": {{"backoff_ms": [3000]}}}}"#).unwrap();

        let loaded = RouterConfig::load_or_default(file.path());
        assert!(!loaded.used_defaults());
        assert_eq!(loaded.config.retry.retry_after_seconds(), 3);
    }

    #[test]
    fn test_config_path_from_environment() {
        assert_eq!(
            resolve_config_path_with(None, Some(" /etc/relay/routing.toml ".to_string())),
            PathBuf::from("/etc/relay/routing.toml")
        );
        assert_eq!(
            resolve_config_path_with(None, Some("  ".to_string())),
            PathBuf::from(DEFAULT_CONFIG_PATH)
        );
        assert_eq!(
            resolve_config_path_with(None, None),
            PathBuf::from(DEFAULT_CONFIG_PATH)
        );
        assert_eq!(
            resolve_config_path_with(
                Some(Path::new("cli.yaml")),
                Some("/etc/relay/routing.toml".to_string())
            ),
            PathBuf::from("cli.yaml")
        );
    }

    #[test]
    fn test_parse_rejects_empty_default() {
        let yaml = "routing:\n  default:\n    priority: []\n";
        assert!(RouterConfig::parse(yaml, ConfigFormat::Yaml).is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("routing.toml")),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("routing.JSON")),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("routing.yml")),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("routing")),
            ConfigFormat::Yaml
        );
    }

    #[test]
    fn test_bundled_sample_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = RouterConfig::load(&path).unwrap();
        assert_eq!(config.routing.rules.len(), 2);
        assert_eq!(config.routing.by_tenant["acme-corp"].priority, vec!["email", "webhook"]);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = RouterConfig::load_or_default(dir.path().join("missing.yaml"));
        assert!(loaded.used_defaults());
        assert_eq!(loaded.config, RouterConfig::default());
    }

    #[test]
    fn test_load_or_default_unparsable_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "routing: [this is: not valid").unwrap();

        let loaded = RouterConfig::load_or_default(file.path());
        assert!(loaded.used_defaults());
        assert_eq!(loaded.config, RouterConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(FULL_YAML.as_bytes()).unwrap();

        let loaded = RouterConfig::load_or_default(file.path());
        assert!(!loaded.used_defaults());
        assert_eq!(loaded.config.routing.default.priority, vec!["webhook", "email"]);
    }

    #[test]
    fn test_resolve_config_path_explicit() {
        let path = resolve_config_path(Some(Path::new("/etc/relay/routing.toml")));
        assert_eq!(path, PathBuf::from("/etc/relay/routing.toml"));
    }
}
