//! TOML configuration parsing and validation.
//!
//! The harvester reads a single TOML file describing where the SQLite store
//! lives, which LDP endpoint to crawl, how politely to crawl it, which
//! predicates carry the OAI fields, and where each metadata format's payload
//! can be found on a resource.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub predicates: PredicatesConfig,
    #[serde(default)]
    pub formats: BTreeMap<String, FormatConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// The remote LDP endpoint and how to authenticate against it.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub root_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Name of an environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("ldp-oai-harvest/{}", env!("CARGO_PKG_VERSION"))
}

impl SourceConfig {
    /// Resolve basic-auth credentials, reading `password_env` if set.
    pub fn credentials(&self) -> Result<Option<(String, Option<String>)>> {
        let Some(user) = &self.username else {
            return Ok(None);
        };
        let password = match (&self.password, &self.password_env) {
            (Some(p), _) => Some(p.clone()),
            (None, Some(var)) => Some(
                std::env::var(var)
                    .with_context(|| format!("environment variable {} not set", var))?,
            ),
            (None, None) => None,
        };
        Ok(Some((user.clone(), password)))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_true")]
    pub traverse_set_children: bool,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_structural_format")]
    pub structural_format: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            rate_limit_ms: default_rate_limit_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
            backoff_max_ms: default_backoff_max_ms(),
            traverse_set_children: true,
            max_depth: None,
            structural_format: default_structural_format(),
        }
    }
}

fn default_rate_limit_ms() -> u64 {
    5000
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}
fn default_structural_format() -> String {
    "oai_dc".to_string()
}

impl HarvestConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

/// Predicate URIs used to classify resources.
///
/// Defaults match a Fedora 4 repository annotated with OAI and Dublin Core
/// terms.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PredicatesConfig {
    #[serde(default = "default_set_spec")]
    pub set_spec: String,
    #[serde(default = "default_set_name")]
    pub set_name: String,
    #[serde(default = "default_identifier")]
    pub identifier: String,
    #[serde(default = "default_member_of")]
    pub member_of: String,
    #[serde(default = "default_contains")]
    pub contains: String,
    #[serde(default = "default_last_modified_ns")]
    pub last_modified_ns: String,
    #[serde(default = "default_last_modified_name")]
    pub last_modified_name: String,
}

impl Default for PredicatesConfig {
    fn default() -> Self {
        Self {
            set_spec: default_set_spec(),
            set_name: default_set_name(),
            identifier: default_identifier(),
            member_of: default_member_of(),
            contains: default_contains(),
            last_modified_ns: default_last_modified_ns(),
            last_modified_name: default_last_modified_name(),
        }
    }
}

fn default_set_spec() -> String {
    "http://www.openarchives.org/OAI/2.0/setSpec".to_string()
}
fn default_set_name() -> String {
    "http://www.openarchives.org/OAI/2.0/setName".to_string()
}
fn default_identifier() -> String {
    "http://purl.org/dc/elements/1.1/identifier".to_string()
}
fn default_member_of() -> String {
    "http://purl.org/dc/elements/1.1/memberOf".to_string()
}
fn default_contains() -> String {
    "http://www.w3.org/ns/ldp#contains".to_string()
}
fn default_last_modified_ns() -> String {
    "http://fedora.info/definitions/v4/repository#".to_string()
}
fn default_last_modified_name() -> String {
    "lastModified".to_string()
}

/// Where a metadata format's payload lives relative to a resource.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FormatConfig {
    /// The resource links to a binary under `predicate` (`@id` value).
    LinkedBinary { predicate: String },
    /// The payload is served at the resource URI plus `suffix`.
    Suffix { suffix: String },
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let url = reqwest::Url::parse(&config.source.root_url)
        .with_context(|| format!("source.root_url is not a URL: {}", config.source.root_url))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("source.root_url must use http or https, got '{}'", url.scheme());
    }

    if config.source.password.is_some() && config.source.password_env.is_some() {
        bail!("source.password and source.password_env are mutually exclusive");
    }

    if config.harvest.backoff_factor < 1.0 {
        bail!("harvest.backoff_factor must be >= 1.0");
    }

    if config.harvest.max_depth == Some(0) {
        bail!("harvest.max_depth must be > 0 when set");
    }

    for (prefix, format) in &config.formats {
        match format {
            FormatConfig::LinkedBinary { predicate } if predicate.trim().is_empty() => {
                bail!("formats.{}: linked_binary needs a predicate", prefix)
            }
            FormatConfig::Suffix { suffix } if suffix.is_empty() => {
                bail!("formats.{}: suffix must not be empty", prefix)
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "/tmp/oai.sqlite"

[source]
root_url = "http://localhost:8080/rest"
"#;

    #[test]
    fn test_minimal_config_uses_fedora_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.harvest.rate_limit_ms, 5000);
        assert_eq!(config.harvest.structural_format, "oai_dc");
        assert!(config.harvest.traverse_set_children);
        assert_eq!(
            config.predicates.contains,
            "http://www.w3.org/ns/ldp#contains"
        );
        assert!(config.formats.is_empty());
    }

    #[test]
    fn test_format_strategies() {
        let text = format!(
            "{}\n{}",
            MINIMAL,
            r#"
[formats.oai_dc]
strategy = "linked_binary"
predicate = "http://example.org/ns#oai_dc"

[formats.marcxml]
strategy = "suffix"
suffix = "/marcxml"
"#
        );
        let config: Config = toml::from_str(&text).unwrap();
        validate(&config).unwrap();
        assert_eq!(
            config.formats["oai_dc"],
            FormatConfig::LinkedBinary {
                predicate: "http://example.org/ns#oai_dc".to_string()
            }
        );
        assert_eq!(
            config.formats["marcxml"],
            FormatConfig::Suffix {
                suffix: "/marcxml".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_non_http_root() {
        let text = MINIMAL.replace("http://localhost:8080/rest", "ftp://localhost/rest");
        let config: Config = toml::from_str(&text).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_empty_suffix() {
        let text = format!("{}\n[formats.x]\nstrategy = \"suffix\"\nsuffix = \"\"\n", MINIMAL);
        let config: Config = toml::from_str(&text).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_shrinking_backoff() {
        let text = format!("{}\n[harvest]\nbackoff_factor = 0.5\n", MINIMAL);
        let config: Config = toml::from_str(&text).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_credentials_from_inline_password() {
        let text = MINIMAL.replace(
            "root_url = \"http://localhost:8080/rest\"",
            "root_url = \"http://localhost:8080/rest\"\nusername = \"fedoraAdmin\"\npassword = \"secret\"",
        );
        let config: Config = toml::from_str(&text).unwrap();
        let creds = config.source.credentials().unwrap();
        assert_eq!(
            creds,
            Some(("fedoraAdmin".to_string(), Some("secret".to_string())))
        );
    }
}
