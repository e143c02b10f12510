use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable consulted for the server URL.
pub const URL_ENV: &str = "TILE38_URL";
/// Used when neither the config nor the environment names a server.
pub const FALLBACK_URL: &str = "redis://127.0.0.1:9851";

static ENV_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference pattern should compile"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("environment variable `{0}` referenced by the config is not set")]
    MissingVariable(String),
}

/// Connection settings, usually stored under `[tile38]` in a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile38Config {
    #[serde(default = "default_url")]
    pub url: String,
}

impl Default for Tile38Config {
    fn default() -> Self {
        Self { url: default_url() }
    }
}

fn default_url() -> String {
    format!("${{{URL_ENV}}}")
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    tile38: Tile38Config,
}

impl Tile38Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Settings taken from `TILE38_URL`, falling back to a local server.
    pub fn from_env() -> Self {
        let url = std::env::var(URL_ENV).unwrap_or_else(|_| FALLBACK_URL.to_string());
        Self { url }
    }

    /// Parse the `[tile38]` table of a TOML document and resolve `${VAR}` references.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;
        file.tile38.resolve(|name| std::env::var(name).ok())
    }

    /// Replace `${VAR}` references using `lookup`.
    ///
    /// The default `${TILE38_URL}` falls back to [`FALLBACK_URL`] when unset; any other
    /// unresolved reference is an error.
    pub fn resolve<F>(self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = None;
        let url = ENV_REFERENCE
            .replace_all(&self.url, |caps: &Captures<'_>| {
                let name = &caps[1];
                match lookup(name) {
                    Some(value) => value,
                    None if name == URL_ENV => FALLBACK_URL.to_string(),
                    None => {
                        missing.get_or_insert_with(|| name.to_string());
                        String::new()
                    }
                }
            })
            .into_owned();
        match missing {
            Some(name) => Err(ConfigError::MissingVariable(name)),
            None => Ok(Self { url }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url_references_environment() {
        assert_eq!(Tile38Config::default().url, "${TILE38_URL}");
        let resolved = Tile38Config::default().resolve(|_| None).unwrap();
        assert_eq!(resolved.url, FALLBACK_URL);
    }

    #[test]
    fn resolves_references_from_lookup() {
        let config = Tile38Config::new("redis://${HOST}:${PORT}");
        let resolved = config
            .resolve(|name| match name {
                "HOST" => Some("tile38.internal".to_string()),
                "PORT" => Some("9852".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(resolved.url, "redis://tile38.internal:9852");
    }

    #[test]
    fn unresolved_reference_is_an_error() {
        let err = Tile38Config::new("redis://${NOPE}:9851").resolve(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable(name) if name == "NOPE"));
    }

    #[test]
    fn parses_toml_table() {
        let config = Tile38Config::from_toml_str("[tile38]\nurl = \"redis://localhost:9852\"\n").unwrap();
        assert_eq!(config.url, "redis://localhost:9852");
        assert!(Tile38Config::from_toml_str("[tile38]\nurl = 5\n").is_err());
    }
}
