//! Server configuration and credential resolution

use crate::error::{Error, Result};
use std::time::Duration;

/// Production TweekIT image API
pub const DEFAULT_BASE_URL: &str = "https://dapp.tweekit.io/tweekit/api/image/";

/// DuckDuckGo HTML endpoint used by the `search` tool
pub const DEFAULT_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

/// User agent sent on fetch and search requests
pub const DEFAULT_USER_AGENT: &str =
    "tweekit-mcp/1.5 (+https://github.com/equilibrium-team/tweekit-mcp)";

/// Immutable process-wide configuration for the TweekIT MCP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL of the upstream conversion API, always ending with '/'
    pub base_url: String,
    /// Default API key used when a tool call omits `apiKey`
    pub default_api_key: Option<String>,
    /// Default API secret used when a tool call omits `apiSecret`
    pub default_api_secret: Option<String>,
    /// Search endpoint (DuckDuckGo HTML layout)
    pub search_url: String,
    /// Directories `convert_file` may read from (empty = unrestricted)
    pub resource_dirs: Vec<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum download size in bytes for remote sources (default: 100MB)
    pub max_download_bytes: u64,
    /// Connect timeout for every outbound request
    pub connect_timeout: Duration,
    /// Timeout for conversion calls and remote downloads
    pub transfer_timeout: Duration,
    /// Timeout for the `version` and `doctype` endpoints
    pub metadata_timeout: Duration,
    /// Timeout for the search endpoint
    pub search_timeout: Duration,
    /// User agent for fetch and search requests
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_api_key: None,
            default_api_secret: None,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            resource_dirs: Vec::new(),
            allow_private_urls: false,
            max_download_bytes: 100 * 1024 * 1024, // 100MB
            connect_timeout: Duration::from_secs(20),
            transfer_timeout: Duration::from_secs(60),
            metadata_timeout: Duration::from_secs(10),
            search_timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ServerConfig {
    /// Build the configuration from `TWEEKIT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_url = non_empty("TWEEKIT_API_BASE_URL")
            .map(|v| normalize_base_url(&v))
            .unwrap_or(defaults.base_url);

        let resource_dirs = non_empty("TWEEKIT_RESOURCE_DIRS")
            .map(|v| {
                std::env::split_paths(&v)
                    .map(|p| p.to_string_lossy().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let allow_private_urls = non_empty("TWEEKIT_ALLOW_PRIVATE_URLS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.allow_private_urls);

        let max_download_bytes = match non_empty("TWEEKIT_MAX_DOWNLOAD_BYTES") {
            Some(v) => v.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %v, "ignoring invalid TWEEKIT_MAX_DOWNLOAD_BYTES");
                defaults.max_download_bytes
            }),
            None => defaults.max_download_bytes,
        };

        Self {
            base_url,
            default_api_key: non_empty("TWEEKIT_API_KEY"),
            default_api_secret: non_empty("TWEEKIT_API_SECRET"),
            search_url: non_empty("TWEEKIT_SEARCH_URL").unwrap_or(defaults.search_url),
            resource_dirs,
            allow_private_urls,
            max_download_bytes,
            ..defaults
        }
    }

    /// Resolve the credential pair for one call: explicit values win,
    /// configured defaults fill the gaps.
    pub fn credentials(
        &self,
        api_key: Option<&str>,
        api_secret: Option<&str>,
    ) -> Result<Credentials> {
        let pick = |explicit: Option<&str>, fallback: &Option<String>| {
            explicit
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .or_else(|| fallback.clone())
        };

        let key = pick(api_key, &self.default_api_key);
        let secret = pick(api_secret, &self.default_api_secret);

        match (key, secret) {
            (Some(key), Some(secret)) => Ok(Credentials { key, secret }),
            (key, secret) => {
                let mut fields = Vec::new();
                if key.is_none() {
                    fields.push("apiKey");
                }
                if secret.is_none() {
                    fields.push("apiSecret");
                }
                Err(Error::MissingCredentials { fields })
            }
        }
    }
}

/// Ensure the base URL ends with exactly one '/'.
pub fn normalize_base_url(url: &str) -> String {
    format!("{}/", url.trim().trim_end_matches('/'))
}

/// API key/secret pair sent as `ApiKey` / `ApiSecret` headers
#[derive(Clone)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.default_api_key.is_none());
        assert!(!config.allow_private_urls);
        assert!(config.connect_timeout < config.transfer_timeout);
    }

    #[test]
    fn test_from_lookup() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("TWEEKIT_API_BASE_URL", "https://api.test"),
            ("TWEEKIT_API_KEY", "key"),
            ("TWEEKIT_API_SECRET", "secret"),
            ("TWEEKIT_ALLOW_PRIVATE_URLS", "true"),
            ("TWEEKIT_MAX_DOWNLOAD_BYTES", "1024"),
        ]));
        assert_eq!(config.base_url, "https://api.test/");
        assert_eq!(config.default_api_key.as_deref(), Some("key"));
        assert_eq!(config.default_api_secret.as_deref(), Some("secret"));
        assert!(config.allow_private_urls);
        assert_eq!(config.max_download_bytes, 1024);
        assert_eq!(config.search_url, DEFAULT_SEARCH_URL);
    }

    #[test]
    fn test_from_lookup_ignores_blank_and_invalid() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("TWEEKIT_API_KEY", "   "),
            ("TWEEKIT_MAX_DOWNLOAD_BYTES", "lots"),
        ]));
        assert!(config.default_api_key.is_none());
        assert_eq!(config.max_download_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://a.test/api"), "https://a.test/api/");
        assert_eq!(normalize_base_url("https://a.test/api///"), "https://a.test/api/");
    }

    #[test]
    fn test_credentials_explicit_wins() {
        let config = ServerConfig {
            default_api_key: Some("env-key".to_string()),
            default_api_secret: Some("env-secret".to_string()),
            ..ServerConfig::default()
        };
        let creds = config.credentials(Some("k"), None).unwrap();
        assert_eq!(creds.key, "k");
        assert_eq!(creds.secret, "env-secret");
    }

    #[test]
    fn test_credentials_missing() {
        let config = ServerConfig::default();
        let err = config.credentials(Some(""), None).unwrap_err();
        match err {
            Error::MissingCredentials { fields } => {
                assert_eq!(fields, vec!["apiKey", "apiSecret"])
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = config.credentials(Some("k"), None).unwrap_err();
        assert!(matches!(err, Error::MissingCredentials { ref fields } if fields == &vec!["apiSecret"]));
    }

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials {
            key: "super-key".to_string(),
            secret: "super-secret".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("super"));
    }
}
