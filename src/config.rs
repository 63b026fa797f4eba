use crate::error::McpError;
use std::env;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_BASE_URL: &str = "https://api.bitget.com";
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Tool modules that can be enabled per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Spot,
    Futures,
    Account,
    Earn,
}

impl Module {
    pub const ALL: [Module; 4] = [Module::Spot, Module::Futures, Module::Account, Module::Earn];
    pub const DEFAULT: [Module; 3] = [Module::Spot, Module::Futures, Module::Account];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Spot => "spot",
            Module::Futures => "futures",
            Module::Account => "account",
            Module::Earn => "earn",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Module::ALL.iter().map(Module::as_str).collect();
                McpError::config(
                    format!("Unknown module \"{s}\"."),
                    format!("Use one of: {} or \"all\".", names.join(", ")),
                )
            })
    }
}

/// API key, secret and passphrase. Present all together or not at all.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"***")
            .field("passphrase", &"***")
            .finish()
    }
}

/// Runtime configuration for the Bitget client and tool registry.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Option<Credentials>,
    pub base_url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub modules: Vec<Module>,
    pub read_only: bool,
}

impl Config {
    /// Public-only configuration against `base_url` with default modules.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            credentials: None,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: default_user_agent(),
            modules: Module::DEFAULT.to_vec(),
            read_only: false,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn has_auth(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn module_enabled(&self, module: Module) -> bool {
        self.modules.contains(&module)
    }

    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - BITGET_API_KEY, BITGET_SECRET_KEY, BITGET_PASSPHRASE (all three or none)
    /// - BITGET_API_BASE_URL (default: https://api.bitget.com)
    /// - BITGET_TIMEOUT_MS (default: 15000)
    pub fn from_env(modules: Option<&str>, read_only: bool) -> Result<Self, McpError> {
        Self::from_lookup(|k| env::var(k).ok(), modules, read_only)
    }

    pub fn from_lookup<F>(lookup: F, modules: Option<&str>, read_only: bool) -> Result<Self, McpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let api_key = read("BITGET_API_KEY");
        let secret_key = read("BITGET_SECRET_KEY");
        let passphrase = read("BITGET_PASSPHRASE");
        let credentials = match (api_key, secret_key, passphrase) {
            (Some(api_key), Some(secret_key), Some(passphrase)) => Some(Credentials {
                api_key,
                secret_key,
                passphrase,
            }),
            (None, None, None) => None,
            _ => {
                return Err(McpError::config(
                    "Partial API credentials detected.",
                    "Set BITGET_API_KEY, BITGET_SECRET_KEY and BITGET_PASSPHRASE together.",
                ))
            }
        };

        let base_url = read("BITGET_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(McpError::config(
                format!("Invalid BITGET_API_BASE_URL \"{base_url}\"."),
                "BITGET_API_BASE_URL must start with http:// or https://",
            ));
        }

        let timeout_ms = match read("BITGET_TIMEOUT_MS") {
            None => DEFAULT_TIMEOUT_MS,
            Some(raw) => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 1.0 => v.floor() as u64,
                _ => {
                    return Err(McpError::config(
                        format!("Invalid BITGET_TIMEOUT_MS value \"{raw}\"."),
                        "Set BITGET_TIMEOUT_MS as a positive integer in milliseconds.",
                    ))
                }
            },
        };

        Ok(Self {
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
            user_agent: default_user_agent(),
            modules: parse_modules(modules)?,
            read_only,
        })
    }
}

fn default_user_agent() -> String {
    format!("bitget-mcp/{}", env!("CARGO_PKG_VERSION"))
}

/// Parses `--modules`: empty means defaults, `all` means every module,
/// otherwise a comma list deduplicated in order.
pub fn parse_modules(raw: Option<&str>) -> Result<Vec<Module>, McpError> {
    let trimmed = raw.map(|s| s.trim().to_lowercase()).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(Module::DEFAULT.to_vec());
    }
    if trimmed == "all" {
        return Ok(Module::ALL.to_vec());
    }
    let mut out = Vec::new();
    for name in trimmed.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let module: Module = name.parse()?;
        if !out.contains(&module) {
            out.push(module);
        }
    }
    if out.is_empty() {
        return Ok(Module::DEFAULT.to_vec());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let cfg = Config::from_lookup(lookup(&[]), None, false).unwrap();
        assert!(!cfg.has_auth());
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(cfg.modules, Module::DEFAULT.to_vec());
    }

    #[test]
    fn full_credentials_and_overrides() {
        let cfg = Config::from_lookup(
            lookup(&[
                ("BITGET_API_KEY", " key "),
                ("BITGET_SECRET_KEY", "secret"),
                ("BITGET_PASSPHRASE", "pass"),
                ("BITGET_API_BASE_URL", "http://localhost:9000//"),
                ("BITGET_TIMEOUT_MS", "2500"),
            ]),
            Some("earn,spot,earn"),
            true,
        )
        .unwrap();
        let creds = cfg.credentials.as_ref().unwrap();
        assert_eq!(creds.api_key, "key");
        assert_eq!(cfg.base_url, "http://localhost:9000");
        assert_eq!(cfg.timeout_ms, 2500);
        assert_eq!(cfg.modules, vec![Module::Earn, Module::Spot]);
        assert!(cfg.read_only);
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn partial_credentials_rejected() {
        let err = Config::from_lookup(lookup(&[("BITGET_API_KEY", "k")]), None, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(err.to_string().contains("Partial"));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("BITGET_API_BASE_URL", "ftp://x")]), None, false).is_err());
        assert!(Config::from_lookup(lookup(&[("BITGET_TIMEOUT_MS", "0")]), None, false).is_err());
        assert!(Config::from_lookup(lookup(&[("BITGET_TIMEOUT_MS", "abc")]), None, false).is_err());
    }

    #[test]
    fn module_parsing() {
        assert_eq!(parse_modules(Some("ALL")).unwrap(), Module::ALL.to_vec());
        assert_eq!(parse_modules(Some(" , ")).unwrap(), Module::DEFAULT.to_vec());
        let err = parse_modules(Some("spot,margin")).unwrap_err();
        assert!(err.to_string().contains("margin"));
    }
}
