use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AuthenticatorConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_login_path() -> String {
    "bin/login/XWiki/XWikiLogin".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AuthConfig {
    pub account_type: String,
    pub base_token_type: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                url: "https://www.xwiki.org/xwiki/".to_string(),
                login_path: default_login_path(),
                timeout_secs: default_timeout_secs(),
            },
            storage: StorageConfig {
                db_path: "./data/authenticator".to_string(),
            },
            auth: AuthConfig {
                account_type: "org.xwiki.android.sync".to_string(),
                base_token_type: "Full access".to_string(),
            },
            log: LogConfig::default(),
        }
    }
}

impl AuthenticatorConfig {
    /// `load_or_default` under a scoped subscriber writing to `make_writer`.
    /// The global subscriber needs `log.level`, so it cannot exist yet.
    pub fn load_logged<W>(path: &str, make_writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let startup = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::with_default(startup, || Self::load_or_default(path))
    }

    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => {
                        info!("Config loaded from {}", path);
                        c
                    }
                    Err(e) => {
                        warn!("Error parsing config: {}. Using defaults.", e);
                        Self::default()
                    }
                },
                Err(e) => {
                    warn!("Error reading config: {}. Using defaults.", e);
                    Self::default()
                }
            }
        } else {
            info!("Config file not found at '{}'. Creating default.", path);
            let config = Self::default();
            match toml::to_string_pretty(&config) {
                Ok(s) => {
                    if let Err(e) = std::fs::write(path, s) {
                        warn!("Could not write default config to {}: {}", path, e);
                    }
                }
                Err(e) => warn!("Could not render default config: {}", e),
            }
            config
        }
    }
}
