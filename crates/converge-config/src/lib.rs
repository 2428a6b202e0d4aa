//! Profile configuration for the converge engine.
//!
//! TOML profiles layered through figment (defaults, file, `CONVERGE_`
//! environment), token resolution, and translation into the engine's
//! [`EngineConfig`], the API client's [`TransportConfig`], and the
//! capability set a [`MemoryStore`] is seeded with.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use converge_api::{HttpClient, TlsMode, TransportConfig};
use converge_core::{Capability, EngineConfig, MemoryStore, OperationTimeouts};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown profile '{name}'")]
    UnknownProfile { name: String },

    #[error("no API token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("API client setup failed: {0}")]
    Client(#[from] converge_api::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named endpoint profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// HTTP request timeout, seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Pause before the first refresh after a mutation, seconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay: u64,

    /// Pause between refreshes, seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default)]
    pub timeouts: TimeoutOverrides,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            initial_delay: default_initial_delay(),
            poll_interval: default_poll_interval(),
            insecure: false,
            timeouts: TimeoutOverrides::default(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}
fn default_initial_delay() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    3
}

/// Per-operation-class wait timeouts, seconds. Unset entries fall through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeoutOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<u64>,
}

impl TimeoutOverrides {
    /// Fill unset entries from `fallback`.
    fn or(self, fallback: Self) -> Self {
        Self {
            create: self.create.or(fallback.create),
            update: self.update.or(fallback.update),
            delete: self.delete.or(fallback.delete),
        }
    }

    fn apply(self, base: OperationTimeouts) -> OperationTimeouts {
        OperationTimeouts {
            create: self.create.map_or(base.create, Duration::from_secs),
            update: self.update.map_or(base.update, Duration::from_secs),
            delete: self.delete.map_or(base.delete, Duration::from_secs),
        }
    }
}

/// A named remote endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct Profile {
    /// API base URL (e.g., "https://api.example.com").
    pub endpoint: String,

    /// Environment variable name containing the API token.
    pub token_env: Option<String>,

    /// API token (plaintext, prefer `token_env`).
    pub token: Option<String>,

    /// Optional features the account behind this endpoint has enabled.
    /// Absent means everything is enabled.
    pub capabilities: Option<Vec<Capability>>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override HTTP request timeout.
    pub request_timeout: Option<u64>,

    #[serde(default)]
    pub timeouts: TimeoutOverrides,
}

impl Config {
    /// Look up `name`, or the default profile when `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .ok_or_else(|| ConfigError::Validation {
                field: "default_profile".into(),
                reason: "no profile selected and no default configured".into(),
            })?;
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "converge", "converge").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("converge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys nest on `__`, e.g.
/// `CONVERGE_PROFILES__PROD__ENDPOINT`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CONVERGE_").split("__"));

    let config: Config = figment.extract()?;
    validate(&config)?;
    Ok(config)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.defaults.poll_interval == 0 {
        return Err(ConfigError::Validation {
            field: "defaults.poll_interval".into(),
            reason: "must be at least one second".into(),
        });
    }
    for (name, profile) in &cfg.profiles {
        url::Url::parse(&profile.endpoint).map_err(|e| ConfigError::Validation {
            field: format!("profiles.{name}.endpoint"),
            reason: format!("invalid URL '{}': {e}", profile.endpoint),
        })?;
        let zero = [
            ("create", profile.timeouts.create),
            ("update", profile.timeouts.update),
            ("delete", profile.timeouts.delete),
        ]
        .into_iter()
        .find(|(_, secs)| *secs == Some(0));
        if let Some((class, _)) = zero {
            return Err(ConfigError::Validation {
                field: format!("profiles.{name}.timeouts.{class}"),
                reason: "must be at least one second".into(),
            });
        }
    }
    Ok(())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile translation ─────────────────────────────────────────────

/// Resolve the API token: `token_env` lookup first, then plaintext.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(val) = profile
        .token_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
    {
        return Ok(SecretString::from(val));
    }

    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Engine settings for `profile`: profile overrides, then global
/// defaults, then the engine's built-in timeouts.
pub fn profile_to_engine_config(defaults: &Defaults, profile: &Profile) -> EngineConfig {
    let timeouts = profile
        .timeouts
        .or(defaults.timeouts)
        .apply(OperationTimeouts::default());

    EngineConfig {
        timeouts,
        initial_delay: Duration::from_secs(defaults.initial_delay),
        min_poll_interval: Duration::from_secs(defaults.poll_interval),
    }
}

pub fn profile_to_transport_config(defaults: &Defaults, profile: &Profile) -> TransportConfig {
    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    TransportConfig {
        tls,
        timeout: Duration::from_secs(profile.request_timeout.unwrap_or(defaults.request_timeout)),
        ..TransportConfig::default()
    }
}

/// Store seeded with the profile's capability set.
pub fn profile_store(profile: &Profile) -> MemoryStore {
    match &profile.capabilities {
        Some(caps) => MemoryStore::with_capabilities(caps.iter().copied()),
        None => MemoryStore::new(),
    }
}

/// Build an authenticated API client for `profile`.
pub fn profile_client(
    defaults: &Defaults,
    profile: &Profile,
    profile_name: &str,
) -> Result<HttpClient, ConfigError> {
    let token = resolve_token(profile, profile_name)?;
    let transport = profile_to_transport_config(defaults, profile);
    Ok(HttpClient::from_token(&profile.endpoint, &token, &transport)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use converge_core::ConfigStore;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "prod"

[defaults]
poll_interval = 5

[defaults.timeouts]
delete = 600

[profiles.prod]
endpoint = "https://api.example.test"
token_env = "CONVERGE_TEST_TOKEN"
capabilities = ["oidc", "audit_log"]

[profiles.prod.timeouts]
create = 3600

[profiles.lab]
endpoint = "https://lab.example.test"
token = "lab-token"
insecure = true
"#;

    fn profile(endpoint: &str) -> Profile {
        Profile {
            endpoint: endpoint.into(),
            token_env: None,
            token: None,
            capabilities: None,
            ca_cert: None,
            insecure: None,
            request_timeout: None,
            timeouts: TimeoutOverrides::default(),
        }
    }

    #[test]
    fn loads_profiles_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            let cfg = load_config_from(Path::new("config.toml")).unwrap();

            let (name, prod) = cfg.profile(None).unwrap();
            assert_eq!(name, "prod");
            assert_eq!(
                prod.capabilities,
                Some(vec![Capability::Oidc, Capability::AuditLog])
            );

            let engine = profile_to_engine_config(&cfg.defaults, prod);
            assert_eq!(engine.timeouts.create, Duration::from_secs(3600));
            assert_eq!(engine.timeouts.delete, Duration::from_secs(600));
            assert_eq!(engine.timeouts.update, OperationTimeouts::default().update);
            assert_eq!(engine.min_poll_interval, Duration::from_secs(5));
            assert_eq!(engine.initial_delay, Duration::from_secs(10));
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("CONVERGE_DEFAULT_PROFILE", "lab");
            jail.set_env("CONVERGE_DEFAULTS__POLL_INTERVAL", "7");
            let cfg = load_config_from(Path::new("config.toml")).unwrap();

            let (name, lab) = cfg.profile(None).unwrap();
            assert_eq!(name, "lab");
            assert_eq!(cfg.defaults.poll_interval, 7);
            assert_eq!(
                profile_to_transport_config(&cfg.defaults, lab).tls,
                TlsMode::DangerAcceptInvalid
            );
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_| {
            let cfg = load_config_from(Path::new("absent.toml")).unwrap();
            assert_eq!(cfg.default_profile.as_deref(), Some("default"));
            assert!(cfg.profiles.is_empty());
            assert!(matches!(
                cfg.profile(None),
                Err(ConfigError::UnknownProfile { name }) if name == "default"
            ));
            Ok(())
        });
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[profiles.bad]\nendpoint = \"not a url\"\n")?;
            let err = load_config_from(Path::new("config.toml")).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Validation { ref field, .. } if field == "profiles.bad.endpoint"
            ));
            Ok(())
        });
    }

    #[test]
    fn zero_timeout_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[profiles.p]\nendpoint = \"https://a.test\"\n[profiles.p.timeouts]\nupdate = 0\n",
            )?;
            let err = load_config_from(Path::new("config.toml")).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Validation { ref field, .. } if field == "profiles.p.timeouts.update"
            ));
            Ok(())
        });
    }

    #[test]
    fn save_then_load_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        let mut p = profile("https://api.example.test");
        p.capabilities = Some(vec![Capability::IpAcl]);
        p.timeouts.update = Some(120);
        cfg.profiles.insert("default".into(), p);
        save_config_to(&path, &cfg).unwrap();

        let back = load_config_from(&path).unwrap();
        let (_, p) = back.profile(None).unwrap();
        assert_eq!(p.endpoint, "https://api.example.test");
        assert_eq!(p.capabilities, Some(vec![Capability::IpAcl]));
        assert_eq!(p.timeouts.update, Some(120));
    }

    #[test]
    fn token_env_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("CONVERGE_TEST_TOKEN", "from-env");
            let mut p = profile("https://api.example.test");
            p.token = Some("plain".into());
            p.token_env = Some("CONVERGE_TEST_TOKEN".into());
            assert_eq!(resolve_token(&p, "prod").unwrap().expose_secret(), "from-env");

            p.token_env = Some("CONVERGE_UNSET_TOKEN".into());
            assert_eq!(resolve_token(&p, "prod").unwrap().expose_secret(), "plain");

            p.token = None;
            assert!(matches!(
                resolve_token(&p, "prod"),
                Err(ConfigError::NoCredentials { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn transport_prefers_custom_ca_when_verified() {
        let mut p = profile("https://api.example.test");
        p.ca_cert = Some(PathBuf::from("/etc/ca.pem"));
        p.request_timeout = Some(5);
        let t = profile_to_transport_config(&Defaults::default(), &p);
        assert_eq!(t.tls, TlsMode::CustomCa(PathBuf::from("/etc/ca.pem")));
        assert_eq!(t.timeout, Duration::from_secs(5));
    }

    #[test]
    fn store_is_seeded_with_capabilities() {
        let mut p = profile("https://api.example.test");
        assert!(profile_store(&p).supports(Capability::PrivateNetwork));

        p.capabilities = Some(vec![Capability::Oidc]);
        let store = profile_store(&p);
        assert!(store.supports(Capability::Oidc));
        assert!(!store.supports(Capability::PrivateNetwork));
    }

    #[test]
    fn client_requires_a_token() {
        let p = profile("https://api.example.test");
        assert!(matches!(
            profile_client(&Defaults::default(), &p, "prod"),
            Err(ConfigError::NoCredentials { .. })
        ));
    }
}
