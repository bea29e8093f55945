use anyhow::Result;
use config::Config;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub dav: DavConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// Standalone deployments can seed the directory with a single local
    /// account instead of wiring an external directory client.
    pub single_user: Option<SingleUserAuthConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SingleUserAuthConfig {
    pub name: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// URL prefix the DAV tree is mounted under, e.g. `/dav`.
    pub base_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DavConfig {
    /// Maximum accepted body size for PUT of an object, in bytes.
    pub max_resource_size: usize,
    /// IANA timezone name used for floating date-times; UTC if it fails
    /// to load.
    pub timezone: String,
    /// Days scheduling objects and attendee responses are retained before
    /// the housekeeping pass drops them.
    pub scheduling_retention_days: u32,
    /// TTL for cached per-user effective privilege sets, in seconds.
    pub acl_cache_ttl_secs: u64,
}

impl DavConfig {
    /// Resolves the configured timezone, falling back to UTC when the name
    /// is unknown.
    #[must_use]
    pub fn server_tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// ## Summary
    /// Loads configuration from defaults, environment variables, and an
    /// optional `config.toml`. Environment variables take precedence over
    /// file values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it
    /// fails.
    pub fn load() -> Result<Self> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5232)?
            .set_default("server.base_prefix", crate::constants::DEFAULT_BASE_PREFIX)?
            .set_default("dav.max_resource_size", 10_485_760)?
            .set_default("dav.timezone", "UTC")?
            .set_default("dav.scheduling_retention_days", 7)?
            .set_default("dav.acl_cache_ttl_secs", 60)?
            .set_default("logging.level", "debug")?
            .add_source(
                config::Environment::default()
                    .convert_case(config::Case::Snake)
                    .separator("_")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .add_source(config::File::with_name("config.toml").required(false))
            .build()?
            .try_deserialize::<Settings>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}
