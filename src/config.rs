use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_PATH: &str = "/api";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub api: ApiConfig,
    pub devices: DeviceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub idle_timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_path: String,
    pub enable_swagger: bool,
}

/// Device admission settings. Only the startup default lives here; the live
/// limit is held in a managed `CapacityLimit` and mutable through the admin
/// API without a restart.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    pub max_per_user: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/device_gate".to_string(),
            max_connections: 16,
            min_connections: 4,
            acquire_timeout: 5,
            idle_timeout: 30,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_API_BASE_PATH.to_string(),
            enable_swagger: true,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { max_per_user: 2 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            cors: CorsConfig::default(),
            api: ApiConfig::default(),
            devices: DeviceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. DeviceGate.toml (base configuration file)
    /// 2. Environment variables (prefixed with DEVICEGATE_)
    /// 3. DATABASE_URL environment variable (for backwards compatibility)
    pub fn load() -> Result<Self, figment::Error> {
        let figment = Figment::new()
            // Start with defaults
            .merge(Toml::string(&toml::to_string(&Config::default()).unwrap()).nested())
            // Layer on DeviceGate.toml if it exists
            .merge(Toml::file("DeviceGate.toml").nested())
            // Layer on environment variables (e.g., DEVICEGATE_DATABASE_URL)
            .merge(Env::prefixed("DEVICEGATE_").split("_"))
            // Special case: DATABASE_URL for backwards compatibility
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()));

        figment.extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_two() {
        let config = Config::default();
        assert_eq!(config.devices.max_per_user, 2);
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let serialized = toml::to_string(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.api.base_path, DEFAULT_API_BASE_PATH);
        assert_eq!(parsed.devices.max_per_user, 2);
        assert_eq!(parsed.database.acquire_timeout, 5);
        assert_eq!(parsed.database.idle_timeout, 30);
    }
}
