//! Service configuration.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

/// Which storage backend the service runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process tables; data is lost on restart.
    Memory,
    /// `RocksDB` under `data_dir`.
    RocksDb,
    /// PostgreSQL at `database_url`.
    Postgres,
}

impl StoreBackend {
    /// The backend used when `STORE_BACKEND` is unset.
    #[must_use]
    pub const fn compiled_default() -> Self {
        if cfg!(feature = "rocksdb-backend") {
            Self::RocksDb
        } else {
            Self::Memory
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rocksdb" | "rocks" => Ok(Self::RocksDb),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Storage backend (default: `rocksdb` when compiled in, else `memory`).
    pub store_backend: StoreBackend,

    /// Path to `RocksDB` data directory (default: "/data/tally").
    pub data_dir: String,

    /// PostgreSQL connection string.
    pub database_url: Option<String>,

    /// Maximum PostgreSQL pool size.
    pub database_max_connections: u32,

    /// HS256 secret for user tokens. User routes reject every request when unset.
    pub jwt_secret: Option<String>,

    /// Expected JWT audience (default: "tally").
    pub jwt_audience: String,

    /// Service API key for admin and service-to-service routes.
    pub service_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Interval between periodic snapshot runs. `None` disables the job.
    pub snapshot_interval_seconds: Option<u64>,
}

/// Secrets file structure.
#[derive(Debug, Default, Deserialize)]
struct TallySecrets {
    #[serde(default)]
    jwt_secret: Option<String>,
    #[serde(default)]
    service_api_key: Option<String>,
    #[serde(default)]
    database_url: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and the secrets file.
    ///
    /// Values in `.secrets/tally.json` win over the matching environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let secrets = load_tally_secrets();

        let store_backend = match std::env::var("STORE_BACKEND") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "Falling back to default store backend");
                StoreBackend::compiled_default()
            }),
            Err(_) => StoreBackend::compiled_default(),
        };

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            store_backend,
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/tally".into()),
            database_url: secrets
                .database_url
                .or_else(|| std::env::var("DATABASE_URL").ok()),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
            jwt_secret: secrets
                .jwt_secret
                .or_else(|| std::env::var("JWT_SECRET").ok()),
            jwt_audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "tally".into()),
            service_api_key: secrets
                .service_api_key
                .or_else(|| std::env::var("SERVICE_API_KEY").ok()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS").unwrap_or(30),
            snapshot_interval_seconds: env_parse("SNAPSHOT_INTERVAL_SECONDS")
                .filter(|secs| *secs > 0),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Load secrets from the first secrets file found.
fn load_tally_secrets() -> TallySecrets {
    let secret_paths = [".secrets/tally.json", "../.secrets/tally.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<TallySecrets>(path) {
            tracing::info!(path = %path, "Loaded secrets from file");
            return secrets;
        }
    }

    tracing::debug!("Secrets file not found, using environment variables");
    TallySecrets::default()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            store_backend: StoreBackend::compiled_default(),
            data_dir: "/data/tally".into(),
            database_url: None,
            database_max_connections: 10,
            jwt_secret: None,
            jwt_audience: "tally".into(),
            service_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            snapshot_interval_seconds: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!("memory".parse(), Ok(StoreBackend::Memory));
        assert_eq!("RocksDB".parse(), Ok(StoreBackend::RocksDb));
        assert_eq!(" postgres ".parse(), Ok(StoreBackend::Postgres));
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.jwt_audience, "tally");
        assert_eq!(config.data_dir, "/data/tally");
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert!(config.snapshot_interval_seconds.is_none());
    }
}
