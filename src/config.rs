//! Application configuration loaded from environment variables.
//!
//! Everything the services need (signing secrets, token lifetimes, media host
//! credentials) is read once at startup and passed down explicitly.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which `UserStore` implementation backs the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Cloudinary account settings.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// API origin, overridable for tests
    pub base_url: String,
    /// Per-request timeout for uploads and deletes
    pub timeout: Duration,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Allowed CORS origin for the frontend
    pub cors_origin: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    /// Directory where multipart uploads are spooled before hand-off
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Mark session cookies `Secure` (disable only for plain-HTTP development)
    pub cookie_secure: bool,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub bcrypt_cost: u32,

    // --- Secrets ---
    pub access_token_secret: Vec<u8>,
    pub refresh_token_secret: Vec<u8>,
    pub cloudinary: CloudinaryConfig,
}

impl Config {
    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            cors_origin: "http://localhost:3000".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8000,
            store_backend: StoreBackend::Memory,
            upload_dir: env::temp_dir().join("vidtube-uploads"),
            max_upload_bytes: 10 * 1024 * 1024,
            cookie_secure: true,
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(10 * 24 * 60 * 60),
            bcrypt_cost: 4,
            access_token_secret: b"test_access_secret_32_bytes_min!".to_vec(),
            refresh_token_secret: b"test_refresh_secret_32_bytes_mn!".to_vec(),
            cloudinary: CloudinaryConfig {
                cloud_name: "demo".to_string(),
                api_key: "test_api_key".to_string(),
                api_secret: "test_api_secret".to_string(),
                base_url: "https://api.cloudinary.com".to_string(),
                timeout: Duration::from_secs(30),
            },
        }
    }

    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let store_backend = match env::var("USER_STORE")
            .unwrap_or_else(|_| "firestore".to_string())
            .as_str()
        {
            "firestore" => StoreBackend::Firestore,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid(
                    "USER_STORE",
                    format!("unknown backend '{}'", other),
                ))
            }
        };

        let access_token_secret = required("ACCESS_TOKEN_SECRET")?.into_bytes();
        let refresh_token_secret = required("REFRESH_TOKEN_SECRET")?.into_bytes();
        if access_token_secret == refresh_token_secret {
            return Err(ConfigError::Invalid(
                "REFRESH_TOKEN_SECRET",
                "must differ from ACCESS_TOKEN_SECRET".to_string(),
            ));
        }

        Ok(Self {
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            store_backend,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./public/temp")),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            cookie_secure: parse_or("COOKIE_SECURE", true)?,
            access_token_ttl: duration_or("ACCESS_TOKEN_EXPIRY", "15m")?,
            refresh_token_ttl: duration_or("REFRESH_TOKEN_EXPIRY", "10d")?,
            bcrypt_cost: parse_or("BCRYPT_COST", 10)?,
            access_token_secret,
            refresh_token_secret,
            cloudinary: CloudinaryConfig {
                cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
                api_key: required("CLOUDINARY_API_KEY")?,
                api_secret: required("CLOUDINARY_API_SECRET")?,
                base_url: env::var("CLOUDINARY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.cloudinary.com".to_string()),
                timeout: Duration::from_secs(parse_or("MEDIA_HTTP_TIMEOUT_SECS", 30)?),
            },
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(key))
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}

fn duration_or(key: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    parse_duration(&raw).ok_or(ConfigError::Invalid(key, raw))
}

/// Parse `90`, `30s`, `15m`, `12h` or `10d` into a duration.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = digits.parse().ok()?;
    let secs = match unit {
        "s" => value,
        "m" => value.checked_mul(60)?,
        "h" => value.checked_mul(60 * 60)?,
        "d" => value.checked_mul(24 * 60 * 60)?,
        _ => return None,
    };
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
