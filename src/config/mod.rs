use std::env;

/// Which backend holds uploaded file bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Files under `upload_dir`, served back through `/files/*key`
    Local,
    /// S3-compatible bucket (MinIO, AWS)
    S3,
}

impl StorageBackend {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "s3" | "minio" => StorageBackend::S3,
            _ => StorageBackend::Local,
        }
    }
}

/// Which store tracks admin sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBackend {
    Database,
    Memory,
}

impl SessionBackend {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "memory" | "mem" => SessionBackend::Memory,
            _ => SessionBackend::Database,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: String,
    /// Base used to build public download URLs (default: `{endpoint}/{bucket}`)
    pub public_url: Option<String>,
}

/// Per-client request budget on the write routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window; 0 disables limiting
    pub max_requests: u32,
    pub window_secs: u64,
    /// Key clients by the first `X-Forwarded-For` hop (only behind a trusted proxy)
    pub trust_forwarded: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_secs: 600,
            trust_forwarded: false,
        }
    }
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://labshare.db?mode=rwc";

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SeaORM connection string (SQLite or PostgreSQL)
    pub database_url: String,

    /// Maximum size of a single attachment in bytes (default: 5 MB)
    pub max_file_size: usize,

    /// Lowercase extensions accepted by the intake
    pub allowed_extensions: Vec<String>,

    /// Reject images that don't look like output screenshots
    pub screen_images: bool,

    /// Admin login name
    pub admin_username: String,

    /// Plaintext admin password, hashed at startup
    pub admin_password: Option<String>,

    /// Ready argon2 PHC string; takes precedence over `admin_password`
    pub admin_password_hash: Option<String>,

    /// Secret used to sign session tokens
    pub session_secret: String,

    /// Session lifetime in hours (default: 12)
    pub session_ttl_hours: i64,

    pub session_backend: SessionBackend,

    /// Mark the session cookie `Secure`
    pub cookie_secure: bool,

    pub storage_backend: StorageBackend,

    /// Root directory of the local storage backend
    pub upload_dir: String,

    /// Externally reachable base URL of this server
    pub public_base_url: String,

    pub s3: S3Config,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,

    pub rate_limit: RateLimitConfig,
}

pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] =
    &["pdf", "docx", "png", "jpg", "jpeg", "py", "ipynb", "txt"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_file_size: 5 * 1024 * 1024, // 5 MB
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            screen_images: true,
            admin_username: "admin".to_string(),
            admin_password: None,
            admin_password_hash: None,
            session_secret: "secret".to_string(),
            session_ttl_hours: 12,
            session_backend: SessionBackend::Database,
            cookie_secure: false,
            storage_backend: StorageBackend::Local,
            upload_dir: "uploads".to_string(),
            public_base_url: "http://localhost:5000".to_string(),
            s3: S3Config {
                bucket: "labshare".to_string(),
                ..Default::default()
            },
            allowed_origins: vec![
                "http://localhost:5000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:5173".to_string(),
            ],
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn random_secret() -> String {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

fn parse_flag(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                .ok()
                .map(|v| parse_list(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or(default.allowed_extensions),

            screen_images: env::var("SCREEN_IMAGES")
                .map(|v| parse_flag(&v))
                .unwrap_or(default.screen_images),

            admin_username: env::var("ADMIN_USERNAME").unwrap_or(default.admin_username),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty()),
            admin_password_hash: env::var("ADMIN_PASSWORD_HASH")
                .ok()
                .filter(|v| !v.is_empty()),

            session_secret: env::var("SESSION_SECRET")
                .or_else(|_| env::var("SECRET_KEY"))
                .unwrap_or(default.session_secret),

            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|h: &i64| *h > 0)
                .unwrap_or(default.session_ttl_hours),

            session_backend: env::var("SESSION_STORE")
                .map(|v| SessionBackend::parse(&v))
                .unwrap_or(default.session_backend),

            cookie_secure: env::var("COOKIE_SECURE")
                .map(|v| parse_flag(&v))
                .unwrap_or(default.cookie_secure),

            storage_backend: env::var("STORAGE_BACKEND")
                .map(|v| StorageBackend::parse(&v))
                .unwrap_or(default.storage_backend),

            upload_dir: env::var("UPLOAD_DIR").unwrap_or(default.upload_dir),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(default.public_base_url),

            s3: S3Config {
                endpoint: env::var("S3_ENDPOINT").ok(),
                access_key: env::var("S3_ACCESS_KEY").ok(),
                secret_key: env::var("S3_SECRET_KEY").ok(),
                bucket: env::var("S3_BUCKET").unwrap_or(default.s3.bucket),
                public_url: env::var("S3_PUBLIC_URL").ok(),
            },

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),

            rate_limit: RateLimitConfig {
                max_requests: env::var("RATE_LIMIT_REQUESTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default.rate_limit.max_requests),
                window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|s: &u64| *s > 0)
                    .unwrap_or(default.rate_limit.window_secs),
                trust_forwarded: env::var("TRUST_PROXY_HEADERS")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(default.rate_limit.trust_forwarded),
            },
        }
    }

    /// Create config for development (no image screening, in-memory sessions)
    pub fn development() -> Self {
        Self {
            screen_images: false,
            admin_password: Some("admin".to_string()),
            session_backend: SessionBackend::Memory,
            ..Self::default()
        }
    }

    /// Environment config with development fallbacks for missing secrets
    pub fn development_from_env() -> Self {
        let mut config = Self::from_env();
        if config.admin_password.is_none() && config.admin_password_hash.is_none() {
            tracing::warn!("⚠️  No admin password configured, using development default 'admin'");
            config.admin_password = Some("admin".to_string());
        }
        if env::var("SESSION_SECRET").is_err() && env::var("SECRET_KEY").is_err() {
            // Sessions won't survive a restart
            config.session_secret = random_secret();
        }
        config
    }

    /// Create config for production (secure cookies, explicit secrets)
    pub fn production() -> anyhow::Result<Self> {
        let mut config = Self::from_env();
        config.session_secret = env::var("SESSION_SECRET")
            .map_err(|_| anyhow::anyhow!("SESSION_SECRET must be set in production"))?;
        if config.admin_password.is_none() && config.admin_password_hash.is_none() {
            anyhow::bail!("ADMIN_PASSWORD or ADMIN_PASSWORD_HASH must be set in production");
        }
        config.cookie_secure = env::var("COOKIE_SECURE")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);
        Ok(config)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}
