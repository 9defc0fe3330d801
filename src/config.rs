use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Base mainnet chain id.
pub const BASE_MAINNET_CHAIN_ID: u64 = 8453;
/// Base Sepolia chain id.
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;

#[derive(Clone)]
pub struct Config {
    // Redis
    pub redis_url: String,

    // Server
    pub bind_addr: SocketAddr,

    // Canonical identity of the app, used in sign-in messages
    pub app_origin: String,
    pub app_domain: String,
    pub production: bool,

    // Chain access
    pub chain_id: u64,
    pub rpc_urls: HashMap<u64, String>,
    pub rpc_timeout_secs: u64,

    // TTLs (in seconds)
    pub session_ttl_secs: u64,
    pub nonce_ttl_secs: u64,

    // Uploads
    pub max_upload_bytes: usize,
    pub image_storage_path: PathBuf,

    // Rate limiting
    pub rate_limit_auth_per_min: u32,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("bind_addr", &self.bind_addr)
            .field("app_origin", &self.app_origin)
            .field("app_domain", &self.app_domain)
            .field("production", &self.production)
            .field("chain_id", &self.chain_id)
            .field("rpc_urls", &self.rpc_urls)
            .field("rpc_timeout_secs", &self.rpc_timeout_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("image_storage_path", &self.image_storage_path)
            .field("rate_limit_auth_per_min", &self.rate_limit_auth_per_min)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let redis_url =
            lookup("REDIS_URL").ok_or_else(|| ConfigError::MissingVar("REDIS_URL".to_string()))?;

        // Server
        let bind_addr_str = var_or("BIND_ADDR", "0.0.0.0:3000");
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;

        // Sign-in messages always carry this origin, never the one a request arrived from
        let origin_str = var_or("APP_ORIGIN", "http://localhost:3000");
        let (app_origin, app_domain) = parse_origin(&origin_str)?;

        let production = lookup("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        // Chain access
        let chain_id = parse_or_default(&lookup, "CHAIN_ID", BASE_SEPOLIA_CHAIN_ID)?;
        let mut rpc_urls = HashMap::new();
        rpc_urls.insert(
            BASE_MAINNET_CHAIN_ID,
            var_or("BASE_MAINNET_RPC_URL", "https://mainnet.base.org"),
        );
        rpc_urls.insert(
            BASE_SEPOLIA_CHAIN_ID,
            var_or("BASE_SEPOLIA_RPC_URL", "https://sepolia.base.org"),
        );
        let rpc_timeout_secs = parse_or_default(&lookup, "RPC_TIMEOUT_SECS", 10)?;

        // TTLs
        let session_ttl_secs = parse_or_default(&lookup, "SESSION_TTL_SECS", 86_400)?;
        // Cookie Max-Age is a signed 64-bit count of seconds
        if i64::try_from(session_ttl_secs).is_err() {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_SECS".to_string(),
                format!("must be at most {}", i64::MAX),
            ));
        }
        let nonce_ttl_secs = parse_or_default(&lookup, "NONCE_TTL_SECS", 600)?;
        if nonce_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "NONCE_TTL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // Uploads
        let max_upload_bytes = parse_or_default(&lookup, "MAX_UPLOAD_BYTES", 2 * 1024 * 1024)?;
        let image_storage_path = PathBuf::from(var_or("IMAGE_STORAGE_PATH", "data/question-images"));

        // Rate limiting
        let rate_limit_auth_per_min = parse_or_default(&lookup, "RATE_LIMIT_AUTH_PER_MIN", 30)?;

        Ok(Config {
            redis_url,
            bind_addr,
            app_origin,
            app_domain,
            production,
            chain_id,
            rpc_urls,
            rpc_timeout_secs,
            session_ttl_secs,
            nonce_ttl_secs,
            max_upload_bytes,
            image_storage_path,
            rate_limit_auth_per_min,
        })
    }

    /// Public URL for an object written to the image store.
    pub fn image_url(&self, object_name: &str) -> String {
        format!("{}/images/{}", self.app_origin, object_name)
    }
}

/// Split an origin like `https://example.app:8443` into the normalised origin
/// and its bare hostname.
fn parse_origin(raw: &str) -> Result<(String, String), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue("APP_ORIGIN".to_string(), reason.to_string());

    let origin = raw.trim().trim_end_matches('/');
    let authority = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .ok_or_else(|| invalid("must start with http:// or https://"))?;

    if authority.is_empty() || authority.contains('/') || authority.contains(char::is_whitespace) {
        return Err(invalid("must be scheme://host[:port] with no path"));
    }

    let host = match authority.strip_prefix('[') {
        // IPv6 literal keeps its brackets
        Some(rest) => {
            let end = rest.find(']').ok_or_else(|| invalid("unterminated IPv6 host"))?;
            format!("[{}]", &rest[..end])
        }
        None => authority
            .split(':')
            .next()
            .unwrap_or(authority)
            .to_string(),
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }

    Ok((origin.to_string(), host))
}

/// Parse a variable with a default value when it is unset
fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        None => Ok(default),
    }
}
