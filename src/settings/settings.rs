use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub redis: Redis,
    pub mysql: Mysql,
    pub kafka: Kafka,
    pub http: Http,
    pub log: Log,
}

#[derive(Deserialize)]
pub struct Auth {
    pub backend: String, // "memory" or "real"
    #[serde(default)]
    pub signing_secret: String,
    pub issuer: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    #[serde(default = "default_used_marker_ttl_secs")]
    pub used_marker_ttl_secs: u64,
    #[serde(default = "default_audit_timeout_ms")]
    pub audit_timeout_ms: u64,
    #[serde(default = "default_hash_memory_kib")]
    pub hash_memory_kib: u32,
    #[serde(default = "default_hash_iterations")]
    pub hash_iterations: u32,
    #[serde(default = "default_hash_parallelism")]
    pub hash_parallelism: u32,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("backend", &self.backend)
            .field("signing_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("used_marker_ttl_secs", &self.used_marker_ttl_secs)
            .field("audit_timeout_ms", &self.audit_timeout_ms)
            .field("hash_memory_kib", &self.hash_memory_kib)
            .field("hash_iterations", &self.hash_iterations)
            .field("hash_parallelism", &self.hash_parallelism)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Redis {
    pub dsn: String,
    pub prefix: String,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Mysql {
    pub dsn: String,
}

#[derive(Debug, Deserialize)]
pub struct Kafka {
    pub enabled: bool,
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    #[serde(default = "default_true")]
    pub secure_cookie: bool,
    /// Requests per client and route within one window; 0 turns limiting off.
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

fn default_used_marker_ttl_secs() -> u64 {
    300
}

fn default_audit_timeout_ms() -> u64 {
    2_000
}

fn default_hash_memory_kib() -> u32 {
    19 * 1024
}

fn default_hash_iterations() -> u32 {
    2
}

fn default_hash_parallelism() -> u32 {
    1
}

fn default_op_timeout_ms() -> u64 {
    500
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_rate_limit_requests() -> u32 {
    1_000
}

fn default_rate_limit_window_secs() -> u64 {
    3_600
}

fn default_topic() -> String {
    "log-event".to_string()
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Startup checks. Any failure here is fatal for the process.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.auth.backend.as_str(), "memory" | "real") {
            return Err(anyhow!("Unknown auth backend: {}", self.auth.backend));
        }
        if self.auth.signing_secret.is_empty() {
            return Err(anyhow!(
                "auth.signing_secret is required (set TURNSTILE__AUTH__SIGNING_SECRET)"
            ));
        }
        if self.auth.issuer.is_empty() {
            return Err(anyhow!("auth.issuer is required"));
        }
        if self.auth.access_ttl_secs == 0 || self.auth.refresh_ttl_secs == 0 {
            return Err(anyhow!("token TTLs must be positive"));
        }
        if self.auth.refresh_ttl_secs < self.auth.access_ttl_secs {
            return Err(anyhow!("auth.refresh_ttl_secs must not be shorter than access_ttl_secs"));
        }
        if self.auth.used_marker_ttl_secs == 0 {
            return Err(anyhow!("auth.used_marker_ttl_secs must be positive"));
        }
        if self.http.cert_path.is_some() != self.http.key_path.is_some() {
            return Err(anyhow!("http.cert_path and http.key_path must be set together"));
        }
        if self.http.rate_limit_requests > 0 && self.http.rate_limit_window_secs == 0 {
            return Err(anyhow!("http.rate_limit_window_secs must be positive"));
        }
        crate::logger::parse_filter(&self.log.filter)?;
        Ok(())
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub const ENV_PREFIX: &str = "TURNSTILE";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BASE: &str = r#"
[auth]
backend = "memory"
issuer = "turnstile.test"
access_ttl_secs = 900
refresh_ttl_secs = 604800

[redis]
dsn = "redis://127.0.0.1:6379"
prefix = "auth"

[mysql]
dsn = "mysql://u:p@localhost:3306/db"

[kafka]
enabled = false
brokers = "localhost:9092"
client_id = "turnstile"

[http]
address = "127.0.0.1:8080"

[log]
filter = "info"
"#;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn with_secret(secret: &str) -> String {
        BASE.replace(
            "[auth]\n",
            &format!("[auth]\nsigning_secret = \"{}\"\n", secret),
        )
    }

    #[test]
    fn loads_with_defaults() {
        let file = write(&with_secret("s3cret"));
        let settings = parse_settings(file.path().to_str()).unwrap();
        assert_eq!(settings.auth.used_marker_ttl_secs, 300);
        assert_eq!(settings.kafka.topic, "log-event");
        assert_eq!(settings.redis.op_timeout_ms, 500);
        assert!(settings.http.secure_cookie);
        assert_eq!(settings.http.rate_limit_requests, 1_000);
        assert_eq!(settings.http.rate_limit_window_secs, 3_600);
        assert!(!settings.http.trust_forwarded_for);
    }

    #[test]
    fn zero_rate_limit_window_is_rejected() {
        let contents = with_secret("s3cret").replace(
            "address = \"127.0.0.1:8080\"",
            "address = \"127.0.0.1:8080\"\nrate_limit_window_secs = 0",
        );
        let file = write(&contents);
        assert!(parse_settings(file.path().to_str()).is_err());
    }

    #[test]
    fn missing_signing_secret_is_fatal() {
        let file = write(BASE);
        let err = parse_settings(file.path().to_str()).unwrap_err();
        assert!(err.to_string().contains("signing_secret"));
    }

    #[test]
    fn refresh_shorter_than_access_is_rejected() {
        let contents = with_secret("s3cret").replace("refresh_ttl_secs = 604800", "refresh_ttl_secs = 60");
        let file = write(&contents);
        assert!(parse_settings(file.path().to_str()).is_err());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let contents = with_secret("s3cret").replace("backend = \"memory\"", "backend = \"carrier-pigeon\"");
        let file = write(&contents);
        assert!(parse_settings(file.path().to_str()).is_err());
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let file = write(&with_secret("do-not-print-me"));
        let settings = parse_settings(file.path().to_str()).unwrap();
        assert!(!format!("{:?}", settings).contains("do-not-print-me"));
    }

    #[test]
    fn blank_log_filter_is_rejected() {
        let contents = with_secret("s3cret").replace("filter = \"info\"", "filter = \"\"");
        let file = write(&contents);
        assert!(parse_settings(file.path().to_str()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_settings(Some("")).is_err());
    }
}
