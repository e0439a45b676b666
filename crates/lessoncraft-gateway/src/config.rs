//! Gateway configuration from the flat key/value environment.

use std::time::Duration;

/// All runtime tunables, read once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address, e.g. `0.0.0.0:3000`.
    pub listen_addr: String,
    /// Path of the document database.
    pub data_dir: String,
    /// Domain served by the bootstrap playground.
    pub playground_domain: String,
    /// Default DinD sandbox image.
    pub default_dind_image: String,
    /// Images learners may select (comma-separated in the environment).
    pub available_dind_images: Vec<String>,
    /// Whether Windows instances are enabled.
    pub windows_enabled: bool,
    /// Default session duration.
    pub default_session_duration: Duration,
    /// Load-average cap for session admission.
    pub max_load_avg: f64,
    /// AppArmor profile applied to sandboxes.
    pub apparmor_profile: String,
    /// Secret for signing auth tokens and cookies.
    pub cookie_secret: String,
    /// Token granting admin role without a user login.
    pub admin_token: Option<String>,
    /// TLS certificate path, when serving TLS.
    pub tls_cert: Option<String>,
    /// TLS key path, when serving TLS.
    pub tls_key: Option<String>,
    /// Port DinD daemons listen on.
    pub engine_port: u16,
    /// Port exposed for SSH into instances.
    pub ssh_port: u16,
    /// Port of the embedded DNS resolver.
    pub dns_port: u16,
    /// Requests per second admitted by the rate limiter.
    pub rate_limit_rps: u32,
    /// Lesson cache TTL.
    pub lesson_cache_ttl: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl GatewayConfig {
    /// Load configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let images = env_or("AVAILABLE_DIND_IMAGES", "");
        let default_image = env_or("DEFAULT_DIND_IMAGE", "lessoncraft/dind");
        let mut available: Vec<String> = images
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        if available.is_empty() {
            available.push(default_image.clone());
        }

        Self {
            listen_addr: env_or("LISTEN_ADDR", "0.0.0.0:3000"),
            data_dir: env_or("DATA_DIR", "/var/lib/lessoncraft"),
            playground_domain: env_or("PLAYGROUND_DOMAIN", "localhost"),
            default_dind_image: default_image,
            available_dind_images: available,
            windows_enabled: env_parse("WINDOWS_ENABLED", false),
            default_session_duration: Duration::from_secs(
                env_parse("DEFAULT_SESSION_DURATION_MINUTES", 240u64) * 60,
            ),
            max_load_avg: env_parse("MAX_LOAD_AVG", 100.0),
            apparmor_profile: env_or("APPARMOR_PROFILE", "docker-dind"),
            cookie_secret: env_or("COOKIE_SECRET", "insecure-dev-secret"),
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            tls_cert: std::env::var("TLS_CERT").ok(),
            tls_key: std::env::var("TLS_KEY").ok(),
            engine_port: env_parse("ENGINE_PORT", 2375),
            ssh_port: env_parse("SSH_PORT", 1022),
            dns_port: env_parse("DNS_PORT", 53),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS", 10),
            lesson_cache_ttl: Duration::from_secs(env_parse("LESSON_CACHE_TTL_SECONDS", 300)),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            data_dir: "/var/lib/lessoncraft".to_string(),
            playground_domain: "localhost".to_string(),
            default_dind_image: "lessoncraft/dind".to_string(),
            available_dind_images: vec!["lessoncraft/dind".to_string()],
            windows_enabled: false,
            default_session_duration: Duration::from_secs(4 * 3600),
            max_load_avg: 100.0,
            apparmor_profile: "docker-dind".to_string(),
            cookie_secret: "insecure-dev-secret".to_string(),
            admin_token: None,
            tls_cert: None,
            tls_key: None,
            engine_port: 2375,
            ssh_port: 1022,
            dns_port: 53,
            rate_limit_rps: 10,
            lesson_cache_ttl: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = GatewayConfig::default();
        assert_eq!(config.rate_limit_rps, 10);
        assert_eq!(config.default_session_duration, Duration::from_secs(14400));
        assert_eq!(config.engine_port, 2375);
        assert!(!config.windows_enabled);
    }
}
