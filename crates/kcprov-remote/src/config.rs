use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for one identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    /// Upper bound for a single request, connect through body.
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `{url}/admin/realms`
    pub fn admin_realms_url(&self) -> String {
        format!("{}/admin/realms", self.url)
    }

    /// Token endpoint of the `master` realm, where admin sessions are issued.
    pub fn token_url(&self) -> String {
        format!("{}/realms/master/protocol/openid-connect/token", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_strips_trailing_slash() {
        let config = RemoteConfig::new("https://keycloak.example/auth/");
        assert_eq!(config.url, "https://keycloak.example/auth");
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn derived_urls() {
        let config = RemoteConfig::new("http://kc:8080").with_timeout(Duration::from_secs(2));
        assert_eq!(config.admin_realms_url(), "http://kc:8080/admin/realms");
        assert_eq!(
            config.token_url(),
            "http://kc:8080/realms/master/protocol/openid-connect/token"
        );
        assert_eq!(config.timeout, Duration::from_secs(2));
    }
}
