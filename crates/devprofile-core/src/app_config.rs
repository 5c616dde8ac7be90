use std::net::SocketAddr;

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub github_base_url: String,
    pub github_token: Option<String>,
    pub bitbucket_base_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub max_concurrent_requests: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("github_base_url", &self.github_base_url)
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "[redacted]"),
            )
            .field("bitbucket_base_url", &self.bitbucket_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .finish()
    }
}
