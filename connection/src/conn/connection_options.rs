use std::time::Duration;

/// 源库连接参数
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    /// socket读超时
    pub read_timeout: Duration,
}

impl ConnectionOptions {
    pub fn new(hostname: String, port: u16, username: String, password: String) -> Self {
        Self {
            hostname,
            port,
            username,
            password,
            read_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions::new(
            "127.0.0.1".to_string(),
            3306,
            "root".to_string(),
            "".to_string(),
        )
    }
}
