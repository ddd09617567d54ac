/// Server configuration loaded from environment variables.
///
/// All fields except the shared token have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Shared capability token every worker request must carry as `magic`.
    pub magic: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default     |
    /// |------------------------|-------------|
    /// | `HOST`                 | `0.0.0.0`   |
    /// | `PORT`                 | `3000`      |
    /// | `REQUEST_TIMEOUT_SECS` | `30`        |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`        |
    /// | `SLICER_MAGIC`         | (required)  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let magic = std::env::var("SLICER_MAGIC").expect("SLICER_MAGIC must be set");
        assert!(!magic.is_empty(), "SLICER_MAGIC must not be empty");

        Self {
            host,
            port,
            request_timeout_secs,
            shutdown_timeout_secs,
            magic,
        }
    }
}
