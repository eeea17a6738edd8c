//! The runtime settings for the server.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use time::Duration;

/// The REST API server for fintrack.
///
/// The JWT signing secret is read from the `JWT_SECRET` environment variable so that it does not
/// show up in the process list.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct ServerConfig {
    /// File path to the application SQLite database.
    #[arg(long, env = "DB_PATH")]
    pub db_path: PathBuf,

    /// The port to serve the API from.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// The origin of the front end. It is the only origin allowed by CORS and the base of the
    /// links in password reset emails.
    #[arg(long, env = "FRONTEND_URL", default_value = "http://localhost:5173")]
    pub frontend_url: String,

    /// How many hours a log-in stays valid.
    #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(u32).range(1..))]
    pub session_hours: u32,

    /// Also write debug logs to this file.
    #[arg(long)]
    pub log_path: Option<PathBuf>,
}

impl ServerConfig {
    /// The address the server listens on. All interfaces are used.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// How long auth tokens and cookies stay valid.
    pub fn session_duration(&self) -> Duration {
        Duration::hours(i64::from(self.session_hours))
    }
}

#[cfg(test)]
mod server_config_tests {
    use clap::Parser;
    use time::Duration;

    use crate::ServerConfig;

    #[test]
    fn parses_defaults() {
        let config = ServerConfig::try_parse_from(["server", "--db-path", "test.db"]).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.frontend_url, "http://localhost:5173");
        assert_eq!(config.session_duration(), Duration::hours(24));
        assert_eq!(config.bind_address().to_string(), "0.0.0.0:3000");
        assert_eq!(config.log_path, None);
    }

    #[test]
    fn rejects_zero_session_hours() {
        let result = ServerConfig::try_parse_from([
            "server",
            "--db-path",
            "test.db",
            "--session-hours",
            "0",
        ]);

        assert!(result.is_err());
    }
}
