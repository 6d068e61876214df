//! Layered configuration: compiled-in defaults → environment variables →
//! CLI flags, flags taking precedence (spec.md §6.6 / SPEC_FULL.md §6.7).
//! `clap`'s `env` attribute gives us that precedence for free.

use std::path::PathBuf;

use clap::Parser;

const DEFAULT_PORT: u16 = 8080;
const DEV_PORT: u16 = 8082;
const DEFAULT_LOG_LEVEL: &str = "warn";
const DEFAULT_DB_NAME: &str = "conduit.db";
const DEFAULT_HOME: &str = ".conduit";

#[derive(Debug, Parser)]
#[command(name = "conduitd", about = "Conduit session engine and JSON-RPC coordinator")]
pub struct CliArgs {
    /// Directory holding the session database (CONDUIT_HOME).
    #[arg(long, env = "CONDUIT_HOME")]
    home: Option<PathBuf>,

    /// Database file name, resolved under `--home` unless absolute.
    #[arg(long = "db", env = "DB_NAME")]
    db_name: Option<PathBuf>,

    /// WebSocket port. Paired health endpoint binds to `port + 1`.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// trace|debug|info|warn|error|fatal.
    #[arg(long = "log-level", env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Use the dev port pair (8082/8083) instead of 8080/8081.
    #[arg(long)]
    dev: bool,
}

pub struct Config {
    pub db_path: PathBuf,
    pub ws_port: u16,
    pub health_port: u16,
    pub log_level: String,
}

impl CliArgs {
    pub fn resolve(self) -> Config {
        let home = self.home.unwrap_or_else(|| PathBuf::from(DEFAULT_HOME));
        let db_name = self.db_name.unwrap_or_else(|| PathBuf::from(DEFAULT_DB_NAME));
        let db_path = if db_name.is_absolute() { db_name } else { home.join(db_name) };

        let ws_port = self.port.unwrap_or(if self.dev { DEV_PORT } else { DEFAULT_PORT });
        let health_port = ws_port + 1;

        let log_level = self.log_level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Config {
            db_path,
            ws_port,
            health_port,
            log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_the_prod_port_pair() {
        let config = CliArgs::parse_from(["conduitd"]).resolve();
        assert_eq!(config.ws_port, DEFAULT_PORT);
        assert_eq!(config.health_port, DEFAULT_PORT + 1);
    }

    #[test]
    fn dev_flag_switches_to_the_dev_port_pair() {
        let config = CliArgs::parse_from(["conduitd", "--dev"]).resolve();
        assert_eq!(config.ws_port, DEV_PORT);
        assert_eq!(config.health_port, DEV_PORT + 1);
    }

    #[test]
    fn an_explicit_port_flag_overrides_the_dev_default() {
        let config = CliArgs::parse_from(["conduitd", "--dev", "--port", "9100"]).resolve();
        assert_eq!(config.ws_port, 9100);
        assert_eq!(config.health_port, 9101);
    }

    #[test]
    fn db_name_joins_under_home_unless_absolute() {
        let config = CliArgs::parse_from(["conduitd", "--home", "/tmp/conduit-home", "--db", "sessions.db"]).resolve();
        assert_eq!(config.db_path, PathBuf::from("/tmp/conduit-home/sessions.db"));
    }

    #[test]
    fn an_absolute_db_path_is_used_verbatim() {
        let config = CliArgs::parse_from(["conduitd", "--home", "/tmp/conduit-home", "--db", "/var/lib/conduit.db"]).resolve();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/conduit.db"));
    }
}
