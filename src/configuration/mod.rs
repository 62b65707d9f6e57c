pub mod command_line;

use std::fmt;
use std::num::{NonZeroU64, NonZeroUsize};

use anyhow::Result;
use sqlx::postgres::PgConnectOptions;
use sqlx::ConnectOptions;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;

pub struct BenchDescription {
    pub user: String,
    pub password: String,
    pub database: Option<String>,
    pub targets: Vec<ConnectionTarget>,

    pub tuple_count: usize,
    pub tx_count: usize,
    pub zipf_factor: f64,
    pub lookup_dist: Option<String>,
    pub insert_batch: NonZeroUsize,
    pub scan_count: NonZeroU64,
    pub seed: u64,
    pub validate: bool,
}

impl BenchDescription {
    pub fn connect_options(&self, target: &ConnectionTarget) -> PgConnectOptions {
        let opts = PgConnectOptions::new()
            .username(&self.user)
            .password(&self.password)
            .application_name("pg-ycsb");
        let opts = match target {
            ConnectionTarget::Tcp { host, port } => opts.host(host).port(*port),
            ConnectionTarget::Socket { dir } => opts.socket(dir),
        };
        let opts = match &self.database {
            Some(database) => opts.database(database),
            None => opts,
        };
        // Statement logging would print every single lookup
        opts.disable_statement_logging()
    }
}

/// One server to benchmark, reached over TCP or a Unix socket directory.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionTarget {
    Tcp { host: String, port: u16 },
    Socket { dir: String },
}

impl ConnectionTarget {
    /// Parses `host`, `host:port`, `[v6addr]:port` or `/socket/dir`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        anyhow::ensure!(!s.is_empty(), "Empty host");

        if s.starts_with('/') {
            return Ok(ConnectionTarget::Socket { dir: s.to_owned() });
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| anyhow::anyhow!("Missing closing bracket in host {:?}", s))?;
            let port = match tail {
                "" => DEFAULT_PORT,
                tail => parse_port(
                    tail.strip_prefix(':')
                        .ok_or_else(|| anyhow::anyhow!("Malformed host {:?}", s))?,
                )?,
            };
            return Ok(ConnectionTarget::Tcp {
                host: host.to_owned(),
                port,
            });
        }

        match s.split_once(':') {
            Some((host, port)) if !port.contains(':') => Ok(ConnectionTarget::Tcp {
                host: host.to_owned(),
                port: parse_port(port)?,
            }),
            // A bare IPv6 address
            Some(_) => Ok(ConnectionTarget::Tcp {
                host: s.to_owned(),
                port: DEFAULT_PORT,
            }),
            None => Ok(ConnectionTarget::Tcp {
                host: s.to_owned(),
                port: DEFAULT_PORT,
            }),
        }
    }

    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        s.split(',').map(Self::parse).collect()
    }
}

fn parse_port(s: &str) -> Result<u16> {
    s.parse()
        .map_err(|err| anyhow::anyhow!("Invalid port {:?}: {}", s, err))
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Tcp { host, port } if host.contains(':') => {
                write!(f, "[{}]:{}", host, port)
            }
            ConnectionTarget::Tcp { host, port } => write!(f, "{}:{}", host, port),
            ConnectionTarget::Socket { dir } => write!(f, "socket {}", dir),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp(host: &str, port: u16) -> ConnectionTarget {
        ConnectionTarget::Tcp {
            host: host.to_owned(),
            port,
        }
    }

    #[test]
    fn parses_targets() {
        assert_eq!(ConnectionTarget::parse("db1").unwrap(), tcp("db1", 5432));
        assert_eq!(
            ConnectionTarget::parse("db1:6543").unwrap(),
            tcp("db1", 6543)
        );
        assert_eq!(
            ConnectionTarget::parse("[::1]:6543").unwrap(),
            tcp("::1", 6543)
        );
        assert_eq!(ConnectionTarget::parse("::1").unwrap(), tcp("::1", 5432));
        assert_eq!(
            ConnectionTarget::parse("/var/run/postgresql").unwrap(),
            ConnectionTarget::Socket {
                dir: "/var/run/postgresql".to_owned()
            }
        );
    }

    #[test]
    fn parses_lists_in_order() {
        let targets = ConnectionTarget::parse_list("a, b:1,/tmp").unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0], tcp("a", 5432));
        assert_eq!(targets[1], tcp("b", 1));
        assert_eq!(targets[2].to_string(), "socket /tmp");
    }

    #[test]
    fn rejects_bad_targets() {
        assert!(ConnectionTarget::parse("").is_err());
        assert!(ConnectionTarget::parse("db:port").is_err());
        assert!(ConnectionTarget::parse("db:99999").is_err());
        assert!(ConnectionTarget::parse("[::1").is_err());
        assert!(ConnectionTarget::parse("[::1]x").is_err());
        assert!(ConnectionTarget::parse_list("a,,b").is_err());
    }

    #[test]
    fn displays_targets() {
        assert_eq!(tcp("db", 1).to_string(), "db:1");
        assert_eq!(tcp("::1", 1).to_string(), "[::1]:1");
    }
}
