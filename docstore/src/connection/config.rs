use crate::error::{DocStoreError, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Where and how to connect, parsed from a connection string such as
/// `localhost:6379,password=secret,db=1,connectTimeout=2000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<u32>,
    pub client_name: Option<String>,
    pub connect_timeout: Duration,
    /// Upper bound on the wait for each reply. `None` waits indefinitely.
    pub response_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(host: &str, port: u16) -> Self {
        ConnectionConfig {
            host: host.to_string(),
            port,
            user: None,
            password: None,
            database: None,
            client_name: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: None,
        }
    }

    /// `host:port`, with IPv6 hosts in brackets.
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Credentials are never printed.
        write!(f, "{}", self.endpoint())?;
        if let Some(db) = self.database {
            write!(f, ",db={db}")?;
        }
        if let Some(name) = &self.client_name {
            write!(f, ",name={name}")?;
        }
        Ok(())
    }
}

impl FromStr for ConnectionConfig {
    type Err = DocStoreError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(',').map(str::trim);
        let endpoint = parts
            .next()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| DocStoreError::Config("Connection string is empty".to_string()))?;

        let (host, port) = parse_endpoint(endpoint)?;
        let mut config = ConnectionConfig::new(host, port);

        for option in parts.filter(|p| !p.is_empty()) {
            let (key, value) = option.split_once('=').ok_or_else(|| {
                DocStoreError::Config(format!("Invalid option '{option}': expected key=value"))
            })?;

            match key.trim() {
                "password" => config.password = Some(value.to_string()),
                "user" => config.user = Some(value.to_string()),
                "db" => config.database = Some(parse_number(key, value)?),
                "name" => config.client_name = Some(value.to_string()),
                "connectTimeout" => {
                    config.connect_timeout = Duration::from_millis(parse_number(key, value)?)
                }
                "responseTimeout" => {
                    config.response_timeout = Some(Duration::from_millis(parse_number(key, value)?))
                }
                other => {
                    return Err(DocStoreError::Config(format!(
                        "Unknown connection option '{other}'"
                    )));
                }
            }
        }

        Ok(config)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<(&str, u16)> {
    let invalid_port =
        || DocStoreError::Config(format!("Invalid port in endpoint '{endpoint}'"));

    // `[v6]` or `[v6]:port`
    if let Some(rest) = endpoint.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(|| {
            DocStoreError::Config(format!("Unclosed '[' in endpoint '{endpoint}'"))
        })?;
        if host.is_empty() {
            return Err(DocStoreError::Config(format!(
                "Missing host in endpoint '{endpoint}'"
            )));
        }
        let port = match after {
            "" => DEFAULT_PORT,
            _ => after
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok())
                .ok_or_else(invalid_port)?,
        };
        return Ok((host, port));
    }

    // A bare IPv6 address has more than one ':' and no port.
    if endpoint.matches(':').count() > 1 {
        return Ok((endpoint, DEFAULT_PORT));
    }

    match endpoint.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(DocStoreError::Config(format!(
                    "Missing host in endpoint '{endpoint}'"
                )));
            }
            let port = port.parse::<u16>().map_err(|_| invalid_port())?;
            Ok((host, port))
        }
        None => Ok((endpoint, DEFAULT_PORT)),
    }
}

fn parse_number<N: FromStr>(key: &str, value: &str) -> Result<N> {
    value.trim().parse().map_err(|_| {
        DocStoreError::Config(format!("Option '{key}' expects a number, got '{value}'"))
    })
}
