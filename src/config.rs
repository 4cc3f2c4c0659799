use thiserror::Error;

const DEFAULT_HTTP_API_PORT: u16 = 3004;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub http_api_port: u16,
    pub log_file_path: String,
    pub log_archive_pattern: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name| lookup(name).ok_or(ConfigError::Missing(name));
        Ok(Self {
            db_path: required("RPG_DB")?,
            db_max_connections: parse_or(&lookup, "RPG_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            http_api_port: parse_or(&lookup, "RPG_HTTP_API_PORT", DEFAULT_HTTP_API_PORT)?,
            log_file_path: required("LOG_FILE_PATH")?,
            log_archive_pattern: required("LOG_ARCHIVE_PATTERN")?,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&'static str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&'static str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("RPG_DB", "data/rpg.db"),
        ("LOG_FILE_PATH", "logs/rpg.log"),
        ("LOG_ARCHIVE_PATTERN", "logs/rpg.{}.log.gz"),
    ];

    #[test]
    fn test_defaults() {
        let config = config_from(&REQUIRED).expect("Failed to load config");
        assert_eq!(config.db_path, "data/rpg.db");
        assert_eq!(config.http_api_port, 3004);
        assert_eq!(config.db_max_connections, 5);
    }

    #[test]
    fn test_overrides_and_errors() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("RPG_HTTP_API_PORT", "8080"));
        assert_eq!(config_from(&vars).unwrap().http_api_port, 8080);

        vars.push(("RPG_DB_MAX_CONNECTIONS", "many"));
        assert!(matches!(
            config_from(&vars),
            Err(ConfigError::Invalid {
                name: "RPG_DB_MAX_CONNECTIONS",
                ..
            })
        ));

        assert!(matches!(
            config_from(&REQUIRED[1..]),
            Err(ConfigError::Missing("RPG_DB"))
        ));
    }
}
