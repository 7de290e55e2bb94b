// Environment configuration
//
// Each required key is accepted under two alias names so deployments can
// keep their existing variable spelling.

use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct ObjectStoreSettings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// TLS toggle; defaults to false.
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub object_store: ObjectStoreSettings,
    pub message_bus_url: Option<String>,
    pub service_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; tests pass a map instead of
    /// mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = required(&lookup, ["CONVEYOR_DATABASE_URL", "DATABASE_URL"])?;

        let endpoint = required(
            &lookup,
            ["CONVEYOR_OBJECT_STORE_ENDPOINT", "OBJECT_STORE_ENDPOINT"],
        )?;
        let access_key = required(
            &lookup,
            ["CONVEYOR_OBJECT_STORE_ACCESS_KEY", "OBJECT_STORE_ACCESS_KEY"],
        )?;
        let secret_key = required(
            &lookup,
            ["CONVEYOR_OBJECT_STORE_SECRET_KEY", "OBJECT_STORE_SECRET_KEY"],
        )?;
        let secure = match first_of(
            &lookup,
            ["CONVEYOR_OBJECT_STORE_SECURE", "OBJECT_STORE_SECURE"],
        ) {
            Some(raw) => parse_bool(&raw)?,
            None => false,
        };

        Ok(Self {
            database_url,
            object_store: ObjectStoreSettings {
                endpoint,
                access_key,
                secret_key,
                secure,
            },
            message_bus_url: lookup("MESSAGE_BUS_URL"),
            service_url: lookup("SERVICE_URL"),
        })
    }
}

fn first_of(lookup: &impl Fn(&str) -> Option<String>, keys: [&str; 2]) -> Option<String> {
    keys.iter().find_map(|key| lookup(key))
}

fn required(lookup: &impl Fn(&str) -> Option<String>, keys: [&str; 2]) -> Result<String> {
    first_of(lookup, keys)
        .ok_or_else(|| EngineError::Config(format!("missing {} (alias {})", keys[0], keys[1])))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(EngineError::Config(format!(
            "invalid boolean value: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base_env() -> HashMap<String, String> {
        env(&[
            ("DATABASE_URL", "postgres://localhost/conveyor"),
            ("OBJECT_STORE_ENDPOINT", "localhost:9000"),
            ("OBJECT_STORE_ACCESS_KEY", "key"),
            ("OBJECT_STORE_SECRET_KEY", "secret"),
        ])
    }

    #[test]
    fn loads_from_plain_aliases() {
        let vars = base_env();
        let settings = Settings::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.database_url, "postgres://localhost/conveyor");
        assert_eq!(settings.object_store.endpoint, "localhost:9000");
        assert!(!settings.object_store.secure);
        assert!(settings.message_bus_url.is_none());
    }

    #[test]
    fn prefixed_alias_wins() {
        let mut vars = base_env();
        vars.insert(
            "CONVEYOR_DATABASE_URL".to_string(),
            "postgres://primary/conveyor".to_string(),
        );
        let settings = Settings::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.database_url, "postgres://primary/conveyor");
    }

    #[test]
    fn missing_dsn_is_a_config_error() {
        let mut vars = base_env();
        vars.remove("DATABASE_URL");
        let err = Settings::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn boolean_parsing_is_case_insensitive() {
        for (raw, expected) in [
            ("TRUE", true),
            ("True", true),
            ("1", true),
            ("YES", true),
            ("on", true),
            ("FALSE", false),
            ("0", false),
            ("No", false),
            ("off", false),
        ] {
            let mut vars = base_env();
            vars.insert("OBJECT_STORE_SECURE".to_string(), raw.to_string());
            let settings = Settings::from_lookup(|k| vars.get(k).cloned()).unwrap();
            assert_eq!(settings.object_store.secure, expected, "raw {raw:?}");
        }
    }

    #[test]
    fn garbage_boolean_is_rejected() {
        let mut vars = base_env();
        vars.insert("OBJECT_STORE_SECURE".to_string(), "maybe".to_string());
        assert!(Settings::from_lookup(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn optional_urls_pass_through() {
        let mut vars = base_env();
        vars.insert(
            "MESSAGE_BUS_URL".to_string(),
            "amqp://localhost".to_string(),
        );
        vars.insert("SERVICE_URL".to_string(), "http://svc".to_string());
        let settings = Settings::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.message_bus_url.as_deref(), Some("amqp://localhost"));
        assert_eq!(settings.service_url.as_deref(), Some("http://svc"));
    }
}
