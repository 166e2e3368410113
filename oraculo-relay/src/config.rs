//! Environment-driven configuration for the relay service.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::types::RelayError;

/// Relay settings resolved from the process environment.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    /// Quiet period before a sender's buffered messages fire.
    pub debounce_window: Duration,
    pub evolution_base_url: String,
    /// Static API key per messaging instance.
    pub evolution_keys: HashMap<String, String>,
    /// Instance replies go out on.
    pub default_instance: String,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, RelayError> {
        let bind_addr = env_or("ORACULO_BIND_ADDR", "127.0.0.1:8000")
            .parse()
            .map_err(|err| RelayError::Config(format!("invalid ORACULO_BIND_ADDR: {err}")))?;
        let window_secs: u64 = env_or("ORACULO_DEBOUNCE_SECS", "120")
            .parse()
            .map_err(|err| RelayError::Config(format!("invalid ORACULO_DEBOUNCE_SECS: {err}")))?;
        if window_secs == 0 {
            return Err(RelayError::Config(
                "ORACULO_DEBOUNCE_SECS must be positive".into(),
            ));
        }
        Ok(Self {
            bind_addr,
            debounce_window: Duration::from_secs(window_secs),
            evolution_base_url: env_or("ORACULO_EVOLUTION_URL", "http://localhost:8080"),
            evolution_keys: parse_keys(&env_or("ORACULO_EVOLUTION_KEYS", ""))?,
            default_instance: env_or("ORACULO_WA_INSTANCE", "main"),
        })
    }
}

/// Parses `instance=key,instance2=key2` pairs.
fn parse_keys(raw: &str) -> Result<HashMap<String, String>, RelayError> {
    let mut keys = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (instance, key) = pair.split_once('=').ok_or_else(|| {
            RelayError::Config(format!(
                "ORACULO_EVOLUTION_KEYS entry '{pair}' is not instance=key"
            ))
        })?;
        keys.insert(instance.trim().to_string(), key.trim().to_string());
    }
    Ok(keys)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_pairs_parse_into_the_instance_map() {
        let keys = parse_keys("main=abc123, backup=def456").unwrap();
        assert_eq!(keys.get("main").map(String::as_str), Some("abc123"));
        assert_eq!(keys.get("backup").map(String::as_str), Some("def456"));
        assert!(parse_keys("").unwrap().is_empty());
        assert!(parse_keys("nokey").is_err());
    }
}
