use anyhow::Result;
use log::LevelFilter;
use serde_derive::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use crate::client::ClientConfig;

fn default_listen() -> String {
    String::from("127.0.0.1:1080")
}

fn default_level() -> LevelFilter {
    LevelFilter::Info
}

/// File configuration for the binary. The client itself takes a
/// [`ClientConfig`]; this adds the pieces only the process cares about
/// (log level, bridge address for the direct transport).
#[serde_as]
#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub broker_url: String,
    /// Comma-separated front domains for the primary broker.
    #[serde(default)]
    pub front_domains: String,
    #[serde(default)]
    pub amp_cache_url: String,
    /// Comma-separated STUN URLs; empty takes the built-in diverse set.
    #[serde(default)]
    pub stun_urls: String,
    #[serde(default)]
    pub utls_client_id: String,
    /// Bridge address the direct transport dials.
    pub bridge_addr: String,
    #[serde(default = "default_level")]
    #[serde_as(as = "DisplayFromStr")]
    pub log_level: LevelFilter,
}

impl Config {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            listen: self.listen.clone(),
            broker_url: self.broker_url.clone(),
            front_domains: self.front_domains.clone(),
            amp_cache_url: self.amp_cache_url.clone(),
            stun_urls: self.stun_urls.clone(),
            utls_client_id: self.utls_client_id.clone(),
        }
    }
}

pub fn load_config_from_path(s: &str) -> Result<Config> {
    let config_string = std::fs::read_to_string(s)?;
    let config = toml::from_str(&config_string)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_takes_defaults() {
        let config: Config = toml::from_str("bridge_addr = \"192.0.2.1:443\"").unwrap();
        assert_eq!(config.listen, "127.0.0.1:1080");
        assert_eq!(config.log_level, LevelFilter::Info);
        assert!(config.broker_url.is_empty());
    }

    #[test]
    fn log_level_parses_from_string() {
        let config: Config =
            toml::from_str("bridge_addr = \"192.0.2.1:443\"\nlog_level = \"debug\"").unwrap();
        assert_eq!(config.log_level, LevelFilter::Debug);
    }
}
