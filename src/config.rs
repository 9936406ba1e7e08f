//! Configuration (ambient stack — §1 "outer program parses flags"; the
//! crate still needs a typed place to land those values). Loaded from an
//! optional TOML file, with every field overridable by an environment
//! variable of the form `REDIS_ENGINE_<FIELD>`.
//!
//! Replaces the teacher's hand-rolled directive parser
//! (`redis/config.rs`) with `serde`-derived (de)serialization, the
//! pattern the wider pack uses for this concern.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppendFsync {
    Always,
    EverySec,
    No,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub dict_shards: usize,
    pub lock_stripes: usize,
    pub sweeper_interval_ms: u64,
    pub sweeper_sample_size: usize,
    pub append_only: bool,
    pub append_filename: PathBuf,
    pub append_fsync: AppendFsync,
    pub aof_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:6380".to_string(),
            dict_shards: 16,
            lock_stripes: 1024,
            sweeper_interval_ms: 100,
            sweeper_sample_size: 20,
            append_only: true,
            append_filename: PathBuf::from("appendonly.aof"),
            append_fsync: AppendFsync::EverySec,
            aof_channel_capacity: 4096,
        }
    }
}

impl Config {
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
        let mut cfg = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                toml::from_str(&text)?
            }
            None => Config::default(),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REDIS_ENGINE_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = parsed_env("REDIS_ENGINE_DICT_SHARDS") {
            self.dict_shards = v;
        }
        if let Some(v) = parsed_env("REDIS_ENGINE_LOCK_STRIPES") {
            self.lock_stripes = v;
        }
        if let Some(v) = parsed_env("REDIS_ENGINE_SWEEPER_INTERVAL_MS") {
            self.sweeper_interval_ms = v;
        }
        if let Some(v) = parsed_env("REDIS_ENGINE_SWEEPER_SAMPLE_SIZE") {
            self.sweeper_sample_size = v;
        }
        if let Some(v) = parsed_env("REDIS_ENGINE_APPEND_ONLY") {
            self.append_only = v;
        }
        if let Ok(v) = std::env::var("REDIS_ENGINE_APPEND_FILENAME") {
            self.append_filename = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("REDIS_ENGINE_APPEND_FSYNC") {
            match v.to_ascii_lowercase().as_str() {
                "always" => self.append_fsync = AppendFsync::Always,
                "everysec" => self.append_fsync = AppendFsync::EverySec,
                "no" => self.append_fsync = AppendFsync::No,
                _ => {}
            }
        }
        if let Some(v) = parsed_env("REDIS_ENGINE_AOF_CHANNEL_CAPACITY") {
            self.aof_channel_capacity = v;
        }
    }
}

fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let cfg = Config::default();
        assert!(cfg.dict_shards.is_power_of_two());
        assert!(cfg.lock_stripes.is_power_of_two());
    }

    #[test]
    fn loads_from_toml_and_falls_back_to_defaults() {
        let toml_src = r#"
            bind_addr = "0.0.0.0:7000"
            dict_shards = 32
            lock_stripes = 2048
            sweeper_interval_ms = 50
            sweeper_sample_size = 10
            append_only = false
            append_filename = "foo.aof"
            append_fsync = "always"
            aof_channel_capacity = 1024
        "#;
        let cfg: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:7000");
        assert_eq!(cfg.append_fsync, AppendFsync::Always);
        assert!(!cfg.append_only);
    }

    #[test]
    fn every_field_is_env_overridable() {
        let vars = [
            ("REDIS_ENGINE_DICT_SHARDS", "64"),
            ("REDIS_ENGINE_LOCK_STRIPES", "2048"),
            ("REDIS_ENGINE_SWEEPER_INTERVAL_MS", "250"),
            ("REDIS_ENGINE_SWEEPER_SAMPLE_SIZE", "5"),
            ("REDIS_ENGINE_APPEND_ONLY", "false"),
            ("REDIS_ENGINE_APPEND_FSYNC", "always"),
            ("REDIS_ENGINE_AOF_CHANNEL_CAPACITY", "77"),
        ];
        for (k, v) in vars {
            std::env::set_var(k, v);
        }

        let mut cfg = Config::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.dict_shards, 64);
        assert_eq!(cfg.lock_stripes, 2048);
        assert_eq!(cfg.sweeper_interval_ms, 250);
        assert_eq!(cfg.sweeper_sample_size, 5);
        assert!(!cfg.append_only);
        assert_eq!(cfg.append_fsync, AppendFsync::Always);
        assert_eq!(cfg.aof_channel_capacity, 77);

        for (k, _) in vars {
            std::env::remove_var(k);
        }
    }
}
