//! Boot-time configuration (`[AMBIENT-CONFIG]`).
//!
//! Grounded in `examples/original_source/main.go`, which reads a
//! `./config.toml` via `BurntSushi/toml`; the idiomatic Rust rendition is
//! `serde` + the `toml` crate deserializing straight into this struct.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub vk_token: String,
    pub vk_audio_token: String,
    pub vk_api_version: String,
    pub tg_token: String,
    pub db_name: String,
    pub update_period_minutes: u64,
    pub batch_size: usize,
    pub n_posts_to_fetch: usize,
    pub subs_limit: u32,
    #[serde(default)]
    pub bot_admins: Vec<i64>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.update_period_minutes < 1 {
            return Err(Error::Config(
                "update_period_minutes must be >= 1".to_string(),
            ));
        }
        if !(1..=20).contains(&self.batch_size) {
            return Err(Error::Config("batch_size must be in 1..=20".to_string()));
        }
        if !(1..=100).contains(&self.n_posts_to_fetch) {
            return Err(Error::Config(
                "n_posts_to_fetch must be in 1..=100".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_a_well_formed_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            vk_token = "vk"
            vk_audio_token = "vka"
            vk_api_version = "5.199"
            tg_token = "tg"
            db_name = "crosspost.db"
            update_period_minutes = 5
            batch_size = 10
            n_posts_to_fetch = 20
            subs_limit = 25
            bot_admins = [123, 456]
            "#,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.bot_admins, vec![123, 456]);
    }

    #[test]
    fn rejects_out_of_range_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            vk_token = "vk"
            vk_audio_token = "vka"
            vk_api_version = "5.199"
            tg_token = "tg"
            db_name = "crosspost.db"
            update_period_minutes = 5
            batch_size = 50
            n_posts_to_fetch = 20
            subs_limit = 25
            "#,
        );
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }
}
