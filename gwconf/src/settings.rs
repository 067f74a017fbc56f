use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Runtime settings shared by every gateway host. Read from a YAML file
/// when one is deployed; every field falls back to the packaged default,
/// so a partial file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// pool holding the shared configuration object
    #[serde(default = "default_pool")]
    pool: String,
    /// name of the shared configuration object
    #[serde(default = "default_config_object")]
    config_object: String,
    /// seconds a session will wait for the exclusive lock
    #[serde(default = "default_lock_time_limit")]
    lock_time_limit: u64,
    /// seconds a host will wait for a fact published by another host
    #[serde(default = "default_time_out")]
    time_out: u64,
    /// seconds between polls of the shared document
    #[serde(default = "default_loop_delay")]
    loop_delay: u64,
}

fn default_pool() -> String {
    "rbd".to_string()
}

fn default_config_object() -> String {
    "gateway.conf".to_string()
}

fn default_lock_time_limit() -> u64 {
    30
}

fn default_time_out() -> u64 {
    30
}

fn default_loop_delay() -> u64 {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            pool: default_pool(),
            config_object: default_config_object(),
            lock_time_limit: default_lock_time_limit(),
            time_out: default_time_out(),
            loop_delay: default_loop_delay(),
        }
    }
}

impl Settings {
    /// create `Settings` from yaml string
    pub fn from(s: &str) -> Result<Settings> {
        let settings = serde_yml::from_str::<Settings>(s)?;
        Ok(settings)
    }

    /// create `Settings` from yaml file
    pub fn read<P: AsRef<Path>>(filename: P) -> Result<Settings> {
        let s = fs::read_to_string(filename)?;
        Settings::from(&s)
    }

    /// encodes `Settings` to yaml string
    pub fn to_yml(&self) -> Result<String> {
        let s = serde_yml::to_string(self)?;
        Ok(s)
    }

    /// write `Settings` yaml string to the file
    pub fn write_to<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        let yml = self.to_yml()?;
        fs::write(filename, yml)?;

        Ok(())
    }

    pub fn pool(&self) -> &str {
        &self.pool
    }

    pub fn config_object(&self) -> &str {
        &self.config_object
    }

    pub fn lock_time_limit(&self) -> Duration {
        Duration::from_secs(self.lock_time_limit)
    }

    pub fn time_out(&self) -> Duration {
        Duration::from_secs(self.time_out)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_secs(self.loop_delay)
    }
}
