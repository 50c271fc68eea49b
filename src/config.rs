use std::fs::File;

use serde_yaml::{self, Value};

use crate::error::{ErrorCode, RuntimeError};

/// Runtime configuration, read from `~/.zplet/config.yml`.
#[derive(Debug)]
pub struct Config {
    foreground: u8,
    background: u8,
    logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config::new(9, 2, false)
    }
}

impl TryFrom<File> for Config {
    type Error = RuntimeError;

    fn try_from(file: File) -> Result<Config, RuntimeError> {
        let data = serde_yaml::from_reader::<File, Value>(file)
            .map_err(|e| RuntimeError::fatal(ErrorCode::ConfigError, e.to_string()))?;

        let colour = |key: &str, default: u8| data[key].as_u64().map_or(default, |v| v as u8);
        Ok(Config::new(
            colour("foreground", 9),
            colour("background", 2),
            data["logging"].as_str() == Some("enabled"),
        ))
    }
}

impl Config {
    pub fn new(foreground: u8, background: u8, logging: bool) -> Config {
        Config {
            foreground,
            background,
            logging,
        }
    }

    pub fn foreground(&self) -> u8 {
        self.foreground
    }

    pub fn background(&self) -> u8 {
        self.background
    }

    pub fn logging(&self) -> bool {
        self.logging
    }
}
