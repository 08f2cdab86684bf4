//! Configuration for a statistics display.
//!
//! Loaded from an optional TOML file with defaults for missing keys:
//!
//! ```toml
//! refresh_interval_ms = 1000   # 0 = refresh on input only
//! input = "keyboard"           # "none" | "keyboard"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::input::{InputSource, KeyboardInput, NoInput};

/// Default refresh period.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1000;

/// Source of out-of-schedule refresh requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Tick-only refresh
    #[default]
    None,
    /// Refresh on keypress (puts the terminal in raw mode while running)
    Keyboard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Refresh period in milliseconds; 0 disables periodic refresh.
    pub refresh_interval_ms: u64,
    pub input: InputMode,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            input: InputMode::None,
        }
    }
}

impl StatsConfig {
    /// Loads configuration from a specific path.
    /// Returns defaults if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(StatsConfig::default())
        }
    }

    /// Interval to pass to `Statistics::start`; zero means manual refresh.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn input_source(&self) -> Box<dyn InputSource> {
        match self.input {
            InputMode::None => Box::new(NoInput),
            InputMode::Keyboard => Box::new(KeyboardInput),
        }
    }
}
