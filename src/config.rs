// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::Path;
use std::time::Duration;

use config::{Config, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;

mod assets;
mod error;

pub use assets::{SampleConfig, SoundfontConfig};
pub use error::ConfigError;

/// Default output sample rate.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default scheduling horizon.
const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(100);

/// Default coarse timer period for the scheduler loop.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(25);

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct EngineConfig {
    /// The sample rate the renderer produces audio at.
    #[serde(default = "default_sample_rate")]
    sample_rate: u32,

    /// How far ahead of the audio clock steps are scheduled, e.g. "100ms".
    lookahead: Option<String>,

    /// The coarse timer period of the scheduler loop, e.g. "25ms".
    tick_interval: Option<String>,

    /// Drum machine sample settings.
    #[serde(default)]
    samples: SampleConfig,

    /// Soundfont instrument settings.
    #[serde(default)]
    soundfonts: SoundfontConfig,
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: DEFAULT_SAMPLE_RATE,
            lookahead: None,
            tick_interval: None,
            samples: SampleConfig::default(),
            soundfonts: SoundfontConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse an engine config from a file. The format is derived from the extension.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?)
    }

    /// Parse an engine config from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<EngineConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<EngineConfig>()?)
    }

    /// Returns a copy of this config with the given sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> EngineConfig {
        self.sample_rate = sample_rate;
        self
    }

    /// Returns a copy of this config with the given sample map location.
    pub fn with_sample_map_url(mut self, url: &str) -> EngineConfig {
        self.samples = SampleConfig::new(url);
        self
    }

    /// Returns a copy of this config with the given soundfont base location.
    pub fn with_soundfont_base_url(mut self, url: &str) -> EngineConfig {
        self.soundfonts = SoundfontConfig::new(url);
        self
    }

    /// Gets the renderer sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Gets the scheduling lookahead. Zero is rejected.
    pub fn lookahead(&self) -> Result<Duration, ConfigError> {
        parse_duration("lookahead", self.lookahead.as_deref(), DEFAULT_LOOKAHEAD)
    }

    /// Gets the scheduler timer period. Zero is rejected.
    pub fn tick_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration("tick_interval", self.tick_interval.as_deref(), DEFAULT_TICK_INTERVAL)
    }

    /// Gets the sample settings.
    pub fn samples(&self) -> &SampleConfig {
        &self.samples
    }

    /// Gets the soundfont settings.
    pub fn soundfonts(&self) -> &SoundfontConfig {
        &self.soundfonts
    }
}

fn parse_duration(field: &'static str, value: Option<&str>, default: Duration) -> Result<Duration, ConfigError> {
    let duration: Duration = match value {
        Some(value) => DurationString::from_string(value.to_string())
            .map_err(|e| ConfigError::Duration(value.to_string(), e.to_string()))?
            .into(),
        None => default,
    };
    if duration.is_zero() {
        return Err(ConfigError::ZeroDuration(field));
    }
    Ok(duration)
}
