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
use serde::Deserialize;

/// Default location of the drum machine sample directory.
pub const DEFAULT_SAMPLE_MAP_URL: &str =
    "https://raw.githubusercontent.com/felixroos/dough-samples/main/tidal-drum-machines.json";

/// Default location of the General MIDI soundfont scripts.
pub const DEFAULT_SOUNDFONT_BASE_URL: &str = "https://surikov.github.io/webaudiofontdata/sound/";

/// A YAML representation of the drum machine sample settings.
#[derive(Deserialize, Clone, Debug)]
pub struct SampleConfig {
    /// The JSON document mapping "{machine}_{sound}" to sample file paths.
    #[serde(default = "default_map_url")]
    map_url: String,
}

fn default_map_url() -> String {
    DEFAULT_SAMPLE_MAP_URL.to_string()
}

impl Default for SampleConfig {
    fn default() -> Self {
        SampleConfig::new(DEFAULT_SAMPLE_MAP_URL)
    }
}

impl SampleConfig {
    /// Creates a new sample configuration.
    pub fn new(map_url: &str) -> SampleConfig {
        SampleConfig {
            map_url: map_url.to_string(),
        }
    }

    /// Gets the sample map location.
    pub fn map_url(&self) -> &str {
        &self.map_url
    }
}

/// A YAML representation of the soundfont settings.
#[derive(Deserialize, Clone, Debug)]
pub struct SoundfontConfig {
    /// The prefix that instrument script file names are appended to.
    #[serde(default = "default_base_url")]
    base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_SOUNDFONT_BASE_URL.to_string()
}

impl Default for SoundfontConfig {
    fn default() -> Self {
        SoundfontConfig::new(DEFAULT_SOUNDFONT_BASE_URL)
    }
}

impl SoundfontConfig {
    /// Creates a new soundfont configuration.
    pub fn new(base_url: &str) -> SoundfontConfig {
        SoundfontConfig {
            base_url: base_url.to_string(),
        }
    }

    /// Gets the soundfont base location.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
