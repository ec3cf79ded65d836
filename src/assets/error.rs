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
use crate::audio::DecodeError;

use super::FetchError;

/// Error types for loading remote assets.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid sample map: {0}")]
    SampleMap(serde_json::Error),

    #[error("Soundfont parse error: {0}")]
    SoundfontParse(String),

    #[error("Invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Decode task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("No samples found for {0}")]
    MissingSample(String),

    #[error("Sample map not loaded")]
    NotInitialized,
}
