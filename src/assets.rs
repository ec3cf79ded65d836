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
//! Remote drum-machine samples and General MIDI soundfonts.
//!
//! Both loaders sit on an [`AssetCache`], which serves decoded buffers from
//! memory and coalesces concurrent loads of the same key into one fetch.
//! Failures never leave this layer: they are logged and surface as `None`,
//! so the dispatcher can fall back to synthesis.

use std::path::Path;

use crate::audio::{decode, AudioBuffer};

pub mod cache;
mod error;
pub mod fetch;
pub mod samples;
pub mod soundfont;

pub use cache::AssetCache;
pub use error::AssetError;
pub use fetch::{FetchError, FetchFuture, Fetcher, FileFetcher};
pub use samples::{SampleKey, SampleLoader, SampleMap};
pub use soundfont::{Instrument, SoundfontLoader, Zone};

/// Decodes encoded audio on the blocking pool so the async workers that run
/// the scheduler are never stalled by codec work.
pub(crate) async fn decode_blocking(
    bytes: Vec<u8>,
    extension: Option<String>,
) -> Result<AudioBuffer, AssetError> {
    Ok(tokio::task::spawn_blocking(move || decode(bytes, extension.as_deref())).await??)
}

/// The file extension of a URL's path, used as a decoder hint.
pub(crate) fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next()?;
    Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
