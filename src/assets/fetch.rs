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
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use tracing::debug;

/// Error types for retrieving raw asset bytes.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'a>>;

/// Retrieves the raw bytes behind a URL. The transport belongs to the host;
/// the engine only needs bytes back.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// Serves URLs from a local mirror directory.
///
/// The scheme and host are dropped and the percent-decoded path is resolved
/// under the root, so `https://host/a/b%20c.wav` reads `<root>/a/b c.wav`.
#[derive(Clone, Debug)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new<P: AsRef<Path>>(root: P) -> FileFetcher {
        FileFetcher {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Maps a URL onto a path under the mirror root.
    pub fn resolve(&self, url: &str) -> Result<PathBuf, FetchError> {
        let path = match url.split_once("://") {
            Some(("file", rest)) => rest,
            Some((_, rest)) => rest.find('/').map(|index| &rest[index..]).unwrap_or(""),
            None => url,
        };
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let decoded = percent_decode(path).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        let mut resolved = self.root.clone();
        for component in Path::new(&decoded).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(FetchError::InvalidUrl(url.to_string()))
                }
            }
        }

        if resolved == self.root {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        Ok(resolved)
    }
}

impl Fetcher for FileFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let path = self.resolve(url)?;
            debug!(url, path = ?path, "Reading asset from mirror");
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(FetchError::NotFound(url.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        })
    }
}

/// Decodes `%XX` escapes. Returns `None` on malformed escapes or invalid UTF-8.
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Escapes a path the way `encodeURI` does: everything except unreserved
/// characters and URI delimiters is percent-encoded as UTF-8.
pub fn encode_uri(input: &str) -> String {
    const KEEP: &[u8] = b"-_.!~*'();/?:@&=+$,#";
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
