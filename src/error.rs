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

/// Errors surfaced by the engine, scheduler and dispatcher.
///
/// Asset failures never show up here: a missing sample degrades to synthesis and is only
/// logged.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("audio engine is not initialized, call init() first")]
    NotReady,

    #[error("audio engine has been disposed")]
    Disposed,

    #[error("tempo of {0} BPM is outside the supported range of 60-200 BPM")]
    InvalidTempo(f64),

    #[error("audio context is closed")]
    ContextClosed,

    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("invalid voice graph: {0}")]
    Graph(#[from] crate::audio::graph::GraphError),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
