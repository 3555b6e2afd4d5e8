//! # Muxers
//!
//! Container writers behind the recording pipeline. The recorder drives a
//! muxer exclusively through the [`Muxer`] trait; concrete back-ends only
//! need to turn streaming messages into bytes on disk.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::streaming::{StreamingMessage, StreamingStart};

pub mod pass;

pub use pass::PassMuxer;

/// Container formats a recording profile may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuxerContainer {
    /// MPEG-TS pass-through, bytes hit the disk unmodified
    #[default]
    Pass,
    /// Matroska
    Matroska,
}

impl MuxerContainer {
    /// Container label used in configuration records.
    pub fn as_str(self) -> &'static str {
        match self {
            MuxerContainer::Pass => "pass",
            MuxerContainer::Matroska => "matroska",
        }
    }
}

/// Shared muxer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxerConfig {
    /// Mode bits for directories created below the storage root
    pub directory_permissions: u32,
    /// Mode bits for recording files
    pub file_permissions: u32,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            directory_permissions: 0o775,
            file_permissions: 0o664,
        }
    }
}

/// EPG metadata a muxer may embed into the container.
#[derive(Debug, Clone, Default)]
pub struct BroadcastMeta {
    /// Program title
    pub title: String,
    /// Program description
    pub description: Option<String>,
    /// Scheduled start, unix epoch seconds
    pub start: i64,
    /// Scheduled stop, unix epoch seconds
    pub stop: i64,
}

/// A container writer.
///
/// Lifecycle: `open_file`, `init`, optional `write_meta`, then packets via
/// `write_pkt` until `close`. `reconfigure` is offered on a composition
/// change; a refusing muxer gets finalized and replaced instead.
pub trait Muxer: Send {
    /// Opens the output file.
    fn open_file(&mut self, path: &Path) -> Result<()>;

    /// Writes container headers for the given composition.
    fn init(&mut self, start: &StreamingStart, title: &str) -> Result<()>;

    /// Embeds EPG metadata; back-ends without metadata support ignore it.
    fn write_meta(&mut self, meta: &BroadcastMeta) -> Result<()> {
        let _ = meta;
        Ok(())
    }

    /// Writes one packet or raw TS chunk, taking ownership.
    fn write_pkt(&mut self, msg: StreamingMessage) -> Result<()>;

    /// Inserts a chapter/cut marker at the current position.
    fn add_marker(&mut self) -> Result<()> {
        Ok(())
    }

    /// Adapts to a new composition; `false` means the back-end cannot and
    /// the caller must finalize and start a fresh file.
    fn reconfigure(&mut self, start: &StreamingStart) -> bool;

    /// Filename suffix for the given composition.
    fn suffix(&self, start: &StreamingStart) -> &'static str;

    /// Finalizes and closes the output.
    fn close(&mut self) -> Result<()>;
}

/// Instantiates the muxer back-end for a container type.
pub fn create(container: MuxerContainer, cfg: &MuxerConfig) -> Result<Box<dyn Muxer>> {
    match container {
        MuxerContainer::Pass => Ok(Box::new(PassMuxer::new(cfg.clone()))),
        MuxerContainer::Matroska => Err(crate::error::PvrError::Muxer(
            "matroska backend not built in".into(),
        )),
    }
}
