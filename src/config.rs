//! Recorder configuration profile.
//!
//! One profile per DVR entry; profiles are plain data deserialized from
//! the configuration layer and shared read-only between recordings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::muxer::{MuxerConfig, MuxerContainer};

/// Recording profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DvrConfig {
    /// Storage root for recordings
    pub storage: PathBuf,
    /// Put each recording under a `YYYY-MM-DD/` directory
    pub dir_per_day: bool,
    /// Put each recording under a per-channel directory
    pub channel_dir: bool,
    /// Put each recording under a per-title directory
    pub title_dir: bool,
    /// Replace whitespace in titles with dashes
    pub whitespace_in_title: bool,
    /// Replace anything unprintable or shell-hostile in titles
    pub clean_title: bool,
    /// Write EPG metadata into containers that support it
    pub tag_files: bool,
    /// Drop packets flagged as commercials
    pub skip_commercials: bool,
    /// Character set for generated file names
    pub charset: String,
    /// Post-processing command run after each finished recording
    pub postproc: Option<String>,
    /// Container format
    pub container: MuxerContainer,
    /// Muxer knobs shared by all containers
    pub muxer: MuxerConfig,
}

impl Default for DvrConfig {
    fn default() -> Self {
        Self {
            storage: PathBuf::from("/var/lib/pvrio/recordings"),
            dir_per_day: false,
            channel_dir: false,
            title_dir: false,
            whitespace_in_title: true,
            clean_title: false,
            tag_files: true,
            skip_commercials: false,
            charset: "UTF-8".into(),
            postproc: None,
            container: MuxerContainer::Pass,
            muxer: MuxerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let cfg: DvrConfig =
            serde_json::from_str(r#"{"storage": "/tmp/rec", "dir_per_day": true}"#).unwrap();
        assert_eq!(cfg.storage, PathBuf::from("/tmp/rec"));
        assert!(cfg.dir_per_day);
        assert!(cfg.whitespace_in_title);
        assert_eq!(cfg.container, MuxerContainer::Pass);
    }
}
