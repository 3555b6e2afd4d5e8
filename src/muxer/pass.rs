//! MPEG-TS pass-through muxer.
//!
//! Writes raw transport-stream chunks to disk unmodified. Markers and
//! metadata have no representation in a bare TS file and are ignored;
//! reconfiguration is always accepted since nothing composition-specific
//! is ever written.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::error::{PvrError, Result};
use crate::streaming::{StreamingMessage, StreamingStart};

use super::{Muxer, MuxerConfig};

/// Raw MPEG-TS file writer.
pub struct PassMuxer {
    cfg: MuxerConfig,
    out: Option<BufWriter<std::fs::File>>,
}

impl PassMuxer {
    /// Creates an unopened pass-through muxer.
    pub fn new(cfg: MuxerConfig) -> Self {
        Self { cfg, out: None }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<std::fs::File>> {
        self.out
            .as_mut()
            .ok_or_else(|| PvrError::Muxer("pass muxer has no open file".into()))
    }
}

impl Muxer for PassMuxer {
    fn open_file(&mut self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(self.cfg.file_permissions)
            .open(path)?;
        self.out = Some(BufWriter::new(file));
        Ok(())
    }

    fn init(&mut self, _start: &StreamingStart, _title: &str) -> Result<()> {
        // TS needs no header beyond what the stream itself carries
        Ok(())
    }

    fn write_pkt(&mut self, msg: StreamingMessage) -> Result<()> {
        match msg {
            StreamingMessage::Mpegts(buf) => {
                self.writer()?.write_all(&buf)?;
                Ok(())
            }
            StreamingMessage::Packet(pkt) => {
                self.writer()?.write_all(&pkt.payload)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn reconfigure(&mut self, _start: &StreamingStart) -> bool {
        true
    }

    fn suffix(&self, _start: &StreamingStart) -> &'static str {
        "ts"
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_raw_chunks_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ts");
        let mut mx = PassMuxer::new(MuxerConfig::default());
        mx.open_file(&path).unwrap();
        mx.init(&StreamingStart::default(), "t").unwrap();
        mx.write_pkt(StreamingMessage::Mpegts(vec![0x47; 188].into()))
            .unwrap();
        mx.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 188);
    }

    #[test]
    fn refuses_to_write_without_open_file() {
        let mut mx = PassMuxer::new(MuxerConfig::default());
        assert!(mx
            .write_pkt(StreamingMessage::Mpegts(vec![0x47; 188].into()))
            .is_err());
    }
}
