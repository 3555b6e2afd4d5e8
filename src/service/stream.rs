//! Elementary streams: the individual components of a program.
//!
//! Each component carries its wire PID, codec/type tag, conditional-access
//! identifiers and the per-stream reassembly state the input layer works
//! on. Components are exclusively owned by their service and only mutated
//! under the service's stream mutex.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::BytesMut;

/// Component type of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamType {
    /// MPEG-2 video
    Mpeg2Video,
    /// H.264/AVC video
    #[default]
    H264,
    /// H.265/HEVC video
    Hevc,
    /// MPEG audio (layer II)
    Mpeg2Audio,
    /// AAC audio
    Aac,
    /// AC-3 audio
    Ac3,
    /// Enhanced AC-3 audio
    Eac3,
    /// Teletext
    Teletext,
    /// DVB bitmap subtitles
    DvbSub,
    /// Text subtitles
    TextSub,
    /// Conditional-access stream
    Ca,
    /// Program clock reference
    Pcr,
    /// Program map table
    Pmt,
}

impl StreamType {
    /// All variants, in mask-bit order.
    pub const ALL: [StreamType; 13] = [
        StreamType::Mpeg2Video,
        StreamType::H264,
        StreamType::Hevc,
        StreamType::Mpeg2Audio,
        StreamType::Aac,
        StreamType::Ac3,
        StreamType::Eac3,
        StreamType::Teletext,
        StreamType::DvbSub,
        StreamType::TextSub,
        StreamType::Ca,
        StreamType::Pcr,
        StreamType::Pmt,
    ];

    /// Single-bit mask of this type, used by the filter classes.
    pub fn mask(self) -> u32 {
        1 << self as u32
    }

    /// True for video codecs.
    pub fn is_video(self) -> bool {
        matches!(
            self,
            StreamType::Mpeg2Video | StreamType::H264 | StreamType::Hevc
        )
    }

    /// True for audio codecs.
    pub fn is_audio(self) -> bool {
        matches!(
            self,
            StreamType::Mpeg2Audio | StreamType::Aac | StreamType::Ac3 | StreamType::Eac3
        )
    }

    /// Textual tag used by persisted service records.
    pub fn as_str(self) -> &'static str {
        match self {
            StreamType::Mpeg2Video => "MPEG2VIDEO",
            StreamType::H264 => "H264",
            StreamType::Hevc => "HEVC",
            StreamType::Mpeg2Audio => "MPEG2AUDIO",
            StreamType::Aac => "AAC",
            StreamType::Ac3 => "AC3",
            StreamType::Eac3 => "EAC3",
            StreamType::Teletext => "TELETEXT",
            StreamType::DvbSub => "DVBSUB",
            StreamType::TextSub => "TEXTSUB",
            StreamType::Ca => "CA",
            StreamType::Pcr => "PCR",
            StreamType::Pmt => "PMT",
        }
    }

    /// Parses a persisted textual tag. Unknown tags yield `None` and the
    /// loader skips the record.
    pub fn from_str_tag(s: &str) -> Option<StreamType> {
        StreamType::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

/// Filter mark: the component was admitted by the filter.
pub const ESFM_USED: u8 = 1 << 0;
/// Filter mark: the component was rejected by the filter.
pub const ESFM_IGNORE: u8 = 1 << 1;

/// One conditional-access identifier attached to a CA component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caid {
    /// 16-bit conditional-access system id
    pub caid: u16,
    /// 24-bit provider id narrowing within the CA system
    pub providerid: u32,
    /// ECM PID, 0 when carried on the component's own PID
    pub pid: u16,
    /// Whether descramblers should use this CAID
    pub in_use: bool,
    /// Scratch marks of the elementary-stream filter
    pub filter: u8,
}

impl Caid {
    /// Creates a CAID record marked in use, as freshly loaded entries are.
    pub fn new(caid: u16, providerid: u32) -> Self {
        Self {
            caid,
            providerid,
            pid: 0,
            in_use: true,
            filter: 0,
        }
    }
}

/// Windowed event-rate counter (bytes or errors per window).
#[derive(Debug, Default)]
pub struct RateStat {
    samples: VecDeque<(Instant, u64)>,
}

impl RateStat {
    const WINDOW: Duration = Duration::from_secs(10);

    /// Records `n` units at the current time and expires old samples.
    pub fn add(&mut self, n: u64) {
        let now = Instant::now();
        self.samples.push_back((now, n));
        while let Some(&(t, _)) = self.samples.front() {
            if now.duration_since(t) > Self::WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Sum of the samples inside the window.
    pub fn sum(&self) -> u64 {
        self.samples.iter().map(|&(_, n)| n).sum()
    }

    /// Discards all samples.
    pub fn flush(&mut self) {
        self.samples.clear();
    }
}

/// Reassembly state rebuilt on every stream start.
#[derive(Debug, Default)]
pub struct Reassembly {
    /// Main PES reassembly buffer
    pub buf: BytesMut,
    /// Program-stream scratch buffer
    pub buf_ps: BytesMut,
    /// Audio sync scratch buffer
    pub buf_a: BytesMut,
    /// Current start-code accumulator
    pub startcode: u32,
    /// Start-condition window
    pub startcond: u32,
    /// Accumulated codec global data (SPS/PPS etc.)
    pub global_data: Vec<u8>,
    /// Raw section buffer for table-carrying PIDs
    pub section: Vec<u8>,
}

/// One component of a program.
#[derive(Debug, Default)]
pub struct ElementaryStream {
    /// Stable index, unique and monotonically assigned within the service
    pub index: u32,
    /// Wire PID, -1 when not yet assigned
    pub pid: i32,
    /// Component type
    pub stream_type: StreamType,
    /// ISO 639 language code, at most three characters
    pub lang: String,
    /// Audio type tag
    pub audio_type: u8,
    /// Sample-rate index for audio
    pub sri: u8,
    /// Audio channel count
    pub channels: u8,
    /// Video width
    pub width: u32,
    /// Video height
    pub height: u32,
    /// Frame duration in 90 kHz units
    pub frame_duration: u32,
    /// Aspect ratio numerator
    pub aspect_num: u16,
    /// Aspect ratio denominator
    pub aspect_den: u16,
    /// DVB subtitle composition page
    pub composition_id: u16,
    /// DVB subtitle ancillary page
    pub ancillary_id: u16,
    /// Carrier PID for text subtitles
    pub parent_pid: u16,
    /// Conditional-access identifiers of CA components
    pub caids: Vec<Caid>,
    /// Persisted ordering position
    pub position: u32,
    /// Scratch marks of the elementary-stream filter
    pub filter: u8,
    /// Continuity counter, -1 before the first packet
    pub cc: i8,
    /// Current decoding timestamp
    pub cur_dts: Option<i64>,
    /// Current presentation timestamp
    pub cur_pts: Option<i64>,
    /// Previous decoding timestamp
    pub prev_dts: Option<i64>,
    /// Last PCR value seen on the wire
    pub pcr_last: Option<i64>,
    /// Wall-clock pairing for the last PCR
    pub pcr_real_last: Option<i64>,
    /// Accumulated PCR drift
    pub pcr_drift: i64,
    /// Consecutive PCR recovery failures
    pub pcr_recovery_fails: u32,
    /// Frames seen blank so far
    pub blank: bool,
    /// Reassembly buffers, rebuilt per start
    pub reassembly: Reassembly,
    /// Average payload rate over the stat window
    pub rate: RateStat,
    /// Continuity errors over the stat window
    pub cc_errors: RateStat,
    /// Display name, maintained by the owning service
    pub nicename: String,
}

impl ElementaryStream {
    /// Creates a component with the given index, PID and type.
    pub fn new(index: u32, pid: i32, stream_type: StreamType) -> Self {
        Self {
            index,
            pid,
            stream_type,
            cc: -1,
            ..Default::default()
        }
    }

    /// Resets the decode-side state before packets start flowing.
    pub fn reinit(&mut self) {
        self.cc = -1;
        self.reassembly.startcond = 0xffff_ffff;
        self.cur_dts = None;
        self.cur_pts = None;
        self.prev_dts = None;
        self.pcr_real_last = None;
        self.pcr_last = None;
        self.pcr_drift = 0;
        self.pcr_recovery_fails = 0;
        self.blank = false;
    }

    /// Clears the reassembly buffers when the stream stops.
    pub fn clean(&mut self) {
        self.reassembly = Reassembly::default();
    }
}
