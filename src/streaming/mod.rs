//! # Streaming Core Types
//!
//! The message vocabulary spoken between a running service and its
//! subscribers. A service fans messages out through its
//! [`StreamingPad`](pad::StreamingPad); each subscriber owns a
//! [`StreamingTarget`] that consumes them, typically a
//! [`StreamingQueue`](queue::StreamingQueue) drained by a worker thread.
//!
//! Ordering guarantees (enforced by the producers in [`crate::service`]):
//!
//! - messages arrive at each target in enqueue order; targets may lag one
//!   another but never reorder within themselves
//! - [`StreamingMessage::Start`] always precedes any packet a target sees
//! - a `Stop(SourceReconfigured)` is always followed by either another
//!   `Start` or a terminal `Stop`

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

pub mod pad;
pub mod queue;

pub use pad::StreamingPad;
pub use queue::StreamingQueue;

/// Result codes surfaced to subscribers and the management UI.
///
/// The discriminants form a severity scale: when several codes are observed
/// during one instance-selection pass, the numerically largest wins.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum StreamingCode {
    /// No error
    #[default]
    Ok = 0,
    /// Unclassified failure
    UndefinedError = 1,
    /// The upstream mux reconfigured; another `Start` is coming, do not
    /// finalize output
    SourceReconfigured = 100,
    /// The service was deleted while subscribed
    SourceDeleted = 101,
    /// No tuner instance was free to take the service
    NoFreeAdapter = 200,
    /// An instance was chosen but could not be tuned
    TuningFailed = 203,
    /// No descrambler is available for the scrambled service
    NoDescrambler = 300,
    /// The descrambler denied access
    NoAccess = 301,
    /// No data arrived within the grace period
    NoInput = 302,
}

impl StreamingCode {
    /// Human-readable description, as shown in log lines and the UI.
    pub fn label(self) -> &'static str {
        match self {
            StreamingCode::Ok => "OK",
            StreamingCode::UndefinedError => "Unknown error",
            StreamingCode::SourceReconfigured => "Source reconfigured",
            StreamingCode::SourceDeleted => "Source deleted",
            StreamingCode::NoFreeAdapter => "No free adapter",
            StreamingCode::TuningFailed => "Tuning failed",
            StreamingCode::NoDescrambler => "No descrambler available",
            StreamingCode::NoAccess => "No access",
            StreamingCode::NoInput => "No input detected",
        }
    }
}

impl fmt::Display for StreamingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Streaming-status bits carried by [`StreamingMessage::ServiceStatus`].
///
/// The low bits report forward progress through the input chain, the high
/// bits report error conditions. `LIVE` lives in the separate
/// streaming-live word of the service.
pub mod tss {
    /// Hardware sensed input but nothing for the service
    pub const INPUT_HARDWARE: u32 = 0x0001;
    /// Packets for this service arrived but could not be decoded further
    pub const INPUT_SERVICE: u32 = 0x0002;
    /// Multiplexed packets seen
    pub const MUX_PACKETS: u32 = 0x0004;
    /// Reassembled packets are flowing
    pub const PACKETS: u32 = 0x0008;
    /// Data arrived within the current timeout window
    pub const LIVE: u32 = 0x0001;

    /// No descrambler could be attached
    pub const NO_DESCRAMBLER: u32 = 0x1_0000;
    /// Descrambler denied access
    pub const NO_ACCESS: u32 = 0x2_0000;
    /// Grace period expired without packets
    pub const GRACEPERIOD: u32 = 0x4_0000;
    /// Data timeout hit after packets had been seen
    pub const TIMEOUT: u32 = 0x8_0000;
    /// All error bits
    pub const ERRORS: u32 = NO_DESCRAMBLER | NO_ACCESS | GRACEPERIOD | TIMEOUT;
}

/// Render a streaming-status bitmask as a one-line description.
///
/// Error conditions win over progress reports; among progress reports the
/// most advanced stage is shown.
pub fn tss_to_text(flags: u32) -> &'static str {
    if flags & tss::NO_ACCESS != 0 {
        "No access"
    } else if flags & tss::NO_DESCRAMBLER != 0 {
        "No descrambler"
    } else if flags & tss::PACKETS != 0 {
        "Got valid packets"
    } else if flags & tss::MUX_PACKETS != 0 {
        "Got multiplexed packets but could not decode further"
    } else if flags & tss::INPUT_SERVICE != 0 {
        "Got packets for this service but could not decode further"
    } else if flags & tss::INPUT_HARDWARE != 0 {
        "Sensed input from hardware but nothing for the service"
    } else if flags & tss::GRACEPERIOD != 0 {
        "No input detected"
    } else if flags & tss::TIMEOUT != 0 {
        "Data timeout"
    } else {
        "No status"
    }
}

/// Map a streaming-status bitmask onto the error code subscribers report.
pub fn tss_to_code(flags: u32) -> StreamingCode {
    if flags & tss::NO_ACCESS != 0 {
        StreamingCode::NoAccess
    } else if flags & tss::NO_DESCRAMBLER != 0 {
        StreamingCode::NoDescrambler
    } else if flags & (tss::GRACEPERIOD | tss::TIMEOUT) != 0 {
        StreamingCode::NoInput
    } else {
        StreamingCode::Ok
    }
}

/// Commercial-break advice attached to reassembled packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Commercial {
    /// No advice available
    #[default]
    Unknown,
    /// Packet belongs to a commercial break
    Yes,
    /// Packet belongs to the program proper
    No,
}

/// One reassembled elementary-stream packet.
///
/// The payload is reference counted; cloning a packet shares the bytes with
/// every other packet in flight.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Index of the originating component within its service
    pub index: u32,
    /// Decoding timestamp, 90 kHz units
    pub dts: Option<i64>,
    /// Presentation timestamp, 90 kHz units
    pub pts: Option<i64>,
    /// Frame duration in 90 kHz units, 0 when unknown
    pub duration: u32,
    /// Commercial-break advice
    pub commercial: Commercial,
    /// Payload bytes
    pub payload: Bytes,
}

impl Packet {
    /// Creates a packet for the given component carrying `payload`.
    pub fn new(index: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            index,
            dts: None,
            pts: None,
            duration: 0,
            commercial: Commercial::Unknown,
            payload: payload.into(),
        }
    }

    /// Sets the decoding timestamp.
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Sets the presentation timestamp.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Sets the commercial-break advice.
    pub fn with_commercial(mut self, commercial: Commercial) -> Self {
        self.commercial = commercial;
        self
    }
}

/// Where a running service's data comes from, as reported by its input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceInfo {
    /// Physical device path
    pub device: Option<String>,
    /// Adapter name
    pub adapter: Option<String>,
    /// Network name
    pub network: Option<String>,
    /// Mux name
    pub mux: Option<String>,
    /// Provider name
    pub provider: Option<String>,
    /// Service name
    pub service: Option<String>,
}

/// One component entry inside a [`StreamingStart`].
#[derive(Debug, Clone, Default)]
pub struct StartComponent {
    /// Stable index of the component within its service
    pub index: u32,
    /// Component type
    pub stream_type: crate::service::stream::StreamType,
    /// ISO 639 language code, empty when unknown
    pub lang: String,
    /// Audio type tag
    pub audio_type: u8,
    /// DVB subtitle composition page id
    pub composition_id: u16,
    /// DVB subtitle ancillary page id
    pub ancillary_id: u16,
    /// Wire PID, -1 when not yet assigned
    pub pid: i32,
    /// Video width in pixels
    pub width: u32,
    /// Video height in pixels
    pub height: u32,
    /// Frame duration in 90 kHz units
    pub frame_duration: u32,
    /// Aspect ratio numerator
    pub aspect_num: u16,
    /// Aspect ratio denominator
    pub aspect_den: u16,
    /// Sample-rate index for audio components
    pub sri: u8,
    /// Audio channel count
    pub channels: u8,
    /// Component carries no valid input
    pub disabled: bool,
}

/// Full description of a (re)started stream: the filtered component list
/// plus source information. Shared read-only between all targets.
#[derive(Debug, Clone, Default)]
pub struct StreamingStart {
    /// Components in filtered order
    pub components: Vec<StartComponent>,
    /// PCR PID of the program
    pub pcr_pid: u16,
    /// PMT PID of the program
    pub pmt_pid: u16,
    /// DVB service id, 0 when not applicable
    pub service_id: u16,
    /// Source description
    pub source: SourceInfo,
}

impl StreamingStart {
    /// Looks up a component by its stable index.
    pub fn component(&self, index: u32) -> Option<&StartComponent> {
        self.components.iter().find(|c| c.index == index)
    }
}

/// Messages delivered from a service to its streaming targets.
///
/// Produced once and consumed once; packet payloads are shared via their
/// internal refcount when a pad clones a message per target.
#[derive(Debug, Clone)]
pub enum StreamingMessage {
    /// Stream (re)starts with the given composition
    Start(Arc<StreamingStart>),
    /// Stream stops; `SourceReconfigured` means another `Start` follows
    Stop(StreamingCode),
    /// One reassembled packet
    Packet(Packet),
    /// One raw MPEG-TS chunk
    Mpegts(Bytes),
    /// Streaming-status bitmask changed, see [`tss`]
    ServiceStatus(u32),
    /// Signal quality update
    SignalStatus,
    /// Timeshift state update
    TimeshiftStatus,
    /// Grace period in effect for the given number of seconds
    Grace(u32),
    /// Playback speed change request
    Speed(i32),
    /// Seek request
    Skip,
    /// The subscription could not be started
    NoStart(StreamingCode),
    /// Sentinel: the consumer thread must exit
    Exit,
}

impl StreamingMessage {
    /// Bit used by queue reject masks, one per message kind.
    pub fn kind_bit(&self) -> u32 {
        match self {
            StreamingMessage::Start(_) => 1 << 0,
            StreamingMessage::Stop(_) => 1 << 1,
            StreamingMessage::Packet(_) => 1 << 2,
            StreamingMessage::Mpegts(_) => 1 << 3,
            StreamingMessage::ServiceStatus(_) => 1 << 4,
            StreamingMessage::SignalStatus => 1 << 5,
            StreamingMessage::TimeshiftStatus => 1 << 6,
            StreamingMessage::Grace(_) => 1 << 7,
            StreamingMessage::Speed(_) => 1 << 8,
            StreamingMessage::Skip => 1 << 9,
            StreamingMessage::NoStart(_) => 1 << 10,
            StreamingMessage::Exit => 1 << 11,
        }
    }

    /// Payload length for byte accounting, 0 for control messages.
    pub fn payload_len(&self) -> usize {
        match self {
            StreamingMessage::Packet(pkt) => pkt.payload.len(),
            StreamingMessage::Mpegts(buf) => buf.len(),
            _ => 0,
        }
    }
}

/// Reject-mask bit for [`StreamingMessage::Packet`].
pub const SMT_PACKET: u32 = 1 << 2;

/// A consumer of streaming messages.
///
/// `deliver` is called with the producing service's stream mutex held and
/// must not block indefinitely; ownership of the message transfers to the
/// target.
pub trait StreamingTarget: Send + Sync {
    /// Accept one message.
    fn deliver(&self, msg: StreamingMessage);
}
