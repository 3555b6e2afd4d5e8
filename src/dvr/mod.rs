//! # Digital Video Recorder
//!
//! One scheduled recording per [`DvrEntry`]; each active entry owns a
//! worker thread that drives a muxer through the subscribed service's
//! streaming messages. See [`rec`] for the pipeline itself and
//! [`postproc`] for the completion hook.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::channel::Channel;
use crate::config::DvrConfig;
use crate::streaming::{StreamingCode, StreamingQueue};
use crate::subscription::Subscription;

pub mod postproc;
pub mod rec;

/// Scheduling priorities of recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DvrPriority {
    /// Preempts everything below
    Important = 0,
    /// Above normal
    High = 1,
    /// Default
    Normal = 2,
    /// Below normal
    Low = 3,
    /// First to be preempted
    Unimportant = 4,
    /// No priority assigned
    NotSet = 5,
}

/// Maps a raw priority code onto a subscription weight. Codes beyond the
/// known range weigh like normal recordings.
pub fn priority_weight(code: u32) -> i32 {
    match code {
        0 => 500,
        1 => 400,
        2 => 300,
        3 => 200,
        4 => 100,
        5 => 0,
        _ => 300,
    }
}

/// Recording state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DvrRecState {
    /// Waiting for its subscription to come up
    #[default]
    Pending,
    /// Subscribed, waiting for the program composition
    WaitProgramStart,
    /// Writing program data
    Running,
    /// Writing (or skipping) a commercial break
    Commercial,
    /// Stopped on an error
    Error,
    /// Completed
    Finished,
}

/// Mutable recording state, guarded by the entry's own lock.
#[derive(Default)]
pub struct DvrEntryState {
    /// Current recording state
    pub rec_state: DvrRecState,
    /// Last error published to the UI, `Ok` when clear
    pub last_error: StreamingCode,
    /// Number of errors seen over the entry's lifetime
    pub errors: u32,
    /// Absolute path of the current recording file
    pub filename: Option<PathBuf>,
}

/// The streaming chain feeding a recording worker. The subscription owns
/// the chain's entry point; the entry only needs the queue for the EXIT
/// sentinel.
pub(crate) struct RecChain {
    /// The queue the worker drains
    pub queue: Arc<StreamingQueue>,
}

/// One scheduled recording.
pub struct DvrEntry {
    id: Uuid,
    title: String,
    description: Option<String>,
    creator: String,
    channel: Arc<Channel>,
    start: i64,
    stop: i64,
    priority: u32,
    config: Arc<DvrConfig>,
    /// Recording state
    pub state: Mutex<DvrEntryState>,
    pub(crate) sub: Mutex<Option<Arc<Subscription>>>,
    pub(crate) chain: Mutex<Option<RecChain>>,
    pub(crate) thread: Mutex<Option<JoinHandle<()>>>,
}

impl DvrEntry {
    /// Creates an entry for one program on one channel.
    pub fn new(channel: &Arc<Channel>, title: &str, config: Arc<DvrConfig>) -> Arc<DvrEntry> {
        Arc::new(DvrEntry {
            id: Uuid::new_v4(),
            title: title.to_owned(),
            description: None,
            creator: String::new(),
            channel: Arc::clone(channel),
            start: 0,
            stop: 0,
            priority: DvrPriority::Normal as u32,
            config,
            state: Mutex::new(DvrEntryState::default()),
            sub: Mutex::new(None),
            chain: Mutex::new(None),
            thread: Mutex::new(None),
        })
    }

    /// Builder-style entry construction for schedulers.
    pub fn builder(channel: &Arc<Channel>, title: &str, config: Arc<DvrConfig>) -> DvrEntryBuilder {
        DvrEntryBuilder {
            channel: Arc::clone(channel),
            title: title.to_owned(),
            description: None,
            creator: String::new(),
            start: 0,
            stop: 0,
            priority: DvrPriority::Normal as u32,
            config,
        }
    }

    /// Unique identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Program title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Program description, when the EPG supplied one.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// User who scheduled the recording.
    pub fn creator(&self) -> &str {
        &self.creator
    }

    /// The channel being recorded.
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Scheduled start, unix epoch seconds.
    pub fn start_time(&self) -> i64 {
        self.start
    }

    /// Scheduled stop, unix epoch seconds.
    pub fn stop_time(&self) -> i64 {
        self.stop
    }

    /// Raw priority code.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Recording profile.
    pub fn config(&self) -> &Arc<DvrConfig> {
        &self.config
    }

    /// Current recording file, once one is open.
    pub fn filename(&self) -> Option<PathBuf> {
        self.state.lock().filename.clone()
    }

    /// The live subscription, while one exists.
    pub fn subscription(&self) -> Option<Arc<Subscription>> {
        self.sub.lock().clone()
    }

    /// Publishes a state/error pair, notifying only on change. Errors
    /// bump the error counter.
    pub fn set_state(&self, new_state: DvrRecState, error: StreamingCode) {
        let mut st = self.state.lock();
        let mut notify = false;
        if st.rec_state != new_state {
            st.rec_state = new_state;
            notify = true;
        }
        if st.last_error != error {
            st.last_error = error;
            notify = true;
            if error != StreamingCode::Ok {
                st.errors += 1;
            }
        }
        if notify {
            log::debug!(
                target: "dvr",
                "\"{}\": state {:?}, error {}",
                self.title,
                new_state,
                error
            );
        }
    }
}

/// Builder for [`DvrEntry`].
pub struct DvrEntryBuilder {
    channel: Arc<Channel>,
    title: String,
    description: Option<String>,
    creator: String,
    start: i64,
    stop: i64,
    priority: u32,
    config: Arc<DvrConfig>,
}

impl DvrEntryBuilder {
    /// Sets the program description.
    pub fn description(mut self, d: &str) -> Self {
        self.description = Some(d.to_owned());
        self
    }

    /// Sets the scheduling user.
    pub fn creator(mut self, c: &str) -> Self {
        self.creator = c.to_owned();
        self
    }

    /// Sets the scheduled window, unix epoch seconds.
    pub fn window(mut self, start: i64, stop: i64) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    /// Sets the raw priority code.
    pub fn priority(mut self, code: u32) -> Self {
        self.priority = code;
        self
    }

    /// Finishes the entry.
    pub fn build(self) -> Arc<DvrEntry> {
        Arc::new(DvrEntry {
            id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            creator: self.creator,
            channel: self.channel,
            start: self.start,
            stop: self.stop,
            priority: self.priority,
            config: self.config,
            state: Mutex::new(DvrEntryState::default()),
            sub: Mutex::new(None),
            chain: Mutex::new(None),
            thread: Mutex::new(None),
        })
    }
}
