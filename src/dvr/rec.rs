//! Recording pipeline: subscription wiring, the per-entry worker thread,
//! filename generation and the muxer epilog.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{Local, TimeZone};

use crate::context::PvrContext;
use crate::error::{PvrError, Result};
use crate::muxer::{self, BroadcastMeta, Muxer, MuxerContainer};
use crate::plumbing::{GlobalHeaders, TsFix};
use crate::streaming::{
    tss, Commercial, StreamingCode, StreamingMessage, StreamingQueue, StreamingStart,
    StreamingTarget, SMT_PACKET,
};
use crate::subscription::{Subscription, SUBSCRIPTION_RAW_MPEGTS};

use super::{DvrEntry, DvrRecState, RecChain};

/// Subscribes the entry to its channel and spawns the worker thread.
pub fn subscribe(ctx: &PvrContext, entry: &Arc<DvrEntry>) {
    assert!(entry.sub.lock().is_none());

    let weight = super::priority_weight(entry.priority());
    let title = format!("DVR: {}", entry.title());

    let queue;
    let head: Arc<dyn StreamingTarget>;
    let flags;
    if entry.config().container == MuxerContainer::Pass {
        // raw TS recording: reassembled packets are just noise
        queue = Arc::new(StreamingQueue::with_reject(SMT_PACKET));
        head = queue.clone();
        flags = SUBSCRIPTION_RAW_MPEGTS;
    } else {
        queue = Arc::new(StreamingQueue::new());
        let gh = GlobalHeaders::new(queue.clone());
        let tsfix = TsFix::new(gh);
        tsfix.set_start_time(entry.start_time());
        head = tsfix;
        flags = 0;
    }
    *entry.chain.lock() = Some(RecChain {
        queue: queue.clone(),
    });

    let sub = Subscription::create_from_channel(ctx, entry.channel(), weight, &title, head, flags);
    *entry.sub.lock() = Some(sub);

    let entry2 = Arc::clone(entry);
    let handle = std::thread::Builder::new()
        .name("dvr".into())
        .spawn(move || worker(&entry2, &queue))
        .unwrap_or_else(|e| panic!("failed to spawn dvr thread: {e}"));
    *entry.thread.lock() = Some(handle);
}

/// Queues the EXIT sentinel, joins the worker and tears the subscription
/// down. `stopcode` becomes the entry's last error.
pub fn unsubscribe(ctx: &PvrContext, entry: &Arc<DvrEntry>, stopcode: StreamingCode) {
    let chain = entry.chain.lock().take();
    if let Some(chain) = &chain {
        chain.queue.deliver(StreamingMessage::Exit);
    }
    if let Some(handle) = entry.thread.lock().take() {
        let _ = handle.join();
    }
    if let Some(sub) = entry.sub.lock().take() {
        sub.unsubscribe(ctx);
    }
    entry.state.lock().last_error = stopcode;
}

/// Worker-side recording state: the muxer, whether it is started, and the
/// commercial tracking used for marker insertion.
struct RecState {
    entry: Arc<DvrEntry>,
    muxer: Option<Box<dyn Muxer>>,
    started: bool,
    comm_skip: bool,
    commercial: Commercial,
}

impl RecState {
    fn new(entry: &Arc<DvrEntry>) -> Self {
        Self {
            entry: Arc::clone(entry),
            muxer: None,
            started: false,
            comm_skip: entry.config().skip_commercials,
            commercial: Commercial::Unknown,
        }
    }

    /// Processes one streaming message; returns false on EXIT.
    fn handle(&mut self, msg: StreamingMessage) -> bool {
        let entry = Arc::clone(&self.entry);
        match msg {
            StreamingMessage::Packet(pkt) => {
                if pkt.commercial == Commercial::Yes {
                    entry.set_state(DvrRecState::Commercial, StreamingCode::Ok);
                } else {
                    entry.set_state(DvrRecState::Running, StreamingCode::Ok);
                }

                if self.commercial != pkt.commercial {
                    if self.started {
                        if let Some(mx) = self.muxer.as_mut() {
                            let _ = mx.add_marker();
                        }
                    }
                    self.commercial = pkt.commercial;
                }

                if pkt.commercial == Commercial::Yes && self.comm_skip {
                    return true;
                }

                if self.started {
                    if let Some(mx) = self.muxer.as_mut() {
                        if let Err(e) = mx.write_pkt(StreamingMessage::Packet(pkt)) {
                            fatal_error(&entry, &format!("write failed: {e}"));
                        }
                    }
                }
            }

            StreamingMessage::Mpegts(buf) => {
                if self.started {
                    entry.set_state(DvrRecState::Running, StreamingCode::Ok);
                    if let Some(mx) = self.muxer.as_mut() {
                        if let Err(e) = mx.write_pkt(StreamingMessage::Mpegts(buf)) {
                            fatal_error(&entry, &format!("write failed: {e}"));
                        }
                    }
                }
            }

            StreamingMessage::Start(ss) => {
                if self.started {
                    let refused = match self.muxer.as_mut() {
                        Some(mx) => !mx.reconfigure(&ss),
                        None => true,
                    };
                    if refused {
                        log::warn!(
                            target: "dvr",
                            "unable to reconfigure \"{}\"",
                            display_name(&entry)
                        );
                        // restart the recording instead
                        epilog(&entry, &mut self.muxer);
                        self.started = false;
                    }
                }

                if !self.started {
                    entry.set_state(DvrRecState::WaitProgramStart, StreamingCode::Ok);
                    if let Ok(mx) = rec_start(&entry, &ss) {
                        self.muxer = Some(mx);
                        self.started = true;
                        log::info!(
                            target: "dvr",
                            "\"{}\": recording started",
                            display_name(&entry)
                        );
                    }
                }
            }

            StreamingMessage::Stop(code) => {
                if code == StreamingCode::SourceReconfigured {
                    // the subscription is restarting, wait for START
                } else if code == StreamingCode::Ok {
                    entry.state.lock().last_error = StreamingCode::Ok;
                    log::info!(
                        target: "dvr",
                        "Recording completed: \"{}\"",
                        display_name(&entry)
                    );
                    epilog(&entry, &mut self.muxer);
                    self.started = false;
                } else if entry.state.lock().last_error != code {
                    entry.set_state(DvrRecState::Error, code);
                    log::error!(
                        target: "dvr",
                        "Recording stopped: \"{}\": {}",
                        display_name(&entry),
                        code
                    );
                    epilog(&entry, &mut self.muxer);
                    self.started = false;
                }
            }

            StreamingMessage::ServiceStatus(status) => {
                if status & tss::PACKETS != 0 {
                    // packets are flowing again; nothing to publish
                } else if status & (tss::GRACEPERIOD | tss::ERRORS) != 0 {
                    let mut code = StreamingCode::UndefinedError;
                    if status & tss::NO_DESCRAMBLER != 0 {
                        code = StreamingCode::NoDescrambler;
                    }
                    if status & tss::NO_ACCESS != 0 {
                        code = StreamingCode::NoAccess;
                    }
                    if entry.state.lock().last_error != code {
                        entry.set_state(DvrRecState::Error, code);
                        log::error!(
                            target: "dvr",
                            "Streaming error: \"{}\": {}",
                            display_name(&entry),
                            code
                        );
                    }
                }
            }

            StreamingMessage::NoStart(code) => {
                if entry.state.lock().last_error != code {
                    entry.set_state(DvrRecState::Pending, code);
                    log::error!(
                        target: "dvr",
                        "Recording unable to start: \"{}\": {}",
                        display_name(&entry),
                        code
                    );
                }
            }

            StreamingMessage::Grace(_)
            | StreamingMessage::Speed(_)
            | StreamingMessage::Skip
            | StreamingMessage::SignalStatus
            | StreamingMessage::TimeshiftStatus => {}

            StreamingMessage::Exit => return false,
        }
        true
    }
}

fn worker(entry: &Arc<DvrEntry>, queue: &StreamingQueue) {
    let mut rec = RecState::new(entry);
    let mut run = true;

    while run {
        let sub = entry.sub.lock().clone();
        let started = rec.started;
        let msg = queue.recv_with(|m| {
            if started {
                if let Some(sub) = &sub {
                    let len = m.payload_len();
                    if len > 0 {
                        sub.bytes_out.fetch_add(len as u64, Ordering::Relaxed);
                    }
                }
            }
        });
        run = rec.handle(msg);
    }

    if rec.muxer.is_some() {
        epilog(entry, &mut rec.muxer);
    }
}

fn display_name(entry: &DvrEntry) -> String {
    entry
        .filename()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| entry.title().to_owned())
}

fn fatal_error(entry: &DvrEntry, msg: &str) {
    log::error!(
        target: "dvr",
        "Recording error: \"{}\": {}",
        display_name(entry),
        msg
    );
}

/// Allocates the muxer and opens the output file for a composition.
fn rec_start(entry: &Arc<DvrEntry>, ss: &StreamingStart) -> Result<Box<dyn Muxer>> {
    let cfg = entry.config();

    let mut mx = muxer::create(cfg.container, &cfg.muxer).map_err(|e| {
        fatal_error(entry, "Unable to create muxer");
        e
    })?;

    let path = generate_filename(entry, mx.suffix(ss)).map_err(|e| {
        fatal_error(entry, "Unable to create directories");
        e
    })?;

    mx.open_file(&path).map_err(|e| {
        fatal_error(entry, "Unable to open file");
        e
    })?;

    mx.init(ss, entry.title()).map_err(|e| {
        fatal_error(entry, "Unable to init file");
        e
    })?;

    if cfg.tag_files {
        let meta = BroadcastMeta {
            title: entry.title().to_owned(),
            description: entry.description().map(str::to_owned),
            start: entry.start_time(),
            stop: entry.stop_time(),
        };
        mx.write_meta(&meta).map_err(|e| {
            fatal_error(entry, "Unable to write meta data");
            e
        })?;
    }

    let si = &ss.source;
    log::info!(
        target: "dvr",
        "{} from adapter: \"{}\", network: \"{}\", mux: \"{}\", provider: \"{}\", service: \"{}\"",
        path.display(),
        si.adapter.as_deref().unwrap_or("<N/A>"),
        si.network.as_deref().unwrap_or("<N/A>"),
        si.mux.as_deref().unwrap_or("<N/A>"),
        si.provider.as_deref().unwrap_or("<N/A>"),
        si.service.as_deref().unwrap_or("<N/A>")
    );

    log::info!(
        target: "dvr",
        " #  {:<16}  {:<4}  {:<10}  {:<12}  {:<11}  {:<8}",
        "type", "lang", "resolution", "aspect ratio", "sample rate", "channels"
    );
    for c in &ss.components {
        let res = if c.stream_type.is_video() && c.width != 0 && c.height != 0 {
            format!("{}x{}", c.width, c.height)
        } else if c.stream_type.is_video() {
            "?".into()
        } else {
            String::new()
        };
        let asp = if c.stream_type.is_video() && c.aspect_num != 0 && c.aspect_den != 0 {
            format!("{}:{}", c.aspect_num, c.aspect_den)
        } else if c.stream_type.is_video() {
            "?".into()
        } else {
            String::new()
        };
        let (sr, ch) = if c.stream_type.is_audio() {
            (
                if c.sri != 0 {
                    format!("{}", sri_to_rate(c.sri))
                } else {
                    "?".into()
                },
                match c.channels {
                    6 => "5.1".into(),
                    0 => "?".into(),
                    n => format!("{n}"),
                },
            )
        } else {
            (String::new(), String::new())
        };
        log::info!(
            target: "dvr",
            "{:2}  {:<16}  {:<4}  {:<10}  {:<12}  {:<11}  {:<8}  {}",
            c.index,
            c.stream_type.as_str(),
            c.lang,
            res,
            asp,
            sr,
            ch,
            if c.disabled { "<disabled, no valid input>" } else { "" }
        );
    }

    Ok(mx)
}

/// Audio sample-rate index to Hz.
fn sri_to_rate(sri: u8) -> u32 {
    const RATES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];
    RATES.get(sri as usize).copied().unwrap_or(0)
}

/// Finalizes the muxer and fires the post-processor.
fn epilog(entry: &Arc<DvrEntry>, muxer: &mut Option<Box<dyn Muxer>>) {
    if let Some(mut mx) = muxer.take() {
        if let Err(e) = mx.close() {
            fatal_error(entry, &format!("close failed: {e}"));
        }
    }
    let cfg = entry.config();
    if let Some(postproc) = &cfg.postproc {
        if entry.filename().is_some() {
            super::postproc::spawn(entry, postproc);
        }
    }
}

/// Converts a title into the configured charset, falling back to ASCII
/// when the charset is unsupported.
fn to_charset(s: &str, charset: &str) -> Result<String> {
    match charset.to_ascii_uppercase().as_str() {
        "UTF-8" | "UTF8" => Ok(s.to_owned()),
        "ASCII" | "US-ASCII" => Ok(s
            .chars()
            .map(|c| if c.is_ascii() { c } else { '_' })
            .collect()),
        other => Err(PvrError::Charset(format!("unsupported charset {other}"))),
    }
}

/// Sanitizes one path component.
pub(crate) fn cleanup_filename(s: &str, cfg: &crate::config::DvrConfig) -> String {
    let converted = match to_charset(s, &cfg.charset) {
        Ok(c) => c,
        Err(_) => {
            log::error!(
                target: "dvr",
                "Unsupported charset {} using ASCII",
                cfg.charset
            );
            s.chars()
                .map(|c| if c.is_ascii() { c } else { '_' })
                .collect()
        }
    };

    let mut out = String::with_capacity(converted.len());
    for (i, mut c) in converted.chars().enumerate() {
        // do not create hidden files
        if i == 0 && c == '.' {
            c = '_';
        }
        if c == '/' {
            c = '-';
        } else if cfg.whitespace_in_title && (c == ' ' || c == '\t') {
            c = '-';
        } else if cfg.clean_title
            && ((c as u32) < 32 || (c as u32) > 122 || "/:\\<>|*?'\"".contains(c))
        {
            c = '_';
        }
        out.push(c);
    }
    out
}

fn makedirs(path: &std::path::Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path)?;
    Ok(())
}

/// Builds a unique output path for the entry:
/// `<storage>/[YYYY-MM-DD/][<chan>/][<title>/]<title>[-N].<suffix>`.
pub(crate) fn generate_filename(entry: &Arc<DvrEntry>, suffix: &str) -> Result<PathBuf> {
    let cfg = entry.config();

    let mut storage = cfg.storage.to_string_lossy().into_owned();
    while storage.len() > 1 && storage.ends_with('/') {
        storage.pop();
    }
    let mut path = PathBuf::from(storage);

    if cfg.dir_per_day {
        let day = Local
            .timestamp_opt(entry.start_time(), 0)
            .single()
            .unwrap_or_else(Local::now)
            .format("%F")
            .to_string();
        path.push(cleanup_filename(&day, cfg));
    }

    if cfg.channel_dir {
        path.push(cleanup_filename(entry.channel().name(), cfg));
    }

    if cfg.title_dir {
        path.push(cleanup_filename(entry.title(), cfg));
    }

    makedirs(&path, cfg.muxer.directory_permissions)?;

    let filename = cleanup_filename(entry.title(), cfg);
    let mut fullname = path.join(format!("{}.{}", filename, suffix));

    let mut tally = 0;
    while fullname.exists() {
        log::debug!(
            target: "dvr",
            "Overwrite protection, file \"{}\" exists",
            fullname.display()
        );
        tally += 1;
        fullname = path.join(format!("{}-{}.{}", filename, tally, suffix));
    }
    log::debug!(
        target: "dvr",
        "File \"{}\" -- Using for recording",
        fullname.display()
    );

    entry.state.lock().filename = Some(fullname.clone());
    Ok(fullname)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::DvrConfig;

    fn cfg() -> DvrConfig {
        DvrConfig::default()
    }

    #[test]
    fn cleanup_replaces_slashes_and_leading_dot() {
        let mut c = cfg();
        c.whitespace_in_title = false;
        assert_eq!(cleanup_filename("a/b", &c), "a-b");
        assert_eq!(cleanup_filename(".hidden", &c), "_hidden");
    }

    #[test]
    fn cleanup_whitespace_flag() {
        let mut c = cfg();
        c.whitespace_in_title = true;
        assert_eq!(cleanup_filename("two words\there", &c), "two-words-here");
    }

    #[test]
    fn cleanup_clean_title_replaces_hostile_chars() {
        let mut c = cfg();
        c.whitespace_in_title = false;
        c.clean_title = true;
        assert_eq!(cleanup_filename("a:b?c\"d", &c), "a_b_c_d");
        assert_eq!(cleanup_filename("caf\u{e9}", &c), "caf_");
    }

    #[test]
    fn unknown_charset_falls_back_to_ascii() {
        let mut c = cfg();
        c.charset = "KOI8-R".into();
        c.whitespace_in_title = false;
        assert_eq!(cleanup_filename("caf\u{e9}", &c), "caf_");
    }

    #[test]
    fn filename_uniqueness_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::context::PvrContext::new();
        let ch = ctx.create_channel("One");
        let mut c = cfg();
        c.storage = dir.path().to_path_buf();
        let entry = DvrEntry::new(&ch, "show", Arc::new(c));

        let p1 = generate_filename(&entry, "ts").unwrap();
        assert_eq!(p1, dir.path().join("show.ts"));
        std::fs::write(&p1, b"x").unwrap();

        let p2 = generate_filename(&entry, "ts").unwrap();
        assert_eq!(p2, dir.path().join("show-1.ts"));
        std::fs::write(&p2, b"x").unwrap();

        let p3 = generate_filename(&entry, "ts").unwrap();
        assert_eq!(p3, dir.path().join("show-2.ts"));
        assert_eq!(entry.filename(), Some(p3));
        ctx.shutdown();
    }

    #[derive(Default)]
    struct MuxProbe {
        writes: usize,
        markers: usize,
        closed: bool,
    }

    struct ProbeMuxer {
        probe: Arc<parking_lot::Mutex<MuxProbe>>,
        accept_reconfigure: bool,
    }

    impl Muxer for ProbeMuxer {
        fn open_file(&mut self, _path: &std::path::Path) -> crate::error::Result<()> {
            Ok(())
        }
        fn init(&mut self, _start: &StreamingStart, _title: &str) -> crate::error::Result<()> {
            Ok(())
        }
        fn write_pkt(&mut self, _msg: StreamingMessage) -> crate::error::Result<()> {
            self.probe.lock().writes += 1;
            Ok(())
        }
        fn add_marker(&mut self) -> crate::error::Result<()> {
            self.probe.lock().markers += 1;
            Ok(())
        }
        fn reconfigure(&mut self, _start: &StreamingStart) -> bool {
            self.accept_reconfigure
        }
        fn suffix(&self, _start: &StreamingStart) -> &'static str {
            "ts"
        }
        fn close(&mut self) -> crate::error::Result<()> {
            self.probe.lock().closed = true;
            Ok(())
        }
    }

    fn entry_with_storage(skip_commercials: bool) -> (tempfile::TempDir, Arc<DvrEntry>) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::context::PvrContext::new();
        let ch = ctx.create_channel("One");
        let mut c = cfg();
        c.storage = dir.path().to_path_buf();
        c.skip_commercials = skip_commercials;
        c.tag_files = false;
        let entry = DvrEntry::new(&ch, "show", Arc::new(c));
        ctx.shutdown();
        (dir, entry)
    }

    fn packet(commercial: Commercial) -> StreamingMessage {
        StreamingMessage::Packet(
            crate::streaming::Packet::new(1, vec![0u8; 188]).with_commercial(commercial),
        )
    }

    /// Commercial skipping drops flagged packets but still marks every
    /// transition.
    #[test]
    fn commercial_skip_drops_packets_and_marks_transitions() {
        let (_dir, entry) = entry_with_storage(true);
        let probe = Arc::new(parking_lot::Mutex::new(MuxProbe::default()));
        let mut rec = RecState::new(&entry);
        rec.muxer = Some(Box::new(ProbeMuxer {
            probe: probe.clone(),
            accept_reconfigure: true,
        }));
        rec.started = true;

        rec.handle(packet(Commercial::No));
        rec.handle(packet(Commercial::Yes));
        rec.handle(packet(Commercial::Yes));
        rec.handle(packet(Commercial::No));
        rec.handle(packet(Commercial::Yes));

        let p = probe.lock();
        // 2 program packets written, 4 flag transitions marked
        assert_eq!(p.writes, 2);
        assert_eq!(p.markers, 4);
        assert_eq!(entry.state.lock().rec_state, DvrRecState::Commercial);
    }

    /// A muxer refusing reconfiguration gets finalized; the recording
    /// restarts into a fresh file with a numeric suffix.
    #[test]
    fn refused_reconfigure_restarts_into_suffixed_file() {
        let (dir, entry) = entry_with_storage(false);
        // first segment already on disk
        std::fs::write(dir.path().join("show.ts"), b"segment1").unwrap();
        entry.state.lock().filename = Some(dir.path().join("show.ts"));

        let probe = Arc::new(parking_lot::Mutex::new(MuxProbe::default()));
        let mut rec = RecState::new(&entry);
        rec.muxer = Some(Box::new(ProbeMuxer {
            probe: probe.clone(),
            accept_reconfigure: false,
        }));
        rec.started = true;

        rec.handle(StreamingMessage::Stop(StreamingCode::SourceReconfigured));
        assert!(rec.started); // waiting for the fresh START

        rec.handle(StreamingMessage::Start(Arc::new(StreamingStart::default())));

        assert!(probe.lock().closed);
        assert!(rec.started);
        assert_eq!(entry.filename(), Some(dir.path().join("show-1.ts")));
        assert!(dir.path().join("show-1.ts").exists());
    }

    /// An accepted reconfiguration keeps the muxer and the file.
    #[test]
    fn accepted_reconfigure_keeps_the_muxer() {
        let (_dir, entry) = entry_with_storage(false);
        let probe = Arc::new(parking_lot::Mutex::new(MuxProbe::default()));
        let mut rec = RecState::new(&entry);
        rec.muxer = Some(Box::new(ProbeMuxer {
            probe: probe.clone(),
            accept_reconfigure: true,
        }));
        rec.started = true;

        rec.handle(StreamingMessage::Start(Arc::new(StreamingStart::default())));
        assert!(!probe.lock().closed);
        assert!(rec.started);
    }

    /// Repeated error statuses publish the error once.
    #[test]
    fn service_status_errors_publish_once() {
        let (_dir, entry) = entry_with_storage(false);
        let mut rec = RecState::new(&entry);

        rec.handle(StreamingMessage::ServiceStatus(tss::NO_ACCESS));
        assert_eq!(entry.state.lock().errors, 1);
        assert_eq!(entry.state.lock().last_error, StreamingCode::NoAccess);
        assert_eq!(entry.state.lock().rec_state, DvrRecState::Error);

        rec.handle(StreamingMessage::ServiceStatus(tss::NO_ACCESS));
        assert_eq!(entry.state.lock().errors, 1);
    }

    /// EXIT breaks the loop.
    #[test]
    fn exit_terminates_the_state_machine() {
        let (_dir, entry) = entry_with_storage(false);
        let mut rec = RecState::new(&entry);
        assert!(rec.handle(StreamingMessage::Skip));
        assert!(!rec.handle(StreamingMessage::Exit));
    }

    #[test]
    fn per_day_and_channel_directories() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::context::PvrContext::new();
        let ch = ctx.create_channel("News 24");
        let mut c = cfg();
        c.storage = dir.path().to_path_buf();
        c.dir_per_day = true;
        c.channel_dir = true;
        let entry = DvrEntry::builder(&ch, "bulletin", Arc::new(c))
            .window(1_722_500_000, 1_722_503_600)
            .build();

        let p = generate_filename(&entry, "ts").unwrap();
        let rel = p.strip_prefix(dir.path()).unwrap();
        let parts: Vec<_> = rel.components().collect();
        // date dir, channel dir, filename
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].as_os_str(), "News-24");
        assert_eq!(parts[2].as_os_str(), "bulletin.ts");
        assert!(p.parent().unwrap().is_dir());
        ctx.shutdown();
    }
}
