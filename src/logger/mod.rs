//! # Logging
//!
//! Producer/consumer logger: producers format into a bounded queue under
//! the log mutex, a dedicated thread drains it into the enabled sinks
//! (stderr, syslog, a lazily opened log file and a notify sideband for
//! the UI). The crate logs through the standard `log` facade; installing
//! a [`Logger`] as the facade backend routes those records through the
//! same queue, with the record target as the subsystem.
//!
//! Debug and trace records pass per-subsystem maps with an `all` default;
//! everything else passes unconditionally. When the queue is full the
//! offending message is coerced into a single "log buffer full" error so
//! the overflow itself is reported exactly once until the queue drains
//! below half.

use std::collections::{HashMap, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use parking_lot::{Condvar, Mutex};

const QUEUE_MAXSIZE: usize = 10_000;
const MSG_MAXLEN: usize = 1024;

/// Syslog-style severity scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// System is unusable
    Emergency,
    /// Action must be taken immediately
    Alert,
    /// Critical condition
    Critical,
    /// Error condition
    Error,
    /// Warning condition
    Warning,
    /// Normal but significant
    Notice,
    /// Informational
    Info,
    /// Debug-level message
    Debug,
    /// Trace-level message
    Trace,
}

impl Severity {
    /// Uppercase label, padded to at least seven columns in line output.
    pub fn label(self) -> &'static str {
        match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
            Severity::Trace => "TRACE",
        }
    }

    /// ANSI SGR sequence used with stderr decoration.
    fn sgr(self) -> &'static str {
        match self {
            Severity::Emergency | Severity::Alert | Severity::Critical | Severity::Error => {
                "\x1b[31m"
            }
            Severity::Warning => "\x1b[33m",
            Severity::Notice => "\x1b[36m",
            Severity::Info | Severity::Debug | Severity::Trace => "\x1b[32m",
        }
    }

    /// Numeric syslog severity, trace clamped to debug.
    fn syslog(self) -> u8 {
        (self as u8).min(7)
    }

    fn from_level(level: log::Level) -> Severity {
        match level {
            log::Level::Error => Severity::Error,
            log::Level::Warn => Severity::Warning,
            log::Level::Info => Severity::Info,
            log::Level::Debug => Severity::Debug,
            log::Level::Trace => Severity::Trace,
        }
    }
}

/// Sink and decoration switches.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Maximum severity that passes at all
    pub level: Severity,
    /// Write to stderr
    pub stderr: bool,
    /// Write to syslog
    pub syslog: bool,
    /// ANSI colors on stderr
    pub decorate: bool,
    /// Millisecond timestamps
    pub millis: bool,
    /// `(file:line)` decoration on debug and trace lines
    pub fileline: bool,
    /// Thread-id decoration
    pub thread: bool,
    /// Debug/trace records also go to stderr
    pub dbg_stderr: bool,
    /// Debug/trace records also go to syslog
    pub dbg_syslog: bool,
    /// Debug/trace records also go to the log file
    pub dbg_file: bool,
    /// Log file path; opened lazily, closed whenever the queue empties
    pub path: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: Severity::Info,
            stderr: true,
            syslog: false,
            decorate: true,
            millis: false,
            fileline: false,
            thread: false,
            dbg_stderr: true,
            dbg_syslog: false,
            dbg_file: false,
            path: None,
        }
    }
}

/// Notify sideband callback, fed every non-trace record flagged notify.
pub type NotifyFn = Box<dyn Fn(Severity, &str) + Send + Sync>;

struct LogMsg {
    body: String,
    severity: Severity,
    notify: bool,
    time: DateTime<Local>,
}

struct LogState {
    queue: VecDeque<LogMsg>,
    full: bool,
    running: bool,
    options: LogOptions,
    debug: Option<HashMap<String, bool>>,
    trace: Option<HashMap<String, bool>>,
}

struct LogShared {
    state: Mutex<LogState>,
    cond: Condvar,
    notify: Option<NotifyFn>,
}

/// The logging pipeline.
pub struct Logger {
    shared: Arc<LogShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Parses a `"+subsys,-subsys,all"` spec into a subsystem map. The `all`
/// token resets the map and installs itself as the default.
fn parse_subsys(spec: &str) -> Option<HashMap<String, bool>> {
    let mut map: Option<HashMap<String, bool>> = None;
    for tok in spec.split(',') {
        if tok.is_empty() {
            continue;
        }
        let (on, name) = if let Some(n) = tok.strip_prefix('+') {
            (true, n)
        } else if let Some(n) = tok.strip_prefix('-') {
            (false, n)
        } else {
            (true, tok)
        };
        if name.is_empty() {
            continue;
        }
        if name == "all" {
            map = None;
        }
        map.get_or_insert_with(HashMap::new)
            .insert(name.to_owned(), on);
    }
    map
}

fn subsys_enabled(map: &Option<HashMap<String, bool>>, subsys: &str) -> bool {
    match map {
        None => false,
        Some(m) => {
            let all = m.get("all").copied().unwrap_or(false);
            m.get(subsys).copied().unwrap_or(all)
        }
    }
}

fn passes(st: &LogState, severity: Severity, subsys: &str) -> bool {
    if severity < Severity::Debug {
        return true;
    }
    if severity > st.options.level {
        return false;
    }
    let mut ok = subsys_enabled(&st.trace, subsys);
    if !ok && severity == Severity::Debug {
        ok = subsys_enabled(&st.debug, subsys);
    }
    ok
}

fn truncate_to_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut n = max;
    while n > 0 && !s.is_char_boundary(n) {
        n -= 1;
    }
    s.truncate(n);
}

impl Logger {
    /// Creates the logger and starts its consumer thread.
    pub fn new(options: LogOptions) -> Arc<Logger> {
        Self::with_notify_opt(options, None)
    }

    /// Creates the logger with a notify sideband for the UI.
    pub fn with_notify(options: LogOptions, notify: NotifyFn) -> Arc<Logger> {
        Self::with_notify_opt(options, Some(notify))
    }

    fn with_notify_opt(options: LogOptions, notify: Option<NotifyFn>) -> Arc<Logger> {
        let logger = Self::inert(options, notify);
        let shared = Arc::clone(&logger.shared);
        let handle = std::thread::Builder::new()
            .name("log".into())
            .spawn(move || log_thread(shared))
            .unwrap_or_else(|e| panic!("failed to spawn log thread: {e}"));
        *logger.thread.lock() = Some(handle);
        logger
    }

    /// Logger without a consumer thread; queue contents stay put.
    #[cfg(test)]
    pub(crate) fn inert_for_test(options: LogOptions) -> Arc<Logger> {
        Self::inert(options, None)
    }

    fn inert(options: LogOptions, notify: Option<NotifyFn>) -> Arc<Logger> {
        Arc::new(Logger {
            shared: Arc::new(LogShared {
                state: Mutex::new(LogState {
                    queue: VecDeque::new(),
                    full: false,
                    running: true,
                    options,
                    debug: None,
                    trace: None,
                }),
                cond: Condvar::new(),
                notify,
            }),
            thread: Mutex::new(None),
        })
    }

    /// Installs this logger as the `log` facade backend.
    ///
    /// The facade accepts one backend per process; a second install is a
    /// no-op, which keeps tests with multiple loggers harmless.
    pub fn install(self: &Arc<Self>) {
        let bridge = Box::new(FacadeBridge {
            logger: Arc::clone(self),
        });
        if log::set_boxed_logger(bridge).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    }

    /// Reconfigures which subsystems emit debug records.
    pub fn set_debug(&self, spec: Option<&str>) {
        self.shared.state.lock().debug = spec.and_then(parse_subsys);
    }

    /// Reconfigures which subsystems emit trace records.
    pub fn set_trace(&self, spec: Option<&str>) {
        self.shared.state.lock().trace = spec.and_then(parse_subsys);
    }

    /// Logs one record.
    pub fn log(&self, severity: Severity, subsys: &str, msg: &str) {
        self.log_at(None, 0, false, severity, subsys, msg);
    }

    /// Logs one record with the notify sideband flagged.
    pub fn log_notify(&self, severity: Severity, subsys: &str, msg: &str) {
        self.log_at(None, 0, true, severity, subsys, msg);
    }

    /// Full-control entry point: optional source location, notify flag,
    /// severity, subsystem, preformatted text.
    pub fn log_at(
        &self,
        file: Option<&str>,
        line: u32,
        notify: bool,
        severity: Severity,
        subsys: &str,
        msg: &str,
    ) {
        let mut st = self.shared.state.lock();

        if st.full {
            return;
        }
        if !passes(&st, severity, subsys) {
            return;
        }

        let (text, severity) = if st.queue.len() >= QUEUE_MAXSIZE {
            st.full = true;
            ("log buffer full", Severity::Error)
        } else {
            (msg, severity)
        };

        let mut body = String::new();
        if st.options.thread {
            body.push_str(&format!("tid {:?}: ", std::thread::current().id()));
        }
        body.push_str(subsys);
        body.push_str(": ");
        if st.options.fileline && severity >= Severity::Debug {
            if let Some(file) = file {
                body.push_str(&format!("({}:{}) ", file, line));
            }
        }
        body.push_str(text);
        truncate_to_boundary(&mut body, MSG_MAXLEN);

        st.queue.push_back(LogMsg {
            body,
            severity,
            notify,
            time: Local::now(),
        });
        self.shared.cond.notify_one();
    }

    /// Logs a hexdump, 16 bytes per row with a printable column.
    pub fn hexdump(&self, severity: Severity, subsys: &str, data: &[u8]) {
        {
            let st = self.shared.state.lock();
            if severity > st.options.level {
                return;
            }
        }
        for row in hexdump_rows(data) {
            self.log_at(None, 0, false, severity, subsys, &row);
        }
    }

    /// Stops the consumer thread after draining the queue.
    pub fn shutdown(&self) {
        {
            let mut st = self.shared.state.lock();
            st.running = false;
        }
        self.shared.cond.notify_one();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        // anything logged from here on stays unreported
        self.shared.state.lock().full = true;
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> Vec<(Severity, String)> {
        self.shared
            .state
            .lock()
            .queue
            .iter()
            .map(|m| (m.severity, m.body.clone()))
            .collect()
    }
}

const HEXDUMP_WIDTH: usize = 16;

fn hexdump_rows(data: &[u8]) -> Vec<String> {
    let mut rows = Vec::new();
    for chunk in data.chunks(HEXDUMP_WIDTH) {
        let mut row = String::new();
        for i in 0..HEXDUMP_WIDTH {
            match chunk.get(i) {
                Some(b) => row.push_str(&format!("{:02X} ", b)),
                None => row.push_str("   "),
            }
        }
        for i in 0..HEXDUMP_WIDTH {
            row.push(match chunk.get(i) {
                Some(&b) if (b' '..=b'~').contains(&b) => b as char,
                Some(_) => '.',
                None => ' ',
            });
        }
        rows.push(row);
    }
    rows
}

fn log_thread(shared: Arc<LogShared>) {
    let mut fp: Option<std::fs::File> = None;
    let mut syslog_sock: Option<UnixDatagram> = None;
    let mut st = shared.state.lock();
    loop {
        let msg = match st.queue.pop_front() {
            Some(msg) => msg,
            None => {
                // keep the file closed while idle
                fp = None;
                if !st.running {
                    break;
                }
                shared.cond.wait(&mut st);
                continue;
            }
        };
        if st.queue.len() < QUEUE_MAXSIZE / 2 {
            st.full = false;
        }
        let options = st.options.clone();
        drop(st);
        process(&msg, &options, &mut fp, &mut syslog_sock, &shared.notify);
        st = shared.state.lock();
    }
}

fn process(
    msg: &LogMsg,
    options: &LogOptions,
    fp: &mut Option<std::fs::File>,
    syslog_sock: &mut Option<UnixDatagram>,
    notify: &Option<NotifyFn>,
) {
    if options.syslog && (options.dbg_syslog || msg.severity < Severity::Debug) {
        send_syslog(syslog_sock, msg.severity, &msg.body);
    }

    let mut t = msg.time.format("%Y-%m-%d %H:%M:%S").to_string();
    if options.millis {
        t.push_str(&format!(".{:03}", msg.time.timestamp_subsec_millis()));
    }

    if msg.notify && msg.severity < Severity::Trace {
        if let Some(cb) = notify {
            cb(msg.severity, &format!("{} {}", t, msg.body));
        }
    }

    if options.stderr && (options.dbg_stderr || msg.severity < Severity::Debug) {
        let (sgr, sgroff) = if options.decorate {
            (msg.severity.sgr(), "\x1b[0m")
        } else {
            ("", "")
        };
        eprintln!(
            "{}{} [{:7}] {}{}",
            sgr,
            t,
            msg.severity.label(),
            msg.body,
            sgroff
        );
    }

    if let Some(path) = &options.path {
        if options.dbg_file || msg.severity < Severity::Debug {
            if fp.is_none() {
                *fp = OpenOptions::new().create(true).append(true).open(path).ok();
            }
            if let Some(f) = fp {
                let _ = writeln!(f, "{} [{:7}]:{}", t, msg.severity.label(), msg.body);
            }
        }
    }
}

fn send_syslog(sock: &mut Option<UnixDatagram>, severity: Severity, body: &str) {
    const LOG_DAEMON: u8 = 3 << 3;
    if sock.is_none() {
        *sock = UnixDatagram::unbound()
            .and_then(|s| s.connect("/dev/log").map(|_| s))
            .ok();
    }
    if let Some(s) = sock {
        let pri = LOG_DAEMON | severity.syslog();
        let line = format!("<{}>pvrio[{}]: {}", pri, std::process::id(), body);
        if s.send(line.as_bytes()).is_err() {
            *sock = None;
        }
    }
}

struct FacadeBridge {
    logger: Arc<Logger>,
}

impl log::Log for FacadeBridge {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        self.logger.log_at(
            record.file(),
            record.line().unwrap_or(0),
            false,
            Severity::from_level(record.level()),
            record.target(),
            &record.args().to_string(),
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn severity_scale_orders_and_labels() {
        assert!(Severity::Error < Severity::Debug);
        assert!(Severity::Debug < Severity::Trace);
        assert_eq!(Severity::Warning.label(), "WARNING");
        assert_eq!(Severity::Trace.syslog(), 7);
    }

    #[test]
    fn subsys_spec_parses_signs_and_all() {
        let m = parse_subsys("+service,-dvr").unwrap();
        assert_eq!(m.get("service"), Some(&true));
        assert_eq!(m.get("dvr"), Some(&false));

        let m = parse_subsys("service,all,-dvr").unwrap();
        // "all" resets what came before it
        assert_eq!(m.get("service"), None);
        assert_eq!(m.get("all"), Some(&true));
        assert_eq!(m.get("dvr"), Some(&false));
    }

    #[test]
    fn debug_passes_only_enabled_subsystems() {
        let logger = Logger::inert_for_test(LogOptions {
            level: Severity::Debug,
            ..LogOptions::default()
        });
        logger.set_debug(Some("+service"));
        logger.log(Severity::Debug, "service", "on");
        logger.log(Severity::Debug, "dvr", "off");
        logger.log(Severity::Info, "dvr", "always");
        let bodies: Vec<String> = logger.queued().into_iter().map(|(_, b)| b).collect();
        assert_eq!(bodies, vec!["service: on", "dvr: always"]);
    }

    #[test]
    fn all_default_enables_unlisted_subsystems() {
        let logger = Logger::inert_for_test(LogOptions {
            level: Severity::Trace,
            ..LogOptions::default()
        });
        logger.set_trace(Some("all,-noisy"));
        logger.log(Severity::Trace, "quiet", "yes");
        logger.log(Severity::Trace, "noisy", "no");
        let bodies: Vec<String> = logger.queued().into_iter().map(|(_, b)| b).collect();
        assert_eq!(bodies, vec!["quiet: yes"]);
    }

    #[test]
    fn overflow_reports_buffer_full_exactly_once() {
        let logger = Logger::inert_for_test(LogOptions::default());
        for i in 0..(QUEUE_MAXSIZE + 10) {
            logger.log(Severity::Info, "test", &format!("m{i}"));
        }
        let queued = logger.queued();
        assert_eq!(queued.len(), QUEUE_MAXSIZE + 1);
        let (sev, body) = &queued[QUEUE_MAXSIZE];
        assert_eq!(*sev, Severity::Error);
        assert_eq!(body, "test: log buffer full");
    }

    #[test]
    fn file_sink_line_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pvr.log");
        let logger = Logger::new(LogOptions {
            stderr: false,
            path: Some(path.clone()),
            ..LogOptions::default()
        });
        logger.log(Severity::Info, "dvr", "recording completed");
        logger.shutdown();

        let content = std::fs::read_to_string(&path).unwrap();
        let line = content.lines().next().unwrap();
        // 2026-08-01 12:00:00 [   INFO]:dvr: recording completed
        assert!(line.contains(" [   INFO]:dvr: recording completed"));
        assert_eq!(line.as_bytes()[4], b'-');
        assert_eq!(line.as_bytes()[13], b':');
    }

    #[test]
    fn hexdump_rows_are_sixteen_wide_with_printable_column() {
        let rows = hexdump_rows(b"ABCDEFGHIJKLMNOPQ");
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("41 42 43 44"));
        assert!(rows[0].ends_with("ABCDEFGHIJKLMNOP"));
        assert!(rows[1].ends_with("Q               "));
    }

    #[test]
    fn fileline_decorates_debug_records_only() {
        let logger = Logger::inert_for_test(LogOptions {
            level: Severity::Debug,
            fileline: true,
            ..LogOptions::default()
        });
        logger.set_debug(Some("all"));
        logger.log_at(Some("svc.rs"), 42, false, Severity::Debug, "service", "x");
        logger.log_at(Some("svc.rs"), 42, false, Severity::Info, "service", "y");
        let bodies: Vec<String> = logger.queued().into_iter().map(|(_, b)| b).collect();
        assert_eq!(bodies, vec!["service: (svc.rs:42) x", "service: y"]);
    }
}
