//! Code-word-client descrambler (newcamd-style remote card server).
//!
//! Tracks which CAIDs it can serve per mux and flips its connection state
//! accordingly; the network protocol driver behind it owns its own I/O
//! thread and is out of scope here.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::service::Service;

use super::{CaClient, CaClientStatus, Mux};

/// Remote card-server client.
pub struct CwcClient {
    name: String,
    enabled: bool,
    host: String,
    port: u16,
    username: String,
    /// CAIDs the configured card can serve; empty accepts everything
    caids: Vec<u16>,
    state: Mutex<CwcState>,
}

#[derive(Default)]
struct CwcState {
    status: CaClientStatus,
    /// (mux name, caid, pid) sessions currently requested
    sessions: HashSet<(String, u16, u16)>,
}

impl CwcClient {
    /// Creates a client for the given card server.
    pub fn new(name: &str, host: &str, port: u16, username: &str, caids: Vec<u16>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            enabled: true,
            host: host.to_owned(),
            port,
            username: username.to_owned(),
            caids,
            state: Mutex::new(CwcState {
                status: CaClientStatus::Ready,
                sessions: HashSet::new(),
            }),
        })
    }

    /// Card server address.
    pub fn server(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    fn serves(&self, caid: u16) -> bool {
        self.caids.is_empty() || self.caids.contains(&caid)
    }
}

impl CaClient for CwcClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn status(&self) -> CaClientStatus {
        self.state.lock().status
    }

    fn start(&self, svc: &Arc<Service>) {
        let caid = svc.state().encryption_caid();
        if caid == 0 || !self.serves(caid) {
            return;
        }
        log::debug!(
            target: "cwc",
            "{}: serving {:04x} for \"{}\" (user {})",
            self.name,
            caid,
            svc.nicename(),
            self.username
        );
    }

    fn conf_changed(&self) {
        let mut st = self.state.lock();
        st.sessions.clear();
        st.status = CaClientStatus::Ready;
    }

    fn caid_update(&self, mux: &Arc<Mux>, caid: u16, pid: u16, valid: bool) {
        if !self.serves(caid) {
            return;
        }
        let mut st = self.state.lock();
        let key = (mux.name.clone(), caid, pid);
        if valid {
            if st.sessions.insert(key) {
                log::debug!(
                    target: "cwc",
                    "{}: open session {:04x}/{:04x} on {}",
                    self.name, caid, pid, mux.name
                );
            }
            st.status = CaClientStatus::Connected;
        } else {
            st.sessions.remove(&key);
            if st.sessions.is_empty() {
                st.status = CaClientStatus::Ready;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_tracking_drives_status() {
        let cwc = CwcClient::new("card1", "cs.example", 15000, "user", vec![0x0500]);
        let mux = Mux::new("dvb-s/11837V");

        assert_eq!(cwc.status(), CaClientStatus::Ready);
        cwc.caid_update(&mux, 0x0500, 0x102, true);
        assert_eq!(cwc.status(), CaClientStatus::Connected);

        // foreign caid is ignored
        cwc.caid_update(&mux, 0x0602, 0x103, true);
        cwc.caid_update(&mux, 0x0500, 0x102, false);
        assert_eq!(cwc.status(), CaClientStatus::Ready);
    }
}
