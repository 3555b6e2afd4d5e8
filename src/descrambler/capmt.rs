//! CAPMT descrambler client (linuxdvb CA socket protocol).
//!
//! Forwards program maps of running scrambled services to a local CA
//! daemon over a unix socket; here only the bookkeeping side lives, the
//! socket driver is an external collaborator.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::service::Service;

use super::{CaClient, CaClientStatus, Mux};

/// CA daemon client speaking the CAPMT socket protocol.
pub struct CapmtClient {
    name: String,
    enabled: bool,
    socket_path: String,
    state: Mutex<CapmtState>,
}

#[derive(Default)]
struct CapmtState {
    status: CaClientStatus,
    /// (mux name, caid) pairs announced to the daemon
    announced: HashSet<(String, u16)>,
}

impl CapmtClient {
    /// Creates a client bound to the given CA daemon socket.
    pub fn new(name: &str, socket_path: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            enabled: true,
            socket_path: socket_path.to_owned(),
            state: Mutex::new(CapmtState {
                status: CaClientStatus::Ready,
                announced: HashSet::new(),
            }),
        })
    }

    /// Configured socket path.
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }
}

impl CaClient for CapmtClient {
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
        if !svc.state().is_encrypted() {
            return;
        }
        log::debug!(
            target: "capmt",
            "{}: sending PMT of \"{}\" to {}",
            self.name,
            svc.nicename(),
            self.socket_path
        );
    }

    fn conf_changed(&self) {
        let mut st = self.state.lock();
        st.announced.clear();
        st.status = CaClientStatus::Ready;
    }

    fn caid_update(&self, mux: &Arc<Mux>, caid: u16, _pid: u16, valid: bool) {
        let mut st = self.state.lock();
        let key = (mux.name.clone(), caid);
        if valid {
            st.announced.insert(key);
            st.status = CaClientStatus::Connected;
        } else {
            st.announced.remove(&key);
            if st.announced.is_empty() {
                st.status = CaClientStatus::Ready;
            }
        }
    }
}
