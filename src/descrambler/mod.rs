//! # Conditional-Access Clients
//!
//! Descrambler back-ends register here and get told which CAIDs appear on
//! which muxes, plus a start hook for every service entering the running
//! state. The cryptographic side of each client lives behind its own
//! connection and is not part of this crate.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::service::Service;

pub mod capmt;
pub mod constcw;
pub mod cwc;

pub use capmt::CapmtClient;
pub use constcw::{ConstCwClient, KeyAlgo};
pub use cwc::CwcClient;

/// One transport multiplex, as far as descramblers care: an identity to
/// key CAID/PID state on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mux {
    /// Display name, `network/frequency` style
    pub name: String,
}

impl Mux {
    /// Creates a mux handle.
    pub fn new(name: &str) -> Arc<Mux> {
        Arc::new(Mux {
            name: name.to_owned(),
        })
    }
}

/// Connection state of a CA client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaClientStatus {
    /// Not configured or disabled
    #[default]
    None,
    /// Configured, waiting for something to descramble
    Ready,
    /// Actively connected to its backend
    Connected,
    /// Lost its backend
    Disconnected,
}

impl CaClientStatus {
    /// Status label for the UI.
    pub fn label(self) -> &'static str {
        match self {
            CaClientStatus::None => "None",
            CaClientStatus::Ready => "Ready",
            CaClientStatus::Connected => "Connected",
            CaClientStatus::Disconnected => "Disconnected",
        }
    }
}

/// A descrambler back-end.
pub trait CaClient: Send + Sync {
    /// Configured name of the client.
    fn name(&self) -> &str;

    /// Disabled clients receive no dispatches.
    fn is_enabled(&self) -> bool;

    /// Current connection state.
    fn status(&self) -> CaClientStatus;

    /// A service entered the running state.
    fn start(&self, svc: &Arc<Service>);

    /// The client's configuration changed.
    fn conf_changed(&self) {}

    /// A CAID appeared (`valid`) or disappeared on a mux.
    fn caid_update(&self, mux: &Arc<Mux>, caid: u16, pid: u16, valid: bool);
}

/// Registry owning the descrambler clients.
#[derive(Default)]
pub struct CaClientRegistry {
    clients: RwLock<Vec<Arc<dyn CaClient>>>,
}

impl CaClientRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client.
    pub fn register(&self, client: Arc<dyn CaClient>) {
        self.clients.write().push(client);
    }

    /// Removes a client by name.
    pub fn unregister(&self, name: &str) {
        self.clients.write().retain(|c| c.name() != name);
    }

    /// Snapshot of the registered clients.
    pub fn clients(&self) -> Vec<Arc<dyn CaClient>> {
        self.clients.read().clone()
    }

    /// Dispatches a service start to every enabled client.
    pub fn service_start(&self, svc: &Arc<Service>) {
        for c in self.clients.read().iter() {
            if c.is_enabled() {
                c.start(svc);
            }
        }
    }

    /// Broadcasts a CAID appearance or disappearance on a mux.
    pub fn caid_update(&self, mux: &Arc<Mux>, caid: u16, pid: u16, valid: bool) {
        for c in self.clients.read().iter() {
            if c.is_enabled() {
                c.caid_update(mux, caid, pid, valid);
            }
        }
    }
}
