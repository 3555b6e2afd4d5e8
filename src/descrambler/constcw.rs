//! Constant-control-word descrambler.
//!
//! Serves a fixed key for one (CAID, provider) pair, either as DES or AES
//! control words. The cipher itself runs in the descrambler core; this
//! client only decides applicability.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::service::Service;

use super::{CaClient, CaClientStatus, Mux};

/// Control-word cipher flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgo {
    /// CSA with DES-sized control words
    Des,
    /// CSA with AES-sized control words
    Aes,
}

/// Fixed-key descrambler for one CAID/provider.
pub struct ConstCwClient {
    name: String,
    enabled: bool,
    algo: KeyAlgo,
    caid: u16,
    provider: u32,
    key: Vec<u8>,
    status: Mutex<CaClientStatus>,
}

impl ConstCwClient {
    /// Creates a constant-key client.
    pub fn new(name: &str, algo: KeyAlgo, caid: u16, provider: u32, key: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            enabled: true,
            algo,
            caid,
            provider,
            key,
            status: Mutex::new(CaClientStatus::Ready),
        })
    }

    /// Cipher flavour of the configured key.
    pub fn algo(&self) -> KeyAlgo {
        self.algo
    }

    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        self.key.len()
    }
}

impl CaClient for ConstCwClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn status(&self) -> CaClientStatus {
        *self.status.lock()
    }

    fn start(&self, svc: &Arc<Service>) {
        let matches = svc
            .state()
            .components
            .iter()
            .flat_map(|es| es.caids.iter())
            .any(|c| c.caid == self.caid && (self.provider == 0 || c.providerid == self.provider));
        if matches {
            log::debug!(
                target: "constcw",
                "{}: providing constant {} key for \"{}\"",
                self.name,
                match self.algo {
                    KeyAlgo::Des => "DES",
                    KeyAlgo::Aes => "AES",
                },
                svc.nicename()
            );
        }
    }

    fn caid_update(&self, _mux: &Arc<Mux>, caid: u16, _pid: u16, valid: bool) {
        if caid != self.caid {
            return;
        }
        let mut status = self.status.lock();
        *status = if valid {
            CaClientStatus::Connected
        } else {
            CaClientStatus::Ready
        };
    }
}
