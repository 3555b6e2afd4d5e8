//! Tuner-instance selection.
//!
//! Each candidate is a (service, tuner instance) pair with a priority and
//! the weight of whatever currently occupies the tuner (0 when idle). The
//! list is kept sorted by `(prio, weight)` ascending, so forward iteration
//! yields the cheapest, most preferred choice first. Selection runs under
//! the global lock.

use std::sync::Arc;

use crate::channel::Channel;
use crate::context::PvrContext;
use crate::streaming::StreamingCode;

use super::{Service, ServiceStatus};

/// One candidate (service, tuner instance) pair.
pub struct ServiceInstance {
    /// The service
    pub service: Arc<Service>,
    /// Tuner instance number within the service's input
    pub instance: u32,
    /// Priority bucket, smaller is preferred
    pub prio: i32,
    /// Weight of the current occupant, 0 when idle, negative to force
    pub weight: i32,
    /// Stale mark used during re-enlist passes
    pub mark: bool,
    /// Error observed on this candidate during selection
    pub error: StreamingCode,
}

/// Candidate list, sorted by `(prio, weight)` ascending.
#[derive(Default)]
pub struct ServiceInstanceList {
    entries: Vec<ServiceInstance>,
}

impl ServiceInstanceList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a candidate or refreshes an existing one, keeping the sort
    /// order. A refresh clears the stale mark; the position only moves
    /// when prio or weight changed.
    pub fn add(&mut self, service: &Arc<Service>, instance: u32, prio: i32, weight: i32) {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|si| Arc::ptr_eq(&si.service, service) && si.instance == instance)
        {
            self.entries[pos].mark = false;
            if self.entries[pos].prio == prio && self.entries[pos].weight == weight {
                return;
            }
            let mut si = self.entries.remove(pos);
            si.prio = prio;
            si.weight = weight;
            self.insert_sorted(si);
            return;
        }
        self.insert_sorted(ServiceInstance {
            service: Arc::clone(service),
            instance,
            prio,
            weight,
            mark: false,
            error: StreamingCode::Ok,
        });
    }

    fn insert_sorted(&mut self, si: ServiceInstance) {
        let pos = self
            .entries
            .iter()
            .position(|e| (e.prio, e.weight) > (si.prio, si.weight))
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, si);
    }

    /// Drops every candidate.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The candidates in sorted order.
    pub fn entries(&self) -> &[ServiceInstance] {
        &self.entries
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no candidate is listed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Picks and starts the best tuner instance for a channel or a direct
/// service.
///
/// On success the chosen entry's position in `list` is returned; the
/// service behind it has been started (or was already running). On failure
/// `None` is returned and `error` holds the most severe code observed.
pub fn find_instance(
    ctx: &PvrContext,
    service: Option<&Arc<Service>>,
    channel: Option<&Arc<Channel>>,
    list: &mut ServiceInstanceList,
    error: &mut StreamingCode,
    weight: i32,
    flags: u32,
    postpone: u32,
) -> Option<usize> {
    // Mark all for deletion
    for si in &mut list.entries {
        si.mark = true;
    }

    // Re-enlist
    if let Some(ch) = channel {
        for svc in ch.services() {
            if svc.source().is_enabled(&svc, flags) {
                svc.source().enlist(&svc, list, flags);
            }
        }
    } else if let Some(svc) = service {
        svc.source().enlist(svc, list, flags);
    }

    // Delete stale entries
    list.entries.retain(|si| !si.mark);

    for si in &list.entries {
        log::debug!(
            target: "service",
            "{} weight {} prio {} error {}",
            si.service.nicename(),
            si.weight,
            si.prio,
            si.error
        );
    }

    // Already running?
    if let Some(pos) = list.entries.iter().position(|si| {
        si.service.state().status == ServiceStatus::Running && si.error == StreamingCode::Ok
    }) {
        log::trace!(target: "service", "returning already running instance");
        return Some(pos);
    }

    // Forced
    let mut chosen = list
        .entries
        .iter()
        .position(|si| si.weight < 0 && si.error == StreamingCode::Ok);

    // Idle: the sort puts the preferred bucket first
    if chosen.is_none() {
        chosen = list
            .entries
            .iter()
            .position(|si| si.weight == 0 && si.error == StreamingCode::Ok);
    }

    // Bump the one with the lowest weight below the caller's
    if chosen.is_none() {
        let mut weight2 = weight;
        for (pos, si) in list.entries.iter().enumerate() {
            if weight2 > si.weight && si.error == StreamingCode::Ok {
                weight2 = si.weight;
                chosen = Some(pos);
            }
        }
    }

    let pos = match chosen {
        Some(pos) => pos,
        None => {
            if *error < StreamingCode::NoFreeAdapter {
                *error = StreamingCode::NoFreeAdapter;
            }
            return None;
        }
    };

    let (svc, instance) = {
        let si = &list.entries[pos];
        (Arc::clone(&si.service), si.instance)
    };
    log::trace!(target: "service", "will start instance {}", instance);
    if let Err(code) = svc.start(ctx, instance, postpone) {
        log::trace!(target: "service", "tuning failed: {}", code);
        list.entries[pos].error = StreamingCode::TuningFailed;
        if *error < StreamingCode::TuningFailed {
            *error = StreamingCode::TuningFailed;
        }
        return None;
    }
    Some(pos)
}
