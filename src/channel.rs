//! Logical channels.
//!
//! A channel is a user-facing name mapped onto one or more backing
//! services; the instance selector walks the mapping to pick a tuner.
//! Mapping mutations belong to the global lock domain.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::service::Service;

/// One logical channel with its service mappings.
pub struct Channel {
    id: Uuid,
    name: String,
    number: i64,
    icon: Option<String>,
    services: Mutex<Vec<Arc<Service>>>,
}

impl Channel {
    pub(crate) fn new(name: &str, number: i64, icon: Option<String>) -> Arc<Channel> {
        Arc::new(Channel {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            number,
            icon,
            services: Mutex::new(Vec::new()),
        })
    }

    /// Unique identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel number, 0 when unknown.
    pub fn number(&self) -> i64 {
        self.number
    }

    /// Icon URL, when configured.
    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    /// Maps a service onto this channel (idempotent).
    pub fn map_service(self: &Arc<Self>, svc: &Arc<Service>) {
        let mut services = self.services.lock();
        if services.iter().any(|s| Arc::ptr_eq(s, svc)) {
            return;
        }
        services.push(Arc::clone(svc));
        svc.channels.lock().push(Arc::downgrade(self));
    }

    /// Removes a mapping from both sides.
    pub fn unmap_service(self: &Arc<Self>, svc: &Arc<Service>) {
        self.unmap_service_only(svc);
        svc.channels
            .lock()
            .retain(|c| c.upgrade().map(|c| !Arc::ptr_eq(&c, self)).unwrap_or(false));
    }

    /// Removes the channel-side mapping only; used when the service side
    /// is already being torn down.
    pub(crate) fn unmap_service_only(&self, svc: &Arc<Service>) {
        self.services.lock().retain(|s| !Arc::ptr_eq(s, svc));
    }

    /// Snapshot of the mapped services.
    pub fn services(&self) -> Vec<Arc<Service>> {
        self.services.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PvrContext;
    use crate::service::instance::ServiceInstanceList;
    use crate::service::ServiceSource;
    use crate::streaming::StreamingCode;

    struct NullSource;
    impl ServiceSource for NullSource {
        fn start_feed(&self, _svc: &Arc<Service>, _instance: u32) -> Result<(), StreamingCode> {
            Ok(())
        }
        fn stop_feed(&self, _svc: &Arc<Service>) {}
        fn enlist(&self, svc: &Arc<Service>, list: &mut ServiceInstanceList, _flags: u32) {
            list.add(svc, 0, 0, 0);
        }
    }

    #[test]
    fn mapping_is_idempotent_and_two_sided() {
        let ctx = PvrContext::new();
        let ch = ctx.create_channel("One");
        let svc = Service::create(&ctx, Box::new(NullSource), None);
        ch.map_service(&svc);
        ch.map_service(&svc);
        assert_eq!(ch.services().len(), 1);
        ch.unmap_service(&svc);
        assert!(ch.services().is_empty());
        ctx.shutdown();
    }
}
