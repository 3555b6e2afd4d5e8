#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pvrio::config::DvrConfig;
    use pvrio::context::PvrContext;
    use pvrio::dvr::{rec, DvrEntry, DvrRecState};
    use pvrio::service::instance::ServiceInstanceList;
    use pvrio::service::stream::StreamType;
    use pvrio::service::{Service, ServiceSource, ServiceStatus};
    use pvrio::streaming::{StreamingCode, StreamingMessage};

    const TEST_JOIN_TIMEOUT_MS: u64 = 2000;

    /// Minimal tuner input: succeeds on start, enlists itself idle.
    struct TestTuner;

    impl ServiceSource for TestTuner {
        fn start_feed(
            &self,
            _svc: &Arc<Service>,
            _instance: u32,
        ) -> Result<(), StreamingCode> {
            Ok(())
        }
        fn stop_feed(&self, _svc: &Arc<Service>) {}
        fn enlist(&self, svc: &Arc<Service>, list: &mut ServiceInstanceList, _flags: u32) {
            list.add(svc, 0, 1, 0);
        }
        fn source_info(&self, _svc: &Service) -> pvrio::streaming::SourceInfo {
            pvrio::streaming::SourceInfo {
                adapter: Some("adapter0".into()),
                network: Some("DVB-T".into()),
                mux: Some("482MHz".into()),
                service: Some("News 24".into()),
                ..Default::default()
            }
        }
    }

    fn wait_for<F: Fn() -> bool>(pred: F) {
        let deadline = std::time::Instant::now() + Duration::from_millis(TEST_JOIN_TIMEOUT_MS);
        while std::time::Instant::now() < deadline {
            if pred() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached within {}ms", TEST_JOIN_TIMEOUT_MS);
    }

    /// Drives a full recording session: subscribe, feed raw TS through the
    /// service pad, stop, and verify the file on disk.
    #[test]
    fn records_a_pass_through_session_to_disk() {
        let storage = tempfile::tempdir().unwrap();
        let ctx = PvrContext::new();

        let svc = Service::create(&ctx, Box::new(TestTuner), None);
        svc.state().stream_create(0x100, StreamType::H264);
        let channel = ctx.create_channel("News 24");
        channel.map_service(&svc);

        let cfg = DvrConfig {
            storage: storage.path().to_path_buf(),
            tag_files: false,
            ..DvrConfig::default()
        };
        let entry = DvrEntry::builder(&channel, "Evening Bulletin", Arc::new(cfg))
            .window(1_722_500_000, 1_722_504_000)
            .build();

        rec::subscribe(&ctx, &entry);
        assert_eq!(svc.state().status, ServiceStatus::Running);

        // the input layer delivers data through the pad
        {
            let st = svc.state();
            st.pad
                .deliver(&StreamingMessage::Mpegts(vec![0x47u8; 188].into()));
            st.pad
                .deliver(&StreamingMessage::Mpegts(vec![0x47u8; 376].into()));
        }

        let expected = storage.path().join("Evening-Bulletin.ts");
        wait_for(|| expected.exists());

        let sub = entry
            .subscription()
            .expect("subscription present while recording");
        wait_for(|| sub.bytes_out() == 564);
        assert_eq!(entry.state.lock().rec_state, DvrRecState::Running);

        // closing the muxer flushes everything to disk
        rec::unsubscribe(&ctx, &entry, StreamingCode::Ok);
        assert_eq!(svc.state().status, ServiceStatus::Idle);
        assert_eq!(entry.filename(), Some(expected.clone()));
        assert_eq!(std::fs::read(&expected).unwrap().len(), 564);

        ctx.shutdown();
    }

    /// A source swap mid-recording: the pass muxer accepts the
    /// reconfiguration, the recording continues into the same file.
    #[test]
    fn source_swap_keeps_pass_recording_running() {
        let storage = tempfile::tempdir().unwrap();
        let ctx = PvrContext::new();

        let svc = Service::create(&ctx, Box::new(TestTuner), None);
        svc.state().stream_create(0x100, StreamType::H264);
        let channel = ctx.create_channel("News 24");
        channel.map_service(&svc);

        let cfg = DvrConfig {
            storage: storage.path().to_path_buf(),
            tag_files: false,
            ..DvrConfig::default()
        };
        let entry = DvrEntry::new(&channel, "swap", Arc::new(cfg));
        rec::subscribe(&ctx, &entry);

        {
            let st = svc.state();
            st.pad
                .deliver(&StreamingMessage::Mpegts(vec![0x47u8; 188].into()));
        }
        let expected = storage.path().join("swap.ts");
        wait_for(|| expected.exists());

        // composition change: one STOP/START pair on the pad
        svc.state()
            .stream_create(0x101, StreamType::Aac);
        svc.restart(&ctx, true);

        {
            let st = svc.state();
            st.pad
                .deliver(&StreamingMessage::Mpegts(vec![0x47u8; 188].into()));
        }
        let sub = entry.subscription().unwrap();
        wait_for(|| sub.bytes_out() == 376);

        rec::unsubscribe(&ctx, &entry, StreamingCode::Ok);
        // still a single file, no numeric suffix
        assert_eq!(std::fs::read(&expected).unwrap().len(), 376);
        assert!(!storage.path().join("swap-1.ts").exists());
        ctx.shutdown();
    }

    /// Subscribing to a channel with no startable service parks the entry
    /// in the pending state.
    #[test]
    fn unstartable_channel_leaves_entry_pending() {
        struct DeadTuner;
        impl ServiceSource for DeadTuner {
            fn start_feed(
                &self,
                _svc: &Arc<Service>,
                _instance: u32,
            ) -> Result<(), StreamingCode> {
                Err(StreamingCode::TuningFailed)
            }
            fn stop_feed(&self, _svc: &Arc<Service>) {}
            fn enlist(&self, svc: &Arc<Service>, list: &mut ServiceInstanceList, _flags: u32) {
                list.add(svc, 0, 1, 0);
            }
        }

        let storage = tempfile::tempdir().unwrap();
        let ctx = PvrContext::new();
        let svc = Service::create(&ctx, Box::new(DeadTuner), None);
        let channel = ctx.create_channel("Broken");
        channel.map_service(&svc);

        let cfg = DvrConfig {
            storage: storage.path().to_path_buf(),
            ..DvrConfig::default()
        };
        let entry = DvrEntry::new(&channel, "nope", Arc::new(cfg));
        rec::subscribe(&ctx, &entry);

        wait_for(|| entry.state.lock().last_error == StreamingCode::TuningFailed);
        assert_eq!(entry.state.lock().rec_state, DvrRecState::Pending);

        rec::unsubscribe(&ctx, &entry, StreamingCode::SourceDeleted);
        assert_eq!(entry.state.lock().last_error, StreamingCode::SourceDeleted);
        ctx.shutdown();
    }
}
