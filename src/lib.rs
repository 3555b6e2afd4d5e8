#![doc(html_root_url = "https://docs.rs/pvrio/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

//! # pvrio - Personal Video Recorder Core
//!
//! `pvrio` is the core of a personal video recorder / streaming server for
//! digital television. It ingests live transport streams from tuner
//! inputs, filters and routes their elementary components, drives
//! conditional-access clients, multiplexes subscriber pipelines and
//! persists selected programs to disk containers.
//!
//! The crate deliberately stops at narrow interfaces towards its
//! collaborators: tuner hardware feeds demuxed elementary streams in,
//! concrete container writers implement the [`muxer::Muxer`] trait, and
//! the management UI consumes ids, state changes and the log notify
//! sideband.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pvrio::context::PvrContext;
//! use pvrio::config::DvrConfig;
//! use pvrio::dvr::{rec, DvrEntry};
//!
//! let ctx = PvrContext::new();
//!
//! // channels and services are registered by the input layer
//! let channel = ctx.create_channel("News 24");
//!
//! // schedule and start a recording
//! let entry = DvrEntry::builder(&channel, "Evening Bulletin", Arc::new(DvrConfig::default()))
//!     .window(1_722_500_000, 1_722_504_000)
//!     .build();
//! rec::subscribe(&ctx, &entry);
//! ```
//!
//! ## Module Overview
//!
//! - `streaming`: the message vocabulary between services and consumers,
//!   the blocking queue and the fan-out pad
//! - `service`: the service aggregate, its elementary streams, the
//!   declarative component filter, instance selection, persistence and
//!   the async config saver
//! - `subscription`: consumer handles with weight-based arbitration
//! - `descrambler`: conditional-access client registry and back-ends
//! - `dvr`: recording entries, the per-recording worker and the
//!   post-processing hook
//! - `muxer`: the container-writer interface and the pass-through muxer
//! - `plumbing`: streaming filters stacked between service and consumer
//! - `logger`: the bounded log pipeline behind the `log` facade
//! - `context`: the explicit application context replacing singletons

/// Logical channels and their service mappings
pub mod channel;

/// Recorder configuration profiles
pub mod config;

/// The application context: registries, rule sets, daemon threads
pub mod context;

/// Conditional-access client registry and back-ends
pub mod descrambler;

/// Recording entries and the recording pipeline
pub mod dvr;

/// Error types and utilities
pub mod error;

/// The log pipeline and its sinks
pub mod logger;

/// Container-writer interface and back-ends
pub mod muxer;

/// Streaming filters between services and consumers
pub mod plumbing;

/// Services, elementary streams, filtering, selection, persistence
pub mod service;

/// The streaming message vocabulary, queue and pad
pub mod streaming;

/// Subscriptions onto live services
pub mod subscription;

/// The timer wheel
pub mod timer;

pub use error::{PvrError, Result};
