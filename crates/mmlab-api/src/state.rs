//! Application state management

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mmlab_core::AppConfig;
use mmlab_rag::{KeywordPolicy, RetrievalService};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Retrieval front-end over the live store
    pub service: Arc<RetrievalService>,
    /// Decides which queries skip retrieval
    pub policy: KeywordPolicy,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
}

impl AppState {
    pub fn new(config: AppConfig, service: Arc<RetrievalService>) -> Self {
        let policy = KeywordPolicy::from_config(&config.retrieval);
        Self {
            config,
            service,
            policy,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Ready once the store has been loaded at least once
    pub fn is_ready(&self) -> bool {
        self.service.is_ready()
    }
}
