//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data`.
//!
//! ## What lives here:
//! - **config**: Read-only after startup, so a plain `Arc` is enough
//! - **transcription**: The request pipeline, holding the one loaded model
//! - **stats**: Lock-free counters reported by `/health`
//!
//! Nothing here is per-request. Each request's upload and temp file are owned
//! by the request itself and never shared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::AppConfig;
use crate::transcription::{TranscribeError, TranscriptionService};

/// The application state shared across all HTTP request handlers.
///
/// Cloning is cheap: every field is reference counted or `Copy`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub transcription: TranscriptionService,
    pub stats: Arc<TranscriptionStats>,
    /// When the server started
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, transcription: TranscriptionService) -> Self {
        Self {
            config: Arc::new(config),
            transcription,
            stats: Arc::new(TranscriptionStats::default()),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Monotonic counters for `POST /transcribe`.
#[derive(Debug, Default)]
pub struct TranscriptionStats {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    in_flight: AtomicU64,
}

/// Point-in-time copy of [`TranscriptionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
    pub in_flight: u64,
}

impl TranscriptionStats {
    /// Count a request as started. The returned guard counts it as finished
    /// when dropped.
    pub fn begin(&self) -> InFlight<'_> {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlight { stats: self }
    }

    /// Record how a pipeline run ended.
    pub fn record<T>(&self, outcome: &Result<T, TranscribeError>) {
        let counter = match outcome {
            Ok(_) => &self.succeeded,
            Err(TranscribeError::UnsupportedFormat { .. }) => &self.rejected,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a request rejected before it reached the pipeline.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Decrements the in-flight counter on drop.
pub struct InFlight<'a> {
    stats: &'a TranscriptionStats,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
