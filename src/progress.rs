//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn ProcessProgressCallback>`] via
//! [`crate::config::ForgeConfigBuilder::progress_callback`] to observe a flow
//! as it moves through submission, polling, dispatch and rendering.
//!
//! The callback is the integration point for whatever the host uses to show
//! progress (terminal spinner, WebSocket, job table); the library knows
//! nothing about it. Callbacks are invoked inline from the flow's task, so
//! keep them cheap.
//!
//! # Example
//!
//! ```rust
//! use cv_forge::{ForgeConfig, ProcessProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct CountingCallback {
//!     polls: AtomicU32,
//! }
//!
//! impl ProcessProgressCallback for CountingCallback {
//!     fn on_poll(&self, attempt: u32, max_attempts: u32, status: &str) {
//!         self.polls.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("poll {attempt}/{max_attempts}: {status}");
//!     }
//! }
//!
//! let config = ForgeConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { polls: AtomicU32::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::poll::RunState;
use std::sync::Arc;

/// Called by the pipeline at each stage transition.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ProcessProgressCallback: Send + Sync {
    /// The workflow run was created.
    fn on_submitted(&self, run_id: &str) {
        let _ = run_id;
    }

    /// A status query returned.
    ///
    /// # Arguments
    /// * `attempt`: 1-indexed attempt number
    /// * `max_attempts`: polling budget
    /// * `status`: raw status string reported by the remote service
    fn on_poll(&self, attempt: u32, max_attempts: u32, status: &str) {
        let _ = (attempt, max_attempts, status);
    }

    /// Polling reached a terminal state.
    fn on_run_finished(&self, state: &RunState) {
        let _ = state;
    }

    /// A structured record is about to be merged into the template.
    fn on_rendering(&self, file_name: &str) {
        let _ = file_name;
    }

    /// The flow produced its deliverable (`size` is 0 for download links).
    fn on_delivered(&self, file_name: &str, size: usize) {
        let _ = (file_name, size);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ProcessProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ForgeConfig`].
pub type ProgressCallback = Arc<dyn ProcessProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        polls: AtomicU32,
        finished: AtomicUsize,
        delivered: Mutex<Option<(String, usize)>>,
    }

    impl ProcessProgressCallback for TrackingCallback {
        fn on_poll(&self, _attempt: u32, _max_attempts: u32, _status: &str) {
            self.polls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_finished(&self, _state: &RunState) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }

        fn on_delivered(&self, file_name: &str, size: usize) {
            *self.delivered.lock().unwrap() = Some((file_name.to_string(), size));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_submitted("run-1");
        cb.on_poll(1, 60, "running");
        cb.on_run_finished(&RunState::TimedOut { attempts: 60 });
        cb.on_rendering("AW CV x.docx");
        cb.on_delivered("AW CV x.docx", 10);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_poll(1, 3, "queued");
        tracker.on_poll(2, 3, "running");
        tracker.on_run_finished(&RunState::Failed {
            attempts: 2,
            detail: "boom".into(),
        });
        tracker.on_delivered("report.docx", 512);

        assert_eq!(tracker.polls.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.finished.load(Ordering::SeqCst), 1);
        assert_eq!(
            tracker.delivered.lock().unwrap().clone(),
            Some(("report.docx".to_string(), 512))
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_submitted("run-2");
        cb.on_poll(1, 1, "completed");
    }
}
