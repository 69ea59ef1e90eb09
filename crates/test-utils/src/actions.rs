//! Instrumented actions and a recording progress reporter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use reconcile_flow::dag::TaskFn;
use reconcile_flow::engine::{ProgressReporter, RetryResult, Stats};

/// Shared invocation counter.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Increment and return the number of calls so far, this one included.
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Succeeds immediately.
pub fn succeed(counter: &CallCounter) -> TaskFn {
    let counter = counter.clone();
    TaskFn::new(move |_ctx| {
        counter.hit();
        async { RetryResult::Ok }
    })
}

/// Fails with a severe error.
pub fn fail_severe(counter: &CallCounter, message: &str) -> TaskFn {
    let counter = counter.clone();
    let message = message.to_string();
    TaskFn::new(move |_ctx| {
        counter.hit();
        let message = message.clone();
        async move { RetryResult::Severe(anyhow!(message)) }
    })
}

/// Never done: every call is a minor error.
pub fn always_minor(counter: &CallCounter, message: &str) -> TaskFn {
    let counter = counter.clone();
    let message = message.to_string();
    TaskFn::new(move |_ctx| {
        let attempt = counter.hit();
        let message = message.clone();
        async move { RetryResult::Minor(anyhow!("{message} (attempt {attempt})")) }
    })
}

/// Minor errors for the first `failures` calls, then done.
pub fn minor_then_ok(counter: &CallCounter, failures: usize) -> TaskFn {
    let counter = counter.clone();
    TaskFn::new(move |_ctx| {
        let attempt = counter.hit();
        async move {
            if attempt <= failures {
                RetryResult::Minor(anyhow!("not ready yet (attempt {attempt})"))
            } else {
                RetryResult::Ok
            }
        }
    })
}

/// Blocks until its context is cancelled, then reports a minor error.
pub fn wait_for_cancel(counter: &CallCounter) -> TaskFn {
    let counter = counter.clone();
    TaskFn::new(move |ctx| {
        counter.hit();
        async move {
            ctx.cancelled().await;
            RetryResult::Minor(anyhow!("context cancelled"))
        }
    })
}

/// Appends `name` to `log` when invoked, then succeeds.
pub fn record_call(log: &Arc<Mutex<Vec<String>>>, name: &str) -> TaskFn {
    let log = Arc::clone(log);
    let name = name.to_string();
    TaskFn::new(move |_ctx| {
        log.lock().expect("call log poisoned").push(name.clone());
        async { RetryResult::Ok }
    })
}

/// Progress reporter that keeps every snapshot it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    snapshots: Arc<Mutex<Vec<Stats>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Stats> {
        self.snapshots.lock().expect("reporter poisoned").clone()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.snapshots()
            .iter()
            .map(Stats::progress_percent)
            .collect()
    }

    pub fn last(&self) -> Option<Stats> {
        self.snapshots().last().cloned()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, stats: &Stats) {
        self.snapshots
            .lock()
            .expect("reporter poisoned")
            .push(stats.clone());
    }
}
