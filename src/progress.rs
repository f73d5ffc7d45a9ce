//! Progress reporting shared by collection and dispatch.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Receives `(done, total)` after every unit of work.
pub trait ProgressSink: Send + Sync {
    fn report(&self, done: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn report(&self, done: usize, total: usize) {
        self(done, total)
    }
}

/// Discards all reports.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _done: usize, _total: usize) {}
}

/// Forwards every report to two sinks.
pub struct Both<'a>(pub &'a dyn ProgressSink, pub &'a dyn ProgressSink);

impl ProgressSink for Both<'_> {
    fn report(&self, done: usize, total: usize) {
        self.0.report(done, total);
        self.1.report(done, total);
    }
}

/// Observable counter; written by the running action, polled by anyone else.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    done: AtomicUsize,
    total: AtomicUsize,
    running: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub done: usize,
    pub total: usize,
    pub fraction: f32,
    pub running: bool,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, total: usize) {
        self.done.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let done = self.done.load(Ordering::SeqCst);
        let total = self.total.load(Ordering::SeqCst);
        let fraction = if total == 0 {
            0.0
        } else {
            (done as f32 / total as f32).min(1.0)
        };
        ProgressSnapshot {
            done,
            total,
            fraction,
            running: self.running.load(Ordering::SeqCst),
        }
    }
}

impl ProgressSink for ProgressCounter {
    fn report(&self, done: usize, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.done.store(done, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn counter_tracks_fraction() {
        let c = ProgressCounter::new();
        c.start(4);
        c.report(1, 4);
        let s = c.snapshot();
        assert_eq!((s.done, s.total), (1, 4));
        assert!((s.fraction - 0.25).abs() < f32::EPSILON);
        assert!(s.running);
        c.finish();
        assert!(!c.snapshot().running);
    }

    #[test]
    fn empty_total_is_zero_fraction() {
        let c = ProgressCounter::new();
        assert_eq!(c.snapshot().fraction, 0.0);
    }

    #[test]
    fn both_forwards_to_each_sink() {
        let c = ProgressCounter::new();
        let seen = Mutex::new(Vec::new());
        let log = |d: usize, t: usize| seen.lock().unwrap().push((d, t));
        Both(&c, &log).report(2, 5);
        assert_eq!(c.snapshot().done, 2);
        assert_eq!(*seen.lock().unwrap(), vec![(2, 5)]);
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Mutex::new(Vec::new());
        let sink = |d: usize, t: usize| seen.lock().unwrap().push((d, t));
        sink.report(1, 2);
        sink.report(2, 2);
        assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }
}
