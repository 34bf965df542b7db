use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct Bounds {
    base: u64,
    aborted: bool,
}

/// Caps how far workers may run ahead of the orderer's cursor.
///
/// A worker holding job `s` is admitted only once `s < base + width`, where
/// `base` is the orderer's next expected sequence. With `width` equal to the
/// worker count the reorder buffer never holds more than `width - 1` results,
/// however slow the oldest job is.
///
/// Jobs leave the queue in sequence order, so the job at `base` is always
/// held by a worker that is admitted immediately; the gate cannot deadlock.
#[derive(Debug)]
pub(crate) struct ReorderWindow {
    bounds: CachePadded<Mutex<Bounds>>,
    moved: Condvar,
    width: u64,
}

impl ReorderWindow {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            bounds: CachePadded::new(Mutex::new(Bounds {
                base: 0,
                aborted: false,
            })),
            moved: Condvar::new(),
            width: width.max(1) as u64,
        }
    }

    pub(crate) const fn width(&self) -> u64 {
        self.width
    }

    /// Blocks until `sequence` falls inside the window.
    ///
    /// Returns `false` if the window was aborted while waiting.
    pub(crate) fn admit(&self, sequence: u64) -> bool {
        let mut bounds = self.bounds.lock();
        loop {
            if bounds.aborted {
                return false;
            }
            if sequence < bounds.base.saturating_add(self.width) {
                return true;
            }
            self.moved.wait(&mut bounds);
        }
    }

    /// Slides the window so that it starts at `base`.
    pub(crate) fn advance(&self, base: u64) {
        let mut bounds = self.bounds.lock();
        if base > bounds.base {
            bounds.base = base;
            drop(bounds);
            self.moved.notify_all();
        }
    }

    /// Releases every waiter with a refusal.
    pub(crate) fn abort(&self) {
        self.bounds.lock().aborted = true;
        self.moved.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn admits_inside_window() {
        let window = ReorderWindow::new(2);
        assert!(window.admit(0));
        assert!(window.admit(1));
    }

    #[test]
    fn blocks_until_advanced() {
        let window = Arc::new(ReorderWindow::new(2));
        let waiter = {
            let window = Arc::clone(&window);
            thread::spawn(move || window.admit(5))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        window.advance(3);
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        window.advance(4);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn abort_releases_waiters() {
        let window = Arc::new(ReorderWindow::new(1));
        let waiter = {
            let window = Arc::clone(&window);
            thread::spawn(move || window.admit(10))
        };
        thread::sleep(Duration::from_millis(20));
        window.abort();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn zero_width_is_clamped() {
        assert_eq!(ReorderWindow::new(0).width(), 1);
    }
}
