use crate::queue::{ClosableQueue, Notifier, TryPop};
use std::sync::Arc;

/// Waits on several [`ClosableQueue`]s at once and services whichever has an
/// item.
///
/// When more than one source is ready, sources are serviced round-robin:
/// every scan starts at the source after the one that was serviced last, so a
/// busy source cannot starve the others.
pub struct Select<T> {
    sources: Vec<Arc<ClosableQueue<T>>>,
    notifier: Arc<Notifier>,
    next: usize,
}

impl<T> Select<T> {
    /// Builds a selector over `sources`, in priority-free round-robin order.
    pub fn new(sources: Vec<Arc<ClosableQueue<T>>>) -> Self {
        let notifier = Notifier::new();
        for source in &sources {
            source.watch(Arc::clone(&notifier));
        }
        Self {
            sources,
            notifier,
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Returns the next item and the index of the source it came from without
    /// blocking.
    ///
    /// `Ok(None)` means nothing is ready yet; `Err(())` means every source is
    /// closed and drained.
    #[allow(clippy::result_unit_err)]
    pub fn try_recv(&mut self) -> Result<Option<(usize, T)>, ()> {
        let count = self.sources.len();
        let mut open = false;
        for offset in 0..count {
            let index = (self.next + offset) % count;
            match self.sources[index].try_pop() {
                TryPop::Item(item) => {
                    self.next = (index + 1) % count;
                    return Ok(Some((index, item)));
                }
                TryPop::Empty => open = true,
                TryPop::Closed => {}
            }
        }
        if open { Ok(None) } else { Err(()) }
    }

    /// Blocks until some source yields an item.
    ///
    /// Returns `None` once every source is closed and drained.
    pub fn recv(&mut self) -> Option<(usize, T)> {
        loop {
            let seen = self.notifier.epoch();
            match self.try_recv() {
                Ok(Some(ready)) => return Some(ready),
                Ok(None) => self.notifier.wait_past(seen),
                Err(()) => return None,
            }
        }
    }
}
