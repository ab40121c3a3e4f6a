//! Duplicate update suppression.
//!
//! Sources deliver at least once: a restart before the offset is acknowledged
//! hands the same update out again. Handlers that declare
//! `suppress_duplicates` are protected by an in-memory window of recently seen
//! sequence markers. The window lives as long as the process, so redelivery
//! across restarts is still possible; acknowledging offsets at the source keeps
//! that window small.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use memebot_core::SequenceMarker;

/// Default number of markers remembered.
pub const DEFAULT_DEDUP_WINDOW: usize = 4096;

#[derive(Debug, Default)]
struct Window {
    order: VecDeque<SequenceMarker>,
    seen: HashSet<SequenceMarker>,
}

/// Bounded set of recently seen sequence markers.
#[derive(Debug)]
pub struct SeenMarkers {
    window: Mutex<Window>,
    capacity: usize,
}

impl Default for SeenMarkers {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl SeenMarkers {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Mutex::new(Window::default()),
            capacity: capacity.max(1),
        }
    }

    /// Records `marker`, returning `true` the first time it is seen.
    pub fn first_sighting(&self, marker: SequenceMarker) -> bool {
        let mut window = self.window.lock();
        if !window.seen.insert(marker) {
            return false;
        }
        window.order.push_back(marker);
        if window.order.len() > self.capacity
            && let Some(evicted) = window.order.pop_front()
        {
            window.seen.remove(&evicted);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.window.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_sighting_rejected() {
        let seen = SeenMarkers::default();
        assert!(seen.first_sighting(SequenceMarker(10)));
        assert!(!seen.first_sighting(SequenceMarker(10)));
        assert!(seen.first_sighting(SequenceMarker(11)));
    }

    #[test]
    fn test_window_is_bounded() {
        let seen = SeenMarkers::new(2);
        for seq in 1..=3 {
            assert!(seen.first_sighting(SequenceMarker(seq)));
        }
        assert_eq!(seen.len(), 2);
        // The oldest marker fell out of the window.
        assert!(seen.first_sighting(SequenceMarker(1)));
        assert!(!seen.first_sighting(SequenceMarker(3)));
    }
}
