//! Key and entry iteration over the store.
//!
//! Both iterators take a snapshot of the controller's capacity at creation
//! time and then walk buckets lazily, decoding one bucket's record only when
//! the previously-buffered entries from the last bucket are exhausted.
//! Concurrent splits and writes can make a key appear zero or one time
//! relative to the snapshot, never more — the iterators are weakly
//! consistent, not a point-in-time view.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::controller::LinearHashingController;
use crate::error::Result;

fn decode_bucket(
    controller: &LinearHashingController,
    index: usize,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let Some(record) = controller.data().get(index)? else {
        return Ok(Vec::new());
    };
    match crate::codec::decode(&record) {
        Ok(entries) => Ok(entries
            .into_iter()
            .map(|e| (e.key.to_vec(), e.value.to_vec()))
            .collect()),
        Err(err) => {
            log::warn!("codec error scanning bucket {index}: {err}; skipping bucket");
            Ok(Vec::new())
        }
    }
}

/// Lazy iterator over every key currently stored, in bucket order.
pub struct KeyIterator {
    controller: Arc<LinearHashingController>,
    next_bucket: usize,
    snapshot_capacity: usize,
    buffer: VecDeque<Vec<u8>>,
}

impl KeyIterator {
    pub(crate) fn new(controller: Arc<LinearHashingController>) -> Self {
        let snapshot_capacity = controller.capacity() as usize;
        Self {
            controller,
            next_bucket: 0,
            snapshot_capacity,
            buffer: VecDeque::new(),
        }
    }

    fn refill(&mut self) -> Result<()> {
        while self.buffer.is_empty() && self.next_bucket < self.snapshot_capacity {
            let entries = decode_bucket(&self.controller, self.next_bucket)?;
            self.next_bucket += 1;
            self.buffer.extend(entries.into_iter().map(|(k, _)| k));
        }
        Ok(())
    }
}

impl Iterator for KeyIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(err) = self.refill() {
            return Some(Err(err));
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Lazy iterator over every `(key, value)` pair currently stored.
pub struct EntryIterator {
    controller: Arc<LinearHashingController>,
    next_bucket: usize,
    snapshot_capacity: usize,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
}

impl EntryIterator {
    pub(crate) fn new(controller: Arc<LinearHashingController>) -> Self {
        let snapshot_capacity = controller.capacity() as usize;
        Self {
            controller,
            next_bucket: 0,
            snapshot_capacity,
            buffer: VecDeque::new(),
        }
    }

    fn refill(&mut self) -> Result<()> {
        while self.buffer.is_empty() && self.next_bucket < self.snapshot_capacity {
            let entries = decode_bucket(&self.controller, self.next_bucket)?;
            self.next_bucket += 1;
            self.buffer.extend(entries);
        }
        Ok(())
    }
}

impl Iterator for EntryIterator {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(err) = self.refill() {
            return Some(Err(err));
        }
        self.buffer.pop_front().map(Ok)
    }
}
