// Copyright 2025 Reflow Contributors (https://github.com/reflow-dev/reflow)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Transient Overlay Store - ephemeral status entries with timed removal
//!
//! A keyed map of status annotations partitioned into per-destination
//! views. Updates are upserts by id; an empty text is the clear signal.
//! An entry stays visible for at least [`MIN_VISIBLE`] from its first
//! appearance, so a clear that arrives early schedules removal for the
//! remaining time instead of acting immediately.
//!
//! Every scheduled removal is an independently abortable timer keyed by
//! entry id; rescheduling always aborts the prior timer. Each store
//! instance is an isolated state machine starting empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reflow_core::{Destination, TransientEntry};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Minimum time an entry stays visible once shown.
pub const MIN_VISIBLE: Duration = Duration::from_millis(800);

struct OverlayEntry {
    entry: TransientEntry,
    /// Set on first appearance, never reset by later updates.
    first_shown: Instant,
    /// Refreshed from the store-wide counter on every non-empty update; a
    /// removal timer only fires if the entry's epoch still matches the one
    /// it was scheduled against, so a timer that loses the abort race
    /// cannot delete fresher content.
    epoch: u64,
}

#[derive(Default)]
struct OverlayInner {
    entries: HashMap<String, OverlayEntry>,
    /// First-appearance order; the derived views preserve it.
    order: Vec<String>,
    timers: HashMap<String, JoinHandle<()>>,
    next_epoch: u64,
}

/// Cloneable handle over one overlay instance.
///
/// Timers are driven by the ambient Tokio runtime, so updates that
/// schedule a removal must happen inside one.
#[derive(Clone)]
pub struct TransientOverlayStore {
    inner: Arc<Mutex<OverlayInner>>,
    min_visible: Duration,
}

impl Default for TransientOverlayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TransientOverlayStore {
    pub fn new() -> Self {
        Self::with_min_visible(MIN_VISIBLE)
    }

    pub fn with_min_visible(min_visible: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OverlayInner::default())),
            min_visible,
        }
    }

    /// Feed one incoming payload to the overlay.
    ///
    /// The stream is heterogeneous; anything that fails the structural
    /// check is silently dropped. Decode failure is a no-op, not an error.
    pub fn handle_update(&self, value: &Value) {
        let Some(entry) = TransientEntry::from_value(value) else {
            trace!("ignoring payload that is not a transient update");
            return;
        };
        self.apply(entry);
    }

    fn apply(&self, entry: TransientEntry) {
        if entry.is_clear() {
            self.apply_clear(&entry.id);
        } else {
            self.apply_upsert(entry);
        }
    }

    fn apply_upsert(&self, entry: TransientEntry) {
        let mut inner = self.inner.lock();

        // Fresh content supersedes any pending clear for this id.
        if let Some(handle) = inner.timers.remove(&entry.id) {
            handle.abort();
        }

        let epoch = inner.next_epoch;
        inner.next_epoch += 1;

        match inner.entries.get_mut(&entry.id) {
            Some(existing) => {
                existing.epoch = epoch;
                existing.entry = entry;
            }
            None => {
                debug!(id = %entry.id, "transient entry shown");
                inner.order.push(entry.id.clone());
                inner.entries.insert(
                    entry.id.clone(),
                    OverlayEntry {
                        first_shown: Instant::now(),
                        epoch,
                        entry,
                    },
                );
            }
        }
    }

    fn apply_clear(&self, id: &str) {
        let mut inner = self.inner.lock();

        let (elapsed, epoch) = match inner.entries.get(id) {
            Some(existing) => (existing.first_shown.elapsed(), existing.epoch),
            None => return,
        };

        if elapsed >= self.min_visible {
            debug!(%id, "transient entry cleared");
            Self::remove_locked(&mut inner, id);
            return;
        }

        // Wait out the remaining visibility window, not a fresh one.
        let remaining = self.min_visible - elapsed;
        self.schedule_removal(&mut inner, id.to_string(), epoch, remaining);
    }

    fn schedule_removal(
        &self,
        inner: &mut OverlayInner,
        id: String,
        epoch: u64,
        delay: Duration,
    ) {
        // Cancel-then-reschedule; an armed timer must never be merely
        // overwritten.
        if let Some(handle) = inner.timers.remove(&id) {
            handle.abort();
        }

        let store = self.clone();
        let key = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            store.remove_if_stale(&key, epoch);
        });
        inner.timers.insert(id, handle);
    }

    fn remove_if_stale(&self, id: &str, epoch: u64) {
        let mut inner = self.inner.lock();
        let current = inner.entries.get(id).map(|e| e.epoch);
        if current == Some(epoch) {
            debug!(%id, "transient entry cleared");
            Self::remove_locked(&mut inner, id);
        }
    }

    fn remove_locked(inner: &mut OverlayInner, id: &str) {
        if let Some(handle) = inner.timers.remove(id) {
            handle.abort();
        }
        inner.entries.remove(id);
        inner.order.retain(|key| key != id);
    }

    /// Immediate unconditional removal, bypassing the minimum-visibility
    /// window.
    pub fn clear_message(&self, id: &str) {
        let mut inner = self.inner.lock();
        Self::remove_locked(&mut inner, id);
    }

    /// Remove every entry and cancel every pending removal.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        for (_, handle) in inner.timers.drain() {
            handle.abort();
        }
        inner.entries.clear();
        inner.order.clear();
    }

    /// Ordered view of the entries routed to one destination.
    pub fn messages_for(&self, destination: Destination) -> Vec<TransientEntry> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .filter(|e| e.entry.destination == destination)
            .map(|e| e.entry.clone())
            .collect()
    }

    pub fn chat_messages(&self) -> Vec<TransientEntry> {
        self.messages_for(Destination::ChatInline)
    }

    pub fn panel_messages(&self) -> Vec<TransientEntry> {
        self.messages_for(Destination::SidePanel)
    }

    pub fn toast_messages(&self) -> Vec<TransientEntry> {
        self.messages_for(Destination::Toast)
    }

    pub fn has_active_messages(&self) -> bool {
        !self.inner.lock().entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
