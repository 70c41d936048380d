//! Per-target staleness tracking for decode results.
//!
//! A result is identified by its stamp (`version * 10 + tier`); a slot only
//! accepts a stamp strictly greater than the last one it accepted, so a slow
//! full-quality decode of an old version can never paint over a newer
//! low-quality frame. The version counter and the per-slot stamps are the
//! only state shared across the producer/worker boundary.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::adjustments::Crop;
use crate::engine::Tier;

pub const fn stamp(version: u64, tier: Tier) -> i64 {
    version as i64 * 10 + tier as i64
}

/// One independently updated display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderSlot {
    Original,
    Edited,
    EditedViewport,
    UncroppedEdited,
}

const SLOT_COUNT: usize = 4;

impl RenderSlot {
    const fn idx(self) -> usize {
        match self {
            RenderSlot::Original => 0,
            RenderSlot::Edited => 1,
            RenderSlot::EditedViewport => 2,
            RenderSlot::UncroppedEdited => 3,
        }
    }
}

/// What a frame was rendered as, kept alongside the pixels so consumers can
/// position/rotate it correctly.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMeta {
    pub rotation_degrees: f32,
    pub roi: Option<Crop>,
}

#[derive(Debug)]
pub struct AcceptedFrame {
    pub pixels: Vec<u8>,
    pub meta: FrameMeta,
    pub stamp: i64,
}

#[derive(Debug, Default)]
pub struct RenderTargetStore {
    version: AtomicU64,
    stamps: [AtomicI64; SLOT_COUNT],
    frames: [Mutex<Option<Arc<AcceptedFrame>>>; SLOT_COUNT],
}

impl RenderTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the next request version. Incremented once per enqueued
    /// request, regardless of target.
    pub fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn last_stamp(&self, slot: RenderSlot) -> i64 {
        self.stamps[slot.idx()].load(Ordering::Acquire)
    }

    /// Applies the acceptance rule: the frame is stored only if `stamp`
    /// exceeds everything this slot has already accepted.
    pub fn try_accept(
        &self,
        slot: RenderSlot,
        stamp: i64,
        pixels: Vec<u8>,
        meta: FrameMeta,
    ) -> bool {
        let prev = self.stamps[slot.idx()].fetch_max(stamp, Ordering::AcqRel);
        if stamp <= prev {
            return false;
        }
        let frame = Arc::new(AcceptedFrame {
            pixels,
            meta,
            stamp,
        });
        *self.lock_frame(slot) = Some(frame);
        true
    }

    pub fn latest_frame(&self, slot: RenderSlot) -> Option<Arc<AcceptedFrame>> {
        self.lock_frame(slot).clone()
    }

    fn lock_frame(
        &self,
        slot: RenderSlot,
    ) -> std::sync::MutexGuard<'_, Option<Arc<AcceptedFrame>>> {
        self.frames[slot.idx()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> FrameMeta {
        FrameMeta {
            rotation_degrees: 0.0,
            roi: None,
        }
    }

    #[test]
    fn versions_are_monotonic() {
        let store = RenderTargetStore::new();
        let a = store.next_version();
        let b = store.next_version();
        assert!(b > a);
        assert_eq!(store.current_version(), b);
    }

    #[test]
    fn accepted_stamps_strictly_increase() {
        let store = RenderTargetStore::new();
        let mut accepted = Vec::new();
        for s in [10, 11, 11, 12, 5, 30, 29] {
            if store.try_accept(RenderSlot::Edited, s, vec![], meta()) {
                accepted.push(s);
            }
        }
        assert_eq!(accepted, vec![10, 11, 12, 30]);
        assert!(accepted.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn progressive_tiers_then_stale_retry() {
        let store = RenderTargetStore::new();
        // version 5 walks its three tiers
        for tier in [Tier::SuperLow, Tier::Low, Tier::Full] {
            assert!(store.try_accept(RenderSlot::Edited, stamp(5, tier), vec![], meta()));
        }
        // version 6 lands its full-quality frame
        assert!(store.try_accept(RenderSlot::Edited, stamp(6, Tier::Full), vec![], meta()));
        // a late super-low retry of version 5 must be rejected
        assert!(!store.try_accept(RenderSlot::Edited, stamp(5, Tier::SuperLow), vec![], meta()));
        assert_eq!(store.last_stamp(RenderSlot::Edited), 62);
    }

    #[test]
    fn slots_are_independent() {
        let store = RenderTargetStore::new();
        assert!(store.try_accept(RenderSlot::Edited, 42, vec![1], meta()));
        assert!(store.try_accept(RenderSlot::Original, 12, vec![2], meta()));
        assert_eq!(store.latest_frame(RenderSlot::Edited).unwrap().pixels, [1]);
        assert_eq!(store.latest_frame(RenderSlot::Original).unwrap().pixels, [2]);
        assert!(store.latest_frame(RenderSlot::EditedViewport).is_none());
    }
}
