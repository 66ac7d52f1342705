// SPDX-License-Identifier: CEPL-1.0
//! Frames-in-flight scheduling.
//!
//! A fixed number of frame slots are used round-robin. Each slot owns an
//! image-available semaphore, a render-finished semaphore, an in-flight fence
//! (created signaled) and a command buffer. One iteration:
//!
//! ```text
//! wait(fence[slot])                      CPU blocks until the slot is free
//! image = acquire(signal: available[slot])
//! reset(fence[slot])
//! record(cmd[slot], framebuffer[image])
//! submit(wait: available[slot] @ COLOR_ATTACHMENT_OUTPUT,
//!        signal: finished[slot], fence[slot])
//! present(image, wait: finished[slot])
//! slot = (slot + 1) % N
//! ```
//!
//! The fence wait is the only blocking call, so at most N slots ever have
//! GPU work outstanding.

use anyhow::{ensure, Context, Result};
use tracing::{trace, warn};

/// Result of asking the swapchain for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Ready { image: u32, suboptimal: bool },
    /// No image was acquired and the slot's semaphore was not signaled.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Present {
    Ok,
    Suboptimal,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { slot: usize, image: u32 },
    /// Nothing was submitted; the slot counter did not move.
    Skipped { slot: usize },
    /// The surface has no area, so no swapchain can exist. Nothing was
    /// submitted; the caller should stop drawing until the window changes.
    SurfaceEmpty { slot: usize },
}

/// GPU-side operations the scheduler drives, keyed by frame slot.
///
/// Implementations own the per-slot sync objects and command buffers; the
/// scheduler only decides which slot is used and in what order.
pub trait FrameBackend {
    fn slot_count(&self) -> usize;

    /// Blocks without timeout until the previous submission of `slot` is done.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Requests the next presentable image; signals the slot's
    /// image-available semaphore when it is `Ready`.
    fn acquire_image(&mut self, slot: usize) -> Result<Acquire>;

    /// Puts the slot's fence back to unsignaled.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    /// Resets and re-records the slot's command buffer against `image`.
    fn record(&mut self, slot: usize, image: u32) -> Result<()>;

    fn submit(&mut self, slot: usize) -> Result<()>;

    fn present(&mut self, slot: usize, image: u32) -> Result<Present>;

    /// Rebuilds the swapchain and everything sized by it. Returns `false`
    /// when the surface currently cannot host one (zero extent).
    fn recreate_swapchain(&mut self) -> Result<bool>;
}

#[derive(Debug)]
pub struct FrameScheduler {
    slots: usize,
    current: usize,
    stale: bool,
    presented: u64,
}

impl FrameScheduler {
    pub fn new(slots: usize) -> Result<Self> {
        ensure!(slots >= 1, "at least one frame slot is required");
        Ok(FrameScheduler {
            slots,
            current: 0,
            stale: false,
            presented: 0,
        })
    }

    pub fn for_backend<B: FrameBackend + ?Sized>(backend: &B) -> Result<Self> {
        Self::new(backend.slot_count())
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots
    }

    #[inline]
    pub fn frames_presented(&self) -> u64 {
        self.presented
    }

    /// True when the next iteration will rebuild the swapchain first.
    #[inline]
    pub fn swapchain_stale(&self) -> bool {
        self.stale
    }

    pub fn draw_frame<B: FrameBackend + ?Sized>(&mut self, gpu: &mut B) -> Result<FrameOutcome> {
        let slot = self.current;
        ensure!(
            gpu.slot_count() == self.slots,
            "backend has {} frame slots, scheduler expects {}",
            gpu.slot_count(),
            self.slots
        );

        if self.stale {
            if !gpu.recreate_swapchain().context("recreate swapchain")? {
                trace!(slot, "surface has no extent, skipping frame");
                return Ok(FrameOutcome::SurfaceEmpty { slot });
            }
            self.stale = false;
        }

        gpu.wait_for_slot(slot).context("wait for in-flight fence")?;

        // The fence is reset only once an image is in hand: an out-of-date
        // acquire leaves the slot signaled so the next wait cannot deadlock.
        let (image, acquire_suboptimal) = match gpu.acquire_image(slot).context("acquire image")? {
            Acquire::Ready { image, suboptimal } => (image, suboptimal),
            Acquire::OutOfDate => {
                warn!(slot, "swapchain out of date on acquire, recreating");
                self.stale = true;
                return Ok(FrameOutcome::Skipped { slot });
            }
        };

        gpu.reset_slot(slot).context("reset in-flight fence")?;
        gpu.record(slot, image).context("record command buffer")?;
        gpu.submit(slot).context("submit draw command buffer")?;
        let present = gpu.present(slot, image).context("present")?;

        self.current = (slot + 1) % self.slots;
        self.presented += 1;
        trace!(slot, image, frame = self.presented, "frame presented");

        if acquire_suboptimal || present != Present::Ok {
            warn!(?present, acquire_suboptimal, "swapchain no longer matches surface, recreating");
            self.stale = true;
        }

        Ok(FrameOutcome::Presented { slot, image })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_slots_is_rejected() {
        assert!(FrameScheduler::new(0).is_err());
    }

    #[test]
    fn starts_at_slot_zero() {
        let s = FrameScheduler::new(2).unwrap();
        assert_eq!(s.current_slot(), 0);
        assert_eq!(s.slot_count(), 2);
        assert_eq!(s.frames_presented(), 0);
        assert!(!s.swapchain_stale());
    }

    #[test]
    fn scheduler_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameScheduler>();
    }
}
