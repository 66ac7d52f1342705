// SPDX-License-Identifier: CEPL-1.0
//! Whether the loop keeps asking for frames.
//!
//! While the surface has no area (minimised) or the window is occluded, the
//! loop stops requesting redraws and sleeps in `ControlFlow::Wait`. A resize
//! to a real size, un-occlusion, or a frame that presents again resumes it.

use tracing::info;
use tri_render::FrameOutcome;

#[derive(Debug, Default)]
pub struct Pacing {
    paused: bool,
}

impl Pacing {
    #[inline]
    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn on_frame(&mut self, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::SurfaceEmpty { .. } => self.set(true, "surface is empty"),
            FrameOutcome::Presented { .. } => self.set(false, "frame presented"),
            FrameOutcome::Skipped { .. } => {}
        }
    }

    pub fn on_resized(&mut self, width: u32, height: u32) {
        self.set(width == 0 || height == 0, "resized");
    }

    pub fn on_occluded(&mut self, occluded: bool) {
        self.set(occluded, "occlusion changed");
    }

    fn set(&mut self, paused: bool, why: &str) {
        if self.paused != paused {
            info!("{why} → paused={paused}");
            self.paused = paused;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tri_render::{Acquire, FrameBackend, FrameScheduler, Present};

    /// One slot, completes instantly; the surface can be emptied at will.
    #[derive(Default)]
    struct MinimisableGpu {
        empty: bool,
        stale_on_next_present: bool,
        recreates: usize,
        presents: usize,
    }

    impl FrameBackend for MinimisableGpu {
        fn slot_count(&self) -> usize {
            1
        }
        fn wait_for_slot(&mut self, _slot: usize) -> Result<()> {
            Ok(())
        }
        fn acquire_image(&mut self, _slot: usize) -> Result<Acquire> {
            Ok(Acquire::Ready {
                image: 0,
                suboptimal: false,
            })
        }
        fn reset_slot(&mut self, _slot: usize) -> Result<()> {
            Ok(())
        }
        fn record(&mut self, _slot: usize, _image: u32) -> Result<()> {
            Ok(())
        }
        fn submit(&mut self, _slot: usize) -> Result<()> {
            Ok(())
        }
        fn present(&mut self, _slot: usize, _image: u32) -> Result<Present> {
            self.presents += 1;
            if std::mem::take(&mut self.stale_on_next_present) {
                Ok(Present::OutOfDate)
            } else {
                Ok(Present::Ok)
            }
        }
        fn recreate_swapchain(&mut self) -> Result<bool> {
            self.recreates += 1;
            Ok(!self.empty)
        }
    }

    /// One pass of the event loop: draw only when not paused.
    fn spin(pacing: &mut Pacing, sched: &mut FrameScheduler, gpu: &mut MinimisableGpu, n: usize) {
        for _ in 0..n {
            if !pacing.paused() {
                let outcome = sched.draw_frame(gpu).unwrap();
                pacing.on_frame(outcome);
            }
        }
    }

    #[test]
    fn minimised_window_stops_rebuild_attempts() {
        let mut gpu = MinimisableGpu::default();
        let mut sched = FrameScheduler::for_backend(&gpu).unwrap();
        let mut pacing = Pacing::default();

        spin(&mut pacing, &mut sched, &mut gpu, 3);
        assert_eq!(gpu.presents, 3);

        // minimise: the last present goes out of date, the surface has no area
        gpu.stale_on_next_present = true;
        gpu.empty = true;
        spin(&mut pacing, &mut sched, &mut gpu, 100_000);

        assert!(pacing.paused());
        assert_eq!(gpu.recreates, 1, "one rebuild attempt, then the loop sleeps");
        assert_eq!(gpu.presents, 4);

        // restore
        gpu.empty = false;
        pacing.on_resized(800, 600);
        spin(&mut pacing, &mut sched, &mut gpu, 5);
        assert!(!pacing.paused());
        assert_eq!(gpu.recreates, 2);
        assert_eq!(gpu.presents, 9);
    }

    #[test]
    fn zero_size_and_occlusion_pause() {
        let mut pacing = Pacing::default();
        pacing.on_resized(0, 600);
        assert!(pacing.paused());
        pacing.on_resized(800, 600);
        assert!(!pacing.paused());

        pacing.on_occluded(true);
        assert!(pacing.paused());
        pacing.on_occluded(false);
        assert!(!pacing.paused());
    }

    #[test]
    fn skipped_frames_do_not_change_pacing() {
        let mut pacing = Pacing::default();
        pacing.on_frame(FrameOutcome::Skipped { slot: 0 });
        assert!(!pacing.paused());

        pacing.on_frame(FrameOutcome::SurfaceEmpty { slot: 0 });
        pacing.on_frame(FrameOutcome::Skipped { slot: 0 });
        assert!(pacing.paused());

        pacing.on_frame(FrameOutcome::Presented { slot: 0, image: 1 });
        assert!(!pacing.paused());
    }
}
