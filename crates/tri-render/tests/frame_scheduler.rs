//! Drives the frame scheduler against a stub GPU that models fences,
//! semaphores and in-order queue execution.

use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use tri_render::{Acquire, FrameBackend, FrameOutcome, FrameScheduler, Present};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    Wait(usize),
    Acquire(usize),
    Reset(usize),
    Record(usize, u32),
    Submit(usize),
    Present(usize, u32),
    Recreate,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Completion {
    /// Work finishes as soon as it is submitted.
    Immediate,
    /// Work finishes in submission order, only when the CPU waits for it.
    OnWait,
}

struct StubGpu {
    completion: Completion,
    image_count: u32,
    next_image: u32,

    fence_signaled: Vec<bool>,
    available: Vec<bool>,
    finished: Vec<bool>,
    queue: VecDeque<usize>,

    acquire_script: VecDeque<Acquire>,
    present_script: VecDeque<Present>,
    recreate_script: VecDeque<bool>,
    fail_submit_at: Option<usize>,

    events: Vec<Event>,
    blocking_waits: usize,
    max_outstanding: usize,
    submits: usize,
}

impl StubGpu {
    fn new(slots: usize, completion: Completion) -> Self {
        StubGpu {
            completion,
            image_count: 3,
            next_image: 0,
            fence_signaled: vec![true; slots],
            available: vec![false; slots],
            finished: vec![false; slots],
            queue: VecDeque::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            recreate_script: VecDeque::new(),
            fail_submit_at: None,
            events: Vec::new(),
            blocking_waits: 0,
            max_outstanding: 0,
            submits: 0,
        }
    }

    fn complete_oldest(&mut self) {
        let slot = self.queue.pop_front().expect("nothing in flight");
        self.fence_signaled[slot] = true;
    }

    fn slot_sequence(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Present(slot, _) => Some(*slot),
                _ => None,
            })
            .collect()
    }
}

impl FrameBackend for StubGpu {
    fn slot_count(&self) -> usize {
        self.fence_signaled.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.events.push(Event::Wait(slot));
        if !self.fence_signaled[slot] {
            self.blocking_waits += 1;
        }
        while !self.fence_signaled[slot] {
            if self.queue.is_empty() {
                return Err(anyhow!("deadlock: slot {slot} fence can never signal"));
            }
            self.complete_oldest();
        }
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<Acquire> {
        self.events.push(Event::Acquire(slot));
        let result = self.acquire_script.pop_front().unwrap_or_else(|| {
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Acquire::Ready {
                image,
                suboptimal: false,
            }
        });
        if let Acquire::Ready { .. } = result {
            assert!(!self.available[slot], "available semaphore signaled twice");
            self.available[slot] = true;
        }
        Ok(result)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.events.push(Event::Reset(slot));
        assert!(self.fence_signaled[slot], "reset of a fence still in use");
        self.fence_signaled[slot] = false;
        Ok(())
    }

    fn record(&mut self, slot: usize, image: u32) -> Result<()> {
        self.events.push(Event::Record(slot, image));
        assert!(
            !self.queue.contains(&slot),
            "command buffer {slot} re-recorded while the GPU still owns it"
        );
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        if self.fail_submit_at == Some(self.submits) {
            return Err(anyhow!("VK_ERROR_DEVICE_LOST"));
        }
        self.submits += 1;
        self.events.push(Event::Submit(slot));
        assert!(self.available[slot], "submit would wait on an unsignaled semaphore");
        self.available[slot] = false;
        self.finished[slot] = true;
        self.queue.push_back(slot);
        self.max_outstanding = self.max_outstanding.max(self.queue.len());
        if self.completion == Completion::Immediate {
            self.complete_oldest();
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<Present> {
        self.events.push(Event::Present(slot, image));
        assert!(self.finished[slot], "present would wait on an unsignaled semaphore");
        self.finished[slot] = false;
        Ok(self.present_script.pop_front().unwrap_or(Present::Ok))
    }

    fn recreate_swapchain(&mut self) -> Result<bool> {
        self.events.push(Event::Recreate);
        let ok = self.recreate_script.pop_front().unwrap_or(true);
        if ok {
            // recreation idles the device first
            while !self.queue.is_empty() {
                self.complete_oldest();
            }
            self.next_image = 0;
        }
        Ok(ok)
    }
}

fn run(sched: &mut FrameScheduler, gpu: &mut StubGpu, frames: usize) -> Vec<FrameOutcome> {
    (0..frames)
        .map(|_| sched.draw_frame(gpu).expect("draw_frame"))
        .collect()
}

#[test]
fn two_slots_five_frames_alternate_without_blocking() {
    let mut gpu = StubGpu::new(2, Completion::Immediate);
    let mut sched = FrameScheduler::for_backend(&gpu).unwrap();

    run(&mut sched, &mut gpu, 5);

    assert_eq!(gpu.slot_sequence(), vec![0, 1, 0, 1, 0]);
    assert_eq!(gpu.blocking_waits, 0);
    assert_eq!(sched.frames_presented(), 5);
    assert_eq!(sched.current_slot(), 1);
}

#[test]
fn outstanding_work_never_exceeds_slot_count() {
    for slots in 1..=4 {
        let mut gpu = StubGpu::new(slots, Completion::OnWait);
        let mut sched = FrameScheduler::new(slots).unwrap();

        run(&mut sched, &mut gpu, 25);

        assert_eq!(gpu.max_outstanding, slots, "slots = {slots}");
        assert!(gpu.queue.len() <= slots);
    }
}

#[test]
fn lazy_gpu_blocks_once_every_slot_is_busy() {
    let mut gpu = StubGpu::new(2, Completion::OnWait);
    let mut sched = FrameScheduler::new(2).unwrap();

    run(&mut sched, &mut gpu, 6);

    // the first two frames find pre-signaled fences
    assert_eq!(gpu.blocking_waits, 4);
}

#[test]
fn each_iteration_follows_the_handshake_order() {
    let mut gpu = StubGpu::new(2, Completion::OnWait);
    let mut sched = FrameScheduler::new(2).unwrap();

    run(&mut sched, &mut gpu, 4);

    for (i, chunk) in gpu.events.chunks(6).enumerate() {
        let slot = i % 2;
        let image = (i % 3) as u32;
        assert_eq!(
            chunk,
            &[
                Event::Wait(slot),
                Event::Acquire(slot),
                Event::Reset(slot),
                Event::Record(slot, image),
                Event::Submit(slot),
                Event::Present(slot, image),
            ],
            "iteration {i}"
        );
    }
}

#[test]
fn counter_returns_to_start_after_n_frames() {
    for slots in 1..=4 {
        let mut gpu = StubGpu::new(slots, Completion::Immediate);
        let mut sched = FrameScheduler::new(slots).unwrap();

        for step in 0..slots {
            assert_eq!(sched.current_slot(), step);
            sched.draw_frame(&mut gpu).unwrap();
        }
        assert_eq!(sched.current_slot(), 0, "slots = {slots}");
    }
}

#[test]
fn reusing_a_slot_repeats_its_transitions() {
    let mut gpu = StubGpu::new(2, Completion::OnWait);
    let mut sched = FrameScheduler::new(2).unwrap();

    run(&mut sched, &mut gpu, 6);

    let kinds = |events: &[Event]| -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                Event::Wait(_) => "wait",
                Event::Acquire(_) => "acquire",
                Event::Reset(_) => "reset",
                Event::Record(..) => "record",
                Event::Submit(_) => "submit",
                Event::Present(..) => "present",
                Event::Recreate => "recreate",
            })
            .collect()
    };
    let first_use = kinds(&gpu.events[0..6]);
    let second_use = kinds(&gpu.events[12..18]);
    let third_use = kinds(&gpu.events[24..30]);
    assert_eq!(first_use, second_use);
    assert_eq!(second_use, third_use);
}

#[test]
fn out_of_date_acquire_skips_without_resetting_or_advancing() {
    let mut gpu = StubGpu::new(2, Completion::OnWait);
    let mut sched = FrameScheduler::new(2).unwrap();

    run(&mut sched, &mut gpu, 1);
    gpu.acquire_script.push_back(Acquire::OutOfDate);

    let outcome = sched.draw_frame(&mut gpu).unwrap();
    assert_eq!(outcome, FrameOutcome::Skipped { slot: 1 });
    assert_eq!(sched.current_slot(), 1);
    assert!(sched.swapchain_stale());
    assert_eq!(gpu.events.last(), Some(&Event::Acquire(1)));
    assert!(gpu.fence_signaled[1], "fence must stay signaled after a skipped frame");

    // next iteration rebuilds, then reuses slot 1 without deadlocking
    let outcome = sched.draw_frame(&mut gpu).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented { slot: 1, image: 0 });
    assert!(gpu.events.contains(&Event::Recreate));
    assert!(!sched.swapchain_stale());
    assert_eq!(sched.frames_presented(), 2);
}

#[test]
fn suboptimal_present_still_advances_then_recreates() {
    let mut gpu = StubGpu::new(2, Completion::Immediate);
    let mut sched = FrameScheduler::new(2).unwrap();
    gpu.present_script.push_back(Present::Suboptimal);

    let outcome = sched.draw_frame(&mut gpu).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented { slot: 0, image: 0 });
    assert_eq!(sched.current_slot(), 1);
    assert!(sched.swapchain_stale());

    sched.draw_frame(&mut gpu).unwrap();
    assert_eq!(gpu.events[6], Event::Recreate);
    assert_eq!(gpu.slot_sequence(), vec![0, 1]);
}

#[test]
fn out_of_date_present_counts_the_frame() {
    let mut gpu = StubGpu::new(2, Completion::Immediate);
    let mut sched = FrameScheduler::new(2).unwrap();
    gpu.present_script.push_back(Present::OutOfDate);

    sched.draw_frame(&mut gpu).unwrap();
    assert_eq!(sched.frames_presented(), 1);
    assert_eq!(sched.current_slot(), 1);
    assert!(sched.swapchain_stale());
}

#[test]
fn suboptimal_acquire_renders_then_recreates() {
    let mut gpu = StubGpu::new(2, Completion::Immediate);
    let mut sched = FrameScheduler::new(2).unwrap();
    gpu.acquire_script.push_back(Acquire::Ready {
        image: 2,
        suboptimal: true,
    });

    let outcome = sched.draw_frame(&mut gpu).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented { slot: 0, image: 2 });
    assert!(sched.swapchain_stale());
}

#[test]
fn zero_extent_surface_defers_recreation() {
    let mut gpu = StubGpu::new(2, Completion::Immediate);
    let mut sched = FrameScheduler::new(2).unwrap();
    gpu.acquire_script.push_back(Acquire::OutOfDate);
    gpu.recreate_script.extend([false, false, true]);

    let outcomes = run(&mut sched, &mut gpu, 4);

    assert_eq!(
        outcomes,
        vec![
            FrameOutcome::Skipped { slot: 0 },
            FrameOutcome::SurfaceEmpty { slot: 0 },
            FrameOutcome::SurfaceEmpty { slot: 0 },
            FrameOutcome::Presented { slot: 0, image: 0 },
        ]
    );
    let waits = gpu
        .events
        .iter()
        .filter(|e| matches!(e, Event::Wait(_)))
        .count();
    assert_eq!(waits, 2, "no fence wait while the surface is empty");
}

#[test]
fn empty_surface_keeps_the_swapchain_stale_until_it_has_area() {
    let mut gpu = StubGpu::new(2, Completion::Immediate);
    let mut sched = FrameScheduler::new(2).unwrap();
    gpu.present_script.push_back(Present::OutOfDate);
    gpu.recreate_script.push_back(false);

    run(&mut sched, &mut gpu, 1);
    let outcome = sched.draw_frame(&mut gpu).unwrap();
    assert_eq!(outcome, FrameOutcome::SurfaceEmpty { slot: 1 });
    assert!(sched.swapchain_stale());
    assert_eq!(sched.current_slot(), 1);

    let outcome = sched.draw_frame(&mut gpu).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented { slot: 1, image: 0 });
    assert!(!sched.swapchain_stale());
}

#[test]
fn submit_failure_is_fatal_and_does_not_advance() {
    let mut gpu = StubGpu::new(2, Completion::Immediate);
    let mut sched = FrameScheduler::new(2).unwrap();
    gpu.fail_submit_at = Some(1);

    sched.draw_frame(&mut gpu).unwrap();
    let err = sched.draw_frame(&mut gpu).unwrap_err();

    assert!(format!("{err:#}").contains("submit draw command buffer"));
    assert!(format!("{err:#}").contains("VK_ERROR_DEVICE_LOST"));
    assert_eq!(sched.current_slot(), 1);
    assert_eq!(sched.frames_presented(), 1);
}

#[test]
fn mismatched_slot_count_is_an_error() {
    let mut gpu = StubGpu::new(3, Completion::Immediate);
    let mut sched = FrameScheduler::new(2).unwrap();

    assert!(sched.draw_frame(&mut gpu).is_err());
    assert!(gpu.events.is_empty());
}
