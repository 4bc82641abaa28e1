// SPDX-License-Identifier: CEPL-1.0
//! One acquire → record → submit → present cycle, independent of the
//! graphics API that carries it out.
//!
//! Exactly one frame may be in flight. The backend's fence is the only
//! backpressure: `wait_in_flight` must block until the previous submission
//! has retired, and nothing is reset before that wait returns.

use crate::RenderSize;

/// Result of asking the presentation engine for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired<I> {
    Ready(I),
    /// Out of date or suboptimal; the chain must be rebuilt.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presented {
    Done,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Nothing was submitted; the chain was rebuilt and the caller retries
    /// on its next iteration.
    Skipped,
    /// Submitted, but presentation reported staleness and the chain was
    /// rebuilt afterwards.
    Rebuilt,
    /// The target has zero area; no GPU work was touched.
    Paused,
}

/// Size bookkeeping for the presentable target. A zero-area target pauses
/// rendering; returning to a non-zero area un-pauses and asks for a rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetState {
    size: RenderSize,
    paused: bool,
    invalidated: bool,
}

impl TargetState {
    pub fn new(size: RenderSize) -> Self {
        Self {
            size,
            paused: size.is_zero_area(),
            invalidated: false,
        }
    }

    pub fn size(&self) -> RenderSize {
        self.size
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Record a new window size. The chain is not touched here; the next
    /// `run_frame` sees `invalidated` and rebuilds.
    pub fn resize(&mut self, size: RenderSize) {
        self.size = size;
        if size.is_zero_area() {
            self.paused = true;
            return;
        }
        self.paused = false;
        self.invalidated = true;
    }

    pub fn mark_rebuilt(&mut self) {
        self.invalidated = false;
    }
}

pub trait FrameBackend {
    type Image: Copy;
    type Error;

    /// Zero-area target: the frame is skipped before any GPU call.
    fn paused(&self) -> bool {
        false
    }
    /// An external signal (window resize) asked for a rebuild.
    fn invalidated(&self) -> bool;
    fn wait_in_flight(&mut self) -> Result<(), Self::Error>;
    fn acquire(&mut self) -> Result<Acquired<Self::Image>, Self::Error>;
    /// Reset the in-flight fence and the command buffer.
    fn reset(&mut self) -> Result<(), Self::Error>;
    fn record(&mut self, image: Self::Image) -> Result<(), Self::Error>;
    fn submit(&mut self) -> Result<(), Self::Error>;
    fn present(&mut self, image: Self::Image) -> Result<Presented, Self::Error>;
    /// Tear the presentable chain down and build it again from scratch.
    fn rebuild(&mut self) -> Result<(), Self::Error>;
}

pub fn run_frame<B: FrameBackend>(backend: &mut B) -> Result<FrameStatus, B::Error> {
    if backend.paused() {
        return Ok(FrameStatus::Paused);
    }
    if backend.invalidated() {
        backend.rebuild()?;
        return Ok(FrameStatus::Skipped);
    }

    backend.wait_in_flight()?;

    let image = match backend.acquire()? {
        Acquired::Ready(image) => image,
        Acquired::Stale => {
            // Fence stays signaled: nothing was submitted for this frame.
            backend.rebuild()?;
            return Ok(FrameStatus::Skipped);
        }
    };

    backend.reset()?;
    backend.record(image)?;
    backend.submit()?;

    match backend.present(image)? {
        Presented::Done => Ok(FrameStatus::Presented),
        Presented::Stale => {
            backend.rebuild()?;
            Ok(FrameStatus::Rebuilt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Step {
        Wait,
        Acquire,
        Reset,
        Record(u32),
        Submit,
        Present(u32),
        Rebuild,
    }

    /// Records every call and models the fence: a submit leaves it
    /// unsignaled until the next wait retires the work.
    struct MockBackend {
        steps: Vec<Step>,
        acquires: VecDeque<Acquired<u32>>,
        presents: VecDeque<Presented>,
        fence_signaled: bool,
        outstanding: u32,
        swapchain_generation: u32,
        recorded_against: Vec<u32>,
        target: TargetState,
        next_image: u32,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                steps: Vec::new(),
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                fence_signaled: true,
                outstanding: 0,
                swapchain_generation: 1,
                recorded_against: Vec::new(),
                target: TargetState::new(RenderSize {
                    width: 800,
                    height: 600,
                }),
                next_image: 0,
            }
        }
    }

    impl FrameBackend for MockBackend {
        type Image = u32;
        type Error = String;

        fn paused(&self) -> bool {
            self.target.is_paused()
        }

        fn invalidated(&self) -> bool {
            self.target.is_invalidated()
        }

        fn wait_in_flight(&mut self) -> Result<(), String> {
            self.steps.push(Step::Wait);
            self.outstanding = 0;
            self.fence_signaled = true;
            Ok(())
        }

        fn acquire(&mut self) -> Result<Acquired<u32>, String> {
            self.steps.push(Step::Acquire);
            Ok(self.acquires.pop_front().unwrap_or_else(|| {
                let i = self.next_image;
                self.next_image = (self.next_image + 1) % 3;
                Acquired::Ready(i)
            }))
        }

        fn reset(&mut self) -> Result<(), String> {
            self.steps.push(Step::Reset);
            if !self.fence_signaled {
                return Err("reset while a submission is in flight".into());
            }
            self.fence_signaled = false;
            Ok(())
        }

        fn record(&mut self, image: u32) -> Result<(), String> {
            self.steps.push(Step::Record(image));
            self.recorded_against.push(self.swapchain_generation);
            Ok(())
        }

        fn submit(&mut self) -> Result<(), String> {
            self.steps.push(Step::Submit);
            self.outstanding += 1;
            if self.outstanding > 1 {
                return Err("two submissions in flight".into());
            }
            Ok(())
        }

        fn present(&mut self, image: u32) -> Result<Presented, String> {
            self.steps.push(Step::Present(image));
            Ok(self.presents.pop_front().unwrap_or(Presented::Done))
        }

        fn rebuild(&mut self) -> Result<(), String> {
            self.steps.push(Step::Rebuild);
            self.swapchain_generation += 1;
            self.target.mark_rebuilt();
            Ok(())
        }
    }

    #[test]
    fn full_cycle_runs_in_order() {
        let mut b = MockBackend::new();
        assert_eq!(run_frame(&mut b), Ok(FrameStatus::Presented));
        assert_eq!(
            b.steps,
            vec![
                Step::Wait,
                Step::Acquire,
                Step::Reset,
                Step::Record(0),
                Step::Submit,
                Step::Present(0),
            ]
        );
    }

    #[test]
    fn suboptimal_acquire_skips_frame_and_next_frame_uses_new_chain() {
        let mut b = MockBackend::new();
        b.acquires.push_back(Acquired::Stale);

        assert_eq!(run_frame(&mut b), Ok(FrameStatus::Skipped));
        assert_eq!(b.steps, vec![Step::Wait, Step::Acquire, Step::Rebuild]);
        assert!(!b.steps.contains(&Step::Submit));
        assert_eq!(b.swapchain_generation, 2);
        // Fence untouched, so the next wait cannot deadlock.
        assert!(b.fence_signaled);

        b.steps.clear();
        assert_eq!(run_frame(&mut b), Ok(FrameStatus::Presented));
        assert!(b.steps.contains(&Step::Submit));
        assert_eq!(b.recorded_against, vec![2]);
    }

    #[test]
    fn stale_present_rebuilds_after_submission() {
        let mut b = MockBackend::new();
        b.presents.push_back(Presented::Stale);
        assert_eq!(run_frame(&mut b), Ok(FrameStatus::Rebuilt));
        assert_eq!(b.steps.last(), Some(&Step::Rebuild));
        assert!(b.steps.contains(&Step::Submit));
        assert_eq!(b.swapchain_generation, 2);
    }

    #[test]
    fn fence_is_waited_before_every_reset() {
        let mut b = MockBackend::new();
        for _ in 0..10 {
            run_frame(&mut b).unwrap();
        }
        let mut waited = false;
        for step in &b.steps {
            match step {
                Step::Wait => waited = true,
                Step::Reset => {
                    assert!(waited, "reset without a preceding wait");
                    waited = false;
                }
                _ => {}
            }
        }
    }

    #[test]
    fn repeated_frames_never_rebuild() {
        let mut b = MockBackend::new();
        for _ in 0..50 {
            assert_eq!(run_frame(&mut b), Ok(FrameStatus::Presented));
        }
        assert_eq!(b.swapchain_generation, 1);
        assert!(!b.steps.contains(&Step::Rebuild));
    }

    #[test]
    fn external_resize_rebuilds_without_touching_the_fence() {
        let mut b = MockBackend::new();
        b.target.resize(RenderSize {
            width: 1024,
            height: 768,
        });
        assert_eq!(run_frame(&mut b), Ok(FrameStatus::Skipped));
        assert_eq!(b.steps, vec![Step::Rebuild]);
        assert!(!b.target.is_invalidated());
        assert_eq!(run_frame(&mut b), Ok(FrameStatus::Presented));
    }

    #[test]
    fn zero_area_pauses_without_touching_the_backend() {
        let mut b = MockBackend::new();
        b.target.resize(RenderSize {
            width: 0,
            height: 600,
        });
        assert!(b.target.is_paused());
        for _ in 0..3 {
            assert_eq!(run_frame(&mut b), Ok(FrameStatus::Paused));
        }
        assert!(b.steps.is_empty());
        assert!(b.fence_signaled);
        assert_eq!(b.swapchain_generation, 1);
    }

    #[test]
    fn resume_from_zero_area_rebuilds_then_presents() {
        let mut b = MockBackend::new();
        b.target.resize(RenderSize {
            width: 800,
            height: 0,
        });
        assert_eq!(run_frame(&mut b), Ok(FrameStatus::Paused));

        let restored = RenderSize {
            width: 640,
            height: 480,
        };
        b.target.resize(restored);
        assert!(!b.target.is_paused());
        assert!(b.target.is_invalidated());
        assert_eq!(b.target.size(), restored);

        assert_eq!(run_frame(&mut b), Ok(FrameStatus::Skipped));
        assert_eq!(b.steps, vec![Step::Rebuild]);
        assert_eq!(b.swapchain_generation, 2);
        assert!(!b.target.is_invalidated());

        assert_eq!(run_frame(&mut b), Ok(FrameStatus::Presented));
        assert_eq!(b.recorded_against, vec![2]);
    }

    #[test]
    fn target_created_at_zero_area_starts_paused() {
        let t = TargetState::new(RenderSize {
            width: 0,
            height: 0,
        });
        assert!(t.is_paused());
        assert!(!t.is_invalidated());
    }

    #[test]
    fn backend_errors_abort_the_frame() {
        struct Failing;
        impl FrameBackend for Failing {
            type Image = u32;
            type Error = &'static str;
            fn invalidated(&self) -> bool {
                false
            }
            fn wait_in_flight(&mut self) -> Result<(), &'static str> {
                Ok(())
            }
            fn acquire(&mut self) -> Result<Acquired<u32>, &'static str> {
                Err("device lost")
            }
            fn reset(&mut self) -> Result<(), &'static str> {
                panic!("reset after failed acquire")
            }
            fn record(&mut self, _: u32) -> Result<(), &'static str> {
                unreachable!()
            }
            fn submit(&mut self) -> Result<(), &'static str> {
                unreachable!()
            }
            fn present(&mut self, _: u32) -> Result<Presented, &'static str> {
                unreachable!()
            }
            fn rebuild(&mut self) -> Result<(), &'static str> {
                unreachable!()
            }
        }
        assert_eq!(run_frame(&mut Failing), Err("device lost"));
    }
}
