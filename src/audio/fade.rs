//! Cancellable, replaceable volume transitions.
//!
//! A fade divides the volume delta into a fixed number of equal steps spread
//! evenly over the requested duration. At most one transition occupies a
//! [`TransitionSlot`]; installing a new one cancels the previous one, so fades
//! are replaceable but never composed.

use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Linear volume ramp from `from` to `to`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadePlan {
    pub from: f32,
    pub to: f32,
    pub steps: u32,
    pub duration: Duration,
}

impl FadePlan {
    /// Volume after `step` of `steps` ticks, clamped to `[0, 1]`.
    ///
    /// The final step lands exactly on the target.
    #[must_use]
    pub fn volume_at(&self, step: u32) -> f32 {
        if self.steps == 0 || step >= self.steps {
            return self.to.clamp(0.0, 1.0);
        }
        let fraction = step as f32 / self.steps as f32;
        (self.from + (self.to - self.from) * fraction).clamp(0.0, 1.0)
    }

    /// Time between ticks, never shorter than a millisecond.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        (self.duration / self.steps.max(1)).max(Duration::from_millis(1))
    }

    /// Whether the ramp should be applied immediately instead of ticked.
    #[must_use]
    pub fn is_instant(&self) -> bool {
        self.steps == 0 || self.duration.is_zero()
    }
}

/// Handle to a running transition.
pub struct Transition {
    cancel: CancellationToken,
    finished: CancellationToken,
    task: JoinHandle<()>,
}

impl Transition {
    /// Spawn a ticking transition on the current tokio runtime.
    ///
    /// `apply` receives each intermediate volume and returns `false` to stop
    /// early (e.g. when the caller's state has moved on). `on_complete` runs
    /// only if every tick was applied.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<A, C>(plan: FadePlan, mut apply: A, on_complete: C) -> Self
    where
        A: FnMut(f32) -> bool + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let task_cancel = cancel.clone();
        let done_guard = finished.clone().drop_guard();

        let task = tokio::spawn(async move {
            let _done = done_guard;
            let mut ticker = tokio::time::interval(plan.tick_interval());
            // First tick of an interval fires immediately.
            ticker.tick().await;

            for step in 1..=plan.steps {
                tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => {
                        debug!(step, "fade superseded");
                        return;
                    }
                    _ = ticker.tick() => {}
                }
                if !apply(plan.volume_at(step)) {
                    debug!(step, "fade abandoned");
                    return;
                }
            }
            on_complete();
        });

        Self {
            cancel,
            finished,
            task,
        }
    }

    /// Whether the transition has stopped ticking (completed or cancelled).
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled() || self.task.is_finished()
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Holds at most one active transition.
#[derive(Default)]
pub struct TransitionSlot {
    active: Mutex<Option<Transition>>,
}

impl TransitionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `next`, cancelling whatever was running.
    pub fn replace(&self, next: Transition) {
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = active.replace(next) {
            previous.cancel();
        }
    }

    /// Cancel the active transition, if any.
    pub fn cancel(&self) {
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = active.take() {
            previous.cancel();
        }
    }

    /// Whether a transition is still ticking.
    pub fn is_active(&self) -> bool {
        match self.active.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|t| !t.is_finished()),
            Err(poisoned) => poisoned.into_inner().as_ref().is_some_and(|t| !t.is_finished()),
        }
    }

    /// Wait until no transition is ticking, including ones installed while waiting.
    pub async fn wait_idle(&self) {
        loop {
            let pending = {
                let active = match self.active.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                active
                    .as_ref()
                    .filter(|t| !t.is_finished())
                    .map(|t| t.finished.clone())
            };
            match pending {
                Some(finished) => finished.cancelled().await,
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn plan(from: f32, to: f32, steps: u32, ms: u64) -> FadePlan {
        FadePlan {
            from,
            to,
            steps,
            duration: Duration::from_millis(ms),
        }
    }

    #[test]
    fn volume_steps_are_linear() {
        let p = plan(0.0, 1.0, 4, 400);
        assert_eq!(p.volume_at(0), 0.0);
        assert_eq!(p.volume_at(1), 0.25);
        assert_eq!(p.volume_at(2), 0.5);
        assert_eq!(p.volume_at(4), 1.0);
        assert_eq!(p.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn volume_is_clamped() {
        let p = plan(0.5, 1.8, 2, 100);
        assert_eq!(p.volume_at(2), 1.0);
        let p = plan(0.2, -0.5, 2, 100);
        assert_eq!(p.volume_at(2), 0.0);
    }

    #[test]
    fn zero_duration_is_instant() {
        assert!(plan(0.0, 1.0, 10, 0).is_instant());
        assert!(plan(0.0, 1.0, 0, 100).is_instant());
        assert!(!plan(0.0, 1.0, 10, 100).is_instant());
    }

    #[tokio::test(start_paused = true)]
    async fn transition_applies_every_step_then_completes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(AtomicBool::new(false));
        let slot = TransitionSlot::new();

        let seen_clone = Arc::clone(&seen);
        let completed_clone = Arc::clone(&completed);
        slot.replace(Transition::spawn(
            plan(0.0, 1.0, 4, 400),
            move |v| {
                seen_clone.lock().unwrap().push(v);
                true
            },
            move || completed_clone.store(true, Ordering::SeqCst),
        ));

        slot.wait_idle().await;
        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.5, 0.75, 1.0]);
        assert!(completed.load(Ordering::SeqCst));
        assert!(!slot.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_suppresses_remaining_ticks() {
        let first_ticks = Arc::new(Mutex::new(Vec::new()));
        let first_completed = Arc::new(AtomicBool::new(false));
        let slot = TransitionSlot::new();

        let ticks = Arc::clone(&first_ticks);
        let done = Arc::clone(&first_completed);
        slot.replace(Transition::spawn(
            plan(0.0, 1.0, 10, 1000),
            move |v| {
                ticks.lock().unwrap().push(v);
                true
            },
            move || done.store(true, Ordering::SeqCst),
        ));

        tokio::time::sleep(Duration::from_millis(250)).await;
        let ticks_before = first_ticks.lock().unwrap().len();

        slot.replace(Transition::spawn(plan(0.2, 0.0, 2, 100), |_| true, || {}));
        slot.wait_idle().await;
        tokio::time::sleep(Duration::from_millis(2000)).await;

        assert_eq!(first_ticks.lock().unwrap().len(), ticks_before);
        assert!(!first_completed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn apply_returning_false_skips_completion() {
        let completed = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&completed);
        let slot = TransitionSlot::new();
        slot.replace(Transition::spawn(
            plan(0.0, 1.0, 5, 500),
            |_| false,
            move || done.store(true, Ordering::SeqCst),
        ));
        slot.wait_idle().await;
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn wait_idle_on_empty_slot_returns() {
        TransitionSlot::new().wait_idle().await;
    }
}
