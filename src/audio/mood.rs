//! Mood-reactive ambient audio.
//!
//! Owns one looping track and moves its volume toward a per-emotion target
//! through [`fade`](super::fade) transitions. A later fade always supersedes
//! an earlier one: every fade takes a generation number under the state lock,
//! and a tick is only written if its generation is still current.
//!
//! The engine counts as stopped from the moment `stop` is called. A mood
//! change during the fade-out only records the target, and the next `start`
//! fades from the baseline toward it.

use super::fade::{FadePlan, Transition, TransitionSlot};
use super::output::AmbientOutput;
use crate::config::AmbientConfig;
use crate::emotion::Emotion;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct MoodState {
    current: f32,
    target: f32,
    playing: bool,
    generation: u64,
}

/// Ambient audio layer that follows the conversation's emotional tone.
///
/// Without an output every operation is a no-op.
pub struct AudioMoodEngine {
    output: Option<Arc<dyn AmbientOutput>>,
    state: Arc<Mutex<MoodState>>,
    fades: TransitionSlot,
    config: AmbientConfig,
}

impl AudioMoodEngine {
    pub fn new(output: Option<Arc<dyn AmbientOutput>>, config: AmbientConfig) -> Self {
        let baseline = config.baseline_volume.clamp(0.0, 1.0);
        if output.is_none() {
            info!("no ambient output available; mood audio disabled");
        }
        Self {
            output,
            state: Arc::new(Mutex::new(MoodState {
                current: 0.0,
                target: baseline,
                playing: false,
                generation: 0,
            })),
            fades: TransitionSlot::new(),
            config,
        }
    }

    /// An engine with no output device.
    pub fn silent(config: AmbientConfig) -> Self {
        Self::new(None, config)
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    pub fn current_volume(&self) -> f32 {
        lock(&self.state).current
    }

    pub fn target_volume(&self) -> f32 {
        lock(&self.state).target
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    /// Volume mapped to `emotion` by the configured table.
    pub fn volume_for(&self, emotion: Emotion) -> f32 {
        self.config.volume_for(emotion)
    }

    /// Begin looped playback at the baseline volume, cancelling any fade.
    ///
    /// If a mood was recorded while stopped, fades toward it from there.
    pub fn start(&self) {
        let Some(output) = self.output.as_ref() else {
            return;
        };
        let baseline = self.config.baseline_volume.clamp(0.0, 1.0);
        self.fades.cancel();
        let resume = {
            let mut st = lock(&self.state);
            st.generation += 1;
            st.current = baseline;
            output.set_volume(baseline);
            match output.play() {
                Ok(()) => st.playing = true,
                Err(e) => {
                    warn!("ambient playback failed to start: {e}");
                    st.playing = false;
                }
            }
            (st.playing && (st.target - baseline).abs() > f32::EPSILON).then(|| {
                (
                    self.plan(baseline, st.target, self.config.retarget_fade_ms),
                    st.generation,
                )
            })
        };
        info!(volume = baseline, "ambient audio started");

        if let Some((plan, generation)) = resume {
            debug!(volume = plan.to, "resuming recorded mood");
            self.run_fade(plan, generation, || {});
        }
    }

    /// Fade to silence over `fade_ms`, then pause playback.
    ///
    /// `is_playing` turns false immediately; later retargets cannot revive
    /// the fade-out.
    pub fn stop(&self, fade_ms: u64) {
        let Some(output) = self.output.as_ref() else {
            return;
        };
        let (plan, generation) = {
            let mut st = lock(&self.state);
            st.generation += 1;
            st.playing = false;
            (self.plan(st.current, 0.0, fade_ms), st.generation)
        };
        info!(fade_ms, "ambient audio stopping");

        let state = Arc::clone(&self.state);
        let output = Arc::clone(output);
        let finish = move || {
            let mut st = lock(&state);
            if st.generation == generation {
                st.current = 0.0;
                st.playing = false;
                output.set_volume(0.0);
                output.pause();
            }
        };
        self.run_fade(plan, generation, finish);
    }

    /// Move toward the volume mapped to `emotion` over `fade_ms`.
    ///
    /// The target is always recorded; the fade only runs while playing, so a
    /// fade-out in progress is left alone.
    /// Returns the target, or `None` when there is no output.
    pub fn retarget(&self, emotion: Emotion, fade_ms: u64) -> Option<f32> {
        self.output.as_ref()?;
        let target = self.volume_for(emotion);
        let fade = {
            let mut st = lock(&self.state);
            st.target = target;
            if st.playing {
                st.generation += 1;
                Some((self.plan(st.current, target, fade_ms), st.generation))
            } else {
                None
            }
        };
        debug!(%emotion, target, "ambient retarget");

        if let Some((plan, generation)) = fade {
            self.run_fade(plan, generation, || {});
        }
        Some(target)
    }

    /// Wait until no fade is in flight.
    pub async fn settle(&self) {
        self.fades.wait_idle().await;
    }

    fn plan(&self, from: f32, to: f32, fade_ms: u64) -> FadePlan {
        FadePlan {
            from,
            to,
            steps: self.config.fade_steps,
            duration: Duration::from_millis(fade_ms),
        }
    }

    fn run_fade<C>(&self, plan: FadePlan, generation: u64, on_complete: C)
    where
        C: FnOnce() + Send + 'static,
    {
        let Some(output) = self.output.as_ref() else {
            return;
        };

        let apply = {
            let state = Arc::clone(&self.state);
            let output = Arc::clone(output);
            move |volume: f32| -> bool {
                let mut st = lock(&state);
                if st.generation != generation {
                    return false;
                }
                st.current = volume;
                output.set_volume(volume);
                true
            }
        };

        if plan.is_instant() || tokio::runtime::Handle::try_current().is_err() {
            self.fades.cancel();
            if apply(plan.volume_at(plan.steps)) {
                on_complete();
            }
            return;
        }

        self.fades.replace(Transition::spawn(plan, apply, on_complete));
    }
}

fn lock(state: &Mutex<MoodState>) -> MutexGuard<'_, MoodState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
