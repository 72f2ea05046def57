//! Visibility of the control panel: shown on pointer activity, faded out
//! after a few idle seconds.

use std::time::{Duration, Instant};

/// Idle time after which visible controls fade out.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(3);
/// Duration of the show/hide fades.
pub const FADE_DURATION: Duration = Duration::from_millis(250);
/// Duration of the fade-out right after startup.
pub const STARTUP_FADE_DURATION: Duration = Duration::from_millis(1000);
/// Opacity of the panel while shown.
pub const VISIBLE_OPACITY: f32 = 224.0 / 255.0;
/// Opacity of the panel when the player opens.
pub const STARTUP_OPACITY: f32 = 238.0 / 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible,
}

/// Opacity tween with an ease-out-quint curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    from: f32,
    to: f32,
    start: Instant,
    duration: Duration,
}

impl Fade {
    pub fn new(from: f32, to: f32, start: Instant, duration: Duration) -> Self {
        Fade {
            from,
            to,
            start,
            duration,
        }
    }

    /// A fade that has already settled on `value`.
    pub fn settled(value: f32, now: Instant) -> Self {
        Fade::new(value, value, now, Duration::ZERO)
    }

    pub fn value(&self, now: Instant) -> f32 {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.to;
        }
        self.from + (self.to - self.from) * ease_out_quint(t)
    }

    pub fn is_done(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }

    fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }
}

fn ease_out_quint(t: f32) -> f32 {
    1.0 - (1.0 - t).powi(5)
}

/// Two-state visibility machine with a debounced idle timer.
#[derive(Debug, Clone)]
pub struct Controls {
    visibility: Visibility,
    hide_at: Option<Instant>,
    fade: Fade,
}

impl Controls {
    /// Controls start hidden, fading out of the initial panel opacity.
    pub fn new(now: Instant) -> Self {
        Controls {
            visibility: Visibility::Hidden,
            hide_at: None,
            fade: Fade::new(STARTUP_OPACITY, 0.0, now, STARTUP_FADE_DURATION),
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    /// Shows the controls, or pushes the idle deadline back if they already are.
    pub fn show(&mut self, now: Instant) {
        self.hide_at = Some(now + IDLE_TIMEOUT);
        if self.visibility == Visibility::Visible {
            return;
        }
        self.visibility = Visibility::Visible;
        self.fade = Fade::new(self.fade.value(now), VISIBLE_OPACITY, now, FADE_DURATION);
    }

    pub fn hide(&mut self, now: Instant) {
        self.hide_at = None;
        if self.visibility == Visibility::Hidden {
            return;
        }
        self.visibility = Visibility::Hidden;
        self.fade = Fade::new(self.fade.value(now), 0.0, now, FADE_DURATION);
    }

    /// Hides the controls once the idle deadline passed.
    pub fn update(&mut self, now: Instant) {
        if let Some(hide_at) = self.hide_at {
            if now >= hide_at {
                self.hide(now);
            }
        }
    }

    pub fn opacity(&self, now: Instant) -> f32 {
        self.fade.value(now)
    }

    pub fn is_animating(&self, now: Instant) -> bool {
        !self.fade.is_done(now)
    }
}
