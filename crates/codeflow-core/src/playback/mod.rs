//! Playback state machine for stepping through a recorded trace.
//!
//! [`PlaybackController`] owns "which step is active" and is purely
//! synchronous; [`Player`] drives it from a tokio timer while playing.
//!
//! ```text
//!   load ──> Paused ──play──> Playing ──tick at last step──> Paused
//!              ^                 │
//!              └──────pause──────┘
//! ```

mod timer;

pub use timer::Player;

use serde::Serialize;

use crate::model::Step;

pub const MIN_SPEED_MS: u64 = 100;
pub const MAX_SPEED_MS: u64 = 3000;
pub const DEFAULT_SPEED_MS: u64 = 800;

/// Snapshot of the controller, as published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_index: usize,
    pub step_count: usize,
    pub is_playing: bool,
    pub speed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaybackController {
    step_count: usize,
    index: usize,
    playing: bool,
    speed_ms: u64,
    error: Option<(String, Option<u32>)>,
    validation: Option<String>,
}

impl Default for PlaybackController {
    fn default() -> Self {
        PlaybackController {
            step_count: 0,
            index: 0,
            playing: false,
            speed_ms: DEFAULT_SPEED_MS,
            error: None,
            validation: None,
        }
    }
}

impl PlaybackController {
    pub fn new(step_count: usize) -> Self {
        let mut controller = PlaybackController::default();
        controller.load(step_count);
        controller
    }

    /// Switches to a new trace (or lesson): index 0, paused, displays
    /// cleared. Speed carries over.
    pub fn load(&mut self, step_count: usize) {
        self.step_count = step_count;
        self.index = 0;
        self.playing = false;
        self.error = None;
        self.validation = None;
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed_ms(&self) -> u64 {
        self.speed_ms
    }

    fn last_index(&self) -> usize {
        self.step_count.saturating_sub(1)
    }

    pub fn is_at_end(&self) -> bool {
        self.index >= self.last_index()
    }

    /// Starts playing. A no-op at the last step or with nothing loaded.
    pub fn play(&mut self) {
        if self.step_count > 1 && !self.is_at_end() {
            self.playing = true;
        }
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn toggle(&mut self) {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Timer callback: advances one step while playing and stops at the last
    /// step. Returns whether the index moved.
    pub fn tick(&mut self) -> bool {
        if !self.playing {
            return false;
        }
        if self.is_at_end() {
            self.playing = false;
            return false;
        }
        self.index += 1;
        if self.is_at_end() {
            self.playing = false;
        }
        true
    }

    pub fn next(&mut self) {
        self.seek(self.index.saturating_add(1));
    }

    pub fn prev(&mut self) {
        self.seek(self.index.saturating_sub(1));
    }

    /// Moves to `index`, clamped to the loaded range.
    pub fn seek(&mut self, index: usize) {
        self.index = index.min(self.last_index());
        if self.is_at_end() {
            self.playing = false;
        }
    }

    /// Back to the first step, paused, with error and validation cleared.
    pub fn reset(&mut self) {
        self.index = 0;
        self.playing = false;
        self.error = None;
        self.validation = None;
    }

    pub fn set_speed(&mut self, speed_ms: u64) {
        self.speed_ms = speed_ms.clamp(MIN_SPEED_MS, MAX_SPEED_MS);
    }

    pub fn show_error(&mut self, message: impl Into<String>, line: Option<u32>) {
        self.error = Some((message.into(), line));
    }

    pub fn show_validation(&mut self, message: impl Into<String>) {
        self.validation = Some(message.into());
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_ref().map(|(message, _)| message.as_str())
    }

    /// The line a code view should highlight: the displayed error's line,
    /// else the current step's line, else the last traced line.
    pub fn highlighted_line(&self, steps: &[Step]) -> Option<u32> {
        if let Some((_, Some(line))) = &self.error {
            return Some(*line);
        }
        steps
            .get(self.index)
            .or_else(|| steps.last())
            .map(|s| s.line)
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            current_index: self.index,
            step_count: self.step_count,
            is_playing: self.playing,
            speed_ms: self.speed_ms,
            error: self.error.as_ref().map(|(m, _)| m.clone()),
            error_line: self.error.as_ref().and_then(|(_, l)| *l),
            validation: self.validation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plays_to_the_end_and_stops() {
        let mut c = PlaybackController::new(3);
        c.play();
        assert!(c.is_playing());
        assert!(c.tick());
        assert!(c.tick());
        assert_eq!(c.current_index(), 2);
        assert!(!c.is_playing());
        assert!(!c.tick());
        assert_eq!(c.current_index(), 2);
    }

    #[test]
    fn play_at_last_step_is_a_no_op() {
        let mut c = PlaybackController::new(4);
        c.seek(3);
        c.play();
        assert!(!c.is_playing());
        assert_eq!(c.current_index(), 3);
    }

    #[test]
    fn empty_trace_never_plays() {
        let mut c = PlaybackController::new(0);
        c.play();
        c.next();
        assert!(!c.is_playing());
        assert_eq!(c.current_index(), 0);
        assert_eq!(c.highlighted_line(&[]), None);
    }

    #[test]
    fn load_resets_index_and_playing() {
        let mut c = PlaybackController::new(10);
        c.seek(5);
        c.play();
        c.show_validation("Test 1 failed");
        c.load(4);
        assert_eq!(c.current_index(), 0);
        assert!(!c.is_playing());
        assert!(c.state().validation.is_none());
    }

    #[test]
    fn reset_clears_displays() {
        let mut c = PlaybackController::new(5);
        c.seek(3);
        c.show_error("boom", Some(2));
        c.show_validation("Test 1 failed");
        c.reset();
        let state = c.state();
        assert_eq!(state.current_index, 0);
        assert!(state.error.is_none());
        assert!(state.validation.is_none());
    }

    #[test]
    fn speed_is_clamped() {
        let mut c = PlaybackController::default();
        assert_eq!(c.speed_ms(), DEFAULT_SPEED_MS);
        c.set_speed(5);
        assert_eq!(c.speed_ms(), MIN_SPEED_MS);
        c.set_speed(60_000);
        assert_eq!(c.speed_ms(), MAX_SPEED_MS);
    }

    #[test]
    fn highlighted_line_prefers_error_line() {
        let steps = vec![Step::line_only(1), Step::line_only(2)];
        let mut c = PlaybackController::new(steps.len());
        assert_eq!(c.highlighted_line(&steps), Some(1));
        c.next();
        assert_eq!(c.highlighted_line(&steps), Some(2));
        c.show_error("ZeroDivisionError", Some(7));
        assert_eq!(c.highlighted_line(&steps), Some(7));
        c.show_error("timeout", None);
        assert_eq!(c.highlighted_line(&steps), Some(2));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Next,
        Prev,
        Seek(usize),
        Play,
        Tick,
        Reset,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Next),
            Just(Op::Prev),
            (0usize..50).prop_map(Op::Seek),
            Just(Op::Play),
            Just(Op::Tick),
            Just(Op::Reset),
        ]
    }

    proptest! {
        #[test]
        fn index_stays_in_range(len in 0usize..20, ops in proptest::collection::vec(op(), 0..40)) {
            let mut c = PlaybackController::new(len);
            for op in ops {
                match op {
                    Op::Next => c.next(),
                    Op::Prev => c.prev(),
                    Op::Seek(i) => c.seek(i),
                    Op::Play => c.play(),
                    Op::Tick => { c.tick(); }
                    Op::Reset => c.reset(),
                }
                prop_assert!(c.current_index() <= len.saturating_sub(1));
                if c.is_playing() {
                    prop_assert!(!c.is_at_end());
                }
            }
        }
    }
}
