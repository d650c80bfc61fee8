//! The timer state machine.
//!
//! A [`TimerCore`] is bound to an interval list and derives the
//! authoritative `(interval, remaining)` pair from a wall-clock baseline:
//! the moment the current run started, total accumulated pause time, and
//! the in-flight pause (if any). All mutation methods return a snapshot of
//! the public state so callers can broadcast it without a second read.
//!
//! An empty interval list behaves as a single virtual interval of the
//! default duration (25 minutes).

use crate::clock::SharedClock;
use cadence_protocol::fields::{clamp_remaining, DEFAULT_DURATION_MS};
use cadence_protocol::{Interval, TimerState};

/// Partial internal state, merged shallowly by [`TimerCore::set_state`].
///
/// Intended for tests and initial restoration; no re-baselining is applied.
#[derive(Debug, Clone, Default)]
pub struct TimerPatch {
    pub repeat: Option<bool>,
    pub interval: Option<usize>,
    pub remaining: Option<i64>,
    pub is_running: Option<bool>,
    pub is_paused: Option<bool>,
    pub started_interval: Option<usize>,
    pub started_at: Option<i64>,
    pub paused_at: Option<i64>,
    pub time_paused: Option<i64>,
}

/// The per-session timer state machine.
#[derive(Debug)]
pub struct TimerCore {
    items: Vec<Interval>,
    repeat: bool,
    interval: usize,
    remaining: i64,
    is_running: bool,
    is_paused: bool,
    /// Interval index at which the current run began.
    started_interval: usize,
    /// Wall-clock ms when the current run began; 0 when not running.
    started_at: i64,
    /// Wall-clock ms when paused; 0 when not paused.
    paused_at: i64,
    /// Accumulated pause time since `started_at`.
    time_paused: i64,
    clock: SharedClock,
}

impl TimerCore {
    /// Create a stopped timer bound to `items`.
    #[must_use]
    pub fn new(items: Vec<Interval>, clock: SharedClock) -> Self {
        let mut timer = Self {
            items,
            repeat: false,
            interval: 0,
            remaining: 0,
            is_running: false,
            is_paused: false,
            started_interval: 0,
            started_at: 0,
            paused_at: 0,
            time_paused: 0,
            clock,
        };
        timer.remaining = timer.initial_remaining();
        timer
    }

    /// The interval list the timer is bound to.
    #[must_use]
    pub fn items(&self) -> &[Interval] {
        &self.items
    }

    /// Snapshot of the public state.
    #[must_use]
    pub fn state(&self) -> TimerState {
        TimerState {
            repeat: self.repeat,
            interval: self.interval,
            remaining: self.remaining,
            is_running: self.is_running,
            is_paused: self.is_paused,
        }
    }

    /// Alias for [`TimerCore::state`], matching the mutator naming.
    #[must_use]
    pub fn get_state(&self) -> TimerState {
        self.state()
    }

    /// Start the timer, or resume it if it is paused.
    ///
    /// Starting an already-running timer preserves its baseline.
    pub fn start(&mut self) -> TimerState {
        if self.is_paused {
            return self.resume();
        }
        if !self.is_running {
            self.started_interval = self.interval;
            self.started_at = self.clock.now_ms();
            self.time_paused = 0;
        }
        self.is_running = true;
        self.is_paused = false;
        self.paused_at = 0;
        self.state()
    }

    /// Pause the timer. The timer stays "running" while paused.
    pub fn pause(&mut self) -> TimerState {
        self.is_paused = true;
        self.paused_at = self.clock.now_ms();
        self.state()
    }

    /// Fold the in-flight pause into `time_paused` and continue.
    pub fn resume(&mut self) -> TimerState {
        if self.is_paused {
            let now = self.clock.now_ms();
            if self.paused_at > 0 {
                self.time_paused += now - self.paused_at;
            }
            self.paused_at = 0;
            self.is_paused = false;
        }
        self.state()
    }

    /// Stop and fully reset to the first interval. `repeat` is preserved.
    pub fn stop(&mut self) -> TimerState {
        self.reset();
        self.state()
    }

    /// Toggle repeat, or set it when a value is given.
    pub fn repeat(&mut self, value: Option<bool>) -> TimerState {
        self.repeat = value.unwrap_or(!self.repeat);
        self.state()
    }

    /// Skip to the next interval, wrapping at the end of the list.
    ///
    /// A running timer is re-baselined onto the new interval; a stopped
    /// timer only moves the cursor.
    pub fn next(&mut self) -> TimerState {
        let len = self.items.len().max(1);
        self.interval = (self.interval + 1) % len;
        self.remaining = self.duration_ms(self.interval);

        if self.is_running {
            let now = self.clock.now_ms();
            self.started_interval = self.interval;
            self.started_at = now;
            self.time_paused = 0;
            self.paused_at = if self.is_paused { now } else { 0 };
        }
        self.state()
    }

    /// Reconcile elapsed wall time into the authoritative
    /// `(interval, remaining)` pair.
    ///
    /// Walks forward from the interval the run started in, consuming whole
    /// interval durations. Running past the last interval wraps when
    /// `repeat` is set and otherwise performs a full stop; `remaining` is
    /// never negative.
    pub fn sync(&mut self) -> TimerState {
        if !self.is_running || self.started_at == 0 || self.items.is_empty() {
            return self.state();
        }

        let now = self.clock.now_ms();
        // In-flight pause time not yet folded into time_paused.
        let offset = if self.is_paused && self.paused_at > 0 {
            now - self.paused_at
        } else {
            0
        };
        let mut elapsed = now - self.started_at - self.time_paused - offset;

        let len = self.items.len();
        let mut current = self.started_interval % len;
        loop {
            let duration = self.duration_ms(current).max(1);
            if elapsed < duration {
                break;
            }
            elapsed -= duration;
            current += 1;
            if current >= len {
                if self.repeat {
                    current = 0;
                } else {
                    self.reset();
                    return self.state();
                }
            }
        }

        self.interval = current;
        self.remaining = self.duration_ms(current) - elapsed;
        self.state()
    }

    /// Rebind the interval list, keeping the observed position valid.
    ///
    /// The timer is settled against the outgoing list first, since the
    /// stored pair is only as fresh as the last sync. A cursor past the
    /// end of a truncated list snaps back to the first interval, keeping
    /// the running/paused flags but taking a fresh baseline. Otherwise a
    /// running timer keeps its elapsed progress under the new duration,
    /// clamping to the full new duration only when less time fits than
    /// truly remained; time that was still left is never taken away.
    pub fn update_intervals(&mut self, items: Vec<Interval>) -> TimerState {
        // Settle (interval, remaining) before the old durations are lost.
        self.sync();

        let now = self.clock.now_ms();
        let old_duration = self.duration_ms(self.interval);
        self.items = items;

        if self.interval >= self.items.len() {
            self.interval = 0;
            self.started_interval = 0;
            self.remaining = self.initial_remaining();
            self.time_paused = 0;
            if self.started_at > 0 {
                self.started_at = now;
            }
            if self.paused_at > 0 {
                self.paused_at = now;
            }
            return self.state();
        }

        if self.is_running {
            let elapsed = old_duration - self.remaining;
            self.started_interval = self.interval;
            self.time_paused = 0;
            self.paused_at = if self.is_paused { now } else { 0 };

            let new_duration = self.duration_ms(self.interval);
            if self.remaining > new_duration {
                self.remaining = new_duration;
                self.started_at = now;
            } else {
                self.remaining = (new_duration - elapsed).max(self.remaining);
                self.started_at = now - (new_duration - self.remaining);
            }
        } else {
            self.remaining = self.duration_ms(self.interval);
        }
        self.state()
    }

    /// Import a peer's public view, rebuilding the internal baseline so a
    /// following [`TimerCore::sync`] reproduces the imported pair.
    pub fn update_state(&mut self, external: &TimerState) -> TimerState {
        let now = self.clock.now_ms();

        self.repeat = external.repeat;
        self.interval = external.interval;
        self.is_running = external.is_running;
        self.is_paused = external.is_paused;

        // A peer can echo a remaining that no longer fits this interval;
        // capping it keeps the baseline out of the future.
        let duration = self.duration_ms(self.interval);
        self.remaining = clamp_remaining(external.remaining).min(duration);

        let elapsed = duration - self.remaining;
        self.started_interval = self.interval;
        self.started_at = if self.is_running { now - elapsed } else { 0 };
        self.paused_at = if self.is_paused { now } else { 0 };
        self.time_paused = 0;
        self.state()
    }

    /// Shallow-merge internal state without re-baselining.
    pub fn set_state(&mut self, patch: TimerPatch) -> TimerState {
        if let Some(repeat) = patch.repeat {
            self.repeat = repeat;
        }
        if let Some(interval) = patch.interval {
            self.interval = interval;
        }
        if let Some(remaining) = patch.remaining {
            self.remaining = remaining;
        }
        if let Some(is_running) = patch.is_running {
            self.is_running = is_running;
        }
        if let Some(is_paused) = patch.is_paused {
            self.is_paused = is_paused;
        }
        if let Some(started_interval) = patch.started_interval {
            self.started_interval = started_interval;
        }
        if let Some(started_at) = patch.started_at {
            self.started_at = started_at;
        }
        if let Some(paused_at) = patch.paused_at {
            self.paused_at = paused_at;
        }
        if let Some(time_paused) = patch.time_paused {
            self.time_paused = time_paused;
        }
        self.state()
    }

    fn reset(&mut self) {
        self.interval = 0;
        self.remaining = self.initial_remaining();
        self.is_running = false;
        self.is_paused = false;
        self.started_interval = 0;
        self.started_at = 0;
        self.paused_at = 0;
        self.time_paused = 0;
    }

    /// Duration of interval `index` in ms, or the default for an index
    /// outside the list (including the empty-list case).
    fn duration_ms(&self, index: usize) -> i64 {
        self.items
            .get(index)
            .map(Interval::duration_ms)
            .unwrap_or(DEFAULT_DURATION_MS)
    }

    fn initial_remaining(&self) -> i64 {
        self.duration_ms(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    const T: i64 = 1_000_000;

    fn work_break_cycle() -> Vec<Interval> {
        vec![
            Interval::new("Work", 25),
            Interval::new("Break", 5),
            Interval::new("LongBreak", 15),
        ]
    }

    fn timer_at(start_ms: i64, items: Vec<Interval>) -> (TimerCore, Arc<ManualClock>) {
        let clock = ManualClock::shared(start_ms);
        let timer = TimerCore::new(items, clock.clone());
        (timer, clock)
    }

    #[test]
    fn test_basic_run_advances_and_stops() {
        // S1: plain run through the whole cycle.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.start();

        clock.set(T + 10_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 15_000));
        assert!(state.is_running);

        clock.set(T + 25_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (1, 5_000));

        clock.set(T + 45_000);
        let state = timer.sync();
        assert!(!state.is_running);
        assert!(!state.is_paused);
        assert_eq!((state.interval, state.remaining), (0, 25_000));
        assert_eq!(timer.started_at, 0);
        assert_eq!(timer.paused_at, 0);
        assert_eq!(timer.time_paused, 0);
        assert_eq!(timer.started_interval, 0);
    }

    #[test]
    fn test_repeat_wraps_to_first_interval() {
        // S2: 47s into a 45s cycle with repeat on lands 2s into Work.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.repeat(Some(true));
        timer.start();

        clock.set(T + 47_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 23_000));
        assert!(state.is_running);
        assert!(state.repeat);
    }

    #[test]
    fn test_pause_excludes_elapsed_time() {
        // S3: remaining freezes while paused and the pause is excluded
        // from elapsed after resume.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.start();

        clock.set(T + 5_000);
        timer.pause();

        clock.set(T + 8_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 20_000));
        assert!(state.is_running);
        assert!(state.is_paused);

        timer.resume();
        clock.set(T + 23_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 5_000));
        assert!(!state.is_paused);
    }

    #[test]
    fn test_pause_resume_matches_uninterrupted_run() {
        // Property 3: a pause of length delta shifts nothing else.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.start();
        clock.set(T + 12_000);
        timer.pause();
        clock.set(T + 19_000);
        timer.resume();
        clock.set(T + 19_000 + 13_000);
        let paused_run = timer.sync();

        let (mut baseline, clock) = timer_at(T, work_break_cycle());
        baseline.start();
        clock.set(T + 25_000);
        let straight_run = baseline.sync();

        assert_eq!(paused_run.interval, straight_run.interval);
        assert_eq!(paused_run.remaining, straight_run.remaining);
    }

    #[test]
    fn test_interval_growth_keeps_elapsed() {
        // S4: growing the active interval re-baselines against the new
        // duration without losing elapsed time.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.start();

        clock.set(T + 10_000);
        timer.update_intervals(vec![Interval::new("Work", 40)]);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 30_000));
    }

    #[test]
    fn test_interval_shrink_clamps_remaining() {
        // Shrinking below the remaining time clamps and restarts the
        // interval's baseline at now.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.start();

        clock.set(T + 5_000);
        timer.update_intervals(vec![Interval::new("Work", 10)]);
        assert_eq!(timer.state().remaining, 10_000);

        clock.set(T + 5_000 + 4_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 6_000));
    }

    #[test]
    fn test_shrink_after_quiet_window_keeps_progress() {
        // No sync() between start and the edit, so the stored remaining
        // is stale; the true position must be settled before comparing
        // against the new duration. 5s were left under the old 25s, which
        // still fits under the new 8s: the edit must not mint time.
        let (mut timer, clock) = timer_at(T, vec![Interval::new("Work", 25)]);
        timer.start();

        clock.set(T + 20_000);
        timer.update_intervals(vec![Interval::new("Work", 8)]);
        let state = timer.state();
        assert_eq!((state.interval, state.remaining), (0, 5_000));
        assert!(state.is_running);

        clock.set(T + 20_000 + 2_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 3_000));
    }

    #[test]
    fn test_growth_after_quiet_window_keeps_elapsed() {
        // Same quiet window, growing instead: elapsed progress carries
        // over against the new duration.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.start();

        clock.set(T + 20_000);
        timer.update_intervals(vec![Interval::new("Work", 40)]);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 20_000));
    }

    #[test]
    fn test_truncated_list_resets_cursor() {
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.start();

        // Run into the Break interval, then drop to a single interval.
        clock.set(T + 27_000);
        let state = timer.sync();
        assert_eq!(state.interval, 1);

        timer.update_intervals(vec![Interval::new("Solo", 20)]);
        let state = timer.state();
        assert_eq!((state.interval, state.remaining), (0, 20_000));
        assert!(state.is_running);

        // Fresh baseline: a full duration remains from now.
        clock.set(T + 27_000 + 8_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 12_000));
    }

    #[test]
    fn test_empty_items_is_a_virtual_default_interval() {
        // S5: an empty list never advances and keeps the default duration.
        let (mut timer, clock) = timer_at(T, Vec::new());
        assert_eq!(timer.state().remaining, DEFAULT_DURATION_MS);

        timer.start();
        clock.set(T + 60_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, DEFAULT_DURATION_MS));

        let state = timer.next();
        assert_eq!(state.interval, 0);
        assert_eq!(state.remaining, DEFAULT_DURATION_MS);
    }

    #[test]
    fn test_stop_resets_everything_but_repeat() {
        // Property 1.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.repeat(Some(true));
        timer.start();
        clock.set(T + 31_000);
        timer.sync();
        timer.pause();

        let state = timer.stop();
        assert!(state.repeat);
        assert!(!state.is_running);
        assert!(!state.is_paused);
        assert_eq!((state.interval, state.remaining), (0, 25_000));
        assert_eq!(timer.started_at, 0);
        assert_eq!(timer.paused_at, 0);
        assert_eq!(timer.time_paused, 0);
    }

    #[test]
    fn test_remaining_is_monotonic_within_interval() {
        // Property 2.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.start();

        let mut last = timer.state().remaining;
        for step in 1..=24 {
            clock.set(T + step * 1_000);
            let state = timer.sync();
            assert_eq!(state.interval, 0);
            assert!(state.remaining <= last);
            assert!(state.remaining >= 0);
            last = state.remaining;
        }
    }

    #[test]
    fn test_update_state_round_trips_through_sync() {
        // Property 4.
        let (mut timer, _clock) = timer_at(T, work_break_cycle());
        let external = TimerState {
            repeat: true,
            interval: 1,
            remaining: 3_200,
            is_running: true,
            is_paused: false,
        };
        timer.update_state(&external);
        let state = timer.sync();
        assert_eq!(state.interval, external.interval);
        assert!((state.remaining - external.remaining).abs() <= 1);
        assert!(state.is_running);
        assert!(state.repeat);
    }

    #[test]
    fn test_update_state_paused_holds_position() {
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        let external = TimerState {
            repeat: false,
            interval: 2,
            remaining: 9_000,
            is_running: true,
            is_paused: true,
        };
        timer.update_state(&external);

        clock.advance(6_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (2, 9_000));
        assert!(state.is_paused);
    }

    #[test]
    fn test_update_state_caps_remaining_to_interval_duration() {
        // A remaining larger than the bound interval's duration (a stale
        // client echo) must not push the baseline into the future.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        let external = TimerState {
            repeat: false,
            interval: 1,
            remaining: DEFAULT_DURATION_MS,
            is_running: true,
            is_paused: false,
        };
        timer.update_state(&external);
        assert_eq!(timer.started_at, T);

        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (1, 5_000));

        clock.advance(2_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (1, 3_000));
    }

    #[test]
    fn test_start_is_idempotent_while_running() {
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.start();
        let baseline = timer.started_at;

        clock.set(T + 7_000);
        timer.start();
        assert_eq!(timer.started_at, baseline);

        let state = timer.sync();
        assert_eq!(state.remaining, 18_000);
    }

    #[test]
    fn test_start_resumes_a_paused_timer() {
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.start();
        clock.set(T + 4_000);
        timer.pause();
        clock.set(T + 10_000);

        let state = timer.start();
        assert!(!state.is_paused);
        assert_eq!(timer.time_paused, 6_000);

        clock.set(T + 11_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 20_000));
    }

    #[test]
    fn test_next_rebaselines_only_when_running() {
        let (mut timer, clock) = timer_at(T, work_break_cycle());

        // Stopped: cursor moves, no baseline appears.
        let state = timer.next();
        assert_eq!((state.interval, state.remaining), (1, 5_000));
        assert_eq!(timer.started_at, 0);

        timer.start();
        clock.set(T + 2_000);
        let state = timer.next();
        assert_eq!((state.interval, state.remaining), (2, 15_000));
        assert_eq!(timer.started_at, T + 2_000);
        assert_eq!(timer.started_interval, 2);
    }

    #[test]
    fn test_pause_on_stopped_timer_is_tolerated() {
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        let state = timer.pause();
        assert!(state.is_paused);
        assert!(!state.is_running);
        assert_eq!(timer.paused_at, T);

        // sync leaves the degenerate state alone.
        clock.set(T + 9_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 25_000));
    }

    #[test]
    fn test_repeat_toggles_without_argument() {
        let (mut timer, _clock) = timer_at(T, work_break_cycle());
        assert!(!timer.state().repeat);
        assert!(timer.repeat(None).repeat);
        assert!(!timer.repeat(None).repeat);
        assert!(timer.repeat(Some(true)).repeat);
        assert!(timer.repeat(Some(true)).repeat);
    }

    #[test]
    fn test_set_state_merges_shallowly() {
        let (mut timer, _clock) = timer_at(T, work_break_cycle());
        timer.set_state(TimerPatch {
            interval: Some(2),
            remaining: Some(1_234),
            ..TimerPatch::default()
        });
        let state = timer.state();
        assert_eq!((state.interval, state.remaining), (2, 1_234));
        assert!(!state.is_running);
        assert_eq!(timer.started_at, 0);
    }

    #[test]
    fn test_long_multi_cycle_repeat() {
        // Three full 45s cycles plus 7s lands 7s into Work.
        let (mut timer, clock) = timer_at(T, work_break_cycle());
        timer.repeat(Some(true));
        timer.start();

        clock.set(T + 3 * 45_000 + 7_000);
        let state = timer.sync();
        assert_eq!((state.interval, state.remaining), (0, 18_000));
    }
}
