// ── Poll scheduling state ──
//
// Pure state machine for the poll interval. The coordinator owns one
// instance behind a `watch` channel and is the only writer.

use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntervalMode {
    Normal,
    Cooldown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerState {
    pub mode: IntervalMode,
    /// Earliest moment a non-poll API call may run again.
    pub cooldown_until: Option<Instant>,
    pub consecutive_failures: u32,
    /// When the next poll cycle is due. `None` before the loop starts.
    pub next_cycle_at: Option<Instant>,
    /// Completed poll cycles.
    pub cycles: u64,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            mode: IntervalMode::Normal,
            cooldown_until: None,
            consecutive_failures: 0,
            next_cycle_at: None,
            cycles: 0,
        }
    }
}

impl SchedulerState {
    pub fn is_cooling_down(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Time left in the current cooldown.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Switch to cooldown after an account-wide failure.
    ///
    /// Re-arms the cooldown timer when already cooling down.
    pub fn enter_cooldown(&mut self, now: Instant, cooldown: Duration) {
        self.record_failure();
        self.mode = IntervalMode::Cooldown;
        self.cooldown_until = Some(now + cooldown);
    }

    /// Close a cycle that stopped early on an account-wide failure.
    pub fn abort_cycle(&mut self, now: Instant, cooldown: Duration) {
        self.cycles += 1;
        self.enter_cooldown(now, cooldown);
    }

    /// Close a cycle that visited every device.
    ///
    /// Returns `true` when this cycle left cooldown, which takes a
    /// success for every device. A partial cycle during cooldown re-arms
    /// the cooldown timer.
    pub fn finish_cycle(
        &mut self,
        succeeded: usize,
        failed: usize,
        now: Instant,
        cooldown: Duration,
    ) -> bool {
        self.cycles += 1;
        if succeeded > 0 {
            self.record_success();
        } else if failed > 0 {
            self.record_failure();
        }

        match self.mode {
            IntervalMode::Cooldown if failed == 0 => {
                self.mode = IntervalMode::Normal;
                self.cooldown_until = None;
                true
            }
            IntervalMode::Cooldown => {
                self.cooldown_until = Some(now + cooldown);
                false
            }
            IntervalMode::Normal => false,
        }
    }

    /// Interval until the next cycle in the current mode.
    pub fn interval(&self, normal: Duration, cooldown: Duration) -> Duration {
        match self.mode {
            IntervalMode::Normal => normal,
            IntervalMode::Cooldown => cooldown,
        }
    }
}
