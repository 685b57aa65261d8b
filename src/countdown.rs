//! Pre-game countdown timer sequence.
//!
//! A [`Countdown`] is a fixed schedule of steps measured from the moment the
//! `AboutToStart` frame arrived. It does not sleep on its own: the client loop
//! asks for [`next_deadline`](Countdown::next_deadline), sleeps until then, and
//! calls [`fire_due`](Countdown::fire_due). Replacing the `Countdown` value
//! cancels every step that has not fired yet.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// One visible step of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    /// Show the given label ("3", "2", "1", "Go!").
    Tick(&'static str),
    /// Hide the countdown surface.
    Hide,
}

/// Offsets from the start of the countdown, in firing order.
pub const COUNTDOWN_SCHEDULE: [(Duration, CountdownStep); 5] = [
    (Duration::from_millis(500), CountdownStep::Tick("3")),
    (Duration::from_millis(1500), CountdownStep::Tick("2")),
    (Duration::from_millis(2500), CountdownStep::Tick("1")),
    (Duration::from_millis(3500), CountdownStep::Tick("Go!")),
    (Duration::from_millis(4000), CountdownStep::Hide),
];

/// Labels shown during the countdown, in order.
pub fn tick_labels() -> Vec<&'static str> {
    COUNTDOWN_SCHEDULE
        .iter()
        .filter_map(|(_, step)| match step {
            CountdownStep::Tick(label) => Some(*label),
            CountdownStep::Hide => None,
        })
        .collect()
}

/// A running countdown. Dropping it cancels the remaining steps.
#[derive(Debug, Clone)]
pub struct Countdown {
    pending: VecDeque<(Instant, CountdownStep)>,
}

impl Countdown {
    /// Schedule the full sequence relative to `started_at`.
    pub fn start(started_at: Instant) -> Self {
        let pending = COUNTDOWN_SCHEDULE
            .iter()
            .map(|(offset, step)| (started_at + *offset, *step))
            .collect();
        Self { pending }
    }

    /// When the next step is due, or `None` once the sequence has finished.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.front().map(|(at, _)| *at)
    }

    /// Pop every step due at or before `now`, in order.
    pub fn fire_due(&mut self, now: Instant) -> Vec<CountdownStep> {
        let mut fired = Vec::new();
        while let Some((at, step)) = self.pending.front().copied() {
            if at > now {
                break;
            }
            self.pending.pop_front();
            fired.push(step);
        }
        fired
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn nothing_fires_before_first_deadline() {
        let t0 = Instant::now();
        let mut countdown = Countdown::start(t0);
        assert!(countdown.fire_due(t0).is_empty());
        assert!(countdown
            .fire_due(t0 + Duration::from_millis(499))
            .is_empty());
        assert_eq!(countdown.next_deadline(), Some(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn steps_fire_in_schedule_order() {
        let t0 = Instant::now();
        let mut countdown = Countdown::start(t0);

        assert_eq!(
            countdown.fire_due(t0 + Duration::from_millis(500)),
            vec![CountdownStep::Tick("3")]
        );
        assert_eq!(
            countdown.fire_due(t0 + Duration::from_millis(3500)),
            vec![
                CountdownStep::Tick("2"),
                CountdownStep::Tick("1"),
                CountdownStep::Tick("Go!")
            ]
        );
        assert!(!countdown.is_finished());
        assert_eq!(
            countdown.fire_due(t0 + Duration::from_millis(4000)),
            vec![CountdownStep::Hide]
        );
        assert!(countdown.is_finished());
        assert_eq!(countdown.next_deadline(), None);
    }

    #[test]
    fn late_poll_fires_everything_once() {
        let t0 = Instant::now();
        let mut countdown = Countdown::start(t0);
        let fired = countdown.fire_due(t0 + Duration::from_secs(10));
        assert_eq!(fired.len(), COUNTDOWN_SCHEDULE.len());
        assert!(countdown.fire_due(t0 + Duration::from_secs(20)).is_empty());
    }

    #[test]
    fn labels_exclude_hide_step() {
        assert_eq!(tick_labels(), vec!["3", "2", "1", "Go!"]);
    }
}
