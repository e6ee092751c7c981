//! Alert debouncing.
//!
//! Turns the per-dispatch detection stream into an alert that stays visible for
//! at least `hold` after the most recent positive result. The hide timer is an
//! explicit deadline owned by the debouncer; `poll` fires it.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::detect::DetectResponse;

/// Hold window after the most recent qualifying detection.
pub const DEFAULT_ALERT_HOLD: Duration = Duration::from_millis(5000);

/// What makes a detection result count toward an alert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlertTrigger {
    /// Detections whose class equals the label.
    Class(String),
    /// Violation-classified detections (or the server's `violation_count`).
    Violations,
}

impl AlertTrigger {
    pub fn count(&self, response: &DetectResponse) -> u32 {
        match self {
            AlertTrigger::Class(label) => response.count_class(label),
            AlertTrigger::Violations => response.violations(),
        }
    }
}

/// Visible alert state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AlertState {
    pub count: u32,
    pub visible: bool,
}

impl AlertState {
    const HIDDEN: AlertState = AlertState {
        count: 0,
        visible: false,
    };
}

#[derive(Clone, Debug)]
pub struct AlertDebouncer {
    trigger: AlertTrigger,
    hold: Duration,
    state: AlertState,
    hide_at: Option<Instant>,
}

impl AlertDebouncer {
    pub fn new(trigger: AlertTrigger, hold: Duration) -> Self {
        Self {
            trigger,
            hold,
            state: AlertState::HIDDEN,
            hide_at: None,
        }
    }

    pub fn person(hold: Duration) -> Self {
        Self::new(AlertTrigger::Class(crate::detect::PERSON.to_string()), hold)
    }

    pub fn violations(hold: Duration) -> Self {
        Self::new(AlertTrigger::Violations, hold)
    }

    pub fn trigger(&self) -> &AlertTrigger {
        &self.trigger
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    /// True while a hide deadline is pending.
    pub fn timer_pending(&self) -> bool {
        self.hide_at.is_some()
    }

    /// Feed one successful detection result.
    pub fn on_detection_result(
        &mut self,
        now: Instant,
        zone_committed: bool,
        response: &DetectResponse,
    ) -> AlertState {
        self.poll(now);

        if !zone_committed {
            self.cancel();
            return self.state;
        }

        let count = self.trigger.count(response);
        if count > 0 {
            self.state = AlertState {
                count,
                visible: true,
            };
            self.hide_at = Some(now + self.hold);
        } else if self.state.visible && self.hide_at.is_none() {
            self.hide_at = Some(now + self.hold);
        }
        self.state
    }

    /// Fire the hide timer if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> AlertState {
        if let Some(deadline) = self.hide_at {
            if now >= deadline {
                self.hide_at = None;
                self.state = AlertState::HIDDEN;
            }
        }
        self.state
    }

    /// Hide immediately and drop any pending timer.
    pub fn cancel(&mut self) {
        self.hide_at = None;
        self.state = AlertState::HIDDEN;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, NO_HARDHAT, NO_MASK, PERSON};

    fn persons(n: usize) -> DetectResponse {
        DetectResponse {
            detections: (0..n)
                .map(|_| Detection::new(PERSON, 0.9, [0.0, 0.0, 10.0, 10.0]))
                .collect(),
            violation_count: None,
        }
    }

    fn ms(t0: Instant, millis: u64) -> Instant {
        t0 + Duration::from_millis(millis)
    }

    #[test]
    fn single_hit_holds_for_five_seconds() {
        let t0 = Instant::now();
        let mut alert = AlertDebouncer::person(DEFAULT_ALERT_HOLD);

        let state = alert.on_detection_result(t0, true, &persons(2));
        assert_eq!(
            state,
            AlertState {
                count: 2,
                visible: true
            }
        );

        for t in [1000, 2000, 3000, 4000] {
            assert!(alert.on_detection_result(ms(t0, t), true, &persons(0)).visible);
        }
        assert!(alert.poll(ms(t0, 4999)).visible);
        assert!(!alert.poll(ms(t0, 5000)).visible);
        assert!(!alert.timer_pending());
    }

    #[test]
    fn repeat_hit_refreshes_hold() {
        let t0 = Instant::now();
        let mut alert = AlertDebouncer::person(DEFAULT_ALERT_HOLD);

        alert.on_detection_result(t0, true, &persons(1));
        alert.on_detection_result(ms(t0, 3000), true, &persons(1));

        assert!(alert.poll(ms(t0, 5000)).visible);
        assert!(alert.poll(ms(t0, 7999)).visible);
        assert!(!alert.poll(ms(t0, 8000)).visible);
    }

    #[test]
    fn empty_results_do_not_restart_running_timer() {
        let t0 = Instant::now();
        let mut alert = AlertDebouncer::person(DEFAULT_ALERT_HOLD);

        alert.on_detection_result(t0, true, &persons(1));
        alert.on_detection_result(ms(t0, 4500), true, &persons(0));
        assert!(!alert.poll(ms(t0, 5000)).visible);
    }

    #[test]
    fn no_zone_forces_hidden_and_cancels_timer() {
        let t0 = Instant::now();
        let mut alert = AlertDebouncer::person(DEFAULT_ALERT_HOLD);

        alert.on_detection_result(t0, true, &persons(1));
        let state = alert.on_detection_result(ms(t0, 100), false, &persons(3));
        assert!(!state.visible);
        assert!(!alert.timer_pending());
    }

    #[test]
    fn cancel_hides_immediately_and_nothing_fires_later() {
        let t0 = Instant::now();
        let mut alert = AlertDebouncer::person(DEFAULT_ALERT_HOLD);

        alert.on_detection_result(t0, true, &persons(1));
        alert.cancel();
        assert!(!alert.state().visible);
        assert_eq!(alert.poll(ms(t0, 10_000)), AlertState::default());
    }

    #[test]
    fn violation_trigger_counts_violation_classes() {
        let t0 = Instant::now();
        let mut alert = AlertDebouncer::violations(DEFAULT_ALERT_HOLD);
        let response = DetectResponse {
            detections: vec![
                Detection::new(NO_HARDHAT, 0.8, [0.0; 4]),
                Detection::new(NO_MASK, 0.7, [0.0; 4]),
                Detection::new(PERSON, 0.9, [0.0; 4]),
            ],
            violation_count: None,
        };

        let state = alert.on_detection_result(t0, true, &response);
        assert_eq!(
            state,
            AlertState {
                count: 2,
                visible: true
            }
        );
    }

    #[test]
    fn expired_timer_fires_before_new_result_is_applied() {
        let t0 = Instant::now();
        let mut alert = AlertDebouncer::person(DEFAULT_ALERT_HOLD);

        alert.on_detection_result(t0, true, &persons(1));
        let state = alert.on_detection_result(ms(t0, 6000), true, &persons(0));
        assert!(!state.visible);
        assert!(!alert.timer_pending());
    }
}
