// Sign-up suppression policy
//
// The provider can auto-establish a live session on sign-up before the account
// has been confirmed. While the window is armed, every incoming auth event is
// forced to unauthenticated so the dashboard never flashes after self-service
// sign-up. The deadline is a heuristic, not a protocol guarantee: an event
// caused by the same sign-up can still arrive after it has elapsed.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// How long incoming auth events are ignored after sign-up
pub const SIGNUP_SUPPRESSION: Duration = Duration::from_millis(3000);

/// Process-wide "ignore incoming auth events until T" marker.
///
/// Armed only by the sign-up flow, read by every incoming auth event.
/// Re-arming replaces the deadline (last-write-wins, no stacking).
#[derive(Debug, Default)]
pub struct SuppressionWindow {
    deadline: Mutex<Option<Instant>>,
}

impl SuppressionWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the window: deadline = now + SIGNUP_SUPPRESSION
    pub fn mark(&self, now: Instant) {
        let mut deadline = self.deadline.lock().unwrap();
        *deadline = Some(now + SIGNUP_SUPPRESSION);
    }

    /// Whether `now` is strictly before the armed deadline
    pub fn is_suppressed(&self, now: Instant) -> bool {
        let deadline = self.deadline.lock().unwrap();
        matches!(*deadline, Some(d) if now < d)
    }
}
