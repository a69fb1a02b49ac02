/// Attempt counter for the step currently being answered.
///
/// `max_attempts == 0` means unlimited retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTracker {
    attempts: u32,
    max_attempts: u32,
}

impl AttemptTracker {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.max_attempts == 0
    }

    #[must_use]
    pub fn has_retries_left(&self) -> bool {
        self.is_unlimited() || self.attempts < self.max_attempts
    }

    /// Remaining attempts, `None` when unlimited.
    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        (!self.is_unlimited()).then(|| self.max_attempts.saturating_sub(self.attempts))
    }

    /// Count one graded submission. Never exceeds a finite maximum.
    pub fn record_attempt(&mut self) {
        if self.is_unlimited() {
            self.attempts = self.attempts.saturating_add(1);
        } else {
            self.attempts = (self.attempts + 1).min(self.max_attempts);
        }
    }

    /// Treat the step as if every attempt was consumed (reveal).
    ///
    /// With unlimited attempts the count is left as-is.
    pub fn exhaust(&mut self) {
        if !self.is_unlimited() {
            self.attempts = self.max_attempts;
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
