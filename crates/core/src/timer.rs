use chrono::{DateTime, Duration, Utc};

/// Which timer a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Advances past the outcome screen after a fixed delay.
    AutoContinue,
    /// Ends the live problem when its time limit runs out.
    TimeLimit,
}

/// Handle given to the host when a timer is armed.
///
/// A token only fires if its epoch still matches the slot; every arm,
/// cancel, or suspend bumps the epoch so older tokens become no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    kind: TimerKind,
    epoch: u64,
}

impl TimerToken {
    #[must_use]
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// An armed timer as seen by the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub token: TimerToken,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Idle,
    Armed { deadline: DateTime<Utc> },
    Suspended { remaining: Duration },
}

/// Cancellable single-shot timer with an epoch guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSlot {
    kind: TimerKind,
    epoch: u64,
    state: SlotState,
}

impl TimerSlot {
    #[must_use]
    pub fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            epoch: 0,
            state: SlotState::Idle,
        }
    }

    #[must_use]
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Arm (or re-arm) the timer, invalidating any earlier token.
    pub fn arm(&mut self, now: DateTime<Utc>, delay: Duration) -> TimerToken {
        self.epoch = self.epoch.wrapping_add(1);
        self.state = SlotState::Armed {
            deadline: now + delay.max(Duration::zero()),
        };
        self.current_token()
    }

    /// Disarm; pending tokens become stale.
    pub fn cancel(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.state = SlotState::Idle;
    }

    /// Stop the countdown but remember the time left. Returns `false` if the
    /// timer was not armed.
    pub fn suspend(&mut self, now: DateTime<Utc>) -> bool {
        let SlotState::Armed { deadline } = self.state else {
            return false;
        };
        self.epoch = self.epoch.wrapping_add(1);
        self.state = SlotState::Suspended {
            remaining: (deadline - now).max(Duration::zero()),
        };
        true
    }

    /// Re-arm a suspended timer with its remaining time.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Option<TimerToken> {
        let SlotState::Suspended { remaining } = self.state else {
            return None;
        };
        Some(self.arm(now, remaining))
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        matches!(self.state, SlotState::Armed { .. })
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        matches!(self.state, SlotState::Suspended { .. })
    }

    #[must_use]
    pub fn armed(&self) -> Option<ArmedTimer> {
        match self.state {
            SlotState::Armed { deadline } => Some(ArmedTimer {
                token: self.current_token(),
                deadline,
            }),
            _ => None,
        }
    }

    /// Remaining time while armed or suspended.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.state {
            SlotState::Idle => None,
            SlotState::Armed { deadline } => Some((deadline - now).max(Duration::zero())),
            SlotState::Suspended { remaining } => Some(remaining),
        }
    }

    /// Token of an armed timer whose deadline has passed.
    #[must_use]
    pub fn due(&self, now: DateTime<Utc>) -> Option<TimerToken> {
        self.armed()
            .filter(|armed| now >= armed.deadline)
            .map(|armed| armed.token)
    }

    /// Consume a firing token. Returns `true` only for the live token of an
    /// armed timer; the slot is then idle.
    pub fn accept(&mut self, token: TimerToken) -> bool {
        if token.kind != self.kind || token.epoch != self.epoch || !self.is_armed() {
            return false;
        }
        self.state = SlotState::Idle;
        true
    }

    fn current_token(&self) -> TimerToken {
        TimerToken {
            kind: self.kind,
            epoch: self.epoch,
        }
    }
}
