//! Unrest driven by low satisfaction.
//!
//! A stable settlement starts protesting when satisfaction falls below
//! [`UNREST_THRESHOLD`]. Protests count down while satisfaction stays low and
//! end in loss of control once the timer runs out.

pub const UNREST_THRESHOLD: f64 = 30.0;
/// Timer for a settlement whose satisfaction collapsed to zero.
pub const RIOT_TIMER_SECONDS: f64 = 60.0;
pub const PROTEST_TIMER_SECONDS: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtestState {
    Stable,
    Protesting(f64),
    LostControl,
}

impl ProtestState {
    /// Reads the persisted timer. A timer at or below zero is not a protest.
    pub fn from_timer(timer: Option<f64>) -> Self {
        match timer {
            Some(remaining) if remaining > 0.0 => ProtestState::Protesting(remaining),
            _ => ProtestState::Stable,
        }
    }

    pub fn timer(self) -> Option<f64> {
        match self {
            ProtestState::Protesting(remaining) => Some(remaining),
            ProtestState::Stable | ProtestState::LostControl => None,
        }
    }

    pub fn is_protesting(self) -> bool {
        matches!(self, ProtestState::Protesting(_))
    }

    /// Advances the state given this tick's (already clamped) satisfaction.
    ///
    /// Collapse to zero is checked before the general threshold, so a stable
    /// settlement hitting zero always gets the short timer.
    pub fn next(self, satisfaction: f64, elapsed_seconds: f64) -> Self {
        match self {
            ProtestState::Stable if satisfaction <= 0.0 => {
                ProtestState::Protesting(RIOT_TIMER_SECONDS)
            }
            ProtestState::Stable if satisfaction < UNREST_THRESHOLD => {
                ProtestState::Protesting(PROTEST_TIMER_SECONDS)
            }
            ProtestState::Stable => ProtestState::Stable,
            ProtestState::Protesting(_) if satisfaction >= UNREST_THRESHOLD => ProtestState::Stable,
            ProtestState::Protesting(remaining) => {
                let remaining = remaining - elapsed_seconds;
                if remaining <= 0.0 {
                    ProtestState::LostControl
                } else {
                    ProtestState::Protesting(remaining)
                }
            }
            ProtestState::LostControl => ProtestState::LostControl,
        }
    }
}
