//! Per-message dispatch state machine.
//!
//! Every routed message moves `Received -> Matched -> Dispatched`, or ends
//! `Unrouted` when no rule applies or no target converts.

use serde::{Deserialize, Serialize};

/// Dispatch states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchState {
    /// Message accepted, no rule evaluated yet.
    Received,
    /// At least one routing rule matched.
    Matched,
    /// Terminal: at least one dispatch record produced.
    Dispatched,
    /// Terminal: nothing was produced.
    Unrouted,
}

impl DispatchState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dispatched | Self::Unrouted)
    }

    /// Get valid transitions from current state.
    pub fn valid_transitions(&self) -> &'static [DispatchState] {
        match self {
            Self::Received => &[Self::Matched, Self::Unrouted],
            Self::Matched => &[Self::Dispatched, Self::Unrouted],
            Self::Dispatched => &[],
            Self::Unrouted => &[],
        }
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: DispatchState) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Apply an event; invalid transitions leave the state unchanged.
    pub fn on_event(self, event: &DispatchEvent) -> DispatchState {
        let target = match event {
            DispatchEvent::RuleMatched { .. } if self == Self::Matched => return self,
            DispatchEvent::RuleMatched { .. } => Self::Matched,
            DispatchEvent::Converted { .. } if self == Self::Dispatched => return self,
            DispatchEvent::Converted { .. } => Self::Dispatched,
            DispatchEvent::Exhausted => {
                if self == Self::Matched || self == Self::Received {
                    Self::Unrouted
                } else {
                    return self;
                }
            }
        };
        if self.can_transition_to(target) {
            tracing::debug!(from = ?self, to = ?target, "dispatch transition");
            target
        } else {
            tracing::debug!(from = ?self, to = ?target, "ignored dispatch transition");
            self
        }
    }
}

/// Events that drive dispatch transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// A routing rule's pattern and condition held.
    RuleMatched { pattern: String },
    /// A target message was produced.
    Converted { target: String },
    /// All rules evaluated.
    Exhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(DispatchState::Dispatched.is_terminal());
        assert!(DispatchState::Unrouted.is_terminal());
        assert!(!DispatchState::Received.is_terminal());
        assert!(!DispatchState::Matched.is_terminal());
    }

    #[test]
    fn valid_transitions() {
        assert!(DispatchState::Received.can_transition_to(DispatchState::Matched));
        assert!(DispatchState::Received.can_transition_to(DispatchState::Unrouted));
        assert!(!DispatchState::Received.can_transition_to(DispatchState::Dispatched));
        assert!(DispatchState::Matched.can_transition_to(DispatchState::Dispatched));
        assert!(!DispatchState::Dispatched.can_transition_to(DispatchState::Received));
    }

    #[test]
    fn routed_path() {
        let matched = DispatchEvent::RuleMatched {
            pattern: "J2\\.\\d+".to_string(),
        };
        let converted = DispatchEvent::Converted {
            target: "MAVLink".to_string(),
        };
        let state = DispatchState::Received
            .on_event(&matched)
            .on_event(&matched)
            .on_event(&converted)
            .on_event(&converted)
            .on_event(&DispatchEvent::Exhausted);
        assert_eq!(state, DispatchState::Dispatched);
    }

    #[test]
    fn unrouted_paths() {
        assert_eq!(
            DispatchState::Received.on_event(&DispatchEvent::Exhausted),
            DispatchState::Unrouted
        );
        let matched = DispatchState::Received.on_event(&DispatchEvent::RuleMatched {
            pattern: "X".to_string(),
        });
        assert_eq!(matched.on_event(&DispatchEvent::Exhausted), DispatchState::Unrouted);
    }

    #[test]
    fn conversion_before_match_is_ignored() {
        let state = DispatchState::Received.on_event(&DispatchEvent::Converted {
            target: "MQTT".to_string(),
        });
        assert_eq!(state, DispatchState::Received);
    }

    #[test]
    fn serializes_screaming_case() {
        assert_eq!(
            serde_json::to_string(&DispatchState::Unrouted).unwrap(),
            "\"UNROUTED\""
        );
    }
}
