//! Broker Process States
//!
//! The supervisor tracks every broker it launched in exactly one of these states.
//! The expected state transitions are:
//                +-----------+
//                |NotStarted |
//                +-----+-----+
//                      |
//                      v
//                +-----+-----+
//                |Starting   +--+
//                +-----+-----+  |   +--------+
//                      |        +-->+ Failed |
//                      v            +---+----+
//                +-----+-----+          |
//                |Running    |          |
//                +-----+-----+          |
//                      |                |
//                      v                |
//                +-----+-----+          |
//                |Stopped    +<---------+
//                +-----------+
//
// Stopped is reachable from every state through an explicit stop, nothing leaves Stopped.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Failed,
    Stopped,
}

impl Default for ProcessState {
    fn default() -> Self {
        ProcessState::NotStarted
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Failed => write!(f, "failed"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl ProcessState {
    pub fn can_transition_to(&self, next: ProcessState) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Starting, Self::Failed)
                | (Self::NotStarted, Self::Stopped)
                | (Self::Starting, Self::Stopped)
                | (Self::Running, Self::Stopped)
                | (Self::Failed, Self::Stopped)
        )
    }

    pub fn is_running(&self) -> bool {
        *self == Self::Running
    }
}

#[cfg(test)]
mod tests {
    use super::ProcessState::*;

    #[test]
    fn it_only_advances() {
        assert!(NotStarted.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Starting.can_transition_to(Failed));
        assert!(!NotStarted.can_transition_to(Running));
        assert!(!Running.can_transition_to(Starting));
        assert!(!Running.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Starting));
        for state in [NotStarted, Starting, Running, Failed] {
            assert!(state.can_transition_to(Stopped), "{} should be stoppable", state);
        }
        assert!(!Stopped.can_transition_to(Stopped));
    }
}
