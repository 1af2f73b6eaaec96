//! Service lifecycle states.

use std::fmt;

/// `Created → Starting → Running → Stopping → Stopped`
///
/// A failed startup leaves `Starting` through `Stopping` so resources that
/// did start are released before `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;

    #[test]
    fn test_forward_path_only() {
        assert!(Created.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));

        assert!(!Created.can_transition_to(Running));
        assert!(!Running.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Starting));
        assert!(!Running.can_transition_to(Starting));
    }

    #[test]
    fn test_failed_start_goes_through_stopping() {
        assert!(Starting.can_transition_to(Stopping));
        assert!(!Starting.can_transition_to(Stopped));
    }
}
