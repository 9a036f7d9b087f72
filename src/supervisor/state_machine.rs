use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// No process
    Idle,
    Starting,
    Running,
    Stopping,
    /// Last process exited on its own with a failure status
    Errored,
}

impl State {
    /// `Starting`/`Running`/`Stopping` own a live process.
    pub fn is_active(&self) -> bool {
        matches!(self, State::Starting | State::Running | State::Stopping)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Starting => "starting",
            State::Running => "running",
            State::Stopping => "stopping",
            State::Errored => "errored",
        }
    }
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(State, State),
}

#[derive(Debug)]
pub struct StateMachine {
    pub state: State,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: State::Idle }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: &State) -> bool {
        matches!(
            (&self.state, to),
            (State::Idle, State::Starting)
                | (State::Errored, State::Starting)
                | (State::Starting, State::Running)
                | (State::Starting, State::Idle)
                | (State::Starting, State::Errored)
                | (State::Running, State::Stopping)
                | (State::Running, State::Idle)
                | (State::Running, State::Errored)
                | (State::Stopping, State::Idle)
        )
    }

    pub fn transition(&mut self, to: State) -> Result<(), TransitionError> {
        if self.can_transition(&to) {
            tracing::info!("State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }
}
