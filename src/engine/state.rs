use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::SessionInstructions;

/// Acquisition session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Stopping,
}

impl SessionState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, target),
            (Idle, Running) | (Running, Idle) | (Running, Stopping) | (Stopping, Idle)
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
        }
    }

    /// Whether an ingestion task may be alive
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Read-only view of the measurement state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementStatus {
    pub running: bool,
    pub state: SessionState,
    pub name: Option<String>,
    pub start_time: Option<String>,
    pub instructions: Option<SessionInstructions>,
}

/// Shared record of the current acquisition session
pub struct MeasurementState {
    state: SessionState,
    name: Option<String>,
    start_time: Option<DateTime<Local>>,
    instructions: Option<SessionInstructions>,
    /// Signals the ingestion task; present from the moment a session is reserved
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    state_tx: watch::Sender<SessionState>,
}

impl Default for MeasurementState {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementState {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            state: SessionState::Idle,
            name: None,
            start_time: None,
            instructions: None,
            cancel: None,
            task: None,
            state_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Transition to a new state with validation
    pub fn transition_to(&mut self, new_state: SessionState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(anyhow!(
                "Invalid state transition: {} -> {}",
                self.state.name(),
                new_state.name()
            ));
        }
        self.state = new_state;
        self.state_tx.send_replace(new_state);
        Ok(())
    }

    /// Idle -> Running, reserving the session before its task exists
    ///
    /// Returns the token the ingestion task must observe; a stop requested
    /// before the task is spawned is not lost.
    pub fn begin(
        &mut self,
        name: String,
        start_time: DateTime<Local>,
        instructions: SessionInstructions,
    ) -> Result<CancellationToken> {
        self.transition_to(SessionState::Running)?;
        let cancel = CancellationToken::new();
        self.name = Some(name);
        self.start_time = Some(start_time);
        self.instructions = Some(instructions);
        self.cancel = Some(cancel.clone());
        Ok(cancel)
    }

    pub fn attach_task(&mut self, handle: JoinHandle<()>) {
        self.task = Some(handle);
    }

    pub fn take_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }

    /// Running -> Stopping, signalling the ingestion task; false if not running
    pub fn request_stop(&mut self) -> bool {
        if self.transition_to(SessionState::Stopping).is_err() {
            return false;
        }
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
        true
    }

    /// Back to Idle from either active state, clearing the session record
    pub fn finish(&mut self) -> Result<()> {
        self.transition_to(SessionState::Idle)?;
        self.name = None;
        self.start_time = None;
        self.instructions = None;
        self.cancel = None;
        self.task = None;
        Ok(())
    }

    pub fn status(&self) -> MeasurementStatus {
        let running = self.is_running();
        MeasurementStatus {
            running,
            state: self.state,
            name: self.name.clone().filter(|_| running),
            start_time: self.start_time.filter(|_| running).map(|t| t.to_rfc3339()),
            instructions: self.instructions.clone().filter(|_| running),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(SessionState::Idle.can_transition_to(&SessionState::Running));
        assert!(SessionState::Running.can_transition_to(&SessionState::Stopping));
        assert!(SessionState::Running.can_transition_to(&SessionState::Idle));
        assert!(SessionState::Stopping.can_transition_to(&SessionState::Idle));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!SessionState::Idle.can_transition_to(&SessionState::Stopping));
        assert!(!SessionState::Idle.can_transition_to(&SessionState::Idle));
        assert!(!SessionState::Stopping.can_transition_to(&SessionState::Running));
        assert!(!SessionState::Running.can_transition_to(&SessionState::Running));
    }

    #[test]
    fn test_status_hides_identity_when_idle() {
        let mut state = MeasurementState::new();
        state
            .begin("t1".to_string(), Local::now(), SessionInstructions::default())
            .unwrap();

        let status = state.status();
        assert!(status.running);
        assert_eq!(status.name.as_deref(), Some("t1"));
        assert!(status.start_time.is_some());

        assert!(state.request_stop());
        let status = state.status();
        assert!(!status.running);
        assert_eq!(status.state, SessionState::Stopping);
        assert!(status.name.is_none());

        state.finish().unwrap();
        assert_eq!(state.state(), SessionState::Idle);
        assert!(state.name().is_none());
    }

    #[test]
    fn test_begin_rejected_while_running() {
        let mut state = MeasurementState::new();
        state
            .begin("first".to_string(), Local::now(), SessionInstructions::default())
            .unwrap();

        let result = state.begin(
            "second".to_string(),
            Local::now(),
            SessionInstructions::default(),
        );
        assert!(result.is_err());
        assert_eq!(state.name(), Some("first"));
    }

    #[test]
    fn test_stop_before_task_is_spawned_cancels_token() {
        let mut state = MeasurementState::new();
        let cancel = state
            .begin("early".to_string(), Local::now(), SessionInstructions::default())
            .unwrap();

        assert!(state.request_stop());
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_stop_when_idle_is_rejected() {
        let mut state = MeasurementState::new();
        assert!(!state.request_stop());
        assert_eq!(state.state(), SessionState::Idle);
    }
}
