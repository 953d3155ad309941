use crate::error::BridgeError;

/// Lifecycle of the dedicated execution loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No loop thread has been spawned yet.
    NotStarted,
    /// Thread spawned, readiness not yet signaled.
    Starting,
    /// Loop accepts work.
    Running,
    /// Stop requested; pending tasks are being cancelled and drained.
    Draining,
    /// Loop thread has exited. A later call may start a fresh loop.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct LoopStateMachine {
    state: LoopState,
}

impl Default for LoopStateMachine {
    fn default() -> Self {
        Self {
            state: LoopState::NotStarted,
        }
    }
}

impl LoopStateMachine {
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn begin_start(&mut self) -> Result<(), BridgeError> {
        self.transition_from_any_of(
            &[LoopState::NotStarted, LoopState::Stopped],
            LoopState::Starting,
            "start",
        )
    }

    pub fn on_ready(&mut self) -> Result<(), BridgeError> {
        self.transition_from_any_of(&[LoopState::Starting], LoopState::Running, "ready")
    }

    /// Readiness never arrived; the loop counts as stopped.
    pub fn on_start_failed(&mut self) {
        self.state = LoopState::Stopped;
    }

    pub fn begin_drain(&mut self) -> Result<(), BridgeError> {
        self.transition_from_any_of(&[LoopState::Running], LoopState::Draining, "drain")
    }

    pub fn on_drained(&mut self) -> Result<(), BridgeError> {
        self.transition_from_any_of(&[LoopState::Draining], LoopState::Stopped, "drained")
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[LoopState],
        next: LoopState,
        action: &str,
    ) -> Result<(), BridgeError> {
        if !expected.contains(&self.state) {
            return Err(BridgeError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(())
    }
}
