//! C11 orchestration state graph — generalized from the swarm's 9-state
//! "fix one Rust issue" graph (`swarm_agents::state_machine`) to this
//! spec's "iterate on a web UI" graph: explicit transition table,
//! `TransitionRecord` log, `advance()`/`fail()` API.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Init,
    Bootstrap,
    PreviewUp,
    Plan,
    Generate,
    Serve,
    Evaluate,
    Patch,
    Finalize,
    Error,
}

impl OrchestratorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalize | Self::Error)
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Bootstrap => write!(f, "Bootstrap"),
            Self::PreviewUp => write!(f, "PreviewUp"),
            Self::Plan => write!(f, "Plan"),
            Self::Generate => write!(f, "Generate"),
            Self::Serve => write!(f, "Serve"),
            Self::Evaluate => write!(f, "Evaluate"),
            Self::Patch => write!(f, "Patch"),
            Self::Finalize => write!(f, "Finalize"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// ```text
/// Init → Bootstrap → PreviewUp → Plan → Generate
/// Generate → Serve → Evaluate
/// Evaluate → Finalize (passed, or max_iterations reached)
/// Evaluate → Patch → Generate (re-iterate)
/// any non-terminal → Error
/// ```
fn is_legal_transition(from: OrchestratorState, to: OrchestratorState) -> bool {
    use OrchestratorState::*;

    if to == Error && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Init, Bootstrap)
            | (Bootstrap, PreviewUp)
            | (PreviewUp, Plan)
            | (Plan, Generate)
            | (Generate, Serve)
            | (Serve, Evaluate)
            | (Evaluate, Finalize)
            | (Evaluate, Patch)
            | (Patch, Generate)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: OrchestratorState,
    pub to: OrchestratorState,
    pub iteration: u32,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: OrchestratorState,
    pub to: OrchestratorState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

#[derive(Debug)]
pub struct StateMachine {
    current: OrchestratorState,
    iteration: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: OrchestratorState::Init,
            iteration: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> OrchestratorState {
        self.current
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    pub fn advance(&mut self, to: OrchestratorState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition { from: self.current, to });
        }
        let record = TransitionRecord {
            from: self.current,
            to,
            iteration: self.iteration,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };
        tracing::debug!(from = %self.current, to = %to, iteration = self.iteration, "state transition");
        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(OrchestratorState::Error, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_single_iteration() {
        let mut sm = StateMachine::new();
        sm.advance(OrchestratorState::Bootstrap, None).unwrap();
        sm.advance(OrchestratorState::PreviewUp, None).unwrap();
        sm.advance(OrchestratorState::Plan, None).unwrap();
        sm.set_iteration(1);
        sm.advance(OrchestratorState::Generate, None).unwrap();
        sm.advance(OrchestratorState::Serve, None).unwrap();
        sm.advance(OrchestratorState::Evaluate, None).unwrap();
        sm.advance(OrchestratorState::Finalize, Some("passed")).unwrap();
        assert!(sm.is_terminal());
    }

    #[test]
    fn patch_loop_reiterates_at_generate() {
        let mut sm = StateMachine::new();
        sm.advance(OrchestratorState::Bootstrap, None).unwrap();
        sm.advance(OrchestratorState::PreviewUp, None).unwrap();
        sm.advance(OrchestratorState::Plan, None).unwrap();
        sm.set_iteration(1);
        sm.advance(OrchestratorState::Generate, None).unwrap();
        sm.advance(OrchestratorState::Serve, None).unwrap();
        sm.advance(OrchestratorState::Evaluate, None).unwrap();
        sm.advance(OrchestratorState::Patch, Some("score below threshold")).unwrap();
        sm.advance(OrchestratorState::Generate, None).unwrap();
        sm.set_iteration(2);
        sm.advance(OrchestratorState::Serve, None).unwrap();
        sm.advance(OrchestratorState::Evaluate, None).unwrap();
        sm.advance(OrchestratorState::Finalize, Some("max_iterations")).unwrap();
        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 11);
    }

    #[test]
    fn error_is_legal_from_any_non_terminal_state() {
        for state in [
            OrchestratorState::Init,
            OrchestratorState::Bootstrap,
            OrchestratorState::PreviewUp,
            OrchestratorState::Plan,
            OrchestratorState::Generate,
            OrchestratorState::Serve,
            OrchestratorState::Evaluate,
            OrchestratorState::Patch,
        ] {
            let mut sm = StateMachine {
                current: state,
                iteration: 0,
                created_at: Instant::now(),
                transitions: Vec::new(),
            };
            assert!(sm.fail("boom").is_ok());
            assert_eq!(sm.current(), OrchestratorState::Error);
        }
    }

    #[test]
    fn cannot_transition_out_of_terminal_state() {
        let mut sm = StateMachine::new();
        sm.advance(OrchestratorState::Bootstrap, None).unwrap();
        sm.fail("boom").unwrap();
        assert!(sm.advance(OrchestratorState::Bootstrap, None).is_err());
        assert!(sm.fail("again").is_err());
    }

    #[test]
    fn cannot_skip_bootstrap() {
        let mut sm = StateMachine::new();
        let err = sm.advance(OrchestratorState::Plan, None).unwrap_err();
        assert_eq!(err.from, OrchestratorState::Init);
        assert_eq!(err.to, OrchestratorState::Plan);
    }
}
