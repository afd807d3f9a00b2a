use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a signing operation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    PreProcessing,
    Signing,
    PostProcessing,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted)
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, PreProcessing)
                | (PreProcessing, Signing)
                | (PreProcessing, Aborted)
                | (Signing, PostProcessing)
                | (Signing, Aborted)
                | (PostProcessing, Done)
                | (PostProcessing, Aborted)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::PreProcessing => "pre_processing",
            PipelineState::Signing => "signing",
            PipelineState::PostProcessing => "post_processing",
            PipelineState::Done => "done",
            PipelineState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Hook point a plugin was running at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStage {
    PreSign,
    PostSign,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::PreSign => f.write_str("pre_sign"),
            HookStage::PostSign => f.write_str("post_sign"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub state: PipelineState,
    pub at: DateTime<Utc>,
}

/// Record of one signing operation's state transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningRun {
    id: Uuid,
    transitions: Vec<Transition>,
}

impl Default for SigningRun {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            transitions: vec![Transition {
                state: PipelineState::Idle,
                at: Utc::now(),
            }],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PipelineState {
        self.transitions
            .last()
            .map(|t| t.state)
            .unwrap_or(PipelineState::Idle)
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn states(&self) -> Vec<PipelineState> {
        self.transitions.iter().map(|t| t.state).collect()
    }

    pub(crate) fn advance(&mut self, next: PipelineState) {
        let current = self.state();
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {current} -> {next}"
        );
        tracing::debug!(run = %self.id, from = %current, to = %next, "Signing state changed");
        self.transitions.push(Transition {
            state: next,
            at: Utc::now(),
        });
    }
}
