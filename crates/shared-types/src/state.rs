//! Pipeline lifecycle state

use serde::{Deserialize, Serialize};

use crate::{HwError, HwResult};

/// Encode pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineState {
    /// Nothing acquired yet
    Uninitialized,
    /// Graphics and compute devices opened
    DeviceBound,
    /// Acceleration context created with all domains bound
    ContextReady,
    /// Encode component created and initialized
    EncoderReady,
    /// Frames are being pumped
    Running,
    /// Input exhausted, flushing buffered frames
    Draining,
    /// Finished and released
    Terminated,
    /// Failed with an error
    Failed,
}

impl PipelineState {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Terminated | PipelineState::Failed)
    }

    /// Forward-only transition rule; `Failed` is reachable from any
    /// non-terminal state
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == PipelineState::Failed {
            return true;
        }
        next > *self
    }

    /// Validate a transition
    pub fn transition(&self, next: PipelineState) -> HwResult<PipelineState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(HwError::InvalidStateTransition {
                from: *self,
                to: next,
            })
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
