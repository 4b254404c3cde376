//! Lifecycle gate between the platform's UI state and the engine.
//!
//! Push handling runs only while the UI is hidden, and is switched off on
//! every visibility change until the platform re-arms it.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Foreground,
    Background,
}

/// Why a push was not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSkip {
    UiVisible,
    PushDisabled,
}

impl PushSkip {
    pub fn as_str(self) -> &'static str {
        match self {
            PushSkip::UiVisible => "ui visible",
            PushSkip::PushDisabled => "push handling disabled",
        }
    }
}

impl fmt::Display for PushSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct GateState {
    initialized: bool,
    ui_visible: bool,
    can_run_push: bool,
}

#[derive(Debug)]
pub struct LifecycleGate {
    state: Mutex<GateState>,
}

impl Default for LifecycleGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                initialized: false,
                ui_visible: false,
                can_run_push: true,
            }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn mark_initialized(&self) {
        self.state.lock().initialized = true;
    }

    /// UI went away. Returns whether the engine should be suspended.
    pub fn enter_background(&self) -> bool {
        let mut state = self.state.lock();
        state.ui_visible = false;
        state.can_run_push = false;
        state.initialized
    }

    /// UI came back. Returns whether the engine should be resumed.
    pub fn enter_foreground(&self) -> bool {
        let mut state = self.state.lock();
        state.ui_visible = true;
        state.can_run_push = false;
        state.initialized
    }

    pub fn refresh_push_permission(&self) {
        let mut state = self.state.lock();
        state.can_run_push = !state.ui_visible;
    }

    pub fn check_push(&self) -> Result<(), PushSkip> {
        let state = self.state.lock();
        if state.ui_visible {
            Err(PushSkip::UiVisible)
        } else if !state.can_run_push {
            Err(PushSkip::PushDisabled)
        } else {
            Ok(())
        }
    }

    pub fn state(&self) -> LifecycleState {
        if self.state.lock().ui_visible {
            LifecycleState::Foreground
        } else {
            LifecycleState::Background
        }
    }
}
