// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sequential-state guard for the handshake state machines.
//!
//! `check_step` moves the machine to its next step and hands back a
//! [`StepMarker`]; the transition only becomes stable once the marker is
//! passed to `confirm`. A step function that bails out early drops its
//! marker unconfirmed, which leaves the checker unstable for good: every
//! later operation fails. A half-executed handshake step must never be
//! resumed.

use std::fmt::Debug;
use std::marker::PhantomData;
use thiserror::Error;

/// Step sequencing violations
#[derive(Debug, Error)]
pub enum StepError {
    /// A previous step never confirmed; the machine is poisoned
    #[error("Not in a stable state")]
    Unstable,

    /// Operation attempted at the wrong step
    #[error("Expected step {expected}, but current step is {actual}")]
    WrongStep {
        /// Step the caller required
        expected: String,
        /// Step the machine was actually at
        actual: String,
    },
}

/// Proof of an in-flight step transition.
///
/// Move semantics make confirming twice unrepresentable; dropping the
/// marker without confirming poisons the owning checker.
#[must_use = "an unconfirmed step permanently poisons the state machine"]
#[derive(Debug)]
pub struct StepMarker<S> {
    _step: PhantomData<S>,
}

/// Guard enforcing strictly sequential steps
#[derive(Debug)]
pub struct StepChecker<S> {
    current: S,
    stable: bool,
}

impl<S: Copy + PartialEq + Debug> StepChecker<S> {
    /// Start stable at `initial`
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            stable: true,
        }
    }

    /// Begin the transition `expected -> next`.
    ///
    /// # Errors
    ///
    /// [`StepError::Unstable`] if an earlier transition never confirmed;
    /// [`StepError::WrongStep`] if the machine is not at `expected`.
    pub fn check_step(&mut self, expected: S, next: S) -> Result<StepMarker<S>, StepError> {
        if !self.stable {
            return Err(StepError::Unstable);
        }
        if self.current != expected {
            return Err(StepError::WrongStep {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", self.current),
            });
        }
        self.current = next;
        self.stable = false;
        Ok(StepMarker { _step: PhantomData })
    }

    /// Commit the in-flight transition
    pub fn confirm(&mut self, marker: StepMarker<S>) {
        debug_assert!(!self.stable, "confirm without an outstanding step");
        let _ = marker;
        self.stable = true;
    }

    /// Current step; fails while a transition is in flight
    pub fn current_step(&self) -> Result<S, StepError> {
        if !self.stable {
            return Err(StepError::Unstable);
        }
        Ok(self.current)
    }
}
