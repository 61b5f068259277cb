//! Solve-retry state machine.
//!
//! The machine sequences through: Detecting → Recognizing → Submitting →
//! Verifying, looping back to Detecting on failure until the attempt budget is
//! spent. [`transition`] is pure: it maps the current state and what the
//! driver observed to the next state and the effect the driver must perform.

use std::fmt;

/// Solver states. Attempt numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveState {
    /// Looking for the challenge image
    Detecting { attempt: u32 },
    /// Reading the captured challenge, or refreshing it after an empty read
    Recognizing { attempt: u32 },
    /// Typing and submitting the recovered text
    Submitting { attempt: u32 },
    /// Checking whether the challenge went away
    Verifying { attempt: u32 },
    /// No challenge on the page (terminal success)
    NoChallenge { attempt: u32 },
    /// Attempt budget spent (terminal failure)
    Exhausted { attempts: u32 },
}

impl SolveState {
    /// The state a fresh session starts in.
    pub fn initial(max_attempts: u32) -> Self {
        if max_attempts == 0 {
            SolveState::Exhausted { attempts: 0 }
        } else {
            SolveState::Detecting { attempt: 1 }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SolveState::NoChallenge { .. } | SolveState::Exhausted { .. }
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SolveState::NoChallenge { .. })
    }

    /// Current attempt number (or attempts used, once exhausted).
    pub fn attempt(&self) -> u32 {
        match *self {
            SolveState::Detecting { attempt }
            | SolveState::Recognizing { attempt }
            | SolveState::Submitting { attempt }
            | SolveState::Verifying { attempt }
            | SolveState::NoChallenge { attempt } => attempt,
            SolveState::Exhausted { attempts } => attempts,
        }
    }
}

impl fmt::Display for SolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveState::Detecting { .. } => write!(f, "Detecting"),
            SolveState::Recognizing { .. } => write!(f, "Recognizing"),
            SolveState::Submitting { .. } => write!(f, "Submitting"),
            SolveState::Verifying { .. } => write!(f, "Verifying"),
            SolveState::NoChallenge { .. } => write!(f, "No challenge"),
            SolveState::Exhausted { attempts } => write!(f, "Exhausted after {}", attempts),
        }
    }
}

/// What the driver saw after performing an effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    ChallengeAbsent,
    ChallengeCaptured,
    TextRecovered(String),
    NoText,
    Refreshed,
    RefreshUnavailable,
    Submitted,
    InputStillPresent,
    InputGone,
    /// Any unexpected failure while performing an effect
    Fault(String),
    /// Cooperative cancellation requested by the caller
    Aborted,
}

/// Side effect the driver performs next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Look for the challenge image and capture it
    Detect,
    /// Run the text-recovery pipeline on the capture
    Recognize,
    /// Click the refresh control
    Refresh,
    /// Clear the input, type the text, click submit
    Submit(String),
    /// Wait, then check whether the input is still there
    Verify,
    /// Stop with the given outcome
    Finish { success: bool },
}

/// Starts the next cycle if the budget allows, otherwise gives up.
fn retry(attempt: u32, max_attempts: u32) -> (SolveState, Effect) {
    if attempt < max_attempts {
        (SolveState::Detecting { attempt: attempt + 1 }, Effect::Detect)
    } else {
        (
            SolveState::Exhausted { attempts: attempt },
            Effect::Finish { success: false },
        )
    }
}

fn exhausted(attempt: u32) -> (SolveState, Effect) {
    (
        SolveState::Exhausted { attempts: attempt },
        Effect::Finish { success: false },
    )
}

/// Computes the next state and effect.
///
/// An observation that does not belong to the current state is handled as a
/// fault. Terminal states absorb everything.
pub fn transition(
    state: &SolveState,
    observation: Observation,
    max_attempts: u32,
) -> (SolveState, Effect) {
    use Observation as O;
    use SolveState as S;

    match (state, observation) {
        (S::NoChallenge { .. }, _) => (state.clone(), Effect::Finish { success: true }),
        (S::Exhausted { .. }, _) => (state.clone(), Effect::Finish { success: false }),

        // An abort before detection means that cycle never ran
        (S::Detecting { attempt }, O::Aborted) => exhausted(attempt.saturating_sub(1)),
        (_, O::Aborted) => exhausted(state.attempt()),

        (S::Detecting { attempt }, O::ChallengeAbsent) => (
            S::NoChallenge { attempt: *attempt },
            Effect::Finish { success: true },
        ),
        (S::Detecting { attempt }, O::ChallengeCaptured) => {
            (S::Recognizing { attempt: *attempt }, Effect::Recognize)
        }

        (S::Recognizing { attempt }, O::TextRecovered(text)) if !text.is_empty() => {
            (S::Submitting { attempt: *attempt }, Effect::Submit(text))
        }
        (S::Recognizing { attempt }, O::TextRecovered(_) | O::NoText) => {
            if *attempt < max_attempts {
                (S::Recognizing { attempt: *attempt }, Effect::Refresh)
            } else {
                exhausted(*attempt)
            }
        }
        (S::Recognizing { attempt }, O::Refreshed) => retry(*attempt, max_attempts),
        (S::Recognizing { attempt }, O::RefreshUnavailable) => exhausted(*attempt),

        (S::Submitting { attempt }, O::Submitted) => {
            (S::Verifying { attempt: *attempt }, Effect::Verify)
        }

        (S::Verifying { attempt }, O::InputGone) => (
            S::NoChallenge { attempt: *attempt },
            Effect::Finish { success: true },
        ),
        (S::Verifying { attempt }, O::InputStillPresent) => retry(*attempt, max_attempts),

        // Faults and out-of-place observations cost one attempt
        (_, _) => retry(state.attempt(), max_attempts),
    }
}
