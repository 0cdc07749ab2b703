//! Bounded conversational loop shared by the refine and verify phases.
//!
//! Each turn asks the generation service whether the current document
//! should change. An affirmative `<decision>` carries a fenced replacement
//! document; anything else ends the loop. Turns are strictly sequential
//! because every follow-up builds on the previous reply.

use crate::contexts::agent_runner::{ExecutionError, GenerationService, Model};
use crate::contexts::content_extractor::{extract_fenced, extract_tagged};
use crate::data::{Diagnostics, Transcript};

const COMPONENT: &str = "refinement_loop";

pub const DEFAULT_MAX_TURNS: usize = 4;
pub const DECISION_TAG: &str = "decision";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Refine,
    Verify,
}

impl Phase {
    /// Agent whose template seeds the phase's transcript
    pub fn agent_name(&self) -> &'static str {
        match self {
            Phase::Refine => "refine_layout",
            Phase::Verify => "verify_layout",
        }
    }

    /// User turn appended after every accepted revision
    pub fn follow_up(&self) -> &'static str {
        match self {
            Phase::Refine => {
                "Is there any improvement to make the refined diagram above more precise and appealing to the reader?"
            }
            Phase::Verify => {
                "Is there any error in the above corrected code? If yes, you should then generate the fixed code in code block wrapped with ```."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    AwaitingReply,
    Done,
}

/// Result of one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Last accepted document, or the initial one if nothing was accepted
    pub content: String,
    /// Every raw reply, in order, whatever its decision
    pub replies: Vec<String>,
}

pub struct RefinementLoop<'a> {
    phase: Phase,
    prompt: String,
    format_label: String,
    max_turns: usize,
    model: Model,
    service: &'a dyn GenerationService,
    diagnostics: &'a dyn Diagnostics,
}

impl<'a> RefinementLoop<'a> {
    /// Creates a loop for `phase` seeded with an already populated `prompt`
    pub fn new(
        phase: Phase,
        prompt: String,
        model: Model,
        service: &'a dyn GenerationService,
        diagnostics: &'a dyn Diagnostics,
    ) -> Self {
        Self {
            phase,
            prompt,
            format_label: String::new(),
            max_turns: DEFAULT_MAX_TURNS,
            model,
            service,
            diagnostics,
        }
    }

    /// Fence label the revised document is expected under
    pub fn with_format_label(mut self, format_label: &str) -> Self {
        self.format_label = format_label.to_string();
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Drives the conversation until a negative decision or the turn cap.
    ///
    /// A service failure ends the phase with an error; the caller decides
    /// what happens to the sample.
    pub fn run(&self, initial_content: &str) -> Result<LoopOutcome, ExecutionError> {
        let mut transcript = Transcript::seeded(self.prompt.clone());
        let mut accepted = initial_content.to_string();
        let mut replies = Vec::new();

        let mut state = if self.max_turns == 0 {
            LoopState::Done
        } else {
            LoopState::AwaitingReply
        };

        while state == LoopState::AwaitingReply {
            let turn = replies.len() + 1;
            self.diagnostics.info(
                COMPONENT,
                &format!("{:?} turn {} of {}", self.phase, turn, self.max_turns),
            );

            let reply = self.service.invoke(&self.model, &transcript)?;
            replies.push(reply.clone());

            let decision = extract_tagged(&reply, DECISION_TAG, self.diagnostics);
            if !is_affirmative(&decision) {
                state = LoopState::Done;
                continue;
            }

            accepted = extract_fenced(&reply, &self.format_label, self.diagnostics);

            if turn >= self.max_turns {
                state = LoopState::Done;
                continue;
            }

            transcript.push_assistant(reply);
            transcript.push_user(self.phase.follow_up());
        }

        Ok(LoopOutcome {
            content: accepted,
            replies,
        })
    }
}

fn is_affirmative(decision: &str) -> bool {
    matches!(decision.trim().to_lowercase().as_str(), "yes" | "y")
}
