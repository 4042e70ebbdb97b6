//! Generation state machine.
//!
//! ```text
//! Idle -> Encoding -> Requesting -> Success | Error
//! ```
//!
//! Every `start` (including a regenerate) and every `reset` issues a new
//! sequence number. Outcomes are reported back with the sequence number they
//! belong to and are only applied when it is still the latest one, so a slow
//! earlier session can never overwrite a newer one.

use mockup_contracts::events::MockupEvent;
use mockup_contracts::generation::{
    EncodedImage, GeneratedImage, GenerationFailure, GenerationResult,
};
use mockup_contracts::settings::Credential;

use crate::encoder::ImageFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Encoding,
    Requesting,
    Success(GeneratedImage),
    Error(GenerationFailure),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Encoding => "encoding",
            Self::Requesting => "requesting",
            Self::Success(_) => "success",
            Self::Error(_) => "error",
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Encoding | Self::Requesting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub sequence: u64,
    pub state: SessionState,
}

impl SessionSnapshot {
    pub fn to_event(&self) -> MockupEvent {
        match &self.state {
            SessionState::Success(image) => MockupEvent::succeeded(self.sequence, image),
            SessionState::Error(failure) => MockupEvent::failed(self.sequence, failure),
            state => MockupEvent::progress(self.sequence, state.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInputs {
    pub prompt: String,
    pub image: ImageFile,
}

#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub sequence: u64,
    pub inputs: SessionInputs,
    pub credential: Credential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(SessionSnapshot),
    Discarded { sequence: u64, current: u64 },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Debug, Clone)]
pub struct GenerationStateMachine {
    current: SessionSnapshot,
    inputs: Option<SessionInputs>,
}

impl Default for GenerationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationStateMachine {
    pub fn new() -> Self {
        Self {
            current: SessionSnapshot {
                sequence: 0,
                state: SessionState::Idle,
            },
            inputs: None,
        }
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.current
    }

    pub fn state(&self) -> &SessionState {
        &self.current.state
    }

    pub fn sequence(&self) -> u64 {
        self.current.sequence
    }

    pub fn is_in_flight(&self) -> bool {
        self.current.state.is_in_flight()
    }

    pub fn inputs(&self) -> Option<&SessionInputs> {
        self.inputs.as_ref()
    }

    // Always takes a new sequence number, even when validation fails.
    pub fn start(
        &mut self,
        prompt: &str,
        image: Option<&ImageFile>,
        credential: Option<&Credential>,
    ) -> Result<SessionTicket, SessionSnapshot> {
        let sequence = self.current.sequence + 1;
        match validate(prompt, image, credential) {
            Ok((image, credential)) => {
                let inputs = SessionInputs {
                    prompt: prompt.to_string(),
                    image: image.clone(),
                };
                self.current = SessionSnapshot {
                    sequence,
                    state: SessionState::Encoding,
                };
                self.inputs = Some(inputs.clone());
                Ok(SessionTicket {
                    sequence,
                    inputs,
                    credential: credential.clone(),
                })
            }
            Err(failure) => {
                self.current = SessionSnapshot {
                    sequence,
                    state: SessionState::Error(failure),
                };
                self.inputs = None;
                Err(self.current.clone())
            }
        }
    }

    pub fn encoded(
        &mut self,
        sequence: u64,
        outcome: &Result<EncodedImage, GenerationFailure>,
    ) -> Transition {
        if !self.accepts(sequence, |state| matches!(state, SessionState::Encoding)) {
            return self.discard(sequence);
        }
        let state = match outcome {
            Ok(_) => SessionState::Requesting,
            Err(failure) => SessionState::Error(failure.clone()),
        };
        self.apply(state)
    }

    pub fn finished(&mut self, sequence: u64, result: GenerationResult) -> Transition {
        if !self.accepts(sequence, |state| matches!(state, SessionState::Requesting)) {
            return self.discard(sequence);
        }
        let state = match result {
            GenerationResult::Success(image) => SessionState::Success(image),
            GenerationResult::Failure(failure) => SessionState::Error(failure),
        };
        self.apply(state)
    }

    pub fn reset(&mut self) -> SessionSnapshot {
        self.current = SessionSnapshot {
            sequence: self.current.sequence + 1,
            state: SessionState::Idle,
        };
        self.inputs = None;
        self.current.clone()
    }

    // Outcomes only land on the session that is still current and still
    // waiting for that step.
    fn accepts(&self, sequence: u64, expected: impl Fn(&SessionState) -> bool) -> bool {
        sequence == self.current.sequence && expected(&self.current.state)
    }

    fn apply(&mut self, state: SessionState) -> Transition {
        self.current.state = state;
        Transition::Applied(self.current.clone())
    }

    fn discard(&self, sequence: u64) -> Transition {
        Transition::Discarded {
            sequence,
            current: self.current.sequence,
        }
    }
}

fn validate<'a>(
    prompt: &str,
    image: Option<&'a ImageFile>,
    credential: Option<&'a Credential>,
) -> Result<(&'a ImageFile, &'a Credential), GenerationFailure> {
    if prompt.trim().is_empty() {
        return Err(GenerationFailure::validation(
            "Please provide both a prompt and upload a sticker",
        ));
    }
    let Some(image) = image else {
        return Err(GenerationFailure::validation(
            "Please provide both a prompt and upload a sticker",
        ));
    };
    if !image.is_image() {
        return Err(GenerationFailure::validation(format!(
            "{} is not an image ({})",
            image.path().display(),
            image.declared_media_type().unwrap_or("unknown type")
        )));
    }
    let Some(credential) = credential.filter(|credential| !credential.is_blank()) else {
        return Err(GenerationFailure::validation(
            "Please configure your Gemini API key in settings",
        ));
    };
    Ok((image, credential))
}
