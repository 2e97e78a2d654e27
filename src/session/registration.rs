//! Single-flight acquisition of the session identity.

use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;

/// Opaque identifier issued once per session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Identity(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Names one registration attempt. Only the outstanding ticket's result is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationTicket(u64);

/// Contact details to send to the issuance collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub ticket: RegistrationTicket,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Unregistered,
    InFlight {
        ticket: RegistrationTicket,
        step: usize,
    },
    Registered(Identity),
}

pub(crate) enum Begin {
    Started(RegistrationRequest),
    Busy,
}

pub(crate) enum Completion {
    /// Identity stored. Carries the step the attempt was started from.
    Registered { identity: Identity, step: usize },
    Failed,
    Stale,
}

#[derive(Debug, Clone)]
pub(crate) struct Registrar {
    state: State,
    attempts: u64,
    last_error: Option<RegistrationError>,
}

impl Default for Registrar {
    fn default() -> Self {
        Registrar {
            state: State::Unregistered,
            attempts: 0,
            last_error: None,
        }
    }
}

impl Registrar {
    pub(crate) fn identity(&self) -> Option<&Identity> {
        match &self.state {
            State::Registered(identity) => Some(identity),
            _ => None,
        }
    }

    pub(crate) fn in_flight(&self) -> bool {
        matches!(self.state, State::InFlight { .. })
    }

    pub(crate) fn last_error(&self) -> Option<&RegistrationError> {
        self.last_error.as_ref()
    }

    /// Start an attempt unless one is outstanding. Must not be called once registered.
    pub(crate) fn begin(&mut self, email: String, phone: String, step: usize) -> Begin {
        if self.in_flight() {
            return Begin::Busy;
        }
        self.attempts += 1;
        let ticket = RegistrationTicket(self.attempts);
        self.state = State::InFlight { ticket, step };
        self.last_error = None;
        Begin::Started(RegistrationRequest {
            ticket,
            email,
            phone,
        })
    }

    pub(crate) fn complete(
        &mut self,
        ticket: RegistrationTicket,
        result: Result<Identity, RegistrationError>,
    ) -> Completion {
        let step = match &self.state {
            State::InFlight { ticket: current, step } if *current == ticket => *step,
            _ => return Completion::Stale,
        };
        match result {
            Ok(identity) => {
                self.state = State::Registered(identity.clone());
                Completion::Registered { identity, step }
            }
            Err(e) => {
                self.state = State::Unregistered;
                self.last_error = Some(e);
                Completion::Failed
            }
        }
    }
}
