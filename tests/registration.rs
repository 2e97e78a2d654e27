//! Integration tests for single-flight registration on the contact step.

mod helpers;

use helpers::*;
use intake::error::{RegistrationError, SessionError};
use intake::session::{Advance, Identity, RegistrationOutcome, Session};

fn start_registration(session: &mut Session) -> intake::session::RegistrationRequest {
    fill_contact(session);
    match session.next().unwrap() {
        Advance::RegistrationRequired(request) => request,
        other => panic!("expected a registration request, got {:?}", other),
    }
}

#[test]
fn contact_step_requests_registration_with_trimmed_details() {
    let mut session = Session::new(compact_catalogue());
    fill_contact(&mut session);
    session.set_text("email", "  ada@example.com ").unwrap();
    let Advance::RegistrationRequired(request) = session.next().unwrap() else {
        panic!("expected registration");
    };
    assert_eq!(request.email, "ada@example.com");
    assert_eq!(request.phone, "+44 20 7946 0958");
    assert!(session.is_busy());
    assert_eq!(session.current_step_index(), 0);
}

#[test]
fn second_next_while_in_flight_is_busy() {
    let mut session = Session::new(compact_catalogue());
    let _request = start_registration(&mut session);
    assert_eq!(session.next().unwrap(), Advance::Busy);
    assert_eq!(session.next().unwrap(), Advance::Busy);
}

#[test]
fn success_stores_identity_and_advances() {
    let mut session = Session::new(compact_catalogue());
    let request = start_registration(&mut session);

    let outcome = session.complete_registration(request.ticket, Ok(Identity::new("uid-42")));
    let RegistrationOutcome::Registered { advanced_to, dispatch } = outcome else {
        panic!("expected registration to succeed");
    };
    assert_eq!(advanced_to, Some(1));
    assert!(dispatch.is_empty());
    assert_eq!(session.identity().map(Identity::as_str), Some("uid-42"));
    assert!(!session.is_busy());
    assert_eq!(session.current_step_index(), 1);
}

#[test]
fn registered_session_does_not_register_again() {
    let mut session = Session::new(compact_catalogue());
    let request = start_registration(&mut session);
    session.complete_registration(request.ticket, Ok(Identity::new("uid-1")));

    session.prev().unwrap();
    assert_eq!(session.next().unwrap(), Advance::Advanced { step: 1 });
    assert_eq!(session.identity().map(Identity::as_str), Some("uid-1"));
}

#[test]
fn rejection_fills_the_registration_slot() {
    let mut session = Session::new(compact_catalogue());
    let request = start_registration(&mut session);

    let outcome = session.complete_registration(
        request.ticket,
        Err(RegistrationError::Rejected("duplicate email".into())),
    );
    assert!(matches!(outcome, RegistrationOutcome::Failed(RegistrationError::Rejected(_))));
    assert_eq!(session.current_step_index(), 0);
    assert!(!session.is_registered());
    assert!(!session.is_busy());
    assert_eq!(
        session.error_messages().get("registration").map(String::as_str),
        Some("Failed to register user. Please try again.")
    );
}

#[test]
fn transport_failure_message() {
    let mut session = Session::new(compact_catalogue());
    let request = start_registration(&mut session);
    session.complete_registration(
        request.ticket,
        Err(RegistrationError::Transport("dns".into())),
    );
    assert_eq!(
        session.error_messages().get("registration").map(String::as_str),
        Some("An error occurred during registration.")
    );
}

#[test]
fn retry_after_failure_clears_the_slot() {
    let mut session = Session::new(compact_catalogue());
    let first = start_registration(&mut session);
    session.complete_registration(first.ticket, Err(RegistrationError::Rejected(String::new())));

    let Advance::RegistrationRequired(second) = session.next().unwrap() else {
        panic!("retry should start a new attempt");
    };
    assert_ne!(first.ticket, second.ticket);
    assert!(session.registration_error().is_none());

    let outcome = session.complete_registration(first.ticket, Ok(Identity::new("late")));
    assert!(matches!(outcome, RegistrationOutcome::Stale));
    assert!(!session.is_registered());

    let outcome = session.complete_registration(second.ticket, Ok(Identity::new("uid-2")));
    assert!(matches!(outcome, RegistrationOutcome::Registered { advanced_to: Some(1), .. }));
}

#[test]
fn invalid_step_never_starts_registration() {
    let mut session = Session::new(compact_catalogue());
    session.set_text("email", "ada@example.com").unwrap();
    assert!(matches!(session.next().unwrap(), Advance::Invalid(_)));
    assert!(!session.is_busy());
}

const INTRO_FIRST: &str = r#"{"id": "intro", "version": "1", "steps": [
    {"id": 1, "title": "Intro", "fields": [{"name": "city", "label": "City", "kind": "text"}]},
    {"id": 2, "title": "Contact", "fields": [
        {"name": "name", "label": "Full Name", "kind": "text", "required": true},
        {"name": "email", "label": "Email Address", "kind": "email", "required": true},
        {"name": "phone", "label": "Phone Number", "kind": "tel", "required": true}
    ]},
    {"id": 3, "title": "Done", "fields": []}
]}"#;

#[test]
fn completion_after_going_back_keeps_the_user_in_place() {
    let catalogue = intake::catalogue::parse_and_build(INTRO_FIRST).expect("Should build");
    let mut session = Session::new(std::sync::Arc::new(catalogue));
    assert_eq!(session.next().unwrap(), Advance::Advanced { step: 1 });
    let request = start_registration(&mut session);

    session.prev().unwrap();
    let outcome = session.complete_registration(request.ticket, Ok(Identity::new("uid-9")));
    assert!(matches!(outcome, RegistrationOutcome::Registered { advanced_to: None, .. }));
    assert_eq!(session.current_step_index(), 0);
    assert!(session.is_registered());

    assert_eq!(session.next().unwrap(), Advance::Advanced { step: 1 });
    assert_eq!(session.next().unwrap(), Advance::Advanced { step: 2 });
}

#[test]
fn step_without_contact_fields_skips_registration() {
    let catalogue = intake::catalogue::parse_and_build(INTRO_FIRST).expect("Should build");
    let mut session = Session::new(std::sync::Arc::new(catalogue));
    assert_eq!(session.next().unwrap(), Advance::Advanced { step: 1 });
    assert!(!session.is_registered());
}

#[test]
fn final_step_has_no_next() {
    let mut session = Session::new(compact_catalogue());
    let request = start_registration(&mut session);
    session.complete_registration(request.ticket, Ok(Identity::new("uid-1")));
    fill_experience(&mut session);
    assert_eq!(session.next().unwrap(), Advance::Advanced { step: 2 });
    assert_eq!(session.next(), Err(SessionError::NoNextStep));
}

#[test]
fn going_back_after_a_failed_step_keeps_its_errors() {
    let catalogue = intake::catalogue::parse_and_build(INTRO_FIRST).expect("Should build");
    let mut session = Session::new(std::sync::Arc::new(catalogue));
    assert_eq!(session.next().unwrap(), Advance::Advanced { step: 1 });
    session.set_text("name", "Ada").unwrap();

    let Advance::Invalid(errors) = session.next().unwrap() else {
        panic!("missing contact details should be invalid");
    };
    assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["email", "phone"]);
    let before = session.errors().clone();
    assert_eq!(before, errors);

    assert_eq!(session.prev(), Ok(0));
    assert_eq!(session.errors(), &before);
    assert_eq!(
        session.values().get("name").and_then(|v| v.as_text()),
        Some("Ada")
    );
    assert!(!session.is_registered());
}
