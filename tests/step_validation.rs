//! Integration tests for step validation, blur checks and conditional visibility.

mod helpers;

use helpers::*;
use intake::error::SessionError;
use intake::session::{Advance, Session};
use intake::validate::{FieldError, validate_step};
use pretty_assertions::assert_eq;

#[test]
fn empty_step_reports_every_required_field() {
    let catalogue = tutor_catalogue();
    let mut session = Session::new(catalogue);
    let Advance::Invalid(errors) = session.next().unwrap() else {
        panic!("empty step should not advance");
    };
    let names: Vec<&str> = errors.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["email", "name", "phone"]);
    assert_eq!(errors["name"].to_string(), "Full Name is required");
    assert_eq!(session.current_step_index(), 0);
}

#[test]
fn format_errors_are_reported_together() {
    let mut session = Session::new(compact_catalogue());
    session.set_text("name", "Ada").unwrap();
    session.set_text("email", "not-an-email").unwrap();
    session.set_text("phone", "12-34-5").unwrap();

    let Advance::Invalid(errors) = session.next().unwrap() else {
        panic!("invalid contact details should not advance");
    };
    assert_eq!(errors.len(), 2);
    assert_eq!(errors["email"], FieldError::InvalidEmail);
    assert_eq!(errors["phone"], FieldError::InvalidPhone);
    assert_eq!(session.errors(), &errors);
}

#[test]
fn whitespace_only_text_counts_as_empty() {
    let mut session = Session::new(compact_catalogue());
    fill_contact(&mut session);
    session.set_text("name", "   ").unwrap();
    let Advance::Invalid(errors) = session.next().unwrap() else {
        panic!("blank name should not advance");
    };
    assert_eq!(
        errors["name"],
        FieldError::Required {
            label: "Full Name".into()
        }
    );
}

#[test]
fn phone_digit_minimum_is_configurable() {
    let catalogue = compact_catalogue_with(r#"{"minPhoneDigits": 10}"#);
    let step = &catalogue.steps()[0];
    let mut session = Session::new(catalogue.clone());
    fill_contact(&mut session);
    session.set_text("phone", "555 0100").unwrap();
    let (valid, errors) = validate_step(step, session.values(), catalogue.settings());
    assert!(!valid);
    assert_eq!(errors["phone"], FieldError::InvalidPhone);
}

#[test]
fn hidden_required_field_is_skipped() {
    let catalogue = compact_catalogue();
    let step = &catalogue.steps()[1];
    let mut session = Session::new(catalogue.clone());
    session.select_option("experience", "No").unwrap();
    session.toggle_option("subjects", "Math").unwrap();

    let (valid, errors) = validate_step(step, session.values(), catalogue.settings());
    assert!(valid, "unexpected errors: {:?}", errors);
}

#[test]
fn revealed_required_field_is_checked() {
    let catalogue = compact_catalogue();
    let step = &catalogue.steps()[1];
    let mut session = Session::new(catalogue.clone());
    session.select_option("experience", "Yes").unwrap();
    session.toggle_option("subjects", "Other").unwrap();

    let (valid, errors) = validate_step(step, session.values(), catalogue.settings());
    assert!(!valid);
    let names: Vec<&str> = errors.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["other_subject", "years"]);
}

#[test]
fn visibility_follows_the_latest_values() {
    let mut session = Session::new(tutor_catalogue());
    assert!(!session.is_visible("math"));

    let changed = session.toggle_option("tutoring_subjects", "Math").unwrap();
    assert!(changed.contains(&"math".to_string()));
    assert!(session.is_visible("math"));
    assert!(!session.is_visible("science"));

    session.toggle_option("tutoring_subjects", "Math").unwrap();
    assert!(!session.is_visible("math"));
}

#[test]
fn any_predicate_reveals_on_either_answer() {
    let mut session = Session::new(tutor_catalogue());
    session
        .select_option("teaching_experience", "Yes, teaching in classroom")
        .unwrap();
    assert!(!session.is_visible("tutoring_experience_yrs"));
    session
        .select_option("teaching_experience", "Yes for both tutoring and classroom teaching")
        .unwrap();
    assert!(session.is_visible("tutoring_experience_yrs"));
    session.select_option("teaching_experience", "Yes, tutoring").unwrap();
    assert!(session.is_visible("tutoring_experience_yrs"));
}

#[test]
fn blur_updates_only_the_blurred_field() {
    let mut session = Session::new(compact_catalogue());
    session.next().unwrap();
    assert_eq!(session.errors().len(), 3);

    session.set_text("email", "ada@example.com").unwrap();
    let error = session.blur("email").unwrap();
    assert!(error.is_none());
    assert_eq!(session.errors().len(), 2);
    assert!(session.errors().contains_key("name"));
    assert!(session.errors().contains_key("phone"));

    session.set_text("phone", "123").unwrap();
    let error = session.blur("phone").unwrap().cloned();
    assert_eq!(error, Some(FieldError::InvalidPhone));
}

#[test]
fn blur_on_hidden_field_clears_its_error() {
    let mut session = Session::new(compact_catalogue());
    session.set_text("years", "").unwrap();
    assert!(session.blur("years").unwrap().is_none());
}

#[test]
fn wrong_value_kind_is_refused() {
    let mut session = Session::new(compact_catalogue());
    assert_eq!(
        session.set_text("experience", "Yes"),
        Err(SessionError::KindMismatch {
            field: "experience".into(),
            kind: "singleSelect"
        })
    );
    assert!(matches!(
        session.toggle_option("name", "x"),
        Err(SessionError::KindMismatch { .. })
    ));
    assert_eq!(
        session.select_option("experience", "Maybe"),
        Err(SessionError::UnknownOption {
            field: "experience".into(),
            option: "Maybe".into()
        })
    );
    assert_eq!(
        session.set_text("nickname", "x"),
        Err(SessionError::UnknownField("nickname".into()))
    );
}

#[test]
fn error_messages_display() {
    insta::assert_snapshot!(
        FieldError::Required { label: "City".into() }.to_string(),
        @"City is required"
    );
    insta::assert_snapshot!(FieldError::InvalidEmail.to_string(), @"Please enter a valid email address");
    insta::assert_snapshot!(FieldError::InvalidPhone.to_string(), @"Please enter a valid phone number");
}
