//! Input checks for signup and patient forms
//!
//! Failures come back as a field -> messages map, the same shape the API
//! reports for 422 responses, so callers can render both the same way.

use std::collections::BTreeMap;

use super::models::{CreatePatientRequest, SignupRequest, UpdatePatientRequest};

pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 100;

#[derive(Default)]
struct Collector {
    errors: FieldErrors,
}

impl Collector {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_string()).or_default().push(message.into());
    }

    fn finish(self) -> Result<(), FieldErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.chars().any(char::is_whitespace)
}

/// Digits with optional `+`, spaces, dashes, dots and parentheses; 7 to 15 digits
pub fn is_valid_phone(phone: &str) -> bool {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.'));
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    allowed && (7..=15).contains(&digits)
}

fn check_name(c: &mut Collector, field: &str, name: &str) {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        c.push(field, "Name is required");
    } else if trimmed.chars().count() > MAX_NAME_LEN {
        c.push(field, format!("Name must be at most {} characters", MAX_NAME_LEN));
    }
}

fn check_password(c: &mut Collector, password: &str) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        c.push(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }
    if !password.chars().any(|ch| ch.is_ascii_digit()) {
        c.push("password", "Password must contain a number");
    }
    if !password.chars().any(char::is_alphabetic) {
        c.push("password", "Password must contain a letter");
    }
}

pub fn validate_signup(request: &SignupRequest) -> Result<(), FieldErrors> {
    let mut c = Collector::default();
    if !is_valid_email(&request.email) {
        c.push("email", "Enter a valid email address");
    }
    check_password(&mut c, &request.password);
    check_name(&mut c, "full_name", &request.full_name);
    c.finish()
}

pub fn validate_new_patient(request: &CreatePatientRequest) -> Result<(), FieldErrors> {
    let mut c = Collector::default();
    check_name(&mut c, "name", &request.name);
    if let Some(email) = &request.email {
        if !is_valid_email(email) {
            c.push("email", "Enter a valid email address");
        }
    }
    if let Some(phone) = &request.phone {
        if !is_valid_phone(phone) {
            c.push("phone", "Enter a valid phone number");
        }
    }
    c.finish()
}

pub fn validate_patient_update(request: &UpdatePatientRequest) -> Result<(), FieldErrors> {
    let mut c = Collector::default();
    if let Some(name) = &request.name {
        check_name(&mut c, "name", name);
    }
    if let Some(email) = &request.email {
        if !is_valid_email(email) {
            c.push("email", "Enter a valid email address");
        }
    }
    if let Some(phone) = &request.phone {
        if !is_valid_phone(phone) {
            c.push("phone", "Enter a valid phone number");
        }
    }
    c.finish()
}
