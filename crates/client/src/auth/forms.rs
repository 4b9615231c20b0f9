//! Login and registration form schemas.
//!
//! Field rules are declared with `validator`. The password strength rules
//! are checked separately so that every violated rule is reported at once.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use validator::{Validate, ValidationError, ValidationErrors};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());

pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    Length,
    LetterCase,
    DigitAndSymbol,
}

impl PasswordRule {
    pub fn code(self) -> &'static str {
        match self {
            PasswordRule::Length => "password_length",
            PasswordRule::LetterCase => "password_case",
            PasswordRule::DigitAndSymbol => "password_digit_symbol",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            PasswordRule::Length => "Password must be between 8 and 8192 characters",
            PasswordRule::LetterCase => "Password must contain upper and lower case letters",
            PasswordRule::DigitAndSymbol => "Password must contain a digit and a symbol",
        }
    }

    fn error(self) -> ValidationError {
        ValidationError::new(self.code()).with_message(Cow::Borrowed(self.message()))
    }
}

/// Every strength rule `password` breaks, in display order.
pub fn password_violations(password: &str) -> Vec<PasswordRule> {
    let mut violations = Vec::new();

    let len = password.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
        violations.push(PasswordRule::Length);
    }

    let upper = password.chars().any(|c| c.is_uppercase());
    let lower = password.chars().any(|c| c.is_lowercase());
    if !(upper && lower) {
        violations.push(PasswordRule::LetterCase);
    }

    let digit = password.chars().any(|c| c.is_ascii_digit());
    let symbol = password.chars().any(|c| !c.is_alphanumeric());
    if !(digit && symbol) {
        violations.push(PasswordRule::DigitAndSymbol);
    }

    violations
}

#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct LoginForm {
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl LoginForm {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            password: password.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct RegisterForm {
    #[validate(
        length(min = 3, max = 20, message = "Username must be 3 to 20 characters"),
        regex(
            path = *USERNAME_RE,
            message = "Username must start with a letter and use only letters, digits and _"
        )
    )]
    pub username: String,
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    pub password: String,
}

impl RegisterForm {
    pub fn new(username: &str, email: &str, password: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        }
    }

    /// Field rules plus every violated password rule.
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        for rule in password_violations(&self.password) {
            errors.add("password", rule.error());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn can_submit(&self) -> bool {
        self.check().is_ok()
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct ConfirmForm {
    #[validate(length(min = 1, message = "Enter the code sent to your email"))]
    pub code: String,
    #[validate(length(min = 1, message = "No registration is pending"))]
    pub token: String,
}

/// Flatten errors into `field: message` lines for display.
pub fn describe(errors: &ValidationErrors) -> Vec<String> {
    let mut lines: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{field}: {message}")
            })
        })
        .collect();
    lines.sort();
    lines
}
