// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client-side form validation.
//!
//! Forms are plain structs deriving [`validator::Validate`]. [`check`] turns
//! the derive's output into [`FieldErrors`], a per-field message map the
//! screens render inline. Invalid forms never reach the backend.

use crate::error::AppError;
use std::collections::BTreeMap;
use std::fmt;
use validator::{Validate, ValidationError, ValidationErrors};

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Messages for one field, empty if the field is valid.
    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of the invalid fields, sorted.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn first_message(&self) -> Option<&str> {
        self.fields
            .values()
            .flat_map(|messages| messages.iter())
            .next()
            .map(String::as_str)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(", "))?;
        }
        Ok(())
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, list) in errors.field_errors() {
            for error in list.iter() {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| error.code.to_string());
                out.add(field.to_string(), message);
            }
        }
        out
    }
}

/// Validate a form, mapping failures to [`AppError::Validation`].
pub fn check<T: Validate>(form: &T) -> Result<(), AppError> {
    form.validate()
        .map_err(|errors| AppError::Validation(errors.into()))
}

/// Rejects empty and whitespace-only strings.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("Champ requis".into());
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 3, message = "Titre requis"))]
        title: String,
        #[validate(custom(function = "not_blank"))]
        content: String,
    }

    #[test]
    fn test_collects_messages_per_field() {
        let probe = Probe {
            title: "ab".to_string(),
            content: "   ".to_string(),
        };

        let err = check(&probe).unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };

        assert_eq!(errors.messages("title"), ["Titre requis".to_string()]);
        assert_eq!(errors.messages("content"), ["Champ requis".to_string()]);
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["content", "title"]);
    }

    #[test]
    fn test_valid_form_passes() {
        let probe = Probe {
            title: "Wifi".to_string(),
            content: "ok".to_string(),
        };
        assert!(check(&probe).is_ok());
    }
}
