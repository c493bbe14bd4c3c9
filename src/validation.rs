//! Identifier grammar checks for tokens spliced into statement text.
//!
//! Labels and relationship types cannot be bound as statement parameters, so they are
//! the only caller-controlled values that reach statement text lexically. Every such
//! value goes through [`validate`] (usually via [`Identifier::parse`]); there is no
//! escaping fallback.

use std::fmt;

use thiserror::Error;

/// Longest identifier the backend accepts, in characters.
pub const MAX_IDENTIFIER_LEN: usize = 65_535;

/// Role name used in messages for node labels.
pub const LABEL: &str = "label";

/// Role name used in messages for relationship types.
pub const RELATIONSHIP_TYPE: &str = "relationship type";

/// Reasons an identifier was rejected. Messages name the offending role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The value was the empty string.
    #[error("{role} cannot be empty")]
    Empty {
        /// Role of the rejected value, e.g. `"label"`.
        role: &'static str,
    },
    /// The value exceeded [`MAX_IDENTIFIER_LEN`] characters.
    #[error("{role} is too long (max {MAX_IDENTIFIER_LEN} characters)")]
    TooLong {
        /// Role of the rejected value.
        role: &'static str,
    },
    /// The value did not match `^[A-Za-z_][A-Za-z0-9_]*$`.
    #[error(
        "{role} must contain only alphanumeric characters and underscores, \
         and start with a letter or underscore (got '{value}')"
    )]
    Malformed {
        /// Role of the rejected value.
        role: &'static str,
        /// The rejected value, truncated for display.
        value: String,
    },
}

/// Checks that `value` may be placed in a label or relationship-type position.
pub fn validate(value: &str, role: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { role });
    }
    if value.chars().nth(MAX_IDENTIFIER_LEN).is_some() {
        return Err(ValidationError::TooLong { role });
    }
    let mut chars = value.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::Malformed {
            role,
            value: display_prefix(value),
        });
    }
    Ok(())
}

/// Applies [`validate`] to every element, stopping at the first failure.
pub fn validate_all<I, S>(values: I, role: &'static str) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .try_for_each(|value| validate(value.as_ref(), role))
}

fn display_prefix(value: &str) -> String {
    const LIMIT: usize = 64;
    match value.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &value[..cut]),
        None => value.to_string(),
    }
}

/// A label or relationship type that passed [`validate`].
///
/// Statement builders only accept this type in label/type positions, so raw strings
/// cannot reach statement text without going through the grammar check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Validates `value` for `role` and wraps it.
    pub fn parse(value: impl Into<String>, role: &'static str) -> Result<Self, ValidationError> {
        let value = value.into();
        validate(&value, role)?;
        Ok(Self(value))
    }

    /// Validates every element of `values`, short-circuiting on the first failure.
    pub fn parse_all<S>(values: &[S], role: &'static str) -> Result<Vec<Self>, ValidationError>
    where
        S: AsRef<str>,
    {
        values
            .iter()
            .map(|value| Self::parse(value.as_ref(), role))
            .collect()
    }

    /// Borrows the validated text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        for value in ["Person", "_hidden", "KNOWS", "a1_b2", "x"] {
            assert_eq!(validate(value, LABEL), Ok(()), "{value}");
        }
    }

    #[test]
    fn rejects_injection_shapes() {
        for value in ["1abc", "Person:Admin", "a b", "x{y}", "DROP`", "é", "a-b", "n) DETACH DELETE (m"] {
            let err = validate(value, RELATIONSHIP_TYPE).unwrap_err();
            assert!(matches!(err, ValidationError::Malformed { .. }), "{value}");
            assert!(err.to_string().starts_with("relationship type"));
        }
    }

    #[test]
    fn empty_message_names_role() {
        let err = validate("", LABEL).unwrap_err();
        assert_eq!(err.to_string(), "label cannot be empty");
    }

    #[test]
    fn length_boundary() {
        let longest = "a".repeat(MAX_IDENTIFIER_LEN);
        assert!(validate(&longest, LABEL).is_ok());
        let too_long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert_eq!(
            validate(&too_long, LABEL),
            Err(ValidationError::TooLong { role: LABEL })
        );
    }

    #[test]
    fn validate_all_reports_first_failure() {
        let err = validate_all(["Ok", "bad label", "9also_bad"], LABEL).unwrap_err();
        match err {
            ValidationError::Malformed { value, .. } => assert_eq!(value, "bad label"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(validate_all(Vec::<String>::new(), LABEL).is_ok());
    }

    #[test]
    fn malformed_value_is_truncated_in_message() {
        let noisy = format!("{}!", "x".repeat(200));
        let err = validate(&noisy, LABEL).unwrap_err();
        assert!(err.to_string().len() < 200);
    }

    #[test]
    fn identifier_parse_all_keeps_order() {
        let ids = Identifier::parse_all(&["Person", "Employee"], LABEL).unwrap();
        let names: Vec<&str> = ids.iter().map(Identifier::as_str).collect();
        assert_eq!(names, ["Person", "Employee"]);
        assert!(Identifier::parse_all(&["Person", ""], LABEL).is_err());
    }
}
