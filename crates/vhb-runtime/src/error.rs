#![forbid(unsafe_code)]

//! Error types for host payloads and engine construction.
//!
//! None of these cross the host boundary as faults: entry points log them
//! and map them to `false`, `None` or `null`.

use vhb_core::ViewportSpecification;

/// A host payload did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Malformed JSON.
    Json(String),
    /// Missing required field.
    MissingField(&'static str),
    /// Field present but unusable.
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

impl core::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Json(msg) => write!(f, "JSON parse error: {msg}"),
            Self::MissingField(field) => write!(f, "missing required field: {field}"),
            Self::InvalidField { field, reason } => write!(f, "invalid field {field}: {reason}"),
        }
    }
}

impl std::error::Error for PayloadError {}

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// The viewport resolver could not produce a root.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// Every candidate was tried and rejected.
    Exhausted { attempts: usize },
    /// The transform reported a chosen specification that is not among the
    /// remaining candidates, so the loop cannot make progress.
    ChosenSpecificationMissing {
        spec: Option<ViewportSpecification>,
        attempts: usize,
    },
}

impl ResolveError {
    /// Stable numeric code for the host.
    pub const fn code(&self) -> i32 {
        match self {
            Self::Exhausted { .. } => 1,
            Self::ChosenSpecificationMissing { .. } => 2,
        }
    }

    pub const fn attempts(&self) -> usize {
        match self {
            Self::Exhausted { attempts } | Self::ChosenSpecificationMissing { attempts, .. } => {
                *attempts
            }
        }
    }
}

impl core::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Exhausted { attempts } => {
                write!(f, "no viewport candidate inflated after {attempts} attempt(s)")
            }
            Self::ChosenSpecificationMissing {
                spec: Some(spec),
                attempts,
            } => write!(
                f,
                "chosen {spec} is not a remaining candidate (after {attempts} attempt(s))"
            ),
            Self::ChosenSpecificationMissing {
                spec: None,
                attempts,
            } => write!(
                f,
                "transform chose no specification while candidates remain (after {attempts} attempt(s))"
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Engine instance construction failed.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateError {
    Payload(PayloadError),
    Resolve(ResolveError),
}

impl core::fmt::Display for CreateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Payload(err) => write!(f, "invalid create payload: {err}"),
            Self::Resolve(err) => write!(f, "cannot create root context: {err}"),
        }
    }
}

impl std::error::Error for CreateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Payload(err) => Some(err),
            Self::Resolve(err) => Some(err),
        }
    }
}

impl From<PayloadError> for CreateError {
    fn from(err: PayloadError) -> Self {
        Self::Payload(err)
    }
}

impl From<ResolveError> for CreateError {
    fn from(err: ResolveError) -> Self {
        Self::Resolve(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vhb_core::ViewportMode;

    #[test]
    fn resolve_error_codes_are_distinct() {
        let exhausted = ResolveError::Exhausted { attempts: 2 };
        let missing = ResolveError::ChosenSpecificationMissing {
            spec: Some(ViewportSpecification::fixed(1.0, 1.0, ViewportMode::Hub, false)),
            attempts: 1,
        };
        assert_ne!(exhausted.code(), missing.code());
        assert_eq!(exhausted.attempts(), 2);
        assert_eq!(missing.attempts(), 1);
        assert!(missing.to_string().contains("not a remaining candidate"));
    }

    #[test]
    fn payload_error_from_json() {
        let err: PayloadError = serde_json::from_str::<serde_json::Value>("{")
            .map_err(PayloadError::from)
            .unwrap_err();
        assert!(matches!(err, PayloadError::Json(_)));
        assert_eq!(
            PayloadError::MissingField("code").to_string(),
            "missing required field: code"
        );
    }

    #[test]
    fn create_error_wraps_source() {
        use std::error::Error as _;
        let err = CreateError::from(ResolveError::Exhausted { attempts: 3 });
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("cannot create root context"));
    }
}
