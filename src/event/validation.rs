use super::DispatchEvent;
use chrono::Utc;
use std::fmt;
use uuid::Uuid;

/// Validation errors for DispatchEvent
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingSource,
    MissingDetailType,
    InvalidSourceFormat(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingSource => write!(f, "source is required"),
            ValidationError::MissingDetailType => write!(f, "detail-type is required"),
            ValidationError::InvalidSourceFormat(s) => {
                write!(
                    f,
                    "invalid source format '{}': must be lowercase with optional dots or hyphens",
                    s
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates and prepares a DispatchEvent for publishing.
///
/// Validation rules:
/// - Required fields: source, detail-type
/// - Source format: lowercase letters, numbers, dots, hyphens (e.g., "restaurant-app-events")
/// - Id: auto-generated UUIDv7 if missing or empty
/// - Time: set to now if missing
///
/// `detail-type` is not checked against the mutation list here; unknown
/// types are a dispatch-time decision.
pub fn validate_and_prepare(event: &mut DispatchEvent) -> Result<(), ValidationError> {
    if event.source.is_empty() {
        return Err(ValidationError::MissingSource);
    }
    if event.detail_type.trim().is_empty() {
        return Err(ValidationError::MissingDetailType);
    }

    if !is_valid_source(&event.source) {
        return Err(ValidationError::InvalidSourceFormat(event.source.clone()));
    }

    if event.id.as_deref().map_or(true, str::is_empty) {
        event.id = Some(Uuid::now_v7().to_string());
    }
    if event.time.is_none() {
        event.time = Some(Utc::now());
    }

    Ok(())
}

/// Validates source attribute format.
///
/// The source becomes a NATS subject token, so it may not contain
/// whitespace, wildcards or empty dot segments.
fn is_valid_source(source: &str) -> bool {
    if source.is_empty() {
        return false;
    }

    if source.starts_with('.') || source.ends_with('.') {
        return false;
    }

    if source.contains("..") {
        return false;
    }

    source
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn test_valid_sources() {
        assert!(is_valid_source("restaurant-app-events"));
        assert!(is_valid_source("booking.workflow"));
        assert!(is_valid_source("svc2"));
    }

    #[test]
    fn test_invalid_sources() {
        assert!(!is_valid_source(""));
        assert!(!is_valid_source(".events"));
        assert!(!is_valid_source("events."));
        assert!(!is_valid_source("a..b"));
        assert!(!is_valid_source("Restaurant"));
        assert!(!is_valid_source("events>"));
        assert!(!is_valid_source("events *"));
        assert!(!is_valid_source("app_events"));
    }
}
