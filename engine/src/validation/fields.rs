//! Standalone field validators.
//!
//! Each validator returns `None` when the value is acceptable and a
//! ready-to-report [`ValidationIssue`] otherwise, so platform-specific ad
//! checks can reuse them without the rest of the pipeline.

use chrono::NaiveDateTime;
use url::Url;

use crate::models::{EntityType, ErrorCode, ValidationIssue};
use crate::normalize::parse_date;

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn required_issue(
    field: &str,
    entity_type: EntityType,
    entity_id: &str,
    entity_name: &str,
) -> ValidationIssue {
    ValidationIssue::new(
        entity_type,
        entity_id,
        entity_name,
        field,
        ErrorCode::RequiredField,
        format!("{} is required", field),
    )
}

// =============================================================================
// Predicates
// =============================================================================

/// Absolute `http`/`https` URL with a host.
pub fn is_valid_url(value: &str) -> bool {
    match Url::parse(value.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Parse an ISO-8601-like date or datetime.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    parse_date(value)
}

pub fn is_valid_datetime(value: &str) -> bool {
    parse_datetime(value).is_some()
}

// =============================================================================
// Validators
// =============================================================================

/// Presence check.
pub fn validate_required_field(
    value: Option<&str>,
    field: &str,
    entity_type: EntityType,
    entity_id: &str,
    entity_name: &str,
) -> Option<ValidationIssue> {
    is_blank(value).then(|| required_issue(field, entity_type, entity_id, entity_name))
}

/// URL check. A missing value is only an error when `required`.
///
/// ```
/// use creative_sync::models::{EntityType, ErrorCode};
/// use creative_sync::validation::fields::validate_url_field;
///
/// let issue = validate_url_field(Some("not-a-url"), "finalUrl", EntityType::Ad, "id1", "Ad 1", true);
/// assert_eq!(issue.unwrap().code, ErrorCode::InvalidUrl);
/// assert!(validate_url_field(None, "finalUrl", EntityType::Ad, "id1", "Ad 1", false).is_none());
/// ```
pub fn validate_url_field(
    value: Option<&str>,
    field: &str,
    entity_type: EntityType,
    entity_id: &str,
    entity_name: &str,
    required: bool,
) -> Option<ValidationIssue> {
    match value {
        v if is_blank(v) => required.then(|| required_issue(field, entity_type, entity_id, entity_name)),
        Some(v) if !is_valid_url(v) => Some(
            ValidationIssue::new(
                entity_type,
                entity_id,
                entity_name,
                field,
                ErrorCode::InvalidUrl,
                format!("{} must be an absolute http(s) URL", field),
            )
            .with_value(v)
            .with_expected("http(s)://host/path"),
        ),
        _ => None,
    }
}

/// Datetime check. A missing value is only an error when `required`.
pub fn validate_datetime_field(
    value: Option<&str>,
    field: &str,
    entity_type: EntityType,
    entity_id: &str,
    entity_name: &str,
    required: bool,
) -> Option<ValidationIssue> {
    match value {
        v if is_blank(v) => required.then(|| required_issue(field, entity_type, entity_id, entity_name)),
        Some(v) if !is_valid_datetime(v) => Some(
            ValidationIssue::new(
                entity_type,
                entity_id,
                entity_name,
                field,
                ErrorCode::InvalidDate,
                format!("{} must be an ISO-8601 date or datetime", field),
            )
            .with_value(v)
            .with_expected("YYYY-MM-DD[THH:MM:SS]"),
        ),
        _ => None,
    }
}

/// `end` must not precede `start`. Unparseable or missing ends are ignored
/// here; [`validate_datetime_field`] reports those.
pub fn validate_date_range(
    start: Option<&str>,
    end: Option<&str>,
    end_field: &str,
    entity_type: EntityType,
    entity_id: &str,
    entity_name: &str,
) -> Option<ValidationIssue> {
    let start_raw = start?;
    let end_raw = end?;
    let (s, e) = (parse_datetime(start_raw)?, parse_datetime(end_raw)?);
    (e < s).then(|| {
        ValidationIssue::new(
            entity_type,
            entity_id,
            entity_name,
            end_field,
            ErrorCode::InvalidDateRange,
            format!("{} must not be earlier than the start date", end_field),
        )
        .with_value(end_raw)
        .with_expected(format!(">= {}", start_raw))
    })
}

/// Maximum length in characters.
pub fn validate_string_length(
    value: &str,
    max: usize,
    field: &str,
    entity_type: EntityType,
    entity_id: &str,
    entity_name: &str,
) -> Option<ValidationIssue> {
    let len = value.chars().count();
    (len > max).then(|| {
        ValidationIssue::new(
            entity_type,
            entity_id,
            entity_name,
            field,
            ErrorCode::LengthExceeded,
            format!("{} is {} characters, limit is {}", field, len, max),
        )
        .with_value(value)
        .with_expected(format!("<= {} characters", max))
    })
}

/// Membership in a closed set of allowed values.
#[allow(clippy::too_many_arguments)]
pub fn validate_enum_field(
    value: Option<&str>,
    allowed: &[String],
    case_sensitive: bool,
    field: &str,
    entity_type: EntityType,
    entity_id: &str,
    entity_name: &str,
    required: bool,
) -> Option<ValidationIssue> {
    match value {
        v if is_blank(v) => required.then(|| required_issue(field, entity_type, entity_id, entity_name)),
        Some(v) => {
            let v = v.trim();
            let found = allowed.iter().any(|a| {
                if case_sensitive {
                    a == v
                } else {
                    a.eq_ignore_ascii_case(v)
                }
            });
            (!found).then(|| {
                ValidationIssue::new(
                    entity_type,
                    entity_id,
                    entity_name,
                    field,
                    ErrorCode::InvalidEnum,
                    format!("{} must be one of: {}", field, allowed.join(", ")),
                )
                .with_value(v)
                .with_expected(allowed.join("|"))
            })
        }
        None => None,
    }
}
