//! Metadata matching: a small query language over event metadata.
//!
//! A [`MetadataMatcher`] is an ordered list of criteria that are ANDed
//! together. Each criterion compares one field (a metadata key, or one of the
//! event's intrinsic properties) against a value with an [`Operator`].
//!
//! Comparisons are strict and type-aware: `1` never equals `1.0` and `"1"`
//! never equals `1`. Operator/value mismatches are rejected when the criterion
//! is added, not when it is evaluated.

use core::cmp::Ordering;
use core::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use streamlog_core::{Event, Metadata, MetadataValue};

/// Matcher construction error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatcherError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Comparison operator of a single criterion.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanEquals,
    LowerThan,
    LowerThanEquals,
    In,
    NotIn,
    Regex,
}

impl Operator {
    fn requires_scalar(self) -> bool {
        matches!(
            self,
            Operator::Equals
                | Operator::NotEquals
                | Operator::GreaterThan
                | Operator::GreaterThanEquals
                | Operator::LowerThan
                | Operator::LowerThanEquals
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Equals => "EQUALS",
            Operator::NotEquals => "NOT_EQUALS",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::GreaterThanEquals => "GREATER_THAN_EQUALS",
            Operator::LowerThan => "LOWER_THAN",
            Operator::LowerThanEquals => "LOWER_THAN_EQUALS",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Regex => "REGEX",
        };
        f.write_str(s)
    }
}

/// Which class of field a criterion inspects.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// A key in the event's metadata mapping.
    Metadata,
    /// One of the event's intrinsic properties.
    MessageProperty,
}

/// Intrinsic event properties that can be matched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageProperty {
    /// Event id, compared as a hyphenated UUID string.
    Id,
    /// Event type name.
    TypeName,
    /// Creation time, compared as `YYYY-MM-DDTHH:MM:SS.ffffff`.
    CreatedAt,
}

impl MessageProperty {
    fn read(self, event: &Event) -> MetadataValue {
        match self {
            MessageProperty::Id => MetadataValue::String(event.id().to_string()),
            MessageProperty::TypeName => MetadataValue::String(event.name().to_string()),
            MessageProperty::CreatedAt => MetadataValue::String(event.created_at_string()),
        }
    }
}

/// The field a criterion inspects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Metadata(String),
    Property(MessageProperty),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Metadata(_) => FieldType::Metadata,
            Field::Property(_) => FieldType::MessageProperty,
        }
    }
}

/// Right-hand side of a criterion.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue {
    Scalar(MetadataValue),
    List(Vec<MetadataValue>),
}

impl From<MetadataValue> for MatchValue {
    fn from(value: MetadataValue) -> Self {
        MatchValue::Scalar(value)
    }
}

impl From<&str> for MatchValue {
    fn from(value: &str) -> Self {
        MatchValue::Scalar(value.into())
    }
}

impl From<String> for MatchValue {
    fn from(value: String) -> Self {
        MatchValue::Scalar(value.into())
    }
}

impl From<i64> for MatchValue {
    fn from(value: i64) -> Self {
        MatchValue::Scalar(value.into())
    }
}

impl From<i32> for MatchValue {
    fn from(value: i32) -> Self {
        MatchValue::Scalar(value.into())
    }
}

impl From<f64> for MatchValue {
    fn from(value: f64) -> Self {
        MatchValue::Scalar(value.into())
    }
}

impl From<bool> for MatchValue {
    fn from(value: bool) -> Self {
        MatchValue::Scalar(value.into())
    }
}

impl From<Vec<MetadataValue>> for MatchValue {
    fn from(value: Vec<MetadataValue>) -> Self {
        MatchValue::List(value)
    }
}

impl From<Vec<&str>> for MatchValue {
    fn from(value: Vec<&str>) -> Self {
        MatchValue::List(value.into_iter().map(MetadataValue::from).collect())
    }
}

impl From<Vec<i64>> for MatchValue {
    fn from(value: Vec<i64>) -> Self {
        MatchValue::List(value.into_iter().map(MetadataValue::from).collect())
    }
}

/// A single validated criterion.
#[derive(Debug, Clone)]
pub struct Criterion {
    field: Field,
    operator: Operator,
    value: MatchValue,
    pattern: Option<Regex>,
}

impl Criterion {
    fn new(field: Field, operator: Operator, value: MatchValue) -> Result<Self, MatcherError> {
        let pattern = match (&value, operator) {
            (MatchValue::List(_), op) if op.requires_scalar() => {
                return Err(MatcherError::InvalidArgument(format!(
                    "operator {op} requires a scalar value"
                )));
            }
            (MatchValue::Scalar(v), Operator::In | Operator::NotIn) => {
                return Err(MatcherError::InvalidArgument(format!(
                    "operator {operator} requires a list value, got {}",
                    v.type_name()
                )));
            }
            (MatchValue::Scalar(MetadataValue::String(p)), Operator::Regex) => {
                let re = Regex::new(p).map_err(|e| {
                    MatcherError::InvalidArgument(format!("invalid regex pattern {p:?}: {e}"))
                })?;
                Some(re)
            }
            (_, Operator::Regex) => {
                return Err(MatcherError::InvalidArgument(
                    "operator REGEX requires a string pattern".to_string(),
                ));
            }
            _ => None,
        };

        Ok(Self {
            field,
            operator,
            value,
            pattern,
        })
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &MatchValue {
        &self.value
    }

    fn holds(&self, candidate: &MetadataValue) -> bool {
        match (&self.value, self.operator) {
            (MatchValue::Scalar(expected), Operator::Equals) => candidate == expected,
            (MatchValue::Scalar(expected), Operator::NotEquals) => candidate != expected,
            (MatchValue::Scalar(expected), Operator::GreaterThan) => {
                compare(candidate, expected) == Some(Ordering::Greater)
            }
            (MatchValue::Scalar(expected), Operator::GreaterThanEquals) => matches!(
                compare(candidate, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            (MatchValue::Scalar(expected), Operator::LowerThan) => {
                compare(candidate, expected) == Some(Ordering::Less)
            }
            (MatchValue::Scalar(expected), Operator::LowerThanEquals) => matches!(
                compare(candidate, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            (MatchValue::List(list), Operator::In) => list.contains(candidate),
            (MatchValue::List(list), Operator::NotIn) => !list.contains(candidate),
            (_, Operator::Regex) => match (&self.pattern, candidate.as_str()) {
                (Some(re), Some(s)) => re.is_match(s),
                _ => false,
            },
            _ => false,
        }
    }
}

/// Ordered comparison between two scalars.
///
/// Numbers compare numerically across int/float; strings and booleans only
/// with their own kind. Anything else is unordered.
fn compare(left: &MetadataValue, right: &MetadataValue) -> Option<Ordering> {
    use MetadataValue as V;

    match (left, right) {
        (V::Int(a), V::Int(b)) => Some(a.cmp(b)),
        (V::Int(a), V::Float(b)) => (*a as f64).partial_cmp(b),
        (V::Float(a), V::Int(b)) => a.partial_cmp(&(*b as f64)),
        (V::Float(a), V::Float(b)) => a.partial_cmp(b),
        (V::String(a), V::String(b)) => Some(a.cmp(b)),
        (V::Bool(a), V::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Composable predicate over event metadata and intrinsic properties.
///
/// Immutable: every `with_*` call returns a new matcher.
#[derive(Debug, Clone, Default)]
pub struct MetadataMatcher {
    criteria: Vec<Criterion>,
}

impl MetadataMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a criterion on a metadata key.
    pub fn with_metadata_match(
        &self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<MatchValue>,
    ) -> Result<Self, MatcherError> {
        self.with_criterion(Field::Metadata(field.into()), operator, value.into())
    }

    /// Add a criterion on an intrinsic event property.
    pub fn with_property_match(
        &self,
        property: MessageProperty,
        operator: Operator,
        value: impl Into<MatchValue>,
    ) -> Result<Self, MatcherError> {
        self.with_criterion(Field::Property(property), operator, value.into())
    }

    fn with_criterion(
        &self,
        field: Field,
        operator: Operator,
        value: MatchValue,
    ) -> Result<Self, MatcherError> {
        let criterion = Criterion::new(field, operator, value)?;
        let mut next = self.clone();
        next.criteria.push(criterion);
        Ok(next)
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Does the event satisfy every criterion?
    pub fn matches(&self, event: &Event) -> bool {
        self.criteria.iter().all(|c| match &c.field {
            Field::Metadata(key) => event.metadata().get(key).is_some_and(|v| c.holds(v)),
            Field::Property(property) => c.holds(&property.read(event)),
        })
    }

    /// Does a bare metadata mapping (e.g. stream metadata) satisfy every criterion?
    ///
    /// Property criteria never hold here: there is no event to read them from.
    pub fn matches_metadata(&self, metadata: &Metadata) -> bool {
        self.criteria.iter().all(|c| match &c.field {
            Field::Metadata(key) => metadata.get(key).is_some_and(|v| c.holds(v)),
            Field::Property(_) => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_with(metadata: Metadata) -> Event {
        Event::new("UserCreated", json!({})).with_metadata(metadata)
    }

    #[test]
    fn equals_accepts_same_value_and_rejects_other() {
        let matcher = MetadataMatcher::new()
            .with_metadata_match("foo", Operator::Equals, "bar")
            .unwrap();

        assert!(matcher.matches(&event_with(Metadata::new().with("foo", "bar"))));
        assert!(!matcher.matches(&event_with(Metadata::new().with("foo", "baz"))));
    }

    #[test]
    fn criteria_are_anded() {
        let matcher = MetadataMatcher::new()
            .with_metadata_match("foo", Operator::Equals, "bar")
            .unwrap()
            .with_metadata_match("foo", Operator::NotEquals, "baz")
            .unwrap();

        assert!(matcher.matches(&event_with(Metadata::new().with("foo", "bar"))));

        let stricter = matcher
            .with_metadata_match("count", Operator::GreaterThan, 5)
            .unwrap();
        assert!(!stricter.matches(&event_with(Metadata::new().with("foo", "bar").with("count", 3))));
        assert!(stricter.matches(&event_with(Metadata::new().with("foo", "bar").with("count", 6))));
    }

    #[test]
    fn builder_does_not_mutate_original() {
        let base = MetadataMatcher::new();
        let extended = base.with_metadata_match("a", Operator::Equals, 1).unwrap();

        assert!(base.is_empty());
        assert_eq!(extended.criteria().len(), 1);
    }

    #[test]
    fn equality_is_strict_about_types() {
        let matcher = MetadataMatcher::new()
            .with_metadata_match("version", Operator::Equals, 1)
            .unwrap();

        assert!(matcher.matches(&event_with(Metadata::new().with("version", 1))));
        assert!(!matcher.matches(&event_with(Metadata::new().with("version", 1.0))));
        assert!(!matcher.matches(&event_with(Metadata::new().with("version", "1"))));
    }

    #[test]
    fn ordering_operators_compare_numbers_across_int_and_float() {
        let gte = MetadataMatcher::new()
            .with_metadata_match("n", Operator::GreaterThanEquals, 2)
            .unwrap();
        let lt = MetadataMatcher::new()
            .with_metadata_match("n", Operator::LowerThan, 2.5)
            .unwrap();

        assert!(gte.matches(&event_with(Metadata::new().with("n", 2.0))));
        assert!(!gte.matches(&event_with(Metadata::new().with("n", 1))));
        assert!(lt.matches(&event_with(Metadata::new().with("n", 2))));
        assert!(!lt.matches(&event_with(Metadata::new().with("n", "2"))));
    }

    #[test]
    fn lower_than_equals_on_strings_is_lexical() {
        let matcher = MetadataMatcher::new()
            .with_metadata_match("s", Operator::LowerThanEquals, "m")
            .unwrap();

        assert!(matcher.matches(&event_with(Metadata::new().with("s", "a"))));
        assert!(matcher.matches(&event_with(Metadata::new().with("s", "m"))));
        assert!(!matcher.matches(&event_with(Metadata::new().with("s", "z"))));
    }

    #[test]
    fn in_and_not_in_test_membership() {
        let within = MetadataMatcher::new()
            .with_metadata_match("tier", Operator::In, vec!["gold", "silver"])
            .unwrap();
        let outside = MetadataMatcher::new()
            .with_metadata_match("tier", Operator::NotIn, vec!["gold", "silver"])
            .unwrap();

        let gold = event_with(Metadata::new().with("tier", "gold"));
        let bronze = event_with(Metadata::new().with("tier", "bronze"));

        assert!(within.matches(&gold));
        assert!(!within.matches(&bronze));
        assert!(!outside.matches(&gold));
        assert!(outside.matches(&bronze));
    }

    #[test]
    fn regex_matches_string_values_only() {
        let matcher = MetadataMatcher::new()
            .with_metadata_match("email", Operator::Regex, r"@example\.com$")
            .unwrap();

        assert!(matcher.matches(&event_with(Metadata::new().with("email", "a@example.com"))));
        assert!(!matcher.matches(&event_with(Metadata::new().with("email", "a@other.org"))));
        assert!(!matcher.matches(&event_with(Metadata::new().with("email", 7))));
    }

    #[test]
    fn missing_key_fails_every_operator() {
        let not_equals = MetadataMatcher::new()
            .with_metadata_match("foo", Operator::NotEquals, "bar")
            .unwrap();
        let not_in = MetadataMatcher::new()
            .with_metadata_match("foo", Operator::NotIn, vec!["bar"])
            .unwrap();

        let event = event_with(Metadata::new());
        assert!(!not_equals.matches(&event));
        assert!(!not_in.matches(&event));
    }

    #[test]
    fn invalid_operator_value_combinations_fail_at_construction() {
        let m = MetadataMatcher::new();

        assert!(matches!(
            m.with_metadata_match("a", Operator::Equals, vec!["x"]),
            Err(MatcherError::InvalidArgument(_))
        ));
        assert!(matches!(
            m.with_metadata_match("a", Operator::GreaterThan, vec![1_i64]),
            Err(MatcherError::InvalidArgument(_))
        ));
        assert!(matches!(
            m.with_metadata_match("a", Operator::In, "x"),
            Err(MatcherError::InvalidArgument(_))
        ));
        assert!(matches!(
            m.with_metadata_match("a", Operator::Regex, "(unclosed"),
            Err(MatcherError::InvalidArgument(_))
        ));
        assert!(matches!(
            m.with_metadata_match("a", Operator::Regex, 3),
            Err(MatcherError::InvalidArgument(_))
        ));
    }

    #[test]
    fn message_properties_are_matchable() {
        let event = Event::new("UserCreated", json!({}));

        let by_name = MetadataMatcher::new()
            .with_property_match(MessageProperty::TypeName, Operator::Equals, "UserCreated")
            .unwrap();
        let by_id = MetadataMatcher::new()
            .with_property_match(MessageProperty::Id, Operator::Equals, event.id().to_string())
            .unwrap();
        let after_epoch = MetadataMatcher::new()
            .with_property_match(
                MessageProperty::CreatedAt,
                Operator::GreaterThan,
                "2000-01-01T00:00:00.000000",
            )
            .unwrap();

        assert!(by_name.matches(&event));
        assert!(by_id.matches(&event));
        assert!(after_epoch.matches(&event));
        assert!(!by_name.matches(&Event::new("UserDeleted", json!({}))));
    }

    #[test]
    fn property_criteria_never_hold_against_stream_metadata() {
        let matcher = MetadataMatcher::new()
            .with_property_match(MessageProperty::TypeName, Operator::Equals, "x")
            .unwrap();

        assert!(!matcher.matches_metadata(&Metadata::new().with("type_name", "x")));
    }
}
