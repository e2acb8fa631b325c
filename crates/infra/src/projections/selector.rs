//! Selector grammar of projection rules.
//!
//! - target selectors address the projection document: `name`,
//!   `meta.owner`, `todos[?].status` (optionally prefixed with `$.projection.`)
//! - event selectors address the event data: `$.event.todoId` or `todoId`
//! - filters narrow a `[?]` segment to matching array elements:
//!   `[?(@.todoId == $.event.todoId)]` or `[?(@.kind == 'shipped')]`

use std::fmt;

use serde_json::Value as JsonValue;

use super::definition::DefinitionError;

const PROJECTION_PREFIX: &str = "$.projection.";
const EVENT_PREFIX: &str = "$.event.";
const WILDCARD: &str = "[?]";

fn parse_path(raw: &str) -> Option<Vec<String>> {
    let fields: Vec<String> = raw.split('.').map(str::to_string).collect();
    let valid = fields
        .iter()
        .all(|f| !f.is_empty() && !f.contains(['[', ']', '(', ')', ' ', '$', '@']));
    valid.then_some(fields)
}

fn lookup<'a>(root: &'a JsonValue, path: &[String]) -> Option<&'a JsonValue> {
    path.iter().try_fold(root, |node, field| node.get(field))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    /// An array whose elements are narrowed by the rule's filter.
    Filtered(String),
}

impl Segment {
    pub fn name(&self) -> &str {
        match self {
            Segment::Field(name) | Segment::Filtered(name) => name,
        }
    }
}

/// Location inside a projection document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSelector {
    raw: String,
    segments: Vec<Segment>,
}

impl TargetSelector {
    pub fn parse(raw: &str) -> Result<Self, DefinitionError> {
        let invalid = |reason: &str| DefinitionError::InvalidSelector {
            selector: raw.to_string(),
            reason: reason.to_string(),
        };

        let path = raw.strip_prefix(PROJECTION_PREFIX).unwrap_or(raw);
        if path.is_empty() {
            return Err(invalid("selector is empty"));
        }

        let mut segments = Vec::new();
        for part in path.split('.') {
            let segment = match part.strip_suffix(WILDCARD) {
                Some(name) => Segment::Filtered(name.to_string()),
                None => Segment::Field(part.to_string()),
            };
            if parse_path(segment.name()).is_none() {
                return Err(invalid(&format!("invalid segment '{part}'")));
            }
            segments.push(segment);
        }

        if matches!(segments.last(), Some(Segment::Filtered(_))) {
            return Err(invalid("a `[?]` segment must be followed by a field"));
        }
        if segments.iter().filter(|s| matches!(s, Segment::Filtered(_))).count() > 1 {
            return Err(invalid("at most one `[?]` segment is supported"));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_filtered(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Filtered(_)))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Location inside an event's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSelector {
    raw: String,
    path: Vec<String>,
}

impl EventSelector {
    pub fn parse(raw: &str) -> Result<Self, DefinitionError> {
        let path = raw.strip_prefix(EVENT_PREFIX).unwrap_or(raw);
        let path = parse_path(path).ok_or_else(|| DefinitionError::InvalidSelector {
            selector: raw.to_string(),
            reason: "expected a dotted field path".to_string(),
        })?;
        Ok(Self {
            raw: raw.to_string(),
            path,
        })
    }

    pub fn select<'a>(&self, data: &'a JsonValue) -> Option<&'a JsonValue> {
        lookup(data, &self.path)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Right-hand side of a filter comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Event(EventSelector),
    Literal(JsonValue),
}

impl Operand {
    fn resolve<'a>(&'a self, event_data: &'a JsonValue) -> Option<&'a JsonValue> {
        match self {
            Operand::Event(selector) => selector.select(event_data),
            Operand::Literal(value) => Some(value),
        }
    }
}

/// Equality filter applied to the elements of a `[?]` array.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFilter {
    raw: String,
    field: Vec<String>,
    operand: Operand,
}

impl TargetFilter {
    pub fn parse(raw: &str) -> Result<Self, DefinitionError> {
        let invalid = |reason: &str| DefinitionError::InvalidFilter {
            filter: raw.to_string(),
            reason: reason.to_string(),
        };

        let body = raw
            .trim()
            .strip_prefix("[?(")
            .and_then(|s| s.strip_suffix(")]"))
            .ok_or_else(|| invalid("expected `[?(@.<field> == <operand>)]`"))?;
        let (lhs, rhs) = body
            .split_once("==")
            .ok_or_else(|| invalid("only `==` comparisons are supported"))?;

        let field = lhs
            .trim()
            .strip_prefix("@.")
            .and_then(parse_path)
            .ok_or_else(|| invalid("left-hand side must be `@.<field>`"))?;

        let rhs = rhs.trim();
        let operand = if rhs.starts_with(EVENT_PREFIX) {
            Operand::Event(EventSelector::parse(rhs)?)
        } else if let Some(text) = rhs.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            Operand::Literal(JsonValue::String(text.to_string()))
        } else {
            let literal: JsonValue = serde_json::from_str(rhs)
                .map_err(|_| invalid("right-hand side must be `$.event.<path>` or a JSON literal"))?;
            Operand::Literal(literal)
        };

        Ok(Self {
            raw: raw.to_string(),
            field,
            operand,
        })
    }

    pub fn matches(&self, element: &JsonValue, event_data: &JsonValue) -> bool {
        match (lookup(element, &self.field), self.operand.resolve(event_data)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_plain_and_filtered_targets() {
        let t = TargetSelector::parse("todos[?].status").unwrap();
        assert_eq!(
            t.segments(),
            &[
                Segment::Filtered("todos".to_string()),
                Segment::Field("status".to_string())
            ]
        );
        assert!(t.is_filtered());

        let t = TargetSelector::parse("$.projection.meta.owner").unwrap();
        assert_eq!(t.segments().len(), 2);
        assert!(!t.is_filtered());
    }

    #[test]
    fn rejects_malformed_targets() {
        for raw in ["", "a..b", "todos[?]", "a[0].b", "a[?].b[?].c", "$.projection."] {
            assert!(
                matches!(TargetSelector::parse(raw), Err(DefinitionError::InvalidSelector { .. })),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn event_selector_reads_nested_fields() {
        let s = EventSelector::parse("$.event.order.trackingNumber").unwrap();
        let data = json!({ "order": { "trackingNumber": "TN-1" } });
        assert_eq!(s.select(&data), Some(&json!("TN-1")));
        assert_eq!(EventSelector::parse("order").unwrap().select(&json!({})), None);
    }

    #[test]
    fn filter_compares_against_event_data() {
        let f = TargetFilter::parse("[?(@.todoId == $.event.todoId)]").unwrap();
        let event = json!({ "todoId": "t1" });
        assert!(f.matches(&json!({ "todoId": "t1" }), &event));
        assert!(!f.matches(&json!({ "todoId": "t2" }), &event));
        assert!(!f.matches(&json!({ "todoId": "t1" }), &json!({})));
    }

    #[test]
    fn filter_accepts_literals() {
        let quoted = TargetFilter::parse("[?(@.kind == 'shipped')]").unwrap();
        assert!(quoted.matches(&json!({ "kind": "shipped" }), &json!({})));

        let number = TargetFilter::parse("[?(@.count == 2)]").unwrap();
        assert!(number.matches(&json!({ "count": 2 }), &json!({})));
        assert!(!number.matches(&json!({ "count": "2" }), &json!({})));
    }

    #[test]
    fn rejects_malformed_filters() {
        for raw in ["@.a == 1", "[?(@.a != 1)]", "[?(a == 1)]", "[?(@.a == nope)]"] {
            assert!(
                matches!(TargetFilter::parse(raw), Err(DefinitionError::InvalidFilter { .. })),
                "{raw} should be rejected"
            );
        }
    }
}
