//! Declarative projection definitions.
//!
//! A definition is a data-only rule table: for each event type, an ordered
//! list of functions to apply to the projection document. Rules are written
//! with the small builder API below and validated once by
//! [`ProjectionDefinitionBuilder::build`]; the engine never sees an
//! unparsed selector.
//!
//! ```ignore
//! ProjectionDefinition::single("lists")
//!     .feed("list")
//!     .on("TodoListCreated", [set("name").event("name"), set("status").raw("EMPTY")])
//!     .on("TodoAdded", [prepend("todos")])
//!     .build()?;
//! ```

use std::collections::HashSet;

use serde_json::Value as JsonValue;
use thiserror::Error;

use super::selector::{EventSelector, TargetFilter, TargetSelector};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("projection name cannot be empty")]
    EmptyName,

    #[error("projection '{0}' has no feed")]
    MissingFeed(String),

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("invalid filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("'{function}' on '{target}' for {event_type}: {reason}")]
    InvalidFunction {
        event_type: String,
        function: &'static str,
        target: String,
        reason: String,
    },

    #[error("more than one handler for event type '{0}'")]
    DuplicateHandler(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProjectionKind {
    /// One document per aggregate, keyed by aggregate id.
    Single,
    /// One document for the whole feed, keyed by the projection name.
    Aggregated,
}

/// Where a written value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Literal(JsonValue),
    Event(EventSelector),
    /// The whole event data object.
    EventData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionFunction {
    Set { target: TargetSelector, value: ValueSource },
    Prepend { target: TargetSelector, value: ValueSource },
    Push { target: TargetSelector, value: ValueSource },
    Inc { target: TargetSelector },
    Dec { target: TargetSelector },
    Clear { target: TargetSelector },
    /// Copy the value at `target` into the document's reference key.
    SetRef { target: TargetSelector },
}

impl ProjectionFunction {
    pub fn name(&self) -> &'static str {
        match self {
            ProjectionFunction::Set { .. } => "set",
            ProjectionFunction::Prepend { .. } => "prepend",
            ProjectionFunction::Push { .. } => "push",
            ProjectionFunction::Inc { .. } => "inc",
            ProjectionFunction::Dec { .. } => "dec",
            ProjectionFunction::Clear { .. } => "clear",
            ProjectionFunction::SetRef { .. } => "setref",
        }
    }

    pub fn target(&self) -> &TargetSelector {
        match self {
            ProjectionFunction::Set { target, .. }
            | ProjectionFunction::Prepend { target, .. }
            | ProjectionFunction::Push { target, .. }
            | ProjectionFunction::Inc { target }
            | ProjectionFunction::Dec { target }
            | ProjectionFunction::Clear { target }
            | ProjectionFunction::SetRef { target } => target,
        }
    }
}

/// A validated function plus the filter for its `[?]` segment, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionRule {
    function: ProjectionFunction,
    filter: Option<TargetFilter>,
}

impl ProjectionRule {
    pub fn function(&self) -> &ProjectionFunction {
        &self.function
    }

    pub fn filter(&self) -> Option<&TargetFilter> {
        self.filter.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionHandler {
    event_type: String,
    rules: Vec<ProjectionRule>,
}

impl ProjectionHandler {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn rules(&self) -> &[ProjectionRule] {
        &self.rules
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionDefinition {
    name: String,
    feed: String,
    kind: ProjectionKind,
    handlers: Vec<ProjectionHandler>,
}

impl ProjectionDefinition {
    pub fn single(name: impl Into<String>) -> ProjectionDefinitionBuilder {
        ProjectionDefinitionBuilder::new(name.into(), ProjectionKind::Single)
    }

    pub fn aggregated(name: impl Into<String>) -> ProjectionDefinitionBuilder {
        ProjectionDefinitionBuilder::new(name.into(), ProjectionKind::Aggregated)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn kind(&self) -> ProjectionKind {
        self.kind
    }

    pub fn handlers(&self) -> &[ProjectionHandler] {
        &self.handlers
    }

    pub fn handler(&self, event_type: &str) -> Option<&ProjectionHandler> {
        self.handlers.iter().find(|h| h.event_type == event_type)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FunctionKind {
    Set,
    Prepend,
    Push,
    Inc,
    Dec,
    Clear,
    SetRef,
}

impl FunctionKind {
    fn name(self) -> &'static str {
        match self {
            FunctionKind::Set => "set",
            FunctionKind::Prepend => "prepend",
            FunctionKind::Push => "push",
            FunctionKind::Inc => "inc",
            FunctionKind::Dec => "dec",
            FunctionKind::Clear => "clear",
            FunctionKind::SetRef => "setref",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RawValue {
    Literal(JsonValue),
    Event(String),
}

/// Unvalidated function, as written in a rule table.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    kind: FunctionKind,
    target: String,
    value: Option<RawValue>,
    filter: Option<String>,
}

impl FunctionSpec {
    fn new(kind: FunctionKind, target: &str) -> Self {
        Self {
            kind,
            target: target.to_string(),
            value: None,
            filter: None,
        }
    }

    /// Take the value from the event data (`$.event.<path>` or `<path>`).
    pub fn event(mut self, selector: &str) -> Self {
        self.value = Some(RawValue::Event(selector.to_string()));
        self
    }

    /// Write a literal JSON value.
    pub fn raw(mut self, value: impl Into<JsonValue>) -> Self {
        self.value = Some(RawValue::Literal(value.into()));
        self
    }

    /// Narrow the target's `[?]` segment, e.g. `[?(@.todoId == $.event.todoId)]`.
    pub fn filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }

    fn validate(self, event_type: &str) -> Result<ProjectionRule, DefinitionError> {
        let invalid = |reason: &str| DefinitionError::InvalidFunction {
            event_type: event_type.to_string(),
            function: self.kind.name(),
            target: self.target.clone(),
            reason: reason.to_string(),
        };

        let target = TargetSelector::parse(&self.target)?;
        let filter = self.filter.as_deref().map(TargetFilter::parse).transpose()?;

        match (target.is_filtered(), filter.is_some()) {
            (true, false) => return Err(invalid("a `[?]` target needs a filter")),
            (false, true) => return Err(invalid("a filter needs a `[?]` target")),
            _ => {}
        }

        let value = match &self.value {
            None => None,
            Some(RawValue::Literal(v)) => Some(ValueSource::Literal(v.clone())),
            Some(RawValue::Event(s)) => Some(ValueSource::Event(EventSelector::parse(s)?)),
        };

        let function = match (self.kind, value) {
            (FunctionKind::Set, Some(value)) => ProjectionFunction::Set { target, value },
            (FunctionKind::Set, None) => return Err(invalid("set needs a value")),
            (FunctionKind::Prepend, value) => ProjectionFunction::Prepend {
                target,
                value: value.unwrap_or(ValueSource::EventData),
            },
            (FunctionKind::Push, value) => ProjectionFunction::Push {
                target,
                value: value.unwrap_or(ValueSource::EventData),
            },
            (_, Some(_)) => return Err(invalid("function does not take a value")),
            (FunctionKind::Inc, None) => ProjectionFunction::Inc { target },
            (FunctionKind::Dec, None) => ProjectionFunction::Dec { target },
            (FunctionKind::Clear, None) => ProjectionFunction::Clear { target },
            (FunctionKind::SetRef, None) if target.is_filtered() => {
                return Err(invalid("setref must address a single value"));
            }
            (FunctionKind::SetRef, None) => ProjectionFunction::SetRef { target },
        };

        Ok(ProjectionRule { function, filter })
    }
}

pub fn set(target: &str) -> FunctionSpec {
    FunctionSpec::new(FunctionKind::Set, target)
}

/// Insert at the head of an array; inserts the whole event data by default.
pub fn prepend(target: &str) -> FunctionSpec {
    FunctionSpec::new(FunctionKind::Prepend, target)
}

/// Append to the tail of an array; appends the whole event data by default.
pub fn push(target: &str) -> FunctionSpec {
    FunctionSpec::new(FunctionKind::Push, target)
}

pub fn inc(target: &str) -> FunctionSpec {
    FunctionSpec::new(FunctionKind::Inc, target)
}

pub fn dec(target: &str) -> FunctionSpec {
    FunctionSpec::new(FunctionKind::Dec, target)
}

pub fn clear(target: &str) -> FunctionSpec {
    FunctionSpec::new(FunctionKind::Clear, target)
}

pub fn setref(target: &str) -> FunctionSpec {
    FunctionSpec::new(FunctionKind::SetRef, target)
}

#[derive(Debug, Clone)]
pub struct ProjectionDefinitionBuilder {
    name: String,
    feed: Option<String>,
    kind: ProjectionKind,
    handlers: Vec<(String, Vec<FunctionSpec>)>,
}

impl ProjectionDefinitionBuilder {
    fn new(name: String, kind: ProjectionKind) -> Self {
        Self {
            name,
            feed: None,
            kind,
            handlers: Vec::new(),
        }
    }

    /// Feed (aggregate type) the projection consumes.
    pub fn feed(mut self, feed: impl Into<String>) -> Self {
        self.feed = Some(feed.into());
        self
    }

    pub fn on(mut self, event_type: impl Into<String>, functions: impl IntoIterator<Item = FunctionSpec>) -> Self {
        self.handlers
            .push((event_type.into(), functions.into_iter().collect()));
        self
    }

    pub fn build(self) -> Result<ProjectionDefinition, DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::EmptyName);
        }
        let feed = self
            .feed
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| DefinitionError::MissingFeed(self.name.clone()))?;

        let mut seen = HashSet::new();
        let mut handlers = Vec::with_capacity(self.handlers.len());
        for (event_type, functions) in self.handlers {
            if !seen.insert(event_type.clone()) {
                return Err(DefinitionError::DuplicateHandler(event_type));
            }
            let rules = functions
                .into_iter()
                .map(|f| f.validate(&event_type))
                .collect::<Result<Vec<_>, _>>()?;
            handlers.push(ProjectionHandler { event_type, rules });
        }

        Ok(ProjectionDefinition {
            name: self.name,
            feed,
            kind: self.kind,
            handlers,
        })
    }
}
