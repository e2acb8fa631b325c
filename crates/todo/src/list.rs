use serde::{Deserialize, Serialize};

use replaykit_core::{Aggregate, AggregateId, DomainError, DomainResult};
use replaykit_events::{ConfigurationError, DomainEvent, Reducer};

/// Aggregate type (and feed name) of todo lists.
pub const LIST_TYPE: &str = "list";

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListStatus {
    #[default]
    Empty,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub todo_id: String,
    pub text: String,
    pub completed: bool,
}

/// Folded state of a todo list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoListState {
    list_id: Option<AggregateId>,
    name: String,
    status: ListStatus,
    todos: Vec<Todo>,
}

impl TodoListState {
    pub fn list_id(&self) -> Option<AggregateId> {
        self.list_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ListStatus {
        self.status
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    fn todo(&self, todo_id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.todo_id == todo_id)
    }

    fn todo_list_created(&mut self, event: &TodoListEvent) {
        if let TodoListEvent::TodoListCreated(e) = event {
            self.list_id = Some(e.list_id);
            self.name = e.name.clone();
            self.status = ListStatus::Empty;
        }
    }

    fn todo_added(&mut self, event: &TodoListEvent) {
        if let TodoListEvent::TodoAdded(e) = event {
            self.todos.push(Todo {
                todo_id: e.todo_id.clone(),
                text: e.text.clone(),
                completed: false,
            });
            self.status = ListStatus::InProgress;
        }
    }

    fn todo_completed(&mut self, event: &TodoListEvent) {
        if let TodoListEvent::TodoCompleted(e) = event {
            if let Some(todo) = self.todos.iter_mut().find(|t| t.todo_id == e.todo_id) {
                todo.completed = true;
            }
        }
    }

    fn todo_list_completed(&mut self, event: &TodoListEvent) {
        if let TodoListEvent::TodoListCompleted(_) = event {
            self.status = ListStatus::Completed;
        }
    }
}

/// Reducer for todo list streams.
pub fn reducer() -> Result<Reducer<TodoListState, TodoListEvent>, ConfigurationError> {
    Reducer::builder()
        .on("TodoListCreated", TodoListState::todo_list_created)
        .on("TodoAdded", TodoListState::todo_added)
        .on("TodoCompleted", TodoListState::todo_completed)
        .on("TodoListCompleted", TodoListState::todo_list_completed)
        .build()
}

/// Event: TodoListCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListCreated {
    pub list_id: AggregateId,
    pub name: String,
}

/// Event: TodoAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoAdded {
    pub list_id: AggregateId,
    pub todo_id: String,
    pub text: String,
}

/// Event: TodoCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoCompleted {
    pub list_id: AggregateId,
    pub todo_id: String,
}

/// Event: TodoListCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListCompleted {
    pub list_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TodoListEvent {
    TodoListCreated(TodoListCreated),
    TodoAdded(TodoAdded),
    TodoCompleted(TodoCompleted),
    TodoListCompleted(TodoListCompleted),
}

impl DomainEvent for TodoListEvent {
    const EVENT_TYPES: &'static [&'static str] =
        &["TodoListCreated", "TodoAdded", "TodoCompleted", "TodoListCompleted"];

    fn event_type(&self) -> &'static str {
        match self {
            TodoListEvent::TodoListCreated(_) => "TodoListCreated",
            TodoListEvent::TodoAdded(_) => "TodoAdded",
            TodoListEvent::TodoCompleted(_) => "TodoCompleted",
            TodoListEvent::TodoListCompleted(_) => "TodoListCompleted",
        }
    }
}

/// Aggregate root: TodoList.
#[derive(Debug, Clone)]
pub struct TodoList {
    state: TodoListState,
}

impl Aggregate for TodoList {
    type State = TodoListState;
    type Event = TodoListEvent;

    const AGGREGATE_TYPE: &'static str = LIST_TYPE;

    fn from_state(state: Self::State) -> Self {
        Self { state }
    }

    fn state(&self) -> &Self::State {
        &self.state
    }
}

impl TodoList {
    fn ensure_created(&self) -> DomainResult<AggregateId> {
        self.state
            .list_id
            .ok_or_else(|| DomainError::rule("todo list does not exist"))
    }

    pub fn create_new(&self, list_id: AggregateId, name: &str) -> DomainResult<Vec<TodoListEvent>> {
        if self.state.list_id.is_some() {
            return Err(DomainError::rule("todo list already exists"));
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(vec![TodoListEvent::TodoListCreated(TodoListCreated {
            list_id,
            name: name.to_string(),
        })])
    }

    pub fn add_todo(&self, todo_id: &str, text: &str) -> DomainResult<Vec<TodoListEvent>> {
        let list_id = self.ensure_created()?;
        if todo_id.trim().is_empty() {
            return Err(DomainError::validation("todo id cannot be empty"));
        }
        if self.state.todo(todo_id).is_some() {
            return Ok(vec![]);
        }
        Ok(vec![TodoListEvent::TodoAdded(TodoAdded {
            list_id,
            todo_id: todo_id.to_string(),
            text: text.to_string(),
        })])
    }

    pub fn complete_todo(&self, todo_id: &str) -> DomainResult<Vec<TodoListEvent>> {
        let list_id = self.ensure_created()?;
        let todo = self
            .state
            .todo(todo_id)
            .ok_or_else(|| DomainError::rule(format!("todo '{todo_id}' does not exist")))?;
        if todo.completed {
            return Ok(vec![]);
        }

        let mut events = vec![TodoListEvent::TodoCompleted(TodoCompleted {
            list_id,
            todo_id: todo_id.to_string(),
        })];

        let others_done = self
            .state
            .todos
            .iter()
            .filter(|t| t.todo_id != todo_id)
            .all(|t| t.completed);
        if others_done {
            events.push(TodoListEvent::TodoListCompleted(TodoListCompleted { list_id }));
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn list_from(events: &[TodoListEvent]) -> TodoList {
        TodoList::from_state(reducer().unwrap().replay(events).unwrap())
    }

    fn created(list_id: AggregateId) -> Vec<TodoListEvent> {
        TodoList::from_state(TodoListState::default())
            .create_new(list_id, "Groceries")
            .unwrap()
    }

    #[test]
    fn create_new_emits_todo_list_created() {
        let list_id = AggregateId::new();
        let events = created(list_id);
        assert_eq!(
            events,
            vec![TodoListEvent::TodoListCreated(TodoListCreated {
                list_id,
                name: "Groceries".to_string(),
            })]
        );
    }

    #[test]
    fn creating_an_existing_list_is_a_rule_violation() {
        let list_id = AggregateId::new();
        let list = list_from(&created(list_id));
        let err = list.create_new(list_id, "Again").unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = TodoList::from_state(TodoListState::default())
            .create_new(AggregateId::new(), "  ")
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn adding_to_a_missing_list_is_a_rule_violation() {
        let err = TodoList::from_state(TodoListState::default())
            .add_todo("t1", "Milk")
            .unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn re_adding_a_todo_yields_no_events() {
        let list_id = AggregateId::new();
        let mut history = created(list_id);
        history.extend(list_from(&history).add_todo("t1", "Milk").unwrap());

        let events = list_from(&history).add_todo("t1", "Milk").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn completing_a_missing_todo_is_a_rule_violation() {
        let list = list_from(&created(AggregateId::new()));
        let err = list.complete_todo("nope").unwrap_err();
        assert_eq!(err, DomainError::rule("todo 'nope' does not exist"));
    }

    #[test]
    fn completing_the_last_open_todo_completes_the_list() {
        let list_id = AggregateId::new();
        let mut history = created(list_id);
        history.extend(list_from(&history).add_todo("t1", "Milk").unwrap());
        history.extend(list_from(&history).add_todo("t2", "Bread").unwrap());

        let first = list_from(&history).complete_todo("t1").unwrap();
        assert_eq!(first.len(), 1);
        history.extend(first);

        let second = list_from(&history).complete_todo("t2").unwrap();
        assert_eq!(
            second,
            vec![
                TodoListEvent::TodoCompleted(TodoCompleted {
                    list_id,
                    todo_id: "t2".to_string(),
                }),
                TodoListEvent::TodoListCompleted(TodoListCompleted { list_id }),
            ]
        );
        history.extend(second);

        let state = list_from(&history).state().clone();
        assert_eq!(state.status(), ListStatus::Completed);
        assert!(state.todos().iter().all(|t| t.completed));

        assert!(list_from(&history).complete_todo("t2").unwrap().is_empty());
    }

    #[test]
    fn payloads_use_camel_case_fields() {
        let list_id = AggregateId::new();
        let event = TodoListEvent::TodoAdded(TodoAdded {
            list_id,
            todo_id: "t1".to_string(),
            text: "Milk".to_string(),
        });

        let (event_type, data) = replaykit_events::encode(&event).unwrap();
        assert_eq!(event_type, "TodoAdded");
        assert_eq!(
            data,
            serde_json::json!({ "listId": list_id.to_string(), "todoId": "t1", "text": "Milk" })
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: replaying the same history twice yields identical state.
        #[test]
        fn replay_is_deterministic(ids in prop::collection::vec("[a-d]", 0..12)) {
            let list_id = AggregateId::new();
            let mut history = created(list_id);
            for (i, id) in ids.iter().enumerate() {
                let list = list_from(&history);
                let events = if i % 3 == 2 {
                    list.complete_todo(id).unwrap_or_default()
                } else {
                    list.add_todo(id, "item").unwrap()
                };
                history.extend(events);
            }

            let r = reducer().unwrap();
            prop_assert_eq!(r.replay(&history).unwrap(), r.replay(&history).unwrap());
        }
    }
}
