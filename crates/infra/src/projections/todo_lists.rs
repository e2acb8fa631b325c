//! Read model of todo lists.
//!
//! ```json
//! { "name": "Groceries", "status": "IN_PROGRESS",
//!   "todos": [{ "listId": "..", "todoId": "t2", "text": "Bread", "status": "IN_PROGRESS" }, ..] }
//! ```
//!
//! Newest todos come first. The list status doubles as the document
//! reference, so lists can be queried by status.

use replaykit_todo::LIST_TYPE;

use super::definition::{DefinitionError, ProjectionDefinition, prepend, set, setref};

pub const LISTS_PROJECTION: &str = "lists";

const SAME_TODO: &str = "[?(@.todoId == $.event.todoId)]";

pub fn lists_projection() -> Result<ProjectionDefinition, DefinitionError> {
    ProjectionDefinition::single(LISTS_PROJECTION)
        .feed(LIST_TYPE)
        .on(
            "TodoListCreated",
            [
                set("name").event("$.event.name"),
                set("status").raw("EMPTY"),
                set("todos").raw(serde_json::json!([])),
                setref("status"),
            ],
        )
        .on(
            "TodoAdded",
            [
                prepend("todos"),
                set("todos[?].status").raw("IN_PROGRESS").filter(SAME_TODO),
                set("status").raw("IN_PROGRESS"),
                setref("status"),
            ],
        )
        .on(
            "TodoCompleted",
            [set("todos[?].status").raw("COMPLETED").filter(SAME_TODO)],
        )
        .on(
            "TodoListCompleted",
            [set("status").raw("COMPLETED"), setref("status")],
        )
        .build()
}
