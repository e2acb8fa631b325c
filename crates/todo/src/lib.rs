//! Todo-list domain module (event-sourced).
//!
//! This crate contains business rules for todo lists, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod list;

pub use list::{
    LIST_TYPE, ListStatus, Todo, TodoAdded, TodoCompleted, TodoList, TodoListCompleted, TodoListCreated,
    TodoListEvent, TodoListState, reducer,
};
