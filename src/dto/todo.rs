use crate::domain;
use serde::Deserialize;
use validator::Validate;

/// Form submitted to create a todo
#[derive(Deserialize, Validate)]
#[cfg_attr(test, derive(Debug))]
pub struct NewTodoForm {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
}

impl From<NewTodoForm> for domain::todo::NewTodo {
    fn from(value: NewTodoForm) -> Self {
        domain::todo::NewTodo { title: value.title }
    }
}
