//! HTML pages. Everything dynamic goes through [escape_html] before it is written into markup.

use crate::domain::session::{FlashKind, FlashMessage};
use crate::domain::todo::TodoItem;
use crate::domain::user::TodoUser;
use axum::response::Html;
use std::fmt::Write;

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }

    escaped
}

fn navigation(current_user: Option<&TodoUser>) -> String {
    match current_user {
        Some(user) => format!(
            r#"<nav><a href="/">My todos</a> | <a href="/todos/new">New todo</a> | <span>{}</span> <a href="/logout">Log out</a></nav>"#,
            escape_html(&user.username)
        ),
        None => r#"<nav><a href="/login">Log in</a> | <a href="/signup">Sign up</a></nav>"#.to_owned(),
    }
}

fn flash_messages(flash: &[FlashMessage]) -> String {
    let mut rendered = String::new();
    for message in flash {
        let class = match message.kind {
            FlashKind::Success => "flash success",
            FlashKind::Error => "flash error",
        };
        // Writing into a String can't fail
        let _ = write!(
            rendered,
            r#"<div class="{class}">{}</div>"#,
            escape_html(&message.text)
        );
    }

    rendered
}

fn layout(
    title: &str,
    current_user: Option<&TodoUser>,
    flash: &[FlashMessage],
    body: &str,
) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} | Todo App</title>
</head>
<body>
{nav}
{flash}
<main>
<h1>{title}</h1>
{body}
</main>
</body>
</html>
"#,
        title = escape_html(title),
        nav = navigation(current_user),
        flash = flash_messages(flash),
    ))
}

pub fn signup_page(flash: &[FlashMessage]) -> Html<String> {
    layout(
        "Sign up",
        None,
        flash,
        r#"<form action="/signup" method="post">
<label>Email <input type="email" name="email" required></label>
<label>Username <input type="text" name="username" maxlength="64" required></label>
<label>Password <input type="password" name="password" required></label>
<button type="submit">Sign up</button>
</form>"#,
    )
}

pub fn login_page(flash: &[FlashMessage]) -> Html<String> {
    layout(
        "Log in",
        None,
        flash,
        r#"<form action="/login" method="post">
<label>Username <input type="text" name="username" required></label>
<label>Password <input type="password" name="password" required></label>
<button type="submit">Log in</button>
</form>"#,
    )
}

pub fn todo_list_page(
    user: &TodoUser,
    flash: &[FlashMessage],
    todos: &[TodoItem],
) -> Html<String> {
    let body = if todos.is_empty() {
        r#"<p>Nothing to do yet. <a href="/todos/new">Add a todo</a>.</p>"#.to_owned()
    } else {
        let mut items = String::from("<ul>\n");
        for todo in todos {
            let (status_class, toggle_label) = if todo.completed {
                ("todo completed", "Mark incomplete")
            } else {
                ("todo", "Mark complete")
            };
            let _ = writeln!(
                items,
                r#"<li class="{status_class}"><span>{title}</span>
<form action="/todos/{id}?_method=PUT" method="post"><button type="submit">{toggle_label}</button></form>
<form action="/todos/{id}?_method=DELETE" method="post"><button type="submit">Delete</button></form>
</li>"#,
                title = escape_html(&todo.title),
                id = todo.id,
            );
        }
        items.push_str("</ul>");
        items
    };

    layout("My todos", Some(user), flash, &body)
}

pub fn new_todo_page(user: &TodoUser, flash: &[FlashMessage]) -> Html<String> {
    layout(
        "New todo",
        Some(user),
        flash,
        r#"<form action="/todos" method="post">
<label>Title <input type="text" name="title" required></label>
<button type="submit">Add</button>
</form>"#,
    )
}
