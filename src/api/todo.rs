use crate::api::session::CurrentUser;
use crate::api::views;
use crate::domain::session::{FlashMessage, SessionContext};
use crate::domain::todo::driving_ports::TaskError;
use crate::domain::user::TodoUser;
use crate::external_connections::ExternalConnectivity;
use crate::routing_utils::{
    Form, PlainErrorResponse, describe_validation_errors, parse_todo_id,
};
use crate::{AppState, SharedData, domain, dto, persistence};
use axum::extract::{Path, State};
use axum::response::{Html, Redirect};
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

/// Routes for a user's own todos. Every one of them expects a [CurrentUser].
pub fn todo_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .route(
            "/",
            get(
                |State(app_state): AppState,
                 Extension(CurrentUser(user)): Extension<CurrentUser>,
                 Extension(session): Extension<SessionContext>| async move {
                    let mut ext_cxn = app_state.ext_cxn.clone();
                    let task_service = domain::todo::TaskService {};
                    let task_reader = persistence::db_todo_driven_ports::DbTaskReader;

                    list_todos(&user, &session, &mut ext_cxn, &task_service, &task_reader).await
                },
            ),
        )
        .route("/todos/new", get(new_todo_page))
        .route(
            "/todos",
            post(
                |State(app_state): AppState,
                 Extension(CurrentUser(user)): Extension<CurrentUser>,
                 Extension(session): Extension<SessionContext>,
                 Form(new_todo): Form<dto::todo::NewTodoForm>| async move {
                    let mut ext_cxn = app_state.ext_cxn.clone();
                    let task_service = domain::todo::TaskService {};
                    let task_writer = persistence::db_todo_driven_ports::DbTaskWriter;

                    create_todo(
                        user.id,
                        new_todo,
                        &session,
                        &mut ext_cxn,
                        &task_service,
                        &task_writer,
                    )
                    .await
                },
            ),
        )
        .route(
            "/todos/:todo_id",
            put(
                |State(app_state): AppState,
                 Extension(CurrentUser(user)): Extension<CurrentUser>,
                 Extension(session): Extension<SessionContext>,
                 Path(todo_id): Path<String>| async move {
                    let todo_id = parse_todo_id(&todo_id, "Error updating todo")?;
                    let mut ext_cxn = app_state.ext_cxn.clone();
                    let task_service = domain::todo::TaskService {};
                    let task_writer = persistence::db_todo_driven_ports::DbTaskWriter;

                    toggle_todo(
                        user.id,
                        todo_id,
                        &session,
                        &mut ext_cxn,
                        &task_service,
                        &task_writer,
                    )
                    .await
                },
            )
            .delete(
                |State(app_state): AppState,
                 Extension(CurrentUser(user)): Extension<CurrentUser>,
                 Extension(session): Extension<SessionContext>,
                 Path(todo_id): Path<String>| async move {
                    let todo_id = parse_todo_id(&todo_id, "Error deleting todo")?;
                    let mut ext_cxn = app_state.ext_cxn.clone();
                    let task_service = domain::todo::TaskService {};
                    let task_writer = persistence::db_todo_driven_ports::DbTaskWriter;

                    delete_todo(
                        user.id,
                        todo_id,
                        &session,
                        &mut ext_cxn,
                        &task_service,
                        &task_writer,
                    )
                    .await
                },
            ),
        )
}

async fn new_todo_page(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(session): Extension<SessionContext>,
) -> Html<String> {
    views::new_todo_page(&user, &session.take_flash())
}

/// Renders the user's todos, newest first
async fn list_todos(
    user: &TodoUser,
    session: &SessionContext,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl domain::todo::driving_ports::TaskPort,
    task_reader: &impl domain::todo::driven_ports::TaskReader,
) -> Result<Html<String>, PlainErrorResponse> {
    let todos_result = task_service
        .tasks_for_user(user.id, &mut *ext_cxn, task_reader)
        .await;
    match todos_result {
        Ok(todos) => Ok(views::todo_list_page(user, &session.take_flash(), &todos)),
        Err(err) => {
            error!("Failed to list todos: {err:#}");
            Err(PlainErrorResponse::internal("Error fetching todos"))
        }
    }
}

/// Adds a todo for the user
async fn create_todo(
    user_id: Uuid,
    new_todo: dto::todo::NewTodoForm,
    session: &SessionContext,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl domain::todo::driving_ports::TaskPort,
    task_writer: &impl domain::todo::driven_ports::TaskWriter,
) -> Result<Redirect, PlainErrorResponse> {
    if let Err(validation_errors) = new_todo.validate() {
        session.push_flash(FlashMessage::error(describe_validation_errors(
            &validation_errors,
        )));
        return Ok(Redirect::to("/todos/new"));
    }

    let domain_todo = domain::todo::NewTodo::from(new_todo);
    let create_result = task_service
        .create_task_for_user(user_id, &domain_todo, &mut *ext_cxn, task_writer)
        .await;
    match create_result {
        Ok(_) => {
            session.push_flash(FlashMessage::success("Todo added successfully!"));
            Ok(Redirect::to("/"))
        }
        Err(err) => {
            error!("Todo creation failure: {err:#}");
            Err(PlainErrorResponse::internal("Error creating todo"))
        }
    }
}

/// Flips a todo between complete and incomplete
async fn toggle_todo(
    user_id: Uuid,
    todo_id: Uuid,
    session: &SessionContext,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl domain::todo::driving_ports::TaskPort,
    task_writer: &impl domain::todo::driven_ports::TaskWriter,
) -> Result<Redirect, PlainErrorResponse> {
    let toggle_result = task_service
        .toggle_task(user_id, todo_id, &mut *ext_cxn, task_writer)
        .await;
    match toggle_result {
        Ok(todo) => {
            info!(todo_id = %todo.id, completed = todo.completed, "Toggled todo");
            session.push_flash(FlashMessage::success("Todo updated successfully!"));
            Ok(Redirect::to("/"))
        }
        Err(err) => {
            match &err {
                TaskError::NotFound => info!(%todo_id, "Toggle failed, todo not found"),
                TaskError::StoreUnavailable(cause) => error!("Todo toggle failure: {cause:#}"),
            }
            Err(PlainErrorResponse::from_task_error(&err, "Error updating todo"))
        }
    }
}

/// Removes a todo. Removing one that's already gone still counts as success.
async fn delete_todo(
    user_id: Uuid,
    todo_id: Uuid,
    session: &SessionContext,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl domain::todo::driving_ports::TaskPort,
    task_writer: &impl domain::todo::driven_ports::TaskWriter,
) -> Result<Redirect, PlainErrorResponse> {
    info!(%todo_id, "Deleting todo");
    let delete_result = task_service
        .delete_task(user_id, todo_id, &mut *ext_cxn, task_writer)
        .await;
    match delete_result {
        Ok(()) => {
            session.push_flash(FlashMessage::success("Todo deleted successfully!"));
            Ok(Redirect::to("/"))
        }
        Err(err) => {
            error!("Failed to delete todo: {err:#}");
            Err(PlainErrorResponse::from_task_error(&err, "Error deleting todo"))
        }
    }
}
