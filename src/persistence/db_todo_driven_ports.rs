use crate::domain;
use crate::domain::todo::{NewTodo, TodoItem};
use crate::external_connections::{ConnectionHandle, ExternalConnectivity};
use anyhow::{Context, Error};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, query, query_as, query_scalar};
use uuid::Uuid;

pub struct DbTaskReader;

#[derive(FromRow)]
struct TodoItemRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    completed: bool,
    created_at: DateTime<Utc>,
}

impl From<TodoItemRow> for TodoItem {
    fn from(value: TodoItemRow) -> Self {
        TodoItem {
            id: value.id,
            owner_user_id: value.user_id,
            title: value.title,
            completed: value.completed,
            created_at: value.created_at,
        }
    }
}

impl domain::todo::driven_ports::TaskReader for DbTaskReader {
    async fn tasks_for_user(
        &self,
        user_id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Vec<TodoItem>, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let todo_items: Vec<TodoItem> = query_as::<_, TodoItemRow>(
            "SELECT ti.id, ti.user_id, ti.title, ti.completed, ti.created_at FROM todo_item ti \
             WHERE ti.user_id = $1 ORDER BY ti.created_at DESC, ti.id",
        )
        .bind(user_id)
        .fetch_all(cxn.borrow_connection())
        .await
        .context("trying to fetch todo items for a user")?
        .into_iter()
        .map(TodoItem::from)
        .collect();

        Ok(todo_items)
    }
}

pub struct DbTaskWriter;

impl domain::todo::driven_ports::TaskWriter for DbTaskWriter {
    async fn create_task_for_user(
        &self,
        user_id: Uuid,
        new_task: &NewTodo,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Uuid, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let new_id: Uuid = query_scalar(
            "INSERT INTO todo_item(id, user_id, title) VALUES ($1, $2, $3) RETURNING todo_item.id",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&new_task.title)
        .fetch_one(cxn.borrow_connection())
        .await
        .context("trying to insert a new todo into the database")?;

        Ok(new_id)
    }

    async fn toggle_completed(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Option<TodoItem>, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        // Single statement, so two concurrent toggles can't both read the same old value
        let toggled = query_as::<_, TodoItemRow>(
            "UPDATE todo_item SET completed = NOT completed WHERE id = $1 AND user_id = $2 \
             RETURNING id, user_id, title, completed, created_at",
        )
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(cxn.borrow_connection())
        .await
        .context("trying to toggle a todo's completed flag")?;

        Ok(toggled.map(TodoItem::from))
    }

    async fn delete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<(), Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        query("DELETE FROM todo_item WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .execute(cxn.borrow_connection())
            .await
            .context("trying to remove a todo from the database")?;

        Ok(())
    }
}
