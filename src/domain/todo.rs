use crate::domain::todo::driven_ports::{TaskReader, TaskWriter};
use crate::domain::todo::driving_ports::TaskError;
use crate::external_connections::ExternalConnectivity;
use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct TodoItem {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(test, derive(Clone, Debug, PartialEq, Eq))]
pub struct NewTodo {
    pub title: String,
}

pub mod driven_ports {
    use super::*;
    use crate::external_connections::ExternalConnectivity;

    pub trait TaskReader {
        /// Every todo owned by the user, newest first
        async fn tasks_for_user(
            &self,
            user_id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Vec<TodoItem>, anyhow::Error>;
    }

    pub trait TaskWriter {
        async fn create_task_for_user(
            &self,
            user_id: Uuid,
            new_task: &NewTodo,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Uuid, anyhow::Error>;

        /// Flips the completed flag of a todo owned by the user. Returns the updated todo,
        /// or [None] if the user doesn't own a todo with that id.
        async fn toggle_completed(
            &self,
            user_id: Uuid,
            task_id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<Option<TodoItem>, anyhow::Error>;

        /// Removes a todo owned by the user. Missing todos are not an error.
        async fn delete_task(
            &self,
            user_id: Uuid,
            task_id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<(), anyhow::Error>;
    }
}

pub mod driving_ports {
    use super::*;
    use crate::external_connections::ExternalConnectivity;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum TaskError {
        #[error("The todo does not exist.")]
        NotFound,
        #[error(transparent)]
        StoreUnavailable(#[from] anyhow::Error),
    }


    pub trait TaskPort {
        async fn tasks_for_user(
            &self,
            user_id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
            task_read: &impl driven_ports::TaskReader,
        ) -> Result<Vec<TodoItem>, TaskError>;
        async fn create_task_for_user(
            &self,
            user_id: Uuid,
            task: &NewTodo,
            ext_cxn: &mut impl ExternalConnectivity,
            task_write: &impl driven_ports::TaskWriter,
        ) -> Result<Uuid, TaskError>;
        async fn toggle_task(
            &self,
            user_id: Uuid,
            task_id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
            task_write: &impl driven_ports::TaskWriter,
        ) -> Result<TodoItem, TaskError>;
        async fn delete_task(
            &self,
            user_id: Uuid,
            task_id: Uuid,
            ext_cxn: &mut impl ExternalConnectivity,
            task_write: &impl driven_ports::TaskWriter,
        ) -> Result<(), TaskError>;
    }
}

pub struct TaskService {}

impl driving_ports::TaskPort for TaskService {
    async fn tasks_for_user(
        &self,
        user_id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
        task_read: &impl TaskReader,
    ) -> Result<Vec<TodoItem>, TaskError> {
        let tasks_result = task_read
            .tasks_for_user(user_id, &mut *ext_cxn)
            .await
            .context("listing a user's todos")?;

        Ok(tasks_result)
    }

    async fn create_task_for_user(
        &self,
        user_id: Uuid,
        task: &NewTodo,
        ext_cxn: &mut impl ExternalConnectivity,
        task_write: &impl TaskWriter,
    ) -> Result<Uuid, TaskError> {
        let created_task_id = task_write
            .create_task_for_user(user_id, task, &mut *ext_cxn)
            .await
            .context("creating a todo")?;
        info!(todo_id = %created_task_id, "Created todo");

        Ok(created_task_id)
    }

    async fn toggle_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
        task_write: &impl TaskWriter,
    ) -> Result<TodoItem, TaskError> {
        let toggled = task_write
            .toggle_completed(user_id, task_id, &mut *ext_cxn)
            .await
            .context("toggling a todo")?;

        match toggled {
            Some(task) => Ok(task),
            None => {
                debug!(todo_id = %task_id, "Toggle requested for a todo the user doesn't own");
                Err(TaskError::NotFound)
            }
        }
    }

    async fn delete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
        task_write: &impl TaskWriter,
    ) -> Result<(), TaskError> {
        task_write
            .delete_task(user_id, task_id, &mut *ext_cxn)
            .await
            .context("deleting a todo")?;

        Ok(())
    }
}
