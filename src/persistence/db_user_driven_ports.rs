use crate::domain;
use crate::domain::user::driven_ports::{NewUserRecord, UserInsert};
use crate::domain::user::{StoredCredentials, TodoUser};
use crate::external_connections::{ConnectionHandle, ExternalConnectivity};
use anyhow::{Context, Error};
use sqlx::{FromRow, query_as, query_scalar};
use uuid::Uuid;

pub struct DbDetectUser;

impl domain::user::driven_ports::DetectUser for DbDetectUser {
    async fn username_taken(
        &self,
        username: &str,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<bool, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let taken: bool =
            query_scalar("SELECT EXISTS(SELECT 1 FROM todo_user tu WHERE tu.username = $1)")
                .bind(username)
                .fetch_one(cxn.borrow_connection())
                .await
                .context("Detecting user via username")?;

        Ok(taken)
    }
}

#[derive(FromRow)]
struct TodoUserRow {
    id: Uuid,
    username: String,
    email: String,
}

impl From<TodoUserRow> for TodoUser {
    fn from(value: TodoUserRow) -> Self {
        TodoUser {
            id: value.id,
            username: value.username,
            email: value.email,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
}

impl From<CredentialsRow> for StoredCredentials {
    fn from(value: CredentialsRow) -> Self {
        StoredCredentials {
            user: TodoUser {
                id: value.id,
                username: value.username,
                email: value.email,
            },
            password_hash: value.password_hash,
        }
    }
}

pub struct DbReadUsers;

impl domain::user::driven_ports::UserReader for DbReadUsers {
    async fn get_by_id(
        &self,
        id: Uuid,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Option<TodoUser>, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let user = query_as::<_, TodoUserRow>(
            "SELECT tu.id, tu.username, tu.email FROM todo_user tu WHERE tu.id = $1",
        )
        .bind(id)
        .fetch_optional(cxn.borrow_connection())
        .await
        .context("Fetching a user by id")?;

        Ok(user.map(TodoUser::from))
    }

    async fn credentials_by_username(
        &self,
        username: &str,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<Option<StoredCredentials>, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let credentials = query_as::<_, CredentialsRow>(
            "SELECT tu.id, tu.username, tu.email, tu.password_hash FROM todo_user tu WHERE tu.username = $1",
        )
        .bind(username)
        .fetch_optional(cxn.borrow_connection())
        .await
        .context("Fetching credentials by username")?;

        Ok(credentials.map(StoredCredentials::from))
    }
}

pub struct DbWriteUsers;

impl domain::user::driven_ports::UserWriter for DbWriteUsers {
    async fn create_user(
        &self,
        user: &NewUserRecord<'_>,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<UserInsert, Error> {
        let mut cxn = ext_cxn.database_cxn().await?;

        let insert_result: Result<Uuid, sqlx::Error> = query_scalar(
            "INSERT INTO todo_user(id, username, email, password_hash) VALUES ($1, $2, $3, $4) RETURNING todo_user.id",
        )
        .bind(Uuid::new_v4())
        .bind(user.username)
        .bind(user.email)
        .bind(user.password_hash)
        .fetch_one(cxn.borrow_connection())
        .await;

        match insert_result {
            Ok(id) => Ok(UserInsert::Created(id)),
            Err(err) if super::is_unique_violation(&err) => Ok(UserInsert::UsernameTaken),
            Err(err) => Err(Error::new(err).context("Inserting new user")),
        }
    }
}
