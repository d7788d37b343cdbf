use crate::api::views;
use crate::domain::session::{FlashMessage, SessionContext};
use crate::domain::user::CreateUser;
use crate::domain::user::driving_ports::{LoginError, RegisterError};
use crate::external_connections::ExternalConnectivity;
use crate::routing_utils::{Form, describe_validation_errors};
use crate::{AppState, SharedData, domain, dto, persistence};
use axum::extract::State;
use axum::response::{Html, Redirect};
use axum::routing::get;
use axum::{Extension, Router};
use std::sync::Arc;
use tracing::{error, info};
use validator::Validate;

const SIGNUP_FAILED_MESSAGE: &str = "Could not create your account, please try again";
const LOGIN_FAILED_MESSAGE: &str = "Could not log you in, please try again";

/// Routes for signing up, logging in, and logging out. None of them require a logged-in user.
pub fn auth_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .route(
            "/signup",
            get(signup_page).post(
                |State(app_state): AppState,
                 Extension(session): Extension<SessionContext>,
                 Form(signup): Form<dto::user::SignupForm>| async move {
                    let mut ext_cxn = app_state.ext_cxn.clone();
                    let user_service = domain::user::UserService::new();
                    let user_detect = persistence::db_user_driven_ports::DbDetectUser;
                    let user_writer = persistence::db_user_driven_ports::DbWriteUsers;

                    sign_up(
                        signup,
                        &session,
                        &mut ext_cxn,
                        &user_service,
                        &user_detect,
                        &user_writer,
                    )
                    .await
                },
            ),
        )
        .route(
            "/login",
            get(login_page).post(
                |State(app_state): AppState,
                 Extension(session): Extension<SessionContext>,
                 Form(login): Form<dto::user::LoginForm>| async move {
                    let mut ext_cxn = app_state.ext_cxn.clone();
                    let user_service = domain::user::UserService::new();
                    let user_reader = persistence::db_user_driven_ports::DbReadUsers;

                    log_in(login, &session, &mut ext_cxn, &user_service, &user_reader).await
                },
            ),
        )
        .route("/logout", get(log_out))
}

async fn signup_page(Extension(session): Extension<SessionContext>) -> Html<String> {
    views::signup_page(&session.take_flash())
}

async fn login_page(Extension(session): Extension<SessionContext>) -> Html<String> {
    views::login_page(&session.take_flash())
}

/// Registers a new account and logs it in right away
async fn sign_up(
    signup: dto::user::SignupForm,
    session: &SessionContext,
    ext_cxn: &mut impl ExternalConnectivity,
    user_service: &impl domain::user::driving_ports::UserPort,
    u_detect: &impl domain::user::driven_ports::DetectUser,
    u_writer: &impl domain::user::driven_ports::UserWriter,
) -> Redirect {
    info!("Attempt to sign up: {signup}");
    if let Err(validation_errors) = signup.validate() {
        session.push_flash(FlashMessage::error(describe_validation_errors(
            &validation_errors,
        )));
        return Redirect::to("/signup");
    }

    let new_user = CreateUser::from(signup);
    let register_result = user_service
        .register(&new_user, &mut *ext_cxn, u_detect, u_writer)
        .await;
    match register_result {
        Ok(user) => {
            session.log_in(user.id);
            session.push_flash(FlashMessage::success("Welcome to Todo App!"));
            Redirect::to("/")
        }
        Err(RegisterError::DuplicateUsername) => {
            info!("Username {} is already taken", new_user.username);
            session.push_flash(FlashMessage::error(
                RegisterError::DuplicateUsername.to_string(),
            ));
            Redirect::to("/signup")
        }
        Err(RegisterError::StoreUnavailable(err)) => {
            error!("Signup failure: {err:#}");
            session.push_flash(FlashMessage::error(SIGNUP_FAILED_MESSAGE));
            Redirect::to("/signup")
        }
    }
}

/// Checks credentials and binds the session to the user
async fn log_in(
    login: dto::user::LoginForm,
    session: &SessionContext,
    ext_cxn: &mut impl ExternalConnectivity,
    user_service: &impl domain::user::driving_ports::UserPort,
    u_reader: &impl domain::user::driven_ports::UserReader,
) -> Redirect {
    info!("Attempt to log in: {login}");
    if let Err(validation_errors) = login.validate() {
        session.push_flash(FlashMessage::error(describe_validation_errors(
            &validation_errors,
        )));
        return Redirect::to("/login");
    }

    let login_result = user_service
        .login(&login.username, &login.password, &mut *ext_cxn, u_reader)
        .await;
    match login_result {
        Ok(user) => {
            session.log_in(user.id);
            session.push_flash(FlashMessage::success("Welcome back!"));
            Redirect::to("/")
        }
        Err(LoginError::InvalidCredentials) => {
            session.push_flash(FlashMessage::error(
                LoginError::InvalidCredentials.to_string(),
            ));
            Redirect::to("/login")
        }
        Err(LoginError::StoreUnavailable(err)) => {
            error!("Login failure: {err:#}");
            session.push_flash(FlashMessage::error(LOGIN_FAILED_MESSAGE));
            Redirect::to("/login")
        }
    }
}

async fn log_out(Extension(session): Extension<SessionContext>) -> Redirect {
    session.log_out();
    session.push_flash(FlashMessage::success("You have logged out successfully."));

    Redirect::to("/login")
}
