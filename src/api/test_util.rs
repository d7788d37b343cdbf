use crate::api::session::CurrentUser;
use crate::config::SessionConfig;
use crate::domain::session::{self, SessionContext};
use crate::domain::user::TodoUser;
use crate::{App, SharedData};
use axum::body::{self, Body};
use axum::{Extension, Router};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Method, Request, Response, StatusCode};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SESSION_SECRET: &[u8] = b"test-session-secret-that-is-long-enough";

/// Reads the whole response body as UTF-8 text. Panics and fails the test if that isn't possible.
pub async fn body_text(response_body: Body) -> String {
    let bytes = body::to_bytes(response_body, usize::MAX)
        .await
        .expect("Could not read data from response body!");

    String::from_utf8(bytes.to_vec()).expect("Response body was not UTF-8")
}

fn shared_data_without_database() -> Arc<SharedData> {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/never_connected")
        .expect("lazy pool needs only a valid URL");
    let session_config = SessionConfig {
        secret: TEST_SESSION_SECRET.to_vec(),
        cookie_secure: false,
        ttl: session::session_ttl(),
    };

    Arc::new(SharedData::new(pool, session_config))
}

/// The full app backed by a database pool that never connects. Only usable for requests that
/// don't reach the database.
pub fn app_without_database() -> App {
    crate::build_app(shared_data_without_database())
}

/// The todo routes as [user] sees them once logged in, without the session layer or a database
pub fn todo_routes_logged_in_as(user: TodoUser) -> Router {
    crate::api::todo::todo_routes()
        .layer(Extension(SessionContext::fresh()))
        .layer(Extension(CurrentUser(user)))
        .with_state(shared_data_without_database())
}

fn build_request(
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    form_body: Option<&str>,
) -> Request<Body> {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, cookie);
    }
    match form_body {
        Some(form_body) => request
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form_body.to_owned())),
        None => request.body(Body::empty()),
    }
    .expect("test request is valid")
}

/// Sends a request through the app, attaching [cookie] as the session cookie if given
pub async fn send(
    app: &App,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    form_body: Option<&str>,
) -> Response<Body> {
    app.clone()
        .oneshot(build_request(method, uri, cookie, form_body))
        .await
        .expect("the app never fails to produce a response")
}

/// Sends a bodiless request straight to [router]
pub async fn send_to_router(router: &Router, method: Method, uri: &str) -> Response<Body> {
    router
        .clone()
        .oneshot(build_request(method, uri, None, None))
        .await
        .expect("the router never fails to produce a response")
}

/// The `name=value` part of the response's Set-Cookie header, ready to send back
pub fn returned_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::to_owned)
}

/// Asserts that [response] is a 303 to [target]
pub fn assert_see_other(response: &Response<Body>, target: &str) {
    assert_eq!(StatusCode::SEE_OTHER, response.status());
    assert_eq!(
        Some(target),
        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
    );
}
