//! Cookie-backed sessions. Every request gets a [SessionContext] restored from the signed
//! `todo_session` cookie; protected routes additionally get a [CurrentUser].

use crate::config::SessionConfig;
use crate::domain::session::driven_ports::SessionStore;
use crate::domain::session::{FlashMessage, SessionContext, SessionOutcome};
use crate::domain::user::TodoUser;
use crate::external_connections::ExternalConnectivity;
use crate::routing_utils::PlainErrorResponse;
use crate::{AppState, domain, persistence};
use anyhow::{Context, anyhow};
use axum::Extension;
use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use tracing::{Span, debug, error, field};

pub const SESSION_COOKIE_NAME: &str = "todo_session";
pub const NOT_LOGGED_IN_MESSAGE: &str = "You must be logged in to access this page";
const TOKEN_BYTES: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// The authenticated user behind a request, available to every route behind [require_authentication]
#[derive(Clone, Debug)]
pub struct CurrentUser(pub TodoUser);

/// Fresh random session token, base64url encoded
pub fn generate_session_token() -> Result<String, anyhow::Error> {
    let mut token = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut token)
        .context("reading random bytes for a session token")?;

    Ok(URL_SAFE_NO_PAD.encode(token))
}

fn token_mac(secret: &[u8], token: &str) -> Result<HmacSha256, anyhow::Error> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| anyhow!("session secret rejected by HMAC"))?;
    mac.update(token.as_bytes());

    Ok(mac)
}

/// Cookie value for [token]: the token and its signature joined by a dot
pub fn sign_token(secret: &[u8], token: &str) -> Result<String, anyhow::Error> {
    let signature = token_mac(secret, token)?.finalize().into_bytes();

    Ok(format!("{token}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Pulls the token out of a signed cookie value. Anything unsigned or tampered with is [None].
pub fn verify_cookie_value(secret: &[u8], cookie_value: &str) -> Option<String> {
    let (token, signature) = cookie_value.split_once('.')?;
    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
    token_mac(secret, token).ok()?.verify_slice(&signature).ok()?;

    Some(token.to_owned())
}

/// Finds the session cookie among the request's Cookie headers
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.to_owned())
}

fn cookie_header(
    config: &SessionConfig,
    value: &str,
    max_age_secs: i64,
) -> Result<HeaderValue, anyhow::Error> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}"
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }

    HeaderValue::from_str(&cookie).context("building the session cookie")
}

/// Set-Cookie value handing [token] to the browser until [expires_at]
pub fn session_cookie(
    config: &SessionConfig,
    token: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<HeaderValue, anyhow::Error> {
    let signed = sign_token(&config.secret, token)?;
    let max_age = (expires_at - now).num_seconds().max(0);

    cookie_header(config, &signed, max_age)
}

/// Set-Cookie value telling the browser to drop the session cookie
pub fn clear_session_cookie(config: &SessionConfig) -> Result<HeaderValue, anyhow::Error> {
    cookie_header(config, "", 0)
}

/// Middleware wrapping every route. Restores the session before the handler runs and persists
/// whatever the handler changed afterwards.
pub async fn session_layer(
    State(app_state): AppState,
    mut request: Request,
    next: Next,
) -> Response {
    let config = &app_state.session_config;
    let store = &app_state.sessions;

    let presented_cookie = extract_session_cookie(request.headers());
    let presented_token = presented_cookie
        .as_deref()
        .and_then(|cookie| verify_cookie_value(&config.secret, cookie));

    let restored = match presented_token.as_deref() {
        Some(token) => store.load(token).await.unwrap_or_else(|err| {
            error!("Could not load session, starting a new one: {err:#}");
            None
        }),
        None => None,
    };
    let (live_token, session) = match restored {
        Some(record) => (presented_token, SessionContext::restored(record)),
        None => (None, SessionContext::fresh()),
    };

    request.extensions_mut().insert(session.clone());
    let mut response = next.run(request).await;

    let now = Utc::now();
    let outcome = session.finish(now, config.ttl);
    let persist_result = persist_session(
        store,
        config,
        outcome,
        live_token.as_deref(),
        presented_cookie.is_some(),
        now,
    )
    .await;
    match persist_result {
        Ok(Some(cookie)) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Ok(None) => {}
        Err(err) => error!("Failed to persist session: {err:#}"),
    }

    response
}

/// Applies [outcome] to the store, returning the Set-Cookie value the browser needs, if any
async fn persist_session(
    store: &impl SessionStore,
    config: &SessionConfig,
    outcome: SessionOutcome,
    live_token: Option<&str>,
    had_cookie: bool,
    now: DateTime<Utc>,
) -> Result<Option<HeaderValue>, anyhow::Error> {
    match outcome {
        SessionOutcome::Unchanged => Ok(None),
        SessionOutcome::Save(record) => {
            // Whole-record write: overlapping requests on one session keep the last writer's flash
            let token = live_token.context("session changed in place without a token")?;
            store.save(token, &record).await?;

            Ok(None)
        }
        SessionOutcome::Issue(record) => {
            if let Some(old_token) = live_token {
                store.destroy(old_token).await?;
            }
            let token = generate_session_token()?;
            store.save(&token, &record).await?;
            debug!("Issued a new session");

            Ok(Some(session_cookie(config, &token, record.expires_at, now)?))
        }
        SessionOutcome::Discard => {
            if let Some(old_token) = live_token {
                store.destroy(old_token).await?;
            }

            if had_cookie {
                Ok(Some(clear_session_cookie(config)?))
            } else {
                Ok(None)
            }
        }
    }
}

/// Route-layer middleware for protected routes. Requests without a logged-in user are sent to
/// the login page and never reach the handler.
pub async fn require_authentication(
    State(app_state): AppState,
    Extension(session): Extension<SessionContext>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut ext_cxn = app_state.ext_cxn.clone();
    let user_service = domain::user::UserService::new();
    let user_reader = persistence::db_user_driven_ports::DbReadUsers;

    let resolved = resolve_current_user(&session, &mut ext_cxn, &user_service, &user_reader).await;
    match resolved {
        Ok(Some(user)) => {
            Span::current().record("user_id", field::display(user.id));
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        Ok(None) => Redirect::to("/login").into_response(),
        Err(err) => {
            error!("Could not resolve the session's user: {err:#}");
            PlainErrorResponse::internal("Error fetching user").into_response()
        }
    }
}

/// Looks up the session's user. When there isn't one the session is left with a flash
/// explaining why the request was turned away.
async fn resolve_current_user(
    session: &SessionContext,
    ext_cxn: &mut impl ExternalConnectivity,
    user_service: &impl domain::user::driving_ports::UserPort,
    user_reader: &impl domain::user::driven_ports::UserReader,
) -> Result<Option<TodoUser>, anyhow::Error> {
    let Some(user_id) = session.user_id() else {
        session.push_flash(FlashMessage::error(NOT_LOGGED_IN_MESSAGE));
        return Ok(None);
    };

    let user = user_service
        .user_by_id(user_id, &mut *ext_cxn, user_reader)
        .await?;
    if user.is_none() {
        debug!(%user_id, "Session refers to a user that no longer exists");
        session.forget_user();
        session.push_flash(FlashMessage::error(NOT_LOGGED_IN_MESSAGE));
    }

    Ok(user)
}
