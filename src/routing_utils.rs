use crate::domain::todo::driving_ports::TaskError;
use axum::extract::rejection::FormRejection;
use axum::extract::{Query, Request};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_macros::FromRequest;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;
use validator::ValidationErrors;

/// Plaintext error page for failed todo operations
#[derive(Debug)]
pub struct PlainErrorResponse {
    status: StatusCode,
    message: &'static str,
}

impl PlainErrorResponse {
    pub fn internal(message: &'static str) -> Self {
        PlainErrorResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }

    /// Picks the status for a failed todo operation. The body is always [message].
    pub fn from_task_error(err: &TaskError, message: &'static str) -> Self {
        let status = match err {
            TaskError::NotFound => StatusCode::NOT_FOUND,
            TaskError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        PlainErrorResponse { status, message }
    }
}

/// Parses a todo id taken from the URL. A malformed id fails the same way a missing todo does.
pub fn parse_todo_id(
    raw: &str,
    failure_message: &'static str,
) -> Result<Uuid, PlainErrorResponse> {
    Uuid::parse_str(raw).map_err(|err| {
        debug!("Malformed todo id {raw:?}: {err}");
        PlainErrorResponse::from_task_error(&TaskError::NotFound, failure_message)
    })
}

impl IntoResponse for PlainErrorResponse {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Wrapper for [axum::Form] which answers unreadable form bodies with a plaintext 400
#[derive(FromRequest)]
#[from_request(via(axum::Form), rejection(FormErrorResponse))]
pub struct Form<T>(pub T);

/// Response type representing form parse errors
#[derive(Debug)]
pub struct FormErrorResponse {
    parse_problem: String,
}

impl From<FormRejection> for FormErrorResponse {
    fn from(value: FormRejection) -> Self {
        FormErrorResponse {
            parse_problem: value.body_text(),
        }
    }
}

impl IntoResponse for FormErrorResponse {
    fn into_response(self) -> Response {
        debug!("Rejected form submission: {}", self.parse_problem);
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid form submission: {}", self.parse_problem),
        )
            .into_response()
    }
}

/// Flattens validation failures into a single human-readable line, ordered by field name
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by_key(|(field, _)| *field);

    let mut messages: Vec<String> = Vec::new();
    for (field, field_errors) in fields {
        for field_error in field_errors {
            let message = match &field_error.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            };
            if !messages.contains(&message) {
                messages.push(message);
            }
        }
    }

    messages.join(". ")
}

#[derive(Deserialize)]
struct MethodOverride {
    #[serde(rename = "_method")]
    method: Option<String>,
}

/// Lets HTML forms, which can only POST, reach PUT and DELETE routes by adding
/// `?_method=PUT` or `?_method=DELETE` to the form's action. Has to run before routing.
pub fn method_override(mut request: Request) -> Request {
    if request.method() != Method::POST {
        return request;
    }

    let Ok(Query(MethodOverride {
        method: Some(requested),
    })) = Query::<MethodOverride>::try_from_uri(request.uri())
    else {
        return request;
    };

    let overridden = match requested.to_ascii_uppercase().as_str() {
        "PUT" => Method::PUT,
        "DELETE" => Method::DELETE,
        _ => return request,
    };
    *request.method_mut() = overridden;

    request
}
