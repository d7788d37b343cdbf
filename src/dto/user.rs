use crate::domain;
use derive_more::Display;
use serde::Deserialize;
use validator::Validate;

/// Form submitted to create a new account
#[derive(Deserialize, Display, Validate)]
#[display("{username} <{email}>")]
#[cfg_attr(test, derive(Debug))]
pub struct SignupForm {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, max = 64, message = "Username must be 1 to 64 characters long"))]
    pub username: String,
    #[validate(length(min = 1, message = "Missing credentials"))]
    pub password: String,
}

impl From<SignupForm> for domain::user::CreateUser {
    fn from(value: SignupForm) -> Self {
        domain::user::CreateUser {
            username: value.username,
            email: value.email,
            password: value.password,
        }
    }
}

/// Form submitted to log in
#[derive(Deserialize, Display, Validate)]
#[display("{username}")]
#[cfg_attr(test, derive(Debug))]
pub struct LoginForm {
    #[validate(length(min = 1, message = "Missing credentials"))]
    pub username: String,
    #[validate(length(min = 1, message = "Missing credentials"))]
    pub password: String,
}
