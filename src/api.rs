pub mod auth;
pub mod session;
pub mod todo;
pub mod views;

#[cfg(test)]
pub mod test_util;
