pub mod session;
pub mod todo;
pub mod user;

#[cfg(test)]
pub mod test_util;
