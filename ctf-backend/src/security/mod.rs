pub mod csrf;
pub mod password;
pub mod sanitize;
