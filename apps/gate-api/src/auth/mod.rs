pub mod identity;
pub mod middleware;
pub mod password;
pub mod tokens;
