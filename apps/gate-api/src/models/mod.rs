pub mod access_log;
pub mod car;
pub mod guest;
pub mod user;
