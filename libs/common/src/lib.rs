pub mod id;
pub mod plate;
pub mod snowflake;
pub mod time;

pub use plate::Plate;
pub use snowflake::SnowflakeGenerator;
