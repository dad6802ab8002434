pub mod kv;
pub mod memory;
pub mod pg;
pub mod pool;
pub mod schema;
pub mod store;
