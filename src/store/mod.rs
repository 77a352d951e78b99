pub mod driver;
pub mod memory;
pub mod redis;

pub use driver::{StoreDriver, StoreError};
pub use memory::MemoryStore;
pub use redis::RedisDriver;
