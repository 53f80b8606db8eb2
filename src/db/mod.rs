pub mod diesel_pool;
pub mod redis_config;
pub mod redis_pool;

pub use diesel_pool::{check_diesel_health, create_diesel_pool, DieselDatabaseConfig, DieselPool};
pub use redis_config::RedisConfig;
pub use redis_pool::RedisPool;
