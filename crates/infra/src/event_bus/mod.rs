//! Infrastructure-backed event sources.
//!
//! The bus abstraction lives in `authreplica-events` as pure mechanics; this
//! module provides transports for it (e.g. Redis).

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsConfig, RedisStreamsError, RedisStreamsSource};
