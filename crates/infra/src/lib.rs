//! Infrastructure layer: configuration, storage and the write queue.

pub mod config;
pub mod store;
pub mod write_queue;


pub use config::{ConfigError, WriteQueueConfig};
pub use store::{GameStore, InMemoryGameStore, SqliteGameStore, StoreError};
pub use write_queue::{WriteFacade, WriteQueue, WriteQueueError};
