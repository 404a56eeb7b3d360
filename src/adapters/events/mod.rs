//! Event handling adapters.
//!
//! - `IdempotentHandler` - Drops events a handler has already processed
//! - `InMemoryProcessedEventStore` - Bounded memory of processed event ids

mod idempotent_handler;
mod in_memory;

pub use idempotent_handler::IdempotentHandler;
pub use in_memory::InMemoryProcessedEventStore;
