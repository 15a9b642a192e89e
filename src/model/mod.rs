pub mod common;
pub mod idempotency_key;
pub mod item;
pub mod unit;
pub mod user_context;

pub use common::*;
pub use idempotency_key::*;
pub use item::*;
pub use unit::*;
pub use user_context::*;
