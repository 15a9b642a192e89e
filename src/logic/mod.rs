pub mod format;
pub mod idempotency;
pub mod lifecycle;
pub mod mutations;
pub mod projection;
pub mod quantity;

#[cfg(test)]
pub(crate) mod test_support;

pub use format::*;
pub use idempotency::*;
pub use lifecycle::*;
pub use mutations::*;
pub use projection::*;
pub use quantity::*;
