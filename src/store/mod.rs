//! Storage for Signal protocol data.
//!
//! Provides the account's key material, the store traits the session engine
//! consumes and an in-memory implementation of them.

mod device;
mod traits;
mod memory;

pub use device::*;
pub use traits::*;
pub use memory::*;
