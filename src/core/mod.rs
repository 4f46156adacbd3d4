//! Foundational and often-reused types.

pub mod id;
pub mod packet;
pub(crate) mod traits;
