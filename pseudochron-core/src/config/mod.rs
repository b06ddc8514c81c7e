//! Configuration types
//!
//! Channel count, pin assignment and tick rate. Stored as postcard binary
//! data by whatever persistence layer the firmware provides.

pub mod pins;
pub mod types;

pub use pins::*;
pub use types::*;
