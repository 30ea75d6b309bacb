//! Store client boundary.
//!
//! [`KvBackend`] is the contract of the external consistent store together with
//! the record types it speaks in. Adaptors implementing it live under
//! `adaptors`.
mod adaptors;
mod kv_backend;

pub use adaptors::*;
pub use kv_backend::*;
