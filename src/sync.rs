//! Synchronization primitives used across the crate, gathered in one place
//! so the scan/apply phases all agree on where their shared state lives.

pub(crate) use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
pub(crate) use std::sync::Mutex;
