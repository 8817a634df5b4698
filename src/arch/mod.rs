//! Architecture-specific ELF knowledge.
//!
//! This back end is instantiated for 64-bit MIPS (n64 ABI, little-endian).

pub mod mips64;

pub use mips64::*;
