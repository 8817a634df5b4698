//! ELF data structures and constants not covered by the `elf` crate.

pub mod abi;
mod defs;

pub use defs::ElfRela;
