//! # mipsgot
//!
//! The MIPS64 back end of an ELF link editor: relocation scanning, GOT
//! construction and instruction patching for an ISA without PC-relative
//! addressing.
//!
//! MIPS code cannot address data relative to the program counter. Instead,
//! every function materializes GOT + 0x7ff0 in the GP register and reaches
//! its GOT entries with single load instructions carrying 16-bit offsets,
//! which makes only GP ± 32 KiB addressable. The psABI answers with schemes
//! this crate deliberately does not implement:
//!
//! 1. **Multi-GOT**: one GOT (and GP value) per input file once the single
//!    window overflows. We keep a single GOT and report an out-of-range
//!    error asking the user to recompile with `-mxgot` instead.
//! 2. **Quickstart**: `.dynsym` sorted so that some dynamic relocations are
//!    represented implicitly by GOT slot order. We do not sort `.dynsym`;
//!    the loader still applies Quickstart at startup (it cannot be turned
//!    off), so the GOT reserves one slot per dynamic symbol and we simply
//!    ignore what the loader writes there.
//! 3. **Composite relocations**: a MIPS relocation record carries up to
//!    three stacked types. We decode the packed triple into one tagged
//!    operation and support only the combinations compilers actually emit.
//!
//! The crate is one phase of a larger linker: symbol resolution, section
//! layout and generic dynamic-section generation happen elsewhere and feed
//! a [`LinkContext`]. The flow here is scan (parallel, per section) →
//! finalize (single-threaded barrier) → apply (parallel, disjoint output
//! ranges).
//!
//! ```no_run
//! use mipsgot::{relocation, LinkContext};
//! # fn demo(mut ctx: LinkContext, mut sections: Vec<mipsgot::section::InputSection>,
//! #         mut image: mipsgot::image::OutputImage) -> mipsgot::Result<()> {
//! relocation::scan_all(&ctx, &mut sections);
//! relocation::finalize(&mut ctx, &mut sections);
//! relocation::apply_all(&ctx, &sections, &mut image)?;
//! ctx.got.copy_buf(&ctx, &mut image);
//! ctx.diagnostics.finish()
//! # }
//! ```

pub mod arch;
pub mod context;
pub mod elf;
mod error;
pub mod got;
pub mod image;
pub mod relocation;
pub mod section;
pub mod symbol;
mod sync;

pub use context::LinkContext;
pub use error::{Diagnostics, Error};

/// A type alias for `Result`s returned by `mipsgot` functions.
///
/// This is a convenience alias that eliminates the need to repeatedly
/// specify the `Error` type in function signatures.
pub type Result<T> = core::result::Result<T, Error>;
