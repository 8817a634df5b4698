//! Link errors and the accumulator that collects them across phases.
//!
//! Three failure classes are kept apart on purpose. Internal layout
//! inconsistencies (a GOT query before finalization, a patch outside its
//! section) are bugs in the caller and panic. Malformed input in a
//! single-threaded path returns an [`Error`]. Everything found while
//! patching in parallel is pushed into [`Diagnostics`] so one bad
//! relocation does not hide the next.

use crate::symbol::SymbolId;
use crate::sync::Mutex;
use core::fmt;
use hashbrown::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A relocation type (or composite combination) we do not support.
    UnknownRelocation {
        section: String,
        r_type: u32,
        offset: u64,
    },
    /// A computed value does not fit the instruction field.
    RelocOutOfRange {
        section: String,
        rel: &'static str,
        symbol: String,
        value: i64,
        lo: i64,
        hi: i64,
    },
    /// TLS local-exec relocation in position-independent output.
    TlsLocalExec { section: String, symbol: String },
    /// A relocation kind that is meaningless outside loaded sections.
    NonAllocRelocation {
        section: String,
        r_type: u32,
        offset: u64,
    },
    /// An unrecognized `.eh_frame` CIE augmentation character.
    EhFrameAugmentation { section: String, ch: char },
    /// A CIE pointer encoding whose size we cannot determine.
    EhFramePointerSize { section: String },
    /// A CIE record ends before its fields do.
    EhFrameTruncated { section: String },
    /// A relocation type `.eh_frame` contents cannot carry.
    EhFrameRelocation { r_type: u32 },
    /// A relocation against a symbol no input file defines.
    UndefinedSymbol { section: String, symbol: String },
    /// Terminal summary once any error has been accumulated.
    LinkFailed { errors: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownRelocation {
                section,
                r_type,
                offset,
            } => write!(
                f,
                "{section}: unknown relocation {} ({r_type:#x}) at offset {offset:#x}",
                crate::arch::rel_type_name(*r_type)
            ),
            Error::RelocOutOfRange {
                section,
                rel,
                symbol,
                value,
                lo,
                hi,
            } => write!(
                f,
                "{section}: relocation {rel} against {symbol} out of range: \
                 {value} is not in [{lo}, {hi}); recompile with -mxgot"
            ),
            Error::TlsLocalExec { section, symbol } => write!(
                f,
                "{section}: relocation R_MIPS_TLS_TPREL_HI16 against {symbol} \
                 can not be used when making a shared object; recompile with -fPIC"
            ),
            Error::NonAllocRelocation {
                section,
                r_type,
                offset,
            } => write!(
                f,
                "{section}: invalid relocation {} ({r_type:#x}) at offset {offset:#x} \
                 in a non-allocated section",
                crate::arch::rel_type_name(*r_type)
            ),
            Error::EhFrameAugmentation { section, ch } => {
                write!(f, "{section}: unknown CIE augmentation character '{ch}'")
            }
            Error::EhFramePointerSize { section } => {
                write!(f, "{section}: unsupported CIE pointer size")
            }
            Error::EhFrameTruncated { section } => {
                write!(f, "{section}: truncated CIE record")
            }
            Error::EhFrameRelocation { r_type } => write!(
                f,
                ".eh_frame: unsupported relocation {} ({r_type:#x})",
                crate::arch::rel_type_name(*r_type)
            ),
            Error::UndefinedSymbol { section, symbol } => {
                write!(f, "{section}: undefined symbol: {symbol}")
            }
            Error::LinkFailed { errors } => {
                write!(f, "link failed with {errors} error(s)")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Shared error accumulator. Any number of scan/apply workers may report
/// into it concurrently; the driver drains it once at the end.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Mutex<Vec<Error>>,
    undef_seen: Mutex<HashSet<SymbolId>>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    /// Record one error. Never aborts the phase that found it.
    pub fn report(&self, err: Error) {
        log::error!("{err}");
        self.errors.lock().unwrap().push(err);
    }

    /// True exactly once per symbol, so an undefined symbol referenced by
    /// a thousand call sites produces a single diagnostic.
    pub fn first_undef(&self, sym: SymbolId) -> bool {
        self.undef_seen.lock().unwrap().insert(sym)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.lock().unwrap().is_empty()
    }

    /// Drain all accumulated errors, oldest first.
    pub fn take(&self) -> Vec<Error> {
        core::mem::take(&mut *self.errors.lock().unwrap())
    }

    /// Succeed only if nothing was reported since the last drain.
    pub fn finish(&self) -> crate::Result<()> {
        let n = self.errors.lock().unwrap().len();
        if n == 0 {
            Ok(())
        } else {
            Err(Error::LinkFailed { errors: n })
        }
    }
}
