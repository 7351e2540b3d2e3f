//! Platform loader: opens shared binaries and looks up exported symbols.
//!
//! The resolver only sees the [`DynamicLoader`] trait. One backend is
//! compiled per platform and exposed as [`NativeLoader`]:
//!
//! - [`posix`]: `dlopen` with immediate binding and global symbol visibility.
//! - [`windows`]: `LoadLibrary`, symbols looked up per module.
//! - [`segmented`]: relocatable objects linked into the system symbol table.
//!
//! Unresolved references are reported as [`LoadError::UnresolvedSymbol`] by
//! every backend, so a partially linked binary never counts as loaded.

use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(all(unix, not(target_os = "vxworks")))]
pub mod posix;
#[cfg(target_os = "vxworks")]
pub mod segmented;
#[cfg(windows)]
pub mod windows;

#[cfg(all(unix, not(target_os = "vxworks")))]
pub use posix::PosixLoader as NativeLoader;
#[cfg(target_os = "vxworks")]
pub use segmented::SegmentedLoader as NativeLoader;
#[cfg(windows)]
pub use windows::WindowsLoader as NativeLoader;

/// Opaque handle of a loaded binary, valid for the loader that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryHandle(usize);

impl LibraryHandle {
    /// Wrap a backend-specific handle value.
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// The backend-specific handle value.
    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// Address of an exported symbol in the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(usize);

impl SymbolAddress {
    /// Wrap a raw address.
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// The raw address.
    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// Errors from loading a binary.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    /// The platform refused the file.
    #[error("cannot load {}: {message}", path.display())]
    Rejected { path: PathBuf, message: String },

    /// The file loaded but references symbols nothing provides.
    #[error("unresolved symbols in {}: {message}", path.display())]
    UnresolvedSymbol { path: PathBuf, message: String },

    /// The file could not be read.
    #[error("cannot open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Loads binaries into the running process and finds their symbols.
pub trait DynamicLoader: fmt::Debug {
    /// Load the binary at `path` with all references bound immediately and
    /// its symbols visible to binaries loaded later.
    fn load(&mut self, path: &Path) -> Result<LibraryHandle, LoadError>;

    /// Look up `name` in the binary behind `handle`.
    fn resolve_symbol(&self, handle: LibraryHandle, name: &str) -> Option<SymbolAddress>;

    /// Look up `name` among all symbols visible to the process, including
    /// those linked into the host itself.
    fn probe_global(&self, name: &str) -> Option<SymbolAddress>;

    /// Read the NUL-terminated string stored at a version marker symbol.
    fn read_marker(&self, address: SymbolAddress) -> Option<String>;
}

/// Read a NUL-terminated string at `address` in this process.
///
/// # Safety
///
/// `address` must point to a readable NUL-terminated byte string that lives
/// for the duration of the call, as marker symbols exported by loaded
/// binaries do.
#[allow(unsafe_code)]
pub(crate) unsafe fn read_c_string(address: SymbolAddress) -> Option<String> {
    if address.as_raw() == 0 {
        return None;
    }
    let ptr = address.as_raw() as *const libc::c_char;
    // SAFETY: Upheld by the caller; the pointer is non-null.
    let text = unsafe { std::ffi::CStr::from_ptr(ptr) };
    Some(text.to_string_lossy().into_owned())
}

/// The loader for the platform this binary was compiled for.
pub fn native() -> Box<dyn DynamicLoader> {
    Box::new(NativeLoader::default())
}
