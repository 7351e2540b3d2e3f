//! Loader for relocatable object modules linked into the system image.
//!
//! Loading links the object against the system symbol table and adds its
//! globals to that table. Every lookup goes through the same table, so
//! per-module and global symbol lookup are identical.

use super::{DynamicLoader, LibraryHandle, LoadError, SymbolAddress, read_c_string};
use std::ffi::CString;
use std::os::fd::AsRawFd;
use std::path::Path;

// FFI for the target's module loader and symbol library.
#[allow(unsafe_code)]
unsafe extern "C" {
    fn loadModule(fd: libc::c_int, symbol_flags: libc::c_int) -> *mut libc::c_void;
    fn symFindByName(
        table: *mut libc::c_void,
        name: *const libc::c_char,
        value: *mut *mut libc::c_char,
        kind: *mut u8,
    ) -> libc::c_int;
    fn errnoGet() -> libc::c_int;
    fn errnoSet(value: libc::c_int) -> libc::c_int;
    static sysSymTbl: *mut libc::c_void;
}

/// Add the module's global symbols to the system table.
const LOAD_GLOBAL_SYMBOLS: libc::c_int = 0x8;
/// `S_symLib_SYMBOL_NOT_FOUND`: set when relocation hit an undefined symbol.
const SYMBOL_NOT_FOUND: libc::c_int = 0x1c_0001;
const OK: libc::c_int = 0;

/// Loader backed by `loadModule` and `symFindByName`.
#[derive(Debug, Default)]
pub struct SegmentedLoader {
    modules: Vec<usize>,
}

impl DynamicLoader for SegmentedLoader {
    #[allow(unsafe_code)]
    fn load(&mut self, path: &Path) -> Result<LibraryHandle, LoadError> {
        tracing::debug!("loadModule {}", path.display());
        let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: The descriptor is open for reading for the duration of the
        // call. errno is thread-local.
        let (module, errno) = unsafe {
            errnoSet(0);
            let module = loadModule(file.as_raw_fd(), LOAD_GLOBAL_SYMBOLS);
            (module, errnoGet())
        };

        if errno == SYMBOL_NOT_FOUND {
            return Err(LoadError::UnresolvedSymbol {
                path: path.to_path_buf(),
                message: "undefined symbols remain after linking".to_string(),
            });
        }
        if module.is_null() {
            return Err(LoadError::Rejected {
                path: path.to_path_buf(),
                message: format!("loadModule failed (errno {errno:#x})"),
            });
        }
        self.modules.push(module as usize);
        Ok(LibraryHandle::from_raw(self.modules.len() - 1))
    }

    fn resolve_symbol(&self, _handle: LibraryHandle, name: &str) -> Option<SymbolAddress> {
        self.probe_global(name)
    }

    #[allow(unsafe_code)]
    fn probe_global(&self, name: &str) -> Option<SymbolAddress> {
        let name = CString::new(name).ok()?;
        let mut value: *mut libc::c_char = std::ptr::null_mut();
        let mut kind: u8 = 0;
        // SAFETY: The name is NUL-terminated and both out-pointers refer to
        // live locals. The system symbol table exists for the whole run.
        let status = unsafe { symFindByName(sysSymTbl, name.as_ptr(), &mut value, &mut kind) };
        (status == OK && !value.is_null()).then(|| SymbolAddress::from_raw(value as usize))
    }

    #[allow(unsafe_code)]
    fn read_marker(&self, address: SymbolAddress) -> Option<String> {
        // SAFETY: Marker symbols are `const char[]` strings in a loaded module.
        unsafe { read_c_string(address) }
    }
}
