//! `LoadLibrary`-based loader for DLLs.

use super::{DynamicLoader, LibraryHandle, LoadError, SymbolAddress, read_c_string};
use libloading::os::windows::{Library, Symbol};
use std::error::Error as _;
use std::path::Path;

/// `ERROR_PROC_NOT_FOUND`: an import could not be bound.
const PROC_NOT_FOUND: &str = "os error 127";

/// Loader backed by `LoadLibraryExW`.
///
/// DLL exports are only visible through their own module handle, so global
/// probes walk every loaded DLL after the host executable.
#[derive(Debug, Default)]
pub struct WindowsLoader {
    libraries: Vec<Library>,
}

fn describe(err: &libloading::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[allow(unsafe_code)]
fn lookup(library: &Library, name: &str) -> Option<SymbolAddress> {
    // SAFETY: The symbol is only used as an address; nothing is called
    // through it and the library outlives the lookup.
    let symbol: Symbol<*mut libc::c_void> = unsafe { library.get(name.as_bytes()) }.ok()?;
    let address = *symbol as usize;
    (address != 0).then(|| SymbolAddress::from_raw(address))
}

impl DynamicLoader for WindowsLoader {
    #[allow(unsafe_code)]
    fn load(&mut self, path: &Path) -> Result<LibraryHandle, LoadError> {
        tracing::debug!("LoadLibrary {}", path.display());
        // SAFETY: Loading runs DllMain. Module binaries are trusted code
        // selected from the configured search path.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            let message = describe(&e);
            if message.contains(PROC_NOT_FOUND) {
                LoadError::UnresolvedSymbol {
                    path: path.to_path_buf(),
                    message,
                }
            } else {
                LoadError::Rejected {
                    path: path.to_path_buf(),
                    message,
                }
            }
        })?;
        self.libraries.push(library);
        Ok(LibraryHandle::from_raw(self.libraries.len() - 1))
    }

    fn resolve_symbol(&self, handle: LibraryHandle, name: &str) -> Option<SymbolAddress> {
        lookup(self.libraries.get(handle.as_raw())?, name)
    }

    fn probe_global(&self, name: &str) -> Option<SymbolAddress> {
        let process = Library::this().ok()?;
        lookup(&process, name).or_else(|| self.libraries.iter().find_map(|l| lookup(l, name)))
    }

    #[allow(unsafe_code)]
    fn read_marker(&self, address: SymbolAddress) -> Option<String> {
        // SAFETY: Marker symbols are `const char[]` strings in a loaded DLL.
        unsafe { read_c_string(address) }
    }
}
