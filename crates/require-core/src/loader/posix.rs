//! `dlopen`-based loader for ELF and Mach-O shared binaries.

use super::{DynamicLoader, LibraryHandle, LoadError, SymbolAddress, read_c_string};
use libloading::os::unix::{Library, Symbol};
use std::path::Path;

/// Loader backed by `dlopen(RTLD_NOW | RTLD_GLOBAL)`.
///
/// Binaries stay loaded for the lifetime of the process.
#[derive(Debug)]
pub struct PosixLoader {
    libraries: Vec<Library>,
    process: Library,
}

impl Default for PosixLoader {
    fn default() -> Self {
        Self {
            libraries: Vec::new(),
            process: Library::this(),
        }
    }
}

fn is_unresolved_symbol(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("undefined symbol") || message.contains("symbol not found")
}

#[allow(unsafe_code)]
fn lookup(library: &Library, name: &str) -> Option<SymbolAddress> {
    // SAFETY: The symbol is only used as an address; nothing is called
    // through it and the library outlives the lookup.
    let symbol: Symbol<*mut libc::c_void> = unsafe { library.get(name.as_bytes()) }.ok()?;
    let address = *symbol as usize;
    (address != 0).then(|| SymbolAddress::from_raw(address))
}

impl DynamicLoader for PosixLoader {
    #[allow(unsafe_code)]
    fn load(&mut self, path: &Path) -> Result<LibraryHandle, LoadError> {
        tracing::debug!("dlopen {}", path.display());
        // SAFETY: Loading runs the binary's initialisers. Module binaries are
        // trusted code selected from the configured search path.
        let library = unsafe { Library::open(Some(path), libc::RTLD_NOW | libc::RTLD_GLOBAL) }
            .map_err(|e| {
                let message = e.to_string();
                if is_unresolved_symbol(&message) {
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
        lookup(&self.process, name)
    }

    #[allow(unsafe_code)]
    fn read_marker(&self, address: SymbolAddress) -> Option<String> {
        // SAFETY: Marker symbols are `const char[]` strings in a loaded binary.
        unsafe { read_c_string(address) }
    }
}
