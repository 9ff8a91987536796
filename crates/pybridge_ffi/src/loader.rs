//! Dynamic loading of the embedded Python runtime library.
//!
//! The interpreter's shared library is located at process start and opened
//! with the platform dynamic loader. Resolution order:
//!
//! 1. The current process image (Python already linked or preloaded).
//! 2. An explicit override from `PYTHON_LIBRARY` or [`use_library_path`].
//! 3. A candidate matrix of {version descending, search path, library name
//!    pattern} probed until one opens and exposes `Py_Initialize`.
//!
//! Symbol names come in two generations (Python 2's `PyString_*`/`PyInt_*`
//! versus Python 3's `PyUnicode_*`/`PyLong_*`). A single probe for the
//! legacy-only sentinel symbol decides which generation every subsequent
//! lookup uses.
//!
//! Search attempts are logged to stderr when `PYTHON_LOADER_LOGGING` is set;
//! the toggle has no control-flow impact.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use libloading::Library;
use once_cell::sync::OnceCell;
use thiserror::Error;

/// Environment variable naming an explicit Python shared library path.
pub const PYTHON_LIBRARY_ENV: &str = "PYTHON_LIBRARY";
/// Environment variable requesting a specific Python version (`3` or `3.11`).
pub const PYTHON_VERSION_ENV: &str = "PYTHON_VERSION";
/// Environment variable enabling verbose load-attempt logging to stderr.
pub const PYTHON_LOADER_LOGGING_ENV: &str = "PYTHON_LOADER_LOGGING";

/// Symbol that must be present in any usable Python library.
const INITIALIZE_SYMBOL: &str = "Py_Initialize";

/// Legacy-only sentinel; its presence selects the Python 2 symbol generation.
const LEGACY_SENTINEL_SYMBOL: &str = "PyString_AsString";

/// Minor versions probed for Python 3, newest first.
const PYTHON_3_MINORS: std::ops::RangeInclusive<u8> = 0..=13;
/// The only Python 2 version probed.
const PYTHON_2_VERSION: PyVersion = PyVersion { major: 2, minor: 7 };

static LOADED_LIBRARY: OnceCell<PythonLibrary> = OnceCell::new();
static REQUESTED_VERSION: Mutex<Option<RequestedVersion>> = Mutex::new(None);
static REQUESTED_PATH: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Errors raised while locating and loading the Python runtime library.
///
/// Only [`LoadError::LibraryNotFound`] is recoverable; every other variant
/// indicates a broken installation or configuration and is escalated to a
/// fatal error before the entry point table is built.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No candidate library could be opened.
    #[error(
        "Python library not found. Set the {PYTHON_LIBRARY_ENV} environment \
         variable with the full path to a Python shared library"
    )]
    LibraryNotFound,

    /// A specific library path failed to open.
    #[error("failed to load Python library '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// The loaded library does not export a required symbol.
    #[error("symbol '{name}' missing from the loaded Python library")]
    MissingSymbol { name: String },

    /// The loaded interpreter does not match the requested version.
    #[error(
        "loaded Python {found}, but {requested} was requested via \
         {PYTHON_VERSION_ENV}"
    )]
    VersionMismatch {
        requested: RequestedVersion,
        found: PyVersion,
    },
}

/// An interpreter version, as reported by the runtime itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PyVersion {
    pub major: u8,
    pub minor: u8,
}

impl PyVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A version constraint supplied by the caller or `PYTHON_VERSION`.
///
/// A bare major (`3`) matches any minor of that major; `3.11` is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedVersion {
    pub major: u8,
    pub minor: Option<u8>,
}

impl RequestedVersion {
    pub const fn new(major: u8, minor: Option<u8>) -> Self {
        Self { major, minor }
    }

    /// Parse `"3"` or `"3.11"`. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().splitn(2, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(minor) => Some(minor.parse().ok()?),
            None => None,
        };
        Some(Self { major, minor })
    }

    /// Whether a concrete interpreter version satisfies this request.
    pub fn matches(&self, version: PyVersion) -> bool {
        self.major == version.major && self.minor.map_or(true, |m| m == version.minor)
    }
}

impl fmt::Display for RequestedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "Python {}.{}", self.major, minor),
            None => write!(f, "Python {}", self.major),
        }
    }
}

/// Request a specific interpreter version before the library is loaded.
///
/// Calling this after the first symbol resolution is a programming error:
/// the entry point table is immutable once built.
pub fn use_version(major: u8, minor: Option<u8>) {
    assert!(
        LOADED_LIBRARY.get().is_none(),
        "use_version called after the Python library was already loaded"
    );
    *REQUESTED_VERSION.lock().unwrap() = Some(RequestedVersion::new(major, minor));
}

/// Request an explicit library path before the library is loaded.
///
/// Same precondition as [`use_version`]: must precede the first resolution.
pub fn use_library_path(path: impl Into<PathBuf>) {
    assert!(
        LOADED_LIBRARY.get().is_none(),
        "use_library_path called after the Python library was already loaded"
    );
    *REQUESTED_PATH.lock().unwrap() = Some(path.into());
}

/// The version constraint currently in effect, if any.
pub(crate) fn requested_version() -> Option<RequestedVersion> {
    if let Some(requested) = *REQUESTED_VERSION.lock().unwrap() {
        return Some(requested);
    }
    env::var(PYTHON_VERSION_ENV)
        .ok()
        .and_then(|text| RequestedVersion::parse(&text))
}

fn requested_path() -> Option<PathBuf> {
    if let Some(path) = REQUESTED_PATH.lock().unwrap().clone() {
        return Some(path);
    }
    env::var_os(PYTHON_LIBRARY_ENV).map(PathBuf::from)
}

fn loader_logging_enabled() -> bool {
    env::var_os(PYTHON_LOADER_LOGGING_ENV).is_some()
}

macro_rules! loader_log {
    ($($arg:tt)*) => {
        if loader_logging_enabled() {
            eprintln!($($arg)*);
        }
    };
}

/// The opened Python shared library, plus the one-time legacy probe result.
pub struct PythonLibrary {
    library: Library,
    path: Option<PathBuf>,
    legacy: bool,
}

impl PythonLibrary {
    /// The process-wide library, loading it on first use. Idempotent.
    pub fn shared() -> Result<&'static PythonLibrary, LoadError> {
        LOADED_LIBRARY.get_or_try_init(Self::load)
    }

    /// Whether the library was already loaded by a previous call.
    pub fn is_loaded() -> bool {
        LOADED_LIBRARY.get().is_some()
    }

    fn load() -> Result<PythonLibrary, LoadError> {
        // (a) Python already present in the process image.
        if let Some(library) = Self::from_current_process() {
            loader_log!("Python runtime found in the current process image");
            log::info!("using Python runtime already linked into the process");
            return Ok(library);
        }

        // (b) Explicit override: exactly this path or nothing.
        if let Some(path) = requested_path() {
            loader_log!("Trying explicit Python library at {}", path.display());
            let library = Self::open(&path)?;
            if !library.has_symbol(INITIALIZE_SYMBOL) {
                return Err(LoadError::MissingSymbol {
                    name: INITIALIZE_SYMBOL.to_string(),
                });
            }
            log::info!("loaded Python library from {}", path.display());
            return Ok(library);
        }

        // (c) Candidate matrix, version descending, first success wins.
        for candidate in library_candidates(requested_version()) {
            loader_log!("Trying to load library at '{}'", candidate.display());
            match Self::open(&candidate) {
                Ok(library) if library.has_symbol(INITIALIZE_SYMBOL) => {
                    loader_log!("Library at '{}' was successfully loaded", candidate.display());
                    log::info!("loaded Python library from {}", candidate.display());
                    return Ok(library);
                }
                Ok(_) => {
                    loader_log!(
                        "Library at '{}' lacks {INITIALIZE_SYMBOL}, skipping",
                        candidate.display()
                    );
                }
                Err(_) => {}
            }
        }

        Err(LoadError::LibraryNotFound)
    }

    /// Probe the current process image for an already-linked runtime.
    fn from_current_process() -> Option<PythonLibrary> {
        #[cfg(unix)]
        let library = Library::from(libloading::os::unix::Library::this());
        #[cfg(windows)]
        let library = Library::from(libloading::os::windows::Library::this().ok()?);

        let library = PythonLibrary::wrap(library, None);
        if library.has_symbol(INITIALIZE_SYMBOL) {
            Some(library)
        } else {
            None
        }
    }

    fn open(path: &Path) -> Result<PythonLibrary, LoadError> {
        // RTLD_GLOBAL so native extension modules loaded later by the
        // interpreter can resolve its symbols.
        #[cfg(unix)]
        let library = unsafe {
            let flags = libloading::os::unix::RTLD_NOW | libloading::os::unix::RTLD_GLOBAL;
            libloading::os::unix::Library::open(Some(path), flags)
                .map(Library::from)
                .map_err(|e| LoadError::OpenFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
        };
        #[cfg(not(unix))]
        let library = unsafe {
            Library::new(path).map_err(|e| LoadError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        Ok(PythonLibrary::wrap(library, Some(path.to_path_buf())))
    }

    fn wrap(library: Library, path: Option<PathBuf>) -> PythonLibrary {
        let mut wrapped = PythonLibrary {
            library,
            path,
            legacy: false,
        };
        wrapped.legacy = wrapped.has_symbol(LEGACY_SENTINEL_SYMBOL);
        if wrapped.legacy {
            log::warn!("legacy Python symbol generation detected (Python 2)");
        }
        wrapped
    }

    /// Whether the legacy (Python 2) symbol generation is in effect.
    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    /// The path the library was opened from, `None` for the process image.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn has_symbol(&self, name: &str) -> bool {
        unsafe { self.raw_symbol::<*mut std::ffi::c_void>(name).is_ok() }
    }

    /// Resolve a symbol under exactly the given name.
    ///
    /// # Safety
    /// `T` must match the symbol's actual type in the loaded library.
    pub(crate) unsafe fn raw_symbol<T: Copy>(&self, name: &str) -> Result<T, LoadError> {
        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);
        match self.library.get::<T>(&bytes) {
            Ok(symbol) => Ok(*symbol),
            Err(_) => Err(LoadError::MissingSymbol {
                name: name.to_string(),
            }),
        }
    }

    /// Resolve a symbol, picking the modern or legacy name based on the
    /// one-time probe.
    ///
    /// # Safety
    /// `T` must match the symbol's actual type in the loaded library.
    pub(crate) unsafe fn symbol<T: Copy>(
        &self,
        modern: &str,
        legacy: Option<&str>,
    ) -> Result<T, LoadError> {
        let name = if self.legacy {
            legacy.unwrap_or(modern)
        } else {
            modern
        };
        loader_log!("Loading symbol '{name}' from the Python library...");
        self.raw_symbol(name)
    }
}

/// Candidate library paths, best first.
///
/// The matrix is {version descending} x {platform search path} x
/// {platform library name pattern}; `requested` filters the version axis.
pub(crate) fn library_candidates(requested: Option<RequestedVersion>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for version in candidate_versions(requested) {
        for prefix in library_search_prefixes(version) {
            for name in library_file_names(version) {
                candidates.push(PathBuf::from(format!("{prefix}{name}")));
            }
        }
    }
    candidates
}

fn candidate_versions(requested: Option<RequestedVersion>) -> Vec<PyVersion> {
    let mut versions = Vec::new();
    for minor in PYTHON_3_MINORS.rev() {
        versions.push(PyVersion::new(3, minor));
    }
    versions.push(PYTHON_2_VERSION);
    match requested {
        Some(request) => versions
            .into_iter()
            .filter(|v| request.matches(*v))
            .collect(),
        None => versions,
    }
}

#[cfg(target_os = "macos")]
fn library_search_prefixes(version: PyVersion) -> Vec<String> {
    vec![
        String::new(),
        format!("/opt/homebrew/Frameworks/Python.framework/Versions/{version}/lib/"),
        format!("/usr/local/Frameworks/Python.framework/Versions/{version}/lib/"),
        format!("/Library/Frameworks/Python.framework/Versions/{version}/lib/"),
        "/usr/lib/".to_string(),
        "/usr/local/lib/".to_string(),
    ]
}

#[cfg(target_os = "macos")]
fn library_file_names(version: PyVersion) -> Vec<String> {
    vec![format!("libpython{version}.dylib")]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn library_search_prefixes(_version: PyVersion) -> Vec<String> {
    vec![
        String::new(),
        "/usr/lib/".to_string(),
        "/usr/local/lib/".to_string(),
        "/usr/lib/x86_64-linux-gnu/".to_string(),
        "/usr/lib/aarch64-linux-gnu/".to_string(),
    ]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn library_file_names(version: PyVersion) -> Vec<String> {
    vec![
        format!("libpython{version}.so"),
        format!("libpython{version}.so.1"),
        format!("libpython{version}m.so"),
        format!("libpython{version}m.so.1"),
    ]
}

#[cfg(windows)]
fn library_search_prefixes(_version: PyVersion) -> Vec<String> {
    vec![String::new()]
}

#[cfg(windows)]
fn library_file_names(version: PyVersion) -> Vec<String> {
    vec![format!("python{}{}.dll", version.major, version.minor)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_version_parse() {
        assert_eq!(
            RequestedVersion::parse("3.11"),
            Some(RequestedVersion::new(3, Some(11)))
        );
        assert_eq!(
            RequestedVersion::parse("3"),
            Some(RequestedVersion::new(3, None))
        );
        assert_eq!(RequestedVersion::parse(""), None);
        assert_eq!(RequestedVersion::parse("python3"), None);
    }

    #[test]
    fn test_requested_version_matching() {
        let major_only = RequestedVersion::new(3, None);
        assert!(major_only.matches(PyVersion::new(3, 0)));
        assert!(major_only.matches(PyVersion::new(3, 13)));
        assert!(!major_only.matches(PyVersion::new(2, 7)));

        let exact = RequestedVersion::new(3, Some(11));
        assert!(exact.matches(PyVersion::new(3, 11)));
        assert!(!exact.matches(PyVersion::new(3, 12)));
    }

    #[test]
    fn test_candidate_versions_descend() {
        let versions = candidate_versions(None);
        assert_eq!(versions.first(), Some(&PyVersion::new(3, 13)));
        assert_eq!(versions.last(), Some(&PyVersion::new(2, 7)));
        for pair in versions.windows(2) {
            assert!(pair[0] > pair[1], "versions must descend: {pair:?}");
        }
    }

    #[test]
    fn test_candidate_versions_respect_request() {
        let versions = candidate_versions(Some(RequestedVersion::new(3, Some(9))));
        assert_eq!(versions, vec![PyVersion::new(3, 9)]);

        let versions = candidate_versions(Some(RequestedVersion::new(2, None)));
        assert_eq!(versions, vec![PyVersion::new(2, 7)]);
    }

    #[test]
    fn test_candidates_are_version_ordered() {
        let candidates = library_candidates(Some(RequestedVersion::new(3, None)));
        assert!(!candidates.is_empty());
        let first = candidates.first().unwrap().to_string_lossy().into_owned();
        assert!(first.contains("3.13"), "newest version first: {first}");
    }
}
