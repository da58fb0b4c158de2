//! FFI bindings and safety wrappers around the libpostal C library.
//!
//! # Memory Safety Guarantees
//!
//! * **String Management**: inputs are copied into `CString`s that outlive
//!   the C call. Inputs with interior NUL bytes are rejected before reaching C.
//! * **Resource Cleanup**: every response libpostal allocates is wrapped in a
//!   guard ([`ParserResponse`], [`Expansions`]) that frees it exactly once
//!   in `Drop`, on success and error paths alike.
//! * **Null Pointer Safety**: null responses become errors; null strings
//!   inside a response read as empty.
//! * **UTF-8**: C strings are converted lossily.
//!
//! # Threading Constraints
//!
//! libpostal keeps its models in process globals and its thread safety is
//! not documented. All calls into it go through one process-wide mutex:
//!
//! * **Initialization**: the first caller runs setup while later callers
//!   block on the mutex. The outcome, failure included, is cached and
//!   returned to every later caller without retrying.
//! * **Parsing and expansion**: serialized behind the same mutex.
//! * **Reconfiguration**: [`configure_data_dir`] tears the models down and
//!   reloads them while holding the mutex, so no call observes a half-loaded
//!   library.

#![allow(missing_docs)] // Generated bindings don't have docs

use crate::batch::{ComponentList, RowResponse, StringList};
use crate::data::{self, DataConfig};
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

// Include generated bindings
#[allow(non_upper_case_globals)]
#[allow(non_camel_case_types)]
#[allow(non_snake_case)]
#[allow(dead_code)]
#[allow(missing_docs)]
#[allow(clippy::all)]
mod bindings {
    include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
}

pub use bindings::*;

/// Setup state shared by every caller in the process.
struct Library {
    /// Cached setup outcome; `None` until the first call.
    setup: Option<std::result::Result<(), String>>,
    /// Directory the loaded models came from.
    data_dir: Option<PathBuf>,
}

static LIBRARY: Mutex<Library> = Mutex::new(Library {
    setup: None,
    data_dir: None,
});

fn library() -> MutexGuard<'static, Library> {
    // The state is a plain cache, a panic elsewhere cannot leave it torn.
    LIBRARY.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Library {
    fn ensure_setup(&mut self) -> Result<()> {
        let outcome = match self.setup.clone() {
            Some(outcome) => outcome,
            None => {
                let config = DataConfig::from_env();
                let outcome = setup(config.data_dir());
                match &outcome {
                    Ok(()) => {
                        tracing::info!(data_dir = ?config.data_dir, "libpostal initialized");
                        self.data_dir = config.data_dir;
                    }
                    Err(message) => tracing::warn!("{message}"),
                }
                self.setup = Some(outcome.clone());
                outcome
            }
        };

        outcome.map_err(Error::initialization_failed)
    }
}

/// Run `steps` in order, stopping at the first failure. A failure calls
/// `unload` so no module from a half-finished load stays resident.
fn load_all(steps: &[&dyn Fn() -> bool], unload: &dyn Fn()) -> bool {
    if steps.iter().all(|step| step()) {
        return true;
    }
    unload();
    false
}

/// Load every module from `dir`. Nothing stays loaded on failure.
fn load_from(dir: &CStr) -> bool {
    let dir_ptr = dir.as_ptr().cast_mut();
    load_all(
        &[
            &|| unsafe { libpostal_setup_datadir(dir_ptr) },
            &|| unsafe { libpostal_setup_parser_datadir(dir_ptr) },
            &|| unsafe { libpostal_setup_language_classifier_datadir(dir_ptr) },
        ],
        &teardown,
    )
}

/// Load libpostal's base data, parser and language classifier.
///
/// libpostal skips modules that are already loaded, so callers must
/// [`teardown`] before loading from a different directory.
fn setup(data_dir: Option<&Path>) -> std::result::Result<(), String> {
    let loaded = match data_dir {
        Some(dir) => {
            let c_dir = path_to_cstring(dir).map_err(|err| err.to_string())?;
            load_from(&c_dir)
        }
        None => load_all(
            &[
                &|| unsafe { libpostal_setup() },
                &|| unsafe { libpostal_setup_parser() },
                &|| unsafe { libpostal_setup_language_classifier() },
            ],
            &teardown,
        ),
    };

    if loaded {
        return Ok(());
    }

    let message = match data_dir {
        Some(dir) => {
            let missing = data::missing_files(dir);
            if missing.is_empty() {
                format!("setup failed for data directory {}", dir.display())
            } else {
                format!(
                    "data files not found in {}: {}",
                    dir.display(),
                    missing.join(", ")
                )
            }
        }
        None => format!(
            "setup failed for the default data directory, set {} or postal_data_dir",
            data::DATA_DIR_ENV
        ),
    };
    Err(message)
}

/// Unload everything `setup` may have loaded. Safe on unloaded modules.
fn teardown() {
    unsafe {
        libpostal_teardown();
        libpostal_teardown_parser();
        libpostal_teardown_language_classifier();
    }
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path.to_string_lossy().as_ref())
        .map_err(|_| Error::ffi_error(format!("Invalid path: {}", path.display())))
}

/// Initialize libpostal once per process.
///
/// Concurrent callers block until the first finishes. Later calls return
/// the cached outcome.
///
/// # Errors
///
/// Returns `Error::InitializationFailed` if setup failed, typically because
/// the data files could not be found.
pub fn initialize() -> Result<()> {
    library().ensure_setup()
}

/// Directory the currently loaded models came from, if known.
pub fn data_dir() -> Option<PathBuf> {
    library().data_dir.clone()
}

/// Reload libpostal from `dir`.
///
/// On failure the previously loaded data is restored and stays in effect.
///
/// # Errors
///
/// Returns `Error::Configuration` if libpostal cannot load from `dir`.
pub fn configure_data_dir(dir: &Path) -> Result<()> {
    let c_dir = path_to_cstring(dir)?;
    let mut library = library();

    // Modules left over from any earlier attempt would be kept as they are.
    let was_loaded = matches!(library.setup, Some(Ok(())));
    teardown();

    if !load_from(&c_dir) {
        if was_loaded {
            let restored = setup(library.data_dir.as_deref());
            if let Err(message) = &restored {
                tracing::warn!("could not restore libpostal data: {message}");
            }
            library.setup = Some(restored);
        }
        return Err(Error::configuration(format!(
            "Could not set postal_data_dir: {}",
            dir.display()
        )));
    }

    tracing::info!(data_dir = %dir.display(), "libpostal data directory configured");
    library.setup = Some(Ok(()));
    library.data_dir = Some(dir.to_path_buf());
    Ok(())
}

/// Read a C string, treating null as empty.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn c_str<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        return Cow::Borrowed("");
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
}

/// Parse an address with libpostal's default options.
///
/// # Errors
///
/// Returns `Error::FfiError` for inputs containing NUL, the cached
/// initialization error, or `Error::ParseError` naming the input when
/// libpostal returns no response.
pub fn parse_address(address: &str) -> Result<ParserResponse> {
    let c_address = CString::new(address)
        .map_err(|_| Error::ffi_error(format!("Address contains a NUL byte: {address:?}")))?;

    let mut library = library();
    library.ensure_setup()?;

    let raw = unsafe {
        let options = libpostal_get_address_parser_default_options();
        libpostal_parse_address(c_address.as_ptr().cast_mut(), options)
    };

    NonNull::new(raw)
        .map(|raw| ParserResponse { raw })
        .ok_or_else(|| Error::parse_error(format!("Could not parse address: {address}")))
}

/// Expand an address into its normalized forms with libpostal's default options.
///
/// # Errors
///
/// Returns `Error::FfiError` for inputs containing NUL, the cached
/// initialization error, or `Error::NormalizationError` naming the input
/// when libpostal returns no expansions array.
pub fn expand_address(input: &str) -> Result<Expansions> {
    let c_input = CString::new(input)
        .map_err(|_| Error::ffi_error(format!("Address contains a NUL byte: {input:?}")))?;

    let mut library = library();
    library.ensure_setup()?;

    let mut len: usize = 0;
    let raw = unsafe {
        let options = libpostal_get_default_options();
        libpostal_expand_address(c_input.as_ptr().cast_mut(), options, &mut len)
    };

    NonNull::new(raw)
        .map(|raw| Expansions { raw, len })
        .ok_or_else(|| Error::normalization_error(format!("Could not expand address: {input}")))
}

/// Owned `libpostal_address_parser_response_t`, destroyed on drop.
#[derive(Debug)]
pub struct ParserResponse {
    raw: NonNull<libpostal_address_parser_response_t>,
}

impl ParserResponse {
    fn response(&self) -> &libpostal_address_parser_response_t {
        unsafe { self.raw.as_ref() }
    }
}

impl RowResponse for ParserResponse {
    fn len(&self) -> usize {
        self.response().num_components
    }
}

impl ComponentList for ParserResponse {
    fn label(&self, index: usize) -> Cow<'_, str> {
        assert!(index < self.len(), "component {index} out of bounds");
        unsafe { c_str(*self.response().labels.add(index)) }
    }

    fn value(&self, index: usize) -> Cow<'_, str> {
        assert!(index < self.len(), "component {index} out of bounds");
        unsafe { c_str(*self.response().components.add(index)) }
    }
}

impl Drop for ParserResponse {
    fn drop(&mut self) {
        unsafe { libpostal_address_parser_response_destroy(self.raw.as_ptr()) }
    }
}

/// Owned expansion array from `libpostal_expand_address`, destroyed on drop.
#[derive(Debug)]
pub struct Expansions {
    raw: NonNull<*mut c_char>,
    len: usize,
}

impl RowResponse for Expansions {
    fn len(&self) -> usize {
        self.len
    }
}

impl StringList for Expansions {
    fn get(&self, index: usize) -> Cow<'_, str> {
        assert!(index < self.len, "expansion {index} out of bounds");
        unsafe { c_str(*self.raw.as_ptr().add(index)) }
    }
}

impl Drop for Expansions {
    fn drop(&mut self) {
        unsafe { libpostal_expansion_array_destroy(self.raw.as_ptr(), self.len) }
    }
}
