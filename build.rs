//! Build script for duckdb-postal
//!
//! Links libpostal into the extension, either from a system install
//! (`LIBPOSTAL_SYSTEM`) or by building a pinned release from source, and
//! generates the FFI bindings with bindgen.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const LIBPOSTAL_VERSION: &str = "1.1";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=LIBPOSTAL_SYSTEM");
    println!("cargo:rerun-if-env-changed=LIBPOSTAL_SKIP_BUILD");
    println!("cargo:rerun-if-env-changed=LIBPOSTAL_DATA_DOWNLOAD");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));

    // docs.rs has no network and no autotools
    if env::var("LIBPOSTAL_SKIP_BUILD").is_ok() || env::var("DOCS_RS").is_ok() {
        println!("cargo:warning=Skipping libpostal build, generating stub bindings");
        write_stub_bindings(&out_dir);
        return;
    }

    if try_system_libpostal() {
        println!("cargo:warning=Using system libpostal");
        generate_bindings(&out_dir, None);
        return;
    }

    check_build_tools();

    let source_dir = download_libpostal(&out_dir);
    let install_dir = build_libpostal(&source_dir, &out_dir);

    link_static(&install_dir);
    generate_bindings(&out_dir, Some(&install_dir.join("include")));
}

/// Bindings with the same shapes as the real header whose setup always fails.
///
/// Everything type-checks, and `initialize` reports an error at runtime.
fn write_stub_bindings(out_dir: &Path) {
    let stub = r#"
use std::os::raw::c_char;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct libpostal_address_parser_options_t {
    pub language: *mut c_char,
    pub country: *mut c_char,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct libpostal_address_parser_response_t {
    pub num_components: usize,
    pub components: *mut *mut c_char,
    pub labels: *mut *mut c_char,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct libpostal_normalize_options_t {
    pub languages: *mut *mut c_char,
    pub num_languages: usize,
    pub address_components: u16,
}

pub unsafe fn libpostal_setup() -> bool { false }
pub unsafe fn libpostal_setup_datadir(_datadir: *mut c_char) -> bool { false }
pub unsafe fn libpostal_setup_parser() -> bool { false }
pub unsafe fn libpostal_setup_parser_datadir(_datadir: *mut c_char) -> bool { false }
pub unsafe fn libpostal_setup_language_classifier() -> bool { false }
pub unsafe fn libpostal_setup_language_classifier_datadir(_datadir: *mut c_char) -> bool { false }
pub unsafe fn libpostal_teardown() {}
pub unsafe fn libpostal_teardown_parser() {}
pub unsafe fn libpostal_teardown_language_classifier() {}

pub unsafe fn libpostal_get_address_parser_default_options() -> libpostal_address_parser_options_t {
    libpostal_address_parser_options_t {
        language: std::ptr::null_mut(),
        country: std::ptr::null_mut(),
    }
}

pub unsafe fn libpostal_get_default_options() -> libpostal_normalize_options_t {
    libpostal_normalize_options_t {
        languages: std::ptr::null_mut(),
        num_languages: 0,
        address_components: 0,
    }
}

pub unsafe fn libpostal_parse_address(
    _address: *mut c_char,
    _options: libpostal_address_parser_options_t,
) -> *mut libpostal_address_parser_response_t {
    std::ptr::null_mut()
}

pub unsafe fn libpostal_expand_address(
    _input: *mut c_char,
    _options: libpostal_normalize_options_t,
    _n: *mut usize,
) -> *mut *mut c_char {
    std::ptr::null_mut()
}

pub unsafe fn libpostal_address_parser_response_destroy(_response: *mut libpostal_address_parser_response_t) {}
pub unsafe fn libpostal_expansion_array_destroy(_expansions: *mut *mut c_char, _n: usize) {}
"#;

    fs::write(out_dir.join("bindings.rs"), stub).expect("Failed to write stub bindings");
}

fn check_build_tools() {
    for tool in ["gcc", "make", "autoconf", "automake", "libtool"] {
        if Command::new(tool).arg("--version").output().is_err() {
            panic!(
                "Required build tool '{tool}' not found.\n\
                 On Ubuntu/Debian: sudo apt-get install build-essential autoconf automake libtool pkg-config\n\
                 On macOS: brew install autoconf automake libtool pkg-config\n\
                 Or install libpostal and set LIBPOSTAL_SYSTEM=1"
            );
        }
    }
}

/// Link a system libpostal found by pkg-config, only when `LIBPOSTAL_SYSTEM` is set.
fn try_system_libpostal() -> bool {
    if env::var("LIBPOSTAL_SYSTEM").is_err() {
        return false;
    }
    match pkg_config::probe_library("libpostal") {
        Ok(library) => {
            for path in &library.link_paths {
                println!("cargo:rustc-link-search=native={}", path.display());
            }
            for lib in &library.libs {
                println!("cargo:rustc-link-lib={lib}");
            }
            true
        }
        Err(err) => {
            println!("cargo:warning=LIBPOSTAL_SYSTEM set but pkg-config failed: {err}");
            false
        }
    }
}

fn download_libpostal(out_dir: &Path) -> PathBuf {
    let source_dir = out_dir.join(format!("libpostal-{LIBPOSTAL_VERSION}"));
    if source_dir.exists() {
        return source_dir;
    }

    let url = format!(
        "https://github.com/openvenues/libpostal/archive/refs/tags/v{LIBPOSTAL_VERSION}.tar.gz"
    );
    println!("cargo:warning=Downloading libpostal v{LIBPOSTAL_VERSION}");

    let response = reqwest::blocking::get(&url).expect("Failed to download libpostal");
    if !response.status().is_success() {
        panic!("Failed to download libpostal: HTTP {}", response.status());
    }
    let content = response.bytes().expect("Failed to read libpostal tarball");

    // gzip magic
    if content.len() < 2 || content[0] != 0x1f || content[1] != 0x8b {
        panic!(
            "Downloaded libpostal tarball is not gzip ({} bytes)",
            content.len()
        );
    }

    let archive = flate2::read::GzDecoder::new(content.as_ref());
    tar::Archive::new(archive)
        .unpack(out_dir)
        .expect("Failed to extract libpostal tarball");

    source_dir
}

/// Build a static libpostal with autotools and install it under `OUT_DIR`.
fn build_libpostal(source_dir: &Path, out_dir: &Path) -> PathBuf {
    let install_dir = out_dir.join("libpostal-install");
    let data_dir = install_dir.join("share").join("libpostal");

    if install_dir.join("lib").join("libpostal.a").exists() {
        export_built_data_dir(&data_dir);
        return install_dir;
    }

    fs::create_dir_all(&install_dir).expect("Failed to create install directory");

    run_command(
        Command::new("bash").arg("bootstrap.sh").current_dir(source_dir),
        "bootstrap.sh",
    );
    patch_libpostal(source_dir).expect("Failed to patch libpostal sources");

    let mut configure = Command::new("./configure");
    configure
        .arg(format!("--prefix={}", install_dir.display()))
        .arg("--enable-static")
        .arg("--disable-shared")
        .arg("--with-pic")
        .current_dir(source_dir);

    // The models are ~2GB, so fetching them at build time is opt-in
    if env::var("LIBPOSTAL_DATA_DOWNLOAD").is_ok() {
        println!("cargo:warning=Downloading libpostal data to {}", data_dir.display());
        configure.arg(format!("--datadir={}", data_dir.display()));
    } else {
        configure.arg("--disable-data-download");
    }

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("apple") {
        configure.env("CC", "clang");
    }
    if target.contains("aarch64") || target.contains("arm") {
        configure.arg("--disable-sse2");
    }

    run_command(&mut configure, "configure");

    let jobs = env::var("NUM_JOBS").unwrap_or_else(|_| "4".to_string());
    run_command(
        Command::new("make").arg(format!("-j{jobs}")).current_dir(source_dir),
        "make",
    );
    run_command(
        Command::new("make").arg("install").current_dir(source_dir),
        "make install",
    );

    export_built_data_dir(&data_dir);
    install_dir
}

/// Let the crate default to data downloaded during the build.
fn export_built_data_dir(data_dir: &Path) {
    let models = data_dir.join("libpostal");
    if models.exists() {
        println!("cargo:rustc-env=LIBPOSTAL_BUILT_DATA_DIR={}", models.display());
    }
}

fn link_static(install_dir: &Path) {
    println!(
        "cargo:rustc-link-search=native={}",
        install_dir.join("lib").display()
    );
    println!("cargo:rustc-link-lib=static=postal");

    if cfg!(target_os = "linux") {
        println!("cargo:rustc-link-lib=pthread");
        println!("cargo:rustc-link-lib=m");
    } else if cfg!(target_os = "macos") {
        println!("cargo:rustc-link-lib=pthread");
    }
}

fn generate_bindings(out_dir: &Path, include_dir: Option<&Path>) {
    let wrapper = out_dir.join("wrapper.h");
    fs::write(&wrapper, "#include <libpostal/libpostal.h>\n").expect("Failed to write wrapper.h");

    let mut builder = bindgen::Builder::default()
        .header(wrapper.to_string_lossy())
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
        .allowlist_function("libpostal_.*")
        .allowlist_type("libpostal_.*")
        .allowlist_var("LIBPOSTAL_.*")
        .derive_default(true)
        .derive_debug(true)
        .derive_copy(true);

    if let Some(include_dir) = include_dir {
        builder = builder.clang_arg(format!("-I{}", include_dir.display()));
    }

    builder
        .generate()
        .expect("Unable to generate libpostal bindings")
        .write_to_file(out_dir.join("bindings.rs"))
        .expect("Failed to write bindings");
}

fn run_command(cmd: &mut Command, name: &str) {
    println!("cargo:warning=Running: {cmd:?}");
    let status = cmd
        .status()
        .unwrap_or_else(|_| panic!("Failed to execute {name}"));
    if !status.success() {
        panic!("{name} failed with exit code: {:?}", status.code());
    }
}

/// Fix pointer casts that newer compilers reject as errors.
fn patch_libpostal(source_dir: &Path) -> std::io::Result<()> {
    let patches = [
        (
            "src/sparse_matrix_utils.c",
            "if (sparse_matrix_add_unique_columns(matrix, unique_columns, ret)) {",
            "if (sparse_matrix_add_unique_columns(matrix, (khash_t(int_uint32) *)unique_columns, ret)) {",
        ),
        (
            "src/libpostal.c",
            "libpostal_language_classifier_response_t *response = classify_languages(address);",
            "libpostal_language_classifier_response_t *response = (libpostal_language_classifier_response_t *)classify_languages(address);",
        ),
    ];

    for (file, from, to) in patches {
        let path = source_dir.join(file);
        if !path.exists() {
            continue;
        }
        let content = fs::read_to_string(&path)?;
        if content.contains(from) {
            fs::write(&path, content.replace(from, to))?;
        }
    }
    Ok(())
}
