//! DuckDB scalar functions.
//!
//! | Function           | Signature                          |
//! |--------------------|------------------------------------|
//! | `postal_parse`     | `VARCHAR -> MAP(VARCHAR, VARCHAR)` |
//! | `postal_normalize` | `VARCHAR -> VARCHAR[]`             |
//! | `postal_data_dir`  | `VARCHAR -> VARCHAR`               |
//!
//! DuckDB's C API flattens input vectors before calling a scalar function
//! and marks the result constant itself when every input was constant, so
//! the sinks below only ever write the flat list encoding.

use crate::batch::{process_batch, ComponentList, InputBatch, ListEntry, ListOutput, StringList};
use crate::data;
use crate::normalizer::AddressNormalizer;
use crate::parser::AddressParser;
use duckdb::core::{DataChunkHandle, Inserter, ListVector, LogicalTypeHandle, LogicalTypeId};
use duckdb::vscalar::{ScalarFunctionSignature, VScalar};
use duckdb::vtab::arrow::WritableVector;
use duckdb::{Connection, Result};
use duckdb_loadable_macros::duckdb_entrypoint_c_api;
use libduckdb_sys as ffi;
use std::error::Error;
use std::path::PathBuf;

/// Copy a `VARCHAR` column out of `input`, `None` for `NULL` rows.
///
/// # Safety
///
/// `column` must exist in `input` and have type `VARCHAR`.
unsafe fn read_varchar_column(input: &DataChunkHandle, column: usize) -> Vec<Option<String>> {
    let vector = input.flat_vector(column);
    let strings = vector.as_slice_with_len::<ffi::duckdb_string_t>(input.len());

    strings
        .iter()
        .enumerate()
        .map(|(row, raw)| {
            if vector.row_is_null(row as u64) {
                return None;
            }
            // `duckdb_string_t_data` wants a mutable pointer; inline strings point into this copy.
            let mut raw = *raw;
            let len = unsafe { ffi::duckdb_string_t_length(raw) } as usize;
            if len == 0 {
                return Some(String::new());
            }
            let bytes = unsafe {
                let data = ffi::duckdb_string_t_data(&mut raw);
                std::slice::from_raw_parts(data.cast::<u8>(), len)
            };
            Some(String::from_utf8_lossy(bytes).into_owned())
        })
        .collect()
}

/// Item capacity a DuckDB list child must hold for the rows written so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ChildCapacity(usize);

impl ChildCapacity {
    fn reset(&mut self) {
        self.0 = 0;
    }

    /// Never shrinks, `child(capacity)` must keep earlier rows' items.
    fn grow(&mut self, capacity: usize) {
        self.0 = self.0.max(capacity);
    }

    fn get(self) -> usize {
        self.0
    }
}

/// Writes `VARCHAR[]` rows into a DuckDB list vector.
struct StringListSink {
    list: ListVector,
    capacity: ChildCapacity,
}

impl StringListSink {
    fn new(list: ListVector) -> Self {
        Self {
            list,
            capacity: ChildCapacity::default(),
        }
    }
}

impl<R: StringList> ListOutput<R> for StringListSink {
    fn begin(&mut self, _rows: usize) {
        self.capacity.reset();
    }

    fn set_entry(&mut self, row: usize, entry: ListEntry) {
        self.list.set_entry(row, entry.offset, entry.length);
    }

    fn set_null(&mut self, row: usize) {
        self.list.set_null(row);
    }

    fn reserve(&mut self, capacity: usize) {
        self.capacity.grow(capacity);
    }

    fn write_row(&mut self, offset: usize, response: &R) {
        // `child` reserves the requested capacity before handing out the vector.
        let child = self.list.child(self.capacity.get());
        for index in 0..response.len() {
            child.insert(offset + index, response.get(index).as_ref());
        }
    }

    fn finish(&mut self, len: usize, _constant: bool) {
        self.list.set_len(len);
    }
}

/// Writes `MAP(VARCHAR, VARCHAR)` rows into a DuckDB map vector.
///
/// A map is physically a list of `STRUCT(key, value)`.
struct MapSink {
    list: ListVector,
    capacity: ChildCapacity,
}

impl MapSink {
    fn new(list: ListVector) -> Self {
        Self {
            list,
            capacity: ChildCapacity::default(),
        }
    }
}

impl<R: ComponentList> ListOutput<R> for MapSink {
    fn begin(&mut self, _rows: usize) {
        self.capacity.reset();
    }

    fn set_entry(&mut self, row: usize, entry: ListEntry) {
        self.list.set_entry(row, entry.offset, entry.length);
    }

    fn set_null(&mut self, row: usize) {
        self.list.set_null(row);
    }

    fn reserve(&mut self, capacity: usize) {
        self.capacity.grow(capacity);
    }

    fn write_row(&mut self, offset: usize, response: &R) {
        let capacity = self.capacity.get();
        let entries = self.list.struct_child(capacity);
        let keys = entries.child(0, capacity);
        let values = entries.child(1, capacity);
        for index in 0..response.len() {
            keys.insert(offset + index, response.label(index).as_ref());
            values.insert(offset + index, response.value(index).as_ref());
        }
    }

    fn finish(&mut self, len: usize, _constant: bool) {
        self.list.set_len(len);
    }
}

fn varchar() -> LogicalTypeHandle {
    LogicalTypeHandle::from(LogicalTypeId::Varchar)
}

/// `postal_parse(address VARCHAR) -> MAP(VARCHAR, VARCHAR)`
pub struct PostalParse;

impl VScalar for PostalParse {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        let values = unsafe { read_varchar_column(input, 0) };
        let mut sink = MapSink::new(output.list_vector());
        process_batch(&InputBatch::flat(&values), &AddressParser::new(), &mut sink)?;
        Ok(())
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![varchar()],
            LogicalTypeHandle::map(&varchar(), &varchar()),
        )]
    }
}

/// `postal_normalize(address VARCHAR) -> VARCHAR[]`
pub struct PostalNormalize;

impl VScalar for PostalNormalize {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        let values = unsafe { read_varchar_column(input, 0) };
        let mut sink = StringListSink::new(output.list_vector());
        process_batch(
            &InputBatch::flat(&values),
            &AddressNormalizer::new(),
            &mut sink,
        )?;
        Ok(())
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![varchar()],
            LogicalTypeHandle::list(&varchar()),
        )]
    }
}

/// Validate a `postal_data_dir` value and load libpostal from it.
///
/// Returns the resolved absolute directory. Nothing changes on error.
pub fn apply_data_dir(value: &str) -> crate::Result<PathBuf> {
    let dir = data::resolve_from_current_dir(value)?;
    crate::ffi::configure_data_dir(&dir)?;
    Ok(dir)
}

/// Run `apply` for every non-`NULL` row, returning each resolved path.
///
/// Rows usually repeat one value, so `apply` only runs again when the
/// value differs from the previous row's.
fn apply_each<F>(values: &[Option<String>], mut apply: F) -> crate::Result<Vec<Option<String>>>
where
    F: FnMut(&str) -> crate::Result<PathBuf>,
{
    let mut applied: Option<(&str, String)> = None;
    let mut resolved_rows = Vec::with_capacity(values.len());

    for value in values {
        let Some(value) = value.as_deref() else {
            resolved_rows.push(None);
            continue;
        };
        let cached = applied
            .as_ref()
            .filter(|(previous, _)| *previous == value)
            .map(|(_, resolved)| resolved.clone());
        let resolved = match cached {
            Some(resolved) => resolved,
            None => {
                let resolved = apply(value)?.to_string_lossy().into_owned();
                applied = Some((value, resolved.clone()));
                resolved
            }
        };
        resolved_rows.push(Some(resolved));
    }

    Ok(resolved_rows)
}

/// `postal_data_dir(path VARCHAR) -> VARCHAR`
///
/// Applies the `postal_data_dir` setting and returns the resolved path.
pub struct PostalDataDir;

impl VScalar for PostalDataDir {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        let values = unsafe { read_varchar_column(input, 0) };
        let resolved = apply_each(&values, apply_data_dir)?;

        let mut output = output.flat_vector();
        for (row, resolved) in resolved.iter().enumerate() {
            match resolved {
                Some(resolved) => output.insert(row, resolved.as_str()),
                None => output.set_null(row),
            }
        }
        Ok(())
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(vec![varchar()], varchar())]
    }
}

/// Extension entry point, exported as `postal_init_c_api`.
///
/// libpostal itself is set up lazily by the first call that needs it.
#[duckdb_entrypoint_c_api(ext_name = "postal", min_duckdb_version = "v1.2.0")]
pub unsafe fn extension_entrypoint(con: Connection) -> Result<(), Box<dyn Error>> {
    con.register_scalar_function::<PostalParse>("postal_parse")?;
    con.register_scalar_function::<PostalNormalize>("postal_normalize")?;
    con.register_scalar_function::<PostalDataDir>("postal_data_dir")?;

    tracing::debug!("registered postal functions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;

    #[test]
    fn test_apply_empty_data_dir_rejected() {
        assert_matches!(apply_data_dir(""), Err(Error::Configuration { .. }));
    }

    #[test]
    fn test_apply_missing_data_dir_rejected() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("missing");

        let err = apply_data_dir(&missing.to_string_lossy()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("postal_data_dir does not exist: {}", missing.display())
        );
    }

    #[test]
    fn test_apply_directory_without_models_rejected() {
        let root = tempfile::tempdir().unwrap();
        let before = crate::ffi::data_dir();

        let err = apply_data_dir(&root.path().to_string_lossy()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Could not set postal_data_dir: {}", root.path().display())
        );
        assert_eq!(crate::ffi::data_dir(), before);
    }

    #[test]
    fn test_child_capacity_only_grows_within_batch() {
        let mut capacity = ChildCapacity::default();
        capacity.grow(3);
        capacity.grow(7);
        capacity.grow(7);
        assert_eq!(capacity.get(), 7);

        // a smaller request keeps earlier items addressable
        capacity.grow(5);
        assert_eq!(capacity.get(), 7);

        capacity.reset();
        assert_eq!(capacity.get(), 0);
    }

    #[test]
    fn test_apply_each_reuses_previous_row() {
        let mut calls = Vec::new();
        let values = [
            Some("/a".to_string()),
            Some("/a".to_string()),
            None,
            Some("/b".to_string()),
            Some("/a".to_string()),
        ];

        let resolved = apply_each(&values, |value| {
            calls.push(value.to_string());
            Ok(PathBuf::from(format!("/data{value}")))
        })
        .unwrap();

        assert_eq!(calls, ["/a", "/b", "/a"]);
        assert_eq!(
            resolved,
            [
                Some("/data/a".to_string()),
                Some("/data/a".to_string()),
                None,
                Some("/data/b".to_string()),
                Some("/data/a".to_string()),
            ]
        );
    }

    #[test]
    fn test_apply_each_stops_at_first_error() {
        let mut calls = 0;
        let values = [Some(String::new()), Some("/a".to_string())];

        let result = apply_each(&values, |value| {
            calls += 1;
            crate::data::resolve_data_dir(value, std::path::Path::new("/"))
        });

        assert_matches!(result, Err(Error::Configuration { .. }));
        assert_eq!(calls, 1);
    }
}
