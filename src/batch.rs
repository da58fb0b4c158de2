//! Row-batch marshaling of variable-length outputs.
//!
//! DuckDB hands scalar functions a batch of rows and expects list-typed
//! results in columnar form: one `{offset, length}` entry per row pointing
//! into a single backing array shared by the whole batch. This module turns
//! a per-row text transformation (libpostal parse or expand) into that
//! encoding.
//!
//! The marshaler is independent of both DuckDB and libpostal:
//!
//! * [`InputBatch`] resolves logical rows to physical strings. Flat,
//!   constant and dictionary-style (indexed) inputs are supported.
//! * [`Transform`] produces one [`RowResponse`] per row. A response owns the
//!   external library's buffers and releases them when dropped.
//! * [`ListOutput`] receives entries and items. [`ListBatch`] is the
//!   in-memory implementation; the DuckDB sinks live in `extension`.
//!
//! # Example
//!
//! ```rust
//! use std::borrow::Cow;
//! use duckdb_postal::batch::{process_batch, InputBatch, ListBatch, RowResponse, StringList, Transform};
//!
//! struct Words(Vec<String>);
//!
//! impl RowResponse for Words {
//!     fn len(&self) -> usize {
//!         self.0.len()
//!     }
//! }
//!
//! impl StringList for Words {
//!     fn get(&self, index: usize) -> Cow<'_, str> {
//!         Cow::Borrowed(&self.0[index])
//!     }
//! }
//!
//! struct SplitWords;
//!
//! impl Transform for SplitWords {
//!     type Response = Words;
//!
//!     fn transform(&self, input: &str) -> duckdb_postal::Result<Words> {
//!         Ok(Words(input.split_whitespace().map(str::to_owned).collect()))
//!     }
//! }
//!
//! let values = [Some("main st"), None, Some("oak")];
//! let mut output = ListBatch::<String>::new();
//! process_batch(&InputBatch::flat(&values), &SplitWords, &mut output)?;
//!
//! assert_eq!(output.row(0), Some(&["main".to_string(), "st".to_string()][..]));
//! assert_eq!(output.row(1), None);
//! assert_eq!(output.items().len(), 3);
//! # Ok::<(), duckdb_postal::Error>(())
//! ```

use crate::error::Result;
use std::borrow::Cow;

/// Mapping from logical rows to physical value slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection<'a> {
    /// Row `i` reads slot `i`.
    Flat,
    /// Every row reads slot `0`.
    Constant,
    /// Row `i` reads slot `indices[i]`.
    Indexed(&'a [usize]),
}

/// A batch of nullable input strings.
#[derive(Debug, Clone, Copy)]
pub struct InputBatch<'a, S> {
    values: &'a [Option<S>],
    selection: Selection<'a>,
    len: usize,
}

impl<'a, S: AsRef<str>> InputBatch<'a, S> {
    /// One physical value per row.
    pub fn flat(values: &'a [Option<S>]) -> Self {
        Self {
            values,
            selection: Selection::Flat,
            len: values.len(),
        }
    }

    /// A single physical value repeated for `len` rows.
    pub fn constant(value: &'a Option<S>, len: usize) -> Self {
        Self {
            values: std::slice::from_ref(value),
            selection: Selection::Constant,
            len,
        }
    }

    /// Rows resolved through a selection vector.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of bounds for `values`.
    pub fn indexed(values: &'a [Option<S>], indices: &'a [usize]) -> Self {
        assert!(
            indices.iter().all(|&index| index < values.len()),
            "selection index out of bounds for {} values",
            values.len()
        );
        Self {
            values,
            selection: Selection::Indexed(indices),
            len: indices.len(),
        }
    }

    /// Number of logical rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resolve a logical row to its string, `None` for SQL `NULL`.
    pub fn get(&self, row: usize) -> Option<&'a str> {
        debug_assert!(row < self.len, "row {row} out of bounds for {}", self.len);
        let slot = match self.selection {
            Selection::Flat => row,
            Selection::Constant => 0,
            Selection::Indexed(indices) => indices[row],
        };
        let values: &'a [Option<S>] = self.values;
        values[slot].as_ref().map(|value| value.as_ref())
    }

    /// Whether every logical row resolves to the same physical slot.
    pub fn is_constant(&self) -> bool {
        if self.len == 0 {
            return false;
        }
        match self.selection {
            Selection::Constant => true,
            Selection::Flat => self.len == 1,
            Selection::Indexed(indices) => indices.windows(2).all(|pair| pair[0] == pair[1]),
        }
    }
}

/// Position of one row's items inside the backing array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListEntry {
    /// Index of the row's first item
    pub offset: usize,
    /// Number of items in the row
    pub length: usize,
}

impl ListEntry {
    /// Create a new entry.
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// One past the row's last item.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// One row's result from the external transformer.
///
/// Implementations that wrap foreign buffers release them in `Drop`.
pub trait RowResponse {
    /// Number of items produced for the row.
    fn len(&self) -> usize;

    /// Whether the row produced no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A row result made of labelled components (`postal_parse`).
pub trait ComponentList: RowResponse {
    /// Label of the component at `index`, e.g. `house_number`.
    fn label(&self, index: usize) -> Cow<'_, str>;

    /// Text of the component at `index`.
    fn value(&self, index: usize) -> Cow<'_, str>;
}

/// A row result made of plain strings (`postal_normalize`).
pub trait StringList: RowResponse {
    /// The string at `index`.
    fn get(&self, index: usize) -> Cow<'_, str>;
}

/// A per-row text transformation.
pub trait Transform {
    /// Result of transforming one row.
    type Response: RowResponse;

    /// Transform one input string.
    ///
    /// # Errors
    ///
    /// Returns an error naming `input` when the transformer rejects it.
    fn transform(&self, input: &str) -> Result<Self::Response>;
}

/// Destination of a marshaled batch.
pub trait ListOutput<R: RowResponse> {
    /// Start a batch of `rows` rows, discarding anything a previous batch
    /// left behind.
    fn begin(&mut self, rows: usize);

    /// Record the list entry for `row`.
    fn set_entry(&mut self, row: usize, entry: ListEntry);

    /// Mark `row` as `NULL`.
    fn set_null(&mut self, row: usize);

    /// Grow backing storage to hold at least `capacity` items, keeping
    /// items already written.
    fn reserve(&mut self, capacity: usize);

    /// Copy every item of `response` into backing storage starting at `offset`.
    fn write_row(&mut self, offset: usize, response: &R);

    /// Seal the batch with `len` backing items.
    fn finish(&mut self, len: usize, constant: bool);
}

/// Counters for one processed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Logical rows processed
    pub rows: usize,
    /// Rows that were `NULL`
    pub nulls: usize,
    /// Items written to backing storage
    pub items: usize,
    /// Whether the output was marked constant
    pub constant: bool,
}

/// Marshal `input` through `transform` into `output`.
///
/// Rows are processed in order. Each row's entry starts at the running item
/// total, so entries partition the backing array exactly. `NULL` rows get an
/// empty entry and a null mark without calling the transformer.
///
/// # Errors
///
/// The first transformer failure aborts the batch and is returned as is.
/// `output` is left unfinished and must be discarded.
pub fn process_batch<S, T, O>(
    input: &InputBatch<'_, S>,
    transform: &T,
    output: &mut O,
) -> Result<BatchSummary>
where
    S: AsRef<str>,
    T: Transform + ?Sized,
    O: ListOutput<T::Response> + ?Sized,
{
    let mut running_total = 0;
    let mut nulls = 0;

    output.begin(input.len());
    for row in 0..input.len() {
        let Some(text) = input.get(row) else {
            output.set_entry(row, ListEntry::new(running_total, 0));
            output.set_null(row);
            nulls += 1;
            continue;
        };

        let response = transform.transform(text)?;
        let entry = ListEntry::new(running_total, response.len());

        output.set_entry(row, entry);
        output.reserve(entry.end());
        output.write_row(entry.offset, &response);

        running_total = entry.end();
    }

    let constant = input.is_constant();
    output.finish(running_total, constant);

    tracing::trace!(
        rows = input.len(),
        nulls,
        items = running_total,
        constant,
        "marshaled batch"
    );

    Ok(BatchSummary {
        rows: input.len(),
        nulls,
        items: running_total,
        constant,
    })
}

/// In-memory list column.
#[derive(Debug, Clone, PartialEq)]
pub struct ListBatch<T> {
    entries: Vec<ListEntry>,
    validity: Vec<bool>,
    items: Vec<T>,
    constant: bool,
}

impl<T> ListBatch<T> {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::with_rows(0)
    }

    /// Create an empty batch with room for `rows` entries.
    pub fn with_rows(rows: usize) -> Self {
        Self {
            entries: Vec::with_capacity(rows),
            validity: Vec::with_capacity(rows),
            items: Vec::new(),
            constant: false,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-row list entries.
    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    /// The shared backing array.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Whether every row represents the same value.
    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// Items of `row`, `None` when the row is `NULL` or out of range.
    pub fn row(&self, row: usize) -> Option<&[T]> {
        let entry = self.entries.get(row)?;
        if !self.validity[row] {
            return None;
        }
        Some(&self.items[entry.offset..entry.end()])
    }

    /// Iterate over all rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Option<&[T]>> + '_ {
        (0..self.len()).map(move |row| self.row(row))
    }

    fn clear(&mut self, rows: usize) {
        self.entries.clear();
        self.validity.clear();
        self.items.clear();
        self.entries.reserve(rows);
        self.validity.reserve(rows);
        self.constant = false;
    }

    fn put_entry(&mut self, row: usize, entry: ListEntry) {
        if self.entries.len() <= row {
            self.entries.resize(row + 1, ListEntry::default());
            self.validity.resize(row + 1, true);
        }
        self.entries[row] = entry;
    }

    fn put_null(&mut self, row: usize) {
        if let Some(valid) = self.validity.get_mut(row) {
            *valid = false;
        }
    }

    fn grow(&mut self, capacity: usize) {
        self.items.reserve(capacity.saturating_sub(self.items.len()));
    }

    /// Drop items past `offset` so the next row lands exactly there.
    fn rewind(&mut self, offset: usize) {
        debug_assert!(offset <= self.items.len(), "offset {offset} past written items");
        self.items.truncate(offset);
    }

    fn seal(&mut self, len: usize, constant: bool) {
        debug_assert_eq!(self.items.len(), len);
        self.items.truncate(len);
        self.constant = constant;
    }
}

impl<T> Default for ListBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: StringList> ListOutput<R> for ListBatch<String> {
    fn begin(&mut self, rows: usize) {
        self.clear(rows);
    }

    fn set_entry(&mut self, row: usize, entry: ListEntry) {
        self.put_entry(row, entry);
    }

    fn set_null(&mut self, row: usize) {
        self.put_null(row);
    }

    fn reserve(&mut self, capacity: usize) {
        self.grow(capacity);
    }

    fn write_row(&mut self, offset: usize, response: &R) {
        self.rewind(offset);
        self.items
            .extend((0..response.len()).map(|index| response.get(index).into_owned()));
    }

    fn finish(&mut self, len: usize, constant: bool) {
        self.seal(len, constant);
    }
}

impl<R: ComponentList> ListOutput<R> for ListBatch<(String, String)> {
    fn begin(&mut self, rows: usize) {
        self.clear(rows);
    }

    fn set_entry(&mut self, row: usize, entry: ListEntry) {
        self.put_entry(row, entry);
    }

    fn set_null(&mut self, row: usize) {
        self.put_null(row);
    }

    fn reserve(&mut self, capacity: usize) {
        self.grow(capacity);
    }

    fn write_row(&mut self, offset: usize, response: &R) {
        self.rewind(offset);
        self.items.extend((0..response.len()).map(|index| {
            (
                response.label(index).into_owned(),
                response.value(index).into_owned(),
            )
        }));
    }

    fn finish(&mut self, len: usize, constant: bool) {
        self.seal(len, constant);
    }
}
