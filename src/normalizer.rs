//! Address normalization functionality.

use crate::batch::{process_batch, InputBatch, ListBatch, RowResponse, StringList, Transform};
use crate::error::Result;
use crate::ffi::{self, Expansions};

/// Expands addresses into their normalized variants with libpostal.
///
/// This is the transformer behind `postal_normalize`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressNormalizer;

impl AddressNormalizer {
    /// Create a new normalizer with libpostal's default options.
    pub fn new() -> Self {
        Self
    }

    /// Normalize an address string.
    ///
    /// libpostal may return several variants, e.g. "St" expands to both
    /// "street" and "saint".
    ///
    /// # Errors
    ///
    /// Returns an error if libpostal is not initialized or rejects the input.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use duckdb_postal::AddressNormalizer;
    ///
    /// let expansions = AddressNormalizer::new().normalize("Thirty-Fourth St")?;
    /// println!("Expansions: {:?}", expansions);
    /// # Ok::<(), duckdb_postal::Error>(())
    /// ```
    pub fn normalize(&self, input: &str) -> Result<Vec<String>> {
        let expansions = self.transform(input)?;
        Ok((0..expansions.len())
            .map(|index| expansions.get(index).into_owned())
            .collect())
    }

    /// Normalize multiple address strings into one list column.
    ///
    /// # Errors
    ///
    /// Fails on the first input libpostal rejects; no rows are returned.
    pub fn normalize_batch(&self, inputs: &[&str]) -> Result<ListBatch<String>> {
        let values: Vec<Option<&str>> = inputs.iter().copied().map(Some).collect();
        let mut output = ListBatch::with_rows(values.len());
        process_batch(&InputBatch::flat(&values), self, &mut output)?;
        Ok(output)
    }
}

impl Transform for AddressNormalizer {
    type Response = Expansions;

    fn transform(&self, input: &str) -> Result<Expansions> {
        ffi::expand_address(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ffi::initialize;
    use assert_matches::assert_matches;

    #[test]
    fn test_nul_byte_rejected() {
        assert_matches!(
            AddressNormalizer::new().normalize("Main\0St"),
            Err(Error::FfiError { .. })
        );
    }

    #[test]
    fn test_canonical_form_is_among_expansions() {
        if let Err(e) = initialize() {
            // Needs libpostal data files
            println!("Skipping, libpostal unavailable: {e}");
            return;
        }

        let expansions = AddressNormalizer::new()
            .normalize("123 main street")
            .expect("Failed to normalize");
        assert!(
            expansions.iter().any(|e| e == "123 main street"),
            "expansions: {expansions:?}"
        );
    }

    #[test]
    fn test_abbreviation_expands() {
        if let Err(e) = initialize() {
            println!("Skipping, libpostal unavailable: {e}");
            return;
        }

        let expansions = AddressNormalizer::new()
            .transform("123 Main St")
            .expect("Failed to normalize");
        assert!(!expansions.is_empty());
    }

    #[test]
    fn test_normalize_batch_offsets() {
        if let Err(e) = initialize() {
            println!("Skipping, libpostal unavailable: {e}");
            return;
        }

        let batch = AddressNormalizer::new()
            .normalize_batch(&["123 main street", "Quatre-vingt-douze Ave des Champs-Élysées"])
            .expect("Failed to normalize batch");

        let first = batch.entries()[0];
        let second = batch.entries()[1];
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, first.end());
        assert_eq!(batch.items().len(), second.end());
    }
}
