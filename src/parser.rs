//! Address parsing functionality.

use crate::batch::{process_batch, ComponentList, InputBatch, ListBatch, RowResponse, Transform};
use crate::error::Result;
use crate::ffi::{self, ParserResponse};

/// Splits addresses into labelled components with libpostal.
///
/// This is the transformer behind `postal_parse`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressParser;

impl AddressParser {
    /// Create a new parser with libpostal's default options.
    pub fn new() -> Self {
        Self
    }

    /// Parse an address string into labelled components.
    ///
    /// # Errors
    ///
    /// Returns an error if libpostal is not initialized or rejects the input.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use duckdb_postal::AddressParser;
    ///
    /// let components = AddressParser::new().parse("123 Main St, Springfield")?;
    /// for component in components {
    ///     println!("{}: {}", component.label, component.value);
    /// }
    /// # Ok::<(), duckdb_postal::Error>(())
    /// ```
    pub fn parse(&self, address: &str) -> Result<Vec<AddressComponent>> {
        let response = self.transform(address)?;
        Ok((0..response.len())
            .map(|index| AddressComponent {
                label: response.label(index).into_owned(),
                value: response.value(index).into_owned(),
            })
            .collect())
    }

    /// Parse multiple addresses into one list column of `(label, value)` pairs.
    ///
    /// # Errors
    ///
    /// Fails on the first address libpostal rejects; no rows are returned.
    pub fn parse_batch(&self, addresses: &[&str]) -> Result<ListBatch<(String, String)>> {
        let values: Vec<Option<&str>> = addresses.iter().copied().map(Some).collect();
        let mut output = ListBatch::with_rows(values.len());
        process_batch(&InputBatch::flat(&values), self, &mut output)?;
        Ok(output)
    }
}

impl Transform for AddressParser {
    type Response = ParserResponse;

    fn transform(&self, input: &str) -> Result<ParserResponse> {
        ffi::parse_address(input)
    }
}

/// Address component from libpostal parsing.
///
/// # Examples of common labels:
///
/// - `"house_number"` - Street number (e.g., "123")
/// - `"road"` - Street name (e.g., "main st")
/// - `"city"` - City name (e.g., "springfield")
/// - `"postcode"` - Postal/ZIP code (e.g., "10001")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressComponent {
    /// Component label indicating the semantic meaning of this address part.
    pub label: String,
    /// The text classified with `label`, as normalized by libpostal.
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ffi::initialize;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    #[test]
    fn test_nul_byte_rejected() {
        assert_matches!(
            AddressParser::new().parse("123 Main\0St"),
            Err(Error::FfiError { .. })
        );
    }

    #[test]
    fn test_parse_example_address() {
        if let Err(e) = initialize() {
            // Needs libpostal data files
            println!("Skipping, libpostal unavailable: {e}");
            return;
        }

        let components = AddressParser::new()
            .parse("123 Main St, Springfield")
            .expect("Failed to parse address");
        let by_label: HashMap<_, _> = components
            .iter()
            .map(|c| (c.label.as_str(), c.value.as_str()))
            .collect();

        assert_eq!(by_label.get("house_number"), Some(&"123"));
        assert_eq!(by_label.get("road"), Some(&"main st"));
        assert_eq!(by_label.get("city"), Some(&"springfield"));
    }

    #[test]
    fn test_parse_batch_repeated_address() {
        if let Err(e) = initialize() {
            println!("Skipping, libpostal unavailable: {e}");
            return;
        }

        let address = "123 Main St, Springfield";
        let batch = AddressParser::new()
            .parse_batch(&[address, address])
            .expect("Failed to parse batch");

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.row(0), batch.row(1));
        assert!(batch.row(0).is_some_and(|row| {
            row.contains(&("house_number".to_string(), "123".to_string()))
        }));
        assert_eq!(batch.entries()[1].offset, batch.entries()[0].length);
    }

    #[test]
    fn test_parse_batch_empty() {
        // No row reaches libpostal, so this holds without data files.
        let batch = AddressParser::new().parse_batch(&[]).unwrap();
        assert!(batch.is_empty());
        assert!(batch.items().is_empty());
    }
}
