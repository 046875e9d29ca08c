//! Delimited export reading and cleaning.
//!
//! Provider exports arrive as loosely formatted CSV: banner lines above the
//! header, blank separator rows, trailing summary rows with fewer columns and
//! stray quotes. [`TableReader`] turns such text into rows of a uniform
//! width, and [`deserialize_rows`] maps the cleaned table onto a typed
//! per-provider record using its header row.

use std::io;

use billing_core::error::{BillingError, CleaningPhase, Result};
use billing_core::models::Provider;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

// ── TableWidth ────────────────────────────────────────────────────────────────

/// Accepted row widths of an export, `min..=max` cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableWidth {
    max: usize,
    min: usize,
}

impl TableWidth {
    /// `min` defaults to `max`. Fails when `max` is zero or `min > max`.
    pub fn new(max: usize, min: Option<usize>) -> Result<Self> {
        if max == 0 {
            return Err(BillingError::Config(
                "maximum row width must be a positive integer".to_string(),
            ));
        }
        let min = min.unwrap_or(max);
        if min > max {
            return Err(BillingError::Config(format!(
                "minimum row width {min} exceeds maximum row width {max}"
            )));
        }
        Ok(Self { max, min })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn min(&self) -> usize {
        self.min
    }

    /// Whether a row of `len` cells is kept unchanged.
    pub fn accepts(&self, len: usize) -> bool {
        (self.min..=self.max).contains(&len)
    }
}

// ── RowSource ─────────────────────────────────────────────────────────────────

/// Anything that yields raw rows one at a time.
pub trait RowSource {
    /// Next row, `Ok(None)` once the source is exhausted.
    fn next_row(&mut self) -> Result<Option<Vec<String>>>;
}

impl<R: io::Read> RowSource for csv::Reader<R> {
    fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        let mut record = csv::ByteRecord::new();
        if !self.read_byte_record(&mut record)? {
            return Ok(None);
        }
        // Exports are not guaranteed to be valid UTF-8.
        let row = record
            .iter()
            .map(|cell| String::from_utf8_lossy(cell).into_owned())
            .collect();
        Ok(Some(row))
    }
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        (**self).next_row()
    }
}

/// CSV reader configured for messy exports: no header handling and no fixed
/// field count.
pub fn csv_source<R: io::Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input)
}

// ── TableReader ───────────────────────────────────────────────────────────────

/// Wraps a [`RowSource`] and enforces a [`TableWidth`].
pub struct TableReader<S> {
    source: S,
    width: TableWidth,
}

impl<'a> TableReader<csv::Reader<&'a [u8]>> {
    /// Reader over an in-memory export.
    pub fn from_bytes(bytes: &'a [u8], width: TableWidth) -> Self {
        Self::new(csv_source(bytes), width)
    }
}

impl<S: RowSource> TableReader<S> {
    pub fn new(source: S, width: TableWidth) -> Self {
        Self { source, width }
    }

    /// Next row that is non-empty and within the width bounds.
    ///
    /// Rows outside the bounds are skipped, not truncated. Source errors are
    /// returned as-is.
    pub fn read(&mut self) -> Result<Option<Vec<String>>> {
        while let Some(row) = self.source.next_row()? {
            if is_filled_row(&row) && self.width.accepts(row.len()) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    /// Read the whole source and clean it.
    ///
    /// Empty rows are dropped, then rows shorter than the minimum width are
    /// dropped and rows longer than the maximum are truncated. Fails with
    /// [`BillingError::CleaningExhausted`] naming the phase that left nothing.
    pub fn read_all(mut self) -> Result<Vec<Vec<String>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.source.next_row()? {
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(BillingError::CleaningExhausted {
                phase: CleaningPhase::Read,
            });
        }
        let read = rows.len();

        rows.retain(|row| is_filled_row(row));
        if rows.is_empty() {
            return Err(BillingError::CleaningExhausted {
                phase: CleaningPhase::EmptyRows,
            });
        }
        let filled = rows.len();

        let rows = remove_short_and_truncate_long(rows, self.width);
        if rows.is_empty() {
            return Err(BillingError::CleaningExhausted {
                phase: CleaningPhase::ShortRows,
            });
        }

        debug!(
            read,
            empty = read - filled,
            short = filled - rows.len(),
            kept = rows.len(),
            "cleaned export rows"
        );
        Ok(rows)
    }
}

fn is_filled_row(row: &[String]) -> bool {
    row.iter().any(|cell| !cell.trim().is_empty())
}

fn remove_short_and_truncate_long(rows: Vec<Vec<String>>, width: TableWidth) -> Vec<Vec<String>> {
    rows.into_iter()
        .filter(|row| row.len() >= width.min())
        .map(|mut row| {
            row.truncate(width.max());
            row
        })
        .collect()
}

// ── Typed rows ────────────────────────────────────────────────────────────────

/// Deserialize a cleaned table into typed records.
///
/// The first row is the header. Header cells are trimmed and a leading byte
/// order mark is removed. Rows that fail to deserialize are skipped with a
/// warning; [`BillingError::NoValidRows`] is returned when none succeed.
pub fn deserialize_rows<T: DeserializeOwned>(
    provider: Provider,
    rows: Vec<Vec<String>>,
) -> Result<Vec<T>> {
    let mut rows = rows.into_iter();
    let header = match rows.next() {
        Some(header) => header,
        None => return Err(BillingError::NoValidRows { provider }),
    };
    let header: csv::StringRecord = header
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let cell = if i == 0 {
                cell.trim_start_matches('\u{feff}')
            } else {
                cell.as_str()
            };
            cell.trim().to_string()
        })
        .collect();

    let mut records = Vec::new();
    for (index, row) in rows.enumerate() {
        let record = csv::StringRecord::from(row);
        match record.deserialize::<T>(Some(&header)) {
            Ok(parsed) => records.push(parsed),
            Err(e) => {
                // +2: one for the header, one for 1-based numbering.
                warn!(%provider, row = index + 2, error = %e, "skipping unparsable export row");
            }
        }
    }

    if records.is_empty() {
        return Err(BillingError::NoValidRows { provider });
    }
    Ok(records)
}
