//! Chunk naming and on-wire layout arithmetic
//!
//! A chunked upload of `report.pdf` produces objects `report.pdf_chunk0`,
//! `report.pdf_chunk1`, ... — decimal index, no padding. Listing the prefix
//! `report.pdf_` recovers the full set. Note that name-sorted listings do
//! NOT order chunk10 after chunk9; consumers must reconstruct names from
//! indices rather than trust listing order.

use shroud_core::{Error, Result};

use crate::{BLOCK_OVERHEAD, FILE_ID_SIZE};

/// Object name for chunk `index` of a chunked upload.
pub fn chunk_name(filename: &str, index: u64) -> String {
    format!("{filename}_chunk{index}")
}

/// Listing prefix shared by every chunk of `filename`.
pub fn chunk_prefix(filename: &str) -> String {
    format!("{filename}_")
}

/// On-wire size of one sealed block.
pub fn sealed_len(plaintext_len: usize) -> usize {
    plaintext_len + BLOCK_OVERHEAD
}

/// Smallest accepted chunk budget: file id header plus one full sealed
/// block. Budgets below this would force a writer block size the download
/// side has no way of knowing, so they are rejected outright.
pub fn min_chunk_budget(block_size: usize) -> u64 {
    (FILE_ID_SIZE + block_size + BLOCK_OVERHEAD) as u64
}

/// Parse a chunk-size string of the form `<digits><unit>B` where the unit
/// is one of "", "K", "M", "G", "T", "P" with decimal SI multipliers.
///
/// `"1MB"` → 1_000_000, `"512KB"` → 512_000, `"2B"` → 2.
pub fn parse_size(text: &str) -> Result<u64> {
    let invalid =
        || Error::Config(format!("chunk size must be digits + unit, e.g. 1MB: `{text}`"));

    let body = text.strip_suffix('B').ok_or_else(invalid)?;
    let digits_end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let (digits, unit) = body.split_at(digits_end);
    if digits.is_empty() {
        return Err(invalid());
    }

    let number: u64 = digits.parse().map_err(|_| invalid())?;
    let multiplier: u64 = match unit {
        "" => 1,
        "K" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        _ => return Err(invalid()),
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Config(format!("chunk size overflows u64: `{text}`")))
}
