//! Byte-range placeholder reservation for embedded signatures.
//!
//! A signature container is appended to the document with a `/Contents`
//! placeholder of a fixed, pre-reserved size. The digest covers everything
//! except the placeholder, described by a ByteRange array of four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset where the signature value begins
//! - `offset2` = byte offset where the signature value ends
//! - `length2` = remaining bytes to end of file
//!
//! The signature value is a hex-encoded string within `<` and `>` delimiters.
//! Committing the final signature overwrites the placeholder in place and
//! never changes the document length.

use crate::error::{Error, Result};
use crate::types::HashAlgorithm;

/// Fixed per-blob overhead added when estimating placeholder size for
/// embedded revocation evidence.
pub const BLOB_OVERHEAD: usize = 20;

/// Room for DER scaffolding, signed attributes and algorithm identifiers.
const ENVELOPE_SCAFFOLDING: usize = 1024;

/// Interior width of the /ByteRange slot, patched after assembly.
const BYTERANGE_SLOT_WIDTH: usize = 32;

/// Estimate the placeholder size in bytes for a signature envelope.
///
/// Pure function of the inputs; oversizing is safe (the placeholder is
/// zero-padded), undersizing fails the signing operation at commit time.
pub fn estimate_reserved_size(
    hash: HashAlgorithm,
    key_bits: usize,
    chain_der_len: usize,
    blob_sizes: &[usize],
) -> usize {
    let base = ENVELOPE_SCAFFOLDING + hash.digest_len() + key_bits / 8 + chain_der_len;
    let blobs: usize = blob_sizes.iter().map(|s| s + BLOB_OVERHEAD).sum();
    base + blobs
}

/// Hex-encode with uppercase digits.
pub(crate) fn bytes_to_hex(data: &[u8]) -> String {
    let mut hex = String::with_capacity(data.len() * 2);
    for byte in data {
        hex.push_str(&format!("{:02X}", byte));
    }
    hex
}

/// A reserved signature slot inside a prepared document.
///
/// Produced by [`prepare_document`]; consumed exactly once by
/// [`PlaceholderReservation::commit`].
#[derive(Debug)]
pub struct PlaceholderReservation {
    byte_range: [i64; 4],
    contents_offset: usize,
    reserved_size: usize,
}

impl PlaceholderReservation {
    /// The ByteRange array `[0, before_sig, after_sig_start, after_sig_len]`.
    pub fn byte_range(&self) -> [i64; 4] {
        self.byte_range
    }

    /// Reserved signature size in bytes.
    pub fn reserved_size(&self) -> usize {
        self.reserved_size
    }

    /// Total placeholder width: two hex digits per reserved byte plus brackets.
    pub fn placeholder_len(&self) -> usize {
        self.reserved_size * 2 + 2
    }

    /// Extract the bytes covered by the signature: the two ranges around the
    /// placeholder, concatenated. This is the exact digest input.
    pub fn signed_bytes(&self, doc: &[u8]) -> Result<Vec<u8>> {
        extract_signed_bytes(doc, &self.byte_range)
    }

    /// Overwrite the placeholder with the final DER signature, hex-encoded
    /// and zero-padded to the reserved size.
    ///
    /// Fails with [`Error::PlaceholderOverflow`] before touching the document
    /// when the signature does not fit.
    pub fn commit(self, doc: &mut [u8], signature_der: &[u8]) -> Result<()> {
        if signature_der.len() > self.reserved_size {
            return Err(Error::PlaceholderOverflow {
                needed: signature_der.len(),
                reserved: self.reserved_size,
            });
        }

        let placeholder_len = self.placeholder_len();
        if self.contents_offset + placeholder_len > doc.len() {
            return Err(Error::InvalidByteRange(
                "placeholder extends past end of document".to_string(),
            ));
        }

        let hex = bytes_to_hex(signature_der);
        let mut value = String::with_capacity(placeholder_len);
        value.push('<');
        value.push_str(&hex);
        for _ in hex.len()..self.reserved_size * 2 {
            value.push('0');
        }
        value.push('>');

        doc[self.contents_offset..self.contents_offset + placeholder_len]
            .copy_from_slice(value.as_bytes());
        Ok(())
    }
}

/// Append a signature container to `doc` and reserve the placeholder.
///
/// `fields` holds the container's own entries as newline-terminated lines
/// (`/Type /Sig` and friends); `/ByteRange` and `/Contents` are added here.
/// Returns the reservation describing the placeholder and byte ranges.
pub fn prepare_document(
    doc: &mut Vec<u8>,
    fields: &str,
    reserved_size: usize,
) -> Result<PlaceholderReservation> {
    if reserved_size == 0 {
        return Err(Error::InvalidByteRange("reserved size must be non-zero".to_string()));
    }

    let container_start = doc.len();
    let mut container = String::new();
    container.push_str("\n<<\n");
    container.push_str(fields);
    container.push_str("/ByteRange [");
    container.push_str(&" ".repeat(BYTERANGE_SLOT_WIDTH));
    container.push_str("]\n/Contents <");
    container.push_str(&"0".repeat(reserved_size * 2));
    container.push_str(">\n>>\n");
    doc.extend_from_slice(container.as_bytes());

    let contents_offset = find_contents_offset(doc, container_start).ok_or_else(|| {
        Error::InvalidByteRange("assembled container has no /Contents placeholder".to_string())
    })?;

    let placeholder_len = reserved_size * 2 + 2;
    let byte_range = [
        0,
        contents_offset as i64,
        (contents_offset + placeholder_len) as i64,
        doc.len() as i64 - (contents_offset + placeholder_len) as i64,
    ];
    validate_byte_range(&byte_range, doc.len())?;

    patch_byte_range_slot(doc, container_start, &byte_range)?;

    Ok(PlaceholderReservation {
        byte_range,
        contents_offset,
        reserved_size,
    })
}

/// Format a ByteRange array as a PDF array string.
pub fn format_byte_range(byte_range: &[i64; 4]) -> String {
    format!("[{} {} {} {}]", byte_range[0], byte_range[1], byte_range[2], byte_range[3])
}

/// Extract and concatenate the two signed ranges of a document.
pub fn extract_signed_bytes(doc: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>> {
    // Negative entries from a hostile document would wrap on the cast below
    if let Some(entry) = byte_range.iter().find(|&&v| v < 0) {
        return Err(Error::InvalidByteRange(format!(
            "negative byte range entry {}",
            entry
        )));
    }
    let offset1 = byte_range[0] as usize;
    let length1 = byte_range[1] as usize;
    let offset2 = byte_range[2] as usize;
    let length2 = byte_range[3] as usize;

    if offset1 + length1 > doc.len() {
        return Err(Error::InvalidByteRange(format!(
            "first range exceeds file size: {} + {} > {}",
            offset1,
            length1,
            doc.len()
        )));
    }
    if offset2 + length2 > doc.len() {
        return Err(Error::InvalidByteRange(format!(
            "second range exceeds file size: {} + {} > {}",
            offset2,
            length2,
            doc.len()
        )));
    }

    let mut signed = Vec::with_capacity(length1 + length2);
    signed.extend_from_slice(&doc[offset1..offset1 + length1]);
    signed.extend_from_slice(&doc[offset2..offset2 + length2]);
    Ok(signed)
}

/// Check that a ByteRange covers the entire document except the placeholder.
pub fn validate_byte_range(byte_range: &[i64; 4], file_size: usize) -> Result<()> {
    let offset1 = byte_range[0];
    let length1 = byte_range[1];
    let offset2 = byte_range[2];
    let length2 = byte_range[3];

    if offset1 != 0 {
        return Err(Error::InvalidByteRange(format!("must start at 0, got {}", offset1)));
    }

    let expected_end = file_size as i64;
    let actual_end = offset2 + length2;
    if actual_end != expected_end {
        return Err(Error::InvalidByteRange(format!(
            "must end at file size {}, got {}",
            expected_end, actual_end
        )));
    }

    if length1 > offset2 {
        return Err(Error::InvalidByteRange(format!(
            "first range ({}) overlaps with second range start ({})",
            length1, offset2
        )));
    }

    Ok(())
}

/// Find the /Contents value position in a signature container.
///
/// Searches for the pattern `/Contents <` and returns the offset of the
/// opening angle bracket.
pub fn find_contents_offset(doc: &[u8], container_offset: usize) -> Option<usize> {
    let search_start = container_offset;
    let search_end = (container_offset + 4096).min(doc.len());
    let search_window = &doc[search_start..search_end];

    let contents_pattern = b"/Contents";
    let mut pos = 0;
    while pos + contents_pattern.len() < search_window.len() {
        if search_window[pos..].starts_with(contents_pattern) {
            let after_contents = pos + contents_pattern.len();
            for i in after_contents..search_window.len() {
                let byte = search_window[i];
                if byte == b'<' {
                    return Some(search_start + i);
                }
                // Skip whitespace
                if !matches!(byte, b' ' | b'\t' | b'\n' | b'\r') {
                    break;
                }
            }
        }
        pos += 1;
    }

    None
}

/// Write the real ByteRange into the fixed-width slot, space-padded.
fn patch_byte_range_slot(doc: &mut [u8], container_offset: usize, byte_range: &[i64; 4]) -> Result<()> {
    let pattern = b"/ByteRange [";
    let search_end = (container_offset + 4096).min(doc.len());
    let window = &doc[container_offset..search_end];
    let pos = window
        .windows(pattern.len())
        .position(|w| w == pattern)
        .ok_or_else(|| Error::InvalidByteRange("container has no /ByteRange slot".to_string()))?;

    let text = format!(
        "{} {} {} {}",
        byte_range[0], byte_range[1], byte_range[2], byte_range[3]
    );
    if text.len() > BYTERANGE_SLOT_WIDTH {
        return Err(Error::InvalidByteRange(format!(
            "byte range text '{}' exceeds slot width {}",
            text, BYTERANGE_SLOT_WIDTH
        )));
    }

    let slot_start = container_offset + pos + pattern.len();
    let mut padded = text.into_bytes();
    padded.resize(BYTERANGE_SLOT_WIDTH, b' ');
    doc[slot_start..slot_start + BYTERANGE_SLOT_WIDTH].copy_from_slice(&padded);
    Ok(())
}
