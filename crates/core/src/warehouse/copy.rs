//! Bulk loading of CSV files with `COPY ... FROM STDIN`
//!
//! Files are streamed to the server in fixed-size chunks. The text encoding
//! is sniffed from a leading chunk; UTF-8 input is passed through untouched
//! and the windows-1252 fallback is transcoded to UTF-8 on the way.

use std::path::Path;
use std::time::Instant;

use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, WINDOWS_1252};
use futures::{SinkExt, pin_mut};
use tokio::io::AsyncReadExt;
use tokio_postgres::Transaction;
use tracing::{debug, info, warn};

use super::error::{WarehouseError, WarehouseResult};
use crate::progress::{format_bytes, format_number};

/// Bytes inspected when choosing an encoding
pub const PROBE_BYTES: usize = 4096;

/// Bytes read from disk per copy chunk
pub const CHUNK_BYTES: usize = 256 * 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Candidate text encodings of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8 without a byte-order mark
    Utf8,
    /// UTF-8 starting with a byte-order mark
    Utf8Bom,
    /// Single-byte western fallback; 0x80-0x9F decode as windows-1252 characters
    Windows1252,
}

impl TextEncoding {
    /// Candidates in priority order
    pub const CANDIDATES: [TextEncoding; 3] = [Self::Utf8, Self::Utf8Bom, Self::Windows1252];

    /// Encoding label
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf8Bom => "utf-8-sig",
            Self::Windows1252 => "windows-1252",
        }
    }

    /// Whether a leading chunk decodes cleanly under this encoding
    pub fn accepts(&self, probe: &[u8]) -> bool {
        match self {
            Self::Utf8 => !probe.starts_with(UTF8_BOM) && is_utf8_prefix(probe),
            Self::Utf8Bom => probe
                .strip_prefix(UTF8_BOM)
                .is_some_and(is_utf8_prefix),
            Self::Windows1252 => WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(probe)
                .is_some(),
        }
    }
}

/// A chunk cut from a file may end inside a multi-byte sequence; that is not an error.
fn is_utf8_prefix(bytes: &[u8]) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

/// Pick the first candidate encoding that accepts `probe`, defaulting to UTF-8
pub fn detect_encoding(probe: &[u8]) -> TextEncoding {
    TextEncoding::CANDIDATES
        .into_iter()
        .find(|encoding| encoding.accepts(probe))
        .unwrap_or(TextEncoding::Utf8)
}

/// Sniff the encoding of a file from its first [`PROBE_BYTES`] bytes
pub async fn sniff_encoding(path: &Path) -> WarehouseResult<TextEncoding> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| WarehouseError::read(path, e))?;
    let mut probe = vec![0u8; PROBE_BYTES];
    let mut filled = 0;
    while filled < PROBE_BYTES {
        let n = file
            .read(&mut probe[filled..])
            .await
            .map_err(|e| WarehouseError::read(path, e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(detect_encoding(&probe[..filled]))
}

/// Converts raw file chunks to the UTF-8 bytes sent to the server
pub struct Transcoder {
    decoder: Option<Decoder>,
    skip: usize,
}

impl Transcoder {
    /// Create a transcoder for a detected encoding
    pub fn new(encoding: TextEncoding) -> Self {
        match encoding {
            TextEncoding::Utf8 => Self {
                decoder: None,
                skip: 0,
            },
            TextEncoding::Utf8Bom => Self {
                decoder: None,
                skip: UTF8_BOM.len(),
            },
            TextEncoding::Windows1252 => Self {
                decoder: Some(WINDOWS_1252.new_decoder_without_bom_handling()),
                skip: 0,
            },
        }
    }

    /// Convert the next chunk; `last` flushes any decoder state
    pub fn push(&mut self, chunk: &[u8], last: bool) -> Bytes {
        let skipped = self.skip.min(chunk.len());
        self.skip -= skipped;
        let chunk = &chunk[skipped..];

        match self.decoder.as_mut() {
            None => Bytes::copy_from_slice(chunk),
            Some(decoder) => {
                let capacity = decoder
                    .max_utf8_buffer_length(chunk.len())
                    .unwrap_or(chunk.len() * 3);
                let mut out = String::with_capacity(capacity);
                decode_into(decoder, chunk, last, &mut out);
                Bytes::from(out)
            }
        }
    }
}

/// Decode all of `chunk` into `out`, growing it whenever the decoder reports a full buffer
fn decode_into(decoder: &mut Decoder, chunk: &[u8], last: bool, out: &mut String) {
    let mut consumed = 0;
    loop {
        let (result, read, _) = decoder.decode_to_string(&chunk[consumed..], out, last);
        consumed += read;
        match result {
            CoderResult::InputEmpty => break,
            CoderResult::OutputFull => {
                let remaining = chunk.len() - consumed;
                let needed = decoder
                    .max_utf8_buffer_length(remaining)
                    .unwrap_or(remaining * 3);
                out.reserve(needed.max(4));
            }
        }
    }
}

/// Build the `COPY` statement used for every bulk load
///
/// Empty unquoted fields are read as SQL null.
pub fn copy_statement(table: &str, columns: &[&str], has_header: bool) -> String {
    format!(
        "COPY {table} ({}) FROM STDIN WITH (FORMAT csv, HEADER {has_header}, NULL '', QUOTE '\"', ESCAPE '\"')",
        columns.join(", ")
    )
}

/// Stream a CSV file into `table` and return the number of rows copied
///
/// `table` must already be schema-qualified.
pub async fn load(
    tx: &Transaction<'_>,
    table: &str,
    path: &Path,
    columns: &[&str],
    has_header: bool,
) -> WarehouseResult<u64> {
    let start = Instant::now();
    let encoding = sniff_encoding(path).await?;
    if encoding != TextEncoding::Utf8 {
        warn!(table, file = %path.display(), encoding = encoding.name(), "Non UTF-8 input, converting");
    }

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| WarehouseError::read(path, e))?;
    let size = file.metadata().await.map(|m| m.len()).unwrap_or(0);
    info!(table, file = %path.display(), size = %format_bytes(size), "Loading with COPY");

    let statement = copy_statement(table, columns, has_header);
    debug!(statement = %statement, "Starting bulk copy");

    let sink = tx
        .copy_in::<_, Bytes>(statement.as_str())
        .await
        .map_err(|e| WarehouseError::copy(table, e))?;
    pin_mut!(sink);

    let mut transcoder = Transcoder::new(encoding);
    let mut buf = vec![0u8; CHUNK_BYTES];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| WarehouseError::read(path, e))?;
        if n == 0 {
            break;
        }
        let chunk = transcoder.push(&buf[..n], false);
        if !chunk.is_empty() {
            sink.send(chunk)
                .await
                .map_err(|e| WarehouseError::copy(table, e))?;
        }
    }
    let tail = transcoder.push(&[], true);
    if !tail.is_empty() {
        sink.send(tail)
            .await
            .map_err(|e| WarehouseError::copy(table, e))?;
    }

    let rows = sink
        .finish()
        .await
        .map_err(|e| WarehouseError::copy(table, e))?;

    info!(
        table,
        rows = %format_number(rows),
        duration_ms = start.elapsed().as_millis() as u64,
        "Bulk copy complete"
    );
    Ok(rows)
}
