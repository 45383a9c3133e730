//! Incremental feature reader for large GeoJSON documents.
//!
//! Parsing a multi-hundred-megabyte FeatureCollection with `serde_json` in one
//! shot holds the whole document tree in memory. This reader instead scans the
//! raw byte stream for the `"features"` array marker and then pulls one
//! balanced `{...}` span at a time, parsing each span as a standalone
//! [`geojson::Feature`]. Only the current span is ever buffered.
//!
//! Brace depth is tracked with string-literal and escape awareness, so braces
//! inside property values do not confuse the scanner.
//!
//! # Error Behavior
//!
//! A span that fails to parse as a Feature is logged and skipped - one bad
//! record never aborts the rest of the stream. If the `"features"` marker is
//! absent the reader yields an empty sequence.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use geojson::Feature;

use crate::{Error, Result};

/// Read buffer size for the underlying stream.
const CHUNK_SIZE: usize = 64 * 1024;

/// The byte sequence that introduces the feature array.
const MARKER: &[u8] = b"\"features\"";

/// Streaming reader yielding one parsed [`Feature`] at a time.
///
/// Implements [`Iterator`], so it can drive a `for` loop directly:
///
/// ```no_run
/// use geoslim_core::reader::FeatureReader;
///
/// let mut reader = FeatureReader::from_path("fires.geojson".as_ref()).unwrap();
/// for feature in &mut reader {
///     println!("{:?}", feature.property("FIRE_NAME"));
/// }
/// println!("skipped {} malformed spans", reader.skipped());
/// ```
pub struct FeatureReader<R: Read> {
    source: R,
    chunk: Vec<u8>,
    pos: usize,
    len: usize,
    /// Whether the `"features": [` marker has been located yet.
    in_array: bool,
    done: bool,
    skipped: usize,
}

impl FeatureReader<File> {
    /// Open a feature collection document from a file path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::Read(format!("Failed to open {}: {}", path.display(), e))
        })?;
        Ok(Self::new(file))
    }
}

impl<R: Read> FeatureReader<R> {
    /// Wrap any byte source. Buffering is handled internally.
    pub fn new(source: R) -> Self {
        Self {
            source,
            chunk: vec![0; CHUNK_SIZE],
            pos: 0,
            len: 0,
            in_array: false,
            done: false,
            skipped: 0,
        }
    }

    /// Number of malformed feature spans logged and skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        if self.pos == self.len {
            self.len = self.source.read(&mut self.chunk)?;
            self.pos = 0;
            if self.len == 0 {
                return Ok(None);
            }
        }
        let b = self.chunk[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }

    /// Scan forward until `"features"` followed by `:` and `[` is consumed.
    ///
    /// Returns false if the stream ends without the marker.
    fn seek_feature_array(&mut self) -> io::Result<bool> {
        let mut matched = 0;
        loop {
            let Some(b) = self.next_byte()? else {
                return Ok(false);
            };
            if b == MARKER[matched] {
                matched += 1;
                if matched < MARKER.len() {
                    continue;
                }
                // Full token seen; expect optional whitespace, ':', whitespace, '['.
                matched = 0;
                match self.expect_array_open()? {
                    Some(true) => return Ok(true),
                    Some(false) => continue,
                    None => return Ok(false),
                }
            } else {
                matched = usize::from(b == MARKER[0]);
            }
        }
    }

    /// After the `"features"` token, consume `: [`. Returns `Some(false)` if
    /// the token was a false positive (e.g. a property value), `None` at EOF.
    fn expect_array_open(&mut self) -> io::Result<Option<bool>> {
        let mut seen_colon = false;
        loop {
            let Some(b) = self.next_byte()? else {
                return Ok(None);
            };
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => continue,
                b':' if !seen_colon => seen_colon = true,
                b'[' if seen_colon => return Ok(Some(true)),
                _ => return Ok(Some(false)),
            }
        }
    }

    /// Accumulate one balanced `{...}` span, starting after its opening brace.
    ///
    /// Returns `None` if the stream ends before the span closes.
    fn read_span(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut span = vec![b'{'];
        let mut depth = 1usize;
        let mut in_string = false;
        let mut escaped = false;

        loop {
            let Some(b) = self.next_byte()? else {
                return Ok(None);
            };
            span.push(b);

            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }

            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Some(span));
                    }
                }
                _ => {}
            }
        }
    }

    fn next_feature(&mut self) -> io::Result<Option<Feature>> {
        if self.done {
            return Ok(None);
        }

        if !self.in_array {
            if !self.seek_feature_array()? {
                log::warn!("No \"features\" array found in document");
                self.done = true;
                return Ok(None);
            }
            self.in_array = true;
        }

        loop {
            let Some(b) = self.next_byte()? else {
                self.done = true;
                return Ok(None);
            };
            match b {
                b' ' | b'\t' | b'\r' | b'\n' | b',' => continue,
                b']' => {
                    self.done = true;
                    return Ok(None);
                }
                b'{' => {
                    let Some(span) = self.read_span()? else {
                        log::warn!("Feature span truncated at end of stream, skipping");
                        self.skipped += 1;
                        self.done = true;
                        return Ok(None);
                    };
                    match serde_json::from_slice::<Feature>(&span) {
                        Ok(feature) => return Ok(Some(feature)),
                        Err(e) => {
                            let head: String =
                                String::from_utf8_lossy(&span).chars().take(80).collect();
                            log::warn!("Skipping malformed feature ({}): {}...", e, head);
                            self.skipped += 1;
                        }
                    }
                }
                // Tolerate stray bytes between features rather than aborting.
                _ => continue,
            }
        }
    }
}

impl<R: Read> Iterator for FeatureReader<R> {
    type Item = Feature;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_feature() {
            Ok(feature) => feature,
            Err(e) => {
                log::error!("IO error while reading feature stream: {}", e);
                self.done = true;
                None
            }
        }
    }
}
