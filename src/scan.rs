//! Incremental reading of append-only probe logs.
//!
//! Probes only ever append, so a scan resumes at the byte offset where the
//! previous run stopped. Only newline-terminated lines are consumed; a partial
//! trailing line (a probe mid-write) is left for the next scan.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::parser::{LineParser, ParseError, ParsedEntry};

/// One raw line as read from a probe log. Consumed once by a parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogLine {
    pub service: String,
    /// 1-based line number relative to the start of this scan.
    pub line_no: usize,
    /// Byte offset of the line start within the file.
    pub offset: u64,
    pub text: String,
}

/// Result of reading a log from a given offset.
#[derive(Debug, Default)]
pub struct LogChunk {
    pub lines: Vec<RawLogLine>,
    /// Offset just past the last consumed line.
    pub next_offset: u64,
    /// `false` when the log file does not exist.
    pub found: bool,
    /// The stored offset was beyond EOF and the file was re-read from 0.
    pub rewound: bool,
}

/// Read all complete lines of `path` starting at `offset`.
///
/// A missing file is not an error: it yields an empty chunk with
/// `found == false`.
pub fn read_from(path: &Path, service: &str, offset: u64) -> Result<LogChunk> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), %service, "log file not found");
            return Ok(LogChunk::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to open log file: {}", path.display()))
        }
    };

    let len = file
        .metadata()
        .with_context(|| format!("failed to stat log file: {}", path.display()))?
        .len();

    let (start, rewound) = if offset > len {
        info!(
            path = %path.display(),
            %service,
            offset,
            len,
            "log shrank since last scan, rescanning"
        );
        (0, true)
    } else {
        (offset, false)
    };

    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(start))
        .with_context(|| format!("failed to seek log file: {}", path.display()))?;

    let mut lines = Vec::new();
    let mut pos = start;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("failed to read log file: {}", path.display()))?;
        if n == 0 || buf.last() != Some(&b'\n') {
            break;
        }
        let text = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
        lines.push(RawLogLine {
            service: service.to_string(),
            line_no: lines.len() + 1,
            offset: pos,
            text,
        });
        pos += n as u64;
    }

    Ok(LogChunk {
        lines,
        next_offset: pos,
        found: true,
        rewound,
    })
}

/// Parsed entries of a batch plus the lines that were rejected.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub entries: Vec<ParsedEntry>,
    pub skipped: Vec<(RawLogLine, ParseError)>,
}

/// Parse every line of a batch; rejected lines are collected, never fatal.
pub fn parse_lines(parser: &dyn LineParser, lines: Vec<RawLogLine>) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    for line in lines {
        if line.text.trim().is_empty() {
            continue;
        }
        match parser.parse(&line.text) {
            Ok(entry) => batch.entries.push(entry),
            Err(e) => {
                debug!(
                    service = %line.service,
                    line = line.line_no,
                    offset = line.offset,
                    error = %e,
                    "skipping log line"
                );
                batch.skipped.push((line, e));
            }
        }
    }
    batch
}
