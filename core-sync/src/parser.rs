//! # M3U Parser
//!
//! Streams channel entries out of an extended M3U playlist.
//!
//! ## Format
//!
//! ```text
//! #EXTM3U
//! #EXTINF:-1 tvg-id="news.uk" tvg-logo="http://logo/news.png" group-title="News",News 24
//! #EXTVLCOPT:http-user-agent=Player
//! http://streams.example.com/news24.m3u8
//! ```
//!
//! An entry is an `#EXTINF:` directive followed by any number of directive
//! lines and then the first line that is neither blank nor a comment, which
//! is taken as the stream URL. `#EXTGRP:` between the two supplies the group
//! when `group-title` is absent.
//!
//! Anything that does not fit (unknown directives, URL lines with no
//! directive before them, a directive that never gets a URL) is skipped and
//! logged at debug level. Only an I/O failure on the underlying reader ends
//! the stream with an error.

use crate::{Result, SyncError};
use core_async::io::{AsyncBufRead, AsyncBufReadExt};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

const EXTINF: &str = "#EXTINF:";
const EXTGRP: &str = "#EXTGRP:";
const BOM: char = '\u{feff}';

/// Lazily parsed entries; restart by parsing a fresh reader.
pub type ParsedEntries = BoxStream<'static, Result<ParsedEntry>>;

/// One channel as it appears in the playlist text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEntry {
    pub title: String,
    pub url: String,
    pub group: Option<String>,
    /// `tvg-logo`
    pub cover: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_name: Option<String>,
    /// Duration token as written, usually `-1` for live streams
    pub duration: Option<String>,
}

impl ParsedEntry {
    /// Entry with just a URL and title, mostly for tests and tooling
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            group: None,
            cover: None,
            tvg_id: None,
            tvg_name: None,
            duration: None,
        }
    }
}

/// Extended M3U parser
#[derive(Debug, Clone, Copy, Default)]
pub struct M3uParser;

impl M3uParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse entries from `reader` as they are read.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected.
    pub fn parse<R>(&self, reader: R) -> ParsedEntries
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        let state = StreamState {
            reader,
            buf: Vec::new(),
            assembler: EntryAssembler::default(),
            done: false,
        };

        stream::unfold(state, |mut state| async move {
            let item = state.next_entry().await?;
            Some((item, state))
        })
        .boxed()
    }

    /// Parse an in-memory playlist.
    pub fn parse_str(&self, text: &str) -> Vec<ParsedEntry> {
        let mut assembler = EntryAssembler::default();
        let entries = text
            .lines()
            .filter_map(|line| assembler.push(line))
            .collect();
        assembler.finish();
        entries
    }
}

// ============================================================================
// Streaming
// ============================================================================

struct StreamState<R> {
    reader: R,
    buf: Vec<u8>,
    assembler: EntryAssembler,
    done: bool,
}

impl<R: AsyncBufRead + Unpin> StreamState<R> {
    async fn next_entry(&mut self) -> Option<Result<ParsedEntry>> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => {
                    self.done = true;
                    self.assembler.finish();
                    return None;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&self.buf).into_owned();
                    if let Some(entry) = self.assembler.push(&line) {
                        return Some(Ok(entry));
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(SyncError::Io(e)));
                }
            }
        }
    }
}

// ============================================================================
// Line Assembly
// ============================================================================

#[derive(Debug)]
struct PendingEntry {
    line: usize,
    directive: Directive,
    extgrp: Option<String>,
}

/// Pairs directives with the URL line that completes them.
#[derive(Debug, Default)]
struct EntryAssembler {
    line_number: usize,
    pending: Option<PendingEntry>,
}

impl EntryAssembler {
    fn push(&mut self, raw: &str) -> Option<ParsedEntry> {
        self.line_number += 1;
        let line = raw.trim_start_matches(BOM).trim();

        if line.is_empty() {
            return None;
        }

        if let Some(body) = strip_prefix_ignore_case(line, EXTINF) {
            if let Some(previous) = self.pending.take() {
                debug!(line = previous.line, "Skipping directive without stream URL");
            }
            match parse_directive(body, self.line_number) {
                Ok(directive) => {
                    self.pending = Some(PendingEntry {
                        line: self.line_number,
                        directive,
                        extgrp: None,
                    });
                }
                Err(e) => debug!(error = %e, "Skipping malformed entry"),
            }
            return None;
        }

        if let Some(group) = strip_prefix_ignore_case(line, EXTGRP) {
            if let Some(pending) = self.pending.as_mut() {
                pending.extgrp = non_empty(group);
            }
            return None;
        }

        if line.starts_with('#') {
            return None;
        }

        match self.pending.take() {
            Some(pending) => Some(pending.complete(line)),
            None => {
                debug!(line = self.line_number, "Skipping stream URL without directive");
                None
            }
        }
    }

    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(line = pending.line, "Skipping directive without stream URL at end of input");
        }
    }
}

impl PendingEntry {
    fn complete(self, url: &str) -> ParsedEntry {
        let Directive {
            duration,
            title,
            attributes,
        } = self.directive;

        let attribute = |key: &str| {
            attributes
                .iter()
                .find(|(name, _)| name == key)
                .and_then(|(_, value)| non_empty(value))
        };

        let tvg_name = attribute("tvg-name");
        let title = title
            .or_else(|| tvg_name.clone())
            .unwrap_or_else(|| url.to_string());

        ParsedEntry {
            title,
            url: url.to_string(),
            group: attribute("group-title").or(self.extgrp),
            cover: attribute("tvg-logo"),
            tvg_id: attribute("tvg-id"),
            tvg_name,
            duration,
        }
    }
}

// ============================================================================
// Directive Parsing
// ============================================================================

#[derive(Debug, PartialEq)]
struct Directive {
    duration: Option<String>,
    title: Option<String>,
    attributes: Vec<(String, String)>,
}

/// Parse the text after `#EXTINF:`.
///
/// The title follows the last comma outside double quotes.
fn parse_directive(body: &str, line: usize) -> Result<Directive> {
    let mut in_quotes = false;
    let mut split_at = None;
    for (index, ch) in body.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => split_at = Some(index),
            _ => {}
        }
    }

    let (header, title) = match split_at {
        Some(index) => (&body[..index], non_empty(&body[index + 1..])),
        None => (body, None),
    };

    let header = header.trim();
    let (duration, attributes) = match header.find(char::is_whitespace) {
        Some(index) if !header[..index].contains('=') => {
            (non_empty(&header[..index]), &header[index..])
        }
        None if !header.contains('=') => (non_empty(header), ""),
        _ => (None, header),
    };

    Ok(Directive {
        duration,
        title,
        attributes: parse_attributes(attributes, line)?,
    })
}

/// `key="value"` and `key=value` pairs separated by whitespace
fn parse_attributes(text: &str, line: usize) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }

        if chars.next_if_eq(&'=').is_none() {
            // Bare word, not an attribute
            continue;
        }

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '"' {
                    closed = true;
                    break;
                }
                value.push(c);
            }
            if !closed {
                return Err(SyncError::MalformedEntry {
                    line,
                    reason: format!("unterminated quote in attribute {}", key),
                });
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                value.push(c);
            }
        }

        if !key.is_empty() {
            attributes.push((key.to_ascii_lowercase(), value));
        }
    }

    Ok(attributes)
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
