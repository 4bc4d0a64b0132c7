//! Log redaction for credentials, tokens and applicant contact details.
//!
//! Every formatted log line passes through [`SanitizingMakeWriter`], which
//! replaces:
//! - Bearer tokens and JWT-shaped strings
//! - Password fields (`password=...`, `"password": ...`) and Argon2 hashes
//! - Email addresses and phone numbers
//! - Common secret formats (PEM blocks, long hex/base64 key material)
//!
//! Applicant features themselves are not sensitive enough to scrub, but the
//! handlers still avoid logging payloads.
//!
//! # Performance / DoS
//!
//! `sanitize()` caps the input size (see `AGRICREDIT_SANITIZE_MAX_BYTES`) so a
//! huge log line cannot stall the writer thread.

use regex::{Regex, RegexSet};
use std::io::{self, Write};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

/// Maximum number of bytes to sanitize per call (16 KiB unless overridden).
const DEFAULT_SANITIZE_MAX_BYTES: usize = 16 * 1024;

struct Pattern {
    regex: Regex,
    replacement: &'static str,
}

struct Patterns {
    fast_set: RegexSet,
    fast_patterns: Vec<Pattern>,
    pem_patterns: Vec<Pattern>,
}

/// Ordered rules; earlier rules run first so narrower matches win.
const FAST_RULES: &[(&str, &str)] = &[
    (r"(?i)\bbearer\s+[A-Za-z0-9._~+/-]+=*", "Bearer [REDACTED-TOKEN]"),
    (
        r"\beyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}",
        "[REDACTED-JWT]",
    ),
    (r#"\$argon2(?:id|i|d)\$[^\s"']+"#, "[REDACTED-HASH]"),
    (
        r#"(?i)\b(?:password|passwd|pwd)\b"?\s*[:=]\s*"?[^\s"&,}]+"?"#,
        "password=[REDACTED]",
    ),
    (
        r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
        "[REDACTED-EMAIL]",
    ),
    (
        r"(?:\+\d{1,3}[-.\s]?|\b0)\d{2,3}[-.\s]?\d{3}[-.\s]?\d{3,4}\b",
        "[REDACTED-PHONE]",
    ),
    (
        r"(?i)\b(?:api[_-]?key|access[_-]?token|secret|private[_-]?key|seed|signature|sig|token|key)\b\s*[:=]\s*[A-Za-z0-9+/_-]{32,}={0,2}",
        "[REDACTED-SECRET]",
    ),
    (r"\b[0-9a-fA-F]{32,}\b", "[REDACTED-KEY]"),
];

const PEM_RULES: &[(&str, &str)] = &[
    (
        r"(?s)-----BEGIN [A-Z0-9 ]{0,40}PRIVATE KEY-----[\s\S]{0,8192}-----END [A-Z0-9 ]{0,40}PRIVATE KEY-----",
        "[REDACTED-PEM-PRIVATE-KEY]",
    ),
    (
        r"(?s)-----BEGIN [A-Z0-9 ]{0,40}PUBLIC KEY-----[\s\S]{0,4096}-----END [A-Z0-9 ]{0,40}PUBLIC KEY-----",
        "[REDACTED-PEM-PUBLIC-KEY]",
    ),
];

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }

    // Ensure we don't panic on UTF-8 boundaries.
    let mut end = max_bytes.min(input.len());
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

fn max_sanitize_bytes() -> usize {
    std::env::var("AGRICREDIT_SANITIZE_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SANITIZE_MAX_BYTES)
}

fn compile(rules: &[(&'static str, &'static str)]) -> Vec<Pattern> {
    rules
        .iter()
        .filter_map(|&(pattern, replacement)| {
            Regex::new(pattern).ok().map(|regex| Pattern {
                regex,
                replacement,
            })
        })
        .collect()
}

fn get_patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| {
        let fast_patterns = compile(FAST_RULES);
        let fast_set = RegexSet::new(fast_patterns.iter().map(|p| p.regex.as_str()))
            .unwrap_or_else(|_| RegexSet::empty());
        Patterns {
            fast_set,
            fast_patterns,
            pem_patterns: compile(PEM_RULES),
        }
    })
}

/// Replace every sensitive match in `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_sanitize_bytes())
}

fn sanitize_with_limit(input: &str, max_bytes: usize) -> String {
    let patterns = get_patterns();

    let (prefix, truncated) = truncate_to_char_boundary(input, max_bytes);

    if !patterns.fast_set.is_match(prefix)
        && !(prefix.contains("-----BEGIN ") && patterns.pem_patterns.iter().any(|p| p.regex.is_match(prefix)))
    {
        let mut out = prefix.to_string();
        if truncated {
            out.push_str(" [TRUNCATED]");
        }
        return out;
    }

    let matched: Vec<usize> = patterns.fast_set.matches(prefix).into_iter().collect();
    let mut result = prefix.to_string();
    for idx in matched {
        let pattern = &patterns.fast_patterns[idx];
        result = pattern
            .regex
            .replace_all(&result, pattern.replacement)
            .to_string();
    }

    if result.contains("-----BEGIN ") {
        for pattern in &patterns.pem_patterns {
            if pattern.regex.is_match(&result) {
                result = pattern
                    .regex
                    .replace_all(&result, pattern.replacement)
                    .to_string();
            }
        }
    }

    if truncated {
        result.push_str(" [TRUNCATED]");
    }
    result
}

/// Whether `input` contains anything [`sanitize`] would redact.
#[must_use]
pub fn contains_sensitive(input: &str) -> bool {
    let patterns = get_patterns();
    let (prefix, _truncated) = truncate_to_char_boundary(input, max_sanitize_bytes());
    if patterns.fast_set.is_match(prefix) {
        return true;
    }
    if prefix.contains("-----BEGIN ") {
        return patterns.pem_patterns.iter().any(|p| p.regex.is_match(prefix));
    }
    false
}

/// [`MakeWriter`] whose writers redact every line with [`sanitize`].
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M>(M);

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self(inner)
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            sink: self.0.make_writer(),
            pending: Vec::new(),
        }
    }
}

/// Holds bytes until a newline arrives, then writes the redacted line.
///
/// The fmt layer creates one writer per event; whatever is still pending
/// when it is dropped is redacted and written out.
pub struct SanitizingWriter<W: Write> {
    sink: W,
    pending: Vec<u8>,
}

impl<W: Write> SanitizingWriter<W> {
    fn emit(&mut self, len: usize) -> io::Result<()> {
        let chunk: Vec<u8> = self.pending.drain(..len).collect();
        let clean = sanitize(&String::from_utf8_lossy(&chunk));
        self.sink.write_all(clean.as_bytes())
    }

    fn emit_lines(&mut self) -> io::Result<()> {
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            self.emit(newline + 1)?;
        }
        Ok(())
    }

    fn emit_all(&mut self) -> io::Result<()> {
        self.emit_lines()?;
        if !self.pending.is_empty() {
            self.emit(self.pending.len())?;
        }
        Ok(())
    }
}

impl<W: Write> Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.emit_lines()?;

        // An unterminated run past the size cap is cut rather than held.
        if self.pending.len() > max_sanitize_bytes() {
            self.emit(self.pending.len())?;
            self.sink.write_all(b"\n")?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit_all()?;
        self.sink.flush()
    }
}

impl<W: Write> Drop for SanitizingWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.emit_all() {
            eprintln!("log writer failed: {e}");
        }
    }
}
