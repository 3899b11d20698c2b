//! Per-platform identifier and literal escaping.
//!
//! The rest of the engine is dialect-agnostic; everything that differs
//! between databases (quote characters, named-parameter support, unsigned
//! integers, binary binding, implicit coercion quirks) is answered here.

use crate::error::{StoreError, StoreResult};
use sha2::{Digest, Sha256};

/// Maximum characters per string-literal chunk before the escaper switches
/// to platform-safe concatenation. DDL is the only consumer of literals, so
/// the limit is conservative.
const MAX_LITERAL_CHUNK: usize = 4000;

/// Marker that opens the text encoding of a binary payload.
const BINARY_MARKER: &str = "dsb1\r";

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    /// ANSI double-quote identifiers, named parameters. Postgres-shaped.
    #[default]
    Generic,
    /// Backtick identifiers, unsigned integer columns.
    MySql,
    /// Bracket identifiers, positional parameters only.
    MsSql,
    /// Double-quote identifiers, lax numeric coercion, unreliable binary binds.
    Sqlite,
}

impl Platform {
    /// Opening identifier quote.
    pub fn open_quote(self) -> char {
        match self {
            Platform::Generic | Platform::Sqlite => '"',
            Platform::MySql => '`',
            Platform::MsSql => '[',
        }
    }

    /// Closing identifier quote.
    pub fn close_quote(self) -> char {
        match self {
            Platform::Generic | Platform::Sqlite => '"',
            Platform::MySql => '`',
            Platform::MsSql => ']',
        }
    }

    /// Whether the driver accepts `:name` placeholders natively. Platforms
    /// answering false get a positional `?` rewrite with a 1:1 index map.
    pub fn supports_named_params(self) -> bool {
        !matches!(self, Platform::MsSql)
    }

    /// Whether integer columns may be declared UNSIGNED.
    pub fn supports_unsigned(self) -> bool {
        matches!(self, Platform::MySql)
    }

    /// Whether binary values can be bound as parameters without corruption.
    pub fn binds_binary(self) -> bool {
        !matches!(self, Platform::Sqlite | Platform::MsSql)
    }

    /// Whether the platform applies inconsistent implicit coercion when
    /// comparing mixed numeric/string operands. The condition renderer emits
    /// a defensive CASE on such platforms.
    pub fn has_lax_numeric_coercion(self) -> bool {
        matches!(self, Platform::Sqlite)
    }

    /// Hard-escape an identifier: wrap in the platform quote pair, doubling
    /// embedded closing quotes.
    pub fn escape_identifier(self, name: &str) -> String {
        let close = self.close_quote();
        let mut out = String::with_capacity(name.len() + 2);
        out.push(self.open_quote());
        for ch in name.chars() {
            out.push(ch);
            if ch == close {
                out.push(close);
            }
        }
        out.push(close);
        out
    }

    /// Soft-escape an identifier.
    ///
    /// Backs off entirely when the input already looks quoted or contains
    /// `*`, `(`, or a quote char (an expression, not a bare name); splits
    /// compound `table.column` input and escapes each part.
    pub fn escape_soft(self, name: &str) -> String {
        if name.contains(self.open_quote())
            || name.contains(self.close_quote())
            || name.contains('*')
            || name.contains('(')
        {
            return name.to_string();
        }
        if name.contains('.') {
            return name
                .split('.')
                .map(|part| self.escape_identifier(part))
                .collect::<Vec<_>>()
                .join(".");
        }
        self.escape_identifier(name)
    }

    fn concat(self, mut pieces: Vec<String>) -> String {
        if pieces.len() == 1 {
            return pieces.pop().unwrap_or_default();
        }
        match self {
            Platform::MySql => format!("CONCAT({})", pieces.join(", ")),
            Platform::MsSql => pieces.join(" + "),
            Platform::Generic | Platform::Sqlite => pieces.join(" || "),
        }
    }

    fn nul_literal(self) -> &'static str {
        match self {
            Platform::Generic => "CHR(0)",
            _ => "CHAR(0)",
        }
    }

    /// Escape a string as a SQL literal. Used only where a value cannot be
    /// bound (DDL); everything else goes through parameters.
    ///
    /// Quotes are doubled; NUL bytes and over-length values force a
    /// concatenation of safe chunks.
    pub fn escape_literal(self, value: &str) -> String {
        let needs_chunking = value.contains('\0') || value.chars().count() > MAX_LITERAL_CHUNK;
        if !needs_chunking {
            return format!("'{}'", value.replace('\'', "''"));
        }

        let mut pieces = Vec::new();
        let mut current = String::new();
        for ch in value.chars() {
            if ch == '\0' {
                if !current.is_empty() {
                    pieces.push(format!("'{}'", current.replace('\'', "''")));
                    current.clear();
                }
                pieces.push(self.nul_literal().to_string());
                continue;
            }
            current.push(ch);
            if current.chars().count() >= MAX_LITERAL_CHUNK {
                pieces.push(format!("'{}'", current.replace('\'', "''")));
                current.clear();
            }
        }
        if !current.is_empty() || pieces.is_empty() {
            pieces.push(format!("'{}'", current.replace('\'', "''")));
        }
        self.concat(pieces)
    }
}

/// Encode a binary payload for text-only transports.
///
/// Layout: marker, 16 hex chars of the payload's SHA-256, `\r`, hex payload.
/// Encoding something that already carries the marker is fatal: silently
/// double-encoding would corrupt the round-trip.
pub fn encode_binary(payload: &[u8]) -> StoreResult<String> {
    if payload.len() >= BINARY_MARKER.len()
        && &payload[..BINARY_MARKER.len()] == BINARY_MARKER.as_bytes()
    {
        return Err(StoreError::Encoding(
            "refusing to encode an already-encoded payload".into(),
        ));
    }
    let digest = Sha256::digest(payload);
    let mut out = String::with_capacity(BINARY_MARKER.len() + 17 + payload.len() * 2);
    out.push_str(BINARY_MARKER);
    for byte in &digest[..8] {
        out.push_str(&format!("{byte:02x}"));
    }
    out.push('\r');
    for byte in payload {
        out.push_str(&format!("{byte:02x}"));
    }
    Ok(out)
}

/// True if the text carries the binary-encoding marker.
pub fn is_encoded_binary(text: &str) -> bool {
    text.starts_with(BINARY_MARKER)
}

/// Decode a payload produced by [`encode_binary`], verifying the content hash.
pub fn decode_binary(text: &str) -> StoreResult<Vec<u8>> {
    let rest = text
        .strip_prefix(BINARY_MARKER)
        .ok_or_else(|| StoreError::Encoding("missing binary marker".into()))?;
    let (hash, hex) = rest
        .split_once('\r')
        .ok_or_else(|| StoreError::Encoding("missing hash delimiter".into()))?;
    if hash.len() != 16 {
        return Err(StoreError::Encoding("truncated content hash".into()));
    }
    if hex.len() % 2 != 0 {
        return Err(StoreError::Encoding("odd-length hex payload".into()));
    }
    let mut payload = Vec::with_capacity(hex.len() / 2);
    let bytes = hex.as_bytes();
    for pair in bytes.chunks(2) {
        let s = std::str::from_utf8(pair)
            .map_err(|_| StoreError::Encoding("non-ascii hex payload".into()))?;
        let byte = u8::from_str_radix(s, 16)
            .map_err(|_| StoreError::Encoding(format!("invalid hex pair '{s}'")))?;
        payload.push(byte);
    }

    let digest = Sha256::digest(&payload);
    let expect: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    if expect != hash {
        return Err(StoreError::Encoding(
            "content hash mismatch: corrupt or tampered payload".into(),
        ));
    }
    if payload.len() >= BINARY_MARKER.len()
        && &payload[..BINARY_MARKER.len()] == BINARY_MARKER.as_bytes()
    {
        return Err(StoreError::Encoding("double-encoded payload".into()));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_escape_doubles_quotes() {
        assert_eq!(Platform::Generic.escape_identifier("age"), "\"age\"");
        assert_eq!(
            Platform::Generic.escape_identifier("we\"ird"),
            "\"we\"\"ird\""
        );
        assert_eq!(Platform::MySql.escape_identifier("age"), "`age`");
        assert_eq!(Platform::MsSql.escape_identifier("age"), "[age]");
        assert_eq!(Platform::MsSql.escape_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn soft_escape_splits_compound() {
        assert_eq!(
            Platform::Generic.escape_soft("users.name"),
            "\"users\".\"name\""
        );
        assert_eq!(Platform::MySql.escape_soft("u.id"), "`u`.`id`");
    }

    #[test]
    fn soft_escape_backs_off_for_expressions() {
        assert_eq!(Platform::Generic.escape_soft("*"), "*");
        assert_eq!(Platform::Generic.escape_soft("count(*)"), "count(*)");
        assert_eq!(Platform::Generic.escape_soft("\"already\""), "\"already\"");
    }

    #[test]
    fn literal_escapes_quotes() {
        assert_eq!(Platform::Generic.escape_literal("it's"), "'it''s'");
    }

    #[test]
    fn literal_with_nul_concatenates() {
        let sql = Platform::Generic.escape_literal("a\0b");
        assert_eq!(sql, "'a' || CHR(0) || 'b'");
        let sql = Platform::MySql.escape_literal("a\0b");
        assert_eq!(sql, "CONCAT('a', CHAR(0), 'b')");
    }

    #[test]
    fn long_literal_is_chunked() {
        let long = "x".repeat(MAX_LITERAL_CHUNK + 10);
        let sql = Platform::Generic.escape_literal(&long);
        assert!(sql.contains(" || "));
    }

    #[test]
    fn binary_round_trip() {
        let payload = vec![0u8, 1, 2, 254, 255];
        let text = encode_binary(&payload).unwrap();
        assert!(is_encoded_binary(&text));
        assert_eq!(decode_binary(&text).unwrap(), payload);
    }

    #[test]
    fn double_encode_is_fatal() {
        let once = encode_binary(b"hello").unwrap();
        assert!(encode_binary(once.as_bytes()).is_err());
    }

    #[test]
    fn corrupt_payload_is_fatal() {
        let mut text = encode_binary(b"hello").unwrap();
        let flipped = text.pop().map(|c| if c == '0' { '1' } else { '0' }).unwrap();
        text.push(flipped);
        assert!(decode_binary(&text).is_err());
    }
}
