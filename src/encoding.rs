//! Character-encoding detection and decode-on-demand.
//!
//! Detection runs once per attach, over a prefix of the file, and is never
//! revisited afterward; a user-forced encoding simply replaces what decoding
//! uses without touching how the indexer finds line boundaries (indexing is
//! always byte-oriented — see [`Encoding::lf_width`]).

use encoding_rs::{BIG5, GB18030, KOI8_R, SHIFT_JIS, UTF_16BE, UTF_16LE, WINDOWS_1251};

/// Encodings this engine can detect, or a caller can force via the
/// `--encoding` CLI flag or [`crate::log_data::LogData::set_display_encoding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    Cp1251,
    Big5,
    Gb18030,
    ShiftJis,
    Koi8R,
}

impl Encoding {
    /// Parses a forced-encoding tag from its CLI/API name.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "ascii" => Self::Ascii,
            "utf-8" | "utf8" => Self::Utf8,
            "utf-16le" | "utf16le" => Self::Utf16Le,
            "utf-16be" | "utf16be" => Self::Utf16Be,
            "utf-32le" | "utf32le" => Self::Utf32Le,
            "utf-32be" | "utf32be" => Self::Utf32Be,
            "cp1251" | "windows-1251" => Self::Cp1251,
            "big5" => Self::Big5,
            "gb18030" => Self::Gb18030,
            "shift-jis" | "shiftjis" | "sjis" => Self::ShiftJis,
            "koi8-r" | "koi8r" => Self::Koi8R,
            _ => return None,
        })
    }

    /// Byte width of a line terminator in this encoding. The indexer
    /// advances by this stride when scanning for line ends.
    pub fn lf_width(self) -> usize {
        match self {
            Self::Utf16Le | Self::Utf16Be => 2,
            Self::Utf32Le | Self::Utf32Be => 4,
            _ => 1,
        }
    }

    /// Byte offset of the `\n` code unit's low byte within its code unit,
    /// for multi-byte terminators. Single-byte encodings have no meaningful
    /// offset.
    pub fn lf_index_within_code_unit(self) -> usize {
        match self {
            Self::Utf16Be => 1,
            Self::Utf32Be => 3,
            _ => 0,
        }
    }
}

/// Inspects a prefix of file content and guesses its encoding: first a
/// byte-order-mark check, then statistical detection mirroring the
/// `uchardet`/UTF-text heuristic.
///
/// BOM sniffing is exact; lacking a BOM, the statistical pass looks for
/// UTF-8 validity first (log files are overwhelmingly UTF-8 or ASCII in
/// practice), then falls back to a byte-histogram heuristic distinguishing
/// the single-byte code pages from each other.
pub fn detect(prefix: &[u8]) -> Encoding {
    if let Some(enc) = detect_bom(prefix) {
        return enc;
    }
    if prefix.is_ascii() {
        return Encoding::Ascii;
    }
    if std::str::from_utf8(prefix).is_ok() {
        return Encoding::Utf8;
    }
    detect_by_histogram(prefix)
}

fn detect_bom(prefix: &[u8]) -> Option<Encoding> {
    if prefix.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(Encoding::Utf8);
    }
    if prefix.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        return Some(Encoding::Utf32Le);
    }
    if prefix.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return Some(Encoding::Utf32Be);
    }
    if prefix.starts_with(&[0xFF, 0xFE]) {
        return Some(Encoding::Utf16Le);
    }
    if prefix.starts_with(&[0xFE, 0xFF]) {
        return Some(Encoding::Utf16Be);
    }
    None
}

/// Crude single-byte/double-byte code page disambiguation for content that
/// failed UTF-8 validation. Not a full statistical classifier (that's
/// `uchardet`'s job in the original); good enough to pick a plausible
/// default that a user can override with a forced encoding.
fn detect_by_histogram(prefix: &[u8]) -> Encoding {
    let high_bytes = prefix.iter().filter(|&&b| b >= 0x80).count();
    if high_bytes == 0 {
        return Encoding::Ascii;
    }
    // Shift-JIS and Big5 and GB18030 all use lead bytes in overlapping
    // high ranges; without a real statistical model we just pick GB18030 as
    // the most permissive superset-like default among the CJK options, and
    // fall back to CP1251 if the high-byte density looks Cyrillic-typical
    // (roughly half the bytes, characteristic of Cyrillic prose).
    let ratio = high_bytes as f64 / prefix.len() as f64;
    if ratio > 0.25 {
        Encoding::Gb18030
    } else {
        Encoding::Cp1251
    }
}

/// Decodes `bytes` as `encoding` into a `String`, replacing malformed
/// sequences per `encoding_rs`'s standard replacement-character policy.
pub fn decode(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Ascii | Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Utf16Le => UTF_16LE.decode(bytes).0.into_owned(),
        Encoding::Utf16Be => UTF_16BE.decode(bytes).0.into_owned(),
        Encoding::Utf32Le => decode_utf32(bytes, true),
        Encoding::Utf32Be => decode_utf32(bytes, false),
        Encoding::Cp1251 => WINDOWS_1251.decode(bytes).0.into_owned(),
        Encoding::Big5 => BIG5.decode(bytes).0.into_owned(),
        Encoding::Gb18030 => GB18030.decode(bytes).0.into_owned(),
        Encoding::ShiftJis => SHIFT_JIS.decode(bytes).0.into_owned(),
        Encoding::Koi8R => KOI8_R.decode(bytes).0.into_owned(),
    }
}

fn decode_utf32(bytes: &[u8], little_endian: bool) -> String {
    bytes
        .chunks_exact(4)
        .filter_map(|chunk| {
            let arr = [chunk[0], chunk[1], chunk[2], chunk[3]];
            let code = if little_endian { u32::from_le_bytes(arr) } else { u32::from_be_bytes(arr) };
            char::from_u32(code)
        })
        .collect()
}

/// Expands tabs to the next multiple of `tab_stop` visible columns,
/// returning the expanded string and its visible length.
pub fn expand_tabs(line: &str, tab_stop: usize) -> (String, usize) {
    let mut out = String::with_capacity(line.len());
    let mut column = 0usize;
    for ch in line.chars() {
        if ch == '\t' {
            let spaces = tab_stop - (column % tab_stop);
            out.extend(std::iter::repeat(' ').take(spaces));
            column += spaces;
        } else {
            out.push(ch);
            column += 1;
        }
    }
    (out, column)
}

/// Visible tab-expanded length of `line` without building the expanded
/// string, so the indexer can track the running max length as it scans
/// without materializing every line's expanded form.
pub fn visible_length(line: &str, tab_stop: usize) -> usize {
    let mut column = 0usize;
    for ch in line.chars() {
        if ch == '\t' {
            column += tab_stop - (column % tab_stop);
        } else {
            column += 1;
        }
    }
    column
}
