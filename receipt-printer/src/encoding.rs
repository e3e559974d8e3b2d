//! Text encoding for thermal printers
//!
//! Printers render single-byte (or GBK double-byte) text, not UTF-8.
//! A [`Codepage`] knows how to:
//! - select its code table on the printer
//! - encode a UTF-8 string into printer bytes
//! - measure a string in printed columns
//! - truncate a string to a column budget

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::commands::{self, FS};

/// Character set used for printed text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codepage {
    /// Printable ASCII only; accented Latin letters fold to their base letter
    #[default]
    Ascii,
    /// Windows-1252 (WPC1252 table on the printer)
    Latin1,
    /// GBK for Chinese printers (Chinese mode via `FS &`)
    Gbk,
}

impl Codepage {
    /// Bytes that switch the printer into this codepage
    ///
    /// Sent right after `ESC @`, which resets the code table.
    pub fn preamble(self) -> Vec<u8> {
        match self {
            // PC850 table; harmless for plain ASCII
            Codepage::Ascii => commands::codepage(2).to_vec(),
            Codepage::Latin1 => commands::codepage(16).to_vec(),
            // FS & - Chinese mode, FS C 1 - GBK
            Codepage::Gbk => vec![FS, 0x26, FS, 0x43, 0x01],
        }
    }

    /// Encode text for the printer
    ///
    /// Characters the code table lacks print as `?`.
    pub fn encode(self, s: &str) -> Vec<u8> {
        match self {
            Codepage::Ascii => sanitize_text(s).into_bytes(),
            Codepage::Latin1 => encode_replacing(encoding_rs::WINDOWS_1252, s),
            Codepage::Gbk => encode_replacing(encoding_rs::GBK, s),
        }
    }

    /// Printed width of a string in columns
    ///
    /// One column per encoded byte, so GBK characters take two.
    pub fn width(self, s: &str) -> usize {
        match self {
            Codepage::Ascii => sanitize_text(s).len(),
            Codepage::Latin1 => self.encode(s).len(),
            Codepage::Gbk => gbk_width(s),
        }
    }

    /// Truncate a string to fit within `max_width` columns
    pub fn truncate(self, s: &str, max_width: usize) -> String {
        let mut width = 0;
        let mut result = String::new();
        let mut buf = [0u8; 4];
        for c in s.chars() {
            let char_width = self.width(c.encode_utf8(&mut buf));
            if width + char_width > max_width {
                break;
            }
            result.push(c);
            width += char_width;
        }
        result
    }
}

/// Get the GBK byte width of a string
///
/// Chinese characters are 2 bytes in GBK, ASCII is 1 byte.
pub fn gbk_width(s: &str) -> usize {
    encode_replacing(encoding_rs::GBK, s).len()
}

/// `encoding_rs` writes unmappable characters as `&#NNNN;`; printers get `?`
fn encode_replacing(encoding: &'static Encoding, s: &str) -> Vec<u8> {
    let (bytes, _, had_errors) = encoding.encode(s);
    if !had_errors {
        return bytes.into_owned();
    }

    let mut out = Vec::with_capacity(s.len());
    let mut buf = [0u8; 4];
    for c in s.chars() {
        let (bytes, _, unmappable) = encoding.encode(c.encode_utf8(&mut buf));
        if unmappable {
            out.push(b'?');
        } else {
            out.extend_from_slice(&bytes);
        }
    }
    out
}

/// Reduce text to printable ASCII
///
/// Accented Latin letters lose their accent, anything else outside
/// `0x20..=0x7E` is dropped.
pub fn sanitize_text(s: &str) -> String {
    s.chars()
        .filter_map(|c| {
            let folded = fold_accent(c);
            (' '..='~').contains(&folded).then_some(folded)
        })
        .collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        // Tabs and non-breaking spaces print as plain spaces
        '\t' | '\u{a0}' => ' ',
        other => other,
    }
}
