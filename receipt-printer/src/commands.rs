//! ESC/POS command encoder
//!
//! Pure functions mapping formatting intents to the exact byte sequences a
//! thermal printer expects. Nothing here performs I/O or keeps state, and
//! nothing here fails: odd input (empty barcode data, oversized payloads)
//! yields a minimal sequence and is left for the caller to validate.

use serde::{Deserialize, Serialize};

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;
pub const FS: u8 = 0x1C;
pub const LF: u8 = 0x0A;
pub const CR: u8 = 0x0D;

/// Character size mode for `GS !`
///
/// The mode byte packs the width multiplier in the high nibble and the
/// height multiplier in the low nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSize {
    #[default]
    Normal,
    DoubleHeight,
    DoubleWidth,
    Double,
    TripleHeight,
    TripleWidth,
    Triple,
    QuadHeight,
    QuadWidth,
    Quad,
}

impl TextSize {
    pub fn mode_byte(self) -> u8 {
        match self {
            TextSize::Normal => 0x00,
            TextSize::DoubleHeight => 0x01,
            TextSize::DoubleWidth => 0x10,
            TextSize::Double => 0x11,
            TextSize::TripleHeight => 0x02,
            TextSize::TripleWidth => 0x20,
            TextSize::Triple => 0x22,
            TextSize::QuadHeight => 0x03,
            TextSize::QuadWidth => 0x30,
            TextSize::Quad => 0x33,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Font {
    #[default]
    A,
    B,
    C,
}

/// Position of the human readable text printed with a barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HriPosition {
    #[default]
    Off,
    Above,
    Below,
    Both,
}

/// Barcode symbologies (function A type codes of `GS k`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarcodeType {
    UpcA,
    UpcE,
    Ean13,
    Ean8,
    Code39,
    Itf,
    Codabar,
    Code93,
    Code128,
}

impl BarcodeType {
    pub fn code(self) -> u8 {
        match self {
            BarcodeType::UpcA => 0x41,
            BarcodeType::UpcE => 0x42,
            BarcodeType::Ean13 => 0x43,
            BarcodeType::Ean8 => 0x44,
            BarcodeType::Code39 => 0x45,
            BarcodeType::Itf => 0x46,
            BarcodeType::Codabar => 0x47,
            BarcodeType::Code93 => 0x48,
            BarcodeType::Code128 => 0x49,
        }
    }
}

/// QR error correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrCorrection {
    #[default]
    L,
    M,
    Q,
    H,
}

impl QrCorrection {
    fn byte(self) -> u8 {
        match self {
            QrCorrection::L => 0x30,
            QrCorrection::M => 0x31,
            QrCorrection::Q => 0x32,
            QrCorrection::H => 0x33,
        }
    }
}

/// Cash drawer connector pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawerPin {
    #[default]
    Pin2,
    Pin5,
}

/// Paper cut mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CutMode {
    Full,
    #[default]
    Partial,
}

// === Hardware ===

/// `ESC @` - initialize printer
pub fn init() -> [u8; 2] {
    [ESC, 0x40]
}

/// `ESC ? LF NUL` - reset printer
pub fn reset() -> [u8; 4] {
    [ESC, 0x3F, LF, 0x00]
}

/// `ESC t n` - select character code table
pub fn codepage(n: u8) -> [u8; 3] {
    [ESC, 0x74, n]
}

/// `ESC B 5 9` - beep
pub fn beep() -> [u8; 4] {
    [ESC, 0x42, 0x05, 0x09]
}

/// `ESC p m t1 t2` - cash drawer kick pulse
pub fn drawer_kick(pin: DrawerPin) -> [u8; 5] {
    let m = match pin {
        DrawerPin::Pin2 => 0x00,
        DrawerPin::Pin5 => 0x01,
    };
    [ESC, 0x70, m, 0x19, 0xFA]
}

// === Paper ===

/// `GS V m` - cut paper
pub fn cut(mode: CutMode) -> [u8; 3] {
    match mode {
        CutMode::Full => [GS, 0x56, 0x00],
        CutMode::Partial => [GS, 0x56, 0x01],
    }
}

/// `GS V 66 n` - feed n lines then full cut
pub fn cut_feed(lines: u8) -> [u8; 4] {
    [GS, 0x56, 0x42, lines]
}

/// `n` raw line feeds
pub fn line_feed(lines: usize) -> Vec<u8> {
    vec![LF; lines]
}

/// `ESC d n` - print and feed n lines
pub fn feed(lines: u8) -> [u8; 3] {
    [ESC, 0x64, lines]
}

// === Text style ===

pub fn bold(on: bool) -> [u8; 3] {
    [ESC, 0x45, on as u8]
}

pub fn underline(on: bool) -> [u8; 3] {
    [ESC, 0x2D, on as u8]
}

pub fn invert(on: bool) -> [u8; 3] {
    [GS, 0x42, on as u8]
}

/// `GS ! n` - character size
pub fn text_size(size: TextSize) -> [u8; 3] {
    [GS, 0x21, size.mode_byte()]
}

pub fn align(align: Align) -> [u8; 3] {
    let n = match align {
        Align::Left => 0x00,
        Align::Center => 0x01,
        Align::Right => 0x02,
    };
    [ESC, 0x61, n]
}

pub fn font(font: Font) -> [u8; 3] {
    let n = match font {
        Font::A => 0x00,
        Font::B => 0x01,
        Font::C => 0x02,
    };
    [ESC, 0x4D, n]
}

/// `ESC 3 n` - line spacing in 1/180 inch units
pub fn line_spacing(n: u8) -> [u8; 3] {
    [ESC, 0x33, n]
}

/// `ESC 2` - default line spacing
pub fn line_spacing_default() -> [u8; 2] {
    [ESC, 0x32]
}

/// `ESC SP 0` - default character spacing
pub fn char_spacing_default() -> [u8; 3] {
    [ESC, 0x20, 0x00]
}

// === Barcode ===

/// `GS H n` - HRI text position
pub fn barcode_hri(position: HriPosition) -> [u8; 3] {
    let n = match position {
        HriPosition::Off => 0x00,
        HriPosition::Above => 0x01,
        HriPosition::Below => 0x02,
        HriPosition::Both => 0x03,
    };
    [GS, 0x48, n]
}

/// `GS f n` - HRI font (A or B)
pub fn barcode_hri_font(font: Font) -> [u8; 3] {
    let n = if font == Font::B { 0x01 } else { 0x00 };
    [GS, 0x66, n]
}

pub fn barcode_height(n: u8) -> [u8; 3] {
    [GS, 0x68, n]
}

pub fn barcode_width(n: u8) -> [u8; 3] {
    [GS, 0x77, n]
}

/// `GS k m n d1..dn` - print a barcode
///
/// The length byte carries the low 8 bits of the payload length; the
/// device enforces its own limits.
pub fn barcode(kind: BarcodeType, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    out.extend_from_slice(&[GS, 0x6B, kind.code(), data.len() as u8]);
    out.extend_from_slice(data);
    out
}

// === QR Code ===

/// Function 165: select model (1 or 2)
pub fn qr_model(model: u8) -> [u8; 9] {
    let m = if model == 1 { 0x31 } else { 0x32 };
    [GS, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, m, 0x00]
}

/// Function 167: module size in dots
pub fn qr_size(n: u8) -> [u8; 8] {
    [GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, n]
}

/// Function 169: error correction level
pub fn qr_correction(level: QrCorrection) -> [u8; 8] {
    [GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, level.byte()]
}

/// Function 180: store data in the symbol buffer
///
/// First half of the two-step QR protocol; follow with [`qr_print`].
pub fn qr_store(data: &[u8]) -> Vec<u8> {
    let len = data.len() + 3;
    let p_l = (len % 256) as u8;
    let p_h = (len / 256) as u8;

    let mut out = Vec::with_capacity(8 + data.len());
    out.extend_from_slice(&[GS, 0x28, 0x6B, p_l, p_h, 0x31, 0x50, 0x30]);
    out.extend_from_slice(data);
    out
}

/// Function 181: print the stored symbol
pub fn qr_print() -> [u8; 8] {
    [GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]
}

// === Raster ===

/// `GS v 0` - raster bit image
///
/// `data` holds `width_bytes * height` packed rows, MSB is the leftmost dot.
pub fn raster_image(width_bytes: u16, height: u16, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + data.len());
    out.extend_from_slice(&[GS, 0x76, 0x30, 0x00]);
    out.extend_from_slice(&width_bytes.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(data);
    out
}
