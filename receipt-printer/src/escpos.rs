//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data on top of the
//! [`commands`](crate::commands) encoder and a [`TextLayout`].

use crate::commands::{
    self, Align, BarcodeType, CutMode, DrawerPin, Font, HriPosition, QrCorrection, TextSize,
};
use crate::encoding::Codepage;
use crate::layout::TextLayout;

/// ESC/POS command builder
///
/// Text is encoded with the layout's codepage as it is written, so the
/// buffer is always ready to send.
pub struct EscPosBuilder {
    buf: Vec<u8>,
    layout: TextLayout,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in characters
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub fn new(width: usize) -> Self {
        Self::with_layout(TextLayout::new(width, Codepage::default()))
    }

    /// Create a builder for a layout, emitting `ESC @` and the codepage selection
    pub fn with_layout(layout: TextLayout) -> Self {
        let mut buf = Vec::with_capacity(4096);
        buf.extend_from_slice(&commands::init());
        buf.extend_from_slice(&layout.codepage().preamble());
        Self { buf, layout }
    }

    pub fn layout(&self) -> &TextLayout {
        &self.layout
    }

    /// Get the configured paper width
    pub fn width(&self) -> usize {
        self.layout.width()
    }

    // === Text Output ===

    /// Write encoded text
    pub fn text(&mut self, s: &str) -> &mut Self {
        let encoded = self.layout.codepage().encode(s);
        self.buf.extend_from_slice(&encoded);
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(commands::LF);
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(commands::LF);
        self
    }

    /// Write `lines` raw line feeds
    pub fn line_feed(&mut self, lines: usize) -> &mut Self {
        self.buf.extend_from_slice(&commands::line_feed(lines));
        self
    }

    /// Print and feed n lines (ESC d n)
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&commands::feed(lines));
        self
    }

    // === Alignment ===

    pub fn align(&mut self, align: Align) -> &mut Self {
        self.buf.extend_from_slice(&commands::align(align));
        self
    }

    pub fn center(&mut self) -> &mut Self {
        self.align(Align::Center)
    }

    pub fn left(&mut self) -> &mut Self {
        self.align(Align::Left)
    }

    pub fn right(&mut self) -> &mut Self {
        self.align(Align::Right)
    }

    // === Text Style ===

    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&commands::bold(true));
        self
    }

    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&commands::bold(false));
        self
    }

    pub fn underline(&mut self, on: bool) -> &mut Self {
        self.buf.extend_from_slice(&commands::underline(on));
        self
    }

    pub fn invert(&mut self, on: bool) -> &mut Self {
        self.buf.extend_from_slice(&commands::invert(on));
        self
    }

    pub fn font(&mut self, font: Font) -> &mut Self {
        self.buf.extend_from_slice(&commands::font(font));
        self
    }

    pub fn size(&mut self, size: TextSize) -> &mut Self {
        self.buf.extend_from_slice(&commands::text_size(size));
        self
    }

    /// Double width and height
    pub fn double_size(&mut self) -> &mut Self {
        self.size(TextSize::Double)
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.size(TextSize::Normal)
    }

    // === Separators ===

    /// Print a line of '=' characters
    pub fn sep_double(&mut self) -> &mut Self {
        let line = self.layout.divider('=');
        self.line(&line)
    }

    /// Print a line of '-' characters
    pub fn sep_single(&mut self) -> &mut Self {
        let line = self.layout.divider('-');
        self.line(&line)
    }

    // === Layout Helpers ===

    /// Print text padded to the middle of the line
    pub fn line_center(&mut self, s: &str) -> &mut Self {
        let line = self.layout.center(s);
        self.line(&line)
    }

    /// Print left and right text on the same line
    pub fn line_lr(&mut self, left: &str, right: &str) -> &mut Self {
        let line = self.layout.align_both(left, right);
        self.line(&line)
    }

    // === Paper Control ===

    pub fn cut(&mut self, mode: CutMode) -> &mut Self {
        self.buf.extend_from_slice(&commands::cut(mode));
        self
    }

    /// Full cut after feeding n lines (GS V 66 n)
    pub fn cut_feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&commands::cut_feed(lines));
        self
    }

    // === Peripherals ===

    pub fn open_drawer(&mut self, pin: DrawerPin) -> &mut Self {
        self.buf.extend_from_slice(&commands::drawer_kick(pin));
        self
    }

    pub fn beep(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&commands::beep());
        self
    }

    // === Barcode / QR ===

    /// Print a barcode with HRI text below
    pub fn barcode(&mut self, kind: BarcodeType, data: &str, height: u8) -> &mut Self {
        self.buf
            .extend_from_slice(&commands::barcode_hri(HriPosition::Below));
        self.buf.extend_from_slice(&commands::barcode_height(height));
        self.buf.extend_from_slice(&commands::barcode(kind, data.as_bytes()));
        self.buf.push(commands::LF);
        self
    }

    /// Print a QR code (model 2)
    ///
    /// Size: 1-16 (module size in dots)
    pub fn qr_code(&mut self, data: &str, size: u8, correction: QrCorrection) -> &mut Self {
        let size = size.clamp(1, 16);
        self.buf.extend_from_slice(&commands::qr_model(2));
        self.buf.extend_from_slice(&commands::qr_size(size));
        self.buf
            .extend_from_slice(&commands::qr_correction(correction));
        self.buf
            .extend_from_slice(&commands::qr_store(data.as_bytes()));
        self.buf.extend_from_slice(&commands::qr_print());
        self
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    // === Build ===

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(48)
    }
}
