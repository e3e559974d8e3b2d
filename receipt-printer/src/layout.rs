//! Fixed-width text layout
//!
//! Thermal receipts are laid out on a grid of `width` columns
//! (32 for 58mm rolls, 42-48 for 80mm rolls). Widths are measured in
//! printed columns of the active [`Codepage`].

use crate::encoding::Codepage;

#[derive(Debug, Clone, Copy)]
pub struct TextLayout {
    width: usize,
    codepage: Codepage,
}

impl TextLayout {
    pub fn new(width: usize, codepage: Codepage) -> Self {
        Self { width, codepage }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn codepage(&self) -> Codepage {
        self.codepage
    }

    /// Center text by left padding
    ///
    /// Text at least as wide as the line is truncated to the line width.
    /// No right padding is added.
    pub fn center(&self, text: &str) -> String {
        let len = self.codepage.width(text);
        if len >= self.width {
            return self.codepage.truncate(text, self.width);
        }
        let pad = (self.width - len) / 2;
        format!("{}{}", " ".repeat(pad), text)
    }

    /// Left text flush left, right text flush right
    ///
    /// When both do not fit they are concatenated as-is; neither side is cut.
    pub fn align_both(&self, left: &str, right: &str) -> String {
        let lw = self.codepage.width(left);
        let rw = self.codepage.width(right);
        if lw + rw >= self.width {
            return format!("{}{}", left, right);
        }
        let spaces = self.width - lw - rw;
        format!("{}{}{}", left, " ".repeat(spaces), right)
    }

    /// A full line of `ch`
    pub fn divider(&self, ch: char) -> String {
        std::iter::repeat_n(ch, self.width).collect()
    }

    /// Greedy word wrap to `max_width` columns
    ///
    /// Words longer than a line are kept whole on their own line.
    pub fn wrap(&self, text: &str, max_width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();
        let mut current_width = 0;

        for word in text.split_whitespace() {
            let word_width = self.codepage.width(word);
            if current.is_empty() {
                current.push_str(word);
                current_width = word_width;
            } else if current_width + 1 + word_width <= max_width {
                current.push(' ');
                current.push_str(word);
                current_width += 1 + word_width;
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
                current_width = word_width;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
        if lines.is_empty() {
            lines.push(String::new());
        }
        lines
    }
}

impl Default for TextLayout {
    fn default() -> Self {
        Self::new(48, Codepage::Ascii)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(width: usize) -> TextLayout {
        TextLayout::new(width, Codepage::Ascii)
    }

    #[test]
    fn test_center_padding() {
        let l = layout(48);
        let long = "x".repeat(47);
        for text in ["", "a", "TOTAL", "Order #1024", long.as_str()] {
            let line = l.center(text);
            let pad = (48 - text.len()) / 2;
            assert_eq!(line, format!("{}{}", " ".repeat(pad), text));
        }
    }

    #[test]
    fn test_center_odd_width() {
        assert_eq!(layout(11).center("abcd"), "   abcd");
    }

    #[test]
    fn test_center_truncates() {
        let l = layout(10);
        assert_eq!(l.center("0123456789"), "0123456789");
        assert_eq!(l.center("0123456789abc"), "0123456789");
    }

    #[test]
    fn test_align_both_gap() {
        let l = layout(42);
        for (left, right) in [("(2) Burger", "R$ 29,90"), ("", "x"), ("TOTAL:", "")] {
            let line = l.align_both(left, right);
            let gap = 42 - left.len() - right.len();
            assert_eq!(line, format!("{}{}{}", left, " ".repeat(gap), right));
            assert_eq!(line.len(), 42);
        }
    }

    #[test]
    fn test_align_both_overflow_concatenates() {
        let l = layout(10);
        assert_eq!(l.align_both("123456", "7890"), "1234567890");
        assert_eq!(l.align_both("Long item name", "9,99"), "Long item name9,99");
    }

    #[test]
    fn test_align_both_gbk_width() {
        let l = TextLayout::new(12, Codepage::Gbk);
        // 4 GBK chars = 8 columns, "x2" = 2 columns
        assert_eq!(l.align_both("宫保鸡丁", "x2"), "宫保鸡丁  x2");
    }

    #[test]
    fn test_divider() {
        assert_eq!(layout(5).divider('='), "=====");
        assert_eq!(layout(3).divider('-'), "---");
    }

    #[test]
    fn test_wrap() {
        let l = layout(48);
        assert_eq!(
            l.wrap("Rua das Flores 123 apto 45", 12),
            vec!["Rua das", "Flores 123", "apto 45"]
        );
        assert_eq!(l.wrap("", 10), vec![""]);
        assert_eq!(l.wrap("supercalifragilistic", 5), vec!["supercalifragilistic"]);
    }
}
