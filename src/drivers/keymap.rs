//! Scan code set 1 layout tables.
//!
//! Each layout is a pair of 128-entry tables indexed by the make code
//! (bit 7 clear). A zero entry means the key produces nothing on its own
//! (modifiers, keypad keys we don't translate, unassigned codes). Bytes above
//! 0x7F are code page 437 glyphs so they render directly on the text console.

pub const ESCAPE: u8 = 27;

/// Normal and shifted translation tables for one keyboard layout.
#[derive(Debug)]
pub struct Layout {
    pub name: &'static str,
    pub normal: [u8; 128],
    pub shifted: [u8; 128],
}

impl Layout {
    /// Translate a make code. `shifted` selects the second table.
    pub fn translate(&self, code: u8, shifted: bool) -> Option<u8> {
        let table = if shifted { &self.shifted } else { &self.normal };
        match table.get(code as usize).copied() {
            Some(0) | None => None,
            Some(byte) => Some(byte),
        }
    }

    /// Whether Caps Lock applies to this code (letters only).
    pub fn is_letter(&self, code: u8) -> bool {
        self.normal
            .get(code as usize)
            .is_some_and(|b| b.is_ascii_lowercase())
    }
}

const fn pad(prefix: &[u8]) -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < prefix.len() {
        table[i] = prefix[i];
        i += 1;
    }
    table
}

/// French AZERTY, the system's native layout.
pub static AZERTY: Layout = Layout {
    name: "azerty",
    normal: pad(&[
        0, ESCAPE, b'&', 0x82, b'"', b'\'', b'(', b'-', 0x8A, b'_', 0x87, 0x85, b')', b'=', 0x08,
        b'\t', b'a', b'z', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'^', b'$', b'\n',
        0, b'q', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b'm', 0x97, b'*',
        0, b'<', b'w', b'x', b'c', b'v', b'b', b'n', b',', b';', b':', b'!', 0, 0, 0, b' ',
    ]),
    shifted: pad(&[
        0, ESCAPE, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', 0xF8, b'+', 0x08,
        b'\t', b'A', b'Z', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', 0x97, 0x9C, b'\n',
        0, b'Q', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b'M', b'%', b'`',
        0, b'>', b'W', b'X', b'C', b'V', b'B', b'N', b'?', b'.', b'/', 0x15, 0, 0, 0, b' ',
    ]),
};

/// US QWERTY.
pub static QWERTY: Layout = Layout {
    name: "qwerty",
    normal: pad(&[
        0, ESCAPE, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08,
        b'\t', b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n',
        0, b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`',
        0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
    ]),
    shifted: pad(&[
        0, ESCAPE, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08,
        b'\t', b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n',
        0, b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~',
        0, b'|', b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ',
    ]),
};

#[cfg(not(feature = "qwerty"))]
pub use self::AZERTY as DEFAULT_LAYOUT;

#[cfg(feature = "qwerty")]
pub use self::QWERTY as DEFAULT_LAYOUT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_row_positions_match_between_layouts() {
        // 0x1E is 'q' on AZERTY and 'a' on QWERTY; space is 0x39 on both.
        assert_eq!(AZERTY.translate(0x1E, false), Some(b'q'));
        assert_eq!(QWERTY.translate(0x1E, false), Some(b'a'));
        assert_eq!(AZERTY.translate(0x39, false), Some(b' '));
        assert_eq!(QWERTY.translate(0x39, true), Some(b' '));
    }

    #[test]
    fn modifiers_and_out_of_range_codes_are_unmapped() {
        assert_eq!(AZERTY.translate(0x2A, false), None);
        assert_eq!(AZERTY.translate(0x1D, true), None);
        assert_eq!(QWERTY.translate(0x7F, false), None);
        assert_eq!(QWERTY.translate(0xC0, false), None);
    }

    #[test]
    fn letters_are_detected_from_the_normal_table() {
        assert!(AZERTY.is_letter(0x10));
        assert!(!AZERTY.is_letter(0x02));
        assert!(QWERTY.is_letter(0x32));
        assert!(!QWERTY.is_letter(0x33));
    }

    #[test]
    fn build_feature_picks_the_default_layout() {
        let expected = if cfg!(feature = "qwerty") { "qwerty" } else { "azerty" };
        assert_eq!(DEFAULT_LAYOUT.name, expected);
    }
}
