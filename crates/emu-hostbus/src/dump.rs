//! Hex + ASCII rendering of memory dumps.

use std::fmt::Write;

use log::warn;

/// Row widths [`format_dump`] accepts.
pub const WIDTHS: [usize; 3] = [8, 16, 32];

/// Render `bytes` as rows of `ADDR  hex  |ascii|`, `width` bytes per row.
/// Widths other than 8, 16 or 32 fall back to 16.
#[must_use]
pub fn format_dump(start: u16, bytes: &[u8], width: usize) -> String {
    let width = if WIDTHS.contains(&width) {
        width
    } else {
        warn!("dump width {width} not supported, using 16");
        16
    };
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(width).enumerate() {
        let address = start.wrapping_add((row * width) as u16);
        let _ = write!(out, "{address:04X} ");
        for i in 0..width {
            match chunk.get(i) {
                Some(byte) => {
                    let _ = write!(out, " {byte:02X}");
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  |");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_ascii() {
        let text = format_dump(0x1000, b"HELLO\x00\x01world!!!", 8);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "1000  48 45 4C 4C 4F 00 01 77  |HELLO..w|");
        assert!(lines[1].starts_with("1008  6F 72 6C 64 21 21 21   "));
        assert!(lines[1].ends_with("|orld!!!|"));
    }

    #[test]
    fn unsupported_width_uses_sixteen() {
        let text = format_dump(0, &[0; 32], 12);
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn addresses_wrap() {
        let text = format_dump(0xFFF8, &[0; 16], 8);
        assert!(text.lines().nth(1).unwrap().starts_with("0000 "));
    }
}
