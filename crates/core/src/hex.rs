/// Render `bytes` as a classic hex dump for packet debugging.
/// Each row shows its offset, 16 bytes in hexadecimal and an ASCII gutter.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let mut hex_part = String::new();
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => hex_part.push_str(&format!("{b:02x}")),
                None => hex_part.push_str("  "),
            }
            if i != 15 {
                hex_part.push(' ');
            }
            if i == 7 {
                hex_part.push(' ');
            }
        }

        let ascii_part: String = chunk
            .iter()
            .map(|&b| {
                if (0x20..=0x7E).contains(&b) {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();

        if row > 0 {
            out.push('\n');
        }
        out.push_str(&format!("{:04x}  {hex_part} |{ascii_part}|", row * 16));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_single_row() {
        let bytes = b"hello\x00world\xff";
        assert_eq!(
            hex_dump(bytes),
            "0000  68 65 6c 6c 6f 00 77 6f  72 6c 64 ff             |hello.world.|"
        );
    }

    #[test]
    fn second_row_has_offset() {
        let bytes = [0x41u8; 17];
        let dump = hex_dump(&bytes);
        let rows: Vec<_> = dump.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].starts_with("0010  41 "));
        assert!(rows[1].ends_with("|A|"));
    }

    #[test]
    fn empty_input() {
        assert_eq!(hex_dump(&[]), "");
    }
}
