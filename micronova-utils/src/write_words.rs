use std::io::{self, Write};

/// Write little-endian 16-bit words directly to a stream.
pub trait WriteWords: Write {
    fn write_le_u16(&mut self, val: u16) -> io::Result<()>;
    fn write_words(&mut self, words: &[u16]) -> io::Result<()>;
}

/// Everything that implements Write can also implement WriteWords.
impl<T: Write> WriteWords for T {
    fn write_le_u16(&mut self, val: u16) -> io::Result<()> {
        let buf = val.to_le_bytes();
        self.write_all(&buf)
    }

    fn write_words(&mut self, words: &[u16]) -> io::Result<()> {
        let buf: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.write_all(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_words() {
        let mut out = Vec::new();
        out.write_le_u16(0o177777).unwrap();
        out.write_words(&[0x1234, 0x0001]).unwrap();
        assert_eq!(out, vec![0xFF, 0xFF, 0x34, 0x12, 0x01, 0x00]);
    }
}
