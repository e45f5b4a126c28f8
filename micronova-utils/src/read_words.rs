use std::io::{self, Read};

/// Read little-endian 16-bit words directly from a stream. This is the byte
/// order used by disk images for Micronova media.
pub trait ReadWords: Read {
    fn read_le_u16(&mut self) -> Result<u16, io::Error>;
    fn read_words(&mut self, buf: &mut [u16]) -> Result<usize, io::Error>;
}

/// Everything that implements Read can also implement ReadWords.
impl<T: Read> ReadWords for T {
    fn read_le_u16(&mut self) -> Result<u16, io::Error> {
        let mut buf = [0; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Fill `buf` with as many whole words as the stream can provide, returning
    /// how many were read. Hitting the end of the stream is not an error; a
    /// dangling odd byte at the end is discarded.
    fn read_words(&mut self, buf: &mut [u16]) -> Result<usize, io::Error> {
        let mut bytes = vec![0; buf.len() * 2];
        let mut filled = 0;
        while filled < bytes.len() {
            match self.read(&mut bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        let words = filled / 2;
        for (word, pair) in buf.iter_mut().zip(bytes.chunks_exact(2)).take(words) {
            *word = u16::from_le_bytes([pair[0], pair[1]]);
        }
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_le_u16() {
        let mut input = Cursor::new(vec![0x34, 0x12, 0xFF]);
        assert_eq!(input.read_le_u16().unwrap(), 0x1234);
        assert_eq!(input.read_le_u16().unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_short_read() {
        let mut input = Cursor::new(vec![0x01, 0x00, 0x02, 0x80, 0x03]);
        let mut buf = [0xFFFF; 4];
        assert_eq!(input.read_words(&mut buf).unwrap(), 2);
        assert_eq!(buf, [0x0001, 0x8002, 0xFFFF, 0xFFFF]);
    }
}
