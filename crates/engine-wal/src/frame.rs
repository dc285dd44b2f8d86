//! Record framing shared by the reader and the writer.

use std::io::{self, Read};

/// `len (4) + crc32 (4)`.
pub const HEADER_SIZE: usize = 8;

/// Largest payload a reader accepts unless configured otherwise (4 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 4 << 20;

pub(crate) fn encode_header(payload: &[u8]) -> [u8; HEADER_SIZE] {
    let mut hdr = [0u8; HEADER_SIZE];
    hdr[0..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    hdr[4..8].copy_from_slice(&crc32fast::hash(payload).to_le_bytes());
    hdr
}

/// `(payload length, crc)`
pub(crate) fn decode_header(hdr: &[u8; HEADER_SIZE]) -> (usize, u32) {
    let mut len = [0u8; 4];
    let mut crc = [0u8; 4];
    len.copy_from_slice(&hdr[0..4]);
    crc.copy_from_slice(&hdr[4..8]);
    (u32::from_le_bytes(len) as usize, u32::from_le_bytes(crc))
}

pub(crate) fn checksum_ok(payload: &[u8], crc: u32) -> bool {
    crc32fast::hash(payload) == crc
}

/// Like `read_exact`, but reports how many bytes were read before EOF
/// so a clean end (0) can be told apart from a torn record.
pub(crate) fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_len_then_crc() {
        let hdr = encode_header(b"abc");
        assert_eq!(&hdr[0..4], &3u32.to_le_bytes());
        assert_eq!(&hdr[4..8], &crc32fast::hash(b"abc").to_le_bytes());
        assert_eq!(decode_header(&hdr), (3, crc32fast::hash(b"abc")));
    }

    #[test]
    fn read_full_reports_short_reads() {
        let mut src: &[u8] = b"12345";
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut src, &mut buf).unwrap(), 5);
        assert_eq!(read_full(&mut src, &mut buf).unwrap(), 0);
    }
}
