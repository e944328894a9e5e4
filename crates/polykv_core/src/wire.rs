//! Byte-level encoding helpers shared by the file backends, the update
//! log, and the flat-record export format.

use crate::error::{Error, Result};

/// Bounds-checked reader over a byte slice.
pub(crate) struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let array: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::corruption("invalid u64"))?;
        Ok(u64::from_le_bytes(array))
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(Error::corruption("unexpected end of data"));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

/// Appends a `u32`-length-prefixed key/value frame.
pub(crate) fn put_frame(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
}

/// Reads one key/value frame.
pub(crate) fn read_frame(reader: &mut SliceReader<'_>) -> Result<(Vec<u8>, Vec<u8>)> {
    let klen = reader.read_u32()? as usize;
    let vlen = reader.read_u32()? as usize;
    let key = reader.read_bytes(klen)?.to_vec();
    let value = reader.read_bytes(vlen)?.to_vec();
    Ok((key, value))
}

/// Computes the CRC32 checksum (IEEE polynomial) of `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reads_in_sequence() {
        let mut data = Vec::new();
        data.push(7u8);
        data.extend_from_slice(&0xBEEF_u16.to_le_bytes());
        data.extend_from_slice(&0xDEAD_BEEF_u32.to_le_bytes());
        data.extend_from_slice(&42u64.to_le_bytes());

        let mut reader = SliceReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_u64().unwrap(), 42);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn reader_rejects_short_data() {
        let mut reader = SliceReader::new(&[1, 2]);
        assert!(matches!(
            reader.read_u32(),
            Err(Error::Corruption { .. })
        ));
    }

    #[test]
    fn frame_roundtrip() {
        let mut buf = Vec::new();
        put_frame(&mut buf, b"key", b"value with \0 bytes");
        put_frame(&mut buf, b"", b"");

        let mut reader = SliceReader::new(&buf);
        let (k, v) = read_frame(&mut reader).unwrap();
        assert_eq!(k, b"key");
        assert_eq!(v, b"value with \0 bytes");
        let (k, v) = read_frame(&mut reader).unwrap();
        assert!(k.is_empty());
        assert!(v.is_empty());
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0x0000_0000);
    }
}
