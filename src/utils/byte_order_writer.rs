/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT
*/
use super::Endianness;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use std::io::prelude::*;
use std::io::{Result, SeekFrom};

/// A positioned writer over a seekable byte stream with a switchable byte
/// order. Tracks the furthest byte written so that file lengths remain
/// known after seeking back to patch headers.
pub struct ByteOrderWriter<W: Write + Seek> {
    is_le: bool,
    writer: W,
    pos: usize,
    len: usize,
}

impl<W: Write + Seek> ByteOrderWriter<W> {
    pub fn new(writer: W, byte_order: Endianness) -> ByteOrderWriter<W> {
        ByteOrderWriter {
            is_le: byte_order == Endianness::LittleEndian,
            writer,
            pos: 0,
            len: 0,
        }
    }

    pub fn set_byte_order(&mut self, byte_order: Endianness) {
        self.is_le = byte_order == Endianness::LittleEndian;
    }

    pub fn seek_from_start(&mut self, loc: u64) -> Result<()> {
        self.writer.seek(SeekFrom::Start(loc))?;
        self.pos = loc as usize;
        Ok(())
    }

    pub fn seek_end(&mut self) -> Result<()> {
        let p = self.writer.seek(SeekFrom::End(0))?;
        self.pos = p as usize;
        Ok(())
    }

    /// The current write position.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The number of bytes in the stream, i.e. the furthest position
    /// written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
        if self.pos > self.len {
            self.len = self.pos;
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.advance(1);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.advance(bytes.len());
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        if self.is_le {
            self.writer.write_u16::<LittleEndian>(value)?;
        } else {
            self.writer.write_u16::<BigEndian>(value)?;
        }
        self.advance(2);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        if self.is_le {
            self.writer.write_u32::<LittleEndian>(value)?;
        } else {
            self.writer.write_u32::<BigEndian>(value)?;
        }
        self.advance(4);
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        if self.is_le {
            self.writer.write_i32::<LittleEndian>(value)?;
        } else {
            self.writer.write_i32::<BigEndian>(value)?;
        }
        self.advance(4);
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        if self.is_le {
            self.writer.write_f64::<LittleEndian>(value)?;
        } else {
            self.writer.write_f64::<BigEndian>(value)?;
        }
        self.advance(8);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod test {
    use super::ByteOrderWriter;
    use crate::utils::Endianness;
    use std::io::Cursor;

    #[test]
    fn test_write_and_patch() {
        let mut bow = ByteOrderWriter::new(Cursor::new(Vec::new()), Endianness::BigEndian);
        bow.write_i32(0).unwrap();
        bow.write_i32(42).unwrap();
        assert_eq!(bow.len(), 8);
        // patch the first word without disturbing the recorded length
        bow.seek_from_start(0).unwrap();
        bow.write_i32(9994).unwrap();
        assert_eq!(bow.len(), 8);
        bow.seek_end().unwrap();
        assert_eq!(bow.pos(), 8);
        let data = bow.into_inner().into_inner();
        assert_eq!(data, vec![0x00, 0x00, 0x27, 0x0A, 0x00, 0x00, 0x00, 0x2A]);
    }

    #[test]
    fn test_little_endian_f64() {
        let mut bow = ByteOrderWriter::new(Cursor::new(Vec::new()), Endianness::LittleEndian);
        bow.write_f64(1.5).unwrap();
        let data = bow.into_inner().into_inner();
        assert_eq!(data, 1.5f64.to_le_bytes().to_vec());
    }
}
