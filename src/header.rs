/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT
*/
use crate::error::{Result, ShapefileError};
use crate::geometry::{measure_from_raw, ShapeType};
use crate::utils::{ByteOrderReader, ByteOrderWriter, Endianness};
use std::fmt;
use std::io::{Read, Seek, Write};

/// The shp and shx magic number.
pub(crate) const FILE_CODE: i32 = 9994;
/// The only version ever issued.
pub(crate) const FILE_VERSION: i32 = 1000;
/// Both headers are exactly 100 bytes.
pub(crate) const HEADER_LENGTH: usize = 100;

/// The fixed 100-byte header shared by the .shp and .shx files. The two
/// differ only in what the file-length word counts.
#[derive(Debug, Default, Clone)]
pub struct ShapefileHeader {
    pub file_code: i32,        // BigEndian; value is 9994
    pub file_length: i32,      // BigEndian; in 16-bit words, header included
    pub version: i32,          // LittleEndian
    pub shape_type: ShapeType, // LittleEndian
    pub x_min: f64,            // LittleEndian
    pub y_min: f64,            // LittleEndian
    pub x_max: f64,            // LittleEndian
    pub y_max: f64,            // LittleEndian
    pub z_min: f64,            // LittleEndian; 0 unless the type carries z
    pub z_max: f64,            // LittleEndian; 0 unless the type carries z
    pub m_min: f64,            // LittleEndian; 0 unless the type carries m
    pub m_max: f64,            // LittleEndian; 0 unless the type carries m
}

impl ShapefileHeader {
    /// Parses and validates a header from the start of a stream.
    pub(crate) fn read<R: Read + Seek>(bor: &mut ByteOrderReader<R>) -> Result<ShapefileHeader> {
        if bor.len() < HEADER_LENGTH {
            return Err(ShapefileError::MalformedFile(format!(
                "file is only {} bytes, shorter than the {}-byte header",
                bor.len(),
                HEADER_LENGTH
            )));
        }
        let mut header = ShapefileHeader::default();
        bor.seek(0)?;
        bor.set_byte_order(Endianness::BigEndian);
        header.file_code = bor.read_i32()?;
        if header.file_code != FILE_CODE {
            return Err(ShapefileError::MalformedFile(format!(
                "bad file code {}, expected {}",
                header.file_code, FILE_CODE
            )));
        }
        bor.seek(24)?;
        header.file_length = bor.read_i32()?;

        // the rest of the header is in LittleEndian format
        bor.set_byte_order(Endianness::LittleEndian);
        header.version = bor.read_i32()?;
        let st = bor.read_i32()?;
        header.shape_type = ShapeType::from_int(st).ok_or_else(|| {
            ShapefileError::MalformedFile(format!("unrecognized shape type {} in header", st))
        })?;

        // bounding box
        header.x_min = bor.read_f64()?;
        header.y_min = bor.read_f64()?;
        header.x_max = bor.read_f64()?;
        header.y_max = bor.read_f64()?;
        header.z_min = bor.read_f64()?;
        header.z_max = bor.read_f64()?;
        header.m_min = bor.read_f64()?;
        header.m_max = bor.read_f64()?;
        Ok(header)
    }

    /// Writes the header at the start of a stream, leaving the write
    /// position at byte 100.
    pub(crate) fn write<W: Write + Seek>(&self, bow: &mut ByteOrderWriter<W>) -> Result<()> {
        bow.seek_from_start(0)?;
        bow.set_byte_order(Endianness::BigEndian);
        bow.write_i32(FILE_CODE)?;
        // unused header bytes
        for _ in 0..5 {
            bow.write_i32(0)?;
        }
        bow.write_i32(self.file_length)?;
        bow.set_byte_order(Endianness::LittleEndian);
        bow.write_i32(FILE_VERSION)?;
        bow.write_i32(self.shape_type.to_int())?;
        bow.write_f64(self.x_min)?;
        bow.write_f64(self.y_min)?;
        bow.write_f64(self.x_max)?;
        bow.write_f64(self.y_max)?;
        bow.write_f64(self.z_min)?;
        bow.write_f64(self.z_max)?;
        bow.write_f64(self.m_min)?;
        bow.write_f64(self.m_max)?;
        Ok(())
    }

    /// The measure extremes, with the no-data sentinel mapped to `None`.
    pub fn m_range(&self) -> [Option<f64>; 2] {
        [measure_from_raw(self.m_min), measure_from_raw(self.m_max)]
    }
}

impl fmt::Display for ShapefileHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "file_code: {}
file_length: {}
version: {}
shape_type: {}
x_min: {}
x_max: {}
y_min: {}
y_max: {}
z_min: {}
z_max: {}
m_min: {}
m_max: {}",
            self.file_code,
            self.file_length,
            self.version,
            self.shape_type,
            self.x_min,
            self.x_max,
            self.y_min,
            self.y_max,
            self.z_min,
            self.z_max,
            self.m_min,
            self.m_max
        )
    }
}

#[cfg(test)]
mod test {
    use super::{ShapefileHeader, FILE_CODE, FILE_VERSION, HEADER_LENGTH};
    use crate::geometry::ShapeType;
    use crate::utils::{ByteOrderReader, ByteOrderWriter, Endianness};
    use std::io::Cursor;

    #[test]
    fn test_header_round_trip() {
        let header = ShapefileHeader {
            file_code: FILE_CODE,
            file_length: 64,
            version: FILE_VERSION,
            shape_type: ShapeType::PolyLineZ,
            x_min: -1.5,
            y_min: 0.0,
            x_max: 10.25,
            y_max: 20.0,
            z_min: 1.0,
            z_max: 2.0,
            m_min: 0.0,
            m_max: 9.0,
        };
        let mut bow = ByteOrderWriter::new(Cursor::new(Vec::new()), Endianness::BigEndian);
        header.write(&mut bow).unwrap();
        assert_eq!(bow.len(), HEADER_LENGTH);

        let data = bow.into_inner().into_inner();
        let mut bor = ByteOrderReader::new(Cursor::new(data), Endianness::BigEndian).unwrap();
        let read_back = ShapefileHeader::read(&mut bor).unwrap();
        assert_eq!(read_back.file_length, 64);
        assert_eq!(read_back.shape_type, ShapeType::PolyLineZ);
        assert_eq!(read_back.x_min, -1.5);
        assert_eq!(read_back.m_max, 9.0);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let data = vec![0u8; 100];
        let mut bor = ByteOrderReader::new(Cursor::new(data), Endianness::BigEndian).unwrap();
        assert!(ShapefileHeader::read(&mut bor).is_err());
    }

    #[test]
    fn test_short_file_rejected() {
        let data = vec![0u8; 50];
        let mut bor = ByteOrderReader::new(Cursor::new(data), Endianness::BigEndian).unwrap();
        assert!(ShapefileHeader::read(&mut bor).is_err());
    }
}
