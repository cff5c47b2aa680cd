/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT

Notes: The reader opens any subset of the shp/shx/dbf triplet, parses the
headers eagerly, and reads record bodies on demand. Random access to
shapes goes through the shx index when present; otherwise an offset table
is built by scanning the shp, amortized across calls.
*/
use crate::attributes::{
    parse_field_value, AttributeField, AttributeHeader, FieldLookup, FieldType, Record,
};
use crate::encoding::{EncodingErrors, TextEncoding};
use crate::error::{Result, ShapefileError};
use crate::geometry::{measure_from_raw, PartType, Shape, ShapeType};
use crate::header::{ShapefileHeader, HEADER_LENGTH};
use crate::structures::{BoundingBox, Point2D};
use crate::utils::{ByteOrderReader, Endianness};
use log::warn;
use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

/// Options accepted when constructing a [`Reader`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Text encoding label for the dbf, e.g. `utf-8` or `cp1252`. When
    /// unset, a readable `.cpg` sidecar wins, then UTF-8.
    pub encoding: Option<String>,
    pub encoding_errors: EncodingErrors,
    /// Gates non-fatal warnings.
    pub verbose: bool,
}

impl Default for ReaderOptions {
    fn default() -> ReaderOptions {
        ReaderOptions {
            encoding: None,
            encoding_errors: EncodingErrors::Strict,
            verbose: true,
        }
    }
}

/// A geometry together with its attribute row, sharing one oid.
#[derive(Debug, Clone)]
pub struct ShapeRecord {
    pub shape: Shape,
    pub record: Record,
}

/// Streaming reader over the shapefile triplet. Any subset of the three
/// files may be supplied, as long as at least one of shp and dbf is
/// present.
pub struct Reader<R: Read + Seek> {
    shp: Option<ByteOrderReader<R>>,
    shx: Option<ByteOrderReader<R>>,
    dbf: Option<ByteOrderReader<R>>,
    header: Option<ShapefileHeader>,
    num_shapes: Option<usize>,
    offsets: Vec<usize>,
    scan_pos: usize,
    shx_offsets_loaded: bool,
    dbf_header: AttributeHeader,
    num_records: Option<usize>,
    fields: Vec<AttributeField>,
    lookup: Arc<FieldLookup>,
    encoding: TextEncoding,
    verbose: bool,
    projection: String,
}

/// Per-iteration plan describing which fields of a row to materialize.
/// Skipped fields are still advanced over by their fixed width.
pub(crate) struct RecordProjection {
    wanted: Vec<bool>,
    lookup: Arc<FieldLookup>,
}

impl<R: Read + Seek> Reader<R> {
    /// Constructs a reader over in-memory or file streams. Headers of
    /// whichever streams are present are parsed immediately; bodies are
    /// not touched.
    pub fn new(
        shp: Option<R>,
        shx: Option<R>,
        dbf: Option<R>,
        options: ReaderOptions,
    ) -> Result<Reader<R>> {
        if shp.is_none() && dbf.is_none() {
            return Err(ShapefileError::Schema(
                "a reader requires at least a shp or dbf stream".to_string(),
            ));
        }
        let encoding = TextEncoding::new(
            options.encoding.as_deref().unwrap_or("utf-8"),
            options.encoding_errors,
        )?;

        let mut shp = match shp {
            Some(f) => Some(ByteOrderReader::new(f, Endianness::BigEndian)?),
            None => None,
        };
        let mut shx = match shx {
            Some(f) => Some(ByteOrderReader::new(f, Endianness::BigEndian)?),
            None => None,
        };
        let mut dbf = match dbf {
            Some(f) => Some(ByteOrderReader::new(f, Endianness::LittleEndian)?),
            None => None,
        };

        let header = match shp.as_mut() {
            Some(bor) => Some(ShapefileHeader::read(bor)?),
            None => None,
        };

        let num_shapes = match shx.as_mut() {
            Some(bor) => {
                let shx_header = ShapefileHeader::read(bor)?;
                let body = (shx_header.file_length as usize)
                    .saturating_mul(2)
                    .saturating_sub(HEADER_LENGTH);
                Some(body / 8)
            }
            None => None,
        };

        let (dbf_header, fields, num_records) = match dbf.as_mut() {
            Some(bor) => {
                let (hdr, fields) = read_dbf_header(bor, &encoding, options.verbose)?;
                let n = hdr.num_records as usize;
                (hdr, fields, Some(n))
            }
            None => (AttributeHeader::default(), vec![], None),
        };

        let lookup = Arc::new(FieldLookup::from_names(
            fields.iter().skip(1).map(|f| f.name.clone()).collect(),
        ));

        Ok(Reader {
            shp,
            shx,
            dbf,
            header,
            num_shapes,
            offsets: vec![],
            scan_pos: HEADER_LENGTH,
            shx_offsets_loaded: false,
            dbf_header,
            num_records,
            fields,
            lookup,
            encoding,
            verbose: options.verbose,
            projection: String::new(),
        })
    }

    /// The number of records when a dbf is present, otherwise the number
    /// of shapes. Without an shx the shape count may require one linear
    /// scan of the shp.
    pub fn len(&mut self) -> Result<usize> {
        if self.dbf.is_some() {
            return Ok(self.num_records.unwrap_or(0));
        }
        if let Some(n) = self.num_shapes {
            return Ok(n);
        }
        let mut i = self.offsets.len();
        while self.ensure_offset(i)? {
            i += 1;
        }
        Ok(self.num_shapes.unwrap_or(self.offsets.len()))
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The shp header, when a shp stream was supplied.
    pub fn header(&self) -> Option<&ShapefileHeader> {
        self.header.as_ref()
    }

    pub fn shape_type(&self) -> ShapeType {
        self.header
            .as_ref()
            .map(|h| h.shape_type)
            .unwrap_or(ShapeType::Null)
    }

    pub fn shape_type_name(&self) -> String {
        self.shape_type().to_string()
    }

    /// The file-level XY bounding box from the shp header.
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.header
            .as_ref()
            .map(|h| BoundingBox::new(h.x_min, h.y_min, h.x_max, h.y_max))
    }

    /// The file-level elevation extremes from the shp header.
    pub fn z_range(&self) -> Option<[f64; 2]> {
        self.header.as_ref().map(|h| [h.z_min, h.z_max])
    }

    /// The file-level measure extremes, with no-data mapped to `None`.
    pub fn m_range(&self) -> Option<[Option<f64>; 2]> {
        self.header.as_ref().map(|h| h.m_range())
    }

    /// The dbf field descriptors, led by the synthetic DeletionFlag.
    pub fn fields(&self) -> &[AttributeField] {
        &self.fields
    }

    pub fn num_records(&self) -> Option<usize> {
        self.num_records
    }

    /// The number of shapes, when already known from the shx header or a
    /// completed scan.
    pub fn num_shapes(&self) -> Option<usize> {
        self.num_shapes
    }

    pub fn encoding(&self) -> &TextEncoding {
        &self.encoding
    }

    /// The contents of the .prj sidecar, when the reader was opened from
    /// a path and the file existed. Opaque WKT text.
    pub fn projection(&self) -> &str {
        &self.projection
    }

    /// Makes sure `offsets[i]` is known. Returns false when the file
    /// holds no shape `i`. Populates the table from the shx when one is
    /// present, otherwise by scanning record headers in the shp.
    fn ensure_offset(&mut self, i: usize) -> Result<bool> {
        if i < self.offsets.len() {
            return Ok(true);
        }
        if let Some(n) = self.num_shapes {
            if i >= n && (self.shx_offsets_loaded || self.shx.is_none()) {
                return Ok(false);
            }
        }
        if let Some(shx) = self.shx.as_mut() {
            if !self.shx_offsets_loaded {
                let n = self.num_shapes.unwrap_or(0);
                shx.seek(HEADER_LENGTH)?;
                shx.set_byte_order(Endianness::BigEndian);
                self.offsets.reserve(n);
                for _ in 0..n {
                    let offset_words = shx.read_i32()?;
                    let _content_words = shx.read_i32()?;
                    self.offsets.push(offset_words as usize * 2);
                }
                self.shx_offsets_loaded = true;
            }
            return Ok(i < self.offsets.len());
        }
        // no index file; scan forward from where the last scan stopped
        let shp = self.shp.as_mut().ok_or_else(|| {
            ShapefileError::Schema("shape access requires a shp stream".to_string())
        })?;
        // the header's file length is not trusted here, since files with
        // wrong lengths exist in the wild; the measured stream length
        // bounds the scan instead
        let shp_len = shp.len();
        while self.offsets.len() <= i && self.scan_pos + 8 <= shp_len {
            shp.seek(self.scan_pos)?;
            shp.set_byte_order(Endianness::BigEndian);
            let _rec_num = shp.read_i32()?;
            let content_words = shp.read_i32()?;
            self.offsets.push(self.scan_pos);
            self.scan_pos += 8 + 2 * content_words.max(0) as usize;
        }
        if self.scan_pos + 8 > shp_len {
            self.num_shapes = Some(self.offsets.len());
        }
        Ok(i < self.offsets.len())
    }

    fn read_shape_at(
        &mut self,
        offset: usize,
        oid: i32,
        bbox: Option<BoundingBox>,
    ) -> Result<Option<Shape>> {
        let verbose = self.verbose;
        let shp = self.shp.as_mut().ok_or_else(|| {
            ShapefileError::Schema("shape access requires a shp stream".to_string())
        })?;
        shp.seek(offset)?;
        read_shape_record(shp, oid, bbox, verbose)
    }

    /// Random access to the shape with the given oid.
    pub fn shape(&mut self, i: usize) -> Result<Shape> {
        if !self.ensure_offset(i)? {
            return Err(ShapefileError::OutOfRange(format!(
                "shape index {} out of range",
                i
            )));
        }
        let offset = self.offsets[i];
        // no bbox filter here, so a shape is always produced
        self.read_shape_at(offset, i as i32, None)?.ok_or_else(|| {
            ShapefileError::MalformedFile(format!("record {} could not be decoded", i))
        })
    }

    pub(crate) fn build_projection(&self, fields: Option<&[&str]>) -> Result<RecordProjection> {
        if self.dbf.is_none() {
            return Err(ShapefileError::Schema(
                "record access requires a dbf stream".to_string(),
            ));
        }
        let user_fields = &self.fields[1..];
        match fields {
            None => Ok(RecordProjection {
                wanted: vec![true; user_fields.len()],
                lookup: self.lookup.clone(),
            }),
            Some(requested) => {
                for name in requested {
                    if self.lookup.position(name).is_none() {
                        return Err(ShapefileError::Value(format!(
                            "'{}' is not a valid field name",
                            name
                        )));
                    }
                }
                let wanted: Vec<bool> = user_fields
                    .iter()
                    .map(|f| requested.contains(&f.name.as_str()))
                    .collect();
                // the subset keeps the field order of the dbf schema
                let names = user_fields
                    .iter()
                    .zip(wanted.iter())
                    .filter(|(_, w)| **w)
                    .map(|(f, _)| f.name.clone())
                    .collect();
                Ok(RecordProjection {
                    wanted,
                    lookup: Arc::new(FieldLookup::from_names(names)),
                })
            }
        }
    }

    fn read_record_at(&mut self, i: usize, projection: &RecordProjection) -> Result<Record> {
        let num_records = self.num_records.unwrap_or(0);
        if i >= num_records {
            return Err(ShapefileError::OutOfRange(format!(
                "record index {} out of range, the dbf holds {} records",
                i, num_records
            )));
        }
        let header_len = self.dbf_header.bytes_in_header as usize;
        let record_len = self.dbf_header.bytes_in_record as usize;
        let encoding = self.encoding;
        let verbose = self.verbose;
        let dbf = self.dbf.as_mut().ok_or_else(|| {
            ShapefileError::Schema("record access requires a dbf stream".to_string())
        })?;
        dbf.seek(header_len + i * record_len)?;
        let row = dbf.read_bytes(record_len)?;

        // the leading byte is the deletion flag; deleted rows are decoded
        // like any other and the flag is not exposed
        let mut pos = 1usize;
        let mut values = Vec::with_capacity(projection.lookup.names().len());
        for (field, wanted) in self.fields[1..].iter().zip(projection.wanted.iter()) {
            let width = field.field_length as usize;
            if pos + width > row.len() {
                return Err(ShapefileError::MalformedFile(format!(
                    "dbf record {} is shorter than its declared fields",
                    i
                )));
            }
            if *wanted {
                values.push(parse_field_value(
                    &row[pos..pos + width],
                    field,
                    &encoding,
                    verbose,
                )?);
            }
            pos += width;
        }
        Ok(Record::new(i as i32, values, projection.lookup.clone()))
    }

    /// Random access to the record with the given oid.
    pub fn record(&mut self, i: usize) -> Result<Record> {
        let projection = self.build_projection(None)?;
        self.read_record_at(i, &projection)
    }

    /// Random access restricted to a subset of fields, in schema order.
    pub fn record_with_fields(&mut self, i: usize, fields: &[&str]) -> Result<Record> {
        let projection = self.build_projection(Some(fields))?;
        self.read_record_at(i, &projection)
    }

    /// The shape/record pair with the given oid.
    pub fn shape_record(&mut self, i: usize) -> Result<ShapeRecord> {
        let shape = self.shape(i)?;
        let record = self.record(i)?;
        Ok(ShapeRecord { shape, record })
    }

    /// Iterates shapes in ascending oid order. With a bounding box, only
    /// shapes whose stored box intersects it (inclusive on all sides)
    /// are yielded; Null shapes are always skipped by the filter.
    pub fn iter_shapes(&mut self, bbox: Option<BoundingBox>) -> Result<ShapeIter<'_, R>> {
        if self.shp.is_none() {
            return Err(ShapefileError::Schema(
                "shape access requires a shp stream".to_string(),
            ));
        }
        Ok(ShapeIter {
            reader: self,
            index: 0,
            stop: None,
            bbox,
        })
    }

    /// Iterates shapes over the half-open index range `start..stop`.
    pub fn iter_shapes_range(
        &mut self,
        start: usize,
        stop: usize,
        bbox: Option<BoundingBox>,
    ) -> Result<ShapeIter<'_, R>> {
        if self.shp.is_none() {
            return Err(ShapefileError::Schema(
                "shape access requires a shp stream".to_string(),
            ));
        }
        Ok(ShapeIter {
            reader: self,
            index: start,
            stop: Some(stop),
            bbox,
        })
    }

    /// Iterates records in ascending oid order, optionally restricted to
    /// a subset of fields.
    pub fn iter_records(&mut self, fields: Option<&[&str]>) -> Result<RecordIter<'_, R>> {
        let stop = self.num_records.ok_or_else(|| {
            ShapefileError::Schema("record access requires a dbf stream".to_string())
        })?;
        let projection = self.build_projection(fields)?;
        Ok(RecordIter {
            reader: self,
            index: 0,
            stop,
            projection,
        })
    }

    /// Iterates records over the half-open index range `start..stop`.
    pub fn iter_records_range(
        &mut self,
        start: usize,
        stop: usize,
        fields: Option<&[&str]>,
    ) -> Result<RecordIter<'_, R>> {
        let num_records = self.num_records.ok_or_else(|| {
            ShapefileError::Schema("record access requires a dbf stream".to_string())
        })?;
        let projection = self.build_projection(fields)?;
        Ok(RecordIter {
            reader: self,
            index: start,
            stop: stop.min(num_records),
            projection,
        })
    }

    /// Iterates shape/record pairs. Iteration stops at the smaller of
    /// the shape and record counts when they disagree.
    pub fn iter_shape_records(
        &mut self,
        fields: Option<&[&str]>,
        bbox: Option<BoundingBox>,
    ) -> Result<ShapeRecordIter<'_, R>> {
        if self.shp.is_none() {
            return Err(ShapefileError::Schema(
                "shape access requires a shp stream".to_string(),
            ));
        }
        let stop = self.num_records.ok_or_else(|| {
            ShapefileError::Schema("record access requires a dbf stream".to_string())
        })?;
        let projection = self.build_projection(fields)?;
        Ok(ShapeRecordIter {
            reader: self,
            index: 0,
            stop,
            bbox,
            projection,
        })
    }

    /// Reads all shapes, with an optional bounding-box prefilter.
    pub fn shapes(&mut self, bbox: Option<BoundingBox>) -> Result<Vec<Shape>> {
        self.iter_shapes(bbox)?.collect()
    }

    /// Reads all records, optionally restricted to a subset of fields.
    pub fn records(&mut self, fields: Option<&[&str]>) -> Result<Vec<Record>> {
        self.iter_records(fields)?.collect()
    }

    /// Reads all shape/record pairs.
    pub fn shape_records(
        &mut self,
        fields: Option<&[&str]>,
        bbox: Option<BoundingBox>,
    ) -> Result<Vec<ShapeRecord>> {
        self.iter_shape_records(fields, bbox)?.collect()
    }
}

impl Reader<File> {
    /// Opens the triplet sharing the given base name. Extensions are
    /// matched case-insensitively; `.cpg` and `.prj` sidecars are read
    /// when present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Reader<File>> {
        Reader::open_with_options(path, ReaderOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        mut options: ReaderOptions,
    ) -> Result<Reader<File>> {
        let base = path.as_ref().with_extension("");
        let shp = open_constituent(&base, "shp");
        let shx = open_constituent(&base, "shx");
        let dbf = open_constituent(&base, "dbf");
        if shp.is_none() && dbf.is_none() {
            return Err(ShapefileError::Schema(format!(
                "unable to open {0}.shp or {0}.dbf",
                base.display()
            )));
        }
        if options.encoding.is_none() {
            if let Some(label) = read_sidecar_text(&base, "cpg") {
                let label = label.trim().to_string();
                match TextEncoding::new(&label, options.encoding_errors) {
                    Ok(_) => options.encoding = Some(label),
                    Err(_) => {
                        if options.verbose {
                            warn!("ignoring unrecognized .cpg encoding label '{}'", label);
                        }
                    }
                }
            }
        }
        let mut reader = Reader::new(shp, shx, dbf, options)?;
        if let Some(prj) = read_sidecar_text(&base, "prj") {
            reader.projection = prj;
        }
        Ok(reader)
    }
}

fn open_constituent(base: &Path, ext: &str) -> Option<File> {
    if let Ok(f) = File::open(base.with_extension(ext)) {
        return Some(f);
    }
    File::open(base.with_extension(ext.to_uppercase())).ok()
}

fn read_sidecar_text(base: &Path, ext: &str) -> Option<String> {
    if let Ok(s) = fs::read_to_string(base.with_extension(ext)) {
        return Some(s);
    }
    fs::read_to_string(base.with_extension(ext.to_uppercase())).ok()
}

/// Parses the dbf header and its field descriptor array, inserting the
/// synthetic DeletionFlag descriptor at position 0.
fn read_dbf_header<R: Read + Seek>(
    bor: &mut ByteOrderReader<R>,
    encoding: &TextEncoding,
    verbose: bool,
) -> Result<(AttributeHeader, Vec<AttributeField>)> {
    if bor.len() < 33 {
        return Err(ShapefileError::MalformedFile(
            "dbf file is shorter than its fixed header".to_string(),
        ));
    }
    bor.seek(0)?;
    bor.set_byte_order(Endianness::LittleEndian);
    let mut header = AttributeHeader {
        version: bor.read_u8()?,
        year: 1900u32 + bor.read_u8()? as u32,
        month: bor.read_u8()?,
        day: bor.read_u8()?,
        num_records: bor.read_u32()?,
        ..Default::default()
    };
    header.bytes_in_header = bor.read_u16()?;
    header.bytes_in_record = bor.read_u16()?;
    // reserved bytes
    bor.inc_pos(20)?;

    if header.bytes_in_header < 33 {
        return Err(ShapefileError::MalformedFile(format!(
            "impossible dbf header size {}",
            header.bytes_in_header
        )));
    }
    let num_fields = (header.bytes_in_header as usize - 33) / 32;

    let mut fields = Vec::with_capacity(num_fields + 1);
    fields.push(AttributeField::deletion_flag());
    for _ in 0..num_fields {
        let name_bytes = bor.read_bytes(11)?;
        let name_end = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        let name = encoding.decode(&name_bytes[..name_end])?;
        let name = name.trim().to_string();
        let kind = bor.read_u8()? as char;
        let field_type = match FieldType::from_char(kind) {
            Some(t) => t,
            None => {
                // unknown kinds degrade to plain text rather than
                // rejecting the whole table
                if verbose {
                    warn!(
                        "unknown field kind '{}' for field '{}', treating as character",
                        kind, name
                    );
                }
                FieldType::Character
            }
        };
        bor.inc_pos(4)?;
        let field_length = bor.read_u8()?;
        let decimal_count = bor.read_u8()?;
        bor.inc_pos(14)?;
        fields.push(AttributeField {
            name,
            field_type,
            field_length,
            decimal_count,
        });
    }
    if bor.read_u8()? != 0x0D {
        return Err(ShapefileError::MalformedFile(
            "dbf header lacks the expected descriptor terminator".to_string(),
        ));
    }
    header.num_fields = num_fields as u32;
    Ok((header, fields))
}

/// Decodes one shape record at the current position of the shp stream.
/// With a bounding-box filter, records whose stored box does not
/// intersect it return `Ok(None)` with the stream advanced past them.
fn read_shape_record<R: Read + Seek>(
    bor: &mut ByteOrderReader<R>,
    oid: i32,
    bbox: Option<BoundingBox>,
    verbose: bool,
) -> Result<Option<Shape>> {
    bor.set_byte_order(Endianness::BigEndian);
    let _rec_num = bor.read_i32()?;
    let content_words = bor.read_i32()?;
    if content_words < 2 {
        return Err(ShapefileError::MalformedFile(format!(
            "record {} declares a content length of {} words, shorter than a shape type code",
            oid, content_words
        )));
    }
    let content_bytes = 2 * content_words as usize;
    let record_end = bor.pos() + content_bytes;

    bor.set_byte_order(Endianness::LittleEndian);
    let code = bor.read_i32()?;
    let shape_type = match ShapeType::from_int(code) {
        Some(st) => st,
        None => {
            // skip over the unknown payload using the declared length
            if verbose {
                warn!(
                    "unrecognized shape type {} in record {}; yielding a null shape",
                    code, oid
                );
            }
            bor.seek(record_end)?;
            if bbox.is_some() {
                return Ok(None);
            }
            let mut sfg = Shape::new(ShapeType::Null);
            sfg.oid = oid;
            return Ok(Some(sfg));
        }
    };
    if content_bytes < min_content_length(shape_type) {
        return Err(ShapefileError::MalformedFile(format!(
            "record {} of type {} declares only {} content bytes",
            oid, shape_type, content_bytes
        )));
    }

    let mut sfg = Shape::new(shape_type);
    sfg.oid = oid;

    match shape_type {
        ShapeType::Null => {
            if bbox.is_some() {
                // null shapes have no extent and never match a filter
                bor.seek(record_end)?;
                return Ok(None);
            }
        }

        ShapeType::Point | ShapeType::PointM | ShapeType::PointZ => {
            let x = bor.read_f64()?;
            let y = bor.read_f64()?;
            if let Some(filter) = bbox {
                // a point's implied box duplicates its coordinates
                if !filter.overlaps(BoundingBox::new(x, y, x, y)) {
                    bor.seek(record_end)?;
                    return Ok(None);
                }
            }
            sfg.add_point(Point2D::new(x, y));
            if shape_type == ShapeType::PointZ {
                let z = bor.read_f64()?;
                sfg.z_array.push(z);
                sfg.z_min = z;
                sfg.z_max = z;
            }
            if shape_type.has_m() && record_end.saturating_sub(bor.pos()) >= 8 {
                let m = measure_from_raw(bor.read_f64()?);
                sfg.m_array.push(m);
                if let Some(v) = m {
                    sfg.m_min = v;
                    sfg.m_max = v;
                }
            }
        }

        ShapeType::MultiPoint | ShapeType::MultiPointM | ShapeType::MultiPointZ => {
            sfg.x_min = bor.read_f64()?;
            sfg.y_min = bor.read_f64()?;
            sfg.x_max = bor.read_f64()?;
            sfg.y_max = bor.read_f64()?;
            if let Some(filter) = bbox {
                if !filter.overlaps(BoundingBox::new(
                    sfg.x_min, sfg.y_min, sfg.x_max, sfg.y_max,
                )) {
                    bor.seek(record_end)?;
                    return Ok(None);
                }
            }
            sfg.num_points = bor.read_i32()?;
            for _ in 0..sfg.num_points {
                sfg.points.push(Point2D {
                    x: bor.read_f64()?,
                    y: bor.read_f64()?,
                });
            }
            if shape_type.has_z() {
                read_z_block(bor, &mut sfg)?;
            }
            if shape_type.has_m() {
                read_m_block(bor, &mut sfg, record_end)?;
            }
        }

        ShapeType::PolyLine
        | ShapeType::Polygon
        | ShapeType::PolyLineM
        | ShapeType::PolygonM
        | ShapeType::PolyLineZ
        | ShapeType::PolygonZ
        | ShapeType::MultiPatch => {
            sfg.x_min = bor.read_f64()?;
            sfg.y_min = bor.read_f64()?;
            sfg.x_max = bor.read_f64()?;
            sfg.y_max = bor.read_f64()?;
            if let Some(filter) = bbox {
                if !filter.overlaps(BoundingBox::new(
                    sfg.x_min, sfg.y_min, sfg.x_max, sfg.y_max,
                )) {
                    bor.seek(record_end)?;
                    return Ok(None);
                }
            }
            sfg.num_parts = bor.read_i32()?;
            sfg.num_points = bor.read_i32()?;
            for _ in 0..sfg.num_parts {
                sfg.parts.push(bor.read_i32()?);
            }
            if shape_type == ShapeType::MultiPatch {
                for _ in 0..sfg.num_parts {
                    let raw = bor.read_i32()?;
                    let part_type = match PartType::from_int(raw) {
                        Some(pt) => pt,
                        None => {
                            if verbose {
                                warn!(
                                    "unknown multipatch part type {} in record {}; treating as ring",
                                    raw, oid
                                );
                            }
                            PartType::Ring
                        }
                    };
                    sfg.part_types.push(part_type);
                }
            }
            for _ in 0..sfg.num_points {
                sfg.points.push(Point2D {
                    x: bor.read_f64()?,
                    y: bor.read_f64()?,
                });
            }
            if shape_type.has_z() {
                read_z_block(bor, &mut sfg)?;
            }
            if shape_type.has_m() {
                read_m_block(bor, &mut sfg, record_end)?;
            }
        }
    }

    // the declared content length wins over whatever was actually
    // consumed, which also skips any trailing content
    bor.seek(record_end)?;
    Ok(Some(sfg))
}

fn read_z_block<R: Read + Seek>(bor: &mut ByteOrderReader<R>, sfg: &mut Shape) -> Result<()> {
    sfg.z_min = bor.read_f64()?;
    sfg.z_max = bor.read_f64()?;
    for _ in 0..sfg.num_points {
        sfg.z_array.push(bor.read_f64()?);
    }
    Ok(())
}

/// Reads the optional trailing measure block. When the declared content
/// length ends before the block, the record has no measures and
/// `m_array` is left empty.
fn read_m_block<R: Read + Seek>(
    bor: &mut ByteOrderReader<R>,
    sfg: &mut Shape,
    record_end: usize,
) -> Result<()> {
    if record_end.saturating_sub(bor.pos()) < 16 {
        return Ok(());
    }
    sfg.m_min = bor.read_f64()?;
    sfg.m_max = bor.read_f64()?;
    if record_end.saturating_sub(bor.pos()) < 8 * sfg.num_points.max(0) as usize {
        return Ok(());
    }
    for _ in 0..sfg.num_points {
        sfg.m_array.push(measure_from_raw(bor.read_f64()?));
    }
    Ok(())
}

/// The smallest legal content length in bytes for a declared shape type.
fn min_content_length(shape_type: ShapeType) -> usize {
    match shape_type {
        ShapeType::Null => 4,
        ShapeType::Point | ShapeType::PointM => 20,
        ShapeType::PointZ => 28,
        ShapeType::MultiPoint | ShapeType::MultiPointM | ShapeType::MultiPointZ => 40,
        _ => 44,
    }
}

/// Iterator over shapes in ascending oid order.
pub struct ShapeIter<'a, R: Read + Seek> {
    reader: &'a mut Reader<R>,
    index: usize,
    stop: Option<usize>,
    bbox: Option<BoundingBox>,
}

impl<R: Read + Seek> Iterator for ShapeIter<'_, R> {
    type Item = Result<Shape>;

    fn next(&mut self) -> Option<Result<Shape>> {
        loop {
            if let Some(stop) = self.stop {
                if self.index >= stop {
                    return None;
                }
            }
            let i = self.index;
            match self.reader.ensure_offset(i) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    self.stop = Some(i);
                    return Some(Err(e));
                }
            }
            self.index += 1;
            let offset = self.reader.offsets[i];
            match self.reader.read_shape_at(offset, i as i32, self.bbox) {
                Ok(Some(shape)) => return Some(Ok(shape)),
                Ok(None) => continue,
                Err(e) => {
                    self.stop = Some(self.index);
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Iterator over records in ascending oid order.
pub struct RecordIter<'a, R: Read + Seek> {
    reader: &'a mut Reader<R>,
    index: usize,
    stop: usize,
    projection: RecordProjection,
}

impl<R: Read + Seek> Iterator for RecordIter<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Result<Record>> {
        if self.index >= self.stop {
            return None;
        }
        let i = self.index;
        self.index += 1;
        match self.reader.read_record_at(i, &self.projection) {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.stop = self.index;
                Some(Err(e))
            }
        }
    }
}

/// Iterator over shape/record pairs in ascending oid order.
pub struct ShapeRecordIter<'a, R: Read + Seek> {
    reader: &'a mut Reader<R>,
    index: usize,
    stop: usize,
    bbox: Option<BoundingBox>,
    projection: RecordProjection,
}

impl<R: Read + Seek> Iterator for ShapeRecordIter<'_, R> {
    type Item = Result<ShapeRecord>;

    fn next(&mut self) -> Option<Result<ShapeRecord>> {
        loop {
            if self.index >= self.stop {
                return None;
            }
            let i = self.index;
            match self.reader.ensure_offset(i) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    self.stop = i;
                    return Some(Err(e));
                }
            }
            self.index += 1;
            let offset = self.reader.offsets[i];
            let shape = match self.reader.read_shape_at(offset, i as i32, self.bbox) {
                Ok(Some(shape)) => shape,
                Ok(None) => continue,
                Err(e) => {
                    self.stop = self.index;
                    return Some(Err(e));
                }
            };
            return Some(
                self.reader
                    .read_record_at(i, &self.projection)
                    .map(|record| ShapeRecord { shape, record }),
            );
        }
    }
}
