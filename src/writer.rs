/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT

Notes: The writer streams shape and record pairs to its target streams in
a single pass. The 100-byte shp/shx headers are reserved up front and
rewritten on close, once the record counts, file lengths, and bounding
boxes are known. In-memory state stays proportional to the field schema
and the shape currently being written, never to the number of records.
*/
use crate::attributes::{
    format_field_value, AttributeField, FieldData, FieldType, MAX_FIELDS,
};
use crate::encoding::{EncodingErrors, TextEncoding};
use crate::error::{Result, ShapefileError};
use crate::geojson::Geometry;
use crate::geometry::{PartType, Shape, ShapeType, NO_DATA};
use crate::header::{ShapefileHeader, FILE_VERSION, HEADER_LENGTH};
use crate::structures::{BoundingBox, Point2D};
use crate::utils::{ByteOrderWriter, Endianness};
use chrono::prelude::*;
use log::warn;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

/// Options accepted when constructing a [`Writer`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// The file's shape type. When unset it is adopted from the first
    /// non-null shape written.
    pub shape_type: Option<ShapeType>,
    /// Text encoding label for the dbf; defaults to UTF-8.
    pub encoding: Option<String>,
    pub encoding_errors: EncodingErrors,
    /// Keep the shape and record counts in lockstep by appending
    /// null-equivalents to whichever side falls behind.
    pub auto_balance: bool,
    /// Gates non-fatal warnings.
    pub verbose: bool,
}

impl Default for WriterOptions {
    fn default() -> WriterOptions {
        WriterOptions {
            shape_type: None,
            encoding: None,
            encoding_errors: EncodingErrors::Strict,
            auto_balance: false,
            verbose: true,
        }
    }
}

/// Streaming writer for the shapefile triplet. Any subset of the three
/// streams may be supplied; only those given are written and finalized.
pub struct Writer<W: Write + Seek> {
    shp: Option<ByteOrderWriter<W>>,
    shx: Option<ByteOrderWriter<W>>,
    dbf: Option<ByteOrderWriter<W>>,
    base_path: Option<PathBuf>,
    shape_type: Option<ShapeType>,
    fields: Vec<AttributeField>,
    shp_num: i32,
    rec_num: i32,
    bbox: Option<BoundingBox>,
    zbox: Option<(f64, f64)>,
    mbox: Option<(f64, f64)>,
    encoding: TextEncoding,
    auto_balance: bool,
    verbose: bool,
    dbf_header_written: bool,
    closed: bool,
}

impl<W: Write + Seek> Writer<W> {
    /// Constructs a writer over the given streams and reserves the
    /// fixed-size headers, which are filled in on close.
    pub fn new(
        shp: Option<W>,
        shx: Option<W>,
        dbf: Option<W>,
        options: WriterOptions,
    ) -> Result<Writer<W>> {
        if shp.is_none() && shx.is_none() && dbf.is_none() {
            return Err(ShapefileError::Schema(
                "a writer requires at least one of the shp, shx, and dbf streams".to_string(),
            ));
        }
        let encoding = TextEncoding::new(
            options.encoding.as_deref().unwrap_or("utf-8"),
            options.encoding_errors,
        )?;
        let mut shp = shp.map(|f| ByteOrderWriter::new(f, Endianness::BigEndian));
        let mut shx = shx.map(|f| ByteOrderWriter::new(f, Endianness::BigEndian));
        let dbf = dbf.map(|f| ByteOrderWriter::new(f, Endianness::LittleEndian));

        // reserve the header space; real values are patched in on close
        if let Some(bow) = shp.as_mut() {
            bow.write_bytes(&[0u8; HEADER_LENGTH])?;
        }
        if let Some(bow) = shx.as_mut() {
            bow.write_bytes(&[0u8; HEADER_LENGTH])?;
        }

        Ok(Writer {
            shp,
            shx,
            dbf,
            base_path: None,
            shape_type: options.shape_type,
            fields: vec![],
            shp_num: 0,
            rec_num: 0,
            bbox: None,
            zbox: None,
            mbox: None,
            encoding,
            auto_balance: options.auto_balance,
            verbose: options.verbose,
            dbf_header_written: false,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ShapefileError::Schema(
                "the writer has already been closed".to_string(),
            ));
        }
        Ok(())
    }

    /// The number of features written so far; with unbalanced files,
    /// the larger of the two counts.
    pub fn len(&self) -> usize {
        self.shp_num.max(self.rec_num) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape_type(&self) -> Option<ShapeType> {
        self.shape_type
    }

    /// The running file-level bounding box over everything written.
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    pub fn fields(&self) -> &[AttributeField] {
        &self.fields
    }

    /// Appends a dbf field descriptor. Date and Logical fields are
    /// forced to their fixed widths. Fields cannot be added once a
    /// record has been written.
    pub fn add_field(&mut self, field: AttributeField) -> Result<()> {
        self.ensure_open()?;
        if self.rec_num > 0 {
            return Err(ShapefileError::Schema(
                "cannot add fields after records have been written".to_string(),
            ));
        }
        if self.fields.len() >= MAX_FIELDS {
            return Err(ShapefileError::Schema(format!(
                "the dbf header limit allows at most {} fields",
                MAX_FIELDS
            )));
        }
        let mut field = field;
        // embedded blanks are not legal in xBase field names
        field.name = field.name.replace(' ', "_");
        match field.field_type {
            FieldType::Date => {
                field.field_length = 8;
                field.decimal_count = 0;
            }
            FieldType::Logical => {
                field.field_length = 1;
                field.decimal_count = 0;
            }
            _ => {}
        }
        if field.field_length == 0 {
            return Err(ShapefileError::Schema(format!(
                "field '{}' must be at least one byte wide",
                field.name
            )));
        }
        if field.decimal_count > 0 && field.decimal_count >= field.field_length {
            return Err(ShapefileError::Schema(format!(
                "field '{}' declares {} decimals in a width of {}",
                field.name, field.decimal_count, field.field_length
            )));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Shorthand for [`Writer::add_field`].
    pub fn field(
        &mut self,
        name: &str,
        field_type: FieldType,
        field_length: u8,
        decimal_count: u8,
    ) -> Result<()> {
        self.add_field(AttributeField::new(
            name,
            field_type,
            field_length,
            decimal_count,
        ))
    }

    /// Appends one attribute row. Values align left-to-right against the
    /// declared fields; missing trailing values are written as nulls.
    pub fn record(&mut self, values: Vec<FieldData>) -> Result<()> {
        self.ensure_open()?;
        self.append_record(values)?;
        if self.auto_balance {
            self.balance()?;
        }
        Ok(())
    }

    /// Appends one attribute row from field-name/value pairs. Fields not
    /// present in the map are written as nulls.
    pub fn record_map(&mut self, values: &HashMap<String, FieldData>) -> Result<()> {
        let ordered = self
            .fields
            .iter()
            .map(|f| values.get(&f.name).cloned().unwrap_or(FieldData::Null))
            .collect();
        self.record(ordered)
    }

    fn append_record(&mut self, mut values: Vec<FieldData>) -> Result<()> {
        if self.dbf.is_none() {
            return Err(ShapefileError::Schema(
                "record writing requires a dbf stream".to_string(),
            ));
        }
        if self.fields.is_empty() {
            return Err(ShapefileError::Schema(
                "at least one field must be defined before writing records".to_string(),
            ));
        }
        if !self.dbf_header_written {
            self.write_dbf_header()?;
            self.dbf_header_written = true;
        }
        if values.len() > self.fields.len() {
            if self.verbose {
                warn!(
                    "record has {} values for {} fields; extra values are dropped",
                    values.len(),
                    self.fields.len()
                );
            }
            values.truncate(self.fields.len());
        }
        values.resize(self.fields.len(), FieldData::Null);

        // format every slot before touching the stream, so a rejected
        // value cannot leave a torn row behind
        let mut row: Vec<Vec<u8>> = Vec::with_capacity(self.fields.len());
        for (field, value) in self.fields.iter().zip(values.iter()) {
            row.push(format_field_value(value, field, &self.encoding, self.verbose)?);
        }
        let dbf = self.dbf.as_mut().ok_or_else(|| {
            ShapefileError::Schema("record writing requires a dbf stream".to_string())
        })?;
        // leading deletion flag byte, always live
        dbf.write_u8(b' ')?;
        for slot in &row {
            dbf.write_bytes(slot)?;
        }
        self.rec_num += 1;
        Ok(())
    }

    fn write_dbf_header(&mut self) -> Result<()> {
        // pre-encode the name slots before borrowing the stream
        let mut name_slots: Vec<[u8; 11]> = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let mut bytes = self.encoding.encode(&field.name)?;
            if bytes.len() > 10 {
                if self.verbose {
                    warn!("truncating field name '{}' to 10 bytes", field.name);
                }
                bytes.truncate(10);
            }
            let mut slot = [0u8; 11];
            slot[..bytes.len()].copy_from_slice(&bytes);
            name_slots.push(slot);
        }
        let widths: u32 = self.fields.iter().map(|f| f.field_length as u32).sum();
        if widths + 1 > u16::MAX as u32 {
            return Err(ShapefileError::Schema(format!(
                "combined field widths of {} bytes exceed the xBase record limit",
                widths + 1
            )));
        }
        let record_length = 1u16 + widths as u16;
        let header_length = 32u16 + self.fields.len() as u16 * 32 + 1;
        let num_records = self.rec_num as u32;
        let now = Local::now();

        let dbf = self.dbf.as_mut().ok_or_else(|| {
            ShapefileError::Schema("record writing requires a dbf stream".to_string())
        })?;
        dbf.seek_from_start(0)?;
        dbf.set_byte_order(Endianness::LittleEndian);
        dbf.write_u8(3)?; // version
        dbf.write_u8((now.year() - 1900) as u8)?;
        dbf.write_u8(now.month() as u8)?;
        dbf.write_u8(now.day() as u8)?;
        dbf.write_u32(num_records)?;
        dbf.write_u16(header_length)?;
        dbf.write_u16(record_length)?;
        // reserved bytes
        dbf.write_bytes(&[0u8; 20])?;
        for (field, slot) in self.fields.iter().zip(name_slots.iter()) {
            dbf.write_bytes(slot)?;
            dbf.write_u8(field.field_type.to_char() as u8)?;
            dbf.write_bytes(&[0u8; 4])?;
            dbf.write_u8(field.field_length)?;
            dbf.write_u8(field.decimal_count)?;
            dbf.write_bytes(&[0u8; 14])?;
        }
        dbf.write_u8(0x0D)?; // terminator byte
        dbf.seek_end()?;
        Ok(())
    }

    /// Appends one shape record, and its shx index entry when an shx
    /// stream is present. Polygon rings are closed automatically; a ring
    /// with fewer than three distinct vertices is rejected.
    pub fn shape(&mut self, shape: Shape) -> Result<()> {
        self.ensure_open()?;
        self.append_shape(shape)?;
        if self.auto_balance {
            self.balance()?;
        }
        Ok(())
    }

    fn append_shape(&mut self, mut shape: Shape) -> Result<()> {
        if self.shp.is_none() {
            return Err(ShapefileError::Schema(
                "shape writing requires a shp stream".to_string(),
            ));
        }
        // the file adopts the type of the first non-null shape
        if self.shape_type.is_none() && shape.shape_type != ShapeType::Null {
            self.shape_type = Some(shape.shape_type);
        }
        if shape.shape_type != ShapeType::Null {
            if let Some(file_type) = self.shape_type {
                if shape.shape_type != file_type {
                    return Err(ShapefileError::Value(format!(
                        "the shape's type ({}) must match the type of the shapefile ({})",
                        shape.shape_type, file_type
                    )));
                }
            }
        }
        if shape.shape_type.base_shape_type() == ShapeType::Polygon {
            close_polygon_rings(&mut shape)?;
        }
        validate_shape_arrays(&shape)?;

        let rec_bbox = if shape.shape_type != ShapeType::Null && !shape.points.is_empty() {
            let rec_bbox = BoundingBox::from_points(&shape.points);
            self.update_file_boxes(&shape, rec_bbox);
            Some(rec_bbox)
        } else {
            None
        };

        let content_length = shape.get_length();
        shape.oid = self.shp_num;

        let shp = self.shp.as_mut().ok_or_else(|| {
            ShapefileError::Schema("shape writing requires a shp stream".to_string())
        })?;
        let offset = shp.pos();
        shp.set_byte_order(Endianness::BigEndian);
        shp.write_i32(self.shp_num + 1)?; // record numbers are 1-based
        shp.write_i32(content_length / 2)?; // content length in 16-bit words
        write_shape_payload(shp, &shape, rec_bbox)?;

        if let Some(shx) = self.shx.as_mut() {
            shx.set_byte_order(Endianness::BigEndian);
            shx.write_i32((offset / 2) as i32)?;
            shx.write_i32(content_length / 2)?;
        }
        self.shp_num += 1;
        Ok(())
    }

    fn update_file_boxes(&mut self, shape: &Shape, rec_bbox: BoundingBox) {
        match self.bbox.as_mut() {
            Some(b) => b.expand_to(rec_bbox),
            None => self.bbox = Some(rec_bbox),
        }
        if shape.shape_type.has_z() && !shape.z_array.is_empty() {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for z in &shape.z_array {
                lo = lo.min(*z);
                hi = hi.max(*z);
            }
            self.zbox = Some(match self.zbox {
                Some((a, b)) => (a.min(lo), b.max(hi)),
                None => (lo, hi),
            });
        }
        if shape.shape_type.has_m() && shape.has_m_data() {
            let (lo, hi) = measure_range(&shape.m_array);
            self.mbox = Some(match self.mbox {
                Some((a, b)) => (a.min(lo), b.max(hi)),
                None => (lo, hi),
            });
        }
    }

    /// Appends null-equivalents to whichever file has fewer entries
    /// until the shape and record counts agree. A no-op unless both the
    /// shp and dbf streams are present.
    pub fn balance(&mut self) -> Result<()> {
        if self.shp.is_none() || self.dbf.is_none() {
            return Ok(());
        }
        while self.rec_num > self.shp_num {
            self.append_shape(Shape::new(ShapeType::Null))?;
        }
        while self.rec_num < self.shp_num {
            let nulls = vec![FieldData::Null; self.fields.len()];
            self.append_record(nulls)?;
        }
        Ok(())
    }

    /// Appends a geometry from the interchange model, deriving the
    /// concrete Z/M shape type from the file's type when one has been
    /// fixed, and the geometry's natural XY type otherwise.
    pub fn geometry(&mut self, geometry: &Geometry) -> Result<()> {
        let target = match self.shape_type {
            Some(file_type) => file_type,
            None => geometry.default_shape_type()?,
        };
        let shape = Shape::from_geometry(geometry, target)?;
        self.shape(shape)
    }

    // Convenience appenders, one per shape type.

    /// Appends a NULL shape.
    pub fn null(&mut self) -> Result<()> {
        self.shape(Shape::new(ShapeType::Null))
    }

    /// Appends a POINT shape.
    pub fn point(&mut self, x: f64, y: f64) -> Result<()> {
        let mut shape = Shape::new(ShapeType::Point);
        shape.add_point(Point2D::new(x, y));
        self.shape(shape)
    }

    /// Appends a POINTM shape; a missing measure is written as no-data.
    pub fn pointm(&mut self, x: f64, y: f64, m: Option<f64>) -> Result<()> {
        let mut shape = Shape::new(ShapeType::PointM);
        shape.add_pointm(Point2D::new(x, y), m);
        self.shape(shape)
    }

    /// Appends a POINTZ shape.
    pub fn pointz(&mut self, x: f64, y: f64, z: f64, m: Option<f64>) -> Result<()> {
        let mut shape = Shape::new(ShapeType::PointZ);
        shape.add_pointz(Point2D::new(x, y), z, m);
        self.shape(shape)
    }

    /// Appends a MULTIPOINT shape.
    pub fn multipoint(&mut self, points: &[Point2D]) -> Result<()> {
        let mut shape = Shape::new(ShapeType::MultiPoint);
        shape.add_part(points);
        self.shape(shape)
    }

    /// Appends a MULTIPOINTM shape.
    pub fn multipointm(&mut self, points: &[Point2D], measures: &[Option<f64>]) -> Result<()> {
        check_parallel(points.len(), measures.len(), "measures")?;
        let mut shape = Shape::new(ShapeType::MultiPointM);
        shape.add_partm(points, measures);
        self.shape(shape)
    }

    /// Appends a MULTIPOINTZ shape.
    pub fn multipointz(
        &mut self,
        points: &[Point2D],
        z_values: &[f64],
        measures: &[Option<f64>],
    ) -> Result<()> {
        check_parallel(points.len(), z_values.len(), "z values")?;
        check_parallel(points.len(), measures.len(), "measures")?;
        let mut shape = Shape::new(ShapeType::MultiPointZ);
        shape.add_partz(points, z_values, measures);
        self.shape(shape)
    }

    /// Appends a POLYLINE shape from one or more line parts.
    pub fn line(&mut self, parts: &[Vec<Point2D>]) -> Result<()> {
        self.shape(build_parts_shape(ShapeType::PolyLine, parts))
    }

    /// Appends a POLYLINEM shape.
    pub fn linem(
        &mut self,
        parts: &[Vec<Point2D>],
        measures: &[Vec<Option<f64>>],
    ) -> Result<()> {
        self.shape(build_parts_shape_m(ShapeType::PolyLineM, parts, measures)?)
    }

    /// Appends a POLYLINEZ shape.
    pub fn linez(
        &mut self,
        parts: &[Vec<Point2D>],
        z_values: &[Vec<f64>],
        measures: &[Vec<Option<f64>>],
    ) -> Result<()> {
        self.shape(build_parts_shape_z(
            ShapeType::PolyLineZ,
            parts,
            z_values,
            measures,
        )?)
    }

    /// Appends a POLYGON shape. Rings that are not closed are closed
    /// automatically; exteriors are expected to run clockwise and holes
    /// counter-clockwise.
    pub fn poly(&mut self, rings: &[Vec<Point2D>]) -> Result<()> {
        self.shape(build_parts_shape(ShapeType::Polygon, rings))
    }

    /// Appends a POLYGONM shape.
    pub fn polym(
        &mut self,
        rings: &[Vec<Point2D>],
        measures: &[Vec<Option<f64>>],
    ) -> Result<()> {
        self.shape(build_parts_shape_m(ShapeType::PolygonM, rings, measures)?)
    }

    /// Appends a POLYGONZ shape.
    pub fn polyz(
        &mut self,
        rings: &[Vec<Point2D>],
        z_values: &[Vec<f64>],
        measures: &[Vec<Option<f64>>],
    ) -> Result<()> {
        self.shape(build_parts_shape_z(
            ShapeType::PolygonZ,
            rings,
            z_values,
            measures,
        )?)
    }

    /// Appends a MULTIPATCH shape from typed surface patches.
    pub fn multipatch(
        &mut self,
        parts: &[Vec<Point2D>],
        part_types: &[PartType],
        z_values: &[Vec<f64>],
        measures: &[Vec<Option<f64>>],
    ) -> Result<()> {
        check_parallel(parts.len(), part_types.len(), "part types")?;
        let mut shape = build_parts_shape_z(ShapeType::MultiPatch, parts, z_values, measures)?;
        shape.part_types = part_types.to_vec();
        self.shape(shape)
    }

    /// Finalizes the headers of whichever streams are present and
    /// flushes them. The writer is unusable afterwards.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.auto_balance {
            self.balance()?;
        }
        if self.shp.is_some() && self.dbf.is_some() && self.shp_num != self.rec_num {
            return Err(ShapefileError::Schema(format!(
                "cannot close with {} shapes and {} records; the files must correspond",
                self.shp_num, self.rec_num
            )));
        }
        if self.dbf.is_some() && self.fields.is_empty() {
            return Err(ShapefileError::Schema(
                "a dbf file must contain at least one field".to_string(),
            ));
        }

        let shape_type = self.shape_type.unwrap_or(ShapeType::Null);
        let mut header = ShapefileHeader {
            file_code: crate::header::FILE_CODE,
            file_length: 0,
            version: FILE_VERSION,
            shape_type,
            ..Default::default()
        };
        if shape_type != ShapeType::Null {
            if let Some(bbox) = self.bbox {
                header.x_min = bbox.min_x;
                header.y_min = bbox.min_y;
                header.x_max = bbox.max_x;
                header.y_max = bbox.max_y;
            }
        }
        if shape_type.has_z() {
            let (lo, hi) = self.zbox.unwrap_or((0f64, 0f64));
            header.z_min = lo;
            header.z_max = hi;
        }
        if shape_type.has_m() {
            let (lo, hi) = self.mbox.unwrap_or((0f64, 0f64));
            header.m_min = lo;
            header.m_max = hi;
        }

        if let Some(shp) = self.shp.as_mut() {
            header.file_length = (shp.len() / 2) as i32;
            header.write(shp)?;
            shp.seek_end()?;
            shp.flush()?;
        }
        if let Some(shx) = self.shx.as_mut() {
            header.file_length = ((HEADER_LENGTH + 8 * self.shp_num as usize) / 2) as i32;
            header.write(shx)?;
            shx.seek_end()?;
            shx.flush()?;
        }
        if self.dbf.is_some() {
            if self.dbf_header_written {
                // the trailer follows the last record
                if let Some(dbf) = self.dbf.as_mut() {
                    dbf.seek_end()?;
                    dbf.write_u8(0x1A)?;
                }
            }
            // patch the record count and last-update date
            self.write_dbf_header()?;
            if !self.dbf_header_written {
                self.dbf_header_written = true;
                if let Some(dbf) = self.dbf.as_mut() {
                    dbf.write_u8(0x1A)?;
                }
            }
            if let Some(dbf) = self.dbf.as_mut() {
                dbf.flush()?;
            }
        }
        self.closed = true;
        Ok(())
    }

    /// Closes the writer and hands the underlying streams back.
    pub fn into_parts(mut self) -> Result<(Option<W>, Option<W>, Option<W>)> {
        self.close()?;
        Ok((
            self.shp.take().map(|b| b.into_inner()),
            self.shx.take().map(|b| b.into_inner()),
            self.dbf.take().map(|b| b.into_inner()),
        ))
    }
}

impl Writer<File> {
    /// Creates the triplet `<base>.shp`, `<base>.shx`, `<base>.dbf`,
    /// creating parent directories as needed. A `.cpg` sidecar is
    /// emitted when the selected encoding is not UTF-8.
    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Writer<File>> {
        let base = path.as_ref().with_extension("");
        if let Some(parent) = base.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let shp = File::create(base.with_extension("shp"))?;
        let shx = File::create(base.with_extension("shx"))?;
        let dbf = File::create(base.with_extension("dbf"))?;
        let mut writer = Writer::new(Some(shp), Some(shx), Some(dbf), options)?;
        if writer.encoding.label() != "UTF-8" {
            fs::write(base.with_extension("cpg"), writer.encoding.label())?;
        }
        writer.base_path = Some(base);
        Ok(writer)
    }

    /// Writes the `.prj` sidecar next to the triplet. The text is
    /// treated as opaque WKT.
    pub fn write_projection(&mut self, wkt: &str) -> Result<()> {
        let base = self.base_path.as_ref().ok_or_else(|| {
            ShapefileError::Schema(
                "projection sidecars require a writer created from a path".to_string(),
            )
        })?;
        fs::write(base.with_extension("prj"), wkt)?;
        Ok(())
    }
}

impl<W: Write + Seek> Drop for Writer<W> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // finalizing without a schema would fail anyway; leave the
        // partial streams as they are in that case
        if self.dbf.is_some() && self.fields.is_empty() {
            return;
        }
        let _ = self.close();
    }
}

fn check_parallel(points: usize, other: usize, what: &str) -> Result<()> {
    if points != other {
        return Err(ShapefileError::Value(format!(
            "expected {} {} for {} points",
            points, what, points
        )));
    }
    Ok(())
}

fn build_parts_shape(shape_type: ShapeType, parts: &[Vec<Point2D>]) -> Shape {
    let mut shape = Shape::new(shape_type);
    for part in parts {
        shape.add_part(part);
    }
    shape
}

fn build_parts_shape_m(
    shape_type: ShapeType,
    parts: &[Vec<Point2D>],
    measures: &[Vec<Option<f64>>],
) -> Result<Shape> {
    check_parallel(parts.len(), measures.len(), "measure parts")?;
    for (p, m) in parts.iter().zip(measures.iter()) {
        check_parallel(p.len(), m.len(), "measures")?;
    }
    let mut shape = Shape::new(shape_type);
    for (p, m) in parts.iter().zip(measures.iter()) {
        shape.add_partm(p, m);
    }
    Ok(shape)
}

fn build_parts_shape_z(
    shape_type: ShapeType,
    parts: &[Vec<Point2D>],
    z_values: &[Vec<f64>],
    measures: &[Vec<Option<f64>>],
) -> Result<Shape> {
    check_parallel(parts.len(), z_values.len(), "z parts")?;
    check_parallel(parts.len(), measures.len(), "measure parts")?;
    for ((p, z), m) in parts.iter().zip(z_values.iter()).zip(measures.iter()) {
        check_parallel(p.len(), z.len(), "z values")?;
        check_parallel(p.len(), m.len(), "measures")?;
    }
    let mut shape = Shape::new(shape_type);
    for ((p, z), m) in parts.iter().zip(z_values.iter()).zip(measures.iter()) {
        shape.add_partz(p, z, m);
    }
    Ok(shape)
}

/// Closes every ring of a polygon shape in place, duplicating the first
/// vertex (and its z/m companions) when it differs from the last. Rings
/// with fewer than three distinct vertices are rejected.
fn close_polygon_rings(shape: &mut Shape) -> Result<()> {
    if shape.parts.is_empty() {
        return Ok(());
    }
    let has_z = !shape.z_array.is_empty();
    let has_m = !shape.m_array.is_empty();
    let mut points = Vec::with_capacity(shape.points.len() + shape.parts.len());
    let mut z_array = Vec::with_capacity(shape.z_array.len() + shape.parts.len());
    let mut m_array = Vec::with_capacity(shape.m_array.len() + shape.parts.len());
    let mut parts = Vec::with_capacity(shape.parts.len());

    for i in 0..shape.parts.len() {
        let range = shape.part_range(i);
        if range.start > range.end || range.end > shape.points.len() {
            return Err(ShapefileError::Value(format!(
                "part {} has an invalid point range",
                i
            )));
        }
        let ring = &shape.points[range.clone()];
        if count_distinct(ring) < 3 {
            return Err(ShapefileError::Value(
                "polygon rings require at least 3 distinct points".to_string(),
            ));
        }
        parts.push(points.len() as i32);
        points.extend_from_slice(ring);
        if has_z {
            z_array.extend_from_slice(&shape.z_array[range.clone()]);
        }
        if has_m {
            m_array.extend_from_slice(&shape.m_array[range.clone()]);
        }
        if ring[0] != ring[ring.len() - 1] {
            points.push(ring[0]);
            if has_z {
                z_array.push(shape.z_array[range.start]);
            }
            if has_m {
                m_array.push(shape.m_array[range.start]);
            }
        }
    }
    shape.num_points = points.len() as i32;
    shape.num_parts = parts.len() as i32;
    shape.points = points;
    shape.z_array = z_array;
    shape.m_array = m_array;
    shape.parts = parts;
    Ok(())
}

/// Counts distinct vertices, stopping at three since callers only need
/// to know whether a ring is degenerate.
fn count_distinct(ring: &[Point2D]) -> usize {
    let mut seen: Vec<Point2D> = Vec::with_capacity(3);
    for p in ring {
        if !seen.contains(p) {
            seen.push(*p);
            if seen.len() == 3 {
                break;
            }
        }
    }
    seen.len()
}

fn validate_shape_arrays(shape: &Shape) -> Result<()> {
    if shape.shape_type == ShapeType::Null {
        return Ok(());
    }
    if shape.shape_type.base_shape_type() == ShapeType::Point && shape.points.is_empty() {
        return Err(ShapefileError::Value(
            "point shapes require exactly one point".to_string(),
        ));
    }
    if shape.shape_type.has_z() && shape.z_array.len() != shape.points.len() {
        return Err(ShapefileError::Value(format!(
            "{} shapes require one z value per point",
            shape.shape_type
        )));
    }
    if shape.has_m_data() && shape.m_array.len() != shape.points.len() {
        return Err(ShapefileError::Value(
            "measure values must match the number of points".to_string(),
        ));
    }
    if shape.shape_type == ShapeType::MultiPatch && shape.part_types.len() != shape.parts.len() {
        return Err(ShapefileError::Value(
            "multipatch shapes require one part type per part".to_string(),
        ));
    }
    Ok(())
}

/// Per-record minimum and maximum over the valid measures; the no-data
/// sentinel when every measure is missing.
fn measure_range(m_array: &[Option<f64>]) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    let mut any = false;
    for m in m_array.iter().flatten() {
        lo = lo.min(*m);
        hi = hi.max(*m);
        any = true;
    }
    if any {
        (lo, hi)
    } else {
        (NO_DATA, NO_DATA)
    }
}

fn write_shape_payload<W: Write + Seek>(
    shp: &mut ByteOrderWriter<W>,
    shape: &Shape,
    rec_bbox: Option<BoundingBox>,
) -> Result<()> {
    shp.set_byte_order(Endianness::LittleEndian);
    shp.write_i32(shape.shape_type.to_int())?;
    match shape.shape_type {
        ShapeType::Null => {}

        ShapeType::Point | ShapeType::PointM | ShapeType::PointZ => {
            let p = shape.points[0];
            shp.write_f64(p.x)?;
            shp.write_f64(p.y)?;
            if shape.shape_type == ShapeType::PointZ {
                shp.write_f64(shape.z_array[0])?;
            }
            if shape.shape_type.has_m() && shape.has_m_data() {
                shp.write_f64(shape.m_array[0].unwrap_or(NO_DATA))?;
            }
        }

        ShapeType::MultiPoint | ShapeType::MultiPointM | ShapeType::MultiPointZ => {
            write_record_bbox(shp, rec_bbox)?;
            shp.write_i32(shape.points.len() as i32)?;
            for p in &shape.points {
                shp.write_f64(p.x)?;
                shp.write_f64(p.y)?;
            }
            write_z_and_m_blocks(shp, shape)?;
        }

        ShapeType::PolyLine
        | ShapeType::Polygon
        | ShapeType::PolyLineM
        | ShapeType::PolygonM
        | ShapeType::PolyLineZ
        | ShapeType::PolygonZ
        | ShapeType::MultiPatch => {
            write_record_bbox(shp, rec_bbox)?;
            shp.write_i32(shape.parts.len() as i32)?;
            shp.write_i32(shape.points.len() as i32)?;
            for part in &shape.parts {
                shp.write_i32(*part)?;
            }
            if shape.shape_type == ShapeType::MultiPatch {
                for part_type in &shape.part_types {
                    shp.write_i32(part_type.to_int())?;
                }
            }
            for p in &shape.points {
                shp.write_f64(p.x)?;
                shp.write_f64(p.y)?;
            }
            write_z_and_m_blocks(shp, shape)?;
        }
    }
    Ok(())
}

fn write_record_bbox<W: Write + Seek>(
    shp: &mut ByteOrderWriter<W>,
    rec_bbox: Option<BoundingBox>,
) -> Result<()> {
    let bbox = rec_bbox.unwrap_or(BoundingBox {
        min_x: 0f64,
        min_y: 0f64,
        max_x: 0f64,
        max_y: 0f64,
    });
    shp.write_f64(bbox.min_x)?;
    shp.write_f64(bbox.min_y)?;
    shp.write_f64(bbox.max_x)?;
    shp.write_f64(bbox.max_y)?;
    Ok(())
}

fn write_z_and_m_blocks<W: Write + Seek>(
    shp: &mut ByteOrderWriter<W>,
    shape: &Shape,
) -> Result<()> {
    if shape.shape_type.has_z() {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for z in &shape.z_array {
            lo = lo.min(*z);
            hi = hi.max(*z);
        }
        if shape.z_array.is_empty() {
            lo = 0f64;
            hi = 0f64;
        }
        shp.write_f64(lo)?;
        shp.write_f64(hi)?;
        for z in &shape.z_array {
            shp.write_f64(*z)?;
        }
    }
    // the measure block is optional; records read without one are
    // written back without one
    if shape.shape_type.has_m() && shape.has_m_data() {
        let (lo, hi) = measure_range(&shape.m_array);
        shp.write_f64(lo)?;
        shp.write_f64(hi)?;
        for m in &shape.m_array {
            shp.write_f64(m.unwrap_or(NO_DATA))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{Writer, WriterOptions};
    use crate::attributes::{AttributeField, DateData, FieldData, FieldType};
    use crate::geometry::{PartType, Shape, ShapeType};
    use crate::reader::{Reader, ReaderOptions};
    use crate::structures::{BoundingBox, Point2D};
    use std::io::Cursor;

    fn buffers() -> (Cursor<Vec<u8>>, Cursor<Vec<u8>>, Cursor<Vec<u8>>) {
        (
            Cursor::new(Vec::new()),
            Cursor::new(Vec::new()),
            Cursor::new(Vec::new()),
        )
    }

    fn reopen(
        parts: (Option<Cursor<Vec<u8>>>, Option<Cursor<Vec<u8>>>, Option<Cursor<Vec<u8>>>),
    ) -> Reader<Cursor<Vec<u8>>> {
        Reader::new(parts.0, parts.1, parts.2, ReaderOptions::default()).unwrap()
    }

    #[test]
    fn test_point_round_trip() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions {
                shape_type: Some(ShapeType::Point),
                ..Default::default()
            },
        )
        .unwrap();
        writer
            .field("name", FieldType::Character, 5, 0)
            .unwrap();
        writer.point(122f64, 37f64).unwrap();
        writer
            .record(vec![FieldData::Text("p1".to_string())])
            .unwrap();
        let (shp, shx, dbf) = writer.into_parts().unwrap();

        // exact byte lengths from the format arithmetic
        assert_eq!(shp.as_ref().unwrap().get_ref().len(), 128);
        assert_eq!(shx.as_ref().unwrap().get_ref().len(), 108);

        let mut reader = reopen((shp, shx, dbf));
        assert_eq!(reader.len().unwrap(), 1);
        assert_eq!(reader.shape_type(), ShapeType::Point);
        assert_eq!(reader.shape_type_name(), "Point");
        let shape = reader.shape(0).unwrap();
        assert_eq!(shape.points, vec![Point2D::new(122f64, 37f64)]);
        assert_eq!(shape.oid, 0);
        let record = reader.record(0).unwrap();
        assert_eq!(record.values(), &[FieldData::Text("p1".to_string())]);
        // the file-level bbox collapses to the single point
        assert_eq!(
            reader.bbox().unwrap(),
            BoundingBox::new(122f64, 37f64, 122f64, 37f64)
        );
    }

    #[test]
    fn test_polygon_auto_close() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions {
                shape_type: Some(ShapeType::Polygon),
                auto_balance: true,
                ..Default::default()
            },
        )
        .unwrap();
        writer.field("id", FieldType::Numeric, 10, 0).unwrap();
        writer
            .poly(&[vec![
                Point2D::new(0f64, 0f64),
                Point2D::new(0f64, 1f64),
                Point2D::new(1f64, 1f64),
                Point2D::new(1f64, 0f64),
            ]])
            .unwrap();
        let mut reader = reopen(writer.into_parts().unwrap());
        let shape = reader.shape(0).unwrap();
        assert_eq!(shape.parts, vec![0]);
        assert_eq!(
            shape.points,
            vec![
                Point2D::new(0f64, 0f64),
                Point2D::new(0f64, 1f64),
                Point2D::new(1f64, 1f64),
                Point2D::new(1f64, 0f64),
                Point2D::new(0f64, 0f64),
            ]
        );
        assert_eq!(
            shape.bbox().unwrap(),
            BoundingBox::new(0f64, 0f64, 1f64, 1f64)
        );
    }

    #[test]
    fn test_degenerate_ring_rejected() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions::default(),
        )
        .unwrap();
        let result = writer.poly(&[vec![
            Point2D::new(0f64, 0f64),
            Point2D::new(1f64, 1f64),
            Point2D::new(0f64, 0f64),
        ]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_dbf_type_coverage() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions {
                shape_type: Some(ShapeType::Point),
                auto_balance: true,
                ..Default::default()
            },
        )
        .unwrap();
        writer.field("INT", FieldType::Numeric, 10, 0).unwrap();
        writer.field("FLT", FieldType::Numeric, 18, 10).unwrap();
        writer.field("TXT", FieldType::Character, 5, 0).unwrap();
        writer.field("BOOL", FieldType::Logical, 1, 0).unwrap();
        writer.field("DATE", FieldType::Date, 8, 0).unwrap();
        writer
            .record(vec![
                FieldData::Int(1),
                FieldData::Real(1.3217328),
                FieldData::Text("Hello".to_string()),
                FieldData::Bool(true),
                FieldData::Date(DateData::new(1998, 1, 30)),
            ])
            .unwrap();
        writer.record(vec![]).unwrap();
        let mut reader = reopen(writer.into_parts().unwrap());
        assert_eq!(reader.len().unwrap(), 2);
        let record = reader.record(0).unwrap();
        assert_eq!(
            record.values(),
            &[
                FieldData::Int(1),
                FieldData::Real(1.3217328),
                FieldData::Text("Hello".to_string()),
                FieldData::Bool(true),
                FieldData::Date(DateData::new(1998, 1, 30)),
            ]
        );
        let nulls = reader.record(1).unwrap();
        assert!(nulls.values().iter().all(|v| v.is_null()));
    }

    #[test]
    fn test_bbox_prefilter() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions {
                shape_type: Some(ShapeType::Point),
                ..Default::default()
            },
        )
        .unwrap();
        writer.field("id", FieldType::Numeric, 10, 0).unwrap();
        for x in 0..10 {
            for y in 0..10 {
                writer.point(x as f64, y as f64).unwrap();
                writer.record(vec![FieldData::Int(x * 10 + y)]).unwrap();
            }
        }
        let mut reader = reopen(writer.into_parts().unwrap());
        let filter = BoundingBox::new(3f64, 3f64, 5f64, 5f64);
        let shapes: Vec<_> = reader
            .iter_shapes(Some(filter))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(shapes.len(), 9);
        // ascending oid, and every point inside the inclusive box
        let mut last_oid = -1;
        for shape in &shapes {
            assert!(shape.oid > last_oid);
            last_oid = shape.oid;
            let p = shape.points[0];
            assert!((3f64..=5f64).contains(&p.x));
            assert!((3f64..=5f64).contains(&p.y));
        }
        // pairs survive the same filter
        let pairs = reader.shape_records(None, Some(filter)).unwrap();
        assert_eq!(pairs.len(), 9);
        for pair in &pairs {
            let p = pair.shape.points[0];
            assert_eq!(
                pair.record.values(),
                &[FieldData::Int((p.x as i64) * 10 + p.y as i64)]
            );
        }
    }

    #[test]
    fn test_missing_shx_random_access() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions {
                shape_type: Some(ShapeType::Point),
                ..Default::default()
            },
        )
        .unwrap();
        writer.field("id", FieldType::Numeric, 10, 0).unwrap();
        for i in 0..100 {
            writer.point((i / 10) as f64, (i % 10) as f64).unwrap();
            writer.record(vec![FieldData::Int(i)]).unwrap();
        }
        let (shp, _shx, dbf) = writer.into_parts().unwrap();
        // drop the index file entirely
        let mut reader = reopen((shp, None, dbf));
        let shape = reader.shape(42).unwrap();
        assert_eq!(shape.points, vec![Point2D::new(4f64, 2f64)]);
        assert_eq!(shape.get_length(), 20);
        // the scan that found 42 makes earlier shapes cheap
        let shape = reader.shape(10).unwrap();
        assert_eq!(shape.points, vec![Point2D::new(1f64, 0f64)]);
        assert!(reader.shape(100).is_err());
    }

    #[test]
    fn test_auto_balance_and_manual_balance() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions {
                shape_type: Some(ShapeType::Point),
                auto_balance: true,
                ..Default::default()
            },
        )
        .unwrap();
        writer.field("id", FieldType::Numeric, 10, 0).unwrap();
        // records and shapes arrive unevenly; auto-balance keeps the
        // counts in lockstep after every call
        writer.record(vec![FieldData::Int(1)]).unwrap();
        assert_eq!(writer.len(), 1);
        writer.point(1f64, 1f64).unwrap();
        writer.point(2f64, 2f64).unwrap();
        let mut reader = reopen(writer.into_parts().unwrap());
        assert_eq!(reader.len().unwrap(), 3);
        // the balancing shape for the first record is a null shape
        assert_eq!(reader.shape(0).unwrap().shape_type, ShapeType::Null);
        assert_eq!(reader.shape(1).unwrap().shape_type, ShapeType::Point);
        // the balancing record for the second point is all nulls
        assert!(reader.record(2).unwrap().values().iter().all(|v| v.is_null()));
    }

    #[test]
    fn test_unbalanced_close_fails() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions {
                shape_type: Some(ShapeType::Point),
                ..Default::default()
            },
        )
        .unwrap();
        writer.field("id", FieldType::Numeric, 10, 0).unwrap();
        writer.point(1f64, 1f64).unwrap();
        assert!(writer.close().is_err());
        // balancing by hand repairs the mismatch
        writer.balance().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_fields_frozen_after_first_record() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions::default(),
        )
        .unwrap();
        writer.field("a", FieldType::Numeric, 10, 0).unwrap();
        writer.record(vec![FieldData::Int(1)]).unwrap();
        assert!(writer
            .add_field(AttributeField::default_sized("b", FieldType::Character))
            .is_err());
    }

    #[test]
    fn test_shape_type_mismatch_rejected() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions {
                shape_type: Some(ShapeType::Point),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(writer.line(&[vec![
            Point2D::new(0f64, 0f64),
            Point2D::new(1f64, 1f64),
        ]]).is_err());
        // null shapes are always accepted
        writer.null().unwrap();
    }

    #[test]
    fn test_shape_type_adopted_from_first_shape() {
        let (shp, shx, dbf) = buffers();
        let mut writer =
            Writer::new(Some(shp), Some(shx), Some(dbf), WriterOptions::default()).unwrap();
        writer.null().unwrap();
        assert_eq!(writer.shape_type(), None);
        writer
            .multipoint(&[Point2D::new(0f64, 0f64), Point2D::new(1f64, 2f64)])
            .unwrap();
        assert_eq!(writer.shape_type(), Some(ShapeType::MultiPoint));
    }

    #[test]
    fn test_pointm_and_measures() {
        let (shp, shx, _) = buffers();
        let mut writer =
            Writer::new(Some(shp), Some(shx), None, WriterOptions::default()).unwrap();
        writer.pointm(1f64, 2f64, Some(3.5)).unwrap();
        writer.pointm(4f64, 5f64, None).unwrap();
        let mut reader = reopen(writer.into_parts().unwrap());
        assert_eq!(reader.shape_type(), ShapeType::PointM);
        let first = reader.shape(0).unwrap();
        assert_eq!(first.measure(0), Some(3.5));
        let second = reader.shape(1).unwrap();
        assert_eq!(second.measure(0), None);
        // the all-missing record drags the file-level minimum down to
        // the sentinel, which reads back as missing
        assert_eq!(reader.m_range().unwrap(), [None, Some(3.5)]);
    }

    #[test]
    fn test_polylinez_round_trip_with_and_without_m() {
        let (shp, shx, _) = buffers();
        let mut writer =
            Writer::new(Some(shp), Some(shx), None, WriterOptions::default()).unwrap();
        let points = vec![Point2D::new(0f64, 0f64), Point2D::new(1f64, 1f64)];
        writer
            .linez(
                &[points.clone()],
                &[vec![5f64, 6f64]],
                &[vec![Some(0.25), None]],
            )
            .unwrap();
        // a shape built without measures is stored without the block
        let mut bare = Shape::new(ShapeType::PolyLineZ);
        bare.add_part(&points);
        bare.z_array = vec![7f64, 8f64];
        bare.z_min = 7f64;
        bare.z_max = 8f64;
        writer.shape(bare).unwrap();
        let mut reader = reopen(writer.into_parts().unwrap());

        let with_m = reader.shape(0).unwrap();
        assert_eq!(with_m.z_array, vec![5f64, 6f64]);
        assert_eq!(with_m.m_array, vec![Some(0.25), None]);
        assert_eq!(with_m.get_length(), 44 + 4 + 32 + 16 + 16 + 16 + 16);

        let without_m = reader.shape(1).unwrap();
        assert_eq!(without_m.z_array, vec![7f64, 8f64]);
        assert!(!without_m.has_m_data());
        assert_eq!(without_m.get_length(), 44 + 4 + 32 + 16 + 16);
    }

    #[test]
    fn test_multipatch_round_trip() {
        let (shp, shx, _) = buffers();
        let mut writer =
            Writer::new(Some(shp), Some(shx), None, WriterOptions::default()).unwrap();
        writer
            .multipatch(
                &[vec![
                    Point2D::new(0f64, 0f64),
                    Point2D::new(1f64, 0f64),
                    Point2D::new(0f64, 1f64),
                    Point2D::new(1f64, 1f64),
                ]],
                &[PartType::TriangleStrip],
                &[vec![0f64, 1f64, 2f64, 3f64]],
                &[vec![None, None, None, None]],
            )
            .unwrap();
        let mut reader = reopen(writer.into_parts().unwrap());
        let patch = reader.shape(0).unwrap();
        assert_eq!(patch.shape_type, ShapeType::MultiPatch);
        assert_eq!(patch.part_types, vec![PartType::TriangleStrip]);
        assert_eq!(patch.z_array, vec![0f64, 1f64, 2f64, 3f64]);
        assert_eq!(reader.z_range().unwrap(), [0f64, 3f64]);
    }

    #[test]
    fn test_round_trip_bit_identity() {
        let (shp, shx, dbf) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            Some(dbf),
            WriterOptions::default(),
        )
        .unwrap();
        writer.field("id", FieldType::Numeric, 10, 0).unwrap();
        writer.field("name", FieldType::Character, 8, 0).unwrap();
        writer
            .poly(&[
                vec![
                    Point2D::new(0f64, 0f64),
                    Point2D::new(0f64, 10f64),
                    Point2D::new(10f64, 10f64),
                    Point2D::new(10f64, 0f64),
                ],
                vec![
                    Point2D::new(2f64, 2f64),
                    Point2D::new(4f64, 2f64),
                    Point2D::new(4f64, 4f64),
                    Point2D::new(2f64, 4f64),
                ],
            ])
            .unwrap();
        writer
            .record(vec![FieldData::Int(7), FieldData::Text("first".to_string())])
            .unwrap();
        writer.null().unwrap();
        writer.record(vec![FieldData::Null, FieldData::Null]).unwrap();
        let (shp, shx, dbf) = writer.into_parts().unwrap();
        let shp_bytes = shp.as_ref().unwrap().get_ref().clone();
        let shx_bytes = shx.as_ref().unwrap().get_ref().clone();
        let dbf_bytes = dbf.as_ref().unwrap().get_ref().clone();

        // read everything back and write it again with the same schema
        let mut reader = reopen((shp, shx, dbf));
        let (shp2, shx2, dbf2) = buffers();
        let mut writer = Writer::new(
            Some(shp2),
            Some(shx2),
            Some(dbf2),
            WriterOptions {
                shape_type: Some(reader.shape_type()),
                ..Default::default()
            },
        )
        .unwrap();
        for field in reader.fields().iter().skip(1).cloned().collect::<Vec<_>>() {
            writer.add_field(field).unwrap();
        }
        let pairs = reader.shape_records(None, None).unwrap();
        for pair in pairs {
            writer.shape(pair.shape).unwrap();
            writer.record(pair.record.into_values()).unwrap();
        }
        let (shp2, shx2, dbf2) = writer.into_parts().unwrap();
        assert_eq!(shp2.as_ref().unwrap().get_ref(), &shp_bytes);
        assert_eq!(shx2.as_ref().unwrap().get_ref(), &shx_bytes);
        // the dbf matches except for the last-update date bytes 1..4
        let dbf2_bytes = dbf2.as_ref().unwrap().get_ref().clone();
        assert_eq!(dbf2_bytes.len(), dbf_bytes.len());
        assert_eq!(dbf2_bytes[0], dbf_bytes[0]);
        assert_eq!(&dbf2_bytes[4..], &dbf_bytes[4..]);
    }

    #[test]
    fn test_record_count_matches_shx_offsets() {
        let (shp, shx, _) = buffers();
        let mut writer =
            Writer::new(Some(shp), Some(shx), None, WriterOptions::default()).unwrap();
        writer
            .line(&[vec![Point2D::new(0f64, 0f64), Point2D::new(5f64, 5f64)]])
            .unwrap();
        writer
            .line(&[vec![Point2D::new(1f64, 1f64), Point2D::new(2f64, 2f64)]])
            .unwrap();
        let (shp, shx, _dbf) = writer.into_parts().unwrap();
        let shp_bytes = shp.as_ref().unwrap().get_ref().clone();
        let shx_bytes = shx.as_ref().unwrap().get_ref().clone();
        // shx entry i points at the record-number field of shp record i
        for i in 0..2usize {
            let at = 100 + 8 * i;
            let offset_words =
                i32::from_be_bytes(shx_bytes[at..at + 4].try_into().unwrap()) as usize;
            let rec_num = i32::from_be_bytes(
                shp_bytes[offset_words * 2..offset_words * 2 + 4]
                    .try_into()
                    .unwrap(),
            );
            assert_eq!(rec_num as usize, i + 1);
        }
        // declared file length matches the actual byte length
        let file_length_words =
            i32::from_be_bytes(shp_bytes[24..28].try_into().unwrap()) as usize;
        assert_eq!(file_length_words * 2, shp_bytes.len());
        let file_length_words =
            i32::from_be_bytes(shx_bytes[24..28].try_into().unwrap()) as usize;
        assert_eq!(file_length_words * 2, shx_bytes.len());
    }

    #[test]
    fn test_unknown_shape_type_skipped() {
        let (shp, shx, _) = buffers();
        let mut writer = Writer::new(
            Some(shp),
            Some(shx),
            None,
            WriterOptions::default(),
        )
        .unwrap();
        writer.point(1f64, 2f64).unwrap();
        writer.point(3f64, 4f64).unwrap();
        let (shp, shx, _dbf) = writer.into_parts().unwrap();
        // corrupt the first record's shape type code in place
        let mut bytes = shp.unwrap().into_inner();
        bytes[108..112].copy_from_slice(&99i32.to_le_bytes());
        let mut reader = Reader::new(
            Some(Cursor::new(bytes)),
            shx,
            None,
            ReaderOptions {
                verbose: false,
                ..Default::default()
            },
        )
        .unwrap();
        // the decoder skips the payload and yields a null-equivalent
        let shape = reader.shape(0).unwrap();
        assert_eq!(shape.shape_type, ShapeType::Null);
        assert!(shape.points.is_empty());
        // the following record is unaffected
        let shape = reader.shape(1).unwrap();
        assert_eq!(shape.points, vec![Point2D::new(3f64, 4f64)]);
    }

    #[test]
    fn test_close_requires_fields_for_dbf() {
        let (shp, shx, dbf) = buffers();
        let mut writer =
            Writer::new(Some(shp), Some(shx), Some(dbf), WriterOptions::default()).unwrap();
        assert!(writer.close().is_err());
        writer.field("id", FieldType::Numeric, 10, 0).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_record_map() {
        use std::collections::HashMap;
        let (_, _, dbf) = buffers();
        let mut writer = Writer::new(None, None, Some(dbf), WriterOptions::default()).unwrap();
        writer.field("a", FieldType::Numeric, 10, 0).unwrap();
        writer.field("b", FieldType::Character, 5, 0).unwrap();
        let mut values = HashMap::new();
        values.insert("b".to_string(), FieldData::Text("x".to_string()));
        writer.record_map(&values).unwrap();
        let (_shp, _shx, dbf) = writer.into_parts().unwrap();
        let mut reader = Reader::new(None, None, dbf, ReaderOptions::default()).unwrap();
        let record = reader.record(0).unwrap();
        assert_eq!(record[0], FieldData::Null);
        assert_eq!(record[1], FieldData::Text("x".to_string()));
    }

    #[test]
    fn test_geometry_routing() {
        use crate::geojson::{Coord, Geometry};
        let (shp, shx, _) = buffers();
        let mut writer =
            Writer::new(Some(shp), Some(shx), None, WriterOptions::default()).unwrap();
        // the file type is derived from the first geometry
        let polygon = Geometry::Polygon(vec![vec![
            Coord::new(0f64, 0f64),
            Coord::new(0f64, 5f64),
            Coord::new(5f64, 5f64),
            Coord::new(5f64, 0f64),
            Coord::new(0f64, 0f64),
        ]]);
        writer.geometry(&polygon).unwrap();
        assert_eq!(writer.shape_type(), Some(ShapeType::Polygon));
        // a mismatched geometry is rejected
        let line = Geometry::LineString(vec![Coord::new(0f64, 0f64), Coord::new(1f64, 1f64)]);
        assert!(writer.geometry(&line).is_err());
        let mut reader = reopen(writer.into_parts().unwrap());
        let shape = reader.shape(0).unwrap();
        assert_eq!(shape.geometry().unwrap(), polygon);
    }

    #[test]
    fn test_file_triplet_with_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("places");
        let mut writer = Writer::create(
            &base,
            WriterOptions {
                encoding: Some("cp1252".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        writer.field("name", FieldType::Character, 10, 0).unwrap();
        writer.point(2.35, 48.86).unwrap();
        writer
            .record(vec![FieldData::Text("Orléans".to_string())])
            .unwrap();
        writer
            .write_projection("GEOGCS[\"GCS_WGS_1984\"]")
            .unwrap();
        writer.close().unwrap();

        for ext in ["shp", "shx", "dbf", "cpg", "prj"] {
            assert!(base.with_extension(ext).exists(), "missing .{}", ext);
        }
        // the reader picks the encoding up from the cpg sidecar
        let mut reader = Reader::open(base.with_extension("shp")).unwrap();
        assert_eq!(reader.encoding().label(), "windows-1252");
        assert_eq!(reader.projection(), "GEOGCS[\"GCS_WGS_1984\"]");
        assert_eq!(reader.len().unwrap(), 1);
        assert_eq!(
            reader.record(0).unwrap()[0],
            FieldData::Text("Orléans".to_string())
        );
    }

    #[test]
    fn test_range_iteration() {
        let (shp, shx, dbf) = buffers();
        let mut writer =
            Writer::new(Some(shp), Some(shx), Some(dbf), WriterOptions::default()).unwrap();
        writer.field("id", FieldType::Numeric, 10, 0).unwrap();
        for i in 0..10 {
            writer.point(i as f64, 0f64).unwrap();
            writer.record(vec![FieldData::Int(i)]).unwrap();
        }
        let mut reader = reopen(writer.into_parts().unwrap());
        let records: Vec<_> = reader
            .iter_records_range(3, 6, None)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0][0], FieldData::Int(3));
        assert_eq!(records[2][0], FieldData::Int(5));
        let shapes: Vec<_> = reader
            .iter_shapes_range(8, 20, None)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].points[0].x, 8f64);
    }
}
