/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT

Notes: Read and write support for the ESRI Shapefile format: the .shp
geometry file, the .shx offset index, and the .dbf attribute table, with
optional .prj and .cpg sidecars.
*/

//! ShapeIO reads and writes ESRI Shapefiles.
//!
//! The [`Reader`] parses file headers eagerly and record bodies lazily,
//! supports random access by record index with or without an index file,
//! and offers bounding-box and field-subset filtered iteration. The
//! [`Writer`] streams shape/record pairs to disk in a single pass and
//! finalizes the headers on close.
//!
//! ```no_run
//! use shapeio::{FieldData, FieldType, Reader, Writer, WriterOptions};
//!
//! fn main() -> shapeio::Result<()> {
//!     let mut writer = Writer::create("cities", WriterOptions::default())?;
//!     writer.field("name", FieldType::Character, 50, 0)?;
//!     writer.point(-122.4, 37.8)?;
//!     writer.record(vec![FieldData::Text("San Francisco".to_string())])?;
//!     writer.close()?;
//!
//!     let mut reader = Reader::open("cities.shp")?;
//!     for shape in reader.iter_shapes(None)? {
//!         println!("{}", shape?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod algorithms;
pub mod attributes;
pub mod encoding;
pub mod error;
pub mod geojson;
pub mod geometry;
pub mod header;
pub mod reader;
pub mod structures;
pub mod utils;
pub mod writer;

pub use crate::attributes::{
    AttributeField, AttributeHeader, DateData, FieldData, FieldType, Record, MAX_FIELDS,
};
pub use crate::encoding::{EncodingErrors, TextEncoding};
pub use crate::error::{Result, ShapefileError};
pub use crate::geojson::{Coord, Feature, FeatureCollection, Geometry};
pub use crate::geometry::{PartType, Shape, ShapeType, NO_DATA};
pub use crate::header::ShapefileHeader;
pub use crate::reader::{Reader, ReaderOptions, ShapeRecord};
pub use crate::structures::{BoundingBox, Point2D};
pub use crate::writer::{Writer, WriterOptions};
