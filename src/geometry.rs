/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT

Notes: The in-memory model for one variable-length geometry record of a
.shp file, covering all fourteen standard shape types.
*/
use crate::algorithms::is_clockwise_order;
use crate::structures::{BoundingBox, Point2D};
use std::f64;
use std::fmt;
use std::ops::Range;

/// The value written to the file for a missing measure.
pub const NO_DATA: f64 = -10e38;

/// Stored measure values below this threshold represent "no data".
pub(crate) const NO_DATA_THRESHOLD: f64 = -1e38;

/// Maps a stored measure to an optional value, applying the no-data
/// sentinel rule.
pub(crate) fn measure_from_raw(value: f64) -> Option<f64> {
    if value < NO_DATA_THRESHOLD {
        None
    } else {
        Some(value)
    }
}

#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShapeType {
    Null = 0,
    Point = 1,
    PolyLine = 3,
    Polygon = 5,
    MultiPoint = 8,
    PointZ = 11,
    PolyLineZ = 13,
    PolygonZ = 15,
    MultiPointZ = 18,
    PointM = 21,
    PolyLineM = 23,
    PolygonM = 25,
    MultiPointM = 28,
    MultiPatch = 31,
}

impl ShapeType {
    pub fn from_int(value: i32) -> Option<ShapeType> {
        match value {
            0 => Some(ShapeType::Null),
            1 => Some(ShapeType::Point),
            3 => Some(ShapeType::PolyLine),
            5 => Some(ShapeType::Polygon),
            8 => Some(ShapeType::MultiPoint),
            11 => Some(ShapeType::PointZ),
            13 => Some(ShapeType::PolyLineZ),
            15 => Some(ShapeType::PolygonZ),
            18 => Some(ShapeType::MultiPointZ),
            21 => Some(ShapeType::PointM),
            23 => Some(ShapeType::PolyLineM),
            25 => Some(ShapeType::PolygonM),
            28 => Some(ShapeType::MultiPointM),
            31 => Some(ShapeType::MultiPatch),
            _ => None,
        }
    }

    pub fn to_int(&self) -> i32 {
        *self as i32
    }

    /// The XY shape family this type belongs to, ignoring the Z and M
    /// dimensions. MultiPatch is its own family.
    pub fn base_shape_type(&self) -> ShapeType {
        match self {
            ShapeType::Null => ShapeType::Null,
            ShapeType::Point | ShapeType::PointZ | ShapeType::PointM => ShapeType::Point,
            ShapeType::PolyLine | ShapeType::PolyLineZ | ShapeType::PolyLineM => {
                ShapeType::PolyLine
            }
            ShapeType::Polygon | ShapeType::PolygonZ | ShapeType::PolygonM => ShapeType::Polygon,
            ShapeType::MultiPoint | ShapeType::MultiPointZ | ShapeType::MultiPointM => {
                ShapeType::MultiPoint
            }
            ShapeType::MultiPatch => ShapeType::MultiPatch,
        }
    }

    /// True for types carrying one elevation per point.
    pub fn has_z(&self) -> bool {
        matches!(
            self,
            ShapeType::PointZ
                | ShapeType::PolyLineZ
                | ShapeType::PolygonZ
                | ShapeType::MultiPointZ
                | ShapeType::MultiPatch
        )
    }

    /// True for types carrying one measure per point. Z types carry
    /// measures as well.
    pub fn has_m(&self) -> bool {
        self.has_z()
            || matches!(
                self,
                ShapeType::PointM
                    | ShapeType::PolyLineM
                    | ShapeType::PolygonM
                    | ShapeType::MultiPointM
            )
    }
}

impl Default for ShapeType {
    fn default() -> ShapeType {
        ShapeType::Null
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let printable = match *self {
            ShapeType::Null => "Null",
            ShapeType::Point => "Point",
            ShapeType::PolyLine => "PolyLine",
            ShapeType::Polygon => "Polygon",
            ShapeType::MultiPoint => "MultiPoint",
            ShapeType::PointZ => "PointZ",
            ShapeType::PolyLineZ => "PolyLineZ",
            ShapeType::PolygonZ => "PolygonZ",
            ShapeType::MultiPointZ => "MultiPointZ",
            ShapeType::PointM => "PointM",
            ShapeType::PolyLineM => "PolyLineM",
            ShapeType::PolygonM => "PolygonM",
            ShapeType::MultiPointM => "MultiPointM",
            ShapeType::MultiPatch => "MultiPatch",
        };
        write!(f, "{}", printable)
    }
}

/// The surface patch type of one MultiPatch part.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PartType {
    TriangleStrip = 0,
    TriangleFan = 1,
    OuterRing = 2,
    InnerRing = 3,
    FirstRing = 4,
    Ring = 5,
}

impl PartType {
    pub fn from_int(value: i32) -> Option<PartType> {
        match value {
            0 => Some(PartType::TriangleStrip),
            1 => Some(PartType::TriangleFan),
            2 => Some(PartType::OuterRing),
            3 => Some(PartType::InnerRing),
            4 => Some(PartType::FirstRing),
            5 => Some(PartType::Ring),
            _ => None,
        }
    }

    pub fn to_int(&self) -> i32 {
        *self as i32
    }
}

impl fmt::Display for PartType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let printable = match *self {
            PartType::TriangleStrip => "TriangleStrip",
            PartType::TriangleFan => "TriangleFan",
            PartType::OuterRing => "OuterRing",
            PartType::InnerRing => "InnerRing",
            PartType::FirstRing => "FirstRing",
            PartType::Ring => "Ring",
        };
        write!(f, "{}", printable)
    }
}

/// One geometry record of a .shp file.
///
/// `parts` holds the start index of each part within `points`; for
/// single-part shapes it is `[0]`. `part_types` is populated for
/// MultiPatch only. `z_array` is populated for Z types and MultiPatch.
/// `m_array` holds one optional measure per point; it is left empty when
/// the record's measure block was absent on disk, and a shape written
/// with an empty `m_array` omits the block again.
#[derive(Clone, Debug)]
pub struct Shape {
    pub shape_type: ShapeType,
    /// Zero-based record index within its file; -1 until assigned by a
    /// reader or writer.
    pub oid: i32,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub num_parts: i32,
    pub num_points: i32,
    pub parts: Vec<i32>,
    pub part_types: Vec<PartType>,
    pub points: Vec<Point2D>,
    pub z_min: f64,
    pub z_max: f64,
    pub z_array: Vec<f64>,
    pub m_min: f64,
    pub m_max: f64,
    pub m_array: Vec<Option<f64>>,
}

impl Default for Shape {
    fn default() -> Shape {
        Shape {
            shape_type: ShapeType::Null,
            oid: -1,
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
            num_parts: 0i32,
            num_points: 0i32,
            parts: vec![],
            part_types: vec![],
            points: vec![],
            z_min: f64::INFINITY,
            z_max: f64::NEG_INFINITY,
            z_array: vec![],
            m_min: f64::INFINITY,
            m_max: f64::NEG_INFINITY,
            m_array: vec![],
        }
    }
}

impl Shape {
    /// Shape constructor method.
    pub fn new(shape_type: ShapeType) -> Shape {
        Shape {
            shape_type,
            ..Default::default()
        }
    }

    fn expand_xy(&mut self, p: Point2D) {
        if p.x < self.x_min {
            self.x_min = p.x;
        }
        if p.x > self.x_max {
            self.x_max = p.x;
        }
        if p.y < self.y_min {
            self.y_min = p.y;
        }
        if p.y > self.y_max {
            self.y_max = p.y;
        }
    }

    fn expand_m(&mut self, m: Option<f64>) {
        if let Some(m) = m {
            if m < self.m_min {
                self.m_min = m;
            }
            if m > self.m_max {
                self.m_max = m;
            }
        }
    }

    fn expand_z(&mut self, z: f64) {
        if z < self.z_min {
            self.z_min = z;
        }
        if z > self.z_max {
            self.z_max = z;
        }
    }

    /// Adds a single Point2D to the shape's points array.
    pub fn add_point(&mut self, p: Point2D) {
        self.points.push(p);
        self.num_points += 1;
        self.expand_xy(p);
    }

    /// Adds a single Point2D and measure to the shape.
    pub fn add_pointm(&mut self, p: Point2D, m: Option<f64>) {
        self.add_point(p);
        self.m_array.push(m);
        self.expand_m(m);
    }

    /// Adds a single Point2D, elevation, and measure to the shape.
    pub fn add_pointz(&mut self, p: Point2D, z: f64, m: Option<f64>) {
        self.add_pointm(p, m);
        self.z_array.push(z);
        self.expand_z(z);
    }

    /// Adds a part of Point2Ds to the shape.
    pub fn add_part(&mut self, points: &[Point2D]) {
        self.parts.push(self.points.len() as i32);
        self.num_parts += 1i32;
        for p in points {
            self.points.push(*p);
            self.expand_xy(*p);
        }
        self.num_points += points.len() as i32;
    }

    /// Adds a part of Point2Ds and measures to the shape.
    ///
    /// Panics when the points and measures arrays differ in length.
    pub fn add_partm(&mut self, points: &[Point2D], measures: &[Option<f64>]) {
        if points.len() != measures.len() {
            panic!("Error adding part to Shape. Points and measures arrays must be equal length.");
        }
        self.add_part(points);
        for m in measures {
            self.m_array.push(*m);
            self.expand_m(*m);
        }
    }

    /// Adds a part of Point2Ds, elevations, and measures to the shape.
    ///
    /// Panics when the array lengths differ.
    pub fn add_partz(&mut self, points: &[Point2D], z_values: &[f64], measures: &[Option<f64>]) {
        if points.len() != z_values.len() {
            panic!("Error adding part to Shape. Points and z arrays must be equal length.");
        }
        self.add_partm(points, measures);
        for z in z_values {
            self.z_array.push(*z);
            self.expand_z(*z);
        }
    }

    /// Adds one typed surface patch to a MultiPatch shape.
    pub fn add_patch(
        &mut self,
        points: &[Point2D],
        part_type: PartType,
        z_values: &[f64],
        measures: &[Option<f64>],
    ) {
        self.add_partz(points, z_values, measures);
        self.part_types.push(part_type);
    }

    /// The half-open range of point indices belonging to part `i`.
    pub fn part_range(&self, i: usize) -> Range<usize> {
        let start = self.parts[i] as usize;
        let end = if i + 1 < self.parts.len() {
            self.parts[i + 1] as usize
        } else {
            self.points.len()
        };
        start..end
    }

    /// The shape's bounding box, absent for Null shapes and shapes with
    /// no coordinate data.
    pub fn bbox(&self) -> Option<BoundingBox> {
        if self.shape_type == ShapeType::Null || self.points.is_empty() {
            return None;
        }
        Some(BoundingBox::new(
            self.x_min, self.y_min, self.x_max, self.y_max,
        ))
    }

    /// Whether the record carries a measure block. Records read from
    /// files that omit the optional block report false, and are written
    /// back without one.
    pub fn has_m_data(&self) -> bool {
        !self.m_array.is_empty()
    }

    /// The measure of point `i`, if the record carries measures and the
    /// stored value is not the no-data sentinel.
    pub fn measure(&self, i: usize) -> Option<f64> {
        self.m_array.get(i).copied().flatten()
    }

    /// Checks whether a part in a polygon is a hole, i.e. runs
    /// counter-clockwise.
    pub fn is_hole(&self, part_num: i32) -> bool {
        if self.shape_type.base_shape_type() != ShapeType::Polygon {
            return false;
        }
        if part_num < 0 || part_num > self.num_parts - 1 {
            return false;
        }
        let range = self.part_range(part_num as usize);
        if range.len() < 3 || range.end > self.points.len() {
            return false;
        }
        !is_clockwise_order(&self.points[range])
    }

    /// Returns the record's content length in bytes, excluding the
    /// 8-byte record header. The measure block is counted only when
    /// present.
    pub fn get_length(&self) -> i32 {
        let n = self.points.len() as i32;
        let p = self.parts.len() as i32;
        let m = if self.has_m_data() { 1i32 } else { 0i32 };
        4i32 + match self.shape_type {
            ShapeType::Null => 0,

            ShapeType::Point => 16,
            ShapeType::PointM => 16 + m * 8,
            ShapeType::PointZ => 16 + 8 + m * 8,

            ShapeType::MultiPoint => 36 + 16 * n,
            ShapeType::MultiPointM => 36 + 16 * n + m * (16 + 8 * n),
            ShapeType::MultiPointZ => 36 + 16 * n + 16 + 8 * n + m * (16 + 8 * n),

            ShapeType::PolyLine | ShapeType::Polygon => 40 + 4 * p + 16 * n,
            ShapeType::PolyLineM | ShapeType::PolygonM => {
                40 + 4 * p + 16 * n + m * (16 + 8 * n)
            }
            ShapeType::PolyLineZ | ShapeType::PolygonZ => {
                40 + 4 * p + 16 * n + 16 + 8 * n + m * (16 + 8 * n)
            }

            ShapeType::MultiPatch => 40 + 8 * p + 16 * n + 16 + 8 * n + m * (16 + 8 * n),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Shape #{}: {} ({} parts, {} points)",
            self.oid, self.shape_type, self.num_parts, self.num_points
        )
    }
}

#[cfg(test)]
mod test {
    use super::{measure_from_raw, PartType, Shape, ShapeType, NO_DATA};
    use crate::structures::Point2D;

    #[test]
    fn test_shape_type_codes() {
        for code in [0, 1, 3, 5, 8, 11, 13, 15, 18, 21, 23, 25, 28, 31] {
            let st = ShapeType::from_int(code).unwrap();
            assert_eq!(st.to_int(), code);
        }
        assert_eq!(ShapeType::from_int(2), None);
        assert_eq!(ShapeType::from_int(99), None);
    }

    #[test]
    fn test_dimensions() {
        assert!(ShapeType::PolyLineZ.has_z());
        assert!(ShapeType::PolyLineZ.has_m());
        assert!(!ShapeType::PolyLineM.has_z());
        assert!(ShapeType::PolyLineM.has_m());
        assert!(ShapeType::MultiPatch.has_z());
        assert!(!ShapeType::Polygon.has_m());
        assert_eq!(
            ShapeType::PolygonZ.base_shape_type(),
            ShapeType::Polygon
        );
    }

    #[test]
    fn test_add_part_updates_extent() {
        let mut shape = Shape::new(ShapeType::PolyLine);
        shape.add_part(&[Point2D::new(0f64, 0f64), Point2D::new(2f64, 3f64)]);
        shape.add_part(&[Point2D::new(-1f64, 1f64), Point2D::new(1f64, 1f64)]);
        assert_eq!(shape.num_parts, 2);
        assert_eq!(shape.num_points, 4);
        assert_eq!(shape.parts, vec![0, 2]);
        assert_eq!(shape.x_min, -1f64);
        assert_eq!(shape.y_max, 3f64);
        assert_eq!(shape.part_range(0), 0..2);
        assert_eq!(shape.part_range(1), 2..4);
    }

    #[test]
    fn test_measure_extent_ignores_missing() {
        let mut shape = Shape::new(ShapeType::MultiPointM);
        shape.add_pointm(Point2D::new(0f64, 0f64), Some(5f64));
        shape.add_pointm(Point2D::new(1f64, 1f64), None);
        shape.add_pointm(Point2D::new(2f64, 2f64), Some(7f64));
        assert_eq!(shape.m_min, 5f64);
        assert_eq!(shape.m_max, 7f64);
        assert_eq!(shape.measure(1), None);
        assert!(shape.has_m_data());
    }

    #[test]
    fn test_no_data_sentinel() {
        assert_eq!(measure_from_raw(NO_DATA), None);
        assert_eq!(measure_from_raw(-2e38), None);
        assert_eq!(measure_from_raw(-1e38), Some(-1e38));
        assert_eq!(measure_from_raw(0f64), Some(0f64));
    }

    #[test]
    fn test_record_lengths() {
        let mut point = Shape::new(ShapeType::Point);
        point.add_point(Point2D::new(122f64, 37f64));
        assert_eq!(point.get_length(), 20);

        assert_eq!(Shape::new(ShapeType::Null).get_length(), 4);

        let mut line = Shape::new(ShapeType::PolyLine);
        line.add_part(&[Point2D::new(0f64, 0f64), Point2D::new(1f64, 1f64)]);
        assert_eq!(line.get_length(), 44 + 4 + 32);

        // a PolyLineZ without measures omits the m block
        let mut linez = Shape::new(ShapeType::PolyLineZ);
        linez.add_part(&[Point2D::new(0f64, 0f64), Point2D::new(1f64, 1f64)]);
        assert_eq!(linez.get_length(), 44 + 4 + 32 + 16 + 16);
        // and one with measures includes it
        let mut linezm = Shape::new(ShapeType::PolyLineZ);
        linezm.add_partz(
            &[Point2D::new(0f64, 0f64), Point2D::new(1f64, 1f64)],
            &[1f64, 2f64],
            &[Some(0f64), None],
        );
        assert_eq!(linezm.get_length(), 44 + 4 + 32 + 16 + 16 + 16 + 16);
    }

    #[test]
    fn test_multipatch_builder() {
        let mut patch = Shape::new(ShapeType::MultiPatch);
        patch.add_patch(
            &[
                Point2D::new(0f64, 0f64),
                Point2D::new(1f64, 0f64),
                Point2D::new(0f64, 1f64),
                Point2D::new(1f64, 1f64),
            ],
            PartType::TriangleStrip,
            &[0f64, 0f64, 0f64, 0f64],
            &[None, None, None, None],
        );
        assert_eq!(patch.part_types, vec![PartType::TriangleStrip]);
        assert_eq!(patch.num_points, 4);
        assert_eq!(patch.get_length(), 44 + 8 + 64 + 16 + 32 + 16 + 32);
    }

    #[test]
    fn test_is_hole() {
        let mut poly = Shape::new(ShapeType::Polygon);
        // clockwise exterior
        poly.add_part(&[
            Point2D::new(0f64, 0f64),
            Point2D::new(0f64, 10f64),
            Point2D::new(10f64, 10f64),
            Point2D::new(10f64, 0f64),
            Point2D::new(0f64, 0f64),
        ]);
        // counter-clockwise hole
        poly.add_part(&[
            Point2D::new(2f64, 2f64),
            Point2D::new(4f64, 2f64),
            Point2D::new(4f64, 4f64),
            Point2D::new(2f64, 4f64),
            Point2D::new(2f64, 2f64),
        ]);
        assert!(!poly.is_hole(0));
        assert!(poly.is_hole(1));
        assert!(!poly.is_hole(2));
    }
}
