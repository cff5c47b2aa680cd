/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT

Notes: Conversion between shapefile geometry records and a typed
GeoJSON-equivalent object model. Polygon rings are grouped into polygons
with holes by their orientation: exteriors run clockwise, holes
counter-clockwise, and a hole belongs to the nearest preceding exterior
whose envelope contains it.
*/
use crate::algorithms::signed_area;
use crate::attributes::FieldData;
use crate::error::{Result, ShapefileError};
use crate::geometry::{PartType, Shape, ShapeType};
use crate::reader::{Reader, ShapeRecord};
use crate::structures::{BoundingBox, Point2D};
use log::warn;
use std::io::{Read, Seek};

/// One position, with optional elevation and measure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Coord {
        Coord {
            x,
            y,
            z: None,
            m: None,
        }
    }

    fn as_point(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

impl From<(f64, f64)> for Coord {
    fn from(xy: (f64, f64)) -> Coord {
        Coord::new(xy.0, xy.1)
    }
}

/// A GeoJSON-equivalent geometry. `Point(None)` stands in for an empty
/// point, which GeoJSON models as empty coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point(Option<Coord>),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::GeometryCollection(_) => "GeometryCollection",
        }
    }

    /// The XY shape type a writer derives for this geometry when the
    /// file's type has not been fixed yet.
    pub fn default_shape_type(&self) -> Result<ShapeType> {
        match self {
            Geometry::Point(_) => Ok(ShapeType::Point),
            Geometry::MultiPoint(_) => Ok(ShapeType::MultiPoint),
            Geometry::LineString(_) | Geometry::MultiLineString(_) => Ok(ShapeType::PolyLine),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Ok(ShapeType::Polygon),
            Geometry::GeometryCollection(_) => Err(ShapefileError::Value(
                "geometry collections cannot be written as a single shape".to_string(),
            )),
        }
    }

    /// Collects non-null shapes into a geometry collection.
    pub fn collection_from_shapes(shapes: &[Shape]) -> Result<Geometry> {
        let mut geometries = Vec::with_capacity(shapes.len());
        for shape in shapes {
            if shape.shape_type == ShapeType::Null {
                continue;
            }
            geometries.push(shape.geometry()?);
        }
        Ok(Geometry::GeometryCollection(geometries))
    }
}

/// A feature pairing an optional geometry with attribute properties.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub properties: Vec<(String, FieldData)>,
}

/// The whole-file view: every shape/record pair as a feature.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureCollection {
    pub bbox: Option<[f64; 4]>,
    pub features: Vec<Feature>,
}

fn ring_is_clockwise(ring: &[Coord]) -> bool {
    let points: Vec<Point2D> = ring.iter().map(Coord::as_point).collect();
    signed_area(&points) < 0f64
}

fn closed(mut ring: Vec<Coord>) -> Vec<Coord> {
    if ring.len() > 1 && ring[0] != ring[ring.len() - 1] {
        ring.push(ring[0]);
    }
    ring
}

impl Shape {
    fn coord(&self, i: usize) -> Coord {
        Coord {
            x: self.points[i].x,
            y: self.points[i].y,
            z: if self.shape_type.has_z() {
                self.z_array.get(i).copied()
            } else {
                None
            },
            m: if self.shape_type.has_m() {
                self.measure(i)
            } else {
                None
            },
        }
    }

    fn part_coords(&self, part: usize) -> Result<Vec<Coord>> {
        let range = self.part_range(part);
        if range.start > range.end || range.end > self.points.len() {
            return Err(ShapefileError::MalformedFile(format!(
                "part {} of shape {} has an invalid point range",
                part, self.oid
            )));
        }
        Ok(range.map(|i| self.coord(i)).collect())
    }

    /// The GeoJSON-equivalent view of this shape. Null shapes have no
    /// geometry; use [`ShapeRecord::feature`] for a null-aware view.
    pub fn geometry(&self) -> Result<Geometry> {
        match self.shape_type.base_shape_type() {
            ShapeType::Null => Err(ShapefileError::Value(
                "null shapes have no geometry".to_string(),
            )),
            ShapeType::Point => {
                if self.points.is_empty() {
                    return Ok(Geometry::Point(None));
                }
                Ok(Geometry::Point(Some(self.coord(0))))
            }
            ShapeType::MultiPoint => Ok(Geometry::MultiPoint(
                (0..self.points.len()).map(|i| self.coord(i)).collect(),
            )),
            ShapeType::PolyLine => {
                if self.parts.is_empty() {
                    return Ok(Geometry::LineString(vec![]));
                }
                if self.parts.len() == 1 {
                    return Ok(Geometry::LineString(self.part_coords(0)?));
                }
                let mut lines = Vec::with_capacity(self.parts.len());
                for i in 0..self.parts.len() {
                    lines.push(self.part_coords(i)?);
                }
                Ok(Geometry::MultiLineString(lines))
            }
            ShapeType::Polygon => {
                if self.parts.is_empty() {
                    return Ok(Geometry::Polygon(vec![]));
                }
                let mut polys = self.organize_rings()?;
                if polys.len() == 1 {
                    return Ok(Geometry::Polygon(polys.remove(0)));
                }
                Ok(Geometry::MultiPolygon(polys))
            }
            ShapeType::MultiPatch => Ok(Geometry::MultiPolygon(self.patches_to_polygons()?)),
            _ => unreachable!("base_shape_type returns base families only"),
        }
    }

    /// Groups the shape's rings into polygons. A clockwise ring begins a
    /// new polygon; a counter-clockwise ring is a hole of the nearest
    /// preceding exterior whose envelope strictly contains its envelope.
    fn organize_rings(&self) -> Result<Vec<Vec<Vec<Coord>>>> {
        let mut polys: Vec<Vec<Vec<Coord>>> = vec![];
        let mut poly_boxes: Vec<BoundingBox> = vec![];
        for i in 0..self.parts.len() {
            let ring = self.part_coords(i)?;
            let range = self.part_range(i);
            let ring_box = BoundingBox::from_points(&self.points[range]);
            if !self.is_hole(i as i32) {
                polys.push(vec![ring]);
                poly_boxes.push(ring_box);
            } else if polys.is_empty() {
                // holes require an exterior; without one the rings are
                // still represented, as exteriors
                warn!(
                    "shape {} consists of holes with no exterior ring; encoding them as exteriors",
                    self.oid
                );
                polys.push(vec![ring]);
                poly_boxes.push(ring_box);
            } else {
                let parent = poly_boxes
                    .iter()
                    .rposition(|b| b.entirely_contains(ring_box));
                let parent = match parent {
                    Some(j) => j,
                    None => {
                        warn!(
                            "hole in shape {} is not contained by any exterior envelope; \
                             attaching it to the most recent exterior",
                            self.oid
                        );
                        polys.len() - 1
                    }
                };
                polys[parent].push(ring);
            }
        }
        Ok(polys)
    }

    /// Converts MultiPatch parts to polygons: triangle strips and fans
    /// become one triangle per three consecutive vertices, and ring
    /// parts are grouped with outer/hole classification.
    fn patches_to_polygons(&self) -> Result<Vec<Vec<Vec<Coord>>>> {
        let mut polys: Vec<Vec<Vec<Coord>>> = vec![];
        let mut current: Option<Vec<Vec<Coord>>> = None;
        for i in 0..self.parts.len() {
            let coords = self.part_coords(i)?;
            let part_type = self
                .part_types
                .get(i)
                .copied()
                .unwrap_or(PartType::Ring);
            match part_type {
                PartType::TriangleStrip | PartType::TriangleFan => {
                    if let Some(group) = current.take() {
                        polys.push(group);
                    }
                    if coords.len() < 3 {
                        warn!(
                            "skipping degenerate triangle surface of {} vertices in shape {}",
                            coords.len(),
                            self.oid
                        );
                        continue;
                    }
                    for k in 0..coords.len() - 2 {
                        let a = if part_type == PartType::TriangleStrip {
                            coords[k]
                        } else {
                            coords[0]
                        };
                        let tri = vec![a, coords[k + 1], coords[k + 2], a];
                        polys.push(vec![tri]);
                    }
                }
                PartType::OuterRing | PartType::FirstRing => {
                    if let Some(group) = current.take() {
                        polys.push(group);
                    }
                    current = Some(vec![closed(coords)]);
                }
                PartType::InnerRing | PartType::Ring => match current.as_mut() {
                    Some(group) => group.push(closed(coords)),
                    None => current = Some(vec![closed(coords)]),
                },
            }
        }
        if let Some(group) = current.take() {
            polys.push(group);
        }
        Ok(polys)
    }

    /// Builds a shape of the given type from a geometry. Polygon rings
    /// are rewound as needed so that exteriors run clockwise and holes
    /// counter-clockwise, regardless of the input orientation.
    pub fn from_geometry(geometry: &Geometry, shape_type: ShapeType) -> Result<Shape> {
        let base = shape_type.base_shape_type();
        let mut shape = Shape::new(shape_type);
        match geometry {
            Geometry::Point(coord) => {
                expect_base(base, ShapeType::Point, geometry)?;
                let coord = (*coord).ok_or_else(|| {
                    ShapefileError::Value("cannot write an empty point".to_string())
                })?;
                add_coord_part(&mut shape, &[coord]);
            }
            Geometry::MultiPoint(coords) => {
                expect_base(base, ShapeType::MultiPoint, geometry)?;
                add_coord_part(&mut shape, coords);
            }
            Geometry::LineString(coords) => {
                expect_base(base, ShapeType::PolyLine, geometry)?;
                add_coord_part(&mut shape, coords);
            }
            Geometry::MultiLineString(lines) => {
                expect_base(base, ShapeType::PolyLine, geometry)?;
                for line in lines {
                    add_coord_part(&mut shape, line);
                }
            }
            Geometry::Polygon(rings) => {
                expect_base(base, ShapeType::Polygon, geometry)?;
                add_polygon_rings(&mut shape, rings);
            }
            Geometry::MultiPolygon(polys) => {
                expect_base(base, ShapeType::Polygon, geometry)?;
                for rings in polys {
                    add_polygon_rings(&mut shape, rings);
                }
            }
            Geometry::GeometryCollection(_) => {
                return Err(ShapefileError::Value(
                    "geometry collections cannot be written as a single shape".to_string(),
                ));
            }
        }
        Ok(shape)
    }
}

fn expect_base(base: ShapeType, expected: ShapeType, geometry: &Geometry) -> Result<()> {
    if base != expected {
        return Err(ShapefileError::Value(format!(
            "a {} geometry cannot be stored in a {}-based shapefile",
            geometry.type_name(),
            base
        )));
    }
    Ok(())
}

fn add_coord_part(shape: &mut Shape, coords: &[Coord]) {
    let points: Vec<Point2D> = coords.iter().map(Coord::as_point).collect();
    if shape.shape_type.has_z() {
        let z_values: Vec<f64> = coords.iter().map(|c| c.z.unwrap_or(0f64)).collect();
        let measures: Vec<Option<f64>> = coords.iter().map(|c| c.m).collect();
        shape.add_partz(&points, &z_values, &measures);
    } else if shape.shape_type.has_m() {
        let measures: Vec<Option<f64>> = coords.iter().map(|c| c.m).collect();
        shape.add_partm(&points, &measures);
    } else {
        shape.add_part(&points);
    }
}

/// Appends one polygon's rings, the exterior first. Older GeoJSON
/// producers disagree on winding, so orientation is checked and fixed
/// rather than assumed.
fn add_polygon_rings(shape: &mut Shape, rings: &[Vec<Coord>]) {
    for (i, ring) in rings.iter().enumerate() {
        let cw = ring_is_clockwise(ring);
        if (i == 0 && !cw) || (i > 0 && cw) {
            let rewound: Vec<Coord> = ring.iter().rev().copied().collect();
            add_coord_part(shape, &rewound);
        } else {
            add_coord_part(shape, ring);
        }
    }
}

impl ShapeRecord {
    /// The pair as a feature; null shapes have no geometry.
    pub fn feature(&self) -> Result<Feature> {
        let geometry = if self.shape.shape_type == ShapeType::Null {
            None
        } else {
            Some(self.shape.geometry()?)
        };
        Ok(Feature {
            geometry,
            properties: self.record.to_pairs(),
        })
    }
}

impl<R: Read + Seek> Reader<R> {
    /// Reads the whole file as a feature collection.
    pub fn feature_collection(&mut self) -> Result<FeatureCollection> {
        let bbox = self.bbox().map(|b| b.as_array());
        let mut features = vec![];
        for pair in self.iter_shape_records(None, None)? {
            features.push(pair?.feature()?);
        }
        Ok(FeatureCollection { bbox, features })
    }
}
