/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT
*/

// private sub-modules defined in other files
mod bounding_box;
mod point2d;

// exports identifiers from private sub-modules in the current module namespace
pub use self::bounding_box::BoundingBox;
pub use self::point2d::Point2D;
