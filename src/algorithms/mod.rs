/*
This code is part of the ShapeIO shapefile I/O library.
License: MIT
*/

// private sub-module defined in another file
mod is_clockwise_order;

pub use self::is_clockwise_order::{is_clockwise_order, signed_area};
