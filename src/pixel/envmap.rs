
//! Projections between directions and pixel positions of environment maps:
//! the equirectangular latitude-longitude projection, and the cube map
//! with its six faces stacked vertically.

use std::f32::consts::PI;

use crate::math::{Vec2, Vec3};
use crate::meta::attribute::IntegerBounds;


/// An equirectangular environment map projection.
/// The data window should have an aspect ratio of 2:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatLongMap {

    /// The data window of the image.
    pub data_window: IntegerBounds,
}

impl LatLongMap {

    /// Create the projection for the specified data window.
    pub fn new(data_window: IntegerBounds) -> Self {
        Self { data_window }
    }

    /// The latitude and longitude of a direction, in radians.
    /// The latitude is in `-pi/2 ..= pi/2`, the longitude in `-pi ..= pi`.
    pub fn lat_long_of_direction(direction: Vec3<f32>) -> Vec2<f32> {
        let normalized = direction.normalized();

        let latitude = normalized.1.clamp(-1.0, 1.0).asin();
        let longitude = if normalized.0 == 0.0 && normalized.2 == 0.0 { 0.0 }
            else { normalized.0.atan2(normalized.2) };

        Vec2(latitude, longitude)
    }

    /// The direction of a latitude and longitude.
    pub fn direction_of_lat_long(lat_long: Vec2<f32>) -> Vec3<f32> {
        let Vec2(latitude, longitude) = lat_long;

        Vec3(
            latitude.cos() * longitude.sin(),
            latitude.sin(),
            latitude.cos() * longitude.cos(),
        )
    }

    /// The latitude and longitude that the specified pixel position maps to.
    pub fn lat_long_of_pixel(&self, pixel: Vec2<f32>) -> Vec2<f32> {
        let min = self.data_window.min();
        let width = self.data_window.width() as f32;
        let height = self.data_window.height() as f32;

        let longitude = (1.0 - 2.0 * (pixel.x() - min.x() as f32) / (width - 1.0)) * PI;
        let latitude = (0.5 - (pixel.y() - min.y() as f32) / (height - 1.0)) * PI;

        Vec2(latitude, longitude)
    }

    /// The pixel position that the specified latitude and longitude map to.
    pub fn pixel_of_lat_long(&self, lat_long: Vec2<f32>) -> Vec2<f32> {
        let min = self.data_window.min();
        let width = self.data_window.width() as f32;
        let height = self.data_window.height() as f32;

        let x = min.x() as f32 + (1.0 - lat_long.y() / PI) / 2.0 * (width - 1.0);
        let y = min.y() as f32 + (0.5 - lat_long.x() / PI) * (height - 1.0);

        Vec2(x, y)
    }

    /// The direction that the specified pixel position maps to.
    pub fn direction_of_pixel(&self, pixel: Vec2<f32>) -> Vec3<f32> {
        Self::direction_of_lat_long(self.lat_long_of_pixel(pixel))
    }

    /// The pixel position that the specified direction maps to.
    pub fn pixel_of_direction(&self, direction: Vec3<f32>) -> Vec2<f32> {
        self.pixel_of_lat_long(Self::lat_long_of_direction(direction))
    }
}


/// One of the six faces of a cube map,
/// in the order they are stacked in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {

    /// The face in the direction of the positive x axis.
    PositiveX,

    /// The face in the direction of the negative x axis.
    NegativeX,

    /// The face in the direction of the positive y axis.
    PositiveY,

    /// The face in the direction of the negative y axis.
    NegativeY,

    /// The face in the direction of the positive z axis.
    PositiveZ,

    /// The face in the direction of the negative z axis.
    NegativeZ,
}

impl CubeFace {

    /// The position of this face in the vertical face stack.
    pub fn index(self) -> usize {
        match self {
            CubeFace::PositiveX => 0,
            CubeFace::NegativeX => 1,
            CubeFace::PositiveY => 2,
            CubeFace::NegativeY => 3,
            CubeFace::PositiveZ => 4,
            CubeFace::NegativeZ => 5,
        }
    }
}

/// A cube map projection. The data window is one face wide
/// and six faces tall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubeMap {

    /// The data window of the image.
    pub data_window: IntegerBounds,
}

impl CubeMap {

    /// Create the projection for the specified data window.
    pub fn new(data_window: IntegerBounds) -> Self {
        Self { data_window }
    }

    /// The number of pixels along one edge of a face.
    pub fn size_of_face(&self) -> usize {
        self.data_window.width().min(self.data_window.height() / 6)
    }

    /// Normalize a position within a face from pixels to `-1 ..= 1`.
    fn normalized_of_position(&self, position: Vec2<f32>) -> Vec2<f32> {
        let size = self.size_of_face();

        if size > 1 {
            position.map(|component| component / (size - 1) as f32 * 2.0 - 1.0)
        }
        else {
            Vec2(0.0, 0.0)
        }
    }

    /// The position within a face, in pixels, of normalized coordinates.
    fn position_of_normalized(&self, normalized: Vec2<f32>) -> Vec2<f32> {
        let size = self.size_of_face();
        normalized.map(|component| (component + 1.0) / 2.0 * (size - 1) as f32)
    }

    /// The direction that the specified position within a face maps to.
    /// The result is normalized.
    pub fn direction_of_face_position(&self, face: CubeFace, position: Vec2<f32>) -> Vec3<f32> {
        let Vec2(u, v) = self.normalized_of_position(position);

        let direction = match face {
            CubeFace::PositiveX => Vec3(1.0, -v, -u),
            CubeFace::NegativeX => Vec3(-1.0, -v, u),
            CubeFace::PositiveY => Vec3(u, 1.0, v),
            CubeFace::NegativeY => Vec3(u, -1.0, -v),
            CubeFace::PositiveZ => Vec3(u, -v, 1.0),
            CubeFace::NegativeZ => Vec3(-u, -v, -1.0),
        };

        direction.normalized()
    }

    /// The face and the position within that face that the specified
    /// direction maps to. The zero direction deterministically maps
    /// to the center of the first sample of the positive x face.
    pub fn face_position_of_direction(&self, direction: Vec3<f32>) -> (CubeFace, Vec2<f32>) {
        let Vec3(x, y, z) = direction;
        let (abs_x, abs_y, abs_z) = (x.abs(), y.abs(), z.abs());

        if abs_x == 0.0 && abs_y == 0.0 && abs_z == 0.0 {
            return (CubeFace::PositiveX, Vec2(0.0, 0.0));
        }

        // the dominant axis decides the face, ties preferring x over y over z
        let (face, u, v) = if abs_x >= abs_y && abs_x >= abs_z {
            if x >= 0.0 { (CubeFace::PositiveX, -z / abs_x, -y / abs_x) }
            else { (CubeFace::NegativeX, z / abs_x, -y / abs_x) }
        }
        else if abs_y >= abs_z {
            if y >= 0.0 { (CubeFace::PositiveY, x / abs_y, z / abs_y) }
            else { (CubeFace::NegativeY, x / abs_y, -z / abs_y) }
        }
        else if z >= 0.0 { (CubeFace::PositiveZ, x / abs_z, -y / abs_z) }
        else { (CubeFace::NegativeZ, -x / abs_z, -y / abs_z) };

        (face, self.position_of_normalized(Vec2(u, v)))
    }

    /// The pixel position within the data window of a position within a face.
    pub fn pixel_of_face_position(&self, face: CubeFace, position: Vec2<f32>) -> Vec2<f32> {
        let min = self.data_window.min();
        let face_offset = (face.index() * self.size_of_face()) as f32;

        Vec2(
            min.x() as f32 + position.x(),
            min.y() as f32 + face_offset + position.y(),
        )
    }

    /// The direction that the specified pixel of the data window maps to.
    pub fn direction_of_pixel(&self, pixel: Vec2<f32>) -> Vec3<f32> {
        let min = self.data_window.min();
        let size = self.size_of_face();

        let row = (pixel.y() - min.y() as f32).max(0.0) as usize;
        let face_index = (row / size.max(1)).min(5);

        let face = [
            CubeFace::PositiveX, CubeFace::NegativeX,
            CubeFace::PositiveY, CubeFace::NegativeY,
            CubeFace::PositiveZ, CubeFace::NegativeZ,
        ][face_index];

        let position = Vec2(
            pixel.x() - min.x() as f32,
            pixel.y() - min.y() as f32 - (face_index * size) as f32,
        );

        self.direction_of_face_position(face, position)
    }
}
