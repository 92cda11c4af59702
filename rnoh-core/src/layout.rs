//! Layout metrics carried by shadow views.
//!
//! Frames are expressed in density-independent points relative to the parent
//! component. The serialized shape matches what the ArkTS host reads from a
//! mutation descriptor.

use serde::{Deserialize, Serialize};

/// A 2D position in points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl Point {
    /// The origin `(0, 0)`.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Creates a point.
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 2D extent in points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Horizontal extent.
    pub width: f32,
    /// Vertical extent.
    pub height: f32,
}

impl Size {
    /// Creates a size.
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// An origin plus a size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Top-left corner relative to the parent.
    pub origin: Point,
    /// Extent of the rectangle.
    pub size: Size,
}

impl Rect {
    /// Creates a rectangle from its components.
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }
}

/// Layout information computed by the shadow tree for one node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetrics {
    /// Frame relative to the parent.
    pub frame: Rect,
    /// Points to physical pixels ratio.
    pub point_scale_factor: f32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            frame: Rect::default(),
            point_scale_factor: 1.0,
        }
    }
}

impl LayoutMetrics {
    /// Creates metrics for `frame` at a scale factor of one.
    pub const fn from_frame(frame: Rect) -> Self {
        Self {
            frame,
            point_scale_factor: 1.0,
        }
    }

    /// Returns a copy whose frame origin is `(0, 0)`.
    pub fn with_origin_reset(mut self) -> Self {
        self.frame.origin = Point::ZERO;
        self
    }
}
