//! Planar shapes used for domain bounds, obstacles and targets.

use nalgebra::{Point2, Vector2};

use super::predicates::{orient2d, point_segment_distance};
use crate::error::ConfigError;

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Lower-left corner.
    pub min: Point2<f64>,
    /// Upper-right corner.
    pub max: Point2<f64>,
}

impl Rect {
    /// Create a rectangle from its extents. Corners are reordered if needed.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min: Point2::new(x0.min(x1), y0.min(y1)),
            max: Point2::new(x0.max(x1), y0.max(y1)),
        }
    }

    /// Create a rectangle from origin and size.
    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Check that the rectangle is finite and has positive area.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [self.min.x, self.min.y, self.max.x, self.max.y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.width() <= 0.0 || self.height() <= 0.0 {
            return Err(ConfigError::InvalidBounds {
                min_x: self.min.x,
                min_y: self.min.y,
                max_x: self.max.x,
                max_y: self.max.y,
            });
        }
        Ok(())
    }

    /// Width along x.
    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Height along y.
    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Center point.
    pub fn center(&self) -> Point2<f64> {
        Point2::from((self.min.coords + self.max.coords) * 0.5)
    }

    /// The four corners in CCW order starting at `min`.
    pub fn corners(&self) -> [Point2<f64>; 4] {
        [
            self.min,
            Point2::new(self.max.x, self.min.y),
            self.max,
            Point2::new(self.min.x, self.max.y),
        ]
    }

    /// Whether `p` lies inside or on the rectangle.
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Whether the two rectangles overlap (touching counts).
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Whether `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.contains(&other.min) && self.contains(&other.max)
    }

    /// Signed distance: negative inside, zero on the border.
    pub fn signed_distance(&self, p: &Point2<f64>) -> f64 {
        let c = self.center();
        let half = Vector2::new(self.width() * 0.5, self.height() * 0.5);
        let q = Vector2::new((p.x - c.x).abs() - half.x, (p.y - c.y).abs() - half.y);
        let outside = Vector2::new(q.x.max(0.0), q.y.max(0.0)).norm();
        let inside = q.x.max(q.y).min(0.0);
        outside + inside
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self::new(
            self.min.x - margin,
            self.min.y - margin,
            self.max.x + margin,
            self.max.y + margin,
        )
    }

    /// Convert to a CCW polygon.
    pub fn to_polygon(&self) -> Polygon {
        Polygon {
            vertices: self.corners().to_vec(),
        }
    }
}

/// A simple polygon, stored counter-clockwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point2<f64>>,
}

impl Polygon {
    /// Create a polygon. Clockwise input is reversed so that the stored
    /// winding is CCW; fewer than three vertices or zero area is rejected.
    pub fn new(mut vertices: Vec<Point2<f64>>) -> Result<Self, ConfigError> {
        vertices.dedup();
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(ConfigError::DegeneratePolygon {
                vertices: vertices.len(),
            });
        }
        let area = signed_area(&vertices);
        if area.abs() <= f64::EPSILON || !area.is_finite() {
            return Err(ConfigError::DegeneratePolygon {
                vertices: vertices.len(),
            });
        }
        if area < 0.0 {
            vertices.reverse();
        }
        Ok(Self { vertices })
    }

    /// The polygon's vertices in CCW order.
    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    /// Iterate over edges as `(start, end)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (Point2<f64>, Point2<f64>)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Enclosed area (always positive).
    pub fn area(&self) -> f64 {
        signed_area(&self.vertices)
    }

    /// Area centroid.
    pub fn centroid(&self) -> Point2<f64> {
        let mut cx = 0.0;
        let mut cy = 0.0;
        for (a, b) in self.edges() {
            let cross = a.x * b.y - b.x * a.y;
            cx += (a.x + b.x) * cross;
            cy += (a.y + b.y) * cross;
        }
        let k = 1.0 / (6.0 * self.area());
        Point2::new(cx * k, cy * k)
    }

    /// Axis-aligned bounding rectangle.
    pub fn bounds(&self) -> Rect {
        let mut min = self.vertices[0];
        let mut max = self.vertices[0];
        for v in &self.vertices[1..] {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
        }
        Rect { min, max }
    }

    /// Point-in-polygon test by crossing number. Border points may go either way.
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > p.y) != (b.y > p.y) {
                let t = (p.y - a.y) / (b.y - a.y);
                if p.x < a.x + t * (b.x - a.x) {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Distance from `p` to the polygon's border.
    pub fn boundary_distance(&self, p: &Point2<f64>) -> f64 {
        self.edges()
            .map(|(a, b)| point_segment_distance(p, &a, &b))
            .fold(f64::INFINITY, f64::min)
    }

    /// Signed distance: negative inside.
    pub fn signed_distance(&self, p: &Point2<f64>) -> f64 {
        let d = self.boundary_distance(p);
        if self.contains(p) {
            -d
        } else {
            d
        }
    }
}

fn signed_area(vertices: &[Point2<f64>]) -> f64 {
    let origin = Point2::origin();
    let n = vertices.len();
    (0..n)
        .map(|i| orient2d(&origin, &vertices[i], &vertices[(i + 1) % n]))
        .sum::<f64>()
        * 0.5
}

/// A target or obstacle shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A single point.
    Point(Point2<f64>),
    /// A disk.
    Circle {
        /// Center of the disk.
        center: Point2<f64>,
        /// Radius of the disk.
        radius: f64,
    },
    /// An axis-aligned rectangle.
    Rect(Rect),
    /// A simple polygon.
    Polygon(Polygon),
}

impl Shape {
    /// Signed distance to the shape: negative inside, zero on the border.
    /// A point shape has no interior.
    pub fn signed_distance(&self, p: &Point2<f64>) -> f64 {
        match self {
            Shape::Point(c) => (p - c).norm(),
            Shape::Circle { center, radius } => (p - center).norm() - radius,
            Shape::Rect(r) => r.signed_distance(p),
            Shape::Polygon(poly) => poly.signed_distance(p),
        }
    }

    /// Non-negative distance to the shape (zero inside).
    pub fn distance(&self, p: &Point2<f64>) -> f64 {
        self.signed_distance(p).max(0.0)
    }

    /// Whether `p` lies inside or on the shape.
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        match self {
            Shape::Point(c) => p == c,
            Shape::Circle { center, radius } => (p - center).norm() <= *radius,
            Shape::Rect(r) => r.contains(p),
            Shape::Polygon(poly) => poly.contains(p),
        }
    }

    /// Axis-aligned bounding rectangle.
    pub fn bounds(&self) -> Rect {
        match self {
            Shape::Point(c) => Rect { min: *c, max: *c },
            Shape::Circle { center, radius } => Rect::new(
                center.x - radius,
                center.y - radius,
                center.x + radius,
                center.y + radius,
            ),
            Shape::Rect(r) => *r,
            Shape::Polygon(poly) => poly.bounds(),
        }
    }

    /// A point guaranteed to lie inside (or on) the shape.
    pub fn anchor(&self) -> Point2<f64> {
        match self {
            Shape::Point(c) => *c,
            Shape::Circle { center, .. } => *center,
            Shape::Rect(r) => r.center(),
            Shape::Polygon(poly) => {
                let c = poly.centroid();
                if poly.contains(&c) {
                    c
                } else {
                    poly.vertices()[0]
                }
            }
        }
    }

    /// Check shape parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Shape::Point(c) if !(c.x.is_finite() && c.y.is_finite()) => {
                Err(ConfigError::invalid_param("point", format!("{:?}", c), "must be finite"))
            }
            Shape::Circle { radius, .. } if !(*radius > 0.0 && radius.is_finite()) => {
                Err(ConfigError::invalid_param("radius", radius, "must be positive"))
            }
            Shape::Rect(r) => r.validate(),
            _ => Ok(()),
        }
    }
}

impl From<Rect> for Shape {
    fn from(r: Rect) -> Self {
        Shape::Rect(r)
    }
}

impl From<Polygon> for Shape {
    fn from(p: Polygon) -> Self {
        Shape::Polygon(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rect_signed_distance() {
        let r = Rect::new(0.0, 0.0, 2.0, 2.0);
        assert_relative_eq!(r.signed_distance(&Point2::new(1.0, 1.0)), -1.0);
        assert_relative_eq!(r.signed_distance(&Point2::new(2.0, 1.0)), 0.0);
        assert_relative_eq!(r.signed_distance(&Point2::new(3.0, 1.0)), 1.0);
        assert_relative_eq!(
            r.signed_distance(&Point2::new(3.0, 3.0)),
            2f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn rect_validation() {
        assert!(Rect::new(0.0, 0.0, 1.0, 1.0).validate().is_ok());
        assert!(Rect::new(0.0, 0.0, 0.0, 1.0).validate().is_err());
        assert!(Rect::new(0.0, 0.0, f64::NAN, 1.0).validate().is_err());
    }

    #[test]
    fn polygon_orientation_is_normalized() {
        let cw = vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 0.0),
        ];
        let poly = Polygon::new(cw).unwrap();
        assert_relative_eq!(poly.area(), 1.0, epsilon = 1e-12);
        assert!(poly.contains(&Point2::new(0.5, 0.5)));
        assert!(!poly.contains(&Point2::new(1.5, 0.5)));
        assert_relative_eq!(poly.signed_distance(&Point2::new(0.5, 0.5)), -0.5);
        let c = poly.centroid();
        assert_relative_eq!(c.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(c.y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_polygon_rejected() {
        let line = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
        ];
        assert!(matches!(
            Polygon::new(line),
            Err(ConfigError::DegeneratePolygon { vertices: 3 })
        ));
        assert!(Polygon::new(vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)]).is_err());
    }

    #[test]
    fn shape_distances() {
        let circle = Shape::Circle {
            center: Point2::new(0.0, 0.0),
            radius: 1.0,
        };
        assert_relative_eq!(circle.signed_distance(&Point2::new(3.0, 0.0)), 2.0);
        assert_relative_eq!(circle.distance(&Point2::new(0.5, 0.0)), 0.0);
        assert!(circle.contains(&Point2::new(0.5, 0.0)));

        let point = Shape::Point(Point2::new(1.0, 1.0));
        assert_relative_eq!(point.distance(&Point2::new(4.0, 5.0)), 5.0);
        assert_eq!(point.bounds().width(), 0.0);
    }
}
