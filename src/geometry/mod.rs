// Geometric acceptance primitives: points, channel-bound boxes in
// (time, amplitude) space and polygons in principal-component space.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangle in (time, amplitude) space bound to one electrode channel.
/// `x`/`w` are in sample-time units, `y` is the top edge in amplitude units
/// and the box spans `[x, x+w] x [y-h, y]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveBox {
    pub channel: usize,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl WaveBox {
    pub fn new(channel: usize, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { channel, x, y, w, h }
    }

    fn corners(&self) -> [Point; 4] {
        let (x_lo, x_hi) = min_max(self.x, self.x + self.w);
        let (y_lo, y_hi) = min_max(self.y - self.h, self.y);
        [
            Point::new(x_lo, y_hi),
            Point::new(x_hi, y_hi),
            Point::new(x_hi, y_lo),
            Point::new(x_lo, y_lo),
        ]
    }

    /// True if the segment `a -> b` intersects any of the four box edges.
    pub fn segment_crosses(&self, a: Point, b: Point) -> bool {
        let c = self.corners();
        segments_intersect(a, b, c[0], c[1])
            || segments_intersect(a, b, c[1], c[2])
            || segments_intersect(a, b, c[2], c[3])
            || segments_intersect(a, b, c[3], c[0])
    }
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// Signed area of the triangle (a, b, c); sign gives the turn direction.
fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

// For collinear points only: is c within the bounding range of a-b?
fn on_segment(a: Point, b: Point, c: Point) -> bool {
    c.x >= a.x.min(b.x) && c.x <= a.x.max(b.x) && c.y >= a.y.min(b.y) && c.y <= a.y.max(b.y)
}

/// Standard orientation-based segment intersection, touching counts.
pub fn segments_intersect(p1: Point, p2: Point, p3: Point, p4: Point) -> bool {
    let d1 = orientation(p3, p4, p1);
    let d2 = orientation(p3, p4, p2);
    let d3 = orientation(p1, p2, p3);
    let d4 = orientation(p1, p2, p4);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(p3, p4, p1))
        || (d2 == 0.0 && on_segment(p3, p4, p2))
        || (d3 == 0.0 && on_segment(p1, p2, p3))
        || (d4 == 0.0 && on_segment(p1, p2, p4))
}

/// Closed polygon in PC1/PC2 space with a translation offset applied to
/// every vertex before testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Point>,
    pub offset: Point,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>, offset: Point) -> Self {
        Self { vertices, offset }
    }

    /// Even-odd (crossing number) containment test.
    pub fn contains(&self, p: Point) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let xi = self.vertices[i].x + self.offset.x;
            let yi = self.vertices[i].y + self.offset.y;
            let xj = self.vertices[j].x + self.offset.x;
            let yj = self.vertices[j].y + self.offset.y;
            if (yi > p.y) != (yj > p.y) && p.x < (xj - xi) * (p.y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_crossing_detects_entry_through_left_edge() {
        let b = WaveBox::new(0, 10.0, 50.0, 10.0, 100.0);
        // Crosses the left edge at x = 10
        assert!(b.segment_crosses(Point::new(5.0, 0.0), Point::new(15.0, 0.0)));
        // Entirely left of the box
        assert!(!b.segment_crosses(Point::new(0.0, 0.0), Point::new(9.0, 0.0)));
        // Passes above the box
        assert!(!b.segment_crosses(Point::new(5.0, 60.0), Point::new(15.0, 60.0)));
    }

    #[test]
    fn segment_crossing_handles_negative_amplitudes() {
        // y top = -20, bottom = -120
        let b = WaveBox::new(0, 2.0, -20.0, 4.0, 100.0);
        assert!(b.segment_crosses(Point::new(3.0, 0.0), Point::new(4.0, -60.0)));
        assert!(!b.segment_crosses(Point::new(3.0, 0.0), Point::new(4.0, -10.0)));
    }

    #[test]
    fn polygon_contains_square() {
        let poly = Polygon::new(
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ],
            Point::new(0.0, 0.0),
        );
        assert!(poly.contains(Point::new(5.0, 5.0)));
        assert!(!poly.contains(Point::new(15.0, 5.0)));
        assert!(!poly.contains(Point::new(5.0, -1.0)));
    }

    #[test]
    fn polygon_offset_shifts_every_vertex() {
        let poly = Polygon::new(
            vec![
                Point::new(0.0, 0.0),
                Point::new(4.0, 0.0),
                Point::new(4.0, 4.0),
                Point::new(0.0, 4.0),
            ],
            Point::new(100.0, 100.0),
        );
        assert!(!poly.contains(Point::new(2.0, 2.0)));
        assert!(poly.contains(Point::new(102.0, 102.0)));
    }

    #[test]
    fn concave_polygon_even_odd() {
        // A "U" shape; the notch is outside
        let poly = Polygon::new(
            vec![
                Point::new(0.0, 0.0),
                Point::new(6.0, 0.0),
                Point::new(6.0, 6.0),
                Point::new(4.0, 6.0),
                Point::new(4.0, 2.0),
                Point::new(2.0, 2.0),
                Point::new(2.0, 6.0),
                Point::new(0.0, 6.0),
            ],
            Point::new(0.0, 0.0),
        );
        assert!(poly.contains(Point::new(1.0, 4.0)));
        assert!(poly.contains(Point::new(5.0, 4.0)));
        assert!(!poly.contains(Point::new(3.0, 4.0)));
    }

    #[test]
    fn degenerate_polygon_contains_nothing() {
        let poly = Polygon::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)], Point::new(0.0, 0.0));
        assert!(!poly.contains(Point::new(0.5, 0.5)));
    }
}
