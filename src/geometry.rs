use serde::{Deserialize, Serialize};

/// Fraction of the horizontal span used to offset connector control points.
pub const CONTROL_POINT_RATIO: f64 = 0.3;
pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 4.0;
const SELF_LOOP_REACH: f64 = 40.0;
const CURVE_SAMPLES: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn distance(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Axis-aligned box anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(origin: Point, size: Size) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            width: size.width,
            height: size.height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn half_width(&self) -> f64 {
        self.width / 2.0
    }

    pub fn half_height(&self) -> f64 {
        self.height / 2.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = self.right().max(other.right());
        let max_y = self.bottom().max(other.bottom());
        Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    pub fn inflate(&self, amount: f64) -> Rect {
        Rect {
            x: self.x - amount,
            y: self.y - amount,
            width: self.width + amount * 2.0,
            height: self.height + amount * 2.0,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    /// Smallest box enclosing every rect, or `None` for an empty iterator.
    pub fn enclosing<I>(rects: I) -> Option<Rect>
    where
        I: IntoIterator<Item = Rect>,
    {
        rects.into_iter().reduce(|acc, rect| acc.union(&rect))
    }
}

/// Outline used for boundary intersection and hit testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Ellipse,
    Diamond,
    Rectangle,
}

impl Shape {
    pub fn contains(self, rect: &Rect, point: Point) -> bool {
        let center = rect.center();
        let (a, b) = (rect.half_width(), rect.half_height());
        if a <= 0.0 || b <= 0.0 {
            return false;
        }
        let dx = (point.x - center.x) / a;
        let dy = (point.y - center.y) / b;
        match self {
            Shape::Ellipse => dx * dx + dy * dy <= 1.0,
            Shape::Diamond => dx.abs() + dy.abs() <= 1.0,
            Shape::Rectangle => rect.contains(point),
        }
    }

    /// Point where the ray from the centre of `rect` towards `toward` leaves this outline.
    ///
    /// Diamonds use their enclosing rectangle. When `toward` coincides with the centre the
    /// direction is undefined and the right-edge midpoint is returned.
    pub fn boundary_point(self, rect: &Rect, toward: Point) -> Point {
        let center = rect.center();
        let dx = toward.x - center.x;
        let dy = toward.y - center.y;
        let (a, b) = (rect.half_width(), rect.half_height());

        if dx == 0.0 && dy == 0.0 {
            return Point::new(center.x + a, center.y);
        }

        match self {
            Shape::Ellipse => {
                let theta = dy.atan2(dx);
                Point::new(center.x + a * theta.cos(), center.y + b * theta.sin())
            }
            Shape::Diamond | Shape::Rectangle => rectangle_boundary(center, a, b, dx, dy),
        }
    }
}

fn rectangle_boundary(center: Point, half_w: f64, half_h: f64, dx: f64, dy: f64) -> Point {
    if dx.abs() * half_h > dy.abs() * half_w {
        let x = center.x + half_w * dx.signum();
        let y = center.y + dy * half_w / dx.abs();
        Point::new(x, y)
    } else {
        let x = center.x + dx * half_h / dy.abs();
        let y = center.y + half_h * dy.signum();
        Point::new(x, y)
    }
}

/// Cubic bezier segment used to draw a connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CubicPath {
    pub start: Point,
    pub control1: Point,
    pub control2: Point,
    pub end: Point,
}

impl CubicPath {
    /// Horizontal S-curve between the boundaries of two shapes.
    pub fn between(from_shape: Shape, from: &Rect, to_shape: Shape, to: &Rect) -> CubicPath {
        let start = from_shape.boundary_point(from, to.center());
        let end = to_shape.boundary_point(to, from.center());
        let offset = (end.x - start.x) * CONTROL_POINT_RATIO;

        CubicPath {
            start,
            control1: Point::new(start.x + offset, start.y),
            control2: Point::new(end.x - offset, end.y),
            end,
        }
    }

    /// Fixed loop leaving the right edge and re-entering the top edge of `rect`.
    pub fn self_loop(rect: &Rect) -> CubicPath {
        let center = rect.center();
        let start = Point::new(rect.right(), center.y);
        let end = Point::new(center.x, rect.y);

        CubicPath {
            start,
            control1: Point::new(start.x + SELF_LOOP_REACH, start.y),
            control2: Point::new(end.x, end.y - SELF_LOOP_REACH),
            end,
        }
    }

    pub fn point_at(&self, t: f64) -> Point {
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        Point::new(
            a * self.start.x + b * self.control1.x + c * self.control2.x + d * self.end.x,
            a * self.start.y + b * self.control1.y + c * self.control2.y + d * self.end.y,
        )
    }

    /// Approximate distance from `point` to the curve, measured against a sampled polyline.
    pub fn distance_to(&self, point: Point) -> f64 {
        let mut best = f64::MAX;
        let mut previous = self.start;
        for step in 1..=CURVE_SAMPLES {
            let next = self.point_at(step as f64 / CURVE_SAMPLES as f64);
            best = best.min(segment_distance(point, previous, next));
            previous = next;
        }
        best
    }

    pub fn to_svg_data(&self) -> String {
        format!(
            "M {:.1} {:.1} C {:.1} {:.1}, {:.1} {:.1}, {:.1} {:.1}",
            self.start.x,
            self.start.y,
            self.control1.x,
            self.control1.y,
            self.control2.x,
            self.control2.y,
            self.end.x,
            self.end.y
        )
    }
}

fn segment_distance(point: Point, a: Point, b: Point) -> f64 {
    let vx = b.x - a.x;
    let vy = b.y - a.y;
    let len_sq = vx * vx + vy * vy;
    if len_sq == 0.0 {
        return point.distance(a);
    }
    let t = (((point.x - a.x) * vx + (point.y - a.y) * vy) / len_sq).clamp(0.0, 1.0);
    point.distance(Point::new(a.x + t * vx, a.y + t * vy))
}

/// Uniform scale followed by a translation: `screen = model * k + (x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub k: f64,
    pub x: f64,
    pub y: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        k: 1.0,
        x: 0.0,
        y: 0.0,
    };

    pub fn apply(&self, point: Point) -> Point {
        Point::new(point.x * self.k + self.x, point.y * self.k + self.y)
    }

    pub fn invert(&self, point: Point) -> Point {
        Point::new((point.x - self.x) / self.k, (point.y - self.y) / self.k)
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Transform {
        Transform {
            k: self.k,
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Rescales by `factor` while keeping the model point under `anchor` (screen space) fixed.
    pub fn zoomed_about(&self, factor: f64, anchor: Point, min: f64, max: f64) -> Transform {
        let k = (self.k * factor).clamp(min, max);
        let model = self.invert(anchor);
        Transform {
            k,
            x: anchor.x - model.x * k,
            y: anchor.y - model.y * k,
        }
    }

    /// Transform that centres `bounds`, expanded by `padding`, inside a viewport.
    pub fn fit(bounds: &Rect, viewport: Size, padding: f64, min: f64, max: f64) -> Transform {
        let padded = bounds.inflate(padding);
        let scale_x = viewport.width / padded.width;
        let scale_y = viewport.height / padded.height;
        let k = scale_x.min(scale_y).clamp(min, max);
        let center = padded.center();

        Transform {
            k,
            x: viewport.width / 2.0 - k * center.x,
            y: viewport.height / 2.0 - k * center.y,
        }
    }

    pub fn to_svg_attr(&self) -> String {
        format!("translate({:.3},{:.3}) scale({:.4})", self.x, self.y, self.k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        a.distance(b) < 1e-9
    }

    #[test]
    fn rectangle_boundary_collapses_to_edge_midpoints() {
        let from = Rect::new(Point::new(-60.0, -30.0), Size::new(120.0, 60.0));
        let to = Rect::new(Point::new(140.0, -30.0), Size::new(120.0, 60.0));

        let path = CubicPath::between(Shape::Rectangle, &from, Shape::Rectangle, &to);
        assert!(close(path.start, Point::new(60.0, 0.0)));
        assert!(close(path.end, Point::new(140.0, 0.0)));
        assert!(close(path.control1, Point::new(84.0, 0.0)));
        assert!(close(path.control2, Point::new(116.0, 0.0)));
    }

    #[test]
    fn rectangle_boundary_picks_horizontal_edge_for_steep_rays() {
        let rect = Rect::new(Point::new(0.0, 0.0), Size::new(120.0, 60.0));
        let hit = Shape::Rectangle.boundary_point(&rect, Point::new(70.0, 130.0));
        assert!(close(hit, Point::new(63.0, 60.0)));
    }

    #[test]
    fn ellipse_boundary_uses_parametric_angle() {
        let rect = Rect::new(Point::new(0.0, 0.0), Size::new(120.0, 60.0));
        let above = Shape::Ellipse.boundary_point(&rect, Point::new(60.0, -100.0));
        assert!(close(above, Point::new(60.0, 0.0)));

        let theta = 1.0_f64.atan2(1.0);
        let diagonal = Shape::Ellipse.boundary_point(&rect, Point::new(160.0, 130.0));
        let expected = Point::new(60.0 + 60.0 * theta.cos(), 30.0 + 30.0 * theta.sin());
        assert!(close(diagonal, expected));
    }

    #[test]
    fn diamond_boundary_matches_enclosing_rectangle() {
        let rect = Rect::new(Point::new(0.0, 0.0), Size::new(140.0, 80.0));
        let toward = Point::new(300.0, 90.0);
        assert_eq!(
            Shape::Diamond.boundary_point(&rect, toward),
            Shape::Rectangle.boundary_point(&rect, toward)
        );
    }

    #[test]
    fn coincident_centres_fall_back_to_right_edge() {
        let rect = Rect::new(Point::new(0.0, 0.0), Size::new(100.0, 50.0));
        let hit = Shape::Ellipse.boundary_point(&rect, rect.center());
        assert!(close(hit, Point::new(100.0, 25.0)));
    }

    #[test]
    fn control_points_follow_signed_span() {
        let left = Rect::new(Point::new(300.0, 0.0), Size::new(100.0, 40.0));
        let right = Rect::new(Point::new(0.0, 200.0), Size::new(100.0, 40.0));
        let path = CubicPath::between(Shape::Rectangle, &left, Shape::Rectangle, &right);
        let span = path.end.x - path.start.x;
        assert!(span < 0.0);
        assert!((path.control1.x - (path.start.x + span * 0.3)).abs() < 1e-9);
        assert_eq!(path.control1.y, path.start.y);
        assert_eq!(path.control2.y, path.end.y);
    }

    #[test]
    fn shape_containment() {
        let rect = Rect::new(Point::new(0.0, 0.0), Size::new(100.0, 100.0));
        let corner = Point::new(5.0, 5.0);
        assert!(Shape::Rectangle.contains(&rect, corner));
        assert!(!Shape::Ellipse.contains(&rect, corner));
        assert!(!Shape::Diamond.contains(&rect, corner));
        assert!(Shape::Diamond.contains(&rect, Point::new(50.0, 10.0)));
    }

    #[test]
    fn fit_centres_padded_bounds() {
        let bounds = Rect::new(Point::new(10.0, 10.0), Size::new(100.0, 60.0));
        let transform = Transform::fit(&bounds, Size::new(800.0, 600.0), 50.0, MIN_ZOOM, MAX_ZOOM);
        assert!((transform.k - 3.75).abs() < 1e-9);
        assert!((transform.x - 175.0).abs() < 1e-9);
        assert!((transform.y - 150.0).abs() < 1e-9);
    }

    #[test]
    fn fit_clamps_scale() {
        let tiny = Rect::new(Point::new(0.0, 0.0), Size::new(1.0, 1.0));
        let transform = Transform::fit(&tiny, Size::new(800.0, 600.0), 0.0, MIN_ZOOM, MAX_ZOOM);
        assert_eq!(transform.k, MAX_ZOOM);
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let start = Transform {
            k: 1.5,
            x: 20.0,
            y: -10.0,
        };
        let anchor = Point::new(300.0, 200.0);
        let before = start.invert(anchor);
        let zoomed = start.zoomed_about(2.0, anchor, MIN_ZOOM, MAX_ZOOM);
        assert_eq!(zoomed.k, 3.0);
        assert!(close(zoomed.invert(anchor), before));

        let capped = zoomed.zoomed_about(10.0, anchor, MIN_ZOOM, MAX_ZOOM);
        assert_eq!(capped.k, MAX_ZOOM);
    }

    #[test]
    fn curve_distance_detects_nearby_points() {
        let from = Rect::new(Point::new(0.0, 0.0), Size::new(100.0, 50.0));
        let to = Rect::new(Point::new(300.0, 0.0), Size::new(100.0, 50.0));
        let path = CubicPath::between(Shape::Rectangle, &from, Shape::Rectangle, &to);
        assert!(path.distance_to(Point::new(200.0, 27.0)) < 3.0);
        assert!(path.distance_to(Point::new(200.0, 80.0)) > 40.0);
    }
}
