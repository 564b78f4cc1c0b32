//! Primitive → switch-point conversion.
//!
//! Everything except the ellipses bottoms out in [`ScanBuffer::set_line`]:
//! an upward edge emits ON points, a downward edge OFF points, and a
//! clockwise contour therefore fills between its left and right edges.
//! Horizontal edges emit nothing, since they would double-count a scanline.

use glam::Vec2;

use super::atlas::MaterialId;
use super::scanline::ScanBuffer;

impl ScanBuffer {
    /// Emit one switch point per scanline along the edge `(x0,y0)..(x1,y1)`.
    ///
    /// The last row is skipped so shared polygon vertices are not counted
    /// twice.  Rows are clipped to the buffer; x positions are rounded to the
    /// nearest column.
    pub(crate) fn set_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, id: MaterialId) {
        if y0 == y1 {
            return; // no scanlines affected
        }

        // always walk downward; an upward edge flips to ON
        let (on, x0, y0, x1, y1) = if y0 < y1 {
            (false, x0, y0, x1, y1)
        } else {
            (true, x1, y1, x0, y0)
        };

        let top = y0.max(0);
        let bottom = y1.min(self.height() as i32);
        let grad = (x0 - x1) as f32 / (y0 - y1) as f32;

        for y in top..bottom {
            let x = (grad * (y - y0) as f32 + x0 as f32).round() as i32;
            self.set_switch_point(x, y, id, on);
        }
    }

    /// Fill an axis-aligned rectangle: two vertical edges, the left one ON.
    pub fn fill_rect(&mut self, left: i32, top: i32, right: i32, bottom: i32, id: MaterialId) {
        if left >= right || top >= bottom {
            return; // empty
        }
        self.set_line(left, bottom, left, top, id);
        self.set_line(right, top, right, bottom, id);
    }

    /// Fill a triangle.  Counter-clockwise contours are detected and
    /// rearranged; degenerate triangles emit nothing.
    pub fn fill_triangle(
        &mut self,
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        id: MaterialId,
    ) {
        if x0 == x1 && x1 == x2 {
            return;
        }
        if y0 == y1 && y1 == y2 {
            return;
        }

        // z of the edge cross product: positive means clockwise on a y-down
        // screen, so edges already run ON up the left and OFF down the right
        let dz = (x1 - x0) * (y2 - y0) - (y1 - y0) * (x2 - x0);
        if dz > 0 {
            self.set_line(x0, y0, x1, y1, id);
            self.set_line(x1, y1, x2, y2, id);
            self.set_line(x2, y2, x0, y0, id);
        } else {
            self.set_line(x0, y0, x2, y2, id);
            self.set_line(x2, y2, x1, y1, id);
            self.set_line(x1, y1, x0, y0, id);
        }
    }

    /// Fill the parallelogram spanned by three of its corners; the fourth is
    /// the mirror of vertex 0 across the 1–2 diagonal.
    pub fn fill_tri_quad(
        &mut self,
        x0: i32,
        y0: i32,
        mut x1: i32,
        mut y1: i32,
        mut x2: i32,
        mut y2: i32,
        id: MaterialId,
    ) {
        if x2 == x1 && x0 == x1 && y0 == y1 && y1 == y2 {
            return; // empty
        }

        let mut dx1 = x1 - x0;
        let mut dy1 = y1 - y0;
        let dx2 = x2 - x0;
        let dy2 = y2 - y0;
        let dz = dx1 * dy2 - dy1 * dx2;

        if dz <= 0 {
            // ccw: swap vertex 1 and 2 to make it clockwise
            std::mem::swap(&mut x1, &mut x2);
            std::mem::swap(&mut y1, &mut y2);
            dx1 = dx2;
            dy1 = dy2;
        }
        self.set_line(x0, y0, x1, y1, id);
        self.set_line(x1, y1, x2 + dx1, y2 + dy1, id);
        self.set_line(x2 + dx1, y2 + dy1, x2, y2, id);
        self.set_line(x2, y2, x0, y0, id);
    }

    /// Draw a line of pen width `w` (≥ 1) as a parallelogram centred on the
    /// segment.  The half-width split is integer, so odd widths sit one pixel
    /// closer to one side.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, w: i32, id: MaterialId) {
        if w < 1 {
            return; // empty pen
        }

        // scale the segment's normal up to the pen width
        let normal = Vec2::new(-(y1 - y0) as f32, (x1 - x0) as f32);
        let Some(n) = normal.try_normalize() else {
            return; // zero-length line
        };
        let n = n * w as f32;

        let hdx = (n.x / 2.0) as i32;
        let hdy = (n.y / 2.0) as i32;

        let x0 = x0 - hdx;
        let y0 = y0 - hdy;
        let x1 = x1 - (n.x - hdx as f32) as i32;
        let y1 = y1 - (n.y - hdy as f32) as i32;

        self.fill_tri_quad(x0, y0, x1, y1, x0 + n.x as i32, y0 + n.y as i32, id);
    }

    pub fn fill_circle(&mut self, xc: i32, yc: i32, radius: i32, id: MaterialId) {
        self.fill_ellipse(xc, yc, radius, radius, id);
    }

    /// Fill an ellipse of semi-axes `width` and `height` centred on
    /// `(xc, yc)`.
    pub fn fill_ellipse(&mut self, xc: i32, yc: i32, width: i32, height: i32, id: MaterialId) {
        self.general_ellipse(xc, yc, width, height, true, id);
    }

    /// Fill everywhere *except* the ellipse: a full-window layer plus the
    /// ellipse with inverted polarity.  Both use the same material, so what
    /// shows through the hole is whatever lies at greater depth; with
    /// nothing underneath, the hole pixels are simply not written.
    pub fn ellipse_hole(&mut self, xc: i32, yc: i32, width: i32, height: i32, id: MaterialId) {
        self.fill_rect(0, 0, self.width() as i32, self.height() as i32, id);
        self.general_ellipse(xc, yc, width, height, false, id);
    }

    /// Draw the border of an ellipse with pen width `w`: a positive outer
    /// ellipse with a negative inner one cut out of it.
    pub fn outline_ellipse(
        &mut self,
        xc: i32,
        yc: i32,
        width: i32,
        height: i32,
        w: i32,
        id: MaterialId,
    ) {
        if w < 1 {
            return;
        }
        let w1 = w / 2;
        let w2 = w - w1;
        self.general_ellipse(xc, yc, width + w2, height + w2, true, id);
        self.general_ellipse(xc, yc, width - w1, height - w1, false, id);
    }

    /// One ON at x = 0 on every scanline: a half-plane that colours anything
    /// no shallower material covers.  Usually given a large depth.
    pub fn set_background(&mut self, id: MaterialId) {
        self.set_line(0, self.height() as i32, 0, 0, id);
    }

    // Midpoint ellipse walk emitting one left and one right switch point per
    // scanline.  `positive` selects the polarity: a filled shape turns ON at
    // its left edge, a hole turns OFF there.  The two arcs meet where the
    // vertical walk stopped (`ty`), which prevents doubled scanlines.
    fn general_ellipse(
        &mut self,
        xc: i32,
        yc: i32,
        width: i32,
        height: i32,
        positive: bool,
        id: MaterialId,
    ) {
        if width < 1 || height < 1 {
            return; // empty
        }
        let (left, right) = if positive { (true, false) } else { (false, true) };

        let (xc, yc) = (i64::from(xc), i64::from(yc));
        let (w, h) = (i64::from(width), i64::from(height));
        let a2 = w * w;
        let b2 = h * h;
        let (fa2, fb2) = (4 * a2, 4 * b2);

        // top and bottom arcs
        let mut x = 0;
        let mut y = h;
        let mut sigma = 2 * b2 + a2 * (1 - 2 * h);
        while b2 * x <= a2 * y {
            if sigma >= 0 {
                sigma += fa2 * (1 - y);
                // only emit switch points when y steps
                self.ellipse_pair(xc, yc, x, y, id, left, right);
                y -= 1;
            }
            sigma += b2 * (4 * x + 6);
            x += 1;
        }
        let ty = y;

        // left and right arcs
        self.set_switch_point((xc - w) as i32, yc as i32, id, left);
        self.set_switch_point((xc + w) as i32, yc as i32, id, right);
        x = w;
        y = 1;
        sigma = 2 * a2 + b2 * (1 - 2 * w);
        while a2 * y < b2 * x {
            if y > ty {
                break; // started to overlap the top-and-bottom arcs
            }
            self.ellipse_pair(xc, yc, x, y, id, left, right);
            if sigma >= 0 {
                sigma += fb2 * (1 - x);
                x -= 1;
            }
            sigma += a2 * (4 * y + 6);
            y += 1;
        }
    }

    // The four mirrored points for one (x, y) offset from the centre.
    fn ellipse_pair(&mut self, xc: i64, yc: i64, x: i64, y: i64, id: MaterialId, left: bool, right: bool) {
        self.set_switch_point((xc - x) as i32, (yc + y) as i32, id, left);
        self.set_switch_point((xc + x) as i32, (yc + y) as i32, id, right);
        self.set_switch_point((xc - x) as i32, (yc - y) as i32, id, left);
        self.set_switch_point((xc + x) as i32, (yc - y) as i32, id, right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::SwitchPoint;

    fn buf() -> ScanBuffer {
        ScanBuffer::new(16, 8).unwrap()
    }

    fn ons_and_offs(points: &[SwitchPoint]) -> (usize, usize) {
        let on = points.iter().filter(|p| p.is_on()).count();
        (on, points.len() - on)
    }

    #[test]
    fn downward_line_emits_offs() {
        let mut b = buf();
        b.set_line(4, 1, 4, 5, 1);
        for y in 1..5 {
            let line = b.line(y);
            assert_eq!(line.count(), 1, "row {y}");
            assert!(!line.points()[0].is_on());
            assert_eq!(line.points()[0].x(), 4);
        }
        assert_eq!(b.line(5).count(), 0); // last row skipped
    }

    #[test]
    fn upward_line_emits_ons() {
        let mut b = buf();
        b.set_line(4, 5, 4, 1, 1);
        for y in 1..5 {
            assert!(b.line(y).points()[0].is_on(), "row {y}");
        }
    }

    #[test]
    fn horizontal_line_emits_nothing() {
        let mut b = buf();
        b.set_line(1, 3, 12, 3, 1);
        assert!((0..8).all(|y| b.line(y).count() == 0));
    }

    #[test]
    fn line_rows_are_clipped() {
        let mut b = buf();
        b.set_line(2, -5, 2, 20, 1);
        for y in 0..8 {
            assert_eq!(b.line(y).count(), 1, "row {y}");
        }
    }

    #[test]
    fn rect_emits_on_off_pairs() {
        let mut b = buf();
        b.fill_rect(2, 2, 6, 5, 1);
        for y in 2..5 {
            let pts = b.line(y).points();
            assert_eq!(pts.len(), 2, "row {y}");
            let on = pts.iter().find(|p| p.is_on()).unwrap();
            let off = pts.iter().find(|p| !p.is_on()).unwrap();
            assert_eq!(on.x(), 2);
            assert_eq!(off.x(), 6);
        }
        assert_eq!(b.line(1).count(), 0);
        assert_eq!(b.line(5).count(), 0);
    }

    #[test]
    fn empty_rect_emits_nothing() {
        let mut b = buf();
        b.fill_rect(6, 2, 6, 5, 1);
        b.fill_rect(2, 5, 6, 5, 1);
        b.fill_rect(6, 5, 2, 2, 1);
        assert!((0..8).all(|y| b.line(y).count() == 0));
    }

    #[test]
    fn triangle_windings_agree() {
        let mut cw = buf();
        cw.fill_triangle(2, 1, 12, 1, 7, 6, 1);
        let mut ccw = buf();
        ccw.fill_triangle(2, 1, 7, 6, 12, 1, 1);
        for y in 0..8 {
            assert_eq!(cw.line(y).points(), ccw.line(y).points(), "row {y}");
        }
        // every intersected row balances ON against OFF
        for y in 1..6 {
            let (on, off) = ons_and_offs(cw.line(y).points());
            assert_eq!(on, off, "row {y}");
            assert!(on > 0, "row {y}");
        }
    }

    #[test]
    fn degenerate_triangles_emit_nothing() {
        let mut b = buf();
        b.fill_triangle(3, 3, 3, 5, 3, 7, 1); // all x equal
        b.fill_triangle(2, 4, 6, 4, 9, 4, 1); // all y equal
        assert!((0..8).all(|y| b.line(y).count() == 0));
    }

    #[test]
    fn tri_quad_covers_parallelogram_rows() {
        let mut b = buf();
        // axis-aligned parallelogram equals the rect with the same corners
        b.fill_tri_quad(3, 2, 3, 6, 8, 2, 1);
        let mut r = buf();
        r.fill_rect(3, 2, 8, 6, 1);
        for y in 0..8 {
            let (on, off) = ons_and_offs(b.line(y).points());
            let (ron, roff) = ons_and_offs(r.line(y).points());
            assert_eq!((on, off), (ron, roff), "row {y}");
        }
    }

    #[test]
    fn thin_pen_is_rejected() {
        let mut b = buf();
        b.draw_line(0, 0, 10, 5, 0, 1);
        b.draw_line(2, 2, 2, 2, 3, 1); // zero length
        assert!((0..8).all(|y| b.line(y).count() == 0));
    }

    #[test]
    fn thick_line_balances_every_row() {
        let mut b = buf();
        b.draw_line(0, 0, 15, 7, 3, 1);
        let mut touched = 0;
        for y in 0..8 {
            let (on, off) = ons_and_offs(b.line(y).points());
            assert_eq!(on, off, "row {y}");
            touched += usize::from(on > 0);
        }
        assert!(touched >= 6, "band should cross most rows, got {touched}");
    }

    #[test]
    fn ellipse_rows_pair_on_with_off() {
        let mut b = buf();
        b.fill_ellipse(8, 4, 5, 3, 1);
        for y in 1..8 {
            let pts = b.line(y).points();
            let (on, off) = ons_and_offs(pts);
            assert_eq!(on, off, "row {y}");
        }
        // widest row spans the full minor axis
        let pts = b.line(4).points();
        assert!(pts.iter().any(|p| p.x() == 3 && p.is_on()));
        assert!(pts.iter().any(|p| p.x() == 13 && !p.is_on()));
    }

    #[test]
    fn zero_size_ellipse_emits_nothing() {
        let mut b = buf();
        b.fill_ellipse(8, 4, 0, 3, 1);
        b.fill_ellipse(8, 4, 5, 0, 1);
        assert!((0..8).all(|y| b.line(y).count() == 0));
    }

    #[test]
    fn negative_ellipse_inverts_polarity() {
        let mut pos = buf();
        pos.fill_ellipse(8, 4, 4, 2, 1);
        let mut neg = buf();
        neg.ellipse_hole(8, 4, 4, 2, 1);
        // the hole's left edge turns OFF where the fill's turns ON
        let pon = pos.line(4).points().iter().find(|p| p.x() == 4).unwrap().is_on();
        let non = neg
            .line(4)
            .points()
            .iter()
            .filter(|p| p.x() == 4)
            .last()
            .unwrap()
            .is_on();
        assert!(pon);
        assert!(!non);
    }

    #[test]
    fn background_turns_every_row_on_at_zero() {
        let mut b = buf();
        b.set_background(3);
        for y in 0..8 {
            let pts = b.line(y).points();
            assert_eq!(pts.len(), 1, "row {y}");
            assert_eq!(pts[0].x(), 0);
            assert!(pts[0].is_on());
            assert_eq!(pts[0].id(), 3);
        }
    }

    #[test]
    fn outline_emits_concentric_polarities() {
        let mut b = ScanBuffer::new(32, 32).unwrap();
        b.outline_ellipse(16, 16, 8, 8, 3, 1);
        // centre row: outer ON, inner OFF on the left side
        let pts = b.line(16).points();
        let left: Vec<_> = pts.iter().filter(|p| p.x() < 16).collect();
        assert!(left.iter().any(|p| p.is_on()));
        assert!(left.iter().any(|p| !p.is_on()));
    }
}
