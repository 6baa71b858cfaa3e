//! Geometry/SizeHints Engine (C1).
//!
//! Given a requested rectangle and a client's negotiated ICCCM size hints,
//! produces the rectangle the manager will actually apply, plus whether it
//! differs from what the client currently has.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in root-window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Rect { x, y, w, h }
    }

    /// Width/height as dwm's `WIDTH`/`HEIGHT` macros see them: content size
    /// plus both border widths plus the inter-window gap.
    pub fn outer_w(&self, border_width: i32, gap: i32) -> i32 {
        self.w + 2 * border_width + gap
    }

    pub fn outer_h(&self, border_width: i32, gap: i32) -> i32 {
        self.h + 2 * border_width + gap
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    /// Intersection area with another rectangle, per dwm's `INTERSECT` macro.
    pub fn intersect_area(&self, other: &Rect) -> i64 {
        let iw = (self.x + self.w).min(other.x + other.w) - self.x.max(other.x);
        let ih = (self.y + self.h).min(other.y + other.h) - self.y.max(other.y);
        (iw.max(0) as i64) * (ih.max(0) as i64)
    }
}

/// ICCCM `WM_NORMAL_HINTS` negotiated by a client, refreshed on
/// `PropertyNotify` for `WM_NORMAL_HINTS` and at manage time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeHints {
    pub base_w: i32,
    pub base_h: i32,
    pub inc_w: i32,
    pub inc_h: i32,
    pub min_w: i32,
    pub min_h: i32,
    pub max_w: i32,
    pub max_h: i32,
    pub min_aspect: f64,
    pub max_aspect: f64,
}

impl SizeHints {
    /// `is_fixed` is derived from hints: a client is fixed-size iff min and
    /// max are equal and nonzero on both axes.
    pub fn is_fixed(&self) -> bool {
        self.max_w != 0
            && self.max_w == self.min_w
            && self.max_h != 0
            && self.max_h == self.min_h
    }
}

/// What `apply_size_hints` needs to know about the client and its monitor
/// beyond the hints themselves.
pub struct HintContext {
    pub current: Rect,
    pub border_width: i32,
    pub hints: SizeHints,
    /// Hints are honoured when the layout says so (a config flag), the
    /// client is floating, or the current layout has no arrange function.
    pub honour_hints: bool,
    pub screen: Rect,
    pub monitor_window_area: Rect,
    pub bar_height: i32,
}

/// Mirrors dwm's `applysizehints`: clamps/snaps a requested rectangle and
/// reports whether the result differs from the client's current geometry.
///
/// `interactive` selects clipping against the whole screen (mouse-driven
/// moves/resizes) versus the owning monitor's window area (everything else).
pub fn apply_size_hints(ctx: &HintContext, req: Rect, interactive: bool) -> (Rect, bool) {
    let HintContext {
        current,
        border_width,
        hints,
        honour_hints,
        screen,
        monitor_window_area,
        bar_height,
    } = ctx;
    let border_width = *border_width;

    let mut x = req.x;
    let mut y = req.y;
    let mut w = req.w.max(1);
    let mut h = req.h.max(1);

    if interactive {
        if x > screen.w {
            x = screen.w - Rect::new(x, y, w, h).outer_w(border_width, 0);
        }
        if y > screen.h {
            y = screen.h - Rect::new(x, y, w, h).outer_h(border_width, 0);
        }
        if x + w + 2 * border_width < 0 {
            x = 0;
        }
        if y + h + 2 * border_width < 0 {
            y = 0;
        }
    } else {
        let m = monitor_window_area;
        if x >= m.x + m.w {
            x = m.x + m.w - Rect::new(x, y, w, h).outer_w(border_width, 0);
        }
        if y >= m.y + m.h {
            y = m.y + m.h - Rect::new(x, y, w, h).outer_h(border_width, 0);
        }
        if x + w + 2 * border_width <= m.x {
            x = m.x;
        }
        if y + h + 2 * border_width <= m.y {
            y = m.y;
        }
    }

    if h < *bar_height {
        h = *bar_height;
    }
    if w < *bar_height {
        w = *bar_height;
    }

    if *honour_hints {
        let base_is_min = hints.base_w == hints.min_w && hints.base_h == hints.min_h;
        if !base_is_min {
            w -= hints.base_w;
            h -= hints.base_h;
        }
        if hints.min_aspect > 0.0 && hints.max_aspect > 0.0 {
            if hints.max_aspect < (w as f64) / (h as f64) {
                w = (h as f64 * hints.max_aspect + 0.5) as i32;
            } else if hints.min_aspect < (h as f64) / (w as f64) {
                h = (w as f64 * hints.min_aspect + 0.5) as i32;
            }
        }
        if base_is_min {
            w -= hints.base_w;
            h -= hints.base_h;
        }
        if hints.inc_w != 0 {
            w -= w % hints.inc_w;
        }
        if hints.inc_h != 0 {
            h -= h % hints.inc_h;
        }
        w = (w + hints.base_w).max(hints.min_w);
        h = (h + hints.base_h).max(hints.min_h);
        if hints.max_w != 0 {
            w = w.min(hints.max_w);
        }
        if hints.max_h != 0 {
            h = h.min(hints.max_h);
        }
    }

    let result = Rect::new(x, y, w, h);
    let changed = result != *current;
    (result, changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(current: Rect, hints: SizeHints, honour: bool) -> HintContext {
        HintContext {
            current,
            border_width: 1,
            hints,
            honour_hints: honour,
            screen: Rect::new(0, 0, 1920, 1080),
            monitor_window_area: Rect::new(0, 14, 1920, 1066),
            bar_height: 14,
        }
    }

    #[test]
    fn unconstrained_request_passes_through() {
        let c = ctx(Rect::new(100, 100, 400, 300), SizeHints::default(), false);
        let (r, changed) = apply_size_hints(&c, Rect::new(50, 60, 200, 150), false);
        assert!(changed);
        assert_eq!(r, Rect::new(50, 60, 200, 150));
    }

    #[test]
    fn width_height_floor_at_one() {
        let c = ctx(Rect::new(0, 14, 1, 1), SizeHints::default(), false);
        let (r, _) = apply_size_hints(&c, Rect::new(0, 14, -5, 0), false);
        assert!(r.w >= 14); // clamped to bar height floor too
        assert!(r.h >= 14);
    }

    #[test]
    fn increments_respected_when_hints_honoured() {
        let hints = SizeHints {
            base_w: 10,
            base_h: 10,
            inc_w: 10,
            inc_h: 10,
            min_w: 10,
            min_h: 10,
            max_w: 0,
            max_h: 0,
            min_aspect: 0.0,
            max_aspect: 0.0,
        };
        let c = ctx(Rect::new(0, 14, 100, 100), hints, true);
        let (r, _) = apply_size_hints(&c, Rect::new(0, 14, 107, 123), false);
        assert_eq!((r.w - hints.base_w) % hints.inc_w, 0);
        assert_eq!((r.h - hints.base_h) % hints.inc_h, 0);
    }

    #[test]
    fn hints_skipped_when_not_honoured() {
        let hints = SizeHints {
            inc_w: 10,
            inc_h: 10,
            min_w: 10,
            min_h: 10,
            ..Default::default()
        };
        let c = ctx(Rect::new(0, 14, 100, 100), hints, false);
        let (r, _) = apply_size_hints(&c, Rect::new(0, 14, 107, 123), false);
        // Not honoured: increments are not applied, exact request preserved.
        assert_eq!(r.w, 107);
        assert_eq!(r.h, 123);
    }

    #[test]
    fn is_fixed_requires_nonzero_equal_min_max() {
        let mut h = SizeHints::default();
        assert!(!h.is_fixed());
        h.min_w = 100;
        h.max_w = 100;
        h.min_h = 50;
        h.max_h = 50;
        assert!(h.is_fixed());
        h.max_w = 0;
        assert!(!h.is_fixed());
    }

    // P5: apply_size_hints is idempotent.
    #[quickcheck_macros::quickcheck]
    fn idempotent(x: i32, y: i32, w: i32, h: i32) -> bool {
        let w = w.clamp(-10_000, 10_000);
        let h = h.clamp(-10_000, 10_000);
        let x = x.clamp(-10_000, 10_000);
        let y = y.clamp(-10_000, 10_000);
        let hints = SizeHints {
            base_w: 0,
            base_h: 0,
            inc_w: 1,
            inc_h: 1,
            min_w: 1,
            min_h: 1,
            max_w: 0,
            max_h: 0,
            min_aspect: 0.0,
            max_aspect: 0.0,
        };
        let c0 = ctx(Rect::new(0, 14, 200, 200), hints, true);
        let (r1, _) = apply_size_hints(&c0, Rect::new(x, y, w, h), false);
        let c1 = ctx(r1, hints, true);
        let (r2, _) = apply_size_hints(&c1, r1, false);
        r1 == r2
    }
}
