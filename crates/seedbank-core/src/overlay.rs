//! Pointer tracking for the floating seed detail panel.

/// Distance between the cursor and the panel corner.
pub const CURSOR_OFFSET: i32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub left: i32,
    pub top: i32,
}

/// Panel origin for a cursor position.
///
/// Below-right of the cursor by default. When the measured height would push
/// the bottom edge past the viewport, the panel opens above the cursor
/// instead; the same flip applies horizontally against the right edge.
pub fn place_overlay(cursor: Point, panel: Size, viewport: Size, offset: i32) -> Placement {
    let below = cursor.y + offset;
    let top = if below + panel.height > viewport.height {
        cursor.y - panel.height - offset
    } else {
        below
    };

    let right = cursor.x + offset;
    let left = if viewport.width > 0 && right + panel.width > viewport.width {
        (cursor.x - panel.width - offset).max(0)
    } else {
        right
    };

    Placement { left, top }
}

/// Which record the pointer is over, and where the pointer last was.
#[derive(Debug, Clone, Default)]
pub struct HoverTracker<K> {
    hovered: Option<K>,
    cursor: Point,
}

impl<K: Clone + PartialEq> HoverTracker<K> {
    pub fn new() -> Self {
        Self {
            hovered: None,
            cursor: Point::default(),
        }
    }

    pub fn enter(&mut self, key: K) {
        self.hovered = Some(key);
    }

    pub fn leave(&mut self) {
        self.hovered = None;
    }

    pub fn move_to(&mut self, x: i32, y: i32) {
        self.cursor = Point { x, y };
    }

    pub fn hovered(&self) -> Option<&K> {
        self.hovered.as_ref()
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    /// `None` when nothing is hovered.
    pub fn placement(&self, panel: Size, viewport: Size, offset: i32) -> Option<Placement> {
        self.hovered
            .as_ref()
            .map(|_| place_overlay(self.cursor, panel, viewport, offset))
    }
}

/// Rows needed to show `lines` inside a box `inner_width` columns wide,
/// wrapping at character boundaries.
pub fn wrapped_height<'a>(lines: impl IntoIterator<Item = &'a str>, inner_width: usize) -> usize {
    let width = inner_width.max(1);
    lines
        .into_iter()
        .map(|line| {
            let chars = line.chars().count();
            if chars == 0 {
                1
            } else {
                chars.div_ceil(width)
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_above_cursor_near_bottom_edge() {
        let placement = place_overlay(
            Point { x: 100, y: 750 },
            Size {
                width: 320,
                height: 200,
            },
            Size {
                width: 1600,
                height: 800,
            },
            CURSOR_OFFSET,
        );
        assert_eq!(placement.top, 535);
        assert_eq!(placement.left, 115);
    }

    #[test]
    fn stays_below_cursor_when_it_fits() {
        let placement = place_overlay(
            Point { x: 10, y: 100 },
            Size {
                width: 320,
                height: 200,
            },
            Size {
                width: 1600,
                height: 800,
            },
            CURSOR_OFFSET,
        );
        assert_eq!(placement, Placement { left: 25, top: 115 });
    }

    #[test]
    fn exact_fit_does_not_flip() {
        let placement = place_overlay(
            Point { x: 0, y: 585 },
            Size {
                width: 10,
                height: 200,
            },
            Size {
                width: 100,
                height: 800,
            },
            CURSOR_OFFSET,
        );
        assert_eq!(placement.top, 600);
    }

    #[test]
    fn flips_left_near_right_edge() {
        let placement = place_overlay(
            Point { x: 90, y: 2 },
            Size {
                width: 30,
                height: 5,
            },
            Size {
                width: 100,
                height: 40,
            },
            1,
        );
        assert_eq!(placement, Placement { left: 59, top: 3 });
    }

    #[test]
    fn tracker_only_places_while_hovering() {
        let mut tracker: HoverTracker<i64> = HoverTracker::new();
        let panel = Size {
            width: 10,
            height: 4,
        };
        let viewport = Size {
            width: 80,
            height: 24,
        };
        tracker.move_to(5, 5);
        assert!(tracker.placement(panel, viewport, 1).is_none());

        tracker.enter(42);
        assert_eq!(tracker.hovered(), Some(&42));
        assert_eq!(
            tracker.placement(panel, viewport, 1),
            Some(Placement { left: 6, top: 6 })
        );

        tracker.leave();
        assert_eq!(tracker.hovered(), None);
        assert_eq!(tracker.cursor(), Point { x: 5, y: 5 });
    }

    #[test]
    fn wrapped_height_counts_blank_lines() {
        assert_eq!(wrapped_height(["abcdef", "", "abc"], 3), 4);
        assert_eq!(wrapped_height(["x"], 0), 1);
    }
}
