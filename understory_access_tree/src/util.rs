// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use kurbo::{Affine, Rect};

/// Transform an axis-aligned `Rect` by an `Affine` and return a conservative
/// axis-aligned bounding box in the target space.
pub(crate) fn transform_rect_bbox(affine: Affine, rect: Rect) -> Rect {
    let [a, b, c, d, e, f] = affine.as_coeffs();
    let min_x = (a * rect.x0).min(a * rect.x1) + (c * rect.y0).min(c * rect.y1);
    let max_x = (a * rect.x0).max(a * rect.x1) + (c * rect.y0).max(c * rect.y1);
    let min_y = (b * rect.x0).min(b * rect.x1) + (d * rect.y0).min(d * rect.y1);
    let max_y = (b * rect.x0).max(b * rect.x1) + (d * rect.y0).max(d * rect.y1);
    Rect::new(min_x + e, min_y + f, max_x + e, max_y + f)
}

/// Returns true if `rect` has no positive area in common with `container`.
pub(crate) fn is_outside(rect: Rect, container: Rect) -> bool {
    let overlap = rect.intersect(container);
    overlap.width() <= 0.0 || overlap.height() <= 0.0
}

/// Collapse `rect` onto the nearest point of `container`, keeping a zero-size
/// rect that still says where the content went.
pub(crate) fn collapse_into(rect: Rect, container: Rect) -> Rect {
    let x = rect.x0.clamp(container.x0, container.x1);
    let y = rect.y0.clamp(container.y0, container.y1);
    Rect::new(x, y, x, y)
}
