// src/canvas/transform.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const CENTER: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_measured(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Axis-aligned box in container coordinates (origin at the top-left corner).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleBounds {
    pub min: f32,
    pub max: f32,
}

impl Default for ScaleBounds {
    fn default() -> Self {
        Self { min: 0.1, max: 3.0 }
    }
}

impl ScaleBounds {
    pub fn clamp(&self, scale: f32) -> f32 {
        scale.clamp(self.min, self.max)
    }
}

/// How the design layer sits on the garment preview.
///
/// `position` is relative to the center of the container. `None` means the
/// layer has not been placed yet and gets centered once the container is
/// measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Option<Position>,
    pub scale: f32,
    pub rotation: f32,
    pub has_background: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: None,
            scale: 1.0,
            rotation: 0.0,
            has_background: true,
        }
    }
}

impl Transform {
    pub fn is_placed(&self) -> bool {
        self.position.is_some()
    }

    /// Keeps the scaled design box inside the container. A design wider or
    /// taller than the container is pinned to the center on that axis.
    pub fn clamp_position(&self, container: Size, design: Size) -> Transform {
        let Some(position) = self.position else {
            return *self;
        };

        let limit_x = ((container.width - design.width * self.scale) / 2.0).max(0.0);
        let limit_y = ((container.height - design.height * self.scale) / 2.0).max(0.0);

        Transform {
            position: Some(Position {
                x: position.x.clamp(-limit_x, limit_x),
                y: position.y.clamp(-limit_y, limit_y),
            }),
            ..*self
        }
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Transform {
        let base = self.position.unwrap_or(Position::CENTER);
        Transform {
            position: Some(Position {
                x: base.x + dx,
                y: base.y + dy,
            }),
            ..*self
        }
    }

    pub fn with_position(&self, position: Position) -> Transform {
        Transform {
            position: Some(position),
            ..*self
        }
    }

    pub fn rotate(&self, delta_degrees: f32) -> Transform {
        if !delta_degrees.is_finite() {
            return *self;
        }
        Transform {
            rotation: self.rotation + delta_degrees,
            ..*self
        }
    }

    pub fn with_scale(&self, scale: f32, bounds: ScaleBounds) -> Transform {
        if !scale.is_finite() || scale <= 0.0 {
            return *self;
        }
        Transform {
            scale: bounds.clamp(scale),
            ..*self
        }
    }

    pub fn display_rotation(&self) -> f32 {
        self.rotation % 360.0
    }

    /// Scaled design box in container coordinates, ignoring rotation.
    pub fn bounding_box(&self, container: Size, design: Size) -> Rect {
        let position = self.position.unwrap_or(Position::CENTER);
        let center_x = container.width / 2.0 + position.x;
        let center_y = container.height / 2.0 + position.y;
        let half_w = design.width * self.scale / 2.0;
        let half_h = design.height * self.scale / 2.0;
        Rect {
            left: center_x - half_w,
            top: center_y - half_h,
            right: center_x + half_w,
            bottom: center_y + half_h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    #[test]
    fn clamped_box_stays_inside_container() {
        let container = Size::new(500.0, 400.0);
        let design = Size::new(120.0, 100.0);
        let deltas = [-900.0, -260.0, -13.5, 0.0, 42.0, 199.9, 1000.0];

        for scale in [0.1, 0.5, 1.0, 1.7, 2.5, 3.0] {
            for &dx in &deltas {
                for &dy in &deltas {
                    let t = Transform {
                        position: Some(Position::CENTER),
                        scale,
                        ..Transform::default()
                    };
                    let moved = t.translate(dx, dy).clamp_position(container, design);
                    let bbox = moved.bounding_box(container, design);
                    assert!(bbox.left >= -EPS, "scale {scale} dx {dx}: {bbox:?}");
                    assert!(bbox.top >= -EPS, "scale {scale} dy {dy}: {bbox:?}");
                    assert!(bbox.right <= container.width + EPS);
                    assert!(bbox.bottom <= container.height + EPS);
                }
            }
        }
    }

    #[test]
    fn oversized_design_is_pinned_to_center() {
        let t = Transform::default()
            .with_position(Position::new(80.0, -30.0))
            .with_scale(3.0, ScaleBounds::default());
        let clamped = t.clamp_position(Size::new(200.0, 200.0), Size::new(100.0, 100.0));
        assert_eq!(clamped.position, Some(Position::CENTER));
    }

    #[test]
    fn unplaced_transform_is_left_alone() {
        let t = Transform::default();
        let clamped = t.clamp_position(Size::new(200.0, 200.0), Size::new(50.0, 50.0));
        assert_eq!(clamped.position, None);
        assert!(!clamped.is_placed());
    }

    #[test]
    fn rotation_accumulates_unbounded() {
        let mut t = Transform::default();
        for _ in 0..5 {
            t = t.rotate(90.0);
        }
        assert_eq!(t.rotation, 450.0);
        assert_eq!(t.display_rotation(), 90.0);
        assert_eq!(t.rotate(-500.0).display_rotation(), -50.0);
    }

    #[test]
    fn scale_is_clamped_and_rejects_nonsense() {
        let bounds = ScaleBounds { min: 0.5, max: 2.0 };
        let t = Transform::default();
        assert_eq!(t.with_scale(5.0, bounds).scale, 2.0);
        assert_eq!(t.with_scale(0.2, bounds).scale, 0.5);
        assert_eq!(t.with_scale(0.0, bounds).scale, 1.0);
        assert_eq!(t.with_scale(f32::NAN, bounds).scale, 1.0);
    }
}
