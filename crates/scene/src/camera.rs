//! Cameras and perspective projection.

use glam::{Mat4, Vec3};

use crate::controller::FpsController;
use crate::error::{SceneError, SceneResult};

/// Perspective projection parameters.
///
/// Setters validate their input and leave the projection untouched on error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            // 65 degrees
            fov_y: 1.134_46,
            aspect: 16.0 / 9.0,
            near: 0.01,
            far: 10_000.0,
        }
    }
}

impl Projection {
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> SceneResult<Self> {
        if far < near {
            return Err(SceneError::InvalidProjection(format!(
                "far plane {far} is in front of near plane {near}"
            )));
        }
        let mut projection = Self {
            near,
            far,
            ..Self::default()
        };
        projection.set_fov(fov_y)?;
        projection.set_aspect(aspect)?;
        Ok(projection)
    }

    #[inline]
    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    #[inline]
    pub fn near(&self) -> f32 {
        self.near
    }

    #[inline]
    pub fn far(&self) -> f32 {
        self.far
    }

    /// Vertical field of view in radians, within `[0, π]`.
    pub fn set_fov(&mut self, fov_y: f32) -> SceneResult<()> {
        if !(0.0..=std::f32::consts::PI).contains(&fov_y) {
            return Err(SceneError::InvalidProjection(format!(
                "fov {fov_y} is outside [0, π]"
            )));
        }
        self.fov_y = fov_y;
        Ok(())
    }

    pub fn set_near(&mut self, near: f32) -> SceneResult<()> {
        if near > self.far {
            return Err(SceneError::InvalidProjection(format!(
                "near plane {near} is behind far plane {}",
                self.far
            )));
        }
        self.near = near;
        Ok(())
    }

    pub fn set_far(&mut self, far: f32) -> SceneResult<()> {
        if far < self.near {
            return Err(SceneError::InvalidProjection(format!(
                "far plane {far} is in front of near plane {}",
                self.near
            )));
        }
        self.far = far;
        Ok(())
    }

    pub fn set_aspect(&mut self, aspect: f32) -> SceneResult<()> {
        if !aspect.is_finite() || aspect <= 0.0 {
            return Err(SceneError::InvalidProjection(format!(
                "aspect ratio {aspect} must be positive"
            )));
        }
        self.aspect = aspect;
        Ok(())
    }

    /// Projection matrix with the Y axis flipped for Vulkan clip space.
    pub fn matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }
}

/// Camera pose plus projection.
///
/// The pose is kept as two view-space matrices, like a [`TransformNode`]:
/// the view matrix is `rotation * translation`.
///
/// [`TransformNode`]: crate::TransformNode
#[derive(Clone, Debug, PartialEq)]
pub struct CameraView {
    translation: Mat4,
    rotation: Mat4,
    projection: Projection,
    changed: bool,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            translation: Mat4::IDENTITY,
            rotation: Mat4::IDENTITY,
            projection: Projection::default(),
            changed: true,
        }
    }
}

impl CameraView {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            ..Self::default()
        }
    }

    /// A camera standing at `position`, looking down -Z.
    pub fn at(position: Vec3) -> Self {
        Self {
            translation: Mat4::from_translation(-position),
            ..Self::default()
        }
    }

    /// Move the world by `offset` in view space.
    pub fn translate_view(&mut self, offset: Vec3) {
        self.translation *= Mat4::from_translation(offset);
        self.changed = true;
    }

    /// Turn the view about the Y axis.
    pub fn rotate_view_y(&mut self, angle: f32) {
        self.rotation *= Mat4::from_rotation_y(angle);
        self.changed = true;
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.rotation * self.translation
    }

    /// Eye position in world space.
    pub fn position(&self) -> Vec3 {
        self.view_matrix().inverse().transform_point3(Vec3::ZERO)
    }

    #[inline]
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Mutable access marks the view changed.
    pub fn projection_mut(&mut self) -> &mut Projection {
        self.changed = true;
        &mut self.projection
    }

    #[inline]
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Snapshot the current matrices and clear the changed flag.
    pub fn take_state(&mut self) -> CameraState {
        self.changed = false;
        self.state()
    }

    pub fn state(&self) -> CameraState {
        CameraState {
            view: self.view_matrix(),
            position: self.position(),
            projection: self.projection,
        }
    }
}

/// What the render thread needs from a camera for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub view: Mat4,
    pub position: Vec3,
    pub projection: Projection,
}

impl CameraState {
    /// Projection matrix with the aspect ratio taken from the render target.
    pub fn projection_for(&self, aspect: f32) -> Mat4 {
        let mut projection = self.projection;
        if projection.set_aspect(aspect).is_err() {
            return self.projection.matrix();
        }
        projection.matrix()
    }
}

/// The scene's camera: fixed, or driven by a keyboard controller.
#[derive(Clone, Debug)]
pub enum Camera {
    Static(CameraView),
    Controlled {
        view: CameraView,
        controller: FpsController,
    },
}

impl Default for Camera {
    fn default() -> Self {
        Self::Static(CameraView::default())
    }
}

impl Camera {
    pub fn fixed(view: CameraView) -> Self {
        Self::Static(view)
    }

    pub fn controlled(view: CameraView, controller: FpsController) -> Self {
        Self::Controlled { view, controller }
    }

    pub fn view(&self) -> &CameraView {
        match self {
            Self::Static(view) | Self::Controlled { view, .. } => view,
        }
    }

    pub fn view_mut(&mut self) -> &mut CameraView {
        match self {
            Self::Static(view) | Self::Controlled { view, .. } => view,
        }
    }

    pub fn controller(&self) -> Option<&FpsController> {
        match self {
            Self::Static(_) => None,
            Self::Controlled { controller, .. } => Some(controller),
        }
    }

    pub fn state(&self) -> CameraState {
        self.view().state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_projection_defaults() {
        let p = Projection::default();
        assert_eq!(p.fov_y(), 1.134_46);
        assert_eq!(p.near(), 0.01);
        assert_eq!(p.far(), 10_000.0);
        assert_eq!(p.aspect(), 16.0 / 9.0);
    }

    #[test]
    fn test_set_fov_range() {
        let mut p = Projection::default();
        assert!(p.set_fov(PI + 0.01).is_err());
        assert!(p.set_fov(-0.1).is_err());
        assert_eq!(p.fov_y(), 1.134_46);
        assert!(p.set_fov(FRAC_PI_2).is_ok());
        assert_eq!(p.fov_y(), FRAC_PI_2);
    }

    #[test]
    fn test_near_far_ordering() {
        let mut p = Projection::default();
        assert!(matches!(
            p.set_far(0.001),
            Err(SceneError::InvalidProjection(_))
        ));
        assert!(p.set_near(20_000.0).is_err());
        assert!(p.set_near(1.0).is_ok());
        assert!(p.set_far(1.0).is_ok());
    }

    #[test]
    fn test_projection_new_accepts_large_near() {
        let p = Projection::new(1.0, 1.0, 50_000.0, 60_000.0).unwrap();
        assert_eq!(p.near(), 50_000.0);
        assert_eq!(p.far(), 60_000.0);
        assert!(Projection::new(1.0, 0.0, 0.1, 10.0).is_err());
    }

    #[test]
    fn test_projection_flips_y() {
        let p = Projection::default();
        let unflipped = Mat4::perspective_rh(p.fov_y(), p.aspect(), p.near(), p.far());
        assert_eq!(p.matrix().y_axis.y, -unflipped.y_axis.y);
    }

    #[test]
    fn test_camera_at_position() {
        let view = CameraView::at(Vec3::new(0.0, 1.0, 5.0));
        assert!((view.position() - Vec3::new(0.0, 1.0, 5.0)).length() < 1e-5);
        let origin = view.view_matrix().transform_point3(Vec3::new(0.0, 1.0, 0.0));
        assert!((origin - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn test_take_state_clears_changed() {
        let mut view = CameraView::default();
        assert!(view.is_changed());
        let state = view.take_state();
        assert!(!view.is_changed());
        assert_eq!(state.view, Mat4::IDENTITY);

        view.translate_view(Vec3::Z);
        assert!(view.is_changed());
    }

    #[test]
    fn test_projection_for_overrides_aspect() {
        let state = CameraView::default().state();
        let wide = state.projection_for(2.0);
        let square = state.projection_for(1.0);
        assert_ne!(wide.x_axis.x, square.x_axis.x);
        // A degenerate aspect falls back to the stored one.
        assert_eq!(state.projection_for(0.0), state.projection.matrix());
    }

    #[test]
    fn test_camera_variants() {
        let fixed = Camera::fixed(CameraView::default());
        assert!(fixed.controller().is_none());

        let controlled = Camera::controlled(CameraView::default(), FpsController::default());
        assert!(controlled.controller().is_some());
        assert_eq!(controlled.state(), fixed.state());
    }
}
