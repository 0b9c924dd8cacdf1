// src/canvas/controller.rs
use crate::canvas::epoch::EpochToken;
use crate::canvas::history::HistoryStack;
use crate::canvas::transform::{Position, Rect, ScaleBounds, Size, Transform};
use crate::errors::DesignError;
use crate::models::{CropRegion, DesignImage, GenerationJob, SampledColor};
use crate::services::{BlobStore, ImageProcessor};
use image::{DynamicImage, GenericImageView};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

const DEFAULT_PICK_COLOR: &str = "ffffff";

/// Pointer-driven modes. Only one can be active at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditorMode {
    Idle,
    Dragging {
        pointer_origin: Position,
        position_origin: Position,
    },
    Cropping,
    PickingColor,
}

/// What the UI shows as the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeView {
    Idle,
    Dragging,
    Cropping,
    PickingColor,
    ProcessingRemote,
    Generating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOp {
    RemoveBackground,
    Transparency,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub image: DesignImage,
    pub has_background: bool,
}

/// Issued when a remote operation starts; handed back with its outcome.
#[derive(Debug, Clone)]
pub struct RemoteTicket {
    pub op: RemoteOp,
    pub source: DesignImage,
    pub color: String,
    pub tolerance: f32,
    image_epoch: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanvasSnapshot {
    pub image: Option<DesignImage>,
    pub transform: Transform,
    pub display_rotation: f32,
    pub bounds: Option<Rect>,
    pub history_depth: usize,
    pub can_undo: bool,
    pub mode: ModeView,
    pub is_busy: bool,
    pub last_error: Option<String>,
    pub selected_color: Option<SampledColor>,
    pub preview_color: Option<SampledColor>,
    pub adjusting_transparency: bool,
    pub job: Option<GenerationJob>,
}

struct RasterCache {
    identity: DesignImage,
    image: Arc<DynamicImage>,
}

struct TransparencyAdjustment {
    base: DesignImage,
}

/// Owns the design layer: current image, transform, undo history and the
/// interaction mode. Holds no I/O; asynchronous work is split into a
/// `begin_*` call that hands out what the remote side needs and a
/// `finish_*` call that commits the outcome if it is still relevant.
pub struct CanvasController {
    transform: Transform,
    container: Option<Size>,
    design_size: Size,
    scale_bounds: ScaleBounds,
    current: Option<DesignImage>,
    raster: Option<RasterCache>,
    history: HistoryStack<HistoryEntry>,
    mode: EditorMode,
    remote: Option<RemoteOp>,
    generating: Option<u64>,
    image_epoch: u64,
    last_error: Option<String>,
    selected_color: Option<SampledColor>,
    preview_color: Option<SampledColor>,
    transparency: Option<TransparencyAdjustment>,
    background_original: Option<DesignImage>,
    job: Option<GenerationJob>,
    disposed: bool,
    blobs: Arc<BlobStore>,
    processor: ImageProcessor,
}

impl CanvasController {
    pub fn new(blobs: Arc<BlobStore>, history_limit: usize, scale_bounds: ScaleBounds) -> Self {
        Self {
            transform: Transform::default(),
            container: None,
            design_size: Size::default(),
            scale_bounds,
            current: None,
            raster: None,
            history: HistoryStack::new(history_limit),
            mode: EditorMode::Idle,
            remote: None,
            generating: None,
            image_epoch: 0,
            last_error: None,
            selected_color: None,
            preview_color: None,
            transparency: None,
            background_original: None,
            job: None,
            disposed: false,
            blobs,
            processor: ImageProcessor::new(),
        }
    }

    // ------------------------------------------------------------------
    // Read-only state
    // ------------------------------------------------------------------

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn current_image(&self) -> Option<&DesignImage> {
        self.current.as_ref()
    }

    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn mode_view(&self) -> ModeView {
        match self.mode {
            EditorMode::Dragging { .. } => ModeView::Dragging,
            EditorMode::Cropping => ModeView::Cropping,
            EditorMode::PickingColor => ModeView::PickingColor,
            EditorMode::Idle if self.remote.is_some() => ModeView::ProcessingRemote,
            EditorMode::Idle if self.generating.is_some() => ModeView::Generating,
            EditorMode::Idle => ModeView::Idle,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.remote.is_some() || self.generating.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn selected_color(&self) -> Option<&SampledColor> {
        self.selected_color.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Where the scaled design sits in the container, once both are known.
    pub fn bounds(&self) -> Option<Rect> {
        let container = self.container?;
        self.transform
            .is_placed()
            .then(|| self.transform.bounding_box(container, self.design_size))
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            image: self.current.clone(),
            transform: self.transform(),
            display_rotation: self.transform.display_rotation(),
            bounds: self.bounds(),
            history_depth: self.history_depth(),
            can_undo: self.can_undo(),
            mode: self.mode_view(),
            is_busy: self.is_busy(),
            last_error: self.last_error().map(str::to_string),
            selected_color: self.selected_color().cloned(),
            preview_color: self.preview_color.clone(),
            adjusting_transparency: self.transparency.is_some(),
            job: self.job.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Layout and transform
    // ------------------------------------------------------------------

    /// Records the measured container and design element sizes. The first
    /// measurement centers a design that has never been placed.
    pub fn set_layout(&mut self, container: Size, design: Size) {
        if container.is_measured() {
            self.container = Some(container);
            if !self.transform.is_placed() {
                self.transform = self.transform.with_position(Position::CENTER);
            }
        }
        if design.is_measured() {
            self.design_size = design;
        }
        self.reclamp();
    }

    pub fn move_by(&mut self, dx: f32, dy: f32) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        self.transform = self.transform.translate(dx, dy);
        self.reclamp();
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.transform = self.transform.with_scale(scale, self.scale_bounds);
        self.reclamp();
    }

    pub fn rotate_by(&mut self, delta_degrees: f32) {
        self.transform = self.transform.rotate(delta_degrees);
    }

    /// Back to scale 1, no rotation, centered. History is untouched.
    pub fn reset(&mut self) {
        self.transform = Transform {
            position: self.container.map(|_| Position::CENTER),
            scale: 1.0,
            rotation: 0.0,
            has_background: self.transform.has_background,
        };
        if matches!(self.mode, EditorMode::Dragging { .. }) {
            self.mode = EditorMode::Idle;
        }
    }

    fn reclamp(&mut self) {
        if let Some(container) = self.container {
            self.transform = self.transform.clamp_position(container, self.design_size);
        }
    }

    // ------------------------------------------------------------------
    // Pointer gestures
    // ------------------------------------------------------------------

    pub fn pointer_down(&mut self, point: Position) -> bool {
        if self.mode != EditorMode::Idle || self.current.is_none() {
            return false;
        }
        self.mode = EditorMode::Dragging {
            pointer_origin: point,
            position_origin: self.transform.position.unwrap_or(Position::CENTER),
        };
        true
    }

    pub fn pointer_move(&mut self, point: Position) {
        match self.mode {
            EditorMode::Dragging {
                pointer_origin,
                position_origin,
            } => {
                let target = Position::new(
                    position_origin.x + (point.x - pointer_origin.x),
                    position_origin.y + (point.y - pointer_origin.y),
                );
                if target.x.is_finite() && target.y.is_finite() {
                    self.transform = self.transform.with_position(target);
                    self.reclamp();
                }
            }
            EditorMode::PickingColor => {
                self.preview_color = self.sample_at(point);
            }
            EditorMode::Idle | EditorMode::Cropping => {}
        }
    }

    pub fn pointer_up(&mut self) {
        if matches!(self.mode, EditorMode::Dragging { .. }) {
            self.mode = EditorMode::Idle;
        }
    }

    // ------------------------------------------------------------------
    // Color picking
    // ------------------------------------------------------------------

    pub fn toggle_color_pick(&mut self) -> bool {
        match self.mode {
            EditorMode::Idle if self.current.is_some() => {
                self.mode = EditorMode::PickingColor;
                true
            }
            EditorMode::PickingColor => {
                self.mode = EditorMode::Idle;
                self.preview_color = None;
                true
            }
            _ => false,
        }
    }

    /// Samples the design under `point` and leaves pick mode. When nothing
    /// can be sampled the selected color stays as it was.
    pub fn pick_color_at(&mut self, point: Position) -> Option<SampledColor> {
        if self.mode != EditorMode::PickingColor {
            return None;
        }
        self.mode = EditorMode::Idle;
        self.preview_color = None;

        let color = self.sample_at(point)?;
        info!("Picked color {}", color.hex);
        self.selected_color = Some(color.clone());
        Some(color)
    }

    fn sample_at(&self, point: Position) -> Option<SampledColor> {
        let raster = self.raster()?;
        let displayed = self.displayed_size(&raster);
        self.processor.sample_color(&raster, displayed, point)
    }

    fn displayed_size(&self, raster: &DynamicImage) -> Size {
        if self.design_size.is_measured() {
            self.design_size
        } else {
            let (width, height) = raster.dimensions();
            Size::new(width as f32, height as f32)
        }
    }

    // ------------------------------------------------------------------
    // Cropping
    // ------------------------------------------------------------------

    pub fn begin_crop(&mut self) -> bool {
        if self.mode != EditorMode::Idle || self.current.is_none() {
            return false;
        }
        self.mode = EditorMode::Cropping;
        true
    }

    pub fn cancel_crop(&mut self) -> bool {
        if self.mode != EditorMode::Cropping {
            return false;
        }
        self.mode = EditorMode::Idle;
        true
    }

    /// Leaves crop mode, replacing the image with the cropped region when the
    /// region selects anything. Returns whether the image changed.
    pub fn apply_crop(&mut self, region: &CropRegion) -> bool {
        if self.mode != EditorMode::Cropping {
            return false;
        }
        self.mode = EditorMode::Idle;

        if region.is_empty() {
            debug!("Empty crop region, leaving image untouched");
            return false;
        }

        let Some(raster) = self.raster() else {
            self.fail(DesignError::LocalProcessing(
                "Design image is not loaded".to_string(),
            ));
            return false;
        };
        let displayed = self.displayed_size(&raster);

        match self.processor.crop_to_png(&raster, displayed, region) {
            Ok(Some(png)) => {
                let image = self.blobs.register(png, "image/png");
                self.end_adjustments();
                self.replace_current(image, true);
                self.last_error = None;
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.fail(err);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Remote processing
    // ------------------------------------------------------------------

    /// Removes the background, or brings back the pre-removal image when the
    /// background is already gone. Only removal needs the remote service.
    pub fn toggle_background(&mut self) -> Option<RemoteTicket> {
        if self.transform.has_background {
            let source = self.current.clone()?;
            return self.begin_remote(RemoteOp::RemoveBackground, source, 0.0);
        }

        if self.remote.is_some() {
            return None;
        }
        if let Some(original) = self.background_original.take() {
            self.end_adjustments();
            self.replace_current(original, true);
            self.transform.has_background = true;
            self.last_error = None;
        }
        None
    }

    /// Starts a transparency pass with `tolerance` against the selected
    /// color. Each pass starts from the image as it was before the current
    /// adjustment began.
    pub fn begin_transparency(&mut self, tolerance: f32) -> Option<RemoteTicket> {
        let source = match &self.transparency {
            Some(adjustment) => adjustment.base.clone(),
            None => self.current.clone()?,
        };
        let tolerance = if tolerance.is_finite() {
            tolerance.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.begin_remote(RemoteOp::Transparency, source, tolerance)
    }

    /// Ends the running transparency adjustment; the next pass starts a new one.
    pub fn commit_transparency(&mut self) -> bool {
        self.transparency.take().is_some()
    }

    fn begin_remote(
        &mut self,
        op: RemoteOp,
        source: DesignImage,
        tolerance: f32,
    ) -> Option<RemoteTicket> {
        if self.disposed {
            return None;
        }
        if let Some(running) = self.remote {
            debug!("Ignoring {:?}, {:?} still in flight", op, running);
            return None;
        }

        self.remote = Some(op);
        let color = self
            .selected_color
            .as_ref()
            .map(|c| c.hex_digits().to_string())
            .unwrap_or_else(|| DEFAULT_PICK_COLOR.to_string());

        Some(RemoteTicket {
            op,
            source,
            color,
            tolerance,
            image_epoch: self.image_epoch,
        })
    }

    /// Commits the outcome of a remote operation. Results for an image that
    /// has since been replaced are dropped.
    pub fn finish_remote(
        &mut self,
        ticket: RemoteTicket,
        outcome: Result<DesignImage, DesignError>,
    ) -> bool {
        self.remote = None;

        if self.disposed || ticket.image_epoch != self.image_epoch {
            warn!("Discarding stale {:?} result", ticket.op);
            if let Ok(image) = outcome {
                self.release_if_unreachable(image);
            }
            return false;
        }

        let image = match outcome {
            Ok(image) => image,
            Err(err) => {
                self.fail(err);
                return false;
            }
        };

        match ticket.op {
            RemoteOp::RemoveBackground => {
                self.end_adjustments();
                self.replace_current(image, true);
                self.set_background_original(Some(ticket.source));
                self.transform.has_background = false;
            }
            RemoteOp::Transparency => {
                if self.transparency.is_none() {
                    self.transparency = Some(TransparencyAdjustment {
                        base: ticket.source,
                    });
                    self.replace_current(image, true);
                } else {
                    self.replace_current(image, false);
                }
            }
        }
        self.last_error = None;
        true
    }

    // ------------------------------------------------------------------
    // Generation and new designs
    // ------------------------------------------------------------------

    pub fn begin_generation(&mut self, token: &EpochToken) {
        self.generating = Some(token.value());
    }

    /// Commits a finished generation if `token` is still the newest one.
    /// Returns the installed image.
    pub fn finish_generation(
        &mut self,
        token: &EpochToken,
        outcome: Result<GenerationJob, DesignError>,
    ) -> Option<DesignImage> {
        if self.disposed || !token.is_current() {
            debug!("Discarding superseded generation {}", token.value());
            return None;
        }
        self.generating = None;

        let job = match outcome {
            Ok(job) => job,
            Err(err) => {
                self.fail(err);
                return None;
            }
        };

        let Some(image) = job.result_image.clone() else {
            self.fail(DesignError::InvalidResponse(
                "Generation finished without an image".to_string(),
            ));
            return None;
        };

        self.job = Some(job);
        self.install_design(image.clone());
        Some(image)
    }

    /// Makes `image` the current design, e.g. after an upload.
    pub fn install_design(&mut self, image: DesignImage) {
        self.end_adjustments();
        self.replace_current(image, true);
        self.set_background_original(None);
        self.transform.has_background = true;
        if matches!(self.mode, EditorMode::Cropping | EditorMode::PickingColor) {
            self.mode = EditorMode::Idle;
            self.preview_color = None;
        }
        self.last_error = None;
    }

    // ------------------------------------------------------------------
    // Undo, errors, teardown
    // ------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Restores the most recent history entry. The abandoned image is not
    /// pushed anywhere.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.history.pop() else {
            return false;
        };

        self.transparency = None;
        let abandoned = self.current.replace(entry.image);
        self.transform.has_background = entry.has_background;
        self.image_epoch += 1;
        self.raster = None;
        self.set_background_original(None);
        if let Some(abandoned) = abandoned {
            self.release_if_unreachable(abandoned);
        }

        if matches!(self.mode, EditorMode::Cropping | EditorMode::PickingColor) {
            self.mode = EditorMode::Idle;
            self.preview_color = None;
        }
        self.last_error = None;
        true
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Clears a remote operation whose worker went away without reporting.
    pub fn abandon_remote(&mut self, err: DesignError) {
        self.remote = None;
        self.fail(err);
    }

    /// Drops every image and revokes every blob this controller owns.
    /// In-flight results arriving later are discarded.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.image_epoch += 1;
        self.remote = None;
        self.generating = None;
        self.mode = EditorMode::Idle;
        self.raster = None;
        self.transparency = None;

        let mut owned: Vec<DesignImage> = self
            .history
            .drain()
            .into_iter()
            .map(|entry| entry.image)
            .collect();
        owned.extend(self.current.take());
        owned.extend(self.background_original.take());
        for image in owned {
            if let DesignImage::Blob(url) = &image {
                self.blobs.revoke(url);
            }
        }
        info!("Canvas disposed, {} blobs still live", self.blobs.live_count());
    }

    // ------------------------------------------------------------------
    // Raster cache
    // ------------------------------------------------------------------

    /// The current image when its pixels are not loaded yet.
    pub fn raster_wanted(&self) -> Option<DesignImage> {
        let current = self.current.as_ref()?;
        match &self.raster {
            Some(cache) if &cache.identity == current => None,
            _ => Some(current.clone()),
        }
    }

    pub fn store_raster(&mut self, identity: DesignImage, image: DynamicImage) -> bool {
        if self.current.as_ref() != Some(&identity) {
            return false;
        }
        self.raster = Some(RasterCache {
            identity,
            image: Arc::new(image),
        });
        true
    }

    fn raster(&self) -> Option<Arc<DynamicImage>> {
        let cache = self.raster.as_ref()?;
        (self.current.as_ref() == Some(&cache.identity)).then(|| Arc::clone(&cache.image))
    }

    // ------------------------------------------------------------------
    // Ownership bookkeeping
    // ------------------------------------------------------------------

    fn replace_current(&mut self, image: DesignImage, push_previous: bool) {
        let previous = self.current.replace(image);
        self.image_epoch += 1;
        self.raster = None;

        let Some(previous) = previous else {
            return;
        };
        if push_previous {
            let entry = HistoryEntry {
                image: previous,
                has_background: self.transform.has_background,
            };
            if let Some(evicted) = self.history.push(entry) {
                self.release_if_unreachable(evicted.image);
            }
        } else {
            self.release_if_unreachable(previous);
        }
    }

    fn set_background_original(&mut self, image: Option<DesignImage>) {
        if let Some(old) = std::mem::replace(&mut self.background_original, image) {
            self.release_if_unreachable(old);
        }
    }

    fn end_adjustments(&mut self) {
        self.transparency = None;
    }

    fn is_reachable(&self, image: &DesignImage) -> bool {
        self.current.as_ref() == Some(image)
            || self.background_original.as_ref() == Some(image)
            || self.transparency.as_ref().is_some_and(|t| &t.base == image)
            || self.history.iter().any(|entry| &entry.image == image)
    }

    fn release_if_unreachable(&self, image: DesignImage) {
        if let DesignImage::Blob(url) = &image {
            if !self.is_reachable(&image) {
                self.blobs.revoke(url);
            }
        }
    }

    fn fail(&mut self, err: DesignError) {
        if err == DesignError::Superseded {
            return;
        }
        warn!("Canvas operation failed: {}", err);
        self.last_error = Some(err.user_message());
    }
}
