// src/session.rs
use crate::canvas::controller::{
    CanvasController, CanvasSnapshot, EditorMode, ModeView, RemoteOp, RemoteTicket,
};
use crate::canvas::epoch::{Epoch, EpochToken};
use crate::canvas::transform::{Position, ScaleBounds, Size};
use crate::config::Config;
use crate::errors::DesignError;
use crate::models::*;
use crate::services::image_processor::{decode_data_uri, sniff_mime, to_data_uri};
use crate::services::{BlobStore, DesignBackend, ImageProcessor};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

const MAX_UPLOAD_SIDE: u32 = 2048;

/// One user's design canvas. The controller lock is only ever held between
/// suspension points, so gestures keep flowing while remote work is pending.
pub struct DesignSession {
    controller: Mutex<CanvasController>,
    backend: Arc<dyn DesignBackend>,
    blobs: Arc<BlobStore>,
    generation_epoch: Epoch,
    processor: ImageProcessor,
}

impl DesignSession {
    pub fn new(
        backend: Arc<dyn DesignBackend>,
        history_limit: usize,
        scale_bounds: ScaleBounds,
    ) -> Self {
        let blobs = Arc::new(BlobStore::new());
        Self {
            controller: Mutex::new(CanvasController::new(
                Arc::clone(&blobs),
                history_limit,
                scale_bounds,
            )),
            backend,
            blobs,
            generation_epoch: Epoch::new(),
            processor: ImageProcessor::new(),
        }
    }

    pub fn from_config(backend: Arc<dyn DesignBackend>, config: &Config) -> Self {
        Self::new(backend, config.history_limit, config.scale_bounds)
    }

    pub async fn snapshot(&self) -> CanvasSnapshot {
        self.controller.lock().await.snapshot()
    }

    async fn update<F>(&self, f: F) -> CanvasSnapshot
    where
        F: FnOnce(&mut CanvasController),
    {
        let mut ctrl = self.controller.lock().await;
        f(&mut ctrl);
        ctrl.snapshot()
    }

    /// Checks that the design service answers. Failure only degrades to a warning.
    pub async fn preflight(&self) -> bool {
        match self.backend.health().await {
            Ok(status) => {
                info!("Design service is {}", status.status);
                true
            }
            Err(e) => {
                warn!("Design service health check failed: {}", e);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Generation and uploads
    // ------------------------------------------------------------------

    /// Generates a design from `request`. A newer call supersedes this one;
    /// only the newest result is ever installed.
    ///
    /// The work runs on its own task, so dropping the returned future does
    /// not leave the canvas busy.
    pub async fn generate(self: &Arc<Self>, request: GenerationRequest) -> CanvasSnapshot {
        let token = self.generation_epoch.advance();
        {
            let mut ctrl = self.controller.lock().await;
            if ctrl.is_disposed() {
                return ctrl.snapshot();
            }
            ctrl.begin_generation(&token);
        }

        let session = Arc::clone(self);
        let worker_token = token.clone();
        let task =
            tokio::spawn(async move { session.run_generation(request, worker_token).await });

        match task.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Generation task ended abnormally: {}", e);
                self.update(|ctrl| {
                    ctrl.finish_generation(
                        &token,
                        Err(DesignError::JobFailed("Generation was interrupted".to_string())),
                    );
                })
                .await
            }
        }
    }

    async fn run_generation(
        &self,
        request: GenerationRequest,
        token: EpochToken,
    ) -> CanvasSnapshot {
        info!("Generating design for {:?}", request.prompt);
        let outcome = self.backend.generate(&request, &token).await;

        let (installed, snapshot) = {
            let mut ctrl = self.controller.lock().await;
            let installed = ctrl.finish_generation(&token, outcome);
            (installed, ctrl.snapshot())
        };

        if let Some(image) = installed {
            self.save_in_background(image);
        }
        snapshot
    }

    pub async fn upload(&self, data: Vec<u8>) -> Result<CanvasSnapshot, DesignError> {
        self.processor.validate_image(&data)?;
        let data = self.processor.resize_if_needed(&data, MAX_UPLOAD_SIDE)?;
        let mime = sniff_mime(&data);
        let image = self.blobs.register(data, mime);

        let mut ctrl = self.controller.lock().await;
        if ctrl.is_disposed() {
            self.blobs.revoke(image.as_str());
            return Ok(ctrl.snapshot());
        }
        ctrl.install_design(image);
        Ok(ctrl.snapshot())
    }

    /// Persists `image` as a data URI. Remote results are downloaded first.
    fn save_in_background(&self, image: DesignImage) {
        let local = match &image {
            DesignImage::DataUri(uri) => Some(uri.clone()),
            DesignImage::Blob(url) => match self.blobs.get(url) {
                Some(blob) => Some(to_data_uri(&blob.data)),
                None => return,
            },
            DesignImage::Remote(_) => None,
        };

        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let image_data = match local {
                Some(data) => data,
                None => match backend.fetch_image(image.as_str()).await {
                    Ok(bytes) => to_data_uri(&bytes),
                    Err(e) => {
                        warn!("Could not download design for saving: {}", e);
                        return;
                    }
                },
            };
            if let Err(e) = backend.save_design(&image_data).await {
                warn!("Could not save design: {}", e);
            }
        });
    }

    pub async fn design_history(&self) -> Result<Vec<SavedDesign>, DesignError> {
        self.backend.design_history().await
    }

    // ------------------------------------------------------------------
    // Image data
    // ------------------------------------------------------------------

    pub async fn resolve_bytes(&self, image: &DesignImage) -> Result<Vec<u8>, DesignError> {
        match image {
            DesignImage::Blob(url) => self
                .blobs
                .get(url)
                .map(|blob| blob.data.to_vec())
                .ok_or_else(|| DesignError::LocalProcessing(format!("{} was released", url))),
            DesignImage::DataUri(uri) => decode_data_uri(uri),
            DesignImage::Remote(url) => self.backend.fetch_image(url).await,
        }
    }

    /// Current image bytes and their content type, for rendering.
    pub async fn current_image(&self) -> Result<Option<(Vec<u8>, String)>, DesignError> {
        let current = self.controller.lock().await.current_image().cloned();
        let Some(image) = current else {
            return Ok(None);
        };
        if let DesignImage::Blob(url) = &image {
            let blob = self
                .blobs
                .get(url)
                .ok_or_else(|| DesignError::LocalProcessing(format!("{} was released", url)))?;
            return Ok(Some((blob.data.to_vec(), blob.content_type)));
        }
        let bytes = self.resolve_bytes(&image).await?;
        let mime = sniff_mime(&bytes).to_string();
        Ok(Some((bytes, mime)))
    }

    /// Loads the pixels of the current image into the controller if they are
    /// missing. Failures leave the cache empty.
    async fn ensure_raster(&self) {
        let wanted = self.controller.lock().await.raster_wanted();
        let Some(identity) = wanted else {
            return;
        };

        let decoded = match self.resolve_bytes(&identity).await {
            Ok(bytes) => self.processor.decode(&bytes),
            Err(e) => Err(e),
        };
        match decoded {
            Ok(img) => {
                self.controller.lock().await.store_raster(identity, img);
            }
            Err(e) => debug!("Pixels unavailable for {}: {}", identity.as_str(), e),
        }
    }

    // ------------------------------------------------------------------
    // Remote processing
    // ------------------------------------------------------------------

    pub async fn make_transparent(
        &self,
        image: &DesignImage,
        color: &str,
        tolerance: f32,
    ) -> Result<DesignImage, DesignError> {
        let bytes = self.resolve_bytes(image).await?;
        let out = self
            .backend
            .make_transparent(bytes, color, tolerance)
            .await?;
        let mime = sniff_mime(&out);
        Ok(self.blobs.register(out, mime))
    }

    pub async fn remove_background(&self, image: &DesignImage) -> Result<DesignImage, DesignError> {
        let bytes = self.resolve_bytes(image).await?;
        let out = self.backend.remove_background(bytes).await?;
        let mime = sniff_mime(&out);
        Ok(self.blobs.register(out, mime))
    }

    /// Runs the remote half of `ticket` on its own task, so the controller
    /// always hears back even when the caller goes away.
    async fn spawn_remote(self: &Arc<Self>, ticket: RemoteTicket) -> CanvasSnapshot {
        let session = Arc::clone(self);
        let task = tokio::spawn(async move { session.run_remote(ticket).await });

        match task.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Remote processing task ended abnormally: {}", e);
                self.update(|ctrl| {
                    ctrl.abandon_remote(DesignError::LocalProcessing(
                        "Remote processing was interrupted".to_string(),
                    ));
                })
                .await
            }
        }
    }

    async fn run_remote(&self, ticket: RemoteTicket) -> CanvasSnapshot {
        let outcome = match ticket.op {
            RemoteOp::RemoveBackground => self.remove_background(&ticket.source).await,
            RemoteOp::Transparency => {
                self.make_transparent(&ticket.source, &ticket.color, ticket.tolerance)
                    .await
            }
        };
        self.update(|ctrl| {
            ctrl.finish_remote(ticket, outcome);
        })
        .await
    }

    pub async fn toggle_background(self: &Arc<Self>) -> CanvasSnapshot {
        let ticket = self.controller.lock().await.toggle_background();
        match ticket {
            Some(ticket) => self.spawn_remote(ticket).await,
            None => self.snapshot().await,
        }
    }

    pub async fn set_transparency(self: &Arc<Self>, value: f32) -> CanvasSnapshot {
        let ticket = self.controller.lock().await.begin_transparency(value);
        match ticket {
            Some(ticket) => self.spawn_remote(ticket).await,
            None => self.snapshot().await,
        }
    }

    pub async fn commit_transparency(&self) -> CanvasSnapshot {
        self.update(|ctrl| {
            ctrl.commit_transparency();
        })
        .await
    }

    // ------------------------------------------------------------------
    // Local editing
    // ------------------------------------------------------------------

    pub async fn set_layout(&self, container: Size, design: Size) -> CanvasSnapshot {
        self.update(|ctrl| ctrl.set_layout(container, design)).await
    }

    pub async fn pointer_down(&self, point: Position) -> CanvasSnapshot {
        self.update(|ctrl| {
            ctrl.pointer_down(point);
        })
        .await
    }

    pub async fn pointer_move(&self, point: Position) -> CanvasSnapshot {
        self.update(|ctrl| ctrl.pointer_move(point)).await
    }

    pub async fn pointer_up(&self) -> CanvasSnapshot {
        self.update(|ctrl| ctrl.pointer_up()).await
    }

    pub async fn move_by(&self, dx: f32, dy: f32) -> CanvasSnapshot {
        self.update(|ctrl| ctrl.move_by(dx, dy)).await
    }

    pub async fn set_scale(&self, scale: f32) -> CanvasSnapshot {
        self.update(|ctrl| ctrl.set_scale(scale)).await
    }

    pub async fn rotate_by(&self, delta_degrees: f32) -> CanvasSnapshot {
        self.update(|ctrl| ctrl.rotate_by(delta_degrees)).await
    }

    pub async fn toggle_color_pick(&self) -> CanvasSnapshot {
        let snapshot = self
            .update(|ctrl| {
                ctrl.toggle_color_pick();
            })
            .await;
        if snapshot.mode == ModeView::PickingColor {
            self.ensure_raster().await;
        }
        snapshot
    }

    pub async fn pick_color_at(&self, point: Position) -> CanvasSnapshot {
        if self.controller.lock().await.mode() != EditorMode::PickingColor {
            return self.snapshot().await;
        }
        self.ensure_raster().await;
        self.update(|ctrl| {
            ctrl.pick_color_at(point);
        })
        .await
    }

    pub async fn begin_crop(&self) -> CanvasSnapshot {
        let snapshot = self
            .update(|ctrl| {
                ctrl.begin_crop();
            })
            .await;
        if snapshot.mode == ModeView::Cropping {
            self.ensure_raster().await;
        }
        snapshot
    }

    pub async fn apply_crop(&self, region: CropRegion) -> CanvasSnapshot {
        let cropping = self.controller.lock().await.mode() == EditorMode::Cropping;
        if cropping && !region.is_empty() {
            self.ensure_raster().await;
        }
        self.update(|ctrl| {
            ctrl.apply_crop(&region);
        })
        .await
    }

    pub async fn cancel_crop(&self) -> CanvasSnapshot {
        self.update(|ctrl| {
            ctrl.cancel_crop();
        })
        .await
    }

    pub async fn undo(&self) -> CanvasSnapshot {
        self.update(|ctrl| {
            ctrl.undo();
        })
        .await
    }

    pub async fn reset(&self) -> CanvasSnapshot {
        self.update(|ctrl| ctrl.reset()).await
    }

    pub async fn dismiss_error(&self) -> CanvasSnapshot {
        self.update(|ctrl| ctrl.dismiss_error()).await
    }

    /// Cancels pending generation and releases every image this session owns.
    pub async fn dispose(&self) {
        self.generation_epoch.advance();
        self.controller.lock().await.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    type Gate<T> = oneshot::Receiver<Result<T, DesignError>>;

    #[derive(Default)]
    struct FakeBackend {
        generation_gates: StdMutex<HashMap<String, Gate<GenerationJob>>>,
        generation_calls: StdMutex<Vec<String>>,
        transparency_results: StdMutex<VecDeque<Result<Vec<u8>, DesignError>>>,
        transparency_gate: StdMutex<Option<Gate<Vec<u8>>>>,
        transparency_calls: StdMutex<Vec<(String, f32)>>,
        remote_images: StdMutex<HashMap<String, Vec<u8>>>,
        fetches: StdMutex<Vec<String>>,
        saved: StdMutex<Vec<String>>,
    }

    impl FakeBackend {
        fn gate_generation(&self, prompt: &str) -> oneshot::Sender<Result<GenerationJob, DesignError>> {
            let (tx, rx) = oneshot::channel();
            self.generation_gates
                .lock()
                .unwrap()
                .insert(prompt.to_string(), rx);
            tx
        }

        fn called(&self, prompt: &str) -> bool {
            self.generation_calls
                .lock()
                .unwrap()
                .iter()
                .any(|p| p == prompt)
        }
    }

    fn completed(id: &str, image: DesignImage) -> GenerationJob {
        let mut job = GenerationJob::new(id);
        job.complete(image);
        job
    }

    fn data_image(prompt: &str) -> DesignImage {
        DesignImage::DataUri(format!("data:image/png;base64,{}", prompt))
    }

    #[async_trait]
    impl DesignBackend for FakeBackend {
        async fn generate(
            &self,
            request: &GenerationRequest,
            _token: &EpochToken,
        ) -> Result<GenerationJob, DesignError> {
            self.generation_calls
                .lock()
                .unwrap()
                .push(request.prompt.clone());
            let gate = self.generation_gates.lock().unwrap().remove(&request.prompt);
            match gate {
                Some(rx) => rx.await.unwrap_or(Err(DesignError::Superseded)),
                None if request.prompt == "a cosmic galaxy" => {
                    Ok(completed("abc", data_image("AAAA")))
                }
                None if request.prompt.starts_with("http") => Ok(completed(
                    "remote",
                    DesignImage::Remote(request.prompt.clone()),
                )),
                None => Ok(completed(&request.prompt, data_image(&request.prompt))),
            }
        }

        async fn remove_background(&self, image: Vec<u8>) -> Result<Vec<u8>, DesignError> {
            Ok(image)
        }

        async fn make_transparent(
            &self,
            image: Vec<u8>,
            color: &str,
            tolerance: f32,
        ) -> Result<Vec<u8>, DesignError> {
            self.transparency_calls
                .lock()
                .unwrap()
                .push((color.to_string(), tolerance));
            let gate = self.transparency_gate.lock().unwrap().take();
            if let Some(rx) = gate {
                return rx.await.unwrap_or(Err(DesignError::Superseded));
            }
            self.transparency_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(image))
        }

        async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, DesignError> {
            self.fetches.lock().unwrap().push(url.to_string());
            self.remote_images
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or(DesignError::Service {
                    status: 404,
                    detail: "Image not found".into(),
                })
        }

        async fn save_design(&self, image_data: &str) -> Result<(), DesignError> {
            self.saved.lock().unwrap().push(image_data.to_string());
            Ok(())
        }

        async fn design_history(&self) -> Result<Vec<SavedDesign>, DesignError> {
            Err(DesignError::NetworkUnreachable("offline".into()))
        }

        async fn health(&self) -> Result<HealthStatus, DesignError> {
            Err(DesignError::NetworkUnreachable("offline".into()))
        }
    }

    fn session() -> (Arc<DesignSession>, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::default());
        let session = Arc::new(DesignSession::new(
            Arc::clone(&backend) as Arc<dyn DesignBackend>,
            20,
            ScaleBounds::default(),
        ));
        (session, backend)
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbaImage::from_pixel(width, height, Rgba([128, 128, 128, 255]));
        img.put_pixel(width - 1, 0, Rgba([0, 255, 0, 255]));
        ImageProcessor::new()
            .encode_png(&DynamicImage::ImageRgba8(img))
            .unwrap()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn galaxy_prompt_installs_image_and_grows_history() {
        let (session, backend) = session();

        let snapshot = session
            .generate(GenerationRequest::new("a cosmic galaxy"))
            .await;
        assert_eq!(snapshot.image, Some(data_image("AAAA")));
        assert_eq!(snapshot.history_depth, 0);
        assert_eq!(snapshot.last_error, None);
        assert!(!snapshot.is_busy);

        let snapshot = session
            .generate(GenerationRequest::new("a cosmic galaxy"))
            .await;
        assert_eq!(snapshot.history_depth, 1);

        settle().await;
        let saved = backend.saved.lock().unwrap().clone();
        assert_eq!(saved.first().map(String::as_str), Some("data:image/png;base64,AAAA"));
    }

    #[tokio::test]
    async fn newer_prompt_wins_over_late_older_result() {
        let (session, backend) = session();
        let release_a = backend.gate_generation("A");

        let first = Arc::clone(&session);
        let pending_a =
            tokio::spawn(async move { first.generate(GenerationRequest::new("A")).await });
        while !backend.called("A") {
            tokio::task::yield_now().await;
        }
        assert_eq!(session.snapshot().await.mode, ModeView::Generating);

        let after_b = session.generate(GenerationRequest::new("B")).await;
        assert_eq!(after_b.image, Some(data_image("B")));

        release_a
            .send(Ok(completed("A", data_image("A"))))
            .unwrap();
        pending_a.await.unwrap();

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.image, Some(data_image("B")));
        assert_eq!(snapshot.history_depth, 0);
        assert!(!snapshot.is_busy);
    }

    #[tokio::test]
    async fn transparency_error_detail_reaches_ui() {
        let (session, backend) = session();
        session.upload(png(8, 8)).await.unwrap();
        let before = session.snapshot().await.image;

        backend
            .transparency_results
            .lock()
            .unwrap()
            .push_back(Err(DesignError::Service {
                status: 500,
                detail: "OOM".into(),
            }));

        let snapshot = session.set_transparency(0.5).await;
        assert_eq!(snapshot.last_error.as_deref(), Some("OOM"));
        assert_eq!(snapshot.image, before);
        assert_eq!(snapshot.history_depth, 0);
        assert_eq!(
            backend.transparency_calls.lock().unwrap().clone(),
            vec![("ffffff".to_string(), 0.5)]
        );
    }

    #[tokio::test]
    async fn second_remote_request_is_ignored_while_busy() {
        let (session, backend) = session();
        session.upload(png(8, 8)).await.unwrap();

        let (release, gate) = oneshot::channel();
        *backend.transparency_gate.lock().unwrap() = Some(gate);

        let first = Arc::clone(&session);
        let pending = tokio::spawn(async move { first.set_transparency(0.2).await });
        while backend.transparency_calls.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        let ignored = session.set_transparency(0.8).await;
        assert!(ignored.is_busy);
        assert_eq!(ignored.mode, ModeView::ProcessingRemote);
        assert_eq!(backend.transparency_calls.lock().unwrap().len(), 1);

        let moved = session.move_by(5.0, 5.0).await;
        assert!(moved.transform.position.is_some(), "gestures keep working");

        release.send(Ok(png(8, 8))).unwrap();
        let done = pending.await.unwrap();
        assert!(!done.is_busy);
        assert!(done.adjusting_transparency);
        assert_eq!(done.history_depth, 1);
    }

    #[tokio::test]
    async fn zero_crop_leaves_image_and_exits_mode() {
        let (session, _) = session();
        session.upload(png(16, 16)).await.unwrap();
        let before = session.snapshot().await.image;

        assert_eq!(session.begin_crop().await.mode, ModeView::Cropping);
        let snapshot = session
            .apply_crop(CropRegion::px(0.0, 0.0, 0.0, 0.0))
            .await;
        assert_eq!(snapshot.mode, ModeView::Idle);
        assert_eq!(snapshot.image, before);
        assert_eq!(snapshot.history_depth, 0);
    }

    #[tokio::test]
    async fn full_crop_keeps_pixel_dimensions() {
        let (session, _) = session();
        session.upload(png(40, 30)).await.unwrap();
        session
            .set_layout(Size::new(500.0, 500.0), Size::new(200.0, 150.0))
            .await;

        session.begin_crop().await;
        let snapshot = session
            .apply_crop(CropRegion::px(0.0, 0.0, 200.0, 150.0))
            .await;
        assert_eq!(snapshot.history_depth, 1);

        let (bytes, mime) = session.current_image().await.unwrap().unwrap();
        assert_eq!(mime, "image/png");
        let cropped = image::load_from_memory(&bytes).unwrap();
        assert_eq!(cropped.dimensions(), (40, 30));
    }

    #[tokio::test]
    async fn picks_color_from_remote_design() {
        let (session, backend) = session();
        let url = "http://designs.local/images/abc.webp".to_string();
        backend
            .remote_images
            .lock()
            .unwrap()
            .insert(url.clone(), png(4, 4));

        {
            let mut ctrl = session.controller.lock().await;
            ctrl.install_design(DesignImage::Remote(url));
        }
        session
            .set_layout(Size::new(400.0, 400.0), Size::new(100.0, 100.0))
            .await;

        assert_eq!(session.toggle_color_pick().await.mode, ModeView::PickingColor);
        let snapshot = session.pick_color_at(Position::new(90.0, 10.0)).await;
        assert_eq!(snapshot.mode, ModeView::Idle);
        assert_eq!(snapshot.selected_color.map(|c| c.rgb), Some([0, 255, 0]));
    }

    #[tokio::test]
    async fn undo_restores_previous_upload() {
        let (session, _) = session();
        let first = session.upload(png(8, 8)).await.unwrap().image;
        session.upload(png(6, 6)).await.unwrap();

        let snapshot = session.undo().await;
        assert_eq!(snapshot.image, first);
        assert_eq!(snapshot.history_depth, 0);
        assert_eq!(session.blobs.live_count(), 1);

        let again = session.undo().await;
        assert_eq!(again.image, first);
    }

    #[tokio::test]
    async fn dispose_cancels_generation_and_releases_blobs() {
        let (session, backend) = session();
        session.upload(png(8, 8)).await.unwrap();
        let release = backend.gate_generation("late");

        let runner = Arc::clone(&session);
        let pending =
            tokio::spawn(async move { runner.generate(GenerationRequest::new("late")).await });
        while !backend.called("late") {
            tokio::task::yield_now().await;
        }

        session.dispose().await;
        assert_eq!(session.blobs.live_count(), 0);

        release
            .send(Ok(completed("late", data_image("late"))))
            .unwrap();
        let snapshot = pending.await.unwrap();
        assert_eq!(snapshot.image, None);
    }

    #[tokio::test]
    async fn unreachable_services_do_not_block_the_canvas() {
        let (session, _) = session();
        assert!(!session.preflight().await);
        assert!(session.design_history().await.is_err());

        let snapshot = session.upload(png(8, 8)).await.unwrap();
        assert!(snapshot.image.is_some());
    }

    #[tokio::test]
    async fn invalid_upload_is_rejected() {
        let (session, _) = session();
        let err = session.upload(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, DesignError::Validation(_)));
        assert_eq!(session.blobs.live_count(), 0);
    }

    #[tokio::test]
    async fn transparency_finishes_after_caller_gives_up() {
        let (session, backend) = session();
        session.upload(png(8, 8)).await.unwrap();

        let (release, gate) = oneshot::channel();
        *backend.transparency_gate.lock().unwrap() = Some(gate);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), session.set_transparency(0.5)).await;
        assert!(abandoned.is_err());
        assert!(session.snapshot().await.is_busy);

        release.send(Ok(png(8, 8))).unwrap();
        settle().await;
        let snapshot = session.snapshot().await;
        assert!(!snapshot.is_busy);
        assert_eq!(snapshot.history_depth, 1);

        let next = session.set_transparency(0.7).await;
        assert!(!next.is_busy);
        assert_eq!(backend.transparency_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn lost_remote_reply_does_not_leave_canvas_busy() {
        let (session, backend) = session();
        session.upload(png(8, 8)).await.unwrap();
        let before = session.snapshot().await.image;

        let (release, gate) = oneshot::channel();
        *backend.transparency_gate.lock().unwrap() = Some(gate);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), session.set_transparency(0.5)).await;
        assert!(abandoned.is_err());

        drop(release);
        settle().await;
        let snapshot = session.snapshot().await;
        assert!(!snapshot.is_busy);
        assert_eq!(snapshot.image, before);
    }

    #[tokio::test]
    async fn generation_finishes_after_caller_gives_up() {
        let (session, backend) = session();
        let release = backend.gate_generation("x");

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            session.generate(GenerationRequest::new("x")),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(session.snapshot().await.mode, ModeView::Generating);

        release.send(Ok(completed("x", data_image("x")))).unwrap();
        settle().await;
        let snapshot = session.snapshot().await;
        assert!(!snapshot.is_busy);
        assert_eq!(snapshot.image, Some(data_image("x")));
    }

    #[tokio::test]
    async fn remote_design_is_saved_as_data_uri() {
        let (session, backend) = session();
        let url = "http://designs.local/images/tiger.png".to_string();
        backend
            .remote_images
            .lock()
            .unwrap()
            .insert(url.clone(), png(4, 4));

        let snapshot = session.generate(GenerationRequest::new(url.clone())).await;
        assert_eq!(snapshot.image, Some(DesignImage::Remote(url)));

        settle().await;
        let saved = backend.saved.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].starts_with("data:image/png;base64,"), "saved {}", saved[0]);
    }

    #[tokio::test]
    async fn stray_pick_does_not_download_pixels() {
        let (session, backend) = session();
        let url = "http://designs.local/images/abc.png".to_string();
        backend
            .remote_images
            .lock()
            .unwrap()
            .insert(url.clone(), png(4, 4));
        {
            let mut ctrl = session.controller.lock().await;
            ctrl.install_design(DesignImage::Remote(url));
        }

        let snapshot = session.pick_color_at(Position::new(1.0, 1.0)).await;
        assert_eq!(snapshot.selected_color, None);
        let snapshot = session.apply_crop(CropRegion::px(0.0, 0.0, 2.0, 2.0)).await;
        assert_eq!(snapshot.history_depth, 0);
        assert!(backend.fetches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blob_image_is_served_with_its_stored_type() {
        let (session, _) = session();
        session.upload(png(5, 5)).await.unwrap();

        let (bytes, mime) = session.current_image().await.unwrap().unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (5, 5));
    }
}
