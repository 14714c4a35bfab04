use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::capture::{BarcodeDecoder, CaptureError, FrameSource, StreamGuard};
use crate::models::ScanReport;
use crate::render::{self, ResultPanel, StatsBoard, PANEL_DISPLAY_WINDOW};

/// Minimum time before the same payload is accepted again.
pub const SCAN_COOLDOWN: Duration = Duration::from_millis(2000);

/// Default sampling cadence of the capture loop.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Already scanning")]
    AlreadyScanning,

    #[error("Upload already in progress")]
    UploadInFlight,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Outcome feedback on a submission. Short pulse for a match, long for a
/// miss.
pub trait Feedback: Send + Sync {
    fn pulse(&self, matched: bool);
}

/// Terminal bell feedback: one bell for a match, two for an overage.
pub struct BellFeedback;

impl Feedback for BellFeedback {
    fn pulse(&self, matched: bool) {
        if matched {
            print!("\x07");
        } else {
            print!("\x07\x07");
        }
        let _ = std::io::stdout().flush();
    }
}

/// Debounce against re-triggering on a symbol that stays in frame.
#[derive(Debug)]
pub struct DedupeGate {
    cooldown: Duration,
    last_code: Option<String>,
    last_accept: Option<Instant>,
}

impl DedupeGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_code: None,
            last_accept: None,
        }
    }

    /// Accept a payload if it differs from the last accepted one, or the
    /// cooldown has elapsed since that acceptance.
    pub fn accept(&mut self, code: &str, now: Instant) -> bool {
        let admit = match (&self.last_code, self.last_accept) {
            (Some(last), Some(at)) if last == code => now.duration_since(at) > self.cooldown,
            _ => true,
        };
        if admit {
            self.last_code = Some(code.to_string());
            self.last_accept = Some(now);
        }
        admit
    }
}

/// State shared between the session and its capture task.
struct Shared {
    api: ApiClient,
    gate: Mutex<DedupeGate>,
    panel: Mutex<ResultPanel>,
    board: Mutex<StatsBoard>,
    feedback: Box<dyn Feedback>,
    upload_busy: AtomicBool,
}

struct CaptureHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One client session against the service. Owns the dedupe state, the
/// result panel, the stats board, and the capture task, so nothing lives in
/// module globals.
pub struct ScanSession {
    shared: Arc<Shared>,
    frame_interval: Duration,
    capture: Option<CaptureHandle>,
}

impl ScanSession {
    pub fn new(api: ApiClient, feedback: Box<dyn Feedback>) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                gate: Mutex::new(DedupeGate::new(SCAN_COOLDOWN)),
                panel: Mutex::new(ResultPanel::new()),
                board: Mutex::new(StatsBoard::default()),
                feedback,
                upload_busy: AtomicBool::new(false),
            }),
            frame_interval: DEFAULT_FRAME_INTERVAL,
            capture: None,
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.shared.api
    }

    pub fn scanning(&self) -> bool {
        self.capture.is_some()
    }

    pub async fn panel_visible(&self) -> bool {
        self.shared.panel.lock().await.visible()
    }

    /// Upload an inventory spreadsheet, then refresh statistics. A second
    /// upload attempted while one is in flight is rejected locally; the
    /// guard is restored on every exit path.
    pub async fn upload(&self, path: &Path) -> Result<String> {
        if self.shared.upload_busy.swap(true, Ordering::SeqCst) {
            return Err(SessionError::UploadInFlight);
        }

        let result = self.shared.api.upload(path).await;
        if result.is_ok() {
            refresh_stats(&self.shared).await;
        }
        self.shared.upload_busy.store(false, Ordering::SeqCst);

        result.map_err(SessionError::Api)
    }

    /// Submit a barcode with an optional location. Used by the capture loop,
    /// manual entry, and the one-shot scan command.
    pub async fn submit(&self, barcode: &str, location: &str) -> Result<ScanReport> {
        submit(&self.shared, barcode, location).await
    }

    /// Fetch statistics into the board and return a snapshot. On failure
    /// every field holds the unavailable placeholder.
    pub async fn refresh_stats(&self) -> StatsBoard {
        refresh_stats(&self.shared).await;
        self.shared.board.lock().await.clone()
    }

    pub async fn export(&self, dest: &Path) -> Result<u64> {
        Ok(self.shared.api.export(dest).await?)
    }

    /// Clear all scan data on the service, refresh statistics, and hide any
    /// visible verdict.
    pub async fn reset(&self) -> Result<String> {
        let message = self.shared.api.reset().await?;
        self.shared.panel.lock().await.hide();
        refresh_stats(&self.shared).await;
        Ok(message)
    }

    /// Acquire the frame source and start the capture loop.
    pub async fn start_capture(
        &mut self,
        mut source: Box<dyn FrameSource>,
        decoder: Arc<dyn BarcodeDecoder>,
    ) -> Result<()> {
        if self.capture.is_some() {
            return Err(SessionError::AlreadyScanning);
        }

        let guard = source.open().await?;
        info!("capture stream acquired");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shared = self.shared.clone();
        let interval = self.frame_interval;

        let task = tokio::spawn(async move {
            capture_loop(shared, source, decoder, guard, token, interval).await;
        });

        self.capture = Some(CaptureHandle { cancel, task });
        Ok(())
    }

    /// Stop the capture loop. Returns only after the stream's tracks have
    /// been released. A no-op while idle.
    pub async fn stop_capture(&mut self) {
        if let Some(handle) = self.capture.take() {
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                error!(error = %e, "capture task join failed");
            }
            info!("scanning stopped");
        }
    }
}

async fn submit(shared: &Arc<Shared>, barcode: &str, location: &str) -> Result<ScanReport> {
    let report = shared.api.scan(barcode, location).await?;

    let generation = shared.panel.lock().await.show(report.clone());
    spawn_hide_timer(shared.clone(), generation);

    shared.feedback.pulse(report.matched);

    refresh_stats(shared).await;

    Ok(report)
}

fn spawn_hide_timer(shared: Arc<Shared>, generation: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(PANEL_DISPLAY_WINDOW).await;
        shared.panel.lock().await.hide_if_current(generation);
    });
}

async fn refresh_stats(shared: &Arc<Shared>) {
    match shared.api.stats().await {
        Ok(stats) => shared.board.lock().await.apply(&stats),
        Err(e) => {
            warn!(error = %e, "stats refresh failed, marking unavailable");
            shared.board.lock().await.mark_unavailable();
        }
    }
}

/// Per-tick sampling loop. Grab and decode failures are logged and never
/// break the loop; it runs until cancelled, then releases the stream.
async fn capture_loop(
    shared: Arc<Shared>,
    mut source: Box<dyn FrameSource>,
    decoder: Arc<dyn BarcodeDecoder>,
    guard: StreamGuard,
    cancel: CancellationToken,
    frame_interval: Duration,
) {
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let frame = match source.grab().await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, "frame grab failed");
                        continue;
                    }
                };

                let code = match decoder.decode(&frame).await {
                    Ok(Some(code)) => code,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, "decode failed");
                        continue;
                    }
                };

                let admitted = shared.gate.lock().await.accept(&code, Instant::now());
                if !admitted {
                    debug!(%code, "duplicate within cooldown, suppressed");
                    continue;
                }

                match submit(&shared, &code, "").await {
                    Ok(report) => render::print_report(&report),
                    Err(e) => error!(error = %e, %code, "scan submission failed"),
                }
            }
        }
    }

    guard.release();
    info!("capture stream released");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{self, Frame, Track};
    use crate::render::STAT_UNAVAILABLE;
    use async_trait::async_trait;
    use mockito::Server;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct NullFeedback;

    impl Feedback for NullFeedback {
        fn pulse(&self, _matched: bool) {}
    }

    struct ScriptSource {
        tracks: Vec<Track>,
    }

    impl ScriptSource {
        fn new(tracks: Vec<Track>) -> Self {
            Self { tracks }
        }
    }

    #[async_trait]
    impl FrameSource for ScriptSource {
        async fn open(&mut self) -> capture::Result<StreamGuard> {
            Ok(StreamGuard::new(self.tracks.clone()))
        }

        async fn grab(&mut self) -> capture::Result<Option<Frame>> {
            Ok(Some(Frame::new(vec![0u8; 4])))
        }
    }

    struct ScriptDecoder {
        codes: Vec<String>,
        next: AtomicUsize,
    }

    impl ScriptDecoder {
        fn repeating(code: &str) -> Self {
            Self {
                codes: vec![code.to_string()],
                next: AtomicUsize::new(0),
            }
        }

        fn sequence(codes: &[&str]) -> Self {
            Self {
                codes: codes.iter().map(|s| s.to_string()).collect(),
                next: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BarcodeDecoder for ScriptDecoder {
        async fn decode(&self, _frame: &Frame) -> capture::Result<Option<String>> {
            let idx = self
                .next
                .fetch_add(1, Ordering::SeqCst)
                .min(self.codes.len() - 1);
            Ok(Some(self.codes[idx].clone()))
        }
    }

    fn scan_body() -> String {
        json!({
            "matched": true,
            "status": "CORRECT_LOCATION",
            "description": "Pressure gauge",
            "expected_location": "A1"
        })
        .to_string()
    }

    fn stats_body() -> String {
        json!({
            "total_items": 10,
            "matched_scans": 1,
            "shortages": 9,
            "overages": 0,
            "wrong_locations": 0
        })
        .to_string()
    }

    fn session_for(server: &Server) -> ScanSession {
        let api = ApiClient::new(server.url()).unwrap();
        ScanSession::new(api, Box::new(NullFeedback))
            .with_frame_interval(Duration::from_millis(5))
    }

    #[test]
    fn gate_applies_cooldown_to_repeats() {
        let mut gate = DedupeGate::new(Duration::from_millis(2000));
        let t0 = Instant::now();

        assert!(gate.accept("INV-1", t0));
        assert!(!gate.accept("INV-1", t0 + Duration::from_millis(500)));
        assert!(gate.accept("INV-1", t0 + Duration::from_millis(2500)));
    }

    #[test]
    fn gate_always_admits_a_different_payload() {
        let mut gate = DedupeGate::new(Duration::from_millis(2000));
        let t0 = Instant::now();

        assert!(gate.accept("INV-1", t0));
        assert!(gate.accept("INV-2", t0));
        // Only the last accepted payload is tracked.
        assert!(gate.accept("INV-1", t0 + Duration::from_millis(1)));
    }

    #[test]
    fn gate_rejection_does_not_extend_the_cooldown() {
        let mut gate = DedupeGate::new(Duration::from_millis(2000));
        let t0 = Instant::now();

        assert!(gate.accept("INV-1", t0));
        assert!(!gate.accept("INV-1", t0 + Duration::from_millis(1900)));
        // Window is measured from the acceptance, not the rejected retry.
        assert!(gate.accept("INV-1", t0 + Duration::from_millis(2100)));
    }

    #[tokio::test]
    async fn capture_suppresses_in_frame_duplicates() {
        let mut server = Server::new_async().await;
        let scan_mock = server
            .mock("POST", "/api/scan")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(scan_body())
            .expect(1)
            .create_async()
            .await;
        let _stats_mock = server
            .mock("GET", "/api/stats")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(stats_body())
            .expect_at_least(1)
            .create_async()
            .await;

        let mut session = session_for(&server);
        let track = Track::new("test-cam");
        let source = Box::new(ScriptSource::new(vec![track.clone()]));
        let decoder: Arc<dyn BarcodeDecoder> = Arc::new(ScriptDecoder::repeating("INV-0001"));

        session.start_capture(source, decoder).await.unwrap();
        assert!(session.scanning());

        tokio::time::sleep(Duration::from_millis(100)).await;
        session.stop_capture().await;

        assert!(!session.scanning());
        assert!(track.is_stopped());
        scan_mock.assert_async().await;
    }

    #[tokio::test]
    async fn capture_submits_each_distinct_payload() {
        let mut server = Server::new_async().await;
        let scan_mock = server
            .mock("POST", "/api/scan")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(scan_body())
            .expect(2)
            .create_async()
            .await;
        let _stats_mock = server
            .mock("GET", "/api/stats")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(stats_body())
            .expect_at_least(1)
            .create_async()
            .await;

        let mut session = session_for(&server);
        let source = Box::new(ScriptSource::new(vec![Track::new("test-cam")]));
        let decoder: Arc<dyn BarcodeDecoder> =
            Arc::new(ScriptDecoder::sequence(&["INV-A", "INV-B"]));

        session.start_capture(source, decoder).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.stop_capture().await;

        scan_mock.assert_async().await;
    }

    #[tokio::test]
    async fn starting_twice_is_rejected_and_stop_is_idempotent() {
        let mut server = Server::new_async().await;
        let _stats_mock = server
            .mock("GET", "/api/stats")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(stats_body())
            .create_async()
            .await;

        let mut session = session_for(&server);
        let source = Box::new(ScriptSource::new(vec![Track::new("cam-a")]));
        let decoder: Arc<dyn BarcodeDecoder> = Arc::new(ScriptDecoder::repeating("INV-1"));
        session.start_capture(source, decoder).await.unwrap();

        let second = Box::new(ScriptSource::new(vec![Track::new("cam-b")]));
        let decoder2: Arc<dyn BarcodeDecoder> = Arc::new(ScriptDecoder::repeating("INV-1"));
        let err = session.start_capture(second, decoder2).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyScanning));

        session.stop_capture().await;
        session.stop_capture().await;
        assert!(!session.scanning());
    }

    #[tokio::test]
    async fn reset_hides_the_panel_and_reports_the_message() {
        let mut server = Server::new_async().await;
        let _scan_mock = server
            .mock("POST", "/api/scan")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(scan_body())
            .create_async()
            .await;
        let _stats_mock = server
            .mock("GET", "/api/stats")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(stats_body())
            .create_async()
            .await;
        let _reset_mock = server
            .mock("POST", "/api/reset")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"message": "Scan data cleared"}).to_string())
            .create_async()
            .await;

        let session = session_for(&server);
        session.submit("INV-1", "").await.unwrap();
        assert!(session.panel_visible().await);

        let message = session.reset().await.unwrap();
        assert_eq!(message, "Scan data cleared");
        assert!(!session.panel_visible().await);
    }

    #[tokio::test]
    async fn stats_failure_marks_every_field_unavailable() {
        let mut server = Server::new_async().await;
        let _stats_mock = server
            .mock("GET", "/api/stats")
            .with_status(503)
            .with_body(json!({"error": "asleep"}).to_string())
            .create_async()
            .await;

        let session = session_for(&server);
        let board = session.refresh_stats().await;

        assert_eq!(board.total_items, STAT_UNAVAILABLE);
        assert_eq!(board.matched_scans, STAT_UNAVAILABLE);
        assert_eq!(board.shortages, STAT_UNAVAILABLE);
        assert_eq!(board.overages, STAT_UNAVAILABLE);
        assert_eq!(board.wrong_locations, STAT_UNAVAILABLE);
    }

    #[tokio::test]
    async fn upload_guard_is_restored_after_failure() {
        let mut server = Server::new_async().await;
        let _upload_mock = server
            .mock("POST", "/api/upload")
            .with_status(400)
            .with_body(json!({"error": "Unsupported file format"}).to_string())
            .expect(2)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.csv");
        std::fs::write(&path, b"a,b,c").unwrap();

        let session = session_for(&server);
        let first = session.upload(&path).await.unwrap_err();
        assert!(matches!(first, SessionError::Api(ApiError::Server { .. })));

        // The in-flight guard must not stay latched after an error.
        let second = session.upload(&path).await.unwrap_err();
        assert!(matches!(second, SessionError::Api(ApiError::Server { .. })));
    }
}
