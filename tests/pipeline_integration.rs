//! End-to-end: an edit on the session flows through the decode worker into
//! the store, and out the storage worker as a saved document and thumbnail.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{GrayImage, ImageFormat};
use photo_edit_core::config::Config;
use photo_edit_core::engine::{DecodeSession, ProjectStore, Tier};
use photo_edit_core::events::{FrameReady, RenderDocument, RenderStatus};
use photo_edit_core::session::{EditSession, SessionChannels};
use photo_edit_core::store::{RenderSlot, RenderTargetStore};
use photo_edit_core::tasks::{persist, scheduler};
use photo_edit_core::viewport::ViewportGate;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

struct PngSession {
    png: Vec<u8>,
}

impl DecodeSession for PngSession {
    fn decode(&self, _tier: Tier, _edit_json: &str) -> Option<Vec<u8>> {
        Some(self.png.clone())
    }
}

#[derive(Default)]
struct MemoryStore {
    adjustments: Mutex<Vec<(String, String)>>,
    thumbnails: Mutex<Vec<Vec<u8>>>,
}

impl ProjectStore for MemoryStore {
    fn load_adjustments(&self, _project_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.adjustments.lock().unwrap().last().map(|(_, j)| j.clone()))
    }

    fn save_adjustments(&self, project_id: &str, json: &str) -> anyhow::Result<()> {
        self.adjustments
            .lock()
            .unwrap()
            .push((project_id.to_string(), json.to_string()));
        Ok(())
    }

    fn save_thumbnail(&self, _project_id: &str, jpeg: &[u8]) -> anyhow::Result<()> {
        self.thumbnails.lock().unwrap().push(jpeg.to_vec());
        Ok(())
    }
}

fn sample_png() -> Vec<u8> {
    let img = GrayImage::from_pixel(64, 48, image::Luma([128]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

async fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn edit_reaches_display_document_and_thumbnail() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let config = Arc::new(Config::default());
    let store = Arc::new(RenderTargetStore::new());
    let gate = Arc::new(ViewportGate::default());
    let backend = Arc::new(MemoryStore::default());
    let cancel = CancellationToken::new();

    let (request_tx, request_rx) = watch::channel(None);
    let requests = Arc::new(request_tx);
    let (document_tx, _document_rx) = watch::channel(RenderDocument::default());
    let (viewport_tx, _viewport_rx) = watch::channel(None);
    let (saves_tx, saves_rx) = watch::channel(None);
    let (status_tx, status_rx) = watch::channel(RenderStatus::default());
    let (frames_tx, mut frames_rx) = mpsc::channel::<FrameReady>(64);
    let (storage_tx, storage_rx) = mpsc::channel(8);

    let scheduler_handle = tokio::spawn(scheduler::run(
        scheduler::SchedulerContext {
            session: Arc::new(PngSession { png: sample_png() }),
            store: store.clone(),
            status: status_tx,
            frames: frames_tx,
            storage: storage_tx,
            project_id: "p-42".into(),
            config: config.clone(),
        },
        request_rx,
        cancel.clone(),
    ));
    let persist_backend: Arc<dyn ProjectStore> = backend.clone();
    let persist_handle = tokio::spawn(persist::run(
        persist_backend,
        saves_rx,
        storage_rx,
        config.clone(),
        cancel.clone(),
    ));

    let mut session = EditSession::new(
        "p-42",
        4000,
        3000,
        None,
        config.clone(),
        store.clone(),
        gate.clone(),
        SessionChannels {
            requests: requests.clone(),
            document: document_tx,
            viewport: viewport_tx,
            saves: saves_tx,
        },
    );
    session.refresh();
    session.update_adjustments(|a| a.exposure = 0.5);

    // the edited frame lands in the store at full quality
    let mut saw_full = false;
    while !saw_full {
        let frame = tokio::time::timeout(Duration::from_secs(3), frames_rx.recv())
            .await
            .expect("timeout waiting for frames")
            .expect("frame channel closed");
        if frame.slot == RenderSlot::Edited && frame.tier == Tier::Full {
            saw_full = true;
        }
    }
    let accepted = store.latest_frame(RenderSlot::Edited).expect("no frame");
    assert_eq!(accepted.pixels, sample_png());
    assert!(status_rx.borrow().error.is_none());

    // the thumbnail side channel persists a bounded JPEG
    wait_for("thumbnail", || {
        !backend.thumbnails.lock().unwrap().is_empty()
    })
    .await;
    let thumb = backend.thumbnails.lock().unwrap()[0].clone();
    let decoded = image::load_from_memory_with_format(&thumb, ImageFormat::Jpeg).unwrap();
    assert!(decoded.width() <= 1024 && decoded.height() <= 1024);

    // the debounced document save carries the edit
    wait_for("adjustments save", || {
        backend
            .adjustments
            .lock()
            .unwrap()
            .iter()
            .any(|(id, json)| id == "p-42" && json.contains("\"exposure\":0.5"))
    })
    .await;

    cancel.cancel();
    let _ = scheduler_handle.await;
    let _ = persist_handle.await;
}
