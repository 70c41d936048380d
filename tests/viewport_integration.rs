use std::sync::Arc;
use std::time::Duration;

use photo_edit_core::adjustments::Crop;
use photo_edit_core::config::Config;
use photo_edit_core::events::{RenderDocument, RenderRequest, ViewportRoi};
use photo_edit_core::store::RenderTargetStore;
use photo_edit_core::tasks::viewport::{self, ViewportContext};
use photo_edit_core::viewport::ViewportGate;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Rig {
    updates: watch::Sender<Option<ViewportRoi>>,
    requests: Arc<watch::Sender<Option<RenderRequest>>>,
    gate: Arc<ViewportGate>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    _document: watch::Sender<RenderDocument>,
}

fn spawn_viewport() -> Rig {
    let (updates_tx, updates_rx) = watch::channel(None);
    let (document_tx, document_rx) = watch::channel(RenderDocument::default());
    let requests = Arc::new(watch::channel(None).0);
    let gate = Arc::new(ViewportGate::default());
    let cancel = CancellationToken::new();
    let ctx = ViewportContext {
        document: document_rx,
        requests: requests.clone(),
        store: Arc::new(RenderTargetStore::new()),
        gate: gate.clone(),
        config: Arc::new(Config::default()),
    };
    let handle = tokio::spawn(viewport::run(ctx, updates_rx, cancel.clone()));
    Rig {
        updates: updates_tx,
        requests,
        gate,
        cancel,
        handle,
        _document: document_tx,
    }
}

fn roi_update(x: f32, scale: f32) -> Option<ViewportRoi> {
    Some(ViewportRoi {
        roi: Crop::new(x, 0.25, 0.25, 0.25),
        scale,
    })
}

async fn shutdown(rig: Rig) {
    rig.cancel.cancel();
    let _ = rig.handle.await;
}

#[tokio::test(start_paused = true)]
async fn rapid_updates_collapse_into_one_request_after_the_quiet_period() {
    let rig = spawn_viewport();
    let mut request_rx = rig.requests.subscribe();
    let start = Instant::now();

    // three gesture updates at t = 0, 200, 400 ms, then silence
    rig.updates.send_replace(roi_update(0.1, 3.0));
    tokio::time::sleep(Duration::from_millis(200)).await;
    rig.updates.send_replace(roi_update(0.2, 3.0));
    tokio::time::sleep(Duration::from_millis(200)).await;
    rig.updates.send_replace(roi_update(0.3, 3.0));

    request_rx.changed().await.expect("viewport task gone");
    // 400 ms of gesture + the 1000 ms debounce
    assert_eq!(start.elapsed(), Duration::from_millis(1400));

    let request = request_rx.borrow_and_update().clone().expect("empty slot");
    assert_eq!(request.roi, Some(Crop::new(0.3, 0.25, 0.25, 0.25)));
    let doc: serde_json::Value = serde_json::from_str(&request.edit_json).unwrap();
    assert_eq!(doc["preview"]["useZoom"], true);
    // scale 3.0 on the default ramp
    assert_eq!(doc["preview"]["maxDimension"], 1664);

    // silence: no second request
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!request_rx.has_changed().unwrap());

    shutdown(rig).await;
}

#[tokio::test(start_paused = true)]
async fn zoom_out_rerenders_only_a_dirty_full_frame() {
    let rig = spawn_viewport();
    let mut request_rx = rig.requests.subscribe();

    // region render goes out
    rig.updates.send_replace(roi_update(0.1, 3.0));
    request_rx.changed().await.unwrap();
    assert!(request_rx.borrow_and_update().clone().unwrap().roi.is_some());

    // an edit rendered only the region, so the full frame is stale
    rig.gate.mark_full_frame_dirty();
    rig.updates.send_replace(None);
    request_rx.changed().await.unwrap();
    let request = request_rx.borrow_and_update().clone().unwrap();
    assert!(request.roi.is_none(), "expected a full-frame re-render");

    // zooming out again with a clean frame does nothing
    rig.updates.send_replace(roi_update(0.1, 3.0));
    request_rx.changed().await.unwrap();
    request_rx.borrow_and_update();
    rig.updates.send_replace(None);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!request_rx.has_changed().unwrap());

    shutdown(rig).await;
}

#[tokio::test(start_paused = true)]
async fn mask_drag_suppresses_the_debounced_request() {
    let rig = spawn_viewport();
    let request_rx = rig.requests.subscribe();

    rig.gate
        .mask_drag
        .store(true, std::sync::atomic::Ordering::Release);
    rig.updates.send_replace(roi_update(0.1, 3.0));
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!request_rx.has_changed().unwrap());

    shutdown(rig).await;
}
