//! Debounced region-of-interest render path. Consumes conflated viewport
//! updates from the session; once the (region, scale) pair has been quiet
//! for the debounce window, exactly one request is issued. Zooming back out
//! re-renders the full frame only if a region render left it stale.

use std::sync::Arc;

use anyhow::Result;
use tokio::select;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::events::{RenderDocument, RenderRequest, RenderTarget, ViewportRoi};
use crate::store::RenderTargetStore;
use crate::viewport::{self, ViewportGate};

pub struct ViewportContext {
    pub document: watch::Receiver<RenderDocument>,
    pub requests: Arc<watch::Sender<Option<RenderRequest>>>,
    pub store: Arc<RenderTargetStore>,
    pub gate: Arc<ViewportGate>,
    pub config: Arc<Config>,
}

pub async fn run(
    ctx: ViewportContext,
    mut updates: watch::Receiver<Option<ViewportRoi>>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut pending: Option<ViewportRoi> = None;
    let mut issued_region = false;
    loop {
        select! {
            _ = cancel.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                match *updates.borrow_and_update() {
                    Some(update) => pending = Some(update),
                    None => {
                        pending = None;
                        if issued_region
                            && ctx.gate.take_full_frame_dirty()
                            && !ctx.gate.suppressed()
                        {
                            debug!("zoomed out with stale full frame, re-rendering");
                            issue(&ctx, None);
                        }
                        issued_region = false;
                    }
                }
            }
            // Re-armed from scratch every time an update lands above, so
            // this fires only after the gesture has settled.
            _ = sleep(ctx.config.viewport.debounce()), if pending.is_some() => {
                let Some(update) = pending.take() else { continue };
                if ctx.gate.suppressed() {
                    debug!("viewport render suppressed");
                    continue;
                }
                issue(&ctx, Some(update));
                issued_region = true;
            }
        }
    }
    debug!("viewport worker stopped");
    Ok(())
}

fn issue(ctx: &ViewportContext, region: Option<ViewportRoi>) {
    let doc = ctx.document.borrow().clone();
    let version = ctx.store.next_version();
    let (edit_json, roi) = match region {
        Some(update) => {
            let max_dimension = viewport::zoom_max_dimension(update.scale, &ctx.config.viewport);
            (doc.to_json(Some((&update.roi, max_dimension))), Some(update.roi))
        }
        None => (doc.to_json(None), None),
    };
    debug!(version, region = roi.is_some(), "viewport request");
    ctx.requests.send_replace(Some(RenderRequest {
        version,
        edit_json,
        target: RenderTarget::Edited,
        rotation_degrees: doc.rotation_degrees,
        roi,
    }));
}
