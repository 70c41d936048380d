//! The decode worker: drains the conflated request slot, walks the
//! progressive quality tiers, and gates every result through the render
//! target store's stamp check.

use std::sync::Arc;

use anyhow::Result;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::engine::{DecodeSession, Tier};
use crate::events::{FrameReady, RenderRequest, RenderStatus, StorageJob};
use crate::store::{FrameMeta, RenderSlot, RenderTargetStore, stamp};

const PROGRESSIVE_TIERS: [Tier; 3] = [Tier::SuperLow, Tier::Low, Tier::Full];

pub struct SchedulerContext {
    pub session: Arc<dyn DecodeSession>,
    pub store: Arc<RenderTargetStore>,
    pub status: watch::Sender<RenderStatus>,
    pub frames: mpsc::Sender<FrameReady>,
    pub storage: mpsc::Sender<StorageJob>,
    pub project_id: String,
    pub config: Arc<Config>,
}

/// Runs until cancelled or the request sender goes away. Exactly one of
/// these drives a given decode session; the engine is never called
/// concurrently.
pub async fn run(
    ctx: SchedulerContext,
    mut requests: watch::Receiver<Option<RenderRequest>>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut preempting: Option<RenderRequest> = None;
    loop {
        let request = match preempting.take() {
            Some(request) => request,
            None => {
                select! {
                    _ = cancel.cancelled() => break,
                    changed = requests.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        match requests.borrow_and_update().clone() {
                            Some(request) => request,
                            None => continue,
                        }
                    }
                }
            }
        };
        if cancel.is_cancelled() {
            break;
        }
        preempting = render(&ctx, &mut requests, request).await?;
    }
    debug!("decode worker stopped");
    Ok(())
}

/// Renders one request through its tiers. Returns the newer request that
/// preempted it during a settle window, if any.
async fn render(
    ctx: &SchedulerContext,
    requests: &mut watch::Receiver<Option<RenderRequest>>,
    request: RenderRequest,
) -> Result<Option<RenderRequest>> {
    let progressive = ctx.config.progressive.enabled && !request.is_viewport();
    let tiers: &[Tier] = if progressive {
        &PROGRESSIVE_TIERS
    } else {
        &[Tier::Full]
    };

    for (i, &tier) in tiers.iter().enumerate() {
        let decoded = {
            let session = ctx.session.clone();
            let edit_json = request.edit_json.clone();
            tokio::task::spawn_blocking(move || session.decode(tier, &edit_json)).await?
        };
        handle_result(ctx, &request, tier, decoded).await;

        // Between tiers, hold briefly: if the user is still editing, the
        // next request arrives here and this one is abandoned.
        if i + 1 < tiers.len() {
            let settle = match tier {
                Tier::SuperLow => ctx.config.progressive.super_low_settle(),
                _ => ctx.config.progressive.low_settle(),
            };
            if let Ok(changed) = timeout(settle, requests.changed()).await {
                if changed.is_err() {
                    return Ok(None);
                }
                if let Some(newer) = requests.borrow_and_update().clone() {
                    debug!(
                        abandoned = request.version,
                        newer = newer.version,
                        "request superseded during settle window"
                    );
                    return Ok(Some(newer));
                }
            }
        }
    }
    Ok(None)
}

async fn handle_result(
    ctx: &SchedulerContext,
    request: &RenderRequest,
    tier: Tier,
    decoded: Option<Vec<u8>>,
) {
    let slot = request.slot();
    let result_stamp = stamp(request.version, tier);
    let latest = ctx.store.current_version() == request.version;
    // Only the full-quality edited frame (no region) speaks for the edit
    // state; everything else is best-effort.
    let authoritative = tier == Tier::Full && slot == RenderSlot::Edited;

    let Some(pixels) = decoded else {
        if authoritative && latest {
            warn!(version = request.version, "edited render failed");
            ctx.status.send_replace(RenderStatus {
                error: Some("failed to render the edited image".into()),
            });
        } else {
            debug!(version = request.version, ?tier, "decode failed, superseded render pending");
        }
        return;
    };

    let thumbnail_source = (authoritative && latest).then(|| pixels.clone());
    let meta = FrameMeta {
        rotation_degrees: request.rotation_degrees,
        roi: request.roi,
    };
    if !ctx.store.try_accept(slot, result_stamp, pixels, meta) {
        debug!(stamp = result_stamp, ?slot, "stale result dropped");
        return;
    }

    let _ = ctx
        .frames
        .send(FrameReady {
            slot,
            stamp: result_stamp,
            tier,
        })
        .await;

    if slot == RenderSlot::Edited {
        ctx.status.send_if_modified(|status| {
            if status.error.is_some() {
                status.error = None;
                true
            } else {
                false
            }
        });
    }

    if let Some(frame) = thumbnail_source {
        // Side channel; dropping a thumbnail beats stalling the worker.
        if let Err(err) = ctx.storage.try_send(StorageJob::Thumbnail {
            project_id: ctx.project_id.clone(),
            frame,
        }) {
            debug!(%err, "thumbnail job dropped");
        }
    }
}
