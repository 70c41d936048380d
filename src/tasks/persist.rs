//! Storage worker: debounced adjustments saves and thumbnail generation.
//! Runs entirely off the decode worker's queue so persistence can never
//! hold up a render.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use image::codecs::jpeg::JpegEncoder;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::engine::ProjectStore;
use crate::events::{SaveRequest, StorageJob};

pub async fn run(
    backend: Arc<dyn ProjectStore>,
    mut saves: watch::Receiver<Option<SaveRequest>>,
    mut jobs: mpsc::Receiver<StorageJob>,
    config: Arc<Config>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut pending: Option<SaveRequest> = None;
    let mut jobs_open = true;
    loop {
        select! {
            _ = cancel.cancelled() => {
                // don't lose the last edit on shutdown
                if let Some(save) = pending.take() {
                    write_adjustments(&backend, save).await;
                }
                break;
            }
            changed = saves.changed() => {
                if changed.is_err() {
                    if let Some(save) = pending.take() {
                        write_adjustments(&backend, save).await;
                    }
                    break;
                }
                pending = saves.borrow_and_update().clone();
            }
            job = jobs.recv(), if jobs_open => {
                match job {
                    Some(StorageJob::Thumbnail { project_id, frame }) => {
                        write_thumbnail(&backend, project_id, frame, &config).await;
                    }
                    None => jobs_open = false,
                }
            }
            _ = sleep(config.persist.adjustments_debounce()), if pending.is_some() => {
                let Some(save) = pending.take() else { continue };
                write_adjustments(&backend, save).await;
            }
        }
    }
    debug!("storage worker stopped");
    Ok(())
}

async fn write_adjustments(backend: &Arc<dyn ProjectStore>, save: SaveRequest) {
    let backend = backend.clone();
    let result = tokio::task::spawn_blocking(move || {
        backend.save_adjustments(&save.project_id, &save.json)
    })
    .await;
    match result {
        Ok(Ok(())) => debug!("adjustments saved"),
        Ok(Err(err)) => warn!(%err, "failed to save adjustments"),
        Err(err) => warn!(%err, "adjustments save task failed"),
    }
}

async fn write_thumbnail(
    backend: &Arc<dyn ProjectStore>,
    project_id: String,
    frame: Vec<u8>,
    config: &Config,
) {
    let backend = backend.clone();
    let edge = config.persist.thumbnail_edge;
    let quality = config.persist.thumbnail_jpeg_quality;
    let result = tokio::task::spawn_blocking(move || -> Result<()> {
        let jpeg = encode_thumbnail(&frame, edge, quality)?;
        backend.save_thumbnail(&project_id, &jpeg)
    })
    .await;
    match result {
        Ok(Ok(())) => debug!("thumbnail saved"),
        Ok(Err(err)) => warn!(%err, "failed to save thumbnail"),
        Err(err) => warn!(%err, "thumbnail task failed"),
    }
}

/// Bounds the frame's longest edge and re-encodes as JPEG.
fn encode_thumbnail(frame: &[u8], edge: u32, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(frame).context("decoding rendered frame")?;
    let thumb = img.thumbnail(edge, edge);
    let mut out = Vec::new();
    let mut cursor = Cursor::new(&mut out);
    let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
    thumb
        .write_with_encoder(encoder)
        .context("encoding thumbnail")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma};

    #[test]
    fn thumbnail_is_bounded_and_jpeg() {
        let mut img = GrayImage::new(2048, 1024);
        img.put_pixel(0, 0, Luma([200]));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let jpeg = encode_thumbnail(&png, 1024, 95).unwrap();
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.width(), 1024);
        assert_eq!(decoded.height(), 512);
    }

    #[test]
    fn garbage_frame_is_an_error_not_a_panic() {
        assert!(encode_thumbnail(&[0xBA, 0xD0], 1024, 95).is_err());
    }
}
