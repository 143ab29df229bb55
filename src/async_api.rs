//! Async facade over the blocking [`Renderer`].
//!
//! Browser automation blocks, so every capture runs on its own dedicated
//! worker thread that owns the browser session from launch to termination.
//! The async caller only waits on a oneshot channel for the result.

use std::sync::Arc;
use std::thread;

use log::error;
use tokio::sync::oneshot;

use crate::fonts::FontAsset;
use crate::{CaptureJob, Error, Renderer, Result};

/// Render `job` on a fresh worker thread and await the image bytes.
///
/// If the worker dies without reporting (a panic inside the browser
/// backend), the capture fails with [`Error::Other`]; the session guard has
/// already terminated the browser while the worker unwound.
pub async fn render(
    renderer: Arc<Renderer>,
    job: CaptureJob,
    font: Option<Arc<FontAsset>>,
) -> Result<Vec<u8>> {
    let (tx, rx) = oneshot::channel::<Result<Vec<u8>>>();

    thread::Builder::new()
        .name("capture-worker".into())
        .spawn(move || {
            let res = renderer.render(&job, font.as_deref());
            // The receiver is gone only if the request was dropped.
            let _ = tx.send(res);
        })
        .map_err(|e| Error::InitializationError(format!("Failed to spawn capture worker: {}", e)))?;

    rx.await.map_err(|e| {
        error!("Capture worker exited without a result: {}", e);
        Error::Other(format!("Capture worker exited unexpectedly: {}", e))
    })?
}
