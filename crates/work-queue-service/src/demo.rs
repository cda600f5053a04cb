//! Demo image resize workload.

use crate::settings::DemoSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use work_queue_core::error_type::{ARGUMENT_OUT_OF_RANGE, IO, TIMEOUT};
use work_queue_core::{
    CorrelationId, ErrorType, ErrorTypeCatalog, HandlerError, ProcessingError, SendOptions,
    WorkerNotification,
};

#[cfg(test)]
#[path = "demo_tests.rs"]
mod tests;

/// Source image could not be read; usually transient
pub static SOURCE_IMAGE_MISSING: ErrorType =
    ErrorType::derived("SourceImageMissingException", &IO);

/// Error types the demo settings may refer to
pub fn error_catalog() -> ErrorTypeCatalog {
    let mut catalog = ErrorTypeCatalog::new();
    catalog.register(&SOURCE_IMAGE_MISSING);
    catalog
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeImage {
    pub image_id: u32,
    pub width: u32,
    pub height: u32,
}

/// Build `count` jobs with one correlation ID per image
pub fn seed_jobs(count: usize) -> Vec<(ResizeImage, SendOptions)> {
    (1..=count as u32)
        .map(|image_id| {
            let job = ResizeImage {
                image_id,
                width: 64 * (1 + image_id % 4),
                height: 48 * (1 + image_id % 4),
            };
            let options = CorrelationId::new(format!("image-{}", image_id))
                .map(|id| SendOptions::default().with_correlation_id(id))
                .unwrap_or_default();
            (job, options)
        })
        .collect()
}

/// Handle one resize job
pub async fn resize(
    job: ResizeImage,
    notification: WorkerNotification,
    settings: &DemoSettings,
) -> Result<(), ProcessingError> {
    if job.width == 0 || job.height == 0 {
        return Err(HandlerError::new(
            &ARGUMENT_OUT_OF_RANGE,
            format!("image {} has no area", job.image_id),
        )
        .into());
    }
    if settings.fail_every > 0 && job.image_id % settings.fail_every == 0 {
        warn!(image_id = job.image_id, "Source image missing");
        return Err(HandlerError::new(
            &SOURCE_IMAGE_MISSING,
            format!("source for image {} is not available", job.image_id),
        )
        .into());
    }

    tokio::select! {
        _ = notification.cancel_work_token().cancelled() => {
            return Err(HandlerError::new(&TIMEOUT, "resize cancelled during shutdown").into());
        }
        _ = tokio::time::sleep(Duration::from_millis(settings.processing_time_ms)) => {}
    }

    info!(
        image_id = job.image_id,
        width = job.width,
        height = job.height,
        "Image resized"
    );
    Ok(())
}
