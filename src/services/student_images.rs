use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::core::redis::RedisHandle;
use crate::schemas::events::StudentIdImageEvent;

pub(crate) fn cache_key(subject: &str) -> String {
    format!("student-id-images:{subject}")
}

/// Decode a base64 image payload, tolerating a `data:image/...;base64,`
/// prefix in front of the encoded bytes.
pub(crate) fn decode_base64_payload(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded = data.rsplit(',').next().unwrap_or(data);
    STANDARD.decode(encoded.trim())
}

/// File names come straight from the event; anything that could step out
/// of the save directory is rejected rather than sanitized.
fn safe_file_name(file_name: &str) -> Option<&str> {
    if file_name.is_empty() {
        return Some("_");
    }
    if file_name.contains(['/', '\\']) || file_name.contains("..") {
        return None;
    }
    Some(file_name)
}

fn target_path(image_dir: &str, subject: &str, file_name: &str) -> PathBuf {
    Path::new(image_dir).join(subject).join("student_id").join(file_name)
}

/// Persist a student-identity image batch: the whole request is cached
/// under `student-id-images:<subject>` for the review UI, and each decoded
/// image is written to disk. Individual image failures are logged and do
/// not abort the batch.
pub(crate) async fn store_batch(
    redis: &RedisHandle,
    image_dir: &str,
    cache_ttl: Duration,
    event: &StudentIdImageEvent,
) -> Result<()> {
    let key = cache_key(&event.subject);
    let json = serde_json::to_string(event).context("Failed to serialize image batch")?;
    redis
        .set_with_ttl(&key, &json, cache_ttl)
        .await
        .context("Failed to cache image batch")?;

    let save_dir = Path::new(image_dir).join(&event.subject).join("student_id");
    tokio::fs::create_dir_all(&save_dir)
        .await
        .with_context(|| format!("Failed to create {}", save_dir.display()))?;

    for image in &event.images {
        if image.base64_data.is_empty() {
            continue;
        }

        let Some(file_name) = safe_file_name(&image.file_name) else {
            tracing::warn!(file = %image.file_name, "Rejected unsafe image file name");
            continue;
        };
        let path = target_path(image_dir, &event.subject, file_name);

        match decode_base64_payload(&image.base64_data) {
            Ok(bytes) => {
                if let Err(err) = tokio::fs::write(&path, bytes).await {
                    tracing::warn!(file = %path.display(), error = %err, "Failed to write image");
                } else {
                    tracing::debug!(file = %path.display(), "Student-id image saved");
                }
            }
            Err(err) => {
                tracing::warn!(file = file_name, error = %err, "Failed to decode image payload");
            }
        }
    }

    Ok(())
}
