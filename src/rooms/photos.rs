use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use super::repo;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::StorageClient;

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Upload photos to the object store, then link the keys to the room record.
///
/// Storage writes are deliberately outside any database transaction. If the
/// database link fails after an upload succeeded, the uploaded objects are
/// orphans: we log their keys and surface the error, we do not attempt a
/// cross-system rollback.
pub async fn upload_room_photos(
    st: &AppState,
    room_id: Uuid,
    photos: Vec<UploadItem>,
) -> Result<Vec<String>, ApiError> {
    if photos.is_empty() {
        return Err(ApiError::Validation("at least one photo is required".into()));
    }

    let mut keys = Vec::with_capacity(photos.len());
    for photo in photos {
        let ext = ext_from_mime(&photo.content_type).unwrap_or("bin");
        let key = format!("rooms/{}/{}.{}", room_id, Uuid::new_v4(), ext);
        st.storage
            .put_object(&key, photo.body, &photo.content_type)
            .await
            .with_context(|| format!("put_object {}", key))?;
        keys.push(key);
    }

    let linked = match repo::append_photos(&st.db, room_id, &keys).await {
        Ok(linked) => linked,
        Err(e) => {
            warn!(room_id = %room_id, orphaned_keys = ?keys, "photo upload not linked, objects orphaned");
            return Err(e);
        }
    };
    if !linked {
        warn!(room_id = %room_id, orphaned_keys = ?keys, "room vanished after upload, objects orphaned");
        return Err(ApiError::NotFound("Room not found".into()));
    }

    Ok(keys)
}

/// Best-effort object-store cleanup after a room deletion. Failures are
/// logged with the key so the orphan can be located later; the deletion
/// itself already committed and is not rolled back. Returns how many deletes
/// failed.
pub async fn delete_photos_best_effort(storage: &dyn StorageClient, keys: &[String]) -> usize {
    let mut failures = 0;
    for key in keys {
        if let Err(e) = storage.delete_object(key).await {
            warn!(key = %key, error = %e, "photo delete failed, object orphaned");
            failures += 1;
        }
    }
    failures
}

pub async fn presign_all(st: &AppState, keys: &[String]) -> Result<Vec<String>, ApiError> {
    const TTL_SECS: u64 = 30 * 60;
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        let url = st
            .storage
            .presign_get(key, TTL_SECS)
            .await
            .with_context(|| format!("presign url for key {}", key))?;
        out.push(url);
    }
    Ok(out)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ext_from_mime_known_types() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    struct FailingStorage {
        deletes_attempted: AtomicUsize,
    }

    #[async_trait]
    impl StorageClient for FailingStorage {
        async fn put_object(&self, _k: &str, _b: Bytes, _ct: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_object(&self, _k: &str) -> anyhow::Result<()> {
            self.deletes_attempted.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("storage unreachable")
        }
        async fn presign_get(&self, _k: &str, _s: u64) -> anyhow::Result<String> {
            anyhow::bail!("storage unreachable")
        }
    }

    #[tokio::test]
    async fn orphaned_photos_are_tolerated_not_fatal() {
        let storage = FailingStorage {
            deletes_attempted: AtomicUsize::new(0),
        };
        let keys = vec!["rooms/a/1.jpg".to_string(), "rooms/a/2.jpg".to_string()];

        // Every delete fails, yet the call completes and reports the orphans.
        let failures = delete_photos_best_effort(&storage, &keys).await;
        assert_eq!(failures, 2);
        assert_eq!(storage.deletes_attempted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn presign_all_uses_the_storage_collaborator() {
        let state = crate::state::AppState::fake();
        let urls = presign_all(&state, &["rooms/x/y.jpg".to_string()])
            .await
            .unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].contains("rooms/x/y.jpg"));
    }
}
