// src/services/blob_store.rs
use crate::models::DesignImage;
use bytes::Bytes;
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Bytes,
    pub content_type: String,
}

/// Session-local image data addressed by `blob:<uuid>` URLs.
///
/// Entries live until `revoke` is called; the canvas controller is the only
/// owner that revokes.
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: Mutex<HashMap<String, Blob>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, data: impl Into<Bytes>, content_type: &str) -> DesignImage {
        let url = format!("blob:{}", Uuid::new_v4());
        let blob = Blob {
            data: data.into(),
            content_type: content_type.to_string(),
        };
        debug!("Registered {} ({} bytes)", url, blob.data.len());
        self.lock().insert(url.clone(), blob);
        DesignImage::Blob(url)
    }

    pub fn get(&self, url: &str) -> Option<Blob> {
        self.lock().get(url).cloned()
    }

    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.lock().remove(url).is_some();
        if removed {
            debug!("Revoked {}", url);
        }
        removed
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Blob>> {
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_revoke() {
        let store = BlobStore::new();
        let image = store.register(vec![1u8, 2, 3], "image/png");
        let url = image.as_str().to_string();

        assert!(url.starts_with("blob:"));
        assert_eq!(store.get(&url).map(|b| b.data.len()), Some(3));
        assert_eq!(store.live_count(), 1);

        assert!(store.revoke(&url));
        assert!(!store.revoke(&url));
        assert!(store.get(&url).is_none());
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn urls_are_unique() {
        let store = BlobStore::new();
        let a = store.register(Bytes::from_static(b"a"), "image/png");
        let b = store.register(Bytes::from_static(b"a"), "image/png");
        assert_ne!(a, b);
        assert!(store.get(a.as_str()).is_some() && store.get(b.as_str()).is_some());
    }
}
