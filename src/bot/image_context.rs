use std::collections::HashMap;

use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Per-user "current image" for follow-up edits. In memory only; lost on
/// restart.
#[derive(Default)]
pub struct ImageContextStore {
    images: Mutex<HashMap<i64, StoredImage>>,
}

impl ImageContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, user_id: i64, data: Vec<u8>, mime_type: &str) {
        self.images.lock().await.insert(
            user_id,
            StoredImage {
                data,
                mime_type: mime_type.to_string(),
            },
        );
    }

    pub async fn get(&self, user_id: i64) -> Option<StoredImage> {
        self.images.lock().await.get(&user_id).cloned()
    }

    pub async fn clear(&self, user_id: i64) -> bool {
        self.images.lock().await.remove(&user_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn images_are_kept_per_user() {
        let store = ImageContextStore::new();
        store.set(1, vec![1, 2], "image/png").await;
        store.set(2, vec![3], "image/jpeg").await;
        store.set(1, vec![9], "image/png").await;

        assert_eq!(store.get(1).await.unwrap().data, vec![9]);
        assert_eq!(store.get(2).await.unwrap().mime_type, "image/jpeg");
        assert!(store.clear(2).await);
        assert!(store.get(2).await.is_none());
        assert!(!store.clear(3).await);
    }
}
