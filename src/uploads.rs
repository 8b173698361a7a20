//! Uploaded images, kept in memory and served back under a public URL so an
//! upload can be analysed like any hosted image.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use image::ImageFormat;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::ResolveError;
use crate::models::ImageBytes;
use crate::resolver::{into_image, ImageSource};

pub const UPLOAD_ROUTE: &str = "/api/images";

#[derive(Debug, Clone)]
pub struct StoredImage {
    pub name: String,
    pub owner: String,
    pub image: ImageBytes,
}

/// Uploaded files by generated name. Reads are public, since the name is the
/// capability; deletes are scoped to the uploader.
#[derive(Clone)]
pub struct ImageStore {
    inner: Arc<RwLock<HashMap<String, StoredImage>>>,
    max_bytes: usize,
}

impl ImageStore {
    pub fn new(max_bytes: usize) -> Self {
        Self { inner: Arc::default(), max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn store(&self, owner: &str, content: Bytes, content_type: Option<String>) -> Result<StoredImage, ResolveError> {
        if content.len() > self.max_bytes {
            return Err(ResolveError::TooLarge { size: content.len(), limit: self.max_bytes });
        }
        let image = into_image(content, content_type)?;
        let stored = StoredImage {
            name: format!("{}.{}", Uuid::new_v4().simple(), extension(&image.mime_type)),
            owner: owner.to_string(),
            image,
        };
        self.inner.write().insert(stored.name.clone(), stored.clone());
        Ok(stored)
    }

    pub fn get(&self, name: &str) -> Option<StoredImage> {
        self.inner.read().get(name).cloned()
    }

    pub fn delete(&self, owner: &str, name: &str) -> bool {
        let mut guard = self.inner.write();
        match guard.get(name) {
            Some(stored) if stored.owner == owner => {
                guard.remove(name);
                true
            }
            _ => false,
        }
    }
}

pub fn public_url(base_url: &str, name: &str) -> String {
    format!("{}{}/{}", base_url.trim_end_matches('/'), UPLOAD_ROUTE, name)
}

fn extension(mime_type: &str) -> &'static str {
    ImageFormat::from_mime_type(mime_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("img")
}

/// Answers URLs under this service's own upload route from the store and
/// hands every other URL to `remote`.
pub struct UploadResolver {
    uploads: ImageStore,
    prefix: String,
    remote: Arc<dyn ImageSource>,
}

impl UploadResolver {
    pub fn new(uploads: ImageStore, public_base_url: &str, remote: Arc<dyn ImageSource>) -> Self {
        let prefix = public_url(public_base_url, "");
        Self { uploads, prefix, remote }
    }
}

#[async_trait]
impl ImageSource for UploadResolver {
    async fn resolve(&self, url: &str) -> Result<ImageBytes, ResolveError> {
        match url.trim().strip_prefix(&self.prefix) {
            Some(name) => {
                debug!(name, "resolving upload from memory");
                self.uploads
                    .get(name)
                    .map(|stored| stored.image)
                    .ok_or(ResolveError::Fetch { status: 404 })
            }
            None => self.remote.resolve(url).await,
        }
    }
}
