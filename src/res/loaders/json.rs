use std::any::Any;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::dispatch::UploadToken;
use crate::errors::Result;

use super::super::registry::{Loader, PreloadList};
use super::super::resource::{Resource, ResourceInfo};

/// Handles `.json` documents.
pub struct JsonLoader {
    preload: PreloadList,
}

impl JsonLoader {
    pub fn new() -> Self {
        JsonLoader {
            preload: PreloadList::new(),
        }
    }
}

impl Loader for JsonLoader {
    fn can_load(&self, ext: &str) -> bool {
        ext == "json"
    }

    fn create_entry(&self) -> Box<dyn Resource> {
        Box::new(ResourceJson::default())
    }

    fn preload(&self) -> &PreloadList {
        &self.preload
    }
}

/// A decoded JSON document.
#[derive(Default)]
pub struct ResourceJson {
    info: ResourceInfo,
    document: serde_json::Value,
}

impl ResourceJson {
    /// The decoded document.
    #[inline]
    pub fn document(&self) -> &serde_json::Value {
        &self.document
    }

    /// Deserializes the document into a typed value.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.document.clone())?)
    }
}

impl Resource for ResourceJson {
    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ResourceInfo {
        &mut self.info
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        self.document = serde_json::from_slice(bytes)?;
        Ok(())
    }

    fn upload(&mut self, _: &UploadToken) -> Result<()> {
        // JSON has no device-side representation; publication is a no-op.
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
