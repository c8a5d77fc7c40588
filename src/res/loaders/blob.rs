use std::any::Any;
use std::sync::Arc;

use crate::dispatch::UploadToken;
use crate::errors::Result;

use super::super::registry::{Loader, PreloadList};
use super::super::resource::{Resource, ResourceInfo};

/// Handles opaque binary payloads that gameplay code interprets itself.
pub struct BlobLoader {
    preload: PreloadList,
}

impl BlobLoader {
    pub fn new() -> Self {
        BlobLoader {
            preload: PreloadList::new(),
        }
    }
}

impl Loader for BlobLoader {
    fn can_load(&self, ext: &str) -> bool {
        ext == "bin" || ext == "dat"
    }

    fn create_entry(&self) -> Box<dyn Resource> {
        Box::new(ResourceBlob::default())
    }

    fn preload(&self) -> &PreloadList {
        &self.preload
    }
}

/// Raw bytes, exactly as read.
#[derive(Default)]
pub struct ResourceBlob {
    info: ResourceInfo,
    data: Vec<u8>,
}

impl ResourceBlob {
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Resource for ResourceBlob {
    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ResourceInfo {
        &mut self.info
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        self.data = bytes.to_vec();
        Ok(())
    }

    fn upload(&mut self, _: &UploadToken) -> Result<()> {
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
