//! Descriptor loading. Descriptors are persisted YAML documents; the
//! directory source keeps one per kind and validates at load so malformed
//! documents fail before any reconcile work starts.

use std::path::PathBuf;

use async_trait::async_trait;
use kube::api::DynamicObject;

use konduct_core::descriptor::ResourceDescriptor;
use konduct_core::{Error, Result};

/// Loads the resource descriptor governing a CR.
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    async fn descriptor_for(&self, cr: &DynamicObject) -> Result<ResourceDescriptor>;
}

/// One `<kind lowercase>.yaml` per kind under a directory.
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// Parse and validate a descriptor document.
pub fn parse_descriptor(text: &str) -> Result<ResourceDescriptor> {
    let descriptor: ResourceDescriptor = serde_yaml::from_str(text)
        .map_err(|e| Error::Descriptor(format!("parsing descriptor: {e}")))?;
    descriptor.validate()?;
    Ok(descriptor)
}

#[async_trait]
impl DescriptorSource for DirectorySource {
    async fn descriptor_for(&self, cr: &DynamicObject) -> Result<ResourceDescriptor> {
        let kind = cr
            .types
            .as_ref()
            .map(|t| t.kind.as_str())
            .ok_or_else(|| Error::Descriptor("object has no kind".into()))?;
        let path = self.dir.join(format!("{}.yaml", kind.to_ascii_lowercase()));
        let text = std::fs::read_to_string(&path)
            .map_err(|e| Error::Descriptor(format!("reading {}: {e}", path.display())))?;
        parse_descriptor(&text)
    }
}
