//! Category mapper: free-form labels attached to narrations, persisted as the
//! `metadata.json` document.

use std::sync::Arc;

use conciliar_core::{BlobStore, CategoryMetadata, Error, METADATA_DOCUMENT, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What happens to mappings that point at a removed label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelRemoval {
    /// Mappings survive and keep the orphaned label
    #[default]
    KeepMappings,
    ClearMappings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMapper {
    metadata: CategoryMetadata,
    removal: LabelRemoval,
}

impl CategoryMapper {
    pub fn new(metadata: CategoryMetadata, removal: LabelRemoval) -> Self {
        Self { metadata, removal }
    }

    pub fn metadata(&self) -> &CategoryMetadata {
        &self.metadata
    }

    /// Map a narration to a label, registering the label as an option.
    pub fn assign(&mut self, narration: &str, label: &str) -> Result<()> {
        let key = narration.trim();
        let label = label.trim();
        if key.is_empty() {
            return Err(Error::Validation("narration is required".to_string()));
        }
        if label.is_empty() {
            return Err(Error::Validation("category label is required".to_string()));
        }
        self.metadata.options.insert(label.to_string());
        self.metadata.mappings.insert(key.to_string(), label.to_string());
        Ok(())
    }

    /// Returns false when the label already existed.
    pub fn add_option(&mut self, label: &str) -> Result<bool> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::Validation("category label is required".to_string()));
        }
        Ok(self.metadata.options.insert(label.to_string()))
    }

    /// Returns false when the label was not an option.
    pub fn remove_option(&mut self, label: &str) -> bool {
        let label = label.trim();
        let removed = self.metadata.options.remove(label);
        if self.removal == LabelRemoval::ClearMappings {
            self.metadata.mappings.retain(|_, mapped| mapped != label);
        }
        removed
    }
}

/// Mapper backed by the blob store: mutate locally first, then persist.
///
/// A failed save is returned to the caller but the local change is kept.
pub struct CategorySession {
    store: Arc<dyn BlobStore>,
    mapper: CategoryMapper,
}

impl CategorySession {
    /// Missing metadata document loads as empty.
    pub async fn load(store: Arc<dyn BlobStore>, removal: LabelRemoval) -> Result<Self> {
        let metadata = match store.download(METADATA_DOCUMENT).await {
            Ok(bytes) => CategoryMetadata::from_json(&bytes)?,
            Err(e) if e.is_not_found() => CategoryMetadata::default(),
            Err(e) => return Err(e),
        };
        Ok(Self { store, mapper: CategoryMapper::new(metadata, removal) })
    }

    pub fn metadata(&self) -> &CategoryMetadata {
        self.mapper.metadata()
    }

    pub async fn assign(&mut self, narration: &str, label: &str) -> Result<()> {
        self.mapper.assign(narration, label)?;
        self.persist().await
    }

    pub async fn add_option(&mut self, label: &str) -> Result<bool> {
        let added = self.mapper.add_option(label)?;
        self.persist().await?;
        Ok(added)
    }

    pub async fn remove_option(&mut self, label: &str) -> Result<bool> {
        let removed = self.mapper.remove_option(label);
        self.persist().await?;
        Ok(removed)
    }

    async fn persist(&self) -> Result<()> {
        let bytes = self.mapper.metadata().to_json()?;
        match self.store.upload(METADATA_DOCUMENT, bytes, true).await {
            Ok(()) => {
                info!(
                    options = self.metadata().options.len(),
                    mappings = self.metadata().mappings.len(),
                    "saved category metadata"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to save category metadata; local changes kept");
                Err(e)
            }
        }
    }
}
