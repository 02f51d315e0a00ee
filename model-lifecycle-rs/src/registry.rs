// model-lifecycle-rs/src/registry.rs
// Model artifacts and the live production pointer.
//
// Layout on disk: `{root}/{model_type}/{version}/model.bin` plus a
// `metadata.json` next to it. Version directories are created exclusively,
// so an existing version is never overwritten.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::model::{format_version, version_number, ModelMetrics, ModelRecord};

const ARTIFACT_FILE: &str = "model.bin";
const METADATA_FILE: &str = "metadata.json";

/// Metadata stored next to each artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub model_type: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub metrics: Option<ModelMetrics>,
    pub promoted: bool,
    pub promoted_at: Option<DateTime<Utc>>,
}

/// All stored versions of one model type, ordered by version number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryMetadata {
    pub model_type: String,
    pub versions: Vec<ArtifactMetadata>,
    /// Every claimed version name, including directories whose metadata
    /// could not be read.
    #[serde(default)]
    pub claimed: Vec<String>,
}

impl RegistryMetadata {
    pub fn latest_version_number(&self) -> u64 {
        self.versions
            .iter()
            .map(|v| v.version.as_str())
            .chain(self.claimed.iter().map(String::as_str))
            .filter_map(version_number)
            .max()
            .unwrap_or(0)
    }

    /// The most recently promoted version.
    pub fn live_version(&self) -> Option<&ArtifactMetadata> {
        self.versions
            .iter()
            .filter(|v| v.promoted)
            .max_by_key(|v| (v.promoted_at, version_number(&v.version)))
    }
}

/// Artifact store error type.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("version {version} of {model_type} already exists")]
    VersionExists { model_type: String, version: String },

    #[error("version {version} of {model_type} not found")]
    NotFound { model_type: String, version: String },

    #[error("invalid path component: {0:?}")]
    InvalidName(String),
}

#[async_trait]
pub trait ArtifactStore {
    /// Persist a new version; fails if the version already exists.
    async fn save(
        &self,
        model_type: &str,
        version: &str,
        artifact: &[u8],
        metrics: Option<ModelMetrics>,
    ) -> Result<PathBuf, ArtifactStoreError>;

    async fn load_metadata(&self, model_type: &str) -> Result<RegistryMetadata, ArtifactStoreError>;

    async fn mark_promoted(&self, model_type: &str, version: &str) -> Result<(), ArtifactStoreError>;

    async fn delete(&self, model_type: &str, version: &str) -> Result<(), ArtifactStoreError>;
}

/// Filesystem artifact store.
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ArtifactStoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, model_type: &str, version: &str) -> Result<PathBuf, ArtifactStoreError> {
        Ok(self
            .root
            .join(checked_component(model_type)?)
            .join(checked_component(version)?))
    }

    async fn read_metadata(path: &Path) -> Result<ArtifactMetadata, ArtifactStoreError> {
        let raw = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn fill_version_dir(
        dir: &Path,
        artifact: &[u8],
        meta: &ArtifactMetadata,
    ) -> Result<PathBuf, ArtifactStoreError> {
        let artifact_path = dir.join(ARTIFACT_FILE);
        fs::write(&artifact_path, artifact).await?;
        Self::write_metadata(dir, meta).await?;
        Ok(artifact_path)
    }

    async fn write_metadata(dir: &Path, meta: &ArtifactMetadata) -> Result<(), ArtifactStoreError> {
        let tmp = dir.join(format!("{METADATA_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(meta)?).await?;
        fs::rename(&tmp, dir.join(METADATA_FILE)).await?;
        Ok(())
    }
}

fn checked_component(name: &str) -> Result<&str, ArtifactStoreError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(ArtifactStoreError::InvalidName(name.to_string()));
    }
    Ok(name)
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn save(
        &self,
        model_type: &str,
        version: &str,
        artifact: &[u8],
        metrics: Option<ModelMetrics>,
    ) -> Result<PathBuf, ArtifactStoreError> {
        let dir = self.version_dir(model_type, version)?;
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Exclusive create: the directory is the version's claim.
        match fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ArtifactStoreError::VersionExists {
                    model_type: model_type.to_string(),
                    version: version.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let meta = ArtifactMetadata {
            model_type: model_type.to_string(),
            version: version.to_string(),
            created_at: Utc::now(),
            size_bytes: artifact.len() as u64,
            metrics,
            promoted: false,
            promoted_at: None,
        };
        match Self::fill_version_dir(&dir, artifact, &meta).await {
            Ok(artifact_path) => {
                tracing::info!(model_type, version, path = %dir.display(), "model artifact saved");
                Ok(artifact_path)
            }
            Err(err) => {
                // Release the claim so the version can be written again.
                if let Err(cleanup) = fs::remove_dir_all(&dir).await {
                    tracing::warn!(
                        error = %cleanup,
                        path = %dir.display(),
                        "failed to remove partial artifact directory"
                    );
                }
                Err(err)
            }
        }
    }

    async fn load_metadata(&self, model_type: &str) -> Result<RegistryMetadata, ArtifactStoreError> {
        let type_dir = self.root.join(checked_component(model_type)?);
        let mut versions = Vec::new();
        let mut claimed = Vec::new();

        if type_dir.exists() {
            let mut entries = fs::read_dir(&type_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    claimed.push(name.to_string());
                }
                match Self::read_metadata(&entry.path().join(METADATA_FILE)).await {
                    Ok(meta) => versions.push(meta),
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            path = %entry.path().display(),
                            "unreadable artifact metadata; skipping"
                        );
                    }
                }
            }
        }

        versions.sort_by_key(|m| version_number(&m.version).unwrap_or(0));
        claimed.sort_by_key(|v| version_number(v).unwrap_or(0));
        Ok(RegistryMetadata {
            model_type: model_type.to_string(),
            versions,
            claimed,
        })
    }

    async fn mark_promoted(&self, model_type: &str, version: &str) -> Result<(), ArtifactStoreError> {
        let dir = self.version_dir(model_type, version)?;
        let path = dir.join(METADATA_FILE);
        if !path.exists() {
            return Err(ArtifactStoreError::NotFound {
                model_type: model_type.to_string(),
                version: version.to_string(),
            });
        }

        let mut meta = Self::read_metadata(&path).await?;
        meta.promoted = true;
        meta.promoted_at = Some(Utc::now());
        Self::write_metadata(&dir, &meta).await
    }

    async fn delete(&self, model_type: &str, version: &str) -> Result<(), ArtifactStoreError> {
        let dir = self.version_dir(model_type, version)?;
        if !dir.exists() {
            return Err(ArtifactStoreError::NotFound {
                model_type: model_type.to_string(),
                version: version.to_string(),
            });
        }
        fs::remove_dir_all(&dir).await?;
        tracing::info!(model_type, version, "model artifact deleted");
        Ok(())
    }
}

/// Default model names for the platform's model types.
fn default_model_name(model_type: &str) -> &str {
    match model_type {
        "nlp" => "t5-small",
        "translation" => "google/mt5-small",
        other => other,
    }
}

/// In-process map of model type to its live record.
///
/// Each update happens under the write lock, so a promotion for one model
/// type is atomic with respect to readers and other promotions.
#[derive(Default)]
pub struct ModelCatalog {
    records: RwLock<HashMap<String, ModelRecord>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with one `v1` record per model type.
    pub fn with_model_types<S: AsRef<str>>(model_types: &[S]) -> Self {
        let catalog = Self::new();
        for mt in model_types {
            let mt = mt.as_ref();
            catalog.register(ModelRecord::new(mt, default_model_name(mt)));
        }
        catalog
    }

    /// Insert or replace a record.
    pub fn register(&self, record: ModelRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.model_type.clone(), record);
    }

    pub fn get(&self, model_type: &str) -> Option<ModelRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_type)
            .cloned()
    }

    pub fn model_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    pub fn all(&self) -> Vec<ModelRecord> {
        let mut records: Vec<ModelRecord> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.model_type.cmp(&b.model_type));
        records
    }

    /// Point `model_type` at `version`; returns the previous version.
    ///
    /// Unknown model types are registered on first promotion.
    pub fn promote(&self, model_type: &str, version: &str, metrics: ModelMetrics) -> Option<String> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .entry(model_type.to_string())
            .or_insert_with(|| ModelRecord::new(model_type, default_model_name(model_type)));

        let previous = std::mem::replace(&mut record.current_production_version, version.to_string());
        record.performance_metrics = Some(metrics);
        record.updated_at = Utc::now();
        Some(previous)
    }

    /// Point `model_type` at the most recently promoted stored version.
    /// Returns the restored version, or `None` when nothing was promoted.
    pub fn restore(&self, stored: &RegistryMetadata) -> Option<String> {
        let live = stored.live_version()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .entry(stored.model_type.clone())
            .or_insert_with(|| ModelRecord::new(&stored.model_type, default_model_name(&stored.model_type)));

        record.current_production_version = live.version.clone();
        record.performance_metrics = live.metrics;
        record.updated_at = live.promoted_at.unwrap_or(live.created_at);
        Some(live.version.clone())
    }

    /// Next free version identifier given what is live and what is stored.
    pub fn next_version(&self, model_type: &str, stored: &RegistryMetadata) -> String {
        let live = self
            .get(model_type)
            .and_then(|r| version_number(&r.current_production_version))
            .unwrap_or(0);
        format_version(live.max(stored.latest_version_number()) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn metrics(accuracy: f64) -> ModelMetrics {
        ModelMetrics {
            accuracy,
            ..ModelMetrics::default()
        }
    }

    #[tokio::test]
    async fn save_never_overwrites_existing_version() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FileArtifactStore::new(tmp.path()).expect("store");

        let path = assert_ok!(store.save("nlp", "v2", b"weights", Some(metrics(0.9))).await);
        assert!(path.ends_with("nlp/v2/model.bin"));

        let err = store
            .save("nlp", "v2", b"other", None)
            .await
            .expect_err("duplicate version");
        assert!(matches!(err, ArtifactStoreError::VersionExists { .. }));
        assert_eq!(std::fs::read(&path).expect("read"), b"weights");
    }

    #[tokio::test]
    async fn metadata_is_sorted_and_promotion_is_recorded() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FileArtifactStore::new(tmp.path()).expect("store");

        for v in ["v10", "v2", "v3"] {
            assert_ok!(store.save("nlp", v, b"x", None).await);
        }
        assert_ok!(store.mark_promoted("nlp", "v3").await);

        let meta = assert_ok!(store.load_metadata("nlp").await);
        let versions: Vec<&str> = meta.versions.iter().map(|m| m.version.as_str()).collect();
        assert_eq!(versions, vec!["v2", "v3", "v10"]);
        assert_eq!(meta.latest_version_number(), 10);
        assert!(meta.versions[1].promoted);
        assert!(!meta.versions[0].promoted);

        let empty = assert_ok!(store.load_metadata("translation").await);
        assert!(empty.versions.is_empty());
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FileArtifactStore::new(tmp.path()).expect("store");
        let err = store.save("../etc", "v1", b"x", None).await.expect_err("invalid");
        assert!(matches!(err, ArtifactStoreError::InvalidName(_)));
    }

    #[tokio::test]
    async fn delete_removes_version_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FileArtifactStore::new(tmp.path()).expect("store");
        assert_ok!(store.save("nlp", "v2", b"x", None).await);
        assert_ok!(store.delete("nlp", "v2").await);
        assert!(!tmp.path().join("nlp/v2").exists());
        assert!(matches!(
            store.delete("nlp", "v2").await,
            Err(ArtifactStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn directory_without_metadata_still_claims_its_version() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FileArtifactStore::new(tmp.path()).expect("store");
        std::fs::create_dir_all(tmp.path().join("nlp/v2")).expect("stray dir");

        let meta = assert_ok!(store.load_metadata("nlp").await);
        assert!(meta.versions.is_empty());
        assert_eq!(meta.claimed, vec!["v2"]);
        assert_eq!(meta.latest_version_number(), 2);

        let catalog = ModelCatalog::with_model_types(&["nlp"]);
        let next = catalog.next_version("nlp", &meta);
        assert_eq!(next, "v3");
        assert_ok!(store.save("nlp", &next, b"x", None).await);
    }

    #[tokio::test]
    async fn catalog_restores_latest_promoted_version() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FileArtifactStore::new(tmp.path()).expect("store");
        assert_ok!(store.save("nlp", "v2", b"x", Some(metrics(0.8))).await);
        assert_ok!(store.save("nlp", "v3", b"x", Some(metrics(0.85))).await);
        assert_ok!(store.save("nlp", "v4", b"x", Some(metrics(0.95))).await);
        assert_ok!(store.mark_promoted("nlp", "v2").await);
        assert_ok!(store.mark_promoted("nlp", "v3").await);

        let catalog = ModelCatalog::with_model_types(&["nlp", "translation"]);
        let meta = assert_ok!(store.load_metadata("nlp").await);
        assert_eq!(catalog.restore(&meta).as_deref(), Some("v3"));

        let nlp = catalog.get("nlp").expect("nlp");
        assert_eq!(nlp.current_production_version, "v3");
        assert_eq!(nlp.performance_metrics.map(|m| m.accuracy), Some(0.85));
        assert_eq!(catalog.next_version("nlp", &meta), "v5");

        let untouched = assert_ok!(store.load_metadata("translation").await);
        assert!(catalog.restore(&untouched).is_none());
        assert_eq!(catalog.get("translation").unwrap().current_production_version, "v1");
    }

    #[test]
    fn catalog_promotion_and_next_version() {
        let catalog = ModelCatalog::with_model_types(&["nlp", "translation"]);
        let nlp = catalog.get("nlp").expect("nlp record");
        assert_eq!(nlp.model_name, "t5-small");
        assert_eq!(nlp.current_production_version, "v1");

        let stored = RegistryMetadata::default();
        assert_eq!(catalog.next_version("nlp", &stored), "v2");

        let previous = catalog.promote("nlp", "v2", metrics(0.9));
        assert_eq!(previous.as_deref(), Some("v1"));
        assert_eq!(catalog.get("nlp").unwrap().current_production_version, "v2");
        assert_eq!(catalog.next_version("nlp", &stored), "v3");
        assert_eq!(catalog.next_version("unknown", &stored), "v1");
        assert_eq!(catalog.model_types(), vec!["nlp", "translation"]);
    }
}
