// model-lifecycle-rs/src/promotion.rs
// Promotion decisions and unpromoted-artifact cleanup.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ModelMetrics;
use crate::registry::{ArtifactStore, ArtifactStoreError, ModelCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromotionDecision {
    pub promote: bool,
    pub accuracy_improvement: f64,
}

/// Live-pointer change applied by a promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionTransition {
    pub from: Option<String>,
    pub to: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PromotionPolicy {
    threshold: f64,
}

impl PromotionPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Promote iff the accuracy gain is strictly above the threshold.
    pub fn decide(&self, before: &ModelMetrics, after: &ModelMetrics) -> PromotionDecision {
        let accuracy_improvement = after.accuracy - before.accuracy;
        PromotionDecision {
            promote: accuracy_improvement > self.threshold,
            accuracy_improvement,
        }
    }

    /// Flag the artifact as promoted, then move the live pointer.
    ///
    /// The pointer is left untouched if the artifact cannot be flagged.
    pub async fn apply(
        &self,
        catalog: &ModelCatalog,
        artifacts: &(dyn ArtifactStore + Send + Sync),
        model_type: &str,
        version: &str,
        after: ModelMetrics,
    ) -> Result<PromotionTransition, ArtifactStoreError> {
        artifacts.mark_promoted(model_type, version).await?;
        let from = catalog.promote(model_type, version, after);

        tracing::info!(
            model_type,
            from = from.as_deref().unwrap_or("none"),
            to = version,
            accuracy = after.accuracy,
            "model promoted to production"
        );
        metrics::increment_counter!("model_lifecycle_promotions_total", "model_type" => model_type.to_string());

        Ok(PromotionTransition {
            from,
            to: version.to_string(),
        })
    }
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self::new(0.10)
    }
}

/// Delete artifacts older than `retention_days` that were never promoted
/// and are not live. Returns the number of versions removed.
pub async fn cleanup_unpromoted(
    catalog: &ModelCatalog,
    artifacts: &(dyn ArtifactStore + Send + Sync),
    model_types: &[String],
    retention_days: i64,
    now: DateTime<Utc>,
) -> Result<usize, ArtifactStoreError> {
    let cutoff = now - Duration::days(retention_days);
    let mut removed = 0;

    for model_type in model_types {
        let live = catalog.get(model_type).map(|r| r.current_production_version);
        let stored = artifacts.load_metadata(model_type).await?;

        for meta in stored.versions {
            let is_live = live.as_deref() == Some(meta.version.as_str());
            if meta.promoted || is_live || meta.created_at >= cutoff {
                continue;
            }
            artifacts.delete(model_type, &meta.version).await?;
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::info!(removed, retention_days, "unpromoted artifacts cleaned up");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FileArtifactStore;

    fn acc(accuracy: f64) -> ModelMetrics {
        ModelMetrics {
            accuracy,
            ..ModelMetrics::default()
        }
    }

    #[test]
    fn promotes_only_above_threshold() {
        let policy = PromotionPolicy::default();

        let d = policy.decide(&acc(0.75), &acc(0.90));
        assert!(d.promote);
        assert!((d.accuracy_improvement - 0.15).abs() < 1e-9);

        assert!(!policy.decide(&acc(0.80), &acc(0.85)).promote);
        assert!(!policy.decide(&acc(0.90), &acc(0.70)).promote);

        // Exactly at the threshold is not enough.
        let half = PromotionPolicy::new(0.5);
        assert!(!half.decide(&acc(0.25), &acc(0.75)).promote);
        assert!(half.decide(&acc(0.25), &acc(0.875)).promote);
    }

    #[tokio::test]
    async fn apply_updates_catalog_and_artifact_metadata() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FileArtifactStore::new(tmp.path()).expect("store");
        let catalog = ModelCatalog::with_model_types(&["nlp"]);
        store.save("nlp", "v2", b"x", Some(acc(0.9))).await.expect("save");

        let t = PromotionPolicy::default()
            .apply(&catalog, &store, "nlp", "v2", acc(0.9))
            .await
            .expect("apply");
        assert_eq!(t.from.as_deref(), Some("v1"));
        assert_eq!(t.to, "v2");

        let record = catalog.get("nlp").expect("record");
        assert_eq!(record.current_production_version, "v2");
        assert_eq!(record.performance_metrics.map(|m| m.accuracy), Some(0.9));
        assert!(store.load_metadata("nlp").await.expect("meta").versions[0].promoted);
    }

    #[tokio::test]
    async fn apply_leaves_pointer_when_artifact_missing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FileArtifactStore::new(tmp.path()).expect("store");
        let catalog = ModelCatalog::with_model_types(&["nlp"]);

        let res = PromotionPolicy::default()
            .apply(&catalog, &store, "nlp", "v7", acc(0.9))
            .await;
        assert!(res.is_err());
        assert_eq!(catalog.get("nlp").unwrap().current_production_version, "v1");
    }

    #[tokio::test]
    async fn cleanup_keeps_promoted_live_and_recent_versions() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = FileArtifactStore::new(tmp.path()).expect("store");
        let catalog = ModelCatalog::with_model_types(&["nlp"]);

        for v in ["v2", "v3", "v4"] {
            store.save("nlp", v, b"x", None).await.expect("save");
        }
        store.mark_promoted("nlp", "v2").await.expect("promote");
        catalog.promote("nlp", "v3", acc(0.8));

        let types = vec!["nlp".to_string()];
        // Everything is recent relative to now.
        let removed = cleanup_unpromoted(&catalog, &store, &types, 30, Utc::now())
            .await
            .expect("cleanup");
        assert_eq!(removed, 0);

        // Forty days later only v4 is eligible.
        let later = Utc::now() + Duration::days(40);
        let removed = cleanup_unpromoted(&catalog, &store, &types, 30, later)
            .await
            .expect("cleanup");
        assert_eq!(removed, 1);

        let left: Vec<String> = store
            .load_metadata("nlp")
            .await
            .expect("meta")
            .versions
            .into_iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(left, vec!["v2", "v3"]);
    }
}
