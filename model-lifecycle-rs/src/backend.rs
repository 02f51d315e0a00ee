// model-lifecycle-rs/src/backend.rs
// Training backend abstraction.
//
// The orchestrator never trains anything itself. It hands prepared samples
// to a backend and scores the predictions the backend returns for the
// validation split. Timeouts are enforced by the caller (executor), not here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::TrainingSample;

/// Input to a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub model_type: String,
    /// Production version the new model is derived from.
    pub base_version: String,
    pub train: Vec<TrainingSample>,
    /// Inputs of the held-out split; the backend predicts a target for each.
    pub validation_inputs: Vec<String>,
    pub seed: u64,
}

/// Output of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Opaque serialized model.
    pub artifact: Vec<u8>,
    /// One prediction per validation input, in order.
    pub validation_predictions: Vec<String>,
}

/// Backend error type.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("backend returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("internal backend error: {0}")]
    Internal(String),
}

/// A loaded model that can score inputs.
#[async_trait]
pub trait ModelHandle {
    async fn predict(&self, inputs: &[String]) -> Result<Vec<String>, BackendError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrainingBackend {
    async fn train(&self, request: TrainingRequest) -> Result<TrainedModel, BackendError>;

    async fn load(
        &self,
        model_type: &str,
        version: &str,
    ) -> Result<Arc<dyn ModelHandle + Send + Sync>, BackendError>;
}

/// Training backend reached over HTTP.
///
/// Endpoints, relative to `base_url`:
/// - `POST /train` with a `TrainingRequest`, answering a `TrainedModel`
/// - `GET /models/{model_type}/{version}` to check that a version is loadable
/// - `POST /models/{model_type}/{version}/predict` with `{"inputs": [...]}`,
///   answering `{"predictions": [...]}`
pub struct HttpTrainingBackend {
    base_url: String,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    inputs: &'a [String],
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Vec<String>,
}

impl HttpTrainingBackend {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn model_url(&self, model_type: &str, version: &str) -> String {
        format!("{}/models/{}/{}", self.base_url, model_type, version)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Rejected { status, body })
}

#[async_trait]
impl TrainingBackend for HttpTrainingBackend {
    async fn train(&self, request: TrainingRequest) -> Result<TrainedModel, BackendError> {
        let response = self
            .http_client
            .post(format!("{}/train", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        check_status(response)
            .await?
            .json::<TrainedModel>()
            .await
            .map_err(|e| BackendError::Http(format!("invalid training response: {e}")))
    }

    async fn load(
        &self,
        model_type: &str,
        version: &str,
    ) -> Result<Arc<dyn ModelHandle + Send + Sync>, BackendError> {
        let url = self.model_url(model_type, version);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::ModelNotFound(format!("{model_type}/{version}")));
        }
        check_status(response).await?;

        Ok(Arc::new(HttpModelHandle {
            predict_url: format!("{url}/predict"),
            http_client: self.http_client.clone(),
        }))
    }
}

struct HttpModelHandle {
    predict_url: String,
    http_client: reqwest::Client,
}

#[async_trait]
impl ModelHandle for HttpModelHandle {
    async fn predict(&self, inputs: &[String]) -> Result<Vec<String>, BackendError> {
        let response = self
            .http_client
            .post(&self.predict_url)
            .json(&PredictRequest { inputs })
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let body = check_status(response)
            .await?
            .json::<PredictResponse>()
            .await
            .map_err(|e| BackendError::Http(format!("invalid predict response: {e}")))?;
        Ok(body.predictions)
    }
}
