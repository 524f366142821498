//! Endpoints and handlers shared by the integration flows.
//!
//! Modelled on a small avatar-control API: statistics, model loading and an
//! echo endpoint with a configurable delay for interleaving tests.

use rpc_bus::{CallFactory, ListenerRef, MessageBus};
use rpc_types::{api_endpoint, ApiError, Empty};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Application error id for an unknown model.
pub const MODEL_ID_INVALID: i32 = 153;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsResponse {
    pub uptime: u64,
    pub framerate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLoadRequest {
    #[serde(rename = "modelID")]
    pub model_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLoadResponse {
    #[serde(rename = "modelID")]
    pub model_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoRequest {
    pub seq: u64,
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub seq: u64,
}

api_endpoint!(pub Statistics, "Statistics", Empty => StatisticsResponse);
api_endpoint!(pub ModelLoad, "ModelLoad", ModelLoadRequest => ModelLoadResponse);
api_endpoint!(pub Echo, "Echo", EchoRequest => EchoResponse);
api_endpoint!(
    /// No server ever answers this one.
    pub Unanswered, "Unanswered", Empty => Empty
);

pub async fn statistics(_request: Empty) -> anyhow::Result<StatisticsResponse> {
    Ok(StatisticsResponse {
        uptime: 1234,
        framerate: 60,
    })
}

/// Empty ids are a structured failure, `"crash"` an unstructured one.
pub async fn load_model(request: ModelLoadRequest) -> anyhow::Result<ModelLoadResponse> {
    match request.model_id.as_str() {
        "" => Err(ApiError::application(MODEL_ID_INVALID, "Model ID invalid").into()),
        "crash" => anyhow::bail!("renderer crashed"),
        id => Ok(ModelLoadResponse {
            model_id: id.to_string(),
        }),
    }
}

pub async fn echo(request: EchoRequest) -> anyhow::Result<EchoResponse> {
    if request.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(request.delay_ms)).await;
    }
    Ok(EchoResponse { seq: request.seq })
}

/// Register every fixture handler on `bus`.
pub fn serve_all(bus: Arc<dyn MessageBus>) -> Vec<ListenerRef> {
    let factory = CallFactory::new(bus);
    vec![
        factory.serve::<Statistics, _, _>(statistics),
        factory.serve::<ModelLoad, _, _>(load_model),
        factory.serve::<Echo, _, _>(echo),
    ]
}
