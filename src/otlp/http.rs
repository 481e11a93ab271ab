//! OTLP/HTTP receiver
//!
//! POST endpoints for the three signals with protobuf bodies. A
//! successful ingest answers 200 with an empty protobuf envelope; an
//! undecodable body answers 400.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use opentelemetry_proto::tonic::collector::logs::v1::{
    ExportLogsServiceRequest, ExportLogsServiceResponse,
};
use opentelemetry_proto::tonic::collector::metrics::v1::{
    ExportMetricsServiceRequest, ExportMetricsServiceResponse,
};
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use prost::Message;

use crate::otlp::{decoder, IngestQueues};

/// Build the OTLP/HTTP router
pub fn router(queues: IngestQueues, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/traces", post(ingest_traces))
        .route("/v1/metrics", post(ingest_metrics))
        .route("/v1/logs", post(ingest_logs))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(queues)
}

async fn ingest_traces(State(queues): State<IngestQueues>, body: Bytes) -> Response {
    let req = match ExportTraceServiceRequest::decode(body) {
        Ok(req) => req,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let spans = decoder::decode_spans(&req);
    queues.ingest_spans(spans).await;
    protobuf_response(ExportTraceServiceResponse::default().encode_to_vec())
}

async fn ingest_metrics(State(queues): State<IngestQueues>, body: Bytes) -> Response {
    let req = match ExportMetricsServiceRequest::decode(body) {
        Ok(req) => req,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let metrics = decoder::decode_metrics(&req);
    queues.ingest_metrics(metrics).await;
    protobuf_response(ExportMetricsServiceResponse::default().encode_to_vec())
}

async fn ingest_logs(State(queues): State<IngestQueues>, body: Bytes) -> Response {
    let req = match ExportLogsServiceRequest::decode(body) {
        Ok(req) => req,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let logs = decoder::decode_logs(&req);
    queues.ingest_logs(logs).await;
    protobuf_response(ExportLogsServiceResponse::default().encode_to_vec())
}

fn protobuf_response(payload: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/x-protobuf")],
        payload,
    )
        .into_response()
}
