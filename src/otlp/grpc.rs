//! OTLP/gRPC receivers
//!
//! Implements the three standard OTLP collector services using tonic.
//! An export request is decoded, enqueued, and acknowledged with an
//! empty response; queue drops never fail the RPC.

use std::net::SocketAddr;

use opentelemetry_proto::tonic::collector::logs::v1::{
    logs_service_server::{LogsService, LogsServiceServer},
    ExportLogsServiceRequest, ExportLogsServiceResponse,
};
use opentelemetry_proto::tonic::collector::metrics::v1::{
    metrics_service_server::{MetricsService, MetricsServiceServer},
    ExportMetricsServiceRequest, ExportMetricsServiceResponse,
};
use opentelemetry_proto::tonic::collector::trace::v1::{
    trace_service_server::{TraceService, TraceServiceServer},
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::info;

use crate::error::ServerError;
use crate::otlp::{decoder, IngestQueues};

/// Trace service implementation
#[derive(Clone)]
pub struct TraceIngest {
    queues: IngestQueues,
}

impl TraceIngest {
    /// Create a trace service over the shared queues
    pub fn new(queues: IngestQueues) -> Self {
        Self { queues }
    }
}

#[tonic::async_trait]
impl TraceService for TraceIngest {
    async fn export(
        &self,
        request: Request<ExportTraceServiceRequest>,
    ) -> Result<Response<ExportTraceServiceResponse>, Status> {
        let req = request.into_inner();
        let spans = decoder::decode_spans(&req);
        self.queues.ingest_spans(spans).await;
        Ok(Response::new(ExportTraceServiceResponse {
            partial_success: None,
        }))
    }
}

/// Metrics service implementation
#[derive(Clone)]
pub struct MetricsIngest {
    queues: IngestQueues,
}

impl MetricsIngest {
    /// Create a metrics service over the shared queues
    pub fn new(queues: IngestQueues) -> Self {
        Self { queues }
    }
}

#[tonic::async_trait]
impl MetricsService for MetricsIngest {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> Result<Response<ExportMetricsServiceResponse>, Status> {
        let req = request.into_inner();
        let metrics = decoder::decode_metrics(&req);
        self.queues.ingest_metrics(metrics).await;
        Ok(Response::new(ExportMetricsServiceResponse {
            partial_success: None,
        }))
    }
}

/// Logs service implementation
#[derive(Clone)]
pub struct LogsIngest {
    queues: IngestQueues,
}

impl LogsIngest {
    /// Create a logs service over the shared queues
    pub fn new(queues: IngestQueues) -> Self {
        Self { queues }
    }
}

#[tonic::async_trait]
impl LogsService for LogsIngest {
    async fn export(
        &self,
        request: Request<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        let req = request.into_inner();
        let logs = decoder::decode_logs(&req);
        self.queues.ingest_logs(logs).await;
        Ok(Response::new(ExportLogsServiceResponse {
            partial_success: None,
        }))
    }
}

/// Serve the three OTLP collector services until the token fires
pub async fn serve(
    addr: SocketAddr,
    queues: IngestQueues,
    max_msg_bytes: usize,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    info!(%addr, "starting OTLP gRPC receiver");

    Server::builder()
        .add_service(
            TraceServiceServer::new(TraceIngest {
                queues: queues.clone(),
            })
            .max_decoding_message_size(max_msg_bytes),
        )
        .add_service(
            MetricsServiceServer::new(MetricsIngest {
                queues: queues.clone(),
            })
            .max_decoding_message_size(max_msg_bytes),
        )
        .add_service(
            LogsServiceServer::new(LogsIngest { queues }).max_decoding_message_size(max_msg_bytes),
        )
        .serve_with_shutdown(addr, shutdown.cancelled_owned())
        .await
        .map_err(|e| ServerError::StartupError(e.to_string()))
}
