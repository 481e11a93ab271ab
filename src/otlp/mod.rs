//! OTLP ingress: protobuf decoding and the gRPC/HTTP receivers

pub mod decoder;
pub mod grpc;
pub mod http;

use metrics::counter;

use crate::models::{LogRecord, Metric, Span};
use crate::monitoring::names;
use crate::pipeline::SignalQueue;

/// Producer handles for the three signal queues, shared by both
/// receivers
#[derive(Clone)]
pub struct IngestQueues {
    /// Span queue producer
    pub spans: SignalQueue<Span>,
    /// Metric queue producer
    pub metrics: SignalQueue<Metric>,
    /// Log queue producer
    pub logs: SignalQueue<LogRecord>,
}

impl IngestQueues {
    /// Enqueue decoded spans, counting accepted records per service
    pub async fn ingest_spans(&self, spans: Vec<Span>) {
        for span in spans {
            let service = span.service_name.clone();
            if self.spans.enqueue(span).await {
                counter!(names::RECEIVED_SPANS, "service" => service).increment(1);
            }
        }
    }

    /// Enqueue decoded metrics, counting accepted records per service
    pub async fn ingest_metrics(&self, metrics: Vec<Metric>) {
        for metric in metrics {
            let service = metric.service_name.clone();
            if self.metrics.enqueue(metric).await {
                counter!(names::RECEIVED_METRICS, "service" => service).increment(1);
            }
        }
    }

    /// Enqueue decoded logs, counting accepted records per service
    pub async fn ingest_logs(&self, logs: Vec<LogRecord>) {
        for log in logs {
            let service = log.service_name.clone();
            if self.logs.enqueue(log).await {
                counter!(names::RECEIVED_LOGS, "service" => service).increment(1);
            }
        }
    }
}
