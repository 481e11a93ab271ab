//! Ingest flow tests: decoded records land on the signal queues

use std::time::Duration;

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1 as tracepb;

use otelhouse::otlp::{decoder, IngestQueues};
use otelhouse::pipeline::signal_queue;

fn sample_trace_request() -> ExportTraceServiceRequest {
    let start: u64 = 1_700_000_000_000_000_000;
    ExportTraceServiceRequest {
        resource_spans: vec![tracepb::ResourceSpans {
            resource: Some(Resource {
                attributes: vec![KeyValue {
                    key: "service.name".to_string(),
                    value: Some(AnyValue {
                        value: Some(any_value::Value::StringValue("test-service".to_string())),
                    }),
                }],
                dropped_attributes_count: 0,
            }),
            scope_spans: vec![tracepb::ScopeSpans {
                scope: None,
                spans: vec![tracepb::Span {
                    trace_id: (1u8..=16).collect(),
                    span_id: (1u8..=8).collect(),
                    name: "GET /api/users".to_string(),
                    kind: 2,
                    start_time_unix_nano: start,
                    end_time_unix_nano: start + 100_000_000,
                    status: Some(tracepb::Status {
                        code: 1,
                        message: String::new(),
                    }),
                    ..Default::default()
                }],
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        }],
    }
}

#[tokio::test]
async fn exported_span_reaches_the_queue_promptly() {
    let (span_tx, span_rx) = signal_queue("spans", 16);
    let (metric_tx, _metric_rx) = signal_queue("metrics", 16);
    let (log_tx, _log_rx) = signal_queue("logs", 16);
    let queues = IngestQueues {
        spans: span_tx,
        metrics: metric_tx,
        logs: log_tx,
    };

    let spans = decoder::decode_spans(&sample_trace_request());
    queues.ingest_spans(spans).await;

    let span = tokio::time::timeout(Duration::from_millis(100), span_rx.recv())
        .await
        .expect("span arrives within the hand-off window")
        .expect("queue is open");

    assert_eq!(span.trace_id, "0102030405060708090a0b0c0d0e0f10");
    assert_eq!(span.span_name, "GET /api/users");
    assert_eq!(span.duration_ns, 100_000_000);
    assert_eq!(span.status_code.as_str(), "ok");
    assert_eq!(span.service_name, "test-service");
}

#[tokio::test]
async fn queue_drops_never_fail_the_ingest_call() {
    let (span_tx, _span_rx) = signal_queue("spans", 1);
    let (metric_tx, _metric_rx) = signal_queue("metrics", 1);
    let (log_tx, _log_rx) = signal_queue("logs", 1);
    let queues = IngestQueues {
        spans: span_tx,
        metrics: metric_tx,
        logs: log_tx,
    };

    // Two spans into a capacity-1 queue with no consumer: the second
    // drops after the bounded wait, and the call still returns
    let mut req = sample_trace_request();
    let span = req.resource_spans[0].scope_spans[0].spans[0].clone();
    req.resource_spans[0].scope_spans[0].spans.push(tracepb::Span {
        span_id: vec![9; 8],
        ..span
    });

    let spans = decoder::decode_spans(&req);
    assert_eq!(spans.len(), 2);
    queues.ingest_spans(spans).await;
}
