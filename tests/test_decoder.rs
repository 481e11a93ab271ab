//! Decoder tests: OTLP protobuf envelopes into the normalized row model

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{
    any_value, AnyValue, InstrumentationScope, KeyValue, KeyValueList,
};
use opentelemetry_proto::tonic::logs::v1 as logspb;
use opentelemetry_proto::tonic::metrics::v1 as metricspb;
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1 as tracepb;

use otelhouse::otlp::decoder::{decode_logs, decode_metrics, decode_spans};

const START_NANOS: u64 = 1_700_000_000_000_000_000;

fn string_attr(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

fn int_attr(key: &str, value: i64) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::IntValue(value)),
        }),
    }
}

fn test_resource() -> Resource {
    Resource {
        attributes: vec![
            string_attr("service.name", "test-service"),
            string_attr("service.namespace", "testing"),
            string_attr("service.instance.id", "instance-1"),
            string_attr("deployment.environment", "staging"),
            string_attr("host.name", "node-7"),
        ],
        dropped_attributes_count: 0,
    }
}

fn test_scope() -> InstrumentationScope {
    InstrumentationScope {
        name: "test-scope".to_string(),
        version: "1.0.0".to_string(),
        attributes: vec![],
        dropped_attributes_count: 0,
    }
}

fn test_span() -> tracepb::Span {
    tracepb::Span {
        trace_id: (1u8..=16).collect(),
        span_id: (1u8..=8).collect(),
        parent_span_id: vec![],
        name: "GET /api/users".to_string(),
        kind: 2,
        start_time_unix_nano: START_NANOS,
        end_time_unix_nano: START_NANOS + 100_000_000,
        attributes: vec![string_attr("http.method", "GET")],
        status: Some(tracepb::Status {
            code: 1,
            message: String::new(),
        }),
        ..Default::default()
    }
}

fn trace_request(spans: Vec<tracepb::Span>) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![tracepb::ResourceSpans {
            resource: Some(test_resource()),
            scope_spans: vec![tracepb::ScopeSpans {
                scope: Some(test_scope()),
                spans,
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        }],
    }
}

#[test]
fn span_round_trip_preserves_ids_duration_and_status() {
    let spans = decode_spans(&trace_request(vec![test_span()]));
    assert_eq!(spans.len(), 1, "one valid span decodes to one record");

    let span = &spans[0];
    assert_eq!(span.trace_id, "0102030405060708090a0b0c0d0e0f10");
    assert_eq!(span.span_id, "0102030405060708");
    assert_eq!(span.parent_span_id, "");
    assert_eq!(span.span_name, "GET /api/users");
    assert_eq!(span.span_kind.as_str(), "server");
    assert_eq!(span.duration_ns, 100_000_000);
    assert_eq!(span.status_code.as_str(), "ok");
    assert_eq!(span.end_time - span.start_time, chrono::Duration::milliseconds(100));
    assert_eq!(span.trace_id.len(), 32);
    assert_eq!(span.span_id.len(), 16);
}

#[test]
fn decoder_extracts_service_identity_and_scope() {
    let spans = decode_spans(&trace_request(vec![test_span()]));
    let span = &spans[0];
    assert_eq!(span.service_name, "test-service");
    assert_eq!(span.service_namespace, "testing");
    assert_eq!(span.service_instance_id, "instance-1");
    assert_eq!(span.deployment_environment, "staging");
    assert_eq!(span.instrumentation_scope_name, "test-scope");
    assert_eq!(span.instrumentation_scope_version, "1.0.0");
    assert_eq!(span.attributes["http.method"], "GET");
    assert_eq!(span.resource_attributes["host.name"], "node-7");
}

#[test]
fn missing_resource_yields_empty_identity() {
    let req = ExportTraceServiceRequest {
        resource_spans: vec![tracepb::ResourceSpans {
            resource: None,
            scope_spans: vec![tracepb::ScopeSpans {
                scope: None,
                spans: vec![test_span()],
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        }],
    };
    let spans = decode_spans(&req);
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].service_name, "");
    assert_eq!(spans[0].instrumentation_scope_name, "");
}

#[test]
fn every_valid_span_is_decoded_exactly_once() {
    let mut spans = Vec::new();
    for i in 0..5u8 {
        let mut span = test_span();
        span.span_id = vec![i + 1; 8];
        span.name = format!("op-{i}");
        spans.push(span);
    }
    let decoded = decode_spans(&trace_request(spans));
    assert_eq!(decoded.len(), 5);
    let names: Vec<_> = decoded.iter().map(|s| s.span_name.as_str()).collect();
    assert_eq!(names, ["op-0", "op-1", "op-2", "op-3", "op-4"]);
}

#[test]
fn malformed_spans_are_skipped_without_failing_the_envelope() {
    let mut short_trace_id = test_span();
    short_trace_id.trace_id = vec![1, 2, 3];

    let mut negative_duration = test_span();
    negative_duration.end_time_unix_nano = START_NANOS - 1;

    let mut bad_parent = test_span();
    bad_parent.parent_span_id = vec![1, 2, 3];

    let decoded = decode_spans(&trace_request(vec![
        short_trace_id,
        test_span(),
        negative_duration,
        bad_parent,
    ]));
    assert_eq!(decoded.len(), 1, "only the valid span survives");
}

#[test]
fn span_events_and_links_keep_their_order() {
    let mut span = test_span();
    span.events = vec![
        tracepb::span::Event {
            time_unix_nano: START_NANOS + 1,
            name: "first".to_string(),
            attributes: vec![int_attr("attempt", 1)],
            dropped_attributes_count: 0,
        },
        tracepb::span::Event {
            time_unix_nano: START_NANOS + 2,
            name: "second".to_string(),
            attributes: vec![],
            dropped_attributes_count: 0,
        },
    ];
    span.links = vec![tracepb::span::Link {
        trace_id: vec![0xff; 16],
        span_id: vec![0xee; 8],
        trace_state: "vendor=1".to_string(),
        attributes: vec![],
        dropped_attributes_count: 0,
        flags: 0,
    }];

    let decoded = decode_spans(&trace_request(vec![span]));
    let span = &decoded[0];
    assert_eq!(span.events.len(), 2);
    assert_eq!(span.events[0].name, "first");
    assert_eq!(span.events[0].attributes["attempt"], "1");
    assert_eq!(span.events[1].name, "second");
    assert_eq!(span.links[0].trace_id, "ff".repeat(16));
    assert_eq!(span.links[0].span_id, "ee".repeat(8));
    assert_eq!(span.links[0].trace_state, "vendor=1");
}

fn metrics_request(metrics: Vec<metricspb::Metric>) -> ExportMetricsServiceRequest {
    ExportMetricsServiceRequest {
        resource_metrics: vec![metricspb::ResourceMetrics {
            resource: Some(test_resource()),
            scope_metrics: vec![metricspb::ScopeMetrics {
                scope: Some(test_scope()),
                metrics,
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        }],
    }
}

fn number_point(value: metricspb::number_data_point::Value) -> metricspb::NumberDataPoint {
    metricspb::NumberDataPoint {
        time_unix_nano: START_NANOS,
        value: Some(value),
        ..Default::default()
    }
}

#[test]
fn gauge_and_sum_points_become_typed_rows() {
    let gauge = metricspb::Metric {
        name: "process.cpu.usage".to_string(),
        data: Some(metricspb::metric::Data::Gauge(metricspb::Gauge {
            data_points: vec![number_point(metricspb::number_data_point::Value::AsDouble(0.25))],
        })),
        ..Default::default()
    };
    let sum = metricspb::Metric {
        name: "http.requests".to_string(),
        data: Some(metricspb::metric::Data::Sum(metricspb::Sum {
            data_points: vec![number_point(metricspb::number_data_point::Value::AsInt(7))],
            aggregation_temporality: 2,
            is_monotonic: true,
        })),
        ..Default::default()
    };

    let decoded = decode_metrics(&metrics_request(vec![gauge, sum]));
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].metric_type.as_str(), "gauge");
    assert_eq!(decoded[0].value, 0.25);
    assert_eq!(decoded[1].metric_type.as_str(), "counter");
    assert_eq!(decoded[1].value, 7.0);
    assert_eq!(decoded[1].service_name, "test-service");
}

#[test]
fn histogram_points_honor_the_bucket_bound_invariant() {
    let valid = metricspb::HistogramDataPoint {
        time_unix_nano: START_NANOS,
        count: 8,
        sum: Some(12.5),
        bucket_counts: vec![1, 5, 2],
        explicit_bounds: vec![0.1, 1.0],
        ..Default::default()
    };
    let mismatched = metricspb::HistogramDataPoint {
        time_unix_nano: START_NANOS,
        count: 3,
        sum: Some(1.0),
        bucket_counts: vec![1, 2],
        explicit_bounds: vec![0.1, 1.0],
        ..Default::default()
    };
    let histogram = metricspb::Metric {
        name: "http.server.duration".to_string(),
        data: Some(metricspb::metric::Data::Histogram(metricspb::Histogram {
            data_points: vec![valid, mismatched],
            aggregation_temporality: 2,
        })),
        ..Default::default()
    };

    let decoded = decode_metrics(&metrics_request(vec![histogram]));
    assert_eq!(decoded.len(), 1, "the mismatched point is skipped");
    let metric = &decoded[0];
    assert_eq!(metric.metric_type.as_str(), "histogram");
    assert_eq!(metric.value, 12.5);
    assert_eq!(metric.bucket_counts.len(), metric.explicit_bounds.len() + 1);
}

fn logs_request(records: Vec<logspb::LogRecord>) -> ExportLogsServiceRequest {
    ExportLogsServiceRequest {
        resource_logs: vec![logspb::ResourceLogs {
            resource: Some(test_resource()),
            scope_logs: vec![logspb::ScopeLogs {
                scope: Some(test_scope()),
                log_records: records,
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        }],
    }
}

#[test]
fn log_records_carry_correlation_and_host() {
    let record = logspb::LogRecord {
        time_unix_nano: START_NANOS,
        observed_time_unix_nano: START_NANOS + 5,
        severity_number: 17,
        severity_text: "ERROR".to_string(),
        body: Some(AnyValue {
            value: Some(any_value::Value::StringValue("boom".to_string())),
        }),
        trace_id: (1u8..=16).collect(),
        span_id: (1u8..=8).collect(),
        flags: 1,
        attributes: vec![string_attr("retry", "false")],
        ..Default::default()
    };

    let decoded = decode_logs(&logs_request(vec![record]));
    assert_eq!(decoded.len(), 1);
    let log = &decoded[0];
    assert_eq!(log.severity_number, 17);
    assert_eq!(log.severity_text, "ERROR");
    assert_eq!(log.body, "boom");
    assert_eq!(log.body_type, "string");
    assert_eq!(log.host_name, "node-7");
    assert_eq!(log.trace_id, "0102030405060708090a0b0c0d0e0f10");
    assert_eq!(log.span_id, "0102030405060708");
    assert_eq!(log.trace_flags, 1);
    assert_eq!(log.attributes["retry"], "false");
}

#[test]
fn structured_log_bodies_are_tagged_json() {
    let record = logspb::LogRecord {
        time_unix_nano: START_NANOS,
        observed_time_unix_nano: START_NANOS,
        body: Some(AnyValue {
            value: Some(any_value::Value::KvlistValue(KeyValueList {
                values: vec![string_attr("event", "login")],
            })),
        }),
        ..Default::default()
    };

    let decoded = decode_logs(&logs_request(vec![record]));
    let log = &decoded[0];
    assert_eq!(log.body_type, "json");
    assert_eq!(log.body, r#"{"event":"login"}"#);
    assert_eq!(log.trace_id, "", "uncorrelated record has empty ids");
}

#[test]
fn empty_envelopes_decode_to_empty_sequences() {
    assert!(decode_spans(&ExportTraceServiceRequest::default()).is_empty());
    assert!(decode_metrics(&ExportMetricsServiceRequest::default()).is_empty());
    assert!(decode_logs(&ExportLogsServiceRequest::default()).is_empty());
}
