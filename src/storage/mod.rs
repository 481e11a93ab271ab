//! Columnar writer: ClickHouse client and row encoding

mod client;
pub(crate) mod rows;

pub use client::{ClickHouseClient, LogSink, MetricSink, SpanSink};
pub use rows::format_datetime;
