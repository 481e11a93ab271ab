//! Query router: SQL planning and the HTTP query API

mod api;
pub mod envelopes;
pub mod planner;

pub use api::{router, ApiError, QueryState};
