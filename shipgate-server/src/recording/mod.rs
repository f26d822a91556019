//! Optional JSONL recording of inbound callbacks and outbound platform calls.

pub mod logger;
pub mod middleware;
pub mod sanitizer;
pub mod types;

pub use logger::RecordingLogger;
pub use middleware::{headers_to_hashmap, inbound_event, RecordingMiddleware};
pub use sanitizer::Sanitizer;
pub use types::*;
