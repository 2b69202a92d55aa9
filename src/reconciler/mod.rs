//! Turning endpoint replies into conversation content

pub mod atomic;
pub mod streaming;

pub use atomic::{AtomicReply, resolve_atomic};
pub use streaming::{StreamEvent, StreamReply, StreamState, THREAD_ID_SEPARATOR, resolve_stream};
