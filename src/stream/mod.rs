// Streaming relay
// Turns a chunk-fragmented NDJSON byte stream from the inference server into a
// normalized, retry-aware sequence of events.

pub mod decoder;
pub mod events;
pub mod lines;
pub mod relay;
pub mod watchdog;

pub use decoder::{DecodeError, UpstreamEvent, decode};
pub use events::{FailureReason, StreamEvent, UsageStats};
pub use lines::LineReassembler;
pub use relay::{
    ByteStream, CancellationToken, MAX_ATTEMPTS_LIMIT, RelayConfig, RelayStream, StreamRelay, TransportError,
    UpstreamTransport,
};
pub use watchdog::IdleWatchdog;
