//! Transfer (Streams) — `spec.md` §4.3: per-peer connections, worker-pool
//! fan-out, request/response framing, and the structured error taxonomy.

pub mod framing;
pub mod pipeline;
pub mod stream;
pub mod worker;

pub use pipeline::{process_segment_response, ProcessContext};
pub use stream::{SegmentStream, StreamTransport};
pub use worker::{run_transfer_round, SegmentRequestContext, TransferDeps, TransferRoundOutcome};
