pub mod distribution;
pub mod error;
pub mod events;
pub mod file_record;
pub mod ids;
pub mod segment;

pub use distribution::{DistributionQueue, PeerAssignment};
pub use error::{DiscoveryError, ErasureError, ManagerError, TaskError, TransferError, TransferErrorCode, VerifyError};
pub use events::StatusEvent;
pub use file_record::{FileMeta, FileRecord, FileStatus, SliceTableEntry};
pub use ids::{FileId, PeerId, SegmentId, TaskId};
pub use segment::{DownloadSegment, SegmentPayload, SegmentStatus};
