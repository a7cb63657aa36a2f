//! Shared data model for VelocityCollector: devices, credentials, job
//! definitions, execution/parse/job results, the error taxonomy, and the
//! external-interface traits the core consumes (DCIM device source,
//! history store).

mod credential;
mod device;
mod error;
mod job;
mod result;
mod traits;

pub use credential::{Credential, CredentialRef, CredentialSummary};
pub use device::{CredentialTestOutcome, Device, DeviceFilter, DeviceId, PlatformHints};
pub use error::ErrorCategory;
pub use job::{
    CommandSpec, ExecutionBlock, JobDefinition, JobRef, StorageBlock, ValidationBlock,
};
pub use result::{
    DeviceError, ExecutionResult, HistoryRow, HistoryStatus, JobResult, ParseResult, SaveRecord,
    TemplateRecord, ValidationFailure,
};
pub use traits::{DeviceInventory, HistoryStore};
