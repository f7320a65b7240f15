//! Calcgate Core - capacity-aware dispatcher for calculation clusters
//!
//! A front door for large-file calculation jobs:
//! - first-fit cluster admission under capacity and file-size limits
//! - in-flight load and per-job metadata kept in a pluggable state store
//! - worker callbacks re-homed to the original caller

pub mod blob;
pub mod body;
pub mod cluster;
pub mod error;
pub mod operations;
pub mod state;
pub mod upstream;

pub use blob::{BlobSizeProvider, ObjectStoreBlobSizes};
pub use body::CalculationBody;
pub use cluster::{
    ClusterConfig, ClusterSelector, ClusterSet, DEFAULT_CALCULATION_THRESHOLD,
    DEFAULT_MAX_FILE_SIZE, SelectedCluster,
};
pub use error::{GateError, Result};
pub use operations::{
    DispatchJobOperation, DispatchJobOperationRequest, DispatchJobOperationResult,
    RouteCallbackOperation, RouteCallbackOperationRequest, RouteCallbackOperationResult,
};
pub use state::{
    DynStateStore, FileStateStore, InFlightJob, JobState, StateBackend, StateStore,
    StateStoreBuilder, TableStateStore,
};
pub use upstream::UpstreamClient;
