pub mod dispatch_job;
pub mod route_callback;

pub use dispatch_job::{
    DispatchJobOperation, DispatchJobOperationRequest, DispatchJobOperationResult,
};
pub use route_callback::{
    RouteCallbackOperation, RouteCallbackOperationRequest, RouteCallbackOperationResult,
};
