//! Data models for workflow entities.
//!
//! - `WorkflowTemplate`: a workflow definition users can apply for
//! - `WorkflowRequest`: a submitted request as listed for requester/approver
//! - `RequestStatus`: progress and approval chain of one request

pub mod workflow;

pub use workflow::{
    ApprovalStep, Progress, RequestInfo, RequestList, RequestStatus, StepState, TemplateList,
    WorkflowApplication, WorkflowRequest, WorkflowTemplate,
};
