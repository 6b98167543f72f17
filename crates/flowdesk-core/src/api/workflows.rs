//! Workflow endpoints under `/workflows/{slug}/`. All calls are authenticated.

use serde_json::{json, Value};
use tracing::debug;

use crate::models::{RequestList, RequestStatus, TemplateList, WorkflowApplication, WorkflowRequest, WorkflowTemplate};

use super::client::{ApiClient, ApiRequest};
use super::ApiError;

fn workflows_endpoint(slug: &str, path: &str) -> String {
    format!("/workflows/{}/{}", slug, path)
}

impl ApiClient {
    /// Workflow templates available to the tenant
    pub async fn templates(&self, slug: &str) -> Result<Vec<WorkflowTemplate>, ApiError> {
        let list: TemplateList = self
            .send_as(ApiRequest::get(workflows_endpoint(slug, "templates/")).authenticated(slug))
            .await?;
        let templates = list.into_vec();
        debug!(tenant = slug, count = templates.len(), "Fetched workflow templates");
        Ok(templates)
    }

    /// Submit a request against a workflow definition
    pub async fn apply_workflow(
        &self,
        slug: &str,
        definition_id: &str,
        application: &WorkflowApplication,
    ) -> Result<Option<Value>, ApiError> {
        let body = serde_json::to_value(application)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode application: {}", e)))?;
        self.send(
            ApiRequest::post(workflows_endpoint(slug, &format!("workflows/{}/apply/", definition_id)))
                .json(body)
                .authenticated(slug),
        )
        .await
    }

    /// Progress and approval chain of one request
    pub async fn request_status(&self, slug: &str, request_id: &str) -> Result<RequestStatus, ApiError> {
        self.send_as(
            ApiRequest::get(workflows_endpoint(slug, &format!("workflows/{}/status/", request_id)))
                .authenticated(slug),
        )
        .await
    }

    /// Requests submitted by the signed-in user
    pub async fn my_workflows(&self, slug: &str) -> Result<Vec<WorkflowRequest>, ApiError> {
        let list: RequestList = self
            .send_as(ApiRequest::get(workflows_endpoint(slug, "workflows/my/")).authenticated(slug))
            .await?;
        Ok(list.into_vec())
    }

    /// Requests waiting on the signed-in user's approval
    pub async fn pending_approvals(&self, slug: &str) -> Result<Vec<WorkflowRequest>, ApiError> {
        let list: RequestList = self
            .send_as(ApiRequest::get(workflows_endpoint(slug, "workflows/pending/")).authenticated(slug))
            .await?;
        Ok(list.into_vec())
    }

    pub async fn approve_request(&self, slug: &str, request_id: &str) -> Result<Option<Value>, ApiError> {
        self.send(
            ApiRequest::post(workflows_endpoint(slug, &format!("workflows/{}/approve/", request_id)))
                .authenticated(slug),
        )
        .await
    }

    pub async fn reject_request(
        &self,
        slug: &str,
        request_id: &str,
        description: &str,
    ) -> Result<Option<Value>, ApiError> {
        self.send(
            ApiRequest::post(workflows_endpoint(slug, &format!("workflows/{}/reject/", request_id)))
                .json(json!({ "description": description }))
                .authenticated(slug),
        )
        .await
    }
}
