use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Identifiers arrive as numbers from some endpoints and strings from others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = string_or_number(deserializer)?;
    Ok(if id.is_empty() { None } else { Some(id) })
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkflowTemplate {
    #[serde(deserialize_with = "string_or_number", default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl WorkflowTemplate {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or("Untitled workflow")
    }

    pub fn display_description(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or("No description provided.")
    }
}

/// Template listings come back as a bare array or wrapped in
/// `results` / `templates`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TemplateList {
    Bare(Vec<WorkflowTemplate>),
    Results { results: Vec<WorkflowTemplate> },
    Templates { templates: Vec<WorkflowTemplate> },
}

impl TemplateList {
    pub fn into_vec(self) -> Vec<WorkflowTemplate> {
        match self {
            TemplateList::Bare(list)
            | TemplateList::Results { results: list }
            | TemplateList::Templates { templates: list } => list,
        }
    }
}

/// Body of a workflow application.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkflowApplication {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_description: Option<String>,
}

/// A request as shown in "my requests" and "pending approvals" listings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkflowRequest {
    #[serde(deserialize_with = "optional_string_or_number", default)]
    pub id: Option<String>,
    #[serde(deserialize_with = "optional_string_or_number", default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub date_submitted: Option<String>,
}

impl WorkflowRequest {
    pub fn identifier(&self) -> Option<&str> {
        self.request_id.as_deref().or(self.id.as_deref())
    }

    pub fn status_display(&self) -> &str {
        self.status.as_deref().unwrap_or("pending")
    }
}

/// Request listings wrapped in `results`, or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RequestList {
    Results { results: Vec<WorkflowRequest> },
    Bare(Vec<WorkflowRequest>),
}

impl RequestList {
    pub fn into_vec(self) -> Vec<WorkflowRequest> {
        match self {
            RequestList::Results { results } | RequestList::Bare(results) => results,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RequestInfo {
    #[serde(deserialize_with = "optional_string_or_number", default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub date_submitted: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Progress {
    #[serde(default)]
    pub steps_completed: u32,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub percentage: f64,
}

/// Where an approval step sits in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Completed,
    Rejected,
    Current,
    Waiting,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ApprovalStep {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub action_at: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl ApprovalStep {
    pub fn state(&self) -> StepState {
        match self.status.as_deref().map(str::to_lowercase).as_deref() {
            Some("approved") | Some("completed") => StepState::Completed,
            Some("rejected") => StepState::Rejected,
            Some("pending") => StepState::Current,
            _ => StepState::Waiting,
        }
    }
}

/// Full status view of a single request.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RequestStatus {
    pub request_info: RequestInfo,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub approval_workflow: Vec<ApprovalStep>,
    #[serde(default)]
    pub recent_activity: Vec<Value>,
}

impl RequestStatus {
    pub fn current_step(&self) -> Option<&ApprovalStep> {
        self.approval_workflow
            .iter()
            .find(|step| step.state() == StepState::Current)
    }
}
