//! Management API types: requests, responses, admin overview and audit log.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use funnel_core::types::{
    AbTest, AbTestConfig, FieldValue, Funnel, FunnelPage, FunnelStatus, QuizResult, Theme,
};
use funnel_editor::quiz::QuizScore;
use funnel_editor::EditorAction;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Funnels ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFunnelRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pages: Vec<FunnelPage>,
    #[serde(default)]
    pub theme: Option<Theme>,
}

/// Replaces the provided parts of a funnel. Last write wins. Status changes
/// go through publish and archive; A/B test status goes through the test
/// lifecycle endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFunnelRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub pages: Option<Vec<FunnelPage>>,
    pub theme: Option<Theme>,
    pub ab_tests: Option<Vec<AbTest>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditFunnelRequest {
    /// Page the actions start on; defaults to the first page.
    #[serde(default)]
    pub page_id: Option<String>,
    pub actions: Vec<EditorAction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditFunnelResponse {
    pub funnel: Funnel,
    pub current_page_id: Option<String>,
    pub selected_element_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelSummary {
    pub id: Uuid,
    pub name: String,
    pub status: FunnelStatus,
    pub pages: usize,
    pub leads: u64,
    pub updated_at: DateTime<Utc>,
}

// ─── Runtime ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    #[serde(default)]
    pub values: HashMap<String, FieldValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultRequest {
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultResponse {
    pub result: Option<QuizResult>,
    pub score: QuizScore,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageViewRequest {
    pub page_id: String,
    pub visitor_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantAssignment {
    pub test_id: String,
    pub variant_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageViewResponse {
    pub page_id: String,
    pub progress_label: String,
    pub progress_percent: u32,
    pub assignment: Option<VariantAssignment>,
}

// ─── A/B Tests ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAbTestRequest {
    pub page_id: String,
    pub name: String,
    #[serde(default)]
    pub config: Option<AbTestConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAllocationRequest {
    pub value: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTestRequest {
    pub winner_id: String,
}

#[derive(Debug, Clone)]
pub enum TestCommand {
    Start,
    Pause,
    Resume,
    Complete { winner_id: String },
}

// ─── Leads & Analytics ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadRequest {
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
    #[serde(default)]
    pub quiz_answers: HashMap<String, String>,
    #[serde(default)]
    pub variant_assignments: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStats {
    pub funnel_id: Uuid,
    pub total_views: u64,
    pub page_views: HashMap<String, u64>,
    pub leads: u64,
    /// Leads per view of the first page.
    pub conversion_rate: f64,
    pub quiz_results: HashMap<String, u64>,
}

// ─── Templates ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub pages: Vec<FunnelPage>,
    #[serde(default)]
    pub theme: Option<Theme>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstantiateTemplateRequest {
    #[serde(default)]
    pub name: Option<String>,
}

// ─── Admin ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverview {
    pub total_funnels: u64,
    pub published_funnels: u64,
    pub draft_funnels: u64,
    pub total_leads: u64,
    pub total_views: u64,
    pub running_tests: u64,
    pub templates: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user: String,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Edit,
    Delete,
    Publish,
    Archive,
    Instantiate,
    StartTest,
    PauseTest,
    ResumeTest,
    CompleteTest,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
