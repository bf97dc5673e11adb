use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Funnel ────────────────────────────────────────────────────────────────

/// A named, ordered sequence of pages forming one marketing flow.
///
/// The funnel is the aggregate root: pages, elements and A/B tests are owned
/// by it and replaced wholesale on every edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Funnel {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: FunnelStatus,
    #[serde(default)]
    pub pages: Vec<FunnelPage>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub ab_tests: Vec<AbTest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FunnelStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub primary_color: String,
    pub background_color: String,
    pub font_family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_color: "#2563eb".to_string(),
            background_color: "#ffffff".to_string(),
            font_family: "Inter".to_string(),
            logo_url: None,
        }
    }
}

impl Funnel {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            status: FunnelStatus::Draft,
            pages: Vec::new(),
            theme: Theme::default(),
            ab_tests: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn page(&self, page_id: &str) -> Option<&FunnelPage> {
        self.pages.iter().find(|p| p.id == page_id)
    }

    pub fn page_index(&self, page_id: &str) -> Option<usize> {
        self.pages.iter().position(|p| p.id == page_id)
    }

    pub fn ab_test(&self, test_id: &str) -> Option<&AbTest> {
        self.ab_tests.iter().find(|t| t.id == test_id)
    }

    pub fn ab_test_mut(&mut self, test_id: &str) -> Option<&mut AbTest> {
        self.ab_tests.iter_mut().find(|t| t.id == test_id)
    }

    /// The A/B test currently running on a page, if any.
    pub fn running_test_for_page(&self, page_id: &str) -> Option<&AbTest> {
        self.ab_tests
            .iter()
            .find(|t| t.page_id == page_id && t.status == AbTestStatus::Running)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ─── Pages ─────────────────────────────────────────────────────────────────

/// One screen/step within a funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelPage {
    pub id: String,
    #[serde(rename = "type")]
    pub page_type: PageType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default)]
    pub elements: Vec<PageElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<PageSection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PageCondition>,
    /// Legacy routing: selected option value → target page id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_routing: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageType {
    Welcome,
    Question,
    MultiChoice,
    Contact,
    Calendar,
    Quiz,
    Thankyou,
    Custom,
}

impl FunnelPage {
    pub fn new(id: impl Into<String>, page_type: PageType, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            page_type,
            title: title.into(),
            subtitle: None,
            button_text: None,
            background_color: None,
            elements: Vec::new(),
            sections: Vec::new(),
            conditions: Vec::new(),
            conditional_routing: None,
            next_page_id: None,
        }
    }

    /// Top-level elements followed by the elements nested in sections.
    pub fn all_elements(&self) -> impl Iterator<Item = &PageElement> {
        self.elements.iter().chain(
            self.sections
                .iter()
                .flat_map(|s| s.columns.iter())
                .flat_map(|c| c.elements.iter()),
        )
    }

    pub fn find_element(&self, element_id: &str) -> Option<&PageElement> {
        self.all_elements().find(|e| e.id == element_id)
    }
}

/// Column-based layout container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSection {
    pub id: String,
    pub columns: Vec<SectionColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionColumn {
    pub id: String,
    /// Share of the section width in percent.
    pub width: u32,
    #[serde(default)]
    pub elements: Vec<PageElement>,
}

/// A routing rule: when the value of `element_id` satisfies `operator`,
/// continue with `target_page_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCondition {
    pub element_id: String,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub target_page_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    IsEmpty,
}

impl ConditionOperator {
    pub fn requires_value(&self) -> bool {
        !matches!(self, ConditionOperator::IsEmpty)
    }
}

// ─── Elements ──────────────────────────────────────────────────────────────

/// One visual building block on a page. The payload is selected by the
/// `type` tag; array position is the only ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageElement {
    pub id: String,
    #[serde(flatten)]
    pub kind: ElementKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElementKind {
    Heading(HeadingElement),
    Text(TextElement),
    Image(ImageElement),
    Video(VideoElement),
    Button(ButtonElement),
    Input(InputElement),
    Textarea(InputElement),
    Radio(ChoiceElement),
    Select(ChoiceElement),
    Checkbox(ChoiceElement),
    Quiz(QuizConfig),
    Countdown(CountdownElement),
    Spacer(SpacerElement),
    Calendar(CalendarElement),
    Divider,
}

impl PageElement {
    pub fn new(id: impl Into<String>, kind: ElementKind) -> Self {
        Self { id: id.into(), kind }
    }
}

impl ElementKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::Heading(_) => "heading",
            ElementKind::Text(_) => "text",
            ElementKind::Image(_) => "image",
            ElementKind::Video(_) => "video",
            ElementKind::Button(_) => "button",
            ElementKind::Input(_) => "input",
            ElementKind::Textarea(_) => "textarea",
            ElementKind::Radio(_) => "radio",
            ElementKind::Select(_) => "select",
            ElementKind::Checkbox(_) => "checkbox",
            ElementKind::Quiz(_) => "quiz",
            ElementKind::Countdown(_) => "countdown",
            ElementKind::Spacer(_) => "spacer",
            ElementKind::Calendar(_) => "calendar",
            ElementKind::Divider => "divider",
        }
    }

    /// Whether the element collects a value from the visitor.
    pub fn captures_value(&self) -> bool {
        matches!(
            self,
            ElementKind::Input(_)
                | ElementKind::Textarea(_)
                | ElementKind::Radio(_)
                | ElementKind::Select(_)
                | ElementKind::Checkbox(_)
                | ElementKind::Quiz(_)
                | ElementKind::Calendar(_)
        )
    }

    pub fn options(&self) -> Option<&[String]> {
        match self {
            ElementKind::Radio(c) | ElementKind::Select(c) | ElementKind::Checkbox(c) => {
                Some(&c.options)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadingElement {
    pub text: String,
    #[serde(default = "default_heading_level")]
    pub level: u8,
}

fn default_heading_level() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElement {
    pub src: String,
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoElement {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonElement {
    pub text: String,
    #[serde(default)]
    pub action: ButtonAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ButtonAction {
    #[default]
    NextPage,
    GoToPage {
        #[serde(rename = "pageId")]
        page_id: String,
    },
    ExternalUrl {
        url: String,
    },
    Submit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputElement {
    pub label: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub validation: InputValidation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValidation {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub input_type: InputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputType {
    #[default]
    Text,
    Email,
    Phone,
    Number,
}

/// Payload shared by radio, select and checkbox elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceElement {
    pub label: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownElement {
    pub target_date: DateTime<Utc>,
    #[serde(default)]
    pub expired_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacerElement {
    pub spacer_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarElement {
    pub label: String,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
}

fn default_slot_minutes() -> u32 {
    30
}

// ─── Quiz ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizConfig {
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    #[serde(default)]
    pub results: Vec<QuizResult>,
    #[serde(default = "default_true")]
    pub show_progress: bool,
    #[serde(default = "default_true")]
    pub show_result_description: bool,
    #[serde(default)]
    pub allow_retake: bool,
}

fn default_true() -> bool {
    true
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            questions: Vec::new(),
            results: Vec::new(),
            show_progress: true,
            show_result_description: true,
            allow_retake: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub question: String,
    pub answers: Vec<QuizAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAnswer {
    pub id: String,
    pub text: String,
    /// Sparse result id → points; a missing key counts as zero.
    #[serde(default)]
    pub points: HashMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub min_points: i64,
    #[serde(default)]
    pub max_points: i64,
    #[serde(default)]
    pub color: String,
}

// ─── A/B Testing ───────────────────────────────────────────────────────────

/// An A/B test on one page. The first variant is the control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbTest {
    pub id: String,
    pub page_id: String,
    pub name: String,
    pub variants: Vec<AbTestVariant>,
    #[serde(default)]
    pub status: AbTestStatus,
    #[serde(default)]
    pub config: AbTestConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
}

impl AbTest {
    pub fn variant(&self, variant_id: &str) -> Option<&AbTestVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn control(&self) -> Option<&AbTestVariant> {
        self.variants.first()
    }

    pub fn total_allocation(&self) -> u32 {
        self.variants.iter().map(|v| v.traffic_allocation).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbTestVariant {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub traffic_allocation: u32,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub conversions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbTestStatus {
    #[default]
    Draft,
    Running,
    Paused,
    Completed,
}

impl std::fmt::Display for AbTestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AbTestStatus::Draft => "draft",
            AbTestStatus::Running => "running",
            AbTestStatus::Paused => "paused",
            AbTestStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbTestConfig {
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,
    /// Required confidence, e.g. `0.95`.
    #[serde(default = "default_significance_threshold")]
    pub significance_threshold: f64,
    #[serde(default)]
    pub goal_metric: GoalMetric,
}

fn default_min_sample_size() -> u64 {
    100
}
fn default_significance_threshold() -> f64 {
    0.95
}

impl Default for AbTestConfig {
    fn default() -> Self {
        Self {
            min_sample_size: default_min_sample_size(),
            significance_threshold: default_significance_threshold(),
            goal_metric: GoalMetric::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GoalMetric {
    #[default]
    Conversion,
    Lead,
    Click,
}

// ─── Leads ─────────────────────────────────────────────────────────────────

/// A value submitted for one element: free text or a set of options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Multiple(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Multiple(items) => items.is_empty(),
        }
    }
}

/// A visitor submission captured at the end of a funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub funnel_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
    #[serde(default)]
    pub quiz_answers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_result_id: Option<String>,
    #[serde(default)]
    pub variant_assignments: HashMap<String, String>,
}

// ─── Templates ─────────────────────────────────────────────────────────────

/// Reusable starting point for a new funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelTemplate {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub pages: Vec<FunnelPage>,
    #[serde(default)]
    pub theme: Theme,
    pub created_at: DateTime<Utc>,
}

// ─── Analytics Events ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FunnelCreated,
    FunnelUpdated,
    FunnelPublished,
    FunnelDeleted,
    PageViewed,
    LeadCaptured,
    VariantAssigned,
    VariantConverted,
    AbTestStarted,
    AbTestCompleted,
}

/// Analytics event emitted by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub funnel_id: Uuid,
    pub page_id: Option<String>,
    pub visitor_id: Option<String>,
    pub variant_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_json_uses_type_tag() {
        let el = PageElement::new("sp1", ElementKind::Spacer(SpacerElement { spacer_height: 40 }));
        let json = serde_json::to_value(&el).unwrap();
        assert_eq!(json["id"], "sp1");
        assert_eq!(json["type"], "spacer");
        assert_eq!(json["spacerHeight"], 40);

        let back: PageElement = serde_json::from_value(json).unwrap();
        assert_eq!(back, el);
    }

    #[test]
    fn test_element_from_editor_json() {
        let el: PageElement = serde_json::from_str(
            r#"{"id":"r1","type":"radio","label":"Budget?","options":["low","high"]}"#,
        )
        .unwrap();
        assert_eq!(el.kind.type_name(), "radio");
        assert_eq!(el.kind.options().unwrap(), ["low", "high"]);
        assert!(el.kind.captures_value());

        let divider: PageElement = serde_json::from_str(r#"{"id":"d1","type":"divider"}"#).unwrap();
        assert_eq!(divider.kind, ElementKind::Divider);
        assert!(!divider.kind.captures_value());
    }

    #[test]
    fn test_page_finds_section_elements() {
        let mut page = FunnelPage::new("p1", PageType::Contact, "Contact");
        page.elements.push(PageElement::new(
            "h1",
            ElementKind::Heading(HeadingElement { text: "Hi".into(), level: 1 }),
        ));
        page.sections.push(PageSection {
            id: "s1".into(),
            columns: vec![SectionColumn {
                id: "c1".into(),
                width: 100,
                elements: vec![PageElement::new("d1", ElementKind::Divider)],
            }],
        });

        assert_eq!(page.all_elements().count(), 2);
        assert!(page.find_element("d1").is_some());
        assert!(page.find_element("missing").is_none());
    }

    #[test]
    fn test_field_value_untagged() {
        let single: FieldValue = serde_json::from_str(r#""hello""#).unwrap();
        let multi: FieldValue = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(single, FieldValue::Text("hello".into()));
        assert_eq!(multi, FieldValue::Multiple(vec!["a".into(), "b".into()]));
        assert!(FieldValue::Text("  ".into()).is_empty());
    }
}
