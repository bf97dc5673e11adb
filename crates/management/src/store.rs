//! In-memory funnel store backed by DashMap.
//!
//! Whole funnels are replaced on save with last-write-wins semantics; there
//! is no optimistic concurrency token.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use funnel_core::config::EditorConfig;
use funnel_core::event_bus::{make_event, noop_sink, EventSink};
use funnel_core::types::{
    AbTest, AbTestStatus, ElementKind, EventType, Funnel, FunnelPage, FunnelStatus,
    FunnelTemplate, Lead, QuizConfig,
};
use funnel_core::{FunnelError, FunnelResult};
use funnel_editor::allocator::{self, MIN_VARIANTS};
use funnel_editor::experiment::{self, TestEvaluation};
use funnel_editor::lifecycle::AbTestStateMachine;
use funnel_editor::quiz;
use funnel_editor::routing::{self, NextPage};
use funnel_editor::validation::{validate_funnel, ValidationIssue};
use funnel_editor::{EditorSession, FunnelProgress};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::*;

/// Thread-safe in-memory store for funnels, leads, templates, page views and audit log.
pub struct ManagementStore {
    funnels: DashMap<Uuid, Funnel>,
    leads: DashMap<Uuid, Lead>,
    templates: DashMap<Uuid, FunnelTemplate>,
    page_views: DashMap<(Uuid, String), u64>,
    audit_log: DashMap<Uuid, AuditLogEntry>,
    editor: EditorConfig,
    state_machine: AbTestStateMachine,
    event_sink: Arc<dyn EventSink>,
}

impl ManagementStore {
    pub fn new(editor: EditorConfig) -> Self {
        info!("Funnel store initialized (in-memory)");
        Self {
            funnels: DashMap::new(),
            leads: DashMap::new(),
            templates: DashMap::new(),
            page_views: DashMap::new(),
            audit_log: DashMap::new(),
            editor,
            state_machine: AbTestStateMachine::new(),
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for emitting analytics events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    // ─── Funnels ───────────────────────────────────────────────────────────

    pub fn list_funnels(&self) -> Vec<FunnelSummary> {
        let mut funnels: Vec<FunnelSummary> = self
            .funnels
            .iter()
            .map(|r| {
                let f = r.value();
                FunnelSummary {
                    id: f.id,
                    name: f.name.clone(),
                    status: f.status,
                    pages: f.pages.len(),
                    leads: self.count_leads(f.id),
                    updated_at: f.updated_at,
                }
            })
            .collect();
        funnels.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        funnels
    }

    pub fn get_funnel(&self, id: Uuid) -> FunnelResult<Funnel> {
        self.funnels
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| FunnelError::not_found("Funnel", id))
    }

    pub fn create_funnel(&self, req: CreateFunnelRequest, user: &str) -> Funnel {
        let mut funnel = Funnel::new(req.name);
        funnel.description = req.description.unwrap_or_default();
        funnel.pages = req.pages;
        if let Some(theme) = req.theme {
            funnel.theme = theme;
        }
        self.insert_funnel(funnel, user)
    }

    fn insert_funnel(&self, funnel: Funnel, user: &str) -> Funnel {
        let id = funnel.id;
        self.funnels.insert(id, funnel.clone());
        self.log_audit(user, AuditAction::Create, "funnel", &id.to_string(), serde_json::json!({"name": &funnel.name}));
        self.event_sink.emit(make_event(EventType::FunnelCreated, id));
        info!(funnel_id = %id, name = %funnel.name, "Funnel created");
        funnel
    }

    /// Replaces the provided parts of a funnel. A rejected update leaves the
    /// stored funnel untouched.
    pub fn update_funnel(&self, id: Uuid, req: UpdateFunnelRequest, user: &str) -> FunnelResult<Funnel> {
        let max_variants = self.editor.max_variants;
        let updated = self.with_funnel_mut(id, |f| {
            let mut next = f.clone();
            if let Some(name) = req.name { next.name = name; }
            if let Some(description) = req.description { next.description = description; }
            if let Some(pages) = req.pages { next.pages = pages; }
            if let Some(theme) = req.theme { next.theme = theme; }
            if let Some(tests) = req.ab_tests {
                next.ab_tests = merge_ab_tests(f, &next.pages, tests, max_variants)?;
            }
            if next.status == FunnelStatus::Published {
                reject_issues(&next)?;
            }
            *f = next;
            Ok(f.clone())
        })?;
        self.log_audit(user, AuditAction::Update, "funnel", &id.to_string(), serde_json::json!({}));
        self.event_sink.emit(make_event(EventType::FunnelUpdated, id));
        Ok(updated)
    }

    /// Deletes the funnel together with its leads and page view counters.
    pub fn delete_funnel(&self, id: Uuid, user: &str) -> FunnelResult<()> {
        self.funnels
            .remove(&id)
            .ok_or_else(|| FunnelError::not_found("Funnel", id))?;
        self.leads.retain(|_, lead| lead.funnel_id != id);
        self.page_views.retain(|(funnel_id, _), _| *funnel_id != id);
        self.log_audit(user, AuditAction::Delete, "funnel", &id.to_string(), serde_json::json!({}));
        self.event_sink.emit(make_event(EventType::FunnelDeleted, id));
        info!(funnel_id = %id, "Funnel deleted");
        Ok(())
    }

    pub fn validate_funnel(&self, id: Uuid) -> FunnelResult<Vec<ValidationIssue>> {
        let funnel = self.get_funnel(id)?;
        Ok(validate_funnel(&funnel))
    }

    /// Publishes a funnel that has at least one page and no structural issues.
    pub fn publish_funnel(&self, id: Uuid, user: &str) -> FunnelResult<Funnel> {
        let published = self.with_funnel_mut(id, |f| {
            if f.pages.is_empty() {
                return Err(FunnelError::Validation("funnel has no pages".to_string()));
            }
            reject_issues(f)?;
            f.status = FunnelStatus::Published;
            Ok(f.clone())
        })?;
        self.log_audit(user, AuditAction::Publish, "funnel", &id.to_string(), serde_json::json!({}));
        self.event_sink.emit(make_event(EventType::FunnelPublished, id));
        info!(funnel_id = %id, "Funnel published");
        Ok(published)
    }

    /// Takes a funnel offline. Archived funnels stop accepting leads.
    pub fn archive_funnel(&self, id: Uuid, user: &str) -> FunnelResult<Funnel> {
        let archived = self.with_funnel_mut(id, |f| {
            f.status = FunnelStatus::Archived;
            Ok(f.clone())
        })?;
        self.log_audit(user, AuditAction::Archive, "funnel", &id.to_string(), serde_json::json!({}));
        self.event_sink.emit(make_event(EventType::FunnelUpdated, id));
        info!(funnel_id = %id, "Funnel archived");
        Ok(archived)
    }

    /// Replays editor actions against the stored funnel and saves the result.
    /// Load, replay and save happen under the funnel's write lock, so a
    /// funnel deleted meanwhile stays deleted.
    pub fn apply_edits(&self, id: Uuid, req: EditFunnelRequest, user: &str) -> FunnelResult<EditorSession> {
        let session = self.with_funnel_counters(id, |f| {
            let mut session = EditorSession::new(f.clone(), &self.editor);
            if let Some(page_id) = req.page_id {
                session = session.reduce(&funnel_editor::EditorAction::SelectPage { page_id });
            }
            for action in &req.actions {
                session = session.reduce(action);
            }
            if session.dirty {
                *f = session.funnel.clone();
            }
            Ok(session)
        })?;

        if session.dirty {
            self.log_audit(user, AuditAction::Edit, "funnel", &id.to_string(), serde_json::json!({"actions": req.actions.len()}));
            self.event_sink.emit(make_event(EventType::FunnelUpdated, id));
        }
        Ok(session)
    }

    // ─── Runtime ───────────────────────────────────────────────────────────

    pub fn route(&self, id: Uuid, page_id: &str, req: &RouteRequest) -> FunnelResult<NextPage> {
        let funnel = self.get_funnel(id)?;
        if funnel.page(page_id).is_none() {
            return Err(FunnelError::not_found("Page", page_id));
        }
        Ok(routing::next_page(&funnel, page_id, &req.values))
    }

    pub fn quiz_result(
        &self,
        id: Uuid,
        page_id: &str,
        element_id: &str,
        req: &QuizResultRequest,
    ) -> FunnelResult<QuizResultResponse> {
        let funnel = self.get_funnel(id)?;
        let page = funnel
            .page(page_id)
            .ok_or_else(|| FunnelError::not_found("Page", page_id))?;
        let element = page
            .find_element(element_id)
            .ok_or_else(|| FunnelError::not_found("Element", element_id))?;
        let ElementKind::Quiz(config) = &element.kind else {
            return Err(FunnelError::Validation(format!(
                "element {} is a {}, not a quiz",
                element_id,
                element.kind.type_name()
            )));
        };

        let score = quiz::score_quiz(config, &req.answers);
        let result = quiz::best_result(config, &score).cloned();
        Ok(QuizResultResponse { result, score })
    }

    /// Counts a page view and, when the page runs an A/B test, assigns the
    /// visitor to a variant.
    pub fn record_page_view(&self, id: Uuid, req: &PageViewRequest) -> FunnelResult<PageViewResponse> {
        let (index, total, assignment) = self.with_funnel_counters(id, |f| {
            let index = f
                .page_index(&req.page_id)
                .ok_or_else(|| FunnelError::not_found("Page", &req.page_id))?;
            let total = f.pages.len();

            let mut assignment = None;
            let running = f
                .ab_tests
                .iter_mut()
                .find(|t| t.page_id == req.page_id && t.status == AbTestStatus::Running);
            if let Some(test) = running {
                let assigned = experiment::assign_variant(test, &req.visitor_id).map(|v| VariantAssignment {
                    test_id: test.id.clone(),
                    variant_id: v.id.clone(),
                    title: v.title.clone(),
                });
                if let Some(a) = &assigned {
                    experiment::record_view(test, &a.variant_id);
                }
                assignment = assigned;
            }
            Ok((index, total, assignment))
        })?;

        *self.page_views.entry((id, req.page_id.clone())).or_insert(0) += 1;
        self.event_sink.emit(
            make_event(EventType::PageViewed, id)
                .with_page(&req.page_id)
                .with_visitor(&req.visitor_id),
        );
        if let Some(a) = &assignment {
            self.event_sink.emit(
                make_event(EventType::VariantAssigned, id)
                    .with_page(&req.page_id)
                    .with_visitor(&req.visitor_id)
                    .with_variant(&a.variant_id),
            );
        }

        let progress = FunnelProgress::new(index, total);
        Ok(PageViewResponse {
            page_id: req.page_id.clone(),
            progress_label: progress.label(),
            progress_percent: progress.percent(),
            assignment,
        })
    }

    // ─── A/B Tests ─────────────────────────────────────────────────────────

    pub fn create_ab_test(&self, id: Uuid, req: CreateAbTestRequest) -> FunnelResult<AbTest> {
        self.with_funnel_mut(id, |f| {
            if f.page(&req.page_id).is_none() {
                return Err(FunnelError::not_found("Page", &req.page_id));
            }
            let busy = f
                .ab_tests
                .iter()
                .any(|t| t.page_id == req.page_id && t.status != AbTestStatus::Completed);
            if busy {
                return Err(FunnelError::Validation(format!(
                    "page {} already has an open A/B test",
                    req.page_id
                )));
            }
            let tests = &f.ab_tests;
            let mut test = allocator::new_ab_test(&req.page_id, &req.name, |c| {
                tests
                    .iter()
                    .any(|t| t.id == c || t.variants.iter().any(|v| v.id == c))
            });
            if let Some(config) = req.config {
                test.config = config;
            }
            f.ab_tests.push(test.clone());
            info!(funnel_id = %id, test_id = %test.id, page_id = %req.page_id, "A/B test created");
            Ok(test)
        })
    }

    pub fn add_variant(&self, id: Uuid, test_id: &str) -> FunnelResult<AbTest> {
        let max_variants = self.editor.max_variants;
        self.with_editable_test_mut(id, test_id, |test| {
            if test.variants.len() >= max_variants {
                return Err(FunnelError::Validation(format!(
                    "A/B test {} already has {} variants",
                    test.id, max_variants
                )));
            }
            test.variants = allocator::add_variant(test);
            Ok(test.clone())
        })
    }

    pub fn delete_variant(&self, id: Uuid, test_id: &str, variant_id: &str) -> FunnelResult<AbTest> {
        self.with_editable_test_mut(id, test_id, |test| {
            if test.variant(variant_id).is_none() {
                return Err(FunnelError::not_found("Variant", variant_id));
            }
            if test.variants.len() <= MIN_VARIANTS {
                return Err(FunnelError::Validation(format!(
                    "A/B test {} needs at least {} variants",
                    test.id, MIN_VARIANTS
                )));
            }
            test.variants = allocator::delete_variant(test, variant_id);
            if test.winner_id.as_deref() == Some(variant_id) {
                test.winner_id = None;
            }
            Ok(test.clone())
        })
    }

    pub fn set_allocation(&self, id: Uuid, test_id: &str, variant_id: &str, value: u32) -> FunnelResult<AbTest> {
        self.with_editable_test_mut(id, test_id, |test| {
            if test.variant(variant_id).is_none() {
                return Err(FunnelError::not_found("Variant", variant_id));
            }
            test.variants = allocator::set_allocation(test, variant_id, value);
            Ok(test.clone())
        })
    }

    pub fn transition_test(&self, id: Uuid, test_id: &str, command: TestCommand, user: &str) -> FunnelResult<AbTest> {
        let (action, event) = match &command {
            TestCommand::Start => (AuditAction::StartTest, Some(EventType::AbTestStarted)),
            TestCommand::Pause => (AuditAction::PauseTest, None),
            TestCommand::Resume => (AuditAction::ResumeTest, None),
            TestCommand::Complete { .. } => (AuditAction::CompleteTest, Some(EventType::AbTestCompleted)),
        };

        let machine = &self.state_machine;
        let updated = self.with_test_mut(id, test_id, |test| {
            let next = match &command {
                TestCommand::Start => machine.start(test)?,
                TestCommand::Pause => machine.pause(test)?,
                TestCommand::Resume => machine.resume(test)?,
                TestCommand::Complete { winner_id } => machine.declare_winner(test, winner_id)?,
            };
            *test = next.clone();
            Ok(next)
        })?;

        self.log_audit(user, action, "ab_test", test_id, serde_json::json!({"funnel_id": id, "status": updated.status}));
        if let Some(event_type) = event {
            let mut event = make_event(event_type, id).with_page(&updated.page_id);
            if let Some(winner) = &updated.winner_id {
                event = event.with_variant(winner);
            }
            self.event_sink.emit(event);
        }
        Ok(updated)
    }

    pub fn evaluate_test(&self, id: Uuid, test_id: &str) -> FunnelResult<TestEvaluation> {
        let funnel = self.get_funnel(id)?;
        let test = funnel
            .ab_test(test_id)
            .ok_or_else(|| FunnelError::not_found("A/B test", test_id))?;
        Ok(experiment::evaluate(test))
    }

    // ─── Leads ─────────────────────────────────────────────────────────────

    /// Stores a submission, scores the funnel's first quiz and credits a
    /// conversion to every running variant the visitor was assigned.
    pub fn capture_lead(&self, id: Uuid, req: CreateLeadRequest) -> FunnelResult<Lead> {
        let (quiz_result_id, converted) = self.with_funnel_counters(id, |f| {
            if f.status == FunnelStatus::Archived {
                return Err(FunnelError::Validation(format!("funnel {} is archived", id)));
            }
            let quiz_result_id = first_quiz(&f.pages)
                .filter(|_| !req.quiz_answers.is_empty())
                .and_then(|config| quiz::calculate_quiz_result(config, &req.quiz_answers))
                .map(|r| r.id.clone());

            let mut converted = Vec::new();
            for (test_id, variant_id) in &req.variant_assignments {
                match f.ab_test_mut(test_id) {
                    Some(test) if test.status == AbTestStatus::Running => {
                        if experiment::record_conversion(test, variant_id) {
                            converted.push((test.page_id.clone(), variant_id.clone()));
                        }
                    }
                    _ => warn!(funnel_id = %id, test_id = %test_id, "Conversion for inactive A/B test ignored"),
                }
            }
            Ok((quiz_result_id, converted))
        })?;

        let lead = Lead {
            id: Uuid::new_v4(),
            funnel_id: id,
            submitted_at: Utc::now(),
            fields: req.fields,
            quiz_answers: req.quiz_answers,
            quiz_result_id,
            variant_assignments: req.variant_assignments,
        };
        self.leads.insert(lead.id, lead.clone());

        for (page_id, variant_id) in converted {
            self.event_sink.emit(
                make_event(EventType::VariantConverted, id)
                    .with_page(page_id)
                    .with_variant(variant_id),
            );
        }
        self.event_sink.emit(make_event(EventType::LeadCaptured, id));
        info!(funnel_id = %id, lead_id = %lead.id, "Lead captured");
        Ok(lead)
    }

    pub fn list_leads(&self, id: Uuid) -> FunnelResult<Vec<Lead>> {
        if !self.funnels.contains_key(&id) {
            return Err(FunnelError::not_found("Funnel", id));
        }
        let mut leads: Vec<Lead> = self
            .leads
            .iter()
            .filter(|r| r.value().funnel_id == id)
            .map(|r| r.value().clone())
            .collect();
        leads.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(leads)
    }

    fn count_leads(&self, id: Uuid) -> u64 {
        self.leads.iter().filter(|r| r.value().funnel_id == id).count() as u64
    }

    pub fn funnel_stats(&self, id: Uuid) -> FunnelResult<FunnelStats> {
        let funnel = self.get_funnel(id)?;
        let page_views: HashMap<String, u64> = funnel
            .pages
            .iter()
            .map(|p| {
                let views = self.page_views.get(&(id, p.id.clone())).map(|v| *v).unwrap_or(0);
                (p.id.clone(), views)
            })
            .collect();
        let total_views = page_views.values().sum();
        let entry_views = funnel
            .pages
            .first()
            .and_then(|p| page_views.get(&p.id).copied())
            .unwrap_or(0);

        let mut leads = 0u64;
        let mut quiz_results: HashMap<String, u64> = HashMap::new();
        for lead in self.leads.iter().filter(|r| r.value().funnel_id == id) {
            leads += 1;
            if let Some(result_id) = &lead.quiz_result_id {
                *quiz_results.entry(result_id.clone()).or_insert(0) += 1;
            }
        }

        Ok(FunnelStats {
            funnel_id: id,
            total_views,
            page_views,
            leads,
            conversion_rate: if entry_views > 0 { leads as f64 / entry_views as f64 } else { 0.0 },
            quiz_results,
        })
    }

    // ─── Templates ─────────────────────────────────────────────────────────

    pub fn list_templates(&self) -> Vec<FunnelTemplate> {
        let mut templates: Vec<FunnelTemplate> = self.templates.iter().map(|r| r.value().clone()).collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates
    }

    pub fn create_template(&self, req: CreateTemplateRequest, user: &str) -> FunnelTemplate {
        let template = FunnelTemplate {
            id: Uuid::new_v4(),
            name: req.name,
            category: req.category,
            description: req.description,
            pages: req.pages,
            theme: req.theme.unwrap_or_default(),
            created_at: Utc::now(),
        };
        self.templates.insert(template.id, template.clone());
        self.log_audit(user, AuditAction::Create, "template", &template.id.to_string(), serde_json::json!({"name": &template.name}));
        template
    }

    /// Creates a draft funnel from a copy of the template's pages.
    pub fn instantiate_template(&self, template_id: Uuid, req: InstantiateTemplateRequest, user: &str) -> FunnelResult<Funnel> {
        let template = self
            .templates
            .get(&template_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| FunnelError::not_found("Template", template_id))?;

        let mut funnel = Funnel::new(req.name.unwrap_or_else(|| template.name.clone()));
        funnel.description = template.description;
        funnel.pages = template.pages;
        funnel.theme = template.theme;
        self.log_audit(user, AuditAction::Instantiate, "template", &template_id.to_string(), serde_json::json!({"funnel_id": funnel.id}));
        Ok(self.insert_funnel(funnel, user))
    }

    // ─── Admin ─────────────────────────────────────────────────────────────

    pub fn admin_overview(&self) -> AdminOverview {
        let mut overview = AdminOverview {
            total_funnels: 0,
            published_funnels: 0,
            draft_funnels: 0,
            total_leads: self.leads.len() as u64,
            total_views: self.page_views.iter().map(|r| *r.value()).sum(),
            running_tests: 0,
            templates: self.templates.len() as u64,
        };
        for entry in self.funnels.iter() {
            let f = entry.value();
            overview.total_funnels += 1;
            match f.status {
                FunnelStatus::Published => overview.published_funnels += 1,
                FunnelStatus::Draft => overview.draft_funnels += 1,
                FunnelStatus::Archived => {}
            }
            overview.running_tests += f
                .ab_tests
                .iter()
                .filter(|t| t.status == AbTestStatus::Running)
                .count() as u64;
        }
        overview
    }

    pub fn get_audit_log(&self) -> Vec<AuditLogEntry> {
        let mut entries: Vec<AuditLogEntry> = self.audit_log.iter().map(|r| r.value().clone()).collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    fn log_audit(&self, user: &str, action: AuditAction, resource_type: &str, resource_id: &str, details: serde_json::Value) {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            user: user.to_string(),
            action,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details,
            timestamp: Utc::now(),
        };
        self.audit_log.insert(entry.id, entry);
    }

    // ─── Helpers ───────────────────────────────────────────────────────────

    /// Runs `f` under the funnel's write lock and bumps `updated_at` on success.
    fn with_funnel_mut<T>(&self, id: Uuid, f: impl FnOnce(&mut Funnel) -> FunnelResult<T>) -> FunnelResult<T> {
        self.with_funnel_counters(id, |funnel| {
            let out = f(funnel)?;
            funnel.touch();
            Ok(out)
        })
    }

    /// Like `with_funnel_mut` but leaves `updated_at` alone; used for visitor traffic.
    fn with_funnel_counters<T>(&self, id: Uuid, f: impl FnOnce(&mut Funnel) -> FunnelResult<T>) -> FunnelResult<T> {
        let mut entry = self
            .funnels
            .get_mut(&id)
            .ok_or_else(|| FunnelError::not_found("Funnel", id))?;
        f(entry.value_mut())
    }

    fn with_test_mut<T>(&self, id: Uuid, test_id: &str, f: impl FnOnce(&mut AbTest) -> FunnelResult<T>) -> FunnelResult<T> {
        self.with_funnel_mut(id, |funnel| {
            let test = funnel
                .ab_test_mut(test_id)
                .ok_or_else(|| FunnelError::not_found("A/B test", test_id))?;
            f(test)
        })
    }

    /// Variant edits are rejected once a test has a declared outcome.
    fn with_editable_test_mut<T>(&self, id: Uuid, test_id: &str, f: impl FnOnce(&mut AbTest) -> FunnelResult<T>) -> FunnelResult<T> {
        self.with_test_mut(id, test_id, |test| {
            if test.status == AbTestStatus::Completed {
                return Err(FunnelError::Validation(format!("A/B test {} is completed", test.id)));
            }
            f(test)
        })
    }

    // ─── Demo data ─────────────────────────────────────────────────────────

    pub fn seed_demo_data(&self) {
        let pages = demo::quiz_funnel_pages();
        self.create_template(
            CreateTemplateRequest {
                name: "Quiz Lead Funnel".to_string(),
                category: "quiz".to_string(),
                description: "Welcome page, scored quiz, contact form and thank-you page".to_string(),
                pages: pages.clone(),
                theme: None,
            },
            "system",
        );
        self.create_funnel(
            CreateFunnelRequest {
                name: "Skin Type Quiz".to_string(),
                description: Some("Demo funnel".to_string()),
                pages,
                theme: None,
            },
            "system",
        );
        info!("Demo funnel and template seeded");
    }
}

fn reject_issues(funnel: &Funnel) -> FunnelResult<()> {
    let issues = validate_funnel(funnel);
    if issues.is_empty() {
        return Ok(());
    }
    let messages: Vec<String> = issues.into_iter().map(|i| i.message).collect();
    Err(FunnelError::Validation(messages.join("; ")))
}

/// Checks A/B tests sent with a funnel update against the stored ones.
///
/// New tests must arrive as drafts. Known tests keep their stored status,
/// winner and counters; lifecycle changes go through `transition_test`.
fn merge_ab_tests(
    stored: &Funnel,
    pages: &[FunnelPage],
    tests: Vec<AbTest>,
    max_variants: usize,
) -> FunnelResult<Vec<AbTest>> {
    let invalid = |test: &AbTest, reason: String| -> FunnelResult<Vec<AbTest>> {
        Err(FunnelError::Validation(format!("A/B test {}: {}", test.id, reason)))
    };

    let mut merged: Vec<AbTest> = Vec::with_capacity(tests.len());
    for mut test in tests {
        if merged.iter().any(|t| t.id == test.id) {
            return invalid(&test, "duplicate test id".to_string());
        }
        if !(MIN_VARIANTS..=max_variants).contains(&test.variants.len()) {
            return invalid(
                &test,
                format!("needs {} to {} variants", MIN_VARIANTS, max_variants),
            );
        }
        if test.total_allocation() != allocator::TOTAL_ALLOCATION {
            return invalid(
                &test,
                format!("allocations sum to {}", test.total_allocation()),
            );
        }
        if !pages.iter().any(|p| p.id == test.page_id) {
            return Err(FunnelError::not_found("Page", &test.page_id));
        }

        match stored.ab_tests.iter().find(|t| t.id == test.id) {
            Some(current) => {
                if test.status != current.status || test.winner_id != current.winner_id {
                    return Err(FunnelError::InvalidTransition {
                        from: current.status.to_string(),
                        to: test.status.to_string(),
                    });
                }
                for variant in &mut test.variants {
                    let counters = current.variant(&variant.id).map(|v| (v.views, v.conversions));
                    let (views, conversions) = counters.unwrap_or((0, 0));
                    variant.views = views;
                    variant.conversions = conversions;
                }
                if current.status == AbTestStatus::Completed && test != *current {
                    return invalid(&test, "test is completed".to_string());
                }
            }
            None => {
                if test.status != AbTestStatus::Draft || test.winner_id.is_some() {
                    return invalid(&test, "new tests start as drafts".to_string());
                }
                for variant in &mut test.variants {
                    variant.views = 0;
                    variant.conversions = 0;
                }
            }
        }

        let busy = merged
            .iter()
            .any(|t| t.page_id == test.page_id && t.status != AbTestStatus::Completed);
        if busy && test.status != AbTestStatus::Completed {
            return invalid(&test, format!("page {} already has an open A/B test", test.page_id));
        }
        merged.push(test);
    }
    Ok(merged)
}

fn first_quiz(pages: &[FunnelPage]) -> Option<&QuizConfig> {
    pages
        .iter()
        .flat_map(|p| p.all_elements())
        .find_map(|e| match &e.kind {
            ElementKind::Quiz(config) => Some(config),
            _ => None,
        })
}

pub(crate) mod demo {
    use funnel_core::types::*;

    fn answer(id: &str, text: &str, points: &[(&str, i64)]) -> QuizAnswer {
        QuizAnswer {
            id: id.to_string(),
            text: text.to_string(),
            points: points.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn result(id: &str, title: &str, color: &str) -> QuizResult {
        QuizResult {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            min_points: 0,
            max_points: 10,
            color: color.to_string(),
        }
    }

    pub fn quiz_funnel_pages() -> Vec<FunnelPage> {
        let mut welcome = FunnelPage::new("welcome", PageType::Welcome, "Find your skin type");
        welcome.button_text = Some("Start".to_string());
        welcome.elements.push(PageElement::new(
            "headline",
            ElementKind::Heading(HeadingElement {
                text: "Two questions, one routine".to_string(),
                level: 1,
            }),
        ));

        let mut quiz_page = FunnelPage::new("quiz", PageType::Quiz, "Quiz");
        quiz_page.elements.push(PageElement::new(
            "skin-quiz",
            ElementKind::Quiz(QuizConfig {
                questions: vec![
                    QuizQuestion {
                        id: "q1".to_string(),
                        question: "How does your skin feel at noon?".to_string(),
                        answers: vec![
                            answer("a1", "Tight", &[("dry", 3), ("oily", 0)]),
                            answer("a2", "Shiny", &[("dry", 0), ("oily", 3)]),
                        ],
                    },
                    QuizQuestion {
                        id: "q2".to_string(),
                        question: "Do you see visible pores?".to_string(),
                        answers: vec![
                            answer("a1", "Rarely", &[("dry", 2)]),
                            answer("a2", "Often", &[("oily", 2), ("dry", 1)]),
                        ],
                    },
                ],
                results: vec![result("dry", "Dry skin", "#f59e0b"), result("oily", "Oily skin", "#10b981")],
                ..QuizConfig::default()
            }),
        ));

        let mut contact = FunnelPage::new("contact", PageType::Contact, "Where should we send it?");
        contact.elements.push(PageElement::new(
            "email",
            ElementKind::Input(InputElement {
                label: "Email".to_string(),
                placeholder: "you@example.com".to_string(),
                validation: InputValidation {
                    required: true,
                    input_type: InputType::Email,
                    ..InputValidation::default()
                },
            }),
        ));

        let thanks = FunnelPage::new("thanks", PageType::Thankyou, "Check your inbox");
        vec![welcome, quiz_page, contact, thanks]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::event_bus::capture_sink;
    use funnel_core::types::FieldValue;

    fn store() -> ManagementStore {
        ManagementStore::new(EditorConfig::default())
    }

    fn demo_funnel(store: &ManagementStore) -> Funnel {
        store.create_funnel(
            CreateFunnelRequest {
                name: "Demo".into(),
                description: None,
                pages: demo::quiz_funnel_pages(),
                theme: None,
            },
            "tester",
        )
    }

    #[test]
    fn test_funnel_crud() {
        let store = store();
        let funnel = demo_funnel(&store);
        assert_eq!(store.list_funnels().len(), 1);

        let updated = store
            .update_funnel(funnel.id, UpdateFunnelRequest { name: Some("Renamed".into()), ..Default::default() }, "tester")
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.pages.len(), 4);

        store.delete_funnel(funnel.id, "tester").unwrap();
        assert!(matches!(store.get_funnel(funnel.id), Err(FunnelError::NotFound { .. })));
        assert_eq!(store.get_audit_log().len(), 3);
    }

    #[test]
    fn test_publish_requires_valid_funnel() {
        let store = store();
        let empty = store.create_funnel(
            CreateFunnelRequest { name: "Empty".into(), description: None, pages: vec![], theme: None },
            "tester",
        );
        assert!(matches!(store.publish_funnel(empty.id, "tester"), Err(FunnelError::Validation(_))));

        let funnel = demo_funnel(&store);
        let mut pages = funnel.pages.clone();
        pages[0].next_page_id = Some("missing".into());
        store
            .update_funnel(funnel.id, UpdateFunnelRequest { pages: Some(pages), ..Default::default() }, "tester")
            .unwrap();
        assert!(store.publish_funnel(funnel.id, "tester").is_err());

        store
            .update_funnel(funnel.id, UpdateFunnelRequest { pages: Some(demo::quiz_funnel_pages()), ..Default::default() }, "tester")
            .unwrap();
        let published = store.publish_funnel(funnel.id, "tester").unwrap();
        assert_eq!(published.status, FunnelStatus::Published);
    }

    #[test]
    fn test_apply_edits_saves_result() {
        let store = store();
        let funnel = demo_funnel(&store);
        let session = store
            .apply_edits(
                funnel.id,
                EditFunnelRequest {
                    page_id: Some("contact".into()),
                    actions: vec![funnel_editor::EditorAction::AddElement {
                        element: ElementKind::Divider,
                        index: Some(0),
                    }],
                },
                "tester",
            )
            .unwrap();
        assert_eq!(session.current_page_id.as_deref(), Some("contact"));

        let saved = store.get_funnel(funnel.id).unwrap();
        let contact = saved.page("contact").unwrap();
        assert_eq!(contact.elements.len(), 2);
        assert_eq!(contact.elements[0].kind, ElementKind::Divider);
    }

    #[test]
    fn test_apply_edits_never_recreates_deleted_funnel() {
        let store = store();
        let funnel = demo_funnel(&store);
        let edit = || EditFunnelRequest {
            page_id: Some("contact".into()),
            actions: vec![funnel_editor::EditorAction::AddElement { element: ElementKind::Divider, index: None }],
        };

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        let _ = store.apply_edits(funnel.id, edit(), "tester");
                    }
                });
            }
            scope.spawn(|| store.delete_funnel(funnel.id, "tester").unwrap());
        });

        assert!(matches!(store.get_funnel(funnel.id), Err(FunnelError::NotFound { .. })));
        assert!(matches!(store.apply_edits(funnel.id, edit(), "tester"), Err(FunnelError::NotFound { .. })));
        assert!(store.list_funnels().is_empty());
    }

    #[test]
    fn test_quiz_result_through_store() {
        let store = store();
        let funnel = demo_funnel(&store);
        let req = QuizResultRequest {
            answers: [("q1".to_string(), "a2".to_string()), ("q2".to_string(), "a2".to_string())]
                .into_iter()
                .collect(),
        };
        let resp = store.quiz_result(funnel.id, "quiz", "skin-quiz", &req).unwrap();
        assert_eq!(resp.result.unwrap().id, "oily");
        assert_eq!(resp.score.points_for("oily"), 5);
        assert_eq!(resp.score.points_for("dry"), 1);

        assert!(matches!(
            store.quiz_result(funnel.id, "welcome", "headline", &req),
            Err(FunnelError::Validation(_))
        ));
    }

    #[test]
    fn test_routing_through_store() {
        let store = store();
        let funnel = demo_funnel(&store);
        let next = store.route(funnel.id, "quiz", &RouteRequest::default()).unwrap();
        assert_eq!(next, NextPage::Page { page_id: "contact".into() });
        assert!(store.route(funnel.id, "nope", &RouteRequest::default()).is_err());
    }

    #[test]
    fn test_ab_test_flow_and_lead_conversion() {
        let sink = capture_sink();
        let store = store().with_event_sink(sink.clone());
        let funnel = demo_funnel(&store);

        let test = store
            .create_ab_test(funnel.id, CreateAbTestRequest { page_id: "welcome".into(), name: "Headline".into(), config: None })
            .unwrap();
        assert!(store
            .create_ab_test(funnel.id, CreateAbTestRequest { page_id: "welcome".into(), name: "Again".into(), config: None })
            .is_err());

        let test = store.add_variant(funnel.id, &test.id).unwrap();
        assert_eq!(test.variants.len(), 3);
        let test = store.add_variant(funnel.id, &test.id).unwrap();
        assert!(matches!(store.add_variant(funnel.id, &test.id), Err(FunnelError::Validation(_))));

        let test = store.delete_variant(funnel.id, &test.id, &test.variants[3].id.clone()).unwrap();
        assert_eq!(test.total_allocation(), 100);
        let test = store.set_allocation(funnel.id, &test.id, &test.variants[0].id.clone(), 60).unwrap();
        assert_eq!(test.variants[0].traffic_allocation, 60);

        let test = store.transition_test(funnel.id, &test.id, TestCommand::Start, "tester").unwrap();
        assert_eq!(test.status, AbTestStatus::Running);

        let view = store
            .record_page_view(funnel.id, &PageViewRequest { page_id: "welcome".into(), visitor_id: "visitor-1".into() })
            .unwrap();
        assert_eq!(view.progress_label, "Schritt 1 von 4");
        assert_eq!(view.progress_percent, 25);
        let assignment = view.assignment.unwrap();

        let lead = store
            .capture_lead(
                funnel.id,
                CreateLeadRequest {
                    fields: [("email".to_string(), FieldValue::Text("a@b.c".into()))].into_iter().collect(),
                    quiz_answers: [("q1".to_string(), "a1".to_string())].into_iter().collect(),
                    variant_assignments: [(assignment.test_id.clone(), assignment.variant_id.clone())].into_iter().collect(),
                },
            )
            .unwrap();
        assert_eq!(lead.quiz_result_id.as_deref(), Some("dry"));

        let eval = store.evaluate_test(funnel.id, &test.id).unwrap();
        let assigned = eval.variants.iter().find(|v| v.variant_id == assignment.variant_id).unwrap();
        assert_eq!(assigned.views, 1);
        assert_eq!(assigned.conversions, 1);

        let done = store
            .transition_test(funnel.id, &test.id, TestCommand::Complete { winner_id: assignment.variant_id.clone() }, "tester")
            .unwrap();
        assert_eq!(done.winner_id, Some(assignment.variant_id));
        assert!(matches!(
            store.transition_test(funnel.id, &test.id, TestCommand::Resume, "tester"),
            Err(FunnelError::InvalidTransition { .. })
        ));

        assert_eq!(sink.count_type(EventType::VariantAssigned), 1);
        assert_eq!(sink.count_type(EventType::VariantConverted), 1);
        assert_eq!(sink.count_type(EventType::LeadCaptured), 1);
        assert_eq!(sink.count_type(EventType::AbTestCompleted), 1);
    }

    #[test]
    fn test_stats_and_overview() {
        let store = store();
        let funnel = demo_funnel(&store);
        for visitor in ["a", "b", "c", "d"] {
            store
                .record_page_view(funnel.id, &PageViewRequest { page_id: "welcome".into(), visitor_id: visitor.into() })
                .unwrap();
        }
        store.capture_lead(funnel.id, CreateLeadRequest::default()).unwrap();

        let stats = store.funnel_stats(funnel.id).unwrap();
        assert_eq!(stats.total_views, 4);
        assert_eq!(stats.leads, 1);
        assert!((stats.conversion_rate - 0.25).abs() < 1e-9);

        let overview = store.admin_overview();
        assert_eq!(overview.total_funnels, 1);
        assert_eq!(overview.draft_funnels, 1);
        assert_eq!(overview.total_leads, 1);
        assert_eq!(overview.total_views, 4);
    }

    #[test]
    fn test_template_instantiation() {
        let store = store();
        store.seed_demo_data();
        let templates = store.list_templates();
        assert_eq!(templates.len(), 1);

        let funnel = store
            .instantiate_template(templates[0].id, InstantiateTemplateRequest { name: Some("Mine".into()) }, "tester")
            .unwrap();
        assert_eq!(funnel.name, "Mine");
        assert_eq!(funnel.status, FunnelStatus::Draft);
        assert_eq!(funnel.pages, templates[0].pages);
        assert_eq!(store.list_funnels().len(), 2);
    }

    fn draft_test(store: &ManagementStore, funnel: &Funnel) -> AbTest {
        store
            .create_ab_test(funnel.id, CreateAbTestRequest { page_id: "welcome".into(), name: "Headline".into(), config: None })
            .unwrap()
    }

    #[test]
    fn test_update_rejects_invalid_ab_tests() {
        let store = store();
        let funnel = demo_funnel(&store);
        let test = draft_test(&store, &funnel);
        let before = store.get_funnel(funnel.id).unwrap();

        let mut tampered = test.clone();
        tampered.status = AbTestStatus::Running;
        tampered.variants = (0..5)
            .map(|i| funnel_core::types::AbTestVariant {
                id: format!("v{i}"),
                name: format!("Variant {i}"),
                title: None,
                traffic_allocation: 22,
                views: 0,
                conversions: 0,
            })
            .collect();
        let err = store
            .update_funnel(
                funnel.id,
                UpdateFunnelRequest { name: Some("Renamed".into()), ab_tests: Some(vec![tampered.clone()]), ..Default::default() },
                "tester",
            )
            .unwrap_err();
        assert!(matches!(err, FunnelError::Validation(_)));

        tampered.variants.truncate(4);
        tampered.status = AbTestStatus::Draft;
        assert!(matches!(
            store.update_funnel(funnel.id, UpdateFunnelRequest { ab_tests: Some(vec![tampered]), ..Default::default() }, "tester"),
            Err(FunnelError::Validation(_))
        ));

        let mut orphan = test.clone();
        orphan.page_id = "nowhere".into();
        assert!(store
            .update_funnel(funnel.id, UpdateFunnelRequest { ab_tests: Some(vec![orphan]), ..Default::default() }, "tester")
            .is_err());

        assert_eq!(store.get_funnel(funnel.id).unwrap(), before);
    }

    #[test]
    fn test_update_cannot_change_test_status() {
        let store = store();
        let funnel = demo_funnel(&store);
        let test = draft_test(&store, &funnel);

        let mut started = test.clone();
        started.status = AbTestStatus::Running;
        assert!(matches!(
            store.update_funnel(funnel.id, UpdateFunnelRequest { ab_tests: Some(vec![started]), ..Default::default() }, "tester"),
            Err(FunnelError::InvalidTransition { .. })
        ));

        let mut fresh = test.clone();
        fresh.id = "ab-fresh".into();
        fresh.page_id = "contact".into();
        fresh.status = AbTestStatus::Completed;
        assert!(matches!(
            store.update_funnel(funnel.id, UpdateFunnelRequest { ab_tests: Some(vec![test.clone(), fresh]), ..Default::default() }, "tester"),
            Err(FunnelError::Validation(_))
        ));
        assert_eq!(store.get_funnel(funnel.id).unwrap().ab_tests[0].status, AbTestStatus::Draft);

        store.transition_test(funnel.id, &test.id, TestCommand::Start, "tester").unwrap();
        store
            .record_page_view(funnel.id, &PageViewRequest { page_id: "welcome".into(), visitor_id: "visitor-1".into() })
            .unwrap();

        // a stale copy may rename the test but keeps status and counters
        let mut renamed = test.clone();
        renamed.name = "Hero copy".into();
        renamed.status = AbTestStatus::Running;
        let updated = store
            .update_funnel(funnel.id, UpdateFunnelRequest { ab_tests: Some(vec![renamed]), ..Default::default() }, "tester")
            .unwrap();
        let saved = &updated.ab_tests[0];
        assert_eq!(saved.name, "Hero copy");
        assert_eq!(saved.status, AbTestStatus::Running);
        assert_eq!(saved.variants.iter().map(|v| v.views).sum::<u64>(), 1);
    }

    #[test]
    fn test_update_keeps_published_funnel_valid() {
        let store = store();
        let funnel = demo_funnel(&store);
        store.publish_funnel(funnel.id, "tester").unwrap();

        let mut pages = funnel.pages.clone();
        pages[0].next_page_id = Some("missing".into());
        assert!(matches!(
            store.update_funnel(funnel.id, UpdateFunnelRequest { pages: Some(pages), ..Default::default() }, "tester"),
            Err(FunnelError::Validation(_))
        ));

        let archived = store.archive_funnel(funnel.id, "tester").unwrap();
        assert_eq!(archived.status, FunnelStatus::Archived);
        assert_eq!(archived.pages, funnel.pages);
    }

    #[test]
    fn test_resume_on_draft_test_is_rejected() {
        let store = store();
        let funnel = demo_funnel(&store);
        let test = draft_test(&store, &funnel);

        assert!(matches!(
            store.transition_test(funnel.id, &test.id, TestCommand::Resume, "tester"),
            Err(FunnelError::InvalidTransition { .. })
        ));
        let stored = store.get_funnel(funnel.id).unwrap();
        assert_eq!(stored.ab_tests[0].status, AbTestStatus::Draft);

        let started = store.transition_test(funnel.id, &test.id, TestCommand::Start, "tester").unwrap();
        assert_eq!(started.status, AbTestStatus::Running);
    }
}
