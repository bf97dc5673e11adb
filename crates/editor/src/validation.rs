//! Structural checks run before a funnel is published.

use std::collections::HashSet;

use funnel_core::types::{Funnel, FunnelPage};
use serde::Serialize;

use crate::allocator::{MIN_VARIANTS, TOTAL_ALLOCATION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    DuplicatePageId,
    DuplicateElementId,
    UnknownConditionElement,
    MissingConditionValue,
    UnknownTargetPage,
    InvalidSectionWidth,
    TooFewVariants,
    InvalidAllocation,
    UnknownTestPage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    fn on_page(kind: IssueKind, page: &FunnelPage, message: String) -> Self {
        Self {
            kind,
            page_id: Some(page.id.clone()),
            message,
        }
    }
}

/// Checks one page against the set of page ids present in its funnel.
pub fn validate_page(page: &FunnelPage, known_pages: &HashSet<&str>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for element in page.all_elements() {
        if !seen.insert(element.id.as_str()) {
            issues.push(ValidationIssue::on_page(
                IssueKind::DuplicateElementId,
                page,
                format!("element id '{}' is used more than once", element.id),
            ));
        }
    }

    for condition in &page.conditions {
        if !seen.contains(condition.element_id.as_str()) {
            issues.push(ValidationIssue::on_page(
                IssueKind::UnknownConditionElement,
                page,
                format!("condition references unknown element '{}'", condition.element_id),
            ));
        }
        if condition.operator.requires_value() && condition.value.is_none() {
            issues.push(ValidationIssue::on_page(
                IssueKind::MissingConditionValue,
                page,
                format!("condition on '{}' needs a value", condition.element_id),
            ));
        }
        if !known_pages.contains(condition.target_page_id.as_str()) {
            issues.push(unknown_target(page, &condition.target_page_id));
        }
    }

    if let Some(routing) = &page.conditional_routing {
        for target in routing.values() {
            if !known_pages.contains(target.as_str()) {
                issues.push(unknown_target(page, target));
            }
        }
    }
    if let Some(target) = &page.next_page_id {
        if !known_pages.contains(target.as_str()) {
            issues.push(unknown_target(page, target));
        }
    }

    for section in &page.sections {
        let width: u32 = section.columns.iter().map(|c| c.width).sum();
        if !section.columns.is_empty() && width != 100 {
            issues.push(ValidationIssue::on_page(
                IssueKind::InvalidSectionWidth,
                page,
                format!("section '{}' columns span {}%", section.id, width),
            ));
        }
    }

    issues
}

fn unknown_target(page: &FunnelPage, target: &str) -> ValidationIssue {
    ValidationIssue::on_page(
        IssueKind::UnknownTargetPage,
        page,
        format!("routing targets unknown page '{}'", target),
    )
}

pub fn validate_funnel(funnel: &Funnel) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut known_pages = HashSet::new();
    for page in &funnel.pages {
        if !known_pages.insert(page.id.as_str()) {
            issues.push(ValidationIssue::on_page(
                IssueKind::DuplicatePageId,
                page,
                format!("page id '{}' is used more than once", page.id),
            ));
        }
    }

    for page in &funnel.pages {
        issues.extend(validate_page(page, &known_pages));
    }

    for test in &funnel.ab_tests {
        let issue = |kind, message| ValidationIssue {
            kind,
            page_id: Some(test.page_id.clone()),
            message,
        };
        if !known_pages.contains(test.page_id.as_str()) {
            issues.push(issue(
                IssueKind::UnknownTestPage,
                format!("A/B test '{}' is attached to unknown page", test.name),
            ));
        }
        if test.variants.len() < MIN_VARIANTS {
            issues.push(issue(
                IssueKind::TooFewVariants,
                format!("A/B test '{}' has {} variant(s)", test.name, test.variants.len()),
            ));
        }
        if test.total_allocation() != TOTAL_ALLOCATION {
            issues.push(issue(
                IssueKind::InvalidAllocation,
                format!(
                    "A/B test '{}' allocations sum to {}",
                    test.name,
                    test.total_allocation()
                ),
            ));
        }
    }

    issues
}
