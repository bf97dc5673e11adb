//! Conditional page routing evaluated when a visitor leaves a page.

use std::collections::HashMap;

use funnel_core::types::{ConditionOperator, FieldValue, Funnel, FunnelPage, PageCondition};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NextPage {
    Page {
        #[serde(rename = "pageId")]
        page_id: String,
    },
    End,
}

/// Evaluates one condition against the submitted values (element id →
/// value). A condition lacking a value only matches with `isEmpty`.
pub fn evaluate_condition(condition: &PageCondition, values: &HashMap<String, FieldValue>) -> bool {
    let submitted = values.get(&condition.element_id);

    match (condition.operator, condition.value.as_deref()) {
        (ConditionOperator::IsEmpty, _) => submitted.map_or(true, FieldValue::is_empty),
        (_, None) => false,
        (ConditionOperator::Equals, Some(expected)) => {
            submitted.is_some_and(|v| equals(v, expected))
        }
        (ConditionOperator::NotEquals, Some(expected)) => {
            !submitted.is_some_and(|v| equals(v, expected))
        }
        (ConditionOperator::Contains, Some(expected)) => {
            submitted.is_some_and(|v| contains(v, expected))
        }
    }
}

fn equals(value: &FieldValue, expected: &str) -> bool {
    match value {
        FieldValue::Text(s) => s == expected,
        FieldValue::Multiple(items) => items.iter().any(|i| i == expected),
    }
}

fn contains(value: &FieldValue, expected: &str) -> bool {
    match value {
        FieldValue::Text(s) => s.to_lowercase().contains(&expected.to_lowercase()),
        FieldValue::Multiple(items) => items.iter().any(|i| i == expected),
    }
}

/// Picks the page that follows `page_id`.
///
/// Order of precedence: the page's conditions (first match wins), the
/// legacy option → page map, `nextPageId`, then the next page in the
/// funnel. Targets that do not exist in the funnel are skipped.
pub fn next_page(funnel: &Funnel, page_id: &str, values: &HashMap<String, FieldValue>) -> NextPage {
    let Some(index) = funnel.page_index(page_id) else {
        warn!(funnel_id = %funnel.id, page_id, "Routing from unknown page");
        return NextPage::End;
    };
    let page = &funnel.pages[index];
    let exists = |target: &str| funnel.page(target).is_some();

    for condition in &page.conditions {
        if evaluate_condition(condition, values) {
            if exists(&condition.target_page_id) {
                debug!(page_id, target = %condition.target_page_id, "Condition matched");
                return NextPage::Page {
                    page_id: condition.target_page_id.clone(),
                };
            }
            warn!(page_id, target = %condition.target_page_id, "Condition targets unknown page");
        }
    }

    if let Some(target) = legacy_route(page, values).filter(|t| exists(t)) {
        return NextPage::Page { page_id: target };
    }

    if let Some(target) = page.next_page_id.as_deref().filter(|t| exists(t)) {
        return NextPage::Page {
            page_id: target.to_string(),
        };
    }

    match funnel.pages.get(index + 1) {
        Some(next) => NextPage::Page {
            page_id: next.id.clone(),
        },
        None => NextPage::End,
    }
}

fn legacy_route(page: &FunnelPage, values: &HashMap<String, FieldValue>) -> Option<String> {
    let routing = page.conditional_routing.as_ref()?;
    page.all_elements()
        .filter_map(|el| values.get(&el.id))
        .flat_map(|value| match value {
            FieldValue::Text(s) => vec![s.as_str()],
            FieldValue::Multiple(items) => items.iter().map(String::as_str).collect(),
        })
        .find_map(|option| routing.get(option).cloned())
}
