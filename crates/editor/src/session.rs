//! Editor session: the funnel being edited plus selection, clipboard and
//! save state, advanced by a reducer over `EditorAction`s.

use chrono::{DateTime, Utc};
use funnel_core::config::EditorConfig;
use funnel_core::types::{
    AbTest, AbTestStatus, AbTestVariant, ElementKind, Funnel, FunnelPage, PageElement, PageType,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::allocator;
use crate::canvas::{self, position_of};
use crate::ids::generate_id;
use crate::progress::FunnelProgress;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EditorAction {
    SelectPage {
        page_id: String,
    },
    SelectElement {
        element_id: Option<String>,
    },
    /// Adds an element to the current page at drop zone `index` (end when absent).
    AddElement {
        element: ElementKind,
        index: Option<usize>,
    },
    UpdateElement {
        element: PageElement,
    },
    MoveElement {
        from: usize,
        to: usize,
    },
    MoveElementUp {
        element_id: String,
    },
    MoveElementDown {
        element_id: String,
    },
    DuplicateElement {
        element_id: String,
    },
    DeleteElement {
        element_id: String,
    },
    CopyElement {
        element_id: String,
    },
    PasteElement {
        index: Option<usize>,
    },
    AddPage {
        page_type: PageType,
        title: String,
        index: Option<usize>,
    },
    UpdatePage {
        page: FunnelPage,
    },
    MovePage {
        from: usize,
        to: usize,
    },
    DuplicatePage {
        page_id: String,
    },
    DeletePage {
        page_id: String,
    },
    AddAbTest {
        page_id: String,
        name: String,
    },
    SetAllocation {
        test_id: String,
        variant_id: String,
        value: u32,
    },
    AddVariant {
        test_id: String,
    },
    DeleteVariant {
        test_id: String,
        variant_id: String,
    },
    MarkSaved {
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditorSession {
    pub funnel: Funnel,
    pub current_page_id: Option<String>,
    pub selected_element_id: Option<String>,
    pub clipboard: Option<PageElement>,
    pub dirty: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    max_variants: usize,
    autosave_interval_secs: u64,
}

impl EditorSession {
    pub fn new(funnel: Funnel, config: &EditorConfig) -> Self {
        let current_page_id = funnel.pages.first().map(|p| p.id.clone());
        Self {
            funnel,
            current_page_id,
            selected_element_id: None,
            clipboard: None,
            dirty: false,
            last_saved_at: None,
            max_variants: config.max_variants,
            autosave_interval_secs: config.autosave_interval_secs,
        }
    }

    pub fn current_page(&self) -> Option<&FunnelPage> {
        let id = self.current_page_id.as_deref()?;
        self.funnel.page(id)
    }

    pub fn selected_element(&self) -> Option<&PageElement> {
        let id = self.selected_element_id.as_deref()?;
        self.current_page()?.find_element(id)
    }

    pub fn progress(&self) -> Option<FunnelProgress> {
        let id = self.current_page_id.as_deref()?;
        let index = self.funnel.page_index(id)?;
        Some(FunnelProgress::new(index, self.funnel.pages.len()))
    }

    /// Unsaved changes exist and the autosave interval has elapsed since the
    /// last save.
    pub fn needs_autosave(&self, now: DateTime<Utc>) -> bool {
        self.dirty
            && self.last_saved_at.map_or(true, |saved| {
                (now - saved).num_seconds() >= self.autosave_interval_secs as i64
            })
    }

    /// Returns the session that results from applying `action`. Actions that
    /// reference unknown ids leave the session unchanged.
    pub fn reduce(&self, action: &EditorAction) -> EditorSession {
        let mut next = self.clone();
        next.apply(action);
        if next.funnel != self.funnel {
            next.dirty = true;
            next.funnel.touch();
        }
        debug!(funnel_id = %self.funnel.id, ?action, dirty = next.dirty, "Editor action applied");
        next
    }

    fn apply(&mut self, action: &EditorAction) {
        match action {
            EditorAction::SelectPage { page_id } => {
                if self.funnel.page(page_id).is_some() {
                    self.current_page_id = Some(page_id.clone());
                    self.selected_element_id = None;
                }
            }
            EditorAction::SelectElement { element_id } => match element_id {
                None => self.selected_element_id = None,
                Some(id) => {
                    if self.current_page().and_then(|p| p.find_element(id)).is_some() {
                        self.selected_element_id = Some(id.clone());
                    }
                }
            },
            EditorAction::AddElement { element, index } => {
                let Some(page) = self.current_page_mut() else {
                    return;
                };
                let id = generate_id(element.type_name(), |c| page.find_element(c).is_some());
                let index = index.unwrap_or(page.elements.len());
                page.elements = canvas::insert_at(
                    &page.elements,
                    index,
                    PageElement::new(id.clone(), element.clone()),
                );
                self.selected_element_id = Some(id);
            }
            EditorAction::UpdateElement { element } => {
                if let Some(page) = self.current_page_mut() {
                    let targets = page.elements.iter_mut().chain(
                        page.sections
                            .iter_mut()
                            .flat_map(|s| s.columns.iter_mut())
                            .flat_map(|c| c.elements.iter_mut()),
                    );
                    for existing in targets {
                        if existing.id == element.id {
                            *existing = element.clone();
                        }
                    }
                }
            }
            EditorAction::MoveElement { from, to } => {
                if let Some(page) = self.current_page_mut() {
                    page.elements = canvas::move_element(&page.elements, *from, *to);
                }
            }
            EditorAction::MoveElementUp { element_id } => {
                if let Some(page) = self.current_page_mut() {
                    if let Some(i) = position_of(&page.elements, element_id) {
                        page.elements = canvas::move_up(&page.elements, i);
                    }
                }
            }
            EditorAction::MoveElementDown { element_id } => {
                if let Some(page) = self.current_page_mut() {
                    if let Some(i) = position_of(&page.elements, element_id) {
                        page.elements = canvas::move_down(&page.elements, i);
                    }
                }
            }
            EditorAction::DuplicateElement { element_id } => {
                if let Some(page) = self.current_page_mut() {
                    if let Some(i) = position_of(&page.elements, element_id) {
                        page.elements = canvas::duplicate_with(&page.elements, element_id, |c| {
                            page.find_element(c).is_some()
                        });
                        let copy_id = page.elements[i + 1].id.clone();
                        self.selected_element_id = Some(copy_id);
                    }
                }
            }
            EditorAction::DeleteElement { element_id } => {
                if let Some(page) = self.current_page_mut() {
                    page.elements = canvas::delete_element(&page.elements, element_id);
                }
                if self.selected_element_id.as_ref() == Some(element_id) {
                    self.selected_element_id = None;
                }
            }
            EditorAction::CopyElement { element_id } => {
                let copied = self
                    .current_page()
                    .and_then(|p| p.find_element(element_id))
                    .cloned();
                if copied.is_some() {
                    self.clipboard = copied;
                }
            }
            EditorAction::PasteElement { index } => {
                let Some(copied) = self.clipboard.clone() else {
                    return;
                };
                let Some(page) = self.current_page_mut() else {
                    return;
                };
                let id = generate_id(copied.kind.type_name(), |c| page.find_element(c).is_some());
                let index = index.unwrap_or(page.elements.len());
                page.elements =
                    canvas::insert_at(&page.elements, index, PageElement::new(id.clone(), copied.kind));
                self.selected_element_id = Some(id);
            }
            EditorAction::AddPage {
                page_type,
                title,
                index,
            } => {
                let pages = &self.funnel.pages;
                let id = generate_id("page", |c| pages.iter().any(|p| p.id == c));
                let index = index.unwrap_or(pages.len());
                self.funnel.pages = canvas::insert_at(
                    &self.funnel.pages,
                    index,
                    FunnelPage::new(id.clone(), *page_type, title.clone()),
                );
                self.current_page_id = Some(id);
                self.selected_element_id = None;
            }
            EditorAction::UpdatePage { page } => {
                if let Some(existing) = self.funnel.pages.iter_mut().find(|p| p.id == page.id) {
                    *existing = page.clone();
                }
            }
            EditorAction::MovePage { from, to } => {
                self.funnel.pages = canvas::move_element(&self.funnel.pages, *from, *to);
            }
            EditorAction::DuplicatePage { page_id } => {
                self.funnel.pages = canvas::duplicate_element(&self.funnel.pages, page_id);
            }
            EditorAction::DeletePage { page_id } => self.delete_page(page_id),
            EditorAction::AddAbTest { page_id, name } => {
                let page_busy = self
                    .funnel
                    .ab_tests
                    .iter()
                    .any(|t| &t.page_id == page_id && t.status != AbTestStatus::Completed);
                if self.funnel.page(page_id).is_none() || page_busy {
                    return;
                }
                let tests = &self.funnel.ab_tests;
                let test = allocator::new_ab_test(page_id, name, |c| {
                    tests
                        .iter()
                        .any(|t| t.id == c || t.variants.iter().any(|v| v.id == c))
                });
                self.funnel.ab_tests.push(test);
            }
            EditorAction::SetAllocation {
                test_id,
                variant_id,
                value,
            } => {
                self.update_variants(test_id, |test| {
                    allocator::set_allocation(test, variant_id, *value)
                });
            }
            EditorAction::AddVariant { test_id } => {
                let max_variants = self.max_variants;
                self.update_variants(test_id, |test| {
                    if test.variants.len() >= max_variants {
                        test.variants.clone()
                    } else {
                        allocator::add_variant(test)
                    }
                });
            }
            EditorAction::DeleteVariant {
                test_id,
                variant_id,
            } => {
                self.update_variants(test_id, |test| allocator::delete_variant(test, variant_id));
                if let Some(test) = self.funnel.ab_test_mut(test_id) {
                    if test.winner_id.as_ref().is_some_and(|w| test.variant(w).is_none()) {
                        test.winner_id = None;
                    }
                }
            }
            EditorAction::MarkSaved { at } => {
                self.dirty = false;
                self.last_saved_at = Some(*at);
            }
        }
    }

    fn current_page_mut(&mut self) -> Option<&mut FunnelPage> {
        let id = self.current_page_id.as_deref()?;
        self.funnel.pages.iter_mut().find(|p| p.id == id)
    }

    /// Completed tests are frozen.
    fn update_variants(&mut self, test_id: &str, f: impl FnOnce(&AbTest) -> Vec<AbTestVariant>) {
        if let Some(test) = self.funnel.ab_test_mut(test_id) {
            if test.status != AbTestStatus::Completed {
                test.variants = f(test);
            }
        }
    }

    /// The last remaining page cannot be deleted.
    fn delete_page(&mut self, page_id: &str) {
        if self.funnel.pages.len() <= 1 {
            return;
        }
        let Some(index) = self.funnel.page_index(page_id) else {
            return;
        };
        self.funnel.pages = canvas::delete_element(&self.funnel.pages, page_id);
        self.funnel.ab_tests.retain(|t| t.page_id != page_id);

        if self.current_page_id.as_deref() == Some(page_id) {
            let fallback = index.saturating_sub(1).min(self.funnel.pages.len() - 1);
            self.current_page_id = Some(self.funnel.pages[fallback].id.clone());
            self.selected_element_id = None;
        }
    }
}
