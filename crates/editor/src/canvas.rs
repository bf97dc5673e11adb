//! Canvas reordering for elements and pages.
//!
//! All operations return a new vector and leave the input untouched. Drop
//! zones enumerate `0..=n` for a list of `n` items.

use funnel_core::types::{FunnelPage, PageElement};

use crate::ids::generate_id;

/// Anything on the canvas that carries a string id.
pub trait Identified: Clone {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn id_prefix(&self) -> &str;
}

impl Identified for PageElement {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn id_prefix(&self) -> &str {
        self.kind.type_name()
    }
}

impl Identified for FunnelPage {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn id_prefix(&self) -> &str {
        "page"
    }
}

pub fn position_of<T: Identified>(items: &[T], id: &str) -> Option<usize> {
    items.iter().position(|item| item.id() == id)
}

/// Swaps the item with its predecessor; no-op for the first item.
pub fn move_up<T: Clone>(items: &[T], index: usize) -> Vec<T> {
    let mut out = items.to_vec();
    if index > 0 && index < out.len() {
        out.swap(index - 1, index);
    }
    out
}

/// Swaps the item with its successor; no-op for the last item.
pub fn move_down<T: Clone>(items: &[T], index: usize) -> Vec<T> {
    let mut out = items.to_vec();
    if index + 1 < out.len() {
        out.swap(index, index + 1);
    }
    out
}

/// Drags the item at `from` onto drop zone `to`.
///
/// Removing the source shifts everything after it left by one, so a drop
/// zone past the source lands at `to - 1`.
pub fn move_element<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut out = items.to_vec();
    if from >= out.len() {
        return out;
    }
    let to = to.min(out.len());
    let target = if to > from { to - 1 } else { to };

    let item = out.remove(from);
    out.insert(target, item);
    out
}

/// Inserts `item` so that it ends up at drop zone `index`.
pub fn insert_at<T: Clone>(items: &[T], index: usize, item: T) -> Vec<T> {
    let mut out = items.to_vec();
    let index = index.min(out.len());
    out.insert(index, item);
    out
}

/// Clones the item with `id` under a fresh id and places the copy right
/// after the original.
pub fn duplicate_element<T: Identified>(items: &[T], id: &str) -> Vec<T> {
    duplicate_with(items, id, |candidate| {
        items.iter().any(|item| item.id() == candidate)
    })
}

/// Like [`duplicate_element`], but the fresh id must also pass `taken`,
/// e.g. to avoid ids used by elements nested in sections.
pub fn duplicate_with<T: Identified>(
    items: &[T],
    id: &str,
    taken: impl Fn(&str) -> bool,
) -> Vec<T> {
    let mut out = items.to_vec();
    let Some(index) = position_of(items, id) else {
        return out;
    };

    let mut copy = items[index].clone();
    let new_id = generate_id(copy.id_prefix(), |candidate| {
        taken(candidate) || items.iter().any(|item| item.id() == candidate)
    });
    copy.set_id(new_id);
    out.insert(index + 1, copy);
    out
}

pub fn delete_element<T: Identified>(items: &[T], id: &str) -> Vec<T> {
    items.iter().filter(|item| item.id() != id).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::types::{ElementKind, HeadingElement, PageType, TextElement};

    fn heading(id: &str) -> PageElement {
        PageElement::new(
            id,
            ElementKind::Heading(HeadingElement {
                text: id.to_uppercase(),
                level: 2,
            }),
        )
    }

    fn ids<T: Identified>(items: &[T]) -> Vec<String> {
        items.iter().map(|i| i.id().to_string()).collect()
    }

    fn abc() -> Vec<PageElement> {
        vec![heading("a"), heading("b"), heading("c")]
    }

    #[test]
    fn test_move_up_and_down() {
        let items = abc();
        assert_eq!(ids(&move_up(&items, 1)), ["b", "a", "c"]);
        assert_eq!(ids(&move_down(&items, 1)), ["a", "c", "b"]);
    }

    #[test]
    fn test_move_at_boundaries_is_noop() {
        let items = abc();
        assert_eq!(move_up(&items, 0), items);
        assert_eq!(move_down(&items, 2), items);
        assert_eq!(move_down(&items, 7), items);
    }

    #[test]
    fn test_move_element_forward_compensates_for_removal() {
        let items = abc();
        assert_eq!(ids(&move_element(&items, 0, 2)), ["b", "a", "c"]);
        assert_eq!(ids(&move_element(&items, 0, 3)), ["b", "c", "a"]);
    }

    #[test]
    fn test_move_element_backward() {
        let items = abc();
        assert_eq!(ids(&move_element(&items, 2, 0)), ["c", "a", "b"]);
        assert_eq!(ids(&move_element(&items, 2, 1)), ["a", "c", "b"]);
    }

    #[test]
    fn test_move_to_own_position_is_noop() {
        let items = abc();
        for i in 0..items.len() {
            assert_eq!(move_element(&items, i, i), items);
            // the zone directly after an item is also its own position
            assert_eq!(move_element(&items, i, i + 1), items);
        }
    }

    #[test]
    fn test_move_out_of_range() {
        let items = abc();
        assert_eq!(move_element(&items, 5, 0), items);
        assert_eq!(ids(&move_element(&items, 0, 99)), ["b", "c", "a"]);
    }

    #[test]
    fn test_insert_at_drop_zones() {
        let items = abc();
        assert_eq!(ids(&insert_at(&items, 0, heading("x"))), ["x", "a", "b", "c"]);
        assert_eq!(ids(&insert_at(&items, 2, heading("x"))), ["a", "b", "x", "c"]);
        assert_eq!(ids(&insert_at(&items, 3, heading("x"))), ["a", "b", "c", "x"]);
        assert_eq!(ids(&insert_at(&items, 10, heading("x"))), ["a", "b", "c", "x"]);
    }

    #[test]
    fn test_duplicate_inserts_after_source_with_new_id() {
        let items = abc();
        let out = duplicate_element(&items, "b");
        assert_eq!(out.len(), 4);
        assert_eq!(out[1].id, "b");
        assert_eq!(out[3].id, "c");
        assert_ne!(out[2].id, "b");
        assert!(out[2].id.starts_with("heading-"));
        assert_eq!(out[2].kind, out[1].kind);
    }

    #[test]
    fn test_duplicate_ids_never_collide() {
        let mut items = vec![PageElement::new(
            "t",
            ElementKind::Text(TextElement { content: "x".into() }),
        )];
        for _ in 0..50 {
            items = duplicate_element(&items, "t");
        }
        let mut unique = ids(&items);
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 51);
    }

    #[test]
    fn test_duplicate_with_consults_outer_ids() {
        use std::cell::RefCell;

        let items = abc();
        let rejected = RefCell::new(Vec::new());
        let out = duplicate_with(&items, "a", |candidate| {
            let mut seen = rejected.borrow_mut();
            if seen.len() < 3 {
                seen.push(candidate.to_string());
                true
            } else {
                false
            }
        });

        assert_eq!(out.len(), 4);
        assert_eq!(rejected.borrow().len(), 3);
        assert!(!rejected.borrow().contains(&out[1].id));
        assert!(out[1].id.starts_with("heading-"));
    }

    #[test]
    fn test_duplicate_unknown_is_noop() {
        let items = abc();
        assert_eq!(duplicate_element(&items, "zzz"), items);
    }

    #[test]
    fn test_delete() {
        let items = abc();
        assert_eq!(ids(&delete_element(&items, "b")), ["a", "c"]);
        assert_eq!(delete_element(&items, "zzz"), items);
    }

    #[test]
    fn test_pages_are_reorderable() {
        let pages = vec![
            FunnelPage::new("welcome", PageType::Welcome, "Hi"),
            FunnelPage::new("thanks", PageType::Thankyou, "Bye"),
        ];
        let out = duplicate_element(&pages, "welcome");
        assert!(out[1].id.starts_with("page-"));
        assert_eq!(ids(&move_element(&pages, 1, 0)), ["thanks", "welcome"]);
    }
}
