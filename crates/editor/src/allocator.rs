//! Traffic allocation across A/B test variants.
//!
//! Every function returns a fresh variant list whose allocations sum to 100.
//! Integer division leaves a remainder which is always placed on the last
//! variant in array order.

use funnel_core::types::{AbTest, AbTestConfig, AbTestStatus, AbTestVariant};
use tracing::debug;

use crate::ids::generate_id;

pub const TOTAL_ALLOCATION: u32 = 100;
/// Slider lower bound for a single variant.
pub const MIN_ALLOCATION: u32 = 10;
/// Slider upper bound for a single variant.
pub const MAX_ALLOCATION: u32 = 90;
pub const MIN_VARIANTS: usize = 2;

/// Creates a draft test with a control and one challenger at 50/50.
pub fn new_ab_test(page_id: &str, name: &str, taken: impl Fn(&str) -> bool) -> AbTest {
    let id = generate_id("test", &taken);
    let control = AbTestVariant {
        id: generate_id("variant", &taken),
        name: variant_label(0),
        title: None,
        traffic_allocation: TOTAL_ALLOCATION / 2,
        views: 0,
        conversions: 0,
    };
    let challenger = AbTestVariant {
        id: generate_id("variant", |c| taken(c) || c == control.id),
        name: variant_label(1),
        title: None,
        traffic_allocation: TOTAL_ALLOCATION / 2,
        views: 0,
        conversions: 0,
    };
    AbTest {
        id,
        page_id: page_id.to_string(),
        name: name.to_string(),
        variants: vec![control, challenger],
        status: AbTestStatus::Draft,
        config: AbTestConfig::default(),
        winner_id: None,
    }
}

/// Slider change: the edited variant gets exactly `new_value` (clamped to
/// the slider range) and the rest is split evenly across the others.
pub fn set_allocation(test: &AbTest, variant_id: &str, new_value: u32) -> Vec<AbTestVariant> {
    let mut variants = test.variants.clone();
    let n = variants.len();
    if n < MIN_VARIANTS {
        return variants;
    }
    let Some(edited) = variants.iter().position(|v| v.id == variant_id) else {
        return variants;
    };

    let value = new_value.clamp(MIN_ALLOCATION, MAX_ALLOCATION);
    let share = (TOTAL_ALLOCATION - value) / (n as u32 - 1);
    for (i, variant) in variants.iter_mut().enumerate() {
        variant.traffic_allocation = if i == edited { value } else { share };
    }

    // The edited value must stay exact, so when it is last the remainder
    // moves to the last of the other variants.
    let absorber = if edited == n - 1 { n - 2 } else { n - 1 };
    let remainder = TOTAL_ALLOCATION - sum(&variants);
    variants[absorber].traffic_allocation += remainder;

    debug!(test_id = %test.id, variant_id, value, remainder, "Traffic allocation updated");
    variants
}

/// Appends a variant and re-splits evenly. The caller enforces the variant
/// cap; this function produces a valid split for any count.
pub fn add_variant(test: &AbTest) -> Vec<AbTestVariant> {
    let mut variants = test.variants.clone();
    let n = variants.len() as u32;
    let even = TOTAL_ALLOCATION / (n + 1);
    for variant in variants.iter_mut() {
        variant.traffic_allocation = even;
    }

    let id = generate_id("variant", |c| test.variants.iter().any(|v| v.id == c));
    variants.push(AbTestVariant {
        id,
        name: variant_label(n as usize),
        title: None,
        traffic_allocation: TOTAL_ALLOCATION - even * n,
        views: 0,
        conversions: 0,
    });

    debug!(test_id = %test.id, variants = variants.len(), "Variant added");
    variants
}

/// Removes a variant unless that would leave fewer than two.
pub fn delete_variant(test: &AbTest, variant_id: &str) -> Vec<AbTestVariant> {
    let mut variants = test.variants.clone();
    if variants.len() <= MIN_VARIANTS {
        return variants;
    }
    let Some(index) = variants.iter().position(|v| v.id == variant_id) else {
        return variants;
    };
    variants.remove(index);

    let m = variants.len() as u32;
    let even = TOTAL_ALLOCATION / m;
    for variant in variants.iter_mut() {
        variant.traffic_allocation = even;
    }
    if let Some(last) = variants.last_mut() {
        last.traffic_allocation += TOTAL_ALLOCATION - even * m;
    }

    debug!(test_id = %test.id, variant_id, variants = variants.len(), "Variant deleted");
    variants
}

/// `Variant A`, `Variant B`, ... for the variant at `index`.
pub fn variant_label(index: usize) -> String {
    let letter = char::from(b'A' + (index % 26) as u8);
    format!("Variant {}", letter)
}

fn sum(variants: &[AbTestVariant]) -> u32 {
    variants.iter().map(|v| v.traffic_allocation).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn test_with(allocations: &[u32]) -> AbTest {
        let mut test = new_ab_test("p1", "Headline test", |_| false);
        test.variants = allocations
            .iter()
            .enumerate()
            .map(|(i, a)| AbTestVariant {
                id: format!("v{}", i),
                name: variant_label(i),
                title: None,
                traffic_allocation: *a,
                views: 0,
                conversions: 0,
            })
            .collect();
        test
    }

    fn allocations(variants: &[AbTestVariant]) -> Vec<u32> {
        variants.iter().map(|v| v.traffic_allocation).collect()
    }

    #[test]
    fn test_new_test_is_even_split() {
        let test = new_ab_test("p1", "Hero", |_| false);
        assert_eq!(test.variants.len(), 2);
        assert_eq!(test.total_allocation(), 100);
        assert_eq!(test.variants[0].name, "Variant A");
        assert_eq!(test.variants[1].name, "Variant B");
        assert_ne!(test.variants[0].id, test.variants[1].id);
        assert_eq!(test.status, AbTestStatus::Draft);
    }

    #[test]
    fn test_set_allocation_two_variants() {
        let test = test_with(&[50, 50]);
        let variants = set_allocation(&test, "v0", 70);
        assert_eq!(allocations(&variants), vec![70, 30]);
    }

    #[test]
    fn test_set_allocation_remainder_on_last() {
        let test = test_with(&[34, 33, 33]);
        let variants = set_allocation(&test, "v0", 25);
        // 75 / 2 = 37 each, remainder 1 on the last variant
        assert_eq!(allocations(&variants), vec![25, 37, 38]);
    }

    #[test]
    fn test_set_allocation_edited_last_keeps_exact_value() {
        let test = test_with(&[34, 33, 33]);
        let variants = set_allocation(&test, "v2", 25);
        assert_eq!(variants[2].traffic_allocation, 25);
        assert_eq!(allocations(&variants), vec![37, 38, 25]);
    }

    #[test]
    fn test_set_allocation_clamps_to_slider_range() {
        let test = test_with(&[50, 50]);
        assert_eq!(allocations(&set_allocation(&test, "v0", 99)), vec![90, 10]);
        assert_eq!(allocations(&set_allocation(&test, "v0", 0)), vec![10, 90]);
    }

    #[test]
    fn test_set_allocation_unknown_variant_is_noop() {
        let test = test_with(&[60, 40]);
        assert_eq!(set_allocation(&test, "nope", 20), test.variants);
    }

    #[test]
    fn test_add_variant_splits_evenly() {
        let test = test_with(&[50, 50]);
        let variants = add_variant(&test);
        assert_eq!(allocations(&variants), vec![33, 33, 34]);
        assert_eq!(variants[2].name, "Variant C");

        let mut test = test;
        test.variants = variants;
        let variants = add_variant(&test);
        assert_eq!(allocations(&variants), vec![25, 25, 25, 25]);
        assert_eq!(variants[3].name, "Variant D");
    }

    #[test]
    fn test_add_variant_beyond_cap_still_valid() {
        let test = test_with(&[25, 25, 25, 25]);
        let variants = add_variant(&test);
        assert_eq!(variants.len(), 5);
        assert_eq!(allocations(&variants), vec![20, 20, 20, 20, 20]);
    }

    #[test]
    fn test_delete_variant_resplits() {
        let test = test_with(&[25, 25, 25, 25]);
        let variants = delete_variant(&test, "v1");
        assert_eq!(variants.len(), 3);
        assert_eq!(allocations(&variants), vec![33, 33, 34]);
        assert_eq!(variants[2].id, "v3");
    }

    #[test]
    fn test_delete_variant_refuses_below_two() {
        let test = test_with(&[50, 50]);
        assert_eq!(delete_variant(&test, "v1"), test.variants);
    }

    #[test]
    fn test_allocation_sum_invariant_over_random_edits() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut test = test_with(&[50, 50]);

        for _ in 0..2000 {
            let n = test.variants.len();
            test.variants = match rng.gen_range(0..3) {
                0 => {
                    let target = test.variants[rng.gen_range(0..n)].id.clone();
                    set_allocation(&test, &target, rng.gen_range(0..=100))
                }
                1 if n < 6 => add_variant(&test),
                _ => {
                    let target = test.variants[rng.gen_range(0..n)].id.clone();
                    delete_variant(&test, &target)
                }
            };

            assert_eq!(test.total_allocation(), 100);
            assert!(test.variants.len() >= MIN_VARIANTS);
            assert!(test.variants.iter().all(|v| v.traffic_allocation <= 100));
        }
    }
}
