//! Visitor assignment and result evaluation for running A/B tests.

use funnel_core::types::{AbTest, AbTestStatus, AbTestVariant, GoalMetric};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

/// Deterministically buckets a visitor into a variant of a running test.
pub fn assign_variant<'a>(test: &'a AbTest, visitor_id: &str) -> Option<&'a AbTestVariant> {
    if test.status != AbTestStatus::Running {
        return None;
    }
    let hash = visitor_id
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    let bucket = (hash % 100) as u32;

    let mut cumulative = 0u32;
    for variant in &test.variants {
        cumulative += variant.traffic_allocation;
        if bucket < cumulative {
            return Some(variant);
        }
    }
    test.variants.last()
}

pub fn record_view(test: &mut AbTest, variant_id: &str) -> bool {
    match test.variants.iter_mut().find(|v| v.id == variant_id) {
        Some(variant) => {
            variant.views += 1;
            true
        }
        None => false,
    }
}

pub fn record_conversion(test: &mut AbTest, variant_id: &str) -> bool {
    match test.variants.iter_mut().find(|v| v.id == variant_id) {
        Some(variant) => {
            variant.conversions += 1;
            true
        }
        None => false,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantEvaluation {
    pub variant_id: String,
    pub name: String,
    pub is_control: bool,
    pub traffic_allocation: u32,
    pub views: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
    /// Relative improvement over the control's conversion rate.
    pub lift: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEvaluation {
    pub test_id: String,
    pub goal_metric: GoalMetric,
    pub variants: Vec<VariantEvaluation>,
    pub best_variant_id: Option<String>,
    /// Two-sided confidence that the best challenger differs from control.
    pub confidence: f64,
    pub total_views: u64,
    pub required_samples: u64,
    pub is_significant: bool,
}

/// Compares every challenger to the control and reports whether the best
/// one has reached the configured sample size and confidence.
pub fn evaluate(test: &AbTest) -> TestEvaluation {
    let control_rate = test.control().map(rate).unwrap_or(0.0);

    let variants: Vec<VariantEvaluation> = test
        .variants
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let conversion_rate = rate(v);
            let lift = if i > 0 && control_rate > 0.0 {
                (conversion_rate - control_rate) / control_rate
            } else {
                0.0
            };
            VariantEvaluation {
                variant_id: v.id.clone(),
                name: v.name.clone(),
                is_control: i == 0,
                traffic_allocation: v.traffic_allocation,
                views: v.views,
                conversions: v.conversions,
                conversion_rate,
                lift,
            }
        })
        .collect();

    let mut best: Option<&AbTestVariant> = None;
    for variant in test.variants.iter().skip(1) {
        if rate(variant) > best.map_or(control_rate, rate) {
            best = Some(variant);
        }
    }

    let confidence = match (test.control(), best) {
        (Some(control), Some(challenger)) => two_proportion_confidence(control, challenger),
        _ => 0.0,
    };
    let total_views: u64 = test.variants.iter().map(|v| v.views).sum();
    let is_significant = best.is_some()
        && total_views >= test.config.min_sample_size
        && confidence >= test.config.significance_threshold;

    TestEvaluation {
        test_id: test.id.clone(),
        goal_metric: test.config.goal_metric,
        variants,
        best_variant_id: best.map(|v| v.id.clone()),
        confidence,
        total_views,
        required_samples: test.config.min_sample_size,
        is_significant,
    }
}

fn rate(variant: &AbTestVariant) -> f64 {
    if variant.views == 0 {
        0.0
    } else {
        variant.conversions as f64 / variant.views as f64
    }
}

fn two_proportion_confidence(a: &AbTestVariant, b: &AbTestVariant) -> f64 {
    if a.views == 0 || b.views == 0 {
        return 0.0;
    }
    let (n1, n2) = (a.views as f64, b.views as f64);
    let pooled = (a.conversions + b.conversions) as f64 / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se == 0.0 {
        return 0.0;
    }
    let z = ((rate(b) - rate(a)) / se).abs();
    2.0 * normal_cdf(z) - 1.0
}

fn normal_cdf(x: f64) -> f64 {
    Normal::new(0.0, 1.0).map(|n| n.cdf(x)).unwrap_or(0.5)
}
