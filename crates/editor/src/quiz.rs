//! Quiz scoring: sums per-answer point vectors and picks the winning result.

use std::collections::HashMap;

use funnel_core::types::{QuizConfig, QuizResult};
use serde::Serialize;

/// Accumulated points per result id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    pub totals: HashMap<String, i64>,
    /// Answers that referenced a known question and answer.
    pub counted_answers: usize,
}

impl QuizScore {
    pub fn points_for(&self, result_id: &str) -> i64 {
        self.totals.get(result_id).copied().unwrap_or(0)
    }
}

/// Sums points for `answers` (question id → answer id). Unknown question or
/// answer ids are skipped.
pub fn score_quiz(config: &QuizConfig, answers: &HashMap<String, String>) -> QuizScore {
    let mut score = QuizScore {
        totals: config.results.iter().map(|r| (r.id.clone(), 0)).collect(),
        counted_answers: 0,
    };

    for (question_id, answer_id) in answers {
        let Some(question) = config.questions.iter().find(|q| &q.id == question_id) else {
            continue;
        };
        let Some(answer) = question.answers.iter().find(|a| &a.id == answer_id) else {
            continue;
        };
        for (result_id, points) in &answer.points {
            *score.totals.entry(result_id.clone()).or_insert(0) += points;
        }
        score.counted_answers += 1;
    }

    score
}

/// Returns the result with the highest score. Ties go to the result that
/// appears first in `config.results`; `None` only when there are no results.
pub fn calculate_quiz_result<'a>(
    config: &'a QuizConfig,
    answers: &HashMap<String, String>,
) -> Option<&'a QuizResult> {
    let score = score_quiz(config, answers);
    best_result(config, &score)
}

pub fn best_result<'a>(config: &'a QuizConfig, score: &QuizScore) -> Option<&'a QuizResult> {
    let mut best: Option<(&QuizResult, i64)> = None;
    for result in &config.results {
        let points = score.points_for(&result.id);
        match best {
            Some((_, leader)) if points <= leader => {}
            _ => best = Some((result, points)),
        }
    }
    best.map(|(result, _)| result)
}
