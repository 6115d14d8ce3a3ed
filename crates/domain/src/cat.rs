//! Computerized adaptive testing service: item selection, response scoring
//! and termination checks on top of the psychometric kernel.

use std::sync::Arc;

use uuid::Uuid;

use crate::catalog::{AssessmentConfig, AssessmentItem};
use crate::entities::{AssessmentSession, ResponsePayload};
use crate::errors::AssessmentError;
use crate::irt::{AbilityEstimate, PsychometricModel};

pub struct CatService {
    model: Arc<dyn PsychometricModel>,
}

impl CatService {
    pub fn new(model: Arc<dyn PsychometricModel>) -> Self {
        Self { model }
    }

    /// Pick the most informative item at `ability` among active, unseen items
    /// matching `skill_areas` (an empty filter accepts every skill area).
    ///
    /// Ties resolve to the first candidate encountered, so the result is
    /// deterministic for a given pool ordering. `None` means the pool is
    /// exhausted.
    pub fn select_next_item<'a>(
        &self,
        ability: f64,
        skill_areas: &[String],
        used_item_ids: &[Uuid],
        available_items: &'a [AssessmentItem],
    ) -> Result<Option<&'a AssessmentItem>, AssessmentError> {
        let mut best: Option<(&AssessmentItem, f64)> = None;

        for item in available_items {
            if !item.is_active
                || !item.matches_skill_areas(skill_areas)
                || used_item_ids.contains(&item.id)
            {
                continue;
            }

            let information = self.model.information(ability, item)?;
            if best.is_none_or(|(_, max)| information > max) {
                best = Some((item, information));
            }
        }

        Ok(best.map(|(item, _)| item))
    }

    /// Re-estimate ability from all previously submitted responses plus the
    /// one just scored.
    pub fn process_response(
        &self,
        previous_scores: &[f64],
        previous_items: &[AssessmentItem],
        current_item: &AssessmentItem,
        current_score: f64,
    ) -> Result<AbilityEstimate, AssessmentError> {
        let mut scores = Vec::with_capacity(previous_scores.len() + 1);
        scores.extend_from_slice(previous_scores);
        scores.push(current_score);

        let mut items = Vec::with_capacity(previous_items.len() + 1);
        items.extend_from_slice(previous_items);
        items.push(current_item.clone());

        self.model.estimate_ability(&scores, &items)
    }

    /// MAP estimate over an arbitrary response history.
    pub fn estimate_ability(
        &self,
        scores: &[f64],
        items: &[AssessmentItem],
    ) -> Result<AbilityEstimate, AssessmentError> {
        self.model.estimate_ability(scores, items)
    }

    /// Termination policy, evaluated after each submission:
    /// below the minimum keep going, at the maximum stop, otherwise stop once
    /// the standard error reaches the configured precision.
    pub fn check_termination(
        &self,
        session: &AssessmentSession,
        config: &AssessmentConfig,
    ) -> bool {
        if !session.has_reached_min_questions(config.min_questions()) {
            return false;
        }
        if session.has_reached_max_questions(config.max_questions()) {
            return true;
        }
        session.has_sufficient_precision(config.stopping_standard_error())
    }

    /// Score a multiple-choice response: case-insensitive, whitespace-trimmed
    /// string equality against the item's correct answer.
    pub fn score_response(
        &self,
        item: &AssessmentItem,
        response_data: &ResponsePayload,
    ) -> Result<(f64, bool), AssessmentError> {
        let correct_answer = item.correct_answer().ok_or_else(|| {
            AssessmentError::InvalidInput(format!(
                "item {} carries no correct answer",
                item.id
            ))
        })?;
        let selected = response_data.selected_option.as_deref().ok_or_else(|| {
            AssessmentError::InvalidInput("response carries no selected option".to_string())
        })?;

        let is_correct =
            correct_answer.trim().to_lowercase() == selected.trim().to_lowercase();
        let score = if is_correct { 1.0 } else { 0.0 };

        Ok((score, is_correct))
    }
}
