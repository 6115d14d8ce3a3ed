//! Placement test use cases: start (or resume) a session and submit answers.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::cat::CatService;
use crate::catalog::AssessmentConfig;
use crate::dto::{Progress, PublicItem, StartPlacementResult, SubmitAnswerOutcome};
use crate::entities::{AssignedAssessment, ResponsePayload};
use crate::errors::AssessmentError;
use crate::ports::{
    AssignmentRepository, Clock, ConfigRepository, ItemRepository, TemplateRepository,
};

/// Orchestrates the adaptive placement flow over the repository ports.
pub struct PlacementService {
    assignments: Arc<dyn AssignmentRepository>,
    items: Arc<dyn ItemRepository>,
    configs: Arc<dyn ConfigRepository>,
    templates: Arc<dyn TemplateRepository>,
    cat: CatService,
    clock: Arc<dyn Clock>,
}

impl PlacementService {
    pub fn new(
        assignments: Arc<dyn AssignmentRepository>,
        items: Arc<dyn ItemRepository>,
        configs: Arc<dyn ConfigRepository>,
        templates: Arc<dyn TemplateRepository>,
        cat: CatService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            assignments,
            items,
            configs,
            templates,
            cat,
            clock,
        }
    }

    /// Begin a placement session, or resume one that still has a pending
    /// question. Resumption makes this endpoint idempotent for retrying
    /// clients.
    #[instrument(skip(self), fields(assigned_id = %assigned_id))]
    pub async fn start_session(
        &self,
        assigned_id: Uuid,
    ) -> Result<StartPlacementResult, AssessmentError> {
        let mut assignment = self
            .assignments
            .get_by_id(assigned_id)
            .await?
            .ok_or_else(|| AssessmentError::AssignmentNotFound(assigned_id.to_string()))?;

        let template = self
            .templates
            .get_template(assignment.template_id)
            .await?
            .ok_or_else(|| {
                AssessmentError::ConfigurationNotFound(format!(
                    "template not found: {}",
                    assignment.template_id
                ))
            })?;

        let config = self
            .configs
            .get_config_by_template(template.id)
            .await?
            .ok_or_else(|| {
                AssessmentError::ConfigurationNotFound(format!(
                    "no config found for template: {}",
                    template.id
                ))
            })?;

        // Resume path: an active session with a pending question replays that
        // question without allocating new state.
        if let Some(session) = assignment.active_session() {
            if let Some(pending) = session.pending_response() {
                let question = self
                    .items
                    .get_item(pending.item_id)
                    .await?
                    .ok_or_else(|| {
                        AssessmentError::ItemNotFound(pending.item_id.to_string())
                    })?;

                info!(
                    session_id = %session.id,
                    item_id = %question.id,
                    "Resuming placement session with pending question"
                );

                return Ok(StartPlacementResult {
                    session_id: session.id,
                    first_question: PublicItem::from(&question),
                    progress: build_progress(&assignment, &config),
                });
            }
        }

        let now = self.clock.now();
        let expires_at = now + Duration::minutes(config.time_limit_minutes());
        let starting_ability = config.starting_ability();

        let session_id = Uuid::new_v4();
        assignment.start_session(
            session_id,
            now,
            expires_at,
            starting_ability,
            template.rubric.clone(),
            Some(json!({"template_id": template.id, "name": template.name})),
        )?;

        let skill_areas = config.skill_areas().to_vec();
        let available_items = self
            .items
            .get_items_by_skill_areas(template.id, &skill_areas, &[])
            .await?;

        let first_question = self
            .cat
            .select_next_item(starting_ability, &skill_areas, &[], &available_items)?
            .cloned()
            .ok_or_else(|| {
                AssessmentError::NoEligibleItems(
                    "no suitable questions available for assessment start".to_string(),
                )
            })?;

        assignment.present_question(Uuid::new_v4(), first_question.id, self.clock.now())?;

        self.assignments.save(&assignment).await?;

        info!(
            session_id = %session_id,
            first_item_id = %first_question.id,
            pool_size = available_items.len(),
            "Placement session started"
        );

        Ok(StartPlacementResult {
            session_id,
            first_question: PublicItem::from(&first_question),
            progress: build_progress(&assignment, &config),
        })
    }

    /// Score the pending answer, re-estimate ability and either present the
    /// next question or complete the assessment.
    #[instrument(skip(self, response_data), fields(session_id = %session_id))]
    pub async fn submit_answer(
        &self,
        session_id: Uuid,
        response_data: ResponsePayload,
        time_taken: Option<i32>,
    ) -> Result<SubmitAnswerOutcome, AssessmentError> {
        let now = self.clock.now();

        let mut assignment = self
            .assignments
            .get_by_session_id(session_id)
            .await?
            .ok_or_else(|| AssessmentError::SessionNotFound(session_id.to_string()))?;

        let (pending_item_id, previous) = {
            let session = assignment
                .session
                .as_ref()
                .ok_or_else(|| AssessmentError::SessionNotFound(session_id.to_string()))?;

            if session.is_terminated() {
                return Err(AssessmentError::Terminated(format!(
                    "session {} is {}",
                    session.id, session.status
                )));
            }
            if !session.can_accept_answer(now) {
                return Err(AssessmentError::InvalidState(format!(
                    "session {} cannot accept answers",
                    session.id
                )));
            }

            let pending = session.pending_response().ok_or_else(|| {
                AssessmentError::SessionNotFound(format!(
                    "no pending response for session {}",
                    session.id
                ))
            })?;

            if !response_data.is_valid() {
                return Err(AssessmentError::InvalidInput(
                    "response does not carry a selected option".to_string(),
                ));
            }

            let previous: Vec<(f64, Uuid)> = session
                .submitted_responses()
                .iter()
                .map(|r| (r.score(), r.item_id))
                .collect();

            (pending.item_id, previous)
        };

        let item = self
            .items
            .get_item(pending_item_id)
            .await?
            .ok_or_else(|| AssessmentError::ItemNotFound(pending_item_id.to_string()))?;

        let config = self
            .configs
            .get_config_by_template(assignment.template_id)
            .await?
            .ok_or_else(|| {
                AssessmentError::ConfigurationNotFound(
                    "no assessment configuration found".to_string(),
                )
            })?;

        let (score, is_correct) = self.cat.score_response(&item, &response_data)?;

        // Gather the response history; items deleted from the catalog since
        // they were answered drop out of the estimate.
        let mut previous_scores = Vec::with_capacity(previous.len());
        let mut previous_items = Vec::with_capacity(previous.len());
        for (response_score, item_id) in &previous {
            if let Some(previous_item) = self.items.get_item(*item_id).await? {
                previous_scores.push(*response_score);
                previous_items.push(previous_item);
            }
        }

        assignment.submit_response(response_data, is_correct, score, time_taken, now)?;

        let estimate =
            self.cat
                .process_response(&previous_scores, &previous_items, &item, score)?;
        assignment.update_ability_estimate(estimate.theta, Some(estimate.standard_error))?;

        let should_complete = match assignment.session.as_ref() {
            Some(session) => self.cat.check_termination(session, &config),
            None => false,
        };

        if should_complete {
            return self
                .complete(assignment, &config, estimate.theta, is_correct, "criteria met")
                .await;
        }

        self.advance_to_next_question(assignment, &config, estimate.theta, is_correct)
            .await
    }

    /// Present the next most informative question, or complete the session
    /// when the pool is exhausted.
    async fn advance_to_next_question(
        &self,
        mut assignment: AssignedAssessment,
        config: &AssessmentConfig,
        ability: f64,
        is_correct: bool,
    ) -> Result<SubmitAnswerOutcome, AssessmentError> {
        let answered_ids = assignment
            .session
            .as_ref()
            .map(|s| s.answered_item_ids())
            .unwrap_or_default();

        let skill_areas = config.skill_areas().to_vec();
        let available_items = self
            .items
            .get_items_by_skill_areas(assignment.template_id, &skill_areas, &answered_ids)
            .await?;

        let next_question = self
            .cat
            .select_next_item(ability, &skill_areas, &answered_ids, &available_items)?
            .cloned();

        match next_question {
            Some(question) => {
                assignment.present_question(Uuid::new_v4(), question.id, self.clock.now())?;
                self.assignments.save(&assignment).await?;

                Ok(SubmitAnswerOutcome {
                    next_question: Some(PublicItem::from(&question)),
                    progress: build_progress(&assignment, config),
                    is_complete: false,
                    is_correct,
                })
            }
            None => {
                self.complete(assignment, config, ability, is_correct, "item pool exhausted")
                    .await
            }
        }
    }

    async fn complete(
        &self,
        mut assignment: AssignedAssessment,
        config: &AssessmentConfig,
        ability: f64,
        is_correct: bool,
        reason: &str,
    ) -> Result<SubmitAnswerOutcome, AssessmentError> {
        assignment.complete_assessment(self.clock.now())?;
        self.assignments.save(&assignment).await?;

        info!(
            assigned_id = %assignment.id,
            questions_answered = assignment.questions_answered(),
            ability,
            band = config.band_for_ability(ability).unwrap_or("unmapped"),
            reason,
            "Placement assessment completed"
        );

        Ok(SubmitAnswerOutcome {
            next_question: None,
            progress: build_progress(&assignment, config),
            is_complete: true,
            is_correct,
        })
    }
}

fn build_progress(assignment: &AssignedAssessment, config: &AssessmentConfig) -> Progress {
    Progress {
        questions_completed: assignment.questions_answered(),
        max_questions: Some(config.max_questions()),
        estimated_remaining: None,
        current_ability: Some(assignment.current_ability()),
        standard_error: assignment.standard_error(),
    }
}
