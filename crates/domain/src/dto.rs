//! Wire DTOs for the placement API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::catalog::{AssessmentItem, ItemType};
use crate::entities::ResponsePayload;

/// Item content as exposed to clients. Never carries the correct answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicItemContent {
    pub item: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

/// An assessment item stripped of scoring data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicItem {
    pub id: Uuid,
    pub content: PublicItemContent,
    pub item_type: ItemType,
    pub skill_area: Vec<String>,
    pub target_proficiency_level: String,
}

impl From<&AssessmentItem> for PublicItem {
    fn from(item: &AssessmentItem) -> Self {
        Self {
            id: item.id,
            content: PublicItemContent {
                item: item.content.item.clone(),
                options: item.content.options.clone(),
                instruction: item.content.instruction.clone(),
            },
            item_type: item.item_type,
            skill_area: item.skill_area.clone(),
            target_proficiency_level: item.target_proficiency_level.clone(),
        }
    }
}

/// Session progress reported with every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub questions_completed: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_questions: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_error: Option<f64>,
}

/// Use-case result of starting (or resuming) a placement session.
#[derive(Debug, Clone, Serialize)]
pub struct StartPlacementResult {
    pub session_id: Uuid,
    pub first_question: PublicItem,
    pub progress: Progress,
}

/// Use-case result of submitting an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitAnswerOutcome {
    pub next_question: Option<PublicItem>,
    pub progress: Progress,
    pub is_complete: bool,
    pub is_correct: bool,
}

/// Request body for the answer endpoint.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(nested)]
    pub response_data: ResponsePayload,
    /// Seconds the client reports the taker spent on the question.
    #[validate(range(min = 0))]
    pub time_taken: Option<i32>,
}

/// Response body for the start endpoint.
#[derive(Debug, Serialize)]
pub struct StartPlacementResponse {
    pub session_id: Uuid,
    pub first_question: PublicItem,
    pub progress: Progress,
}

/// Response body for the answer endpoint.
#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<PublicItem>,
    pub progress: Progress,
    pub assessment_complete: bool,
}
