//! Catalog value objects: items, templates and configs.
//!
//! These records are owned by the catalog service; the engine only reads them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AssessmentError;

const CEFR_LEVELS: [&str; 6] = ["A1", "A2", "B1", "B2", "C1", "C2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    MultipleChoice,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::MultipleChoice => "multiple_choice",
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "multiple_choice" => Ok(ItemType::MultipleChoice),
            _ => Err(format!("Unknown item type: {}", s)),
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content of a multiple-choice item. `correct_answer` never crosses the
/// public API boundary; see [`crate::dto::PublicItemContent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemContent {
    pub item: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

/// IRT parameters for an item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ItemParameters {
    #[serde(default = "default_discrimination")]
    pub discrimination: f64,
    #[serde(default)]
    pub difficulty: f64,
    /// Reserved for a future 3PL model; the 2PL kernel ignores it.
    #[serde(default = "default_guessing")]
    pub guessing: f64,
}

fn default_discrimination() -> f64 {
    1.0
}

fn default_guessing() -> f64 {
    0.25
}

impl Default for ItemParameters {
    fn default() -> Self {
        Self {
            discrimination: default_discrimination(),
            difficulty: 0.0,
            guessing: default_guessing(),
        }
    }
}

impl ItemParameters {
    /// All parameters must be finite before they reach the kernel.
    pub fn validate(&self) -> Result<(), AssessmentError> {
        if !self.discrimination.is_finite() || !self.difficulty.is_finite() {
            return Err(AssessmentError::InvalidInput(format!(
                "non-finite item parameters: a={}, b={}",
                self.discrimination, self.difficulty
            )));
        }
        Ok(())
    }
}

/// An assessment question with its psychometric parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentItem {
    pub id: Uuid,
    pub content: ItemContent,
    pub item_type: ItemType,
    pub skill_area: Vec<String>,
    pub target_proficiency_level: String,
    pub parameters: ItemParameters,
    pub is_active: bool,
}

impl AssessmentItem {
    pub fn discrimination(&self) -> f64 {
        self.parameters.discrimination
    }

    pub fn difficulty(&self) -> f64 {
        self.parameters.difficulty
    }

    pub fn correct_answer(&self) -> Option<&str> {
        self.content.correct_answer.as_deref()
    }

    /// Whether any of the item's skill areas appears in `skill_areas`.
    /// An empty filter accepts every item.
    pub fn matches_skill_areas(&self, skill_areas: &[String]) -> bool {
        if skill_areas.is_empty() {
            return true;
        }
        self.skill_area.iter().any(|s| skill_areas.contains(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentType {
    Placement,
    Speaking,
    Writing,
}

impl AssessmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentType::Placement => "PLACEMENT",
            AssessmentType::Speaking => "SPEAKING",
            AssessmentType::Writing => "WRITING",
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "PLACEMENT" => Ok(AssessmentType::Placement),
            "SPEAKING" => Ok(AssessmentType::Speaking),
            "WRITING" => Ok(AssessmentType::Writing),
            _ => Err(format!("Unknown assessment type: {}", s)),
        }
    }
}

impl std::fmt::Display for AssessmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An assessment template definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentTemplate {
    pub id: Uuid,
    pub learning_pathway_id: Uuid,
    pub name: String,
    pub assessment_type: AssessmentType,
    pub rubric: Option<Value>,
    pub meta: Option<Value>,
    pub version: i32,
    pub is_active: bool,
}

impl AssessmentTemplate {
    pub fn is_placement(&self) -> bool {
        self.assessment_type == AssessmentType::Placement
    }

    /// Proficiency levels from the rubric, falling back to the CEFR bands.
    pub fn proficiency_levels(&self) -> Vec<String> {
        self.rubric
            .as_ref()
            .and_then(|r| r.get("proficiency_levels"))
            .and_then(|levels| {
                serde_json::from_value::<Vec<String>>(levels.clone()).ok()
            })
            .unwrap_or_else(|| CEFR_LEVELS.iter().map(|s| s.to_string()).collect())
    }
}

/// Ability interval assigned to a proficiency band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProficiencyBand {
    pub min: f64,
    pub max: f64,
}

impl ProficiencyBand {
    pub fn contains(&self, theta: f64) -> bool {
        theta >= self.min && theta < self.max
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoppingCriterion {
    #[serde(default = "default_stopping_se")]
    pub standard_error: f64,
}

fn default_stopping_se() -> f64 {
    0.3
}

impl Default for StoppingCriterion {
    fn default() -> Self {
        Self {
            standard_error: default_stopping_se(),
        }
    }
}

/// Parameters steering the adaptive loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveParams {
    #[serde(default)]
    pub starting_ability: f64,
    #[serde(default = "default_min_questions")]
    pub min_questions: i32,
    #[serde(default = "default_max_questions")]
    pub max_questions: i32,
    #[serde(default)]
    pub stopping_criterion: StoppingCriterion,
    #[serde(default)]
    pub skill_areas: Vec<String>,
    #[serde(default)]
    pub proficiency_range: HashMap<String, ProficiencyBand>,
}

fn default_min_questions() -> i32 {
    5
}

fn default_max_questions() -> i32 {
    25
}

impl Default for AdaptiveParams {
    fn default() -> Self {
        Self {
            starting_ability: 0.0,
            min_questions: default_min_questions(),
            max_questions: default_max_questions(),
            stopping_criterion: StoppingCriterion::default(),
            skill_areas: Vec::new(),
            proficiency_range: HashMap::new(),
        }
    }
}

/// General (non-adaptive) session parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeneralParams {
    #[serde(default = "default_time_limit_minutes")]
    pub time_limit_minutes: i64,
}

fn default_time_limit_minutes() -> i64 {
    120
}

impl Default for GeneralParams {
    fn default() -> Self {
        Self {
            time_limit_minutes: default_time_limit_minutes(),
        }
    }
}

/// Configuration attached to a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    pub id: Uuid,
    pub template_id: Uuid,
    pub parameters: GeneralParams,
    pub adaptive_params: AdaptiveParams,
    pub is_active: bool,
}

impl AssessmentConfig {
    pub fn starting_ability(&self) -> f64 {
        self.adaptive_params.starting_ability
    }

    pub fn min_questions(&self) -> i32 {
        self.adaptive_params.min_questions
    }

    pub fn max_questions(&self) -> i32 {
        self.adaptive_params.max_questions
    }

    pub fn stopping_standard_error(&self) -> f64 {
        self.adaptive_params.stopping_criterion.standard_error
    }

    pub fn skill_areas(&self) -> &[String] {
        &self.adaptive_params.skill_areas
    }

    pub fn time_limit_minutes(&self) -> i64 {
        self.parameters.time_limit_minutes
    }

    pub fn has_valid_question_limits(&self) -> bool {
        self.min_questions() <= self.max_questions()
    }

    /// Band whose interval contains `theta`, if the config defines one.
    pub fn band_for_ability(&self, theta: f64) -> Option<&str> {
        self.adaptive_params
            .proficiency_range
            .iter()
            .find(|(_, band)| band.contains(theta))
            .map(|(name, _)| name.as_str())
    }
}
