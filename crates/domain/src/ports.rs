//! Ports implemented by the storage layer and the runtime environment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::{AssessmentConfig, AssessmentItem, AssessmentTemplate, AssessmentType};
use crate::entities::AssignedAssessment;
use crate::errors::AssessmentError;

/// Repository for the [`AssignedAssessment`] aggregate root.
///
/// Loads and saves the complete aggregate: assignment, active session and its
/// responses. All session/response persistence goes through here.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Get the full aggregate by assignment ID.
    async fn get_by_id(
        &self,
        assigned_id: Uuid,
    ) -> Result<Option<AssignedAssessment>, AssessmentError>;

    /// Lookup the aggregate by session ID (used when the client only holds a
    /// session id, e.g. SubmitAnswer).
    async fn get_by_session_id(
        &self,
        session_id: Uuid,
    ) -> Result<Option<AssignedAssessment>, AssessmentError>;

    /// Get a pending assignment for a test taker and template.
    async fn get_pending_by_test_taker(
        &self,
        test_taker_id: &str,
        template_id: Uuid,
    ) -> Result<Option<AssignedAssessment>, AssessmentError>;

    /// Persist the entire aggregate atomically.
    async fn save(&self, assignment: &AssignedAssessment) -> Result<(), AssessmentError>;

    /// Insert a newly created assignment.
    async fn create(&self, assignment: &AssignedAssessment) -> Result<(), AssessmentError>;
}

/// Read-only access to assessment items.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Get an assessment item by ID.
    async fn get_item(&self, item_id: Uuid) -> Result<Option<AssessmentItem>, AssessmentError>;

    /// Get all items linked to a template.
    async fn get_items_by_template(
        &self,
        template_id: Uuid,
    ) -> Result<Vec<AssessmentItem>, AssessmentError>;

    /// Get active items for the template whose skill areas overlap
    /// `skill_areas` (all items when empty) and whose id is not excluded.
    async fn get_items_by_skill_areas(
        &self,
        template_id: Uuid,
        skill_areas: &[String],
        exclude_item_ids: &[Uuid],
    ) -> Result<Vec<AssessmentItem>, AssessmentError>;
}

/// Read-only access to assessment configurations.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Get assessment configuration by ID.
    async fn get_config(
        &self,
        config_id: Uuid,
    ) -> Result<Option<AssessmentConfig>, AssessmentError>;

    /// Get the active configuration for a template.
    async fn get_config_by_template(
        &self,
        template_id: Uuid,
    ) -> Result<Option<AssessmentConfig>, AssessmentError>;
}

/// Read-only access to assessment templates.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Get assessment template by ID.
    async fn get_template(
        &self,
        template_id: Uuid,
    ) -> Result<Option<AssessmentTemplate>, AssessmentError>;

    /// Get the active template of a given type within a learning pathway.
    async fn get_template_by_type_and_pathway(
        &self,
        assessment_type: AssessmentType,
        learning_pathway_id: Uuid,
    ) -> Result<Option<AssessmentTemplate>, AssessmentError>;
}

/// Wall-clock source, injectable for tests.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Process-wide system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
