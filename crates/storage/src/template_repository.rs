//! Read-only repository for assessment templates.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use lingopath_domain::{
    AssessmentError, AssessmentTemplate, AssessmentType, TemplateRepository,
};

#[derive(Clone)]
pub struct PgTemplateRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    learning_pathway_id: Uuid,
    name: String,
    assessment_type: String,
    rubric: Option<Value>,
    meta: Option<Value>,
    version: i32,
    is_active: bool,
}

const TEMPLATE_COLUMNS: &str =
    "id, learning_pathway_id, name, assessment_type, rubric, meta, version, is_active";

impl PgTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for PgTemplateRepository {
    async fn get_template(
        &self,
        template_id: Uuid,
    ) -> Result<Option<AssessmentTemplate>, AssessmentError> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM assessment_templates WHERE id = $1"
        ))
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(template_to_domain).transpose()
    }

    async fn get_template_by_type_and_pathway(
        &self,
        assessment_type: AssessmentType,
        learning_pathway_id: Uuid,
    ) -> Result<Option<AssessmentTemplate>, AssessmentError> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM assessment_templates \
             WHERE assessment_type = $1 AND learning_pathway_id = $2 AND is_active = TRUE \
             LIMIT 1"
        ))
        .bind(assessment_type.as_str())
        .bind(learning_pathway_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(template_to_domain).transpose()
    }
}

fn template_to_domain(row: TemplateRow) -> Result<AssessmentTemplate, AssessmentError> {
    Ok(AssessmentTemplate {
        id: row.id,
        learning_pathway_id: row.learning_pathway_id,
        name: row.name,
        assessment_type: AssessmentType::parse(&row.assessment_type)
            .map_err(AssessmentError::Storage)?,
        rubric: row.rubric,
        meta: row.meta,
        version: row.version,
        is_active: row.is_active,
    })
}
