//! Read-only repository for assessment items.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use lingopath_domain::{
    AssessmentError, AssessmentItem, ItemContent, ItemParameters, ItemRepository, ItemType,
};

#[derive(Clone)]
pub struct PgItemRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    content: Value,
    item_type: String,
    skill_area: Value,
    target_proficiency_level: String,
    parameters: Value,
    is_active: bool,
}

const ITEM_COLUMNS: &str =
    "id, content, item_type, skill_area, target_proficiency_level, parameters, is_active";
const ITEM_COLUMNS_QUALIFIED: &str = "i.id, i.content, i.item_type, i.skill_area, \
     i.target_proficiency_level, i.parameters, i.is_active";

impl PgItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    async fn get_item(&self, item_id: Uuid) -> Result<Option<AssessmentItem>, AssessmentError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM assessment_items WHERE id = $1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(item_to_domain).transpose()
    }

    async fn get_items_by_template(
        &self,
        template_id: Uuid,
    ) -> Result<Vec<AssessmentItem>, AssessmentError> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS_QUALIFIED} FROM assessment_items i \
             JOIN template_items ti ON ti.item_id = i.id \
             WHERE ti.template_id = $1 \
             ORDER BY i.id"
        ))
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(item_to_domain).collect()
    }

    async fn get_items_by_skill_areas(
        &self,
        template_id: Uuid,
        skill_areas: &[String],
        exclude_item_ids: &[Uuid],
    ) -> Result<Vec<AssessmentItem>, AssessmentError> {
        // An empty skill filter accepts every active item; rows are ordered so
        // the selector's tie-break stays deterministic.
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS_QUALIFIED} FROM assessment_items i \
             JOIN template_items ti ON ti.item_id = i.id \
             WHERE ti.template_id = $1 \
               AND i.is_active = TRUE \
               AND (cardinality($2::text[]) = 0 OR EXISTS ( \
                     SELECT 1 FROM jsonb_array_elements_text(i.skill_area) AS sa \
                     WHERE sa = ANY($2))) \
               AND i.id <> ALL($3) \
             ORDER BY i.id"
        ))
        .bind(template_id)
        .bind(skill_areas)
        .bind(exclude_item_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(item_to_domain).collect()
    }
}

fn item_to_domain(row: ItemRow) -> Result<AssessmentItem, AssessmentError> {
    let content: ItemContent = serde_json::from_value(row.content)
        .map_err(|e| AssessmentError::Storage(format!("invalid item content: {e}")))?;
    let skill_area: Vec<String> = serde_json::from_value(row.skill_area)
        .map_err(|e| AssessmentError::Storage(format!("invalid skill areas: {e}")))?;
    let parameters: ItemParameters = serde_json::from_value(row.parameters)
        .map_err(|e| AssessmentError::Storage(format!("invalid item parameters: {e}")))?;

    Ok(AssessmentItem {
        id: row.id,
        content,
        item_type: ItemType::parse(&row.item_type).map_err(AssessmentError::Storage)?,
        skill_area,
        target_proficiency_level: row.target_proficiency_level,
        parameters,
        is_active: row.is_active,
    })
}
