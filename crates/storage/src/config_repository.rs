//! Read-only repository for assessment configurations.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use lingopath_domain::{
    AdaptiveParams, AssessmentConfig, AssessmentError, ConfigRepository, GeneralParams,
};

#[derive(Clone)]
pub struct PgConfigRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct ConfigRow {
    id: Uuid,
    template_id: Uuid,
    parameters: Option<Value>,
    adaptive_params: Option<Value>,
    is_active: bool,
}

impl PgConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigRepository for PgConfigRepository {
    async fn get_config(
        &self,
        config_id: Uuid,
    ) -> Result<Option<AssessmentConfig>, AssessmentError> {
        let row = sqlx::query_as::<_, ConfigRow>(
            "SELECT id, template_id, parameters, adaptive_params, is_active \
             FROM assessment_configs WHERE id = $1",
        )
        .bind(config_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(config_to_domain).transpose()
    }

    async fn get_config_by_template(
        &self,
        template_id: Uuid,
    ) -> Result<Option<AssessmentConfig>, AssessmentError> {
        let row = sqlx::query_as::<_, ConfigRow>(
            "SELECT id, template_id, parameters, adaptive_params, is_active \
             FROM assessment_configs \
             WHERE template_id = $1 AND is_active = TRUE \
             LIMIT 1",
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(config_to_domain).transpose()
    }
}

fn config_to_domain(row: ConfigRow) -> Result<AssessmentConfig, AssessmentError> {
    // Absent JSON falls back to the documented defaults.
    let parameters: GeneralParams = match row.parameters {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| AssessmentError::Storage(format!("invalid config parameters: {e}")))?,
        None => GeneralParams::default(),
    };
    let adaptive_params: AdaptiveParams = match row.adaptive_params {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| AssessmentError::Storage(format!("invalid adaptive params: {e}")))?,
        None => AdaptiveParams::default(),
    };

    Ok(AssessmentConfig {
        id: row.id,
        template_id: row.template_id,
        parameters,
        adaptive_params,
        is_active: row.is_active,
    })
}
