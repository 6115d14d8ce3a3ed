//! Aggregate repository for assigned assessments.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use lingopath_domain::{
    AssessmentError, AssessmentResponse, AssessmentSession, AssignedAssessment, AssignmentRepository,
    AssignmentStatus, ResponsePayload, SessionStatus,
};

use crate::uow::SqlUnitOfWork;

/// SQL implementation of the [`AssignmentRepository`] port.
///
/// Loads and saves the complete aggregate: assignment, active session and its
/// responses. `save` runs inside one transaction and re-checks the session's
/// `questions_answered` under a row lock, so a submission that lost a race
/// against a concurrent request fails with a retryable conflict instead of
/// double-scoring.
#[derive(Clone)]
pub struct PgAssignmentRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    template_id: Uuid,
    test_taker_id: String,
    test_taker_type: String,
    assigned_by: Option<String>,
    assigned_at: NaiveDateTime,
    due_at: Option<NaiveDateTime>,
    status: String,
    notes: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    assigned_id: Uuid,
    current_ability: Option<Decimal>,
    standard_error: Option<Decimal>,
    questions_answered: i32,
    status: String,
    rubric_snapshot: Option<Value>,
    template_snapshot: Option<Value>,
    started_at: NaiveDateTime,
    completed_at: Option<NaiveDateTime>,
    expires_at: NaiveDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct ResponseRow {
    id: Uuid,
    session_id: Uuid,
    item_id: Uuid,
    response_data: Value,
    is_correct: Option<bool>,
    raw_score: Option<Decimal>,
    presented_at: NaiveDateTime,
    submitted_at: Option<NaiveDateTime>,
    time_taken: Option<i32>,
}

const SESSION_COLUMNS: &str = "id, assigned_id, current_ability, standard_error, \
     questions_answered, status, rubric_snapshot, template_snapshot, started_at, \
     completed_at, expires_at";

impl PgAssignmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_assignment_row(
        &self,
        assigned_id: Uuid,
    ) -> Result<Option<AssignmentRow>, AssessmentError> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            "SELECT id, template_id, test_taker_id, test_taker_type, assigned_by, \
                    assigned_at, due_at, status, notes \
             FROM assigned_assessments WHERE id = $1",
        )
        .bind(assigned_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn load_active_session(
        &self,
        assigned_id: Uuid,
    ) -> Result<Option<AssessmentSession>, AssessmentError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM assessment_sessions \
             WHERE assigned_id = $1 AND status = 'IN_PROGRESS' \
             ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(assigned_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate_session(row).await?)),
            None => Ok(None),
        }
    }

    async fn hydrate_session(
        &self,
        row: SessionRow,
    ) -> Result<AssessmentSession, AssessmentError> {
        let response_rows = sqlx::query_as::<_, ResponseRow>(
            "SELECT id, session_id, item_id, response_data, is_correct, raw_score, \
                    presented_at, submitted_at, time_taken \
             FROM assessment_responses WHERE session_id = $1 \
             ORDER BY presented_at ASC, id ASC",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let responses = response_rows
            .into_iter()
            .map(response_to_domain)
            .collect::<Result<Vec<_>, _>>()?;

        let pending = responses.iter().filter(|r| r.is_pending()).count();
        if pending > 1 {
            // Prior corruption; the aggregate resolves to the newest pending
            // response and the next save repairs the rest.
            tracing::warn!(
                session_id = %row.id,
                pending,
                "session carries multiple pending responses"
            );
        }

        session_to_domain(row, responses)
    }

    async fn save_session(
        &self,
        uow: &mut SqlUnitOfWork,
        session: &AssessmentSession,
    ) -> Result<(), AssessmentError> {
        let persisted: Option<(i32,)> = sqlx::query_as(
            "SELECT questions_answered FROM assessment_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(session.id)
        .fetch_optional(uow.conn())
        .await?;

        match persisted {
            Some((stored_count,)) => {
                // Optimistic check: the row must still look like it did when
                // the aggregate was loaded.
                if let Some(loaded_count) = session.revision {
                    if stored_count != loaded_count {
                        return Err(AssessmentError::Conflict(session.id.to_string()));
                    }
                }

                sqlx::query(
                    "UPDATE assessment_sessions SET \
                        current_ability = $2, standard_error = $3, questions_answered = $4, \
                        status = $5, completed_at = $6 \
                     WHERE id = $1",
                )
                .bind(session.id)
                .bind(ability_to_decimal(session.current_ability)?)
                .bind(ability_to_decimal(session.standard_error)?)
                .bind(session.questions_answered)
                .bind(session.status.as_str())
                .bind(session.completed_at.map(|t| t.naive_utc()))
                .execute(uow.conn())
                .await?;
            }
            None => {
                sqlx::query(&format!(
                    "INSERT INTO assessment_sessions ({SESSION_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
                ))
                .bind(session.id)
                .bind(session.assigned_id)
                .bind(ability_to_decimal(session.current_ability)?)
                .bind(ability_to_decimal(session.standard_error)?)
                .bind(session.questions_answered)
                .bind(session.status.as_str())
                .bind(session.rubric_snapshot.clone())
                .bind(session.template_snapshot.clone())
                .bind(session.started_at.naive_utc())
                .bind(session.completed_at.map(|t| t.naive_utc()))
                .bind(session.expires_at.naive_utc())
                .execute(uow.conn())
                .await?;
            }
        }

        for response in &session.responses {
            self.save_response(uow, response).await?;
        }

        Ok(())
    }

    async fn save_response(
        &self,
        uow: &mut SqlUnitOfWork,
        response: &AssessmentResponse,
    ) -> Result<(), AssessmentError> {
        let response_data = serde_json::to_value(&response.response_data)
            .map_err(|e| AssessmentError::Storage(format!("unserializable response data: {e}")))?;

        sqlx::query(
            "INSERT INTO assessment_responses \
                (id, session_id, item_id, response_data, is_correct, raw_score, \
                 presented_at, submitted_at, time_taken) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
                response_data = EXCLUDED.response_data, \
                is_correct = EXCLUDED.is_correct, \
                raw_score = EXCLUDED.raw_score, \
                submitted_at = EXCLUDED.submitted_at, \
                time_taken = EXCLUDED.time_taken",
        )
        .bind(response.id)
        .bind(response.session_id)
        .bind(response.item_id)
        .bind(response_data)
        .bind(response.is_correct)
        .bind(score_to_decimal(response.raw_score)?)
        .bind(response.presented_at.naive_utc())
        .bind(response.submitted_at.map(|t| t.naive_utc()))
        .bind(response.time_taken)
        .execute(uow.conn())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AssignmentRepository for PgAssignmentRepository {
    async fn get_by_id(
        &self,
        assigned_id: Uuid,
    ) -> Result<Option<AssignedAssessment>, AssessmentError> {
        let Some(row) = self.load_assignment_row(assigned_id).await? else {
            return Ok(None);
        };

        let session = self.load_active_session(assigned_id).await?;
        Ok(Some(assignment_to_domain(row, session)?))
    }

    async fn get_by_session_id(
        &self,
        session_id: Uuid,
    ) -> Result<Option<AssignedAssessment>, AssessmentError> {
        // The referenced session is attached whatever its status, so callers
        // can distinguish a terminated session from a missing one.
        let session_row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM assessment_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(session_row) = session_row else {
            return Ok(None);
        };

        let Some(assignment_row) = self.load_assignment_row(session_row.assigned_id).await?
        else {
            return Ok(None);
        };

        let session = self.hydrate_session(session_row).await?;
        Ok(Some(assignment_to_domain(assignment_row, Some(session))?))
    }

    async fn get_pending_by_test_taker(
        &self,
        test_taker_id: &str,
        template_id: Uuid,
    ) -> Result<Option<AssignedAssessment>, AssessmentError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM assigned_assessments \
             WHERE test_taker_id = $1 AND template_id = $2 AND status = 'PENDING' \
             ORDER BY assigned_at ASC LIMIT 1",
        )
        .bind(test_taker_id)
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((assigned_id,)) => self.get_by_id(assigned_id).await,
            None => Ok(None),
        }
    }

    async fn save(&self, assignment: &AssignedAssessment) -> Result<(), AssessmentError> {
        let mut uow = SqlUnitOfWork::begin(&self.pool).await?;

        sqlx::query("UPDATE assigned_assessments SET status = $2, notes = $3 WHERE id = $1")
            .bind(assignment.id)
            .bind(assignment.status.as_str())
            .bind(assignment.notes.as_deref())
            .execute(uow.conn())
            .await?;

        if let Some(session) = &assignment.session {
            self.save_session(&mut uow, session).await?;
        }

        uow.commit().await
    }

    async fn create(&self, assignment: &AssignedAssessment) -> Result<(), AssessmentError> {
        sqlx::query(
            "INSERT INTO assigned_assessments \
                (id, template_id, test_taker_id, test_taker_type, assigned_by, \
                 assigned_at, due_at, status, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(assignment.id)
        .bind(assignment.template_id)
        .bind(&assignment.test_taker_id)
        .bind(&assignment.test_taker_type)
        .bind(assignment.assigned_by.as_deref())
        .bind(assignment.assigned_at.naive_utc())
        .bind(assignment.due_at.map(|t| t.naive_utc()))
        .bind(assignment.status.as_str())
        .bind(assignment.notes.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn assignment_to_domain(
    row: AssignmentRow,
    session: Option<AssessmentSession>,
) -> Result<AssignedAssessment, AssessmentError> {
    Ok(AssignedAssessment {
        id: row.id,
        template_id: row.template_id,
        test_taker_id: row.test_taker_id,
        test_taker_type: row.test_taker_type,
        assigned_by: row.assigned_by,
        assigned_at: row.assigned_at.and_utc(),
        due_at: row.due_at.map(|t| t.and_utc()),
        status: AssignmentStatus::parse(&row.status).map_err(AssessmentError::Storage)?,
        notes: row.notes,
        session,
    })
}

fn session_to_domain(
    row: SessionRow,
    responses: Vec<AssessmentResponse>,
) -> Result<AssessmentSession, AssessmentError> {
    Ok(AssessmentSession {
        id: row.id,
        assigned_id: row.assigned_id,
        current_ability: decimal_to_f64(row.current_ability),
        standard_error: decimal_to_f64(row.standard_error),
        questions_answered: row.questions_answered,
        status: SessionStatus::parse(&row.status).map_err(AssessmentError::Storage)?,
        rubric_snapshot: row.rubric_snapshot,
        template_snapshot: row.template_snapshot,
        started_at: row.started_at.and_utc(),
        completed_at: row.completed_at.map(|t| t.and_utc()),
        expires_at: row.expires_at.and_utc(),
        responses,
        revision: Some(row.questions_answered),
    })
}

fn response_to_domain(row: ResponseRow) -> Result<AssessmentResponse, AssessmentError> {
    let response_data: ResponsePayload = serde_json::from_value(row.response_data)
        .map_err(|e| AssessmentError::Storage(format!("invalid response data: {e}")))?;

    Ok(AssessmentResponse {
        id: row.id,
        session_id: row.session_id,
        item_id: row.item_id,
        response_data,
        is_correct: row.is_correct,
        raw_score: decimal_to_f64(row.raw_score),
        presented_at: row.presented_at.and_utc(),
        submitted_at: row.submitted_at.map(|t| t.and_utc()),
        time_taken: row.time_taken,
    })
}

fn decimal_to_f64(value: Option<Decimal>) -> Option<f64> {
    value.and_then(|d| d.to_f64())
}

/// Serialize an ability-scale float to the NUMERIC(8,4) column.
fn ability_to_decimal(value: Option<f64>) -> Result<Option<Decimal>, AssessmentError> {
    to_decimal(value, 4)
}

/// Serialize a response score to the NUMERIC(5,2) column.
fn score_to_decimal(value: Option<f64>) -> Result<Option<Decimal>, AssessmentError> {
    to_decimal(value, 2)
}

fn to_decimal(value: Option<f64>, scale: u32) -> Result<Option<Decimal>, AssessmentError> {
    match value {
        None => Ok(None),
        Some(v) => {
            let mut decimal = Decimal::from_f64_retain(v).ok_or_else(|| {
                AssessmentError::Storage(format!("non-finite value cannot be persisted: {v}"))
            })?;
            decimal = decimal.round_dp(scale);
            decimal.rescale(scale);
            Ok(Some(decimal))
        }
    }
}
