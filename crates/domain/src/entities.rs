//! Assessment aggregate: assignment root, session and response children.
//!
//! All mutations flow through [`AssignedAssessment`]; sessions and responses
//! expose no public mutators of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AssessmentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "IN_PROGRESS" => Ok(SessionStatus::InProgress),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "CANCELLED" => Ok(SessionStatus::Cancelled),
            "EXPIRED" => Ok(SessionStatus::Expired),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
    Cancelled,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "PENDING",
            AssignmentStatus::InProgress => "IN_PROGRESS",
            AssignmentStatus::Completed => "COMPLETED",
            AssignmentStatus::Expired => "EXPIRED",
            AssignmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "PENDING" => Ok(AssignmentStatus::Pending),
            "IN_PROGRESS" => Ok(AssignmentStatus::InProgress),
            "COMPLETED" => Ok(AssignmentStatus::Completed),
            "EXPIRED" => Ok(AssignmentStatus::Expired),
            "CANCELLED" => Ok(AssignmentStatus::Cancelled),
            _ => Err(format!("Unknown assignment status: {}", s)),
        }
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the test taker submitted for a question.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ResponsePayload {
    #[validate(length(max = 255))]
    pub selected_option: Option<String>,
}

impl ResponsePayload {
    pub fn new(selected_option: impl Into<String>) -> Self {
        Self {
            selected_option: Some(selected_option.into()),
        }
    }

    /// A payload is usable only if it names a selected option.
    pub fn is_valid(&self) -> bool {
        self.selected_option
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

/// A test taker's response to one presented item. Pending until submitted.
#[derive(Debug, Clone)]
pub struct AssessmentResponse {
    pub id: Uuid,
    pub session_id: Uuid,
    pub item_id: Uuid,
    pub response_data: ResponsePayload,
    pub is_correct: Option<bool>,
    pub raw_score: Option<f64>,
    pub presented_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub time_taken: Option<i32>,
}

impl AssessmentResponse {
    pub fn is_pending(&self) -> bool {
        self.submitted_at.is_none()
    }

    /// Score used by the ability estimator.
    pub fn score(&self) -> f64 {
        match self.raw_score {
            Some(score) => score,
            None => {
                if self.is_correct == Some(true) {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// One examination attempt. Owned by [`AssignedAssessment`].
#[derive(Debug, Clone)]
pub struct AssessmentSession {
    pub id: Uuid,
    pub assigned_id: Uuid,
    pub current_ability: Option<f64>,
    pub standard_error: Option<f64>,
    pub questions_answered: i32,
    pub status: SessionStatus,
    pub rubric_snapshot: Option<Value>,
    pub template_snapshot: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub responses: Vec<AssessmentResponse>,
    /// `questions_answered` as last persisted. The repository compares this
    /// against the stored row on save to detect concurrent submissions;
    /// `None` marks a session not yet written.
    pub revision: Option<i32>,
}

impl AssessmentSession {
    pub fn can_accept_answer(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::InProgress && !self.is_time_expired(now)
    }

    pub fn is_time_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_terminated(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn has_reached_max_questions(&self, max_questions: i32) -> bool {
        self.questions_answered >= max_questions
    }

    pub fn has_reached_min_questions(&self, min_questions: i32) -> bool {
        self.questions_answered >= min_questions
    }

    pub fn has_sufficient_precision(&self, stopping_standard_error: f64) -> bool {
        self.standard_error
            .is_some_and(|se| se <= stopping_standard_error)
    }

    /// The unsubmitted response, if one exists. Scans newest-first so that a
    /// corrupted store with several pending rows still resolves to the most
    /// recently presented question.
    pub fn pending_response(&self) -> Option<&AssessmentResponse> {
        self.responses.iter().rev().find(|r| r.is_pending())
    }

    pub fn submitted_responses(&self) -> Vec<&AssessmentResponse> {
        self.responses.iter().filter(|r| !r.is_pending()).collect()
    }

    /// IDs of every item presented so far, submitted or pending.
    pub fn answered_item_ids(&self) -> Vec<Uuid> {
        self.responses.iter().map(|r| r.item_id).collect()
    }
}

/// Aggregate root for the assessment bounded context.
#[derive(Debug, Clone)]
pub struct AssignedAssessment {
    pub id: Uuid,
    pub template_id: Uuid,
    pub test_taker_id: String,
    pub test_taker_type: String,
    pub assigned_by: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub status: AssignmentStatus,
    pub notes: Option<String>,
    pub session: Option<AssessmentSession>,
}

impl AssignedAssessment {
    /// Starting is allowed only while PENDING and not past due.
    pub fn can_start(&self, now: DateTime<Utc>) -> bool {
        if self.status != AssignmentStatus::Pending {
            return false;
        }
        match self.due_at {
            Some(due_at) => now <= due_at,
            None => true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.due_at {
            Some(due_at) => now > due_at && self.status != AssignmentStatus::Completed,
            None => false,
        }
    }

    pub fn has_active_session(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.status == SessionStatus::InProgress)
    }

    pub fn active_session(&self) -> Option<&AssessmentSession> {
        self.session
            .as_ref()
            .filter(|s| s.status == SessionStatus::InProgress)
    }

    /// Start a new session, moving the assignment to IN_PROGRESS.
    #[allow(clippy::too_many_arguments)]
    pub fn start_session(
        &mut self,
        session_id: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        starting_ability: f64,
        rubric_snapshot: Option<Value>,
        template_snapshot: Option<Value>,
    ) -> Result<&AssessmentSession, AssessmentError> {
        if !self.can_start(now) {
            return Err(AssessmentError::InvalidState(format!(
                "cannot start session: assignment status is {}",
                self.status
            )));
        }
        if self.has_active_session() {
            return Err(AssessmentError::InvalidState(
                "an active session already exists for this assignment".to_string(),
            ));
        }

        self.status = AssignmentStatus::InProgress;
        let session = self.session.insert(AssessmentSession {
            id: session_id,
            assigned_id: self.id,
            current_ability: Some(starting_ability),
            standard_error: None,
            questions_answered: 0,
            status: SessionStatus::InProgress,
            rubric_snapshot,
            template_snapshot,
            started_at: now,
            completed_at: None,
            expires_at,
            responses: Vec::new(),
            revision: None,
        });

        Ok(session)
    }

    /// Present a question by appending a pending response.
    pub fn present_question(
        &mut self,
        response_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<&AssessmentResponse, AssessmentError> {
        let session = match &mut self.session {
            Some(s) if s.status == SessionStatus::InProgress => s,
            _ => {
                return Err(AssessmentError::InvalidState(
                    "no active session to present question".to_string(),
                ));
            }
        };

        // Invariant: at most one pending response per session.
        if session.responses.iter().any(|r| r.is_pending()) {
            return Err(AssessmentError::InvalidState(
                "a question is already pending for this session".to_string(),
            ));
        }

        session.responses.push(AssessmentResponse {
            id: response_id,
            session_id: session.id,
            item_id,
            response_data: ResponsePayload::default(),
            is_correct: None,
            raw_score: None,
            presented_at: now,
            submitted_at: None,
            time_taken: None,
        });
        let presented = session.responses.len() - 1;

        Ok(&session.responses[presented])
    }

    /// Finalize the pending response and bump the answered counter.
    pub fn submit_response(
        &mut self,
        response_data: ResponsePayload,
        is_correct: bool,
        score: f64,
        time_taken: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<&AssessmentResponse, AssessmentError> {
        let session = self.session.as_mut().ok_or_else(|| {
            AssessmentError::InvalidState("no session exists for this assignment".to_string())
        })?;

        if session.status.is_terminal() {
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

        if !response_data.is_valid() {
            return Err(AssessmentError::InvalidInput(
                "response does not carry a selected option".to_string(),
            ));
        }

        let pending_idx = session
            .responses
            .iter()
            .rposition(|r| r.is_pending())
            .ok_or_else(|| {
                AssessmentError::SessionNotFound(format!(
                    "no pending response for session {}",
                    session.id
                ))
            })?;

        let pending = &mut session.responses[pending_idx];
        pending.response_data = response_data;
        pending.is_correct = Some(is_correct);
        pending.raw_score = Some(score);
        pending.time_taken = time_taken;
        pending.submitted_at = Some(now);

        session.questions_answered += 1;

        Ok(&session.responses[pending_idx])
    }

    /// Record the re-estimated ability after a submission.
    pub fn update_ability_estimate(
        &mut self,
        new_ability: f64,
        new_standard_error: Option<f64>,
    ) -> Result<(), AssessmentError> {
        let session = self.session.as_mut().ok_or_else(|| {
            AssessmentError::InvalidState("no session exists for this assignment".to_string())
        })?;

        session.current_ability = Some(new_ability);
        session.standard_error = new_standard_error;
        Ok(())
    }

    /// Terminal transition: session and assignment both complete.
    pub fn complete_assessment(&mut self, now: DateTime<Utc>) -> Result<(), AssessmentError> {
        let session = self.session.as_mut().ok_or_else(|| {
            AssessmentError::InvalidState("no session to complete".to_string())
        })?;

        session.status = SessionStatus::Completed;
        session.completed_at = Some(now);
        self.status = AssignmentStatus::Completed;
        Ok(())
    }

    /// Terminal transition: the session is abandoned, the assignment keeps its
    /// status.
    pub fn cancel_session(&mut self) -> Result<(), AssessmentError> {
        let session = self.session.as_mut().ok_or_else(|| {
            AssessmentError::InvalidState("no session to cancel".to_string())
        })?;

        session.status = SessionStatus::Cancelled;
        Ok(())
    }

    /// Terminal transition: session and assignment both expire.
    pub fn expire_session(&mut self) -> Result<(), AssessmentError> {
        let session = self.session.as_mut().ok_or_else(|| {
            AssessmentError::InvalidState("no session to expire".to_string())
        })?;

        session.status = SessionStatus::Expired;
        self.status = AssignmentStatus::Expired;
        Ok(())
    }

    // --- Query helpers ---

    pub fn current_ability(&self) -> f64 {
        self.session
            .as_ref()
            .and_then(|s| s.current_ability)
            .unwrap_or(0.0)
    }

    pub fn standard_error(&self) -> Option<f64> {
        self.session.as_ref().and_then(|s| s.standard_error)
    }

    pub fn questions_answered(&self) -> i32 {
        self.session.as_ref().map_or(0, |s| s.questions_answered)
    }

    pub fn is_session_complete(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_complete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn pending_assignment() -> AssignedAssessment {
        AssignedAssessment {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            test_taker_id: "taker-1".to_string(),
            test_taker_type: "student".to_string(),
            assigned_by: None,
            assigned_at: t0(),
            due_at: None,
            status: AssignmentStatus::Pending,
            notes: None,
            session: None,
        }
    }

    fn started_assignment() -> AssignedAssessment {
        let mut assignment = pending_assignment();
        assignment
            .start_session(
                Uuid::new_v4(),
                t0(),
                t0() + Duration::minutes(120),
                0.0,
                None,
                None,
            )
            .unwrap();
        assignment
    }

    #[test]
    fn test_start_session_moves_to_in_progress() {
        let mut assignment = pending_assignment();
        let session_id = Uuid::new_v4();
        let session = assignment
            .start_session(
                session_id,
                t0(),
                t0() + Duration::minutes(120),
                0.5,
                None,
                None,
            )
            .unwrap();

        assert_eq!(session.id, session_id);
        assert_eq!(session.current_ability, Some(0.5));
        assert_eq!(session.standard_error, None);
        assert_eq!(session.questions_answered, 0);
        assert!(session.responses.is_empty());
        assert_eq!(assignment.status, AssignmentStatus::InProgress);
    }

    #[test]
    fn test_start_session_rejects_non_pending_assignment() {
        let mut assignment = started_assignment();
        let result = assignment.start_session(
            Uuid::new_v4(),
            t0(),
            t0() + Duration::minutes(120),
            0.0,
            None,
            None,
        );
        assert!(matches!(result, Err(AssessmentError::InvalidState(_))));
    }

    #[test]
    fn test_start_session_rejects_past_due() {
        let mut assignment = pending_assignment();
        assignment.due_at = Some(t0() - Duration::days(1));
        let result = assignment.start_session(
            Uuid::new_v4(),
            t0(),
            t0() + Duration::minutes(120),
            0.0,
            None,
            None,
        );
        assert!(matches!(result, Err(AssessmentError::InvalidState(_))));
    }

    #[test]
    fn test_present_question_appends_pending_response() {
        let mut assignment = started_assignment();
        let item_id = Uuid::new_v4();
        assignment
            .present_question(Uuid::new_v4(), item_id, t0())
            .unwrap();

        let session = assignment.session.as_ref().unwrap();
        let pending = session.pending_response().unwrap();
        assert_eq!(pending.item_id, item_id);
        assert!(pending.is_pending());
    }

    #[test]
    fn test_present_question_rejects_second_pending() {
        let mut assignment = started_assignment();
        assignment
            .present_question(Uuid::new_v4(), Uuid::new_v4(), t0())
            .unwrap();
        let result = assignment.present_question(Uuid::new_v4(), Uuid::new_v4(), t0());
        assert!(matches!(result, Err(AssessmentError::InvalidState(_))));
    }

    #[test]
    fn test_submit_response_finalizes_pending_and_counts() {
        let mut assignment = started_assignment();
        assignment
            .present_question(Uuid::new_v4(), Uuid::new_v4(), t0())
            .unwrap();

        let submitted = assignment
            .submit_response(
                ResponsePayload::new("b"),
                true,
                1.0,
                Some(12),
                t0() + Duration::seconds(30),
            )
            .unwrap();

        assert_eq!(submitted.is_correct, Some(true));
        assert_eq!(submitted.raw_score, Some(1.0));
        assert!(!submitted.is_pending());
        assert_eq!(assignment.questions_answered(), 1);

        let session = assignment.session.as_ref().unwrap();
        assert!(session.pending_response().is_none());
        assert_eq!(session.submitted_responses().len(), 1);
    }

    #[test]
    fn test_submit_response_requires_pending() {
        let mut assignment = started_assignment();
        let result = assignment.submit_response(
            ResponsePayload::new("a"),
            false,
            0.0,
            None,
            t0(),
        );
        assert!(matches!(result, Err(AssessmentError::SessionNotFound(_))));
    }

    #[test]
    fn test_submit_response_rejects_missing_option() {
        let mut assignment = started_assignment();
        assignment
            .present_question(Uuid::new_v4(), Uuid::new_v4(), t0())
            .unwrap();
        let result = assignment.submit_response(
            ResponsePayload::default(),
            false,
            0.0,
            None,
            t0(),
        );
        assert!(matches!(result, Err(AssessmentError::InvalidInput(_))));
    }

    #[test]
    fn test_submit_response_rejects_expired_session() {
        let mut assignment = started_assignment();
        assignment
            .present_question(Uuid::new_v4(), Uuid::new_v4(), t0())
            .unwrap();
        let past_expiry = t0() + Duration::minutes(121);
        let result = assignment.submit_response(
            ResponsePayload::new("a"),
            false,
            0.0,
            None,
            past_expiry,
        );
        assert!(matches!(result, Err(AssessmentError::InvalidState(_))));
    }

    #[test]
    fn test_submit_response_rejects_terminated_session() {
        let mut assignment = started_assignment();
        assignment
            .present_question(Uuid::new_v4(), Uuid::new_v4(), t0())
            .unwrap();
        assignment
            .submit_response(ResponsePayload::new("a"), true, 1.0, None, t0())
            .unwrap();
        assignment.complete_assessment(t0()).unwrap();

        let result = assignment.submit_response(
            ResponsePayload::new("a"),
            true,
            1.0,
            None,
            t0(),
        );
        assert!(matches!(result, Err(AssessmentError::Terminated(_))));
    }

    #[test]
    fn test_complete_assessment_is_terminal() {
        let mut assignment = started_assignment();
        assignment.complete_assessment(t0()).unwrap();

        let session = assignment.session.as_ref().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.completed_at, Some(t0()));
        assert_eq!(assignment.status, AssignmentStatus::Completed);
        assert!(!assignment.has_active_session());
    }

    #[test]
    fn test_expire_session_expires_assignment() {
        let mut assignment = started_assignment();
        assignment.expire_session().unwrap();

        assert_eq!(
            assignment.session.as_ref().unwrap().status,
            SessionStatus::Expired
        );
        assert_eq!(assignment.status, AssignmentStatus::Expired);
    }

    #[test]
    fn test_cancel_session_keeps_assignment_status() {
        let mut assignment = started_assignment();
        assignment.cancel_session().unwrap();

        assert_eq!(
            assignment.session.as_ref().unwrap().status,
            SessionStatus::Cancelled
        );
        assert_eq!(assignment.status, AssignmentStatus::InProgress);
    }

    #[test]
    fn test_counter_matches_submitted_responses() {
        let mut assignment = started_assignment();
        for i in 0..3 {
            assignment
                .present_question(Uuid::new_v4(), Uuid::new_v4(), t0())
                .unwrap();
            assignment
                .submit_response(
                    ResponsePayload::new("a"),
                    i % 2 == 0,
                    if i % 2 == 0 { 1.0 } else { 0.0 },
                    None,
                    t0() + Duration::seconds(i),
                )
                .unwrap();
        }

        let session = assignment.session.as_ref().unwrap();
        assert_eq!(session.questions_answered, 3);
        assert_eq!(session.submitted_responses().len(), 3);
        assert_eq!(session.answered_item_ids().len(), 3);
    }

    #[test]
    fn test_pending_response_prefers_newest() {
        // Simulates prior corruption: two pending rows loaded from the store.
        let mut assignment = started_assignment();
        assignment
            .present_question(Uuid::new_v4(), Uuid::new_v4(), t0())
            .unwrap();
        let newest_item = Uuid::new_v4();
        let session = assignment.session.as_mut().unwrap();
        session.responses.push(AssessmentResponse {
            id: Uuid::new_v4(),
            session_id: session.id,
            item_id: newest_item,
            response_data: ResponsePayload::default(),
            is_correct: None,
            raw_score: None,
            presented_at: t0() + Duration::seconds(5),
            submitted_at: None,
            time_taken: None,
        });

        assert_eq!(session.pending_response().unwrap().item_id, newest_item);
    }

    #[test]
    fn test_response_score_prefers_raw_score() {
        let response = AssessmentResponse {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            response_data: ResponsePayload::new("a"),
            is_correct: Some(false),
            raw_score: Some(0.5),
            presented_at: t0(),
            submitted_at: Some(t0()),
            time_taken: None,
        };
        assert_eq!(response.score(), 0.5);
    }
}
