//! Lingopath assessment domain: the adaptive placement engine.

pub mod cat;
pub mod catalog;
pub mod dto;
pub mod entities;
pub mod errors;
pub mod irt;
pub mod ports;
pub mod services;

pub use cat::CatService;
pub use catalog::{
    AdaptiveParams, AssessmentConfig, AssessmentItem, AssessmentTemplate, AssessmentType,
    GeneralParams, ItemContent, ItemParameters, ItemType, ProficiencyBand, StoppingCriterion,
};
pub use dto::{
    Progress, PublicItem, PublicItemContent, StartPlacementResponse, StartPlacementResult,
    SubmitAnswerOutcome, SubmitAnswerRequest, SubmitAnswerResponse,
};
pub use entities::{
    AssessmentResponse, AssessmentSession, AssignedAssessment, AssignmentStatus, ResponsePayload,
    SessionStatus,
};
pub use errors::{AssessmentError, ProblemDetails};
pub use irt::{AbilityEstimate, PsychometricModel, TwoPlModel};
pub use ports::{
    AssignmentRepository, Clock, ConfigRepository, ItemRepository, SystemClock, TemplateRepository,
};
pub use services::PlacementService;
