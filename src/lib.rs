pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    ai_service::AIService,
    answer_service::AnswerService,
    assessment_service::AssessmentService,
    auth_service::AuthService,
    completion_client::{CompletionClient, OpenAiClient},
    course_service::CourseService,
    notes_service::NotesService,
    storage_service::StorageService,
    submission_service::SubmissionService,
    user_service::UserService,
};
use reqwest::Client;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub ai_service: AIService,
    pub storage: StorageService,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub course_service: CourseService,
    pub assessment_service: AssessmentService,
    pub answer_service: AnswerService,
    pub submission_service: SubmissionService,
    pub notes_service: NotesService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        let http_client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });
        let client: Arc<dyn CompletionClient> = Arc::new(OpenAiClient::new(http_client, config));
        Self::with_completion_client(pool, client)
    }

    /// Builds the state around any completion backend. Tests pass a scripted
    /// client here.
    pub fn with_completion_client(pool: PgPool, client: Arc<dyn CompletionClient>) -> Self {
        let config = crate::config::get_config();
        let ai_service = AIService::new(client);
        let storage = StorageService::from_config(config);

        Self {
            auth_service: AuthService::new(pool.clone(), config),
            user_service: UserService::new(pool.clone(), storage.clone()),
            course_service: CourseService::new(pool.clone(), storage.clone()),
            assessment_service: AssessmentService::new(
                pool.clone(),
                ai_service.clone(),
                storage.clone(),
            ),
            answer_service: AnswerService::new(pool.clone(), ai_service.clone(), storage.clone()),
            submission_service: SubmissionService::new(
                pool.clone(),
                ai_service.clone(),
                storage.clone(),
            ),
            notes_service: NotesService::new(pool.clone(), storage.clone()),
            pool,
            ai_service,
            storage,
        }
    }
}
