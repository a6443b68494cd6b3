pub mod ai_service;
pub mod answer_service;
pub mod assessment_service;
pub mod auth_service;
pub mod completion_client;
pub mod course_service;
pub mod export_service;
pub mod notes_service;
pub mod storage_service;
pub mod submission_service;
pub mod user_service;
