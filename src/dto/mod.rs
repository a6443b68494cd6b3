pub mod assessment_dto;
pub mod auth_dto;
pub mod identity_dto;
pub mod notes_dto;
