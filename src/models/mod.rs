pub mod answer;
pub mod assessment;
pub mod course;
pub mod note;
pub mod question;
pub mod result;
pub mod submission;
pub mod user;
