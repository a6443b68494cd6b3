pub mod crypto;
pub mod jwt;
pub mod token;
pub mod validation;
