pub mod auth;
pub mod chat;
pub mod conversation;
pub mod error;
pub mod notification;
pub mod ports;
pub mod profanity;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
