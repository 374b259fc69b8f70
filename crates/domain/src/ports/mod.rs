use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod chat;
pub mod conversation;
pub mod identity;
pub mod notification;
pub mod profanity;
