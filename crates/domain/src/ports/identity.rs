use crate::DomainResult;

/// External auth/session collaborator. The core only ever asks whether an
/// identity exists; lookup of profiles, sessions, and credentials happens
/// elsewhere.
pub trait IdentityDirectory: Send + Sync {
    fn user_exists(&self, user_id: i64) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    fn manager_exists(&self, manager_id: i64) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;
}
