use crate::DomainResult;
use crate::profanity::CensorRule;

/// Reference table backing the censor rule set; read on every reload.
pub trait CensorRuleSource: Send + Sync {
    fn load_rules(&self) -> crate::ports::BoxFuture<'_, DomainResult<Vec<CensorRule>>>;
}
