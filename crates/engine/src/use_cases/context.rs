//! Request-scoped context carried by every core operation.
//!
//! A context names who is calling (the [`AccessScope`] every transaction is
//! opened with), the correlation id used in logs and error bodies, and the
//! cancellation signal external calls are raced against.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use playbymail_domain::{GameId, SubscriptionKind};

use crate::infrastructure::correlation::CorrelationId;
use crate::infrastructure::ports::AccessScope;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: CorrelationId,
    pub scope: AccessScope,
    pub cancel: CancellationToken,
}

/// Why a bounded call did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    TimedOut(Duration),
    Cancelled,
}

/// Caller may not act on a game.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// Not subscribed at all; reads exactly like a missing game.
    #[error("Game not found: {0}")]
    NotVisible(GameId),
    #[error("{action} requires a {needs} subscription on game {game_id}")]
    Forbidden {
        game_id: GameId,
        action: &'static str,
        needs: &'static str,
    },
}

impl RequestContext {
    pub fn new(scope: AccessScope, correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            scope,
            cancel: CancellationToken::new(),
        }
    }

    /// Context for background jobs: sees every row.
    pub fn system(correlation_id: CorrelationId) -> Self {
        Self::new(AccessScope::System, correlation_id)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Require one of `kinds` on `game_id`.
    pub fn require(
        &self,
        game_id: GameId,
        kinds: &[SubscriptionKind],
        action: &'static str,
    ) -> Result<(), AccessError> {
        if !self.scope.can_see(game_id) {
            return Err(AccessError::NotVisible(game_id));
        }
        if !self.scope.has_any(game_id, kinds) {
            return Err(AccessError::Forbidden {
                game_id,
                action,
                needs: describe(kinds),
            });
        }
        Ok(())
    }

    /// Run `fut` under a deadline, giving up early when the request is cancelled.
    pub async fn bounded<F, T>(&self, limit: Duration, fut: F) -> Result<T, Interrupted>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            result = tokio::time::timeout(limit, fut) => {
                result.map_err(|_| Interrupted::TimedOut(limit))
            }
        }
    }
}

fn describe(kinds: &[SubscriptionKind]) -> &'static str {
    match kinds {
        [SubscriptionKind::Designer] => "designer",
        [SubscriptionKind::Manager] => "manager",
        [SubscriptionKind::Player] => "player",
        _ => "suitable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use playbymail_domain::{AccountId, Subscription};

    fn manager_context(game_id: GameId) -> RequestContext {
        let account = AccountId::new();
        let subs = Subscription::minted_for_creator(game_id, account, Utc::now());
        RequestContext::new(
            AccessScope::for_account(account, &subs),
            CorrelationId::new(),
        )
    }

    #[test]
    fn test_require_distinguishes_hidden_from_forbidden() {
        let game = GameId::new();
        let ctx = manager_context(game);

        assert!(ctx
            .require(game, &[SubscriptionKind::Manager], "start")
            .is_ok());
        assert!(matches!(
            ctx.require(game, &[SubscriptionKind::Player], "upload"),
            Err(AccessError::Forbidden { needs: "player", .. })
        ));
        let other = GameId::new();
        assert_eq!(
            ctx.require(other, &[SubscriptionKind::Manager], "start"),
            Err(AccessError::NotVisible(other))
        );
    }

    #[tokio::test]
    async fn test_bounded_returns_value_within_deadline() {
        let ctx = RequestContext::system(CorrelationId::new());
        let value = ctx.bounded(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let ctx = RequestContext::system(CorrelationId::new());
        let limit = Duration::from_millis(20);
        let result = ctx
            .bounded(limit, tokio::time::sleep(Duration::from_secs(10)))
            .await;
        assert_eq!(result, Err(Interrupted::TimedOut(limit)));
    }

    #[tokio::test]
    async fn test_bounded_observes_cancellation() {
        let ctx = RequestContext::system(CorrelationId::new());
        ctx.cancel.cancel();
        let result = ctx
            .bounded(
                Duration::from_secs(10),
                tokio::time::sleep(Duration::from_secs(10)),
            )
            .await;
        assert_eq!(result, Err(Interrupted::Cancelled));
        assert!(ctx.is_cancelled());
    }
}
