//! Caller identity for HTTP requests.
//!
//! The account arrives in the `X-Account-Id` header. Its subscriptions are
//! loaded once per request to build the [`AccessScope`] every use case runs
//! under.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use playbymail_domain::{AccountId, GameId, Subscription, SubscriptionKind};

use crate::api::error::ApiError;
use crate::app::App;
use crate::infrastructure::correlation::{CorrelationId, CORRELATION_HEADER};
use crate::infrastructure::ports::AccessScope;
use crate::use_cases::RequestContext;

pub const ACCOUNT_HEADER: &str = "x-account-id";

pub struct Caller {
    pub ctx: RequestContext,
    pub subscriptions: Vec<Subscription>,
}

impl Caller {
    pub fn account_id(&self) -> Option<AccountId> {
        self.ctx.scope.account_id()
    }

    /// The caller's own subscription of `kind` on `game_id`, if any.
    pub fn subscription(&self, game_id: GameId, kind: SubscriptionKind) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .find(|s| s.game_id == game_id && s.kind == kind)
    }

    /// Convert a use-case error, stamping it with this request's correlation id.
    pub fn fail<E: Into<ApiError>>(&self, err: E) -> ApiError {
        err.into().correlated(self.ctx.correlation_id)
    }
}

impl FromRequestParts<Arc<App>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, app: &Arc<App>) -> Result<Self, Self::Rejection> {
        let correlation_id = CorrelationId::from_header(
            parts
                .headers
                .get(CORRELATION_HEADER)
                .and_then(|v| v.to_str().ok()),
        );

        let account_id: AccountId = parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing X-Account-Id header"))?
            .trim()
            .parse::<uuid::Uuid>()
            .map(AccountId::from_uuid)
            .map_err(|_| ApiError::unauthorized("X-Account-Id is not a valid account id"))?;

        let subscriptions = {
            let mut tx = app
                .store
                .begin(&AccessScope::System)
                .await
                .map_err(|e| ApiError::from(e).correlated(correlation_id))?;
            tx.list_account_subscriptions(account_id)
                .await
                .map_err(|e| ApiError::from(e).correlated(correlation_id))?
        };

        tracing::debug!(
            correlation_id = %correlation_id,
            account_id = %account_id,
            subscriptions = subscriptions.len(),
            "Resolved caller"
        );

        Ok(Caller {
            ctx: RequestContext::new(
                AccessScope::for_account(account_id, &subscriptions),
                correlation_id,
            ),
            subscriptions,
        })
    }
}
