//! Enrolling players from returned join sheets.

use std::sync::Arc;
use std::time::Duration;

use playbymail_domain::{
    Character, CharacterName, DomainError, GameInstance, InstanceStatus, JoinSubmissionId,
    JoinSubmissionStatus, Subscription, SubscriptionKind,
};

use crate::infrastructure::ports::{
    AccountDirectoryPort, ClockPort, DirectoryError, RepoError, Store,
};
use crate::use_cases::context::{Interrupted, RequestContext};
use crate::use_cases::error::{repo_reason, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum EnrollError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("Account directory timed out after {0}s")]
    DirectoryTimeout(u64),
    #[error("Cannot enroll: {0}")]
    Domain(#[from] DomainError),
    #[error("Enrollment cancelled")]
    Cancelled,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<Interrupted> for EnrollError {
    fn from(interrupted: Interrupted) -> Self {
        match interrupted {
            Interrupted::TimedOut(limit) => Self::DirectoryTimeout(limit.as_secs()),
            Interrupted::Cancelled => Self::Cancelled,
        }
    }
}

impl EnrollError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Repo(e) => ErrorKind::of_repo(e),
            _ => ErrorKind::Internal,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Directory(_) => "DirectoryUnavailable",
            Self::DirectoryTimeout(_) => "DirectoryTimeout",
            Self::Domain(_) => "Internal",
            Self::Cancelled => "Cancelled",
            Self::Repo(e) => repo_reason(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollOutcome {
    Enrolled(GameInstance),
    Rejected(String),
    /// Settled by an earlier run of the job.
    AlreadySettled(JoinSubmissionStatus),
}

pub struct PlayerEnrollment {
    store: Arc<dyn Store>,
    directory: Arc<dyn AccountDirectoryPort>,
    clock: Arc<dyn ClockPort>,
    timeout: Duration,
}

impl PlayerEnrollment {
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn AccountDirectoryPort>,
        clock: Arc<dyn ClockPort>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            timeout,
        }
    }

    /// Bind the submitter to the oldest open instance of the manager who
    /// printed the join sheet.
    pub async fn enroll(
        &self,
        ctx: &RequestContext,
        submission_id: JoinSubmissionId,
    ) -> Result<EnrollOutcome, EnrollError> {
        let mut tx = self.store.begin(&ctx.scope).await?;
        let mut submission = tx.get_join_submission(submission_id).await?;
        if submission.is_settled() {
            return Ok(EnrollOutcome::AlreadySettled(submission.status));
        }

        let now = self.clock.now();
        let open = tx
            .list_manager_instances(submission.manager_subscription_id)
            .await?
            .into_iter()
            .find(|i| i.status() == InstanceStatus::Created);
        let Some(instance) = open else {
            let reason = "no open instance";
            submission.reject(reason, now)?;
            tx.save_join_submission(&submission).await?;
            tx.commit().await?;
            tracing::info!(
                join_submission_id = %submission_id,
                game_id = %submission.game_id,
                reason,
                "Join submission rejected"
            );
            return Ok(EnrollOutcome::Rejected(reason.to_string()));
        };

        let character_name = match CharacterName::new(submission.answers.name.as_str()) {
            Ok(name) => name,
            Err(e) => {
                let reason = e.to_string();
                submission.reject(reason.as_str(), now)?;
                tx.save_join_submission(&submission).await?;
                tx.commit().await?;
                tracing::info!(join_submission_id = %submission_id, %reason, "Join submission rejected");
                return Ok(EnrollOutcome::Rejected(reason));
            }
        };

        let account_id = ctx
            .bounded(self.timeout, self.directory.resolve_account(&submission.answers))
            .await??;

        // Keeps a concurrent start from missing this player.
        tx.lock_instance(instance.id()).await?;
        let instance = tx.get_instance(instance.id()).await?;
        if instance.status() != InstanceStatus::Created {
            return Err(RepoError::busy("GameInstance", instance.id()).into());
        }

        let already_bound = tx
            .list_account_subscriptions(account_id)
            .await?
            .iter()
            .any(|s| {
                s.kind == SubscriptionKind::Player
                    && s.game_instance_id == Some(instance.id())
            });
        if !already_bound {
            tx.save_subscription(&Subscription::player_for(
                submission.game_id,
                account_id,
                instance.id(),
                now,
            ))
            .await?;
        }
        if tx.find_character(submission.game_id, account_id).await?.is_none() {
            tx.save_character(&Character::new(
                submission.game_id,
                account_id,
                character_name,
                now,
            ))
            .await?;
        }

        submission.enroll(account_id, instance.id(), now)?;
        tx.save_join_submission(&submission).await?;
        if ctx.is_cancelled() {
            return Err(EnrollError::Cancelled);
        }
        tx.commit().await?;

        tracing::info!(
            join_submission_id = %submission_id,
            account_id = %account_id,
            instance_id = %instance.id(),
            "Player enrolled"
        );
        Ok(EnrollOutcome::Enrolled(instance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{AccessScope, MockAccountDirectoryPort};
    use crate::test_fixtures::Seeded;
    use playbymail_domain::{AccountId, InstanceAction, JoinAnswers, JoinSubmission, ScanQuality};

    fn answers(name: &str) -> JoinAnswers {
        JoinAnswers {
            name: name.to_string(),
            email: "ada@example.org".to_string(),
            postal_address: "1 Engine Row".to_string(),
        }
    }

    async fn submit(seeded: &Seeded, answers: JoinAnswers) -> JoinSubmissionId {
        let submission = JoinSubmission::received(
            seeded.game.id,
            seeded.manager_subscription.id,
            answers,
            ScanQuality::clamped(0.8),
            "digest".to_string(),
            seeded.clock().now(),
        );
        let store = seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        tx.save_join_submission(&submission).await.unwrap();
        tx.commit().await.unwrap();
        submission.id
    }

    fn directory_returning(account: AccountId) -> MockAccountDirectoryPort {
        let mut directory = MockAccountDirectoryPort::new();
        directory
            .expect_resolve_account()
            .returning(move |_| Ok(account));
        directory
    }

    fn enrollment(seeded: &Seeded, directory: MockAccountDirectoryPort) -> PlayerEnrollment {
        PlayerEnrollment::new(
            seeded.store(),
            Arc::new(directory),
            seeded.clock(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_enrolls_into_oldest_created_instance() {
        let mut seeded = Seeded::new().await;
        seeded.publish().await;
        let oldest = seeded.create_instance().await;
        seeded.manual_clock().advance(chrono::Duration::minutes(1));
        seeded.create_instance().await;
        let account = AccountId::new();
        let id = submit(&seeded, answers("Ada")).await;

        let outcome = enrollment(&seeded, directory_returning(account))
            .enroll(&seeded.system_ctx(), id)
            .await
            .unwrap();
        assert!(matches!(outcome, EnrollOutcome::Enrolled(ref i) if i.id() == oldest.id()));

        let store = seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let players = tx.list_instance_players(oldest.id()).await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].account_id, account);
        let character = tx.find_character(seeded.game.id, account).await.unwrap();
        assert_eq!(character.unwrap().name.as_str(), "Ada");
        let submission = tx.get_join_submission(id).await.unwrap();
        assert_eq!(submission.status, JoinSubmissionStatus::Enrolled);
        assert_eq!(submission.game_instance_id, Some(oldest.id()));
    }

    #[tokio::test]
    async fn test_rejects_when_no_instance_is_open() {
        let mut seeded = Seeded::new().await;
        seeded.start_with_players(&["Brunel"]).await;
        let id = submit(&seeded, answers("Ada")).await;

        let mut directory = MockAccountDirectoryPort::new();
        directory.expect_resolve_account().never();
        let outcome = enrollment(&seeded, directory)
            .enroll(&seeded.system_ctx(), id)
            .await
            .unwrap();
        assert_eq!(outcome, EnrollOutcome::Rejected("no open instance".to_string()));
    }

    #[tokio::test]
    async fn test_settled_submissions_are_skipped() {
        let mut seeded = Seeded::new().await;
        seeded.publish().await;
        seeded.create_instance().await;
        let id = submit(&seeded, answers("Ada")).await;
        let enrollment = enrollment(&seeded, directory_returning(AccountId::new()));

        enrollment.enroll(&seeded.system_ctx(), id).await.unwrap();
        let again = enrollment.enroll(&seeded.system_ctx(), id).await.unwrap();
        assert_eq!(
            again,
            EnrollOutcome::AlreadySettled(JoinSubmissionStatus::Enrolled)
        );
    }

    #[tokio::test]
    async fn test_directory_failure_is_retryable() {
        let mut seeded = Seeded::new().await;
        seeded.publish().await;
        let instance = seeded.create_instance().await;
        let id = submit(&seeded, answers("Ada")).await;

        let mut directory = MockAccountDirectoryPort::new();
        directory
            .expect_resolve_account()
            .returning(|_| Err(DirectoryError::RequestFailed("503".to_string())));
        let err = enrollment(&seeded, directory)
            .enroll(&seeded.system_ctx(), id)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollError::Directory(_)));

        let store = seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        assert!(tx.list_instance_players(instance.id()).await.unwrap().is_empty());
        assert_eq!(
            tx.get_join_submission(id).await.unwrap().status,
            JoinSubmissionStatus::Received
        );
    }

    struct StalledDirectory;

    #[async_trait::async_trait]
    impl AccountDirectoryPort for StalledDirectory {
        async fn resolve_account(&self, _answers: &JoinAnswers) -> Result<AccountId, DirectoryError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(AccountId::new())
        }
    }

    #[tokio::test]
    async fn test_stalled_directory_times_out_and_is_cancellable() {
        let mut seeded = Seeded::new().await;
        seeded.publish().await;
        let instance = seeded.create_instance().await;
        let id = submit(&seeded, answers("Ada")).await;
        let enrollment = PlayerEnrollment::new(
            seeded.store(),
            Arc::new(StalledDirectory),
            seeded.clock(),
            Duration::from_millis(20),
        );

        let err = enrollment.enroll(&seeded.system_ctx(), id).await.unwrap_err();
        assert!(matches!(err, EnrollError::DirectoryTimeout(_)));
        assert_eq!(err.reason(), "DirectoryTimeout");

        let cancel = tokio_util::sync::CancellationToken::new();
        let ctx = seeded.system_ctx().with_cancel(cancel.clone());
        cancel.cancel();
        let err = enrollment.enroll(&ctx, id).await.unwrap_err();
        assert!(matches!(err, EnrollError::Cancelled));

        let store = seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        assert!(tx.list_instance_players(instance.id()).await.unwrap().is_empty());
        assert_eq!(
            tx.get_join_submission(id).await.unwrap().status,
            JoinSubmissionStatus::Received
        );
    }

    #[tokio::test]
    async fn test_enrolled_player_counts_towards_readiness() {
        let mut seeded = Seeded::new().await;
        seeded.publish().await;
        let instance = seeded.create_instance().await;
        let id = submit(&seeded, answers("Ada")).await;
        enrollment(&seeded, directory_returning(AccountId::new()))
            .enroll(&seeded.system_ctx(), id)
            .await
            .unwrap();

        let instances = crate::use_cases::instances::Instances::new(
            seeded.store(),
            Arc::new(crate::test_fixtures::RecordingQueue::new()),
            seeded.clock(),
            Arc::new(crate::infrastructure::cache::SnapshotCache::new()),
        );
        let started = instances
            .transition(&seeded.owner_ctx(), seeded.game.id, instance.id(), InstanceAction::Start)
            .await
            .unwrap();
        assert_eq!(started.status(), InstanceStatus::Started);
    }
}
