//! Background poller that re-fetches judge profiles for verified links.

use std::time::Duration;

use db::{DBService, models::judge_account::JudgeAccount};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::account_link::{AccountLinkError, AccountLinkService};

pub struct ProfileSyncService {
    db: DBService,
    links: AccountLinkService,
    interval_minutes: u64,
}

impl ProfileSyncService {
    /// Spawns the sync loop. Accounts are considered stale once their
    /// cached profile is older than one interval.
    pub fn spawn(
        db: DBService,
        links: AccountLinkService,
        interval_minutes: u64,
    ) -> tokio::task::JoinHandle<()> {
        let service = Self {
            db,
            links,
            interval_minutes,
        };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            interval_minutes = self.interval_minutes,
            "starting judge profile sync service"
        );

        let mut interval = interval(Duration::from_secs(self.interval_minutes * 60));
        // The first tick fires immediately; skip it so a fresh boot does
        // not hammer the judge API.
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = self.sync_stale().await {
                error!("profile sync pass failed: {e}");
            }
        }
    }

    /// One sync pass. Per-account failures are logged and skipped so a
    /// broken profile never stalls the rest.
    async fn sync_stale(&self) -> Result<usize, AccountLinkError> {
        let stale =
            JudgeAccount::find_stale_verified(&self.db.pool, self.interval_minutes as i64).await?;
        if stale.is_empty() {
            debug!("profile sync: nothing stale");
            return Ok(0);
        }

        let mut synced = 0;
        for account in stale {
            match self.links.refresh(&self.db.pool, account.user_id).await {
                Ok(updated) => {
                    debug!(
                        handle = %updated.handle,
                        tier = updated.tier,
                        "profile sync: refreshed account"
                    );
                    synced += 1;
                }
                Err(e) => {
                    warn!(
                        handle = %account.handle,
                        user_id = %account.user_id,
                        error = %e,
                        "profile sync: skipping account"
                    );
                }
            }
        }

        info!(synced, "profile sync pass complete");
        Ok(synced)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        super::judge_api::testing::{StubJudge, judge_user},
        *,
    };
    use uuid::Uuid;

    async fn seed_verified(db: &DBService, handle: &str, synced_minutes_ago: i64) -> Uuid {
        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, username, provider, provider_subject) VALUES ($1, $2, 'github', $2)")
            .bind(user_id)
            .bind(handle)
            .execute(&db.pool)
            .await
            .unwrap();
        sqlx::query(&format!(
            "INSERT INTO judge_accounts (id, user_id, handle, status, verification_code, tier, synced_at)
               VALUES ($1, $2, $3, 'verified', 'c', 10, datetime('now', '-{synced_minutes_ago} minutes'))"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(handle)
        .execute(&db.pool)
        .await
        .unwrap();
        user_id
    }

    #[tokio::test]
    async fn refreshes_stale_accounts_only() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_verified(&db, "stale_user", 720).await;
        let fresh_id = seed_verified(&db, "fresh_user", 5).await;

        let stub = StubJudge::default();
        stub.put_user(judge_user("stale_user", None, 15, 1600, 400));
        stub.put_user(judge_user("fresh_user", None, 20, 2000, 800));

        let service = ProfileSyncService {
            db: db.clone(),
            links: AccountLinkService::new(Arc::new(stub)),
            interval_minutes: 360,
        };

        assert_eq!(service.sync_stale().await.unwrap(), 1);

        let stale = JudgeAccount::find_by_user_id(&db.pool, fresh_id)
            .await
            .unwrap()
            .unwrap();
        // The fresh account kept its seeded tier.
        assert_eq!(stale.tier, 10);
    }

    #[tokio::test]
    async fn one_broken_account_does_not_stop_the_pass() {
        let db = DBService::new_in_memory().await.unwrap();
        seed_verified(&db, "gone_user", 720).await;
        let ok_id = seed_verified(&db, "ok_user", 720).await;

        // Only ok_user exists on the judge; gone_user yields NotFound.
        let stub = StubJudge::default();
        stub.put_user(judge_user("ok_user", None, 12, 1400, 300));

        let service = ProfileSyncService {
            db: db.clone(),
            links: AccountLinkService::new(Arc::new(stub)),
            interval_minutes: 360,
        };

        assert_eq!(service.sync_stale().await.unwrap(), 1);

        let refreshed = JudgeAccount::find_by_user_id(&db.pool, ok_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.tier, 12);
    }

    #[tokio::test]
    async fn empty_pass_is_a_no_op() {
        let db = DBService::new_in_memory().await.unwrap();
        let service = ProfileSyncService {
            db: db.clone(),
            links: AccountLinkService::new(Arc::new(StubJudge::default())),
            interval_minutes: 360,
        };
        assert_eq!(service.sync_stale().await.unwrap(), 0);
    }
}
