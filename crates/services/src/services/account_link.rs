//! Linking a local user to their handle on the external judge.
//!
//! Linking is a two-step handshake: the user claims a handle and gets a
//! verification code, then proves ownership by placing the code in the
//! judge profile bio before calling verify.

use std::sync::Arc;

use db::models::judge_account::{JudgeAccount, LinkStatus};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::judge_api::{JudgeApiError, JudgeGateway, JudgeUser};

#[derive(Debug, Error)]
pub enum AccountLinkError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("judge api error: {0}")]
    JudgeApi(#[from] JudgeApiError),
    #[error("handle {0} not found on judge")]
    HandleNotFound(String),
    #[error("handle {0} is already verified by another user")]
    HandleTaken(String),
    #[error("no linked judge account")]
    NotLinked,
    #[error("judge account is not verified yet")]
    NotVerified,
    #[error("verification code not found in profile bio")]
    CodeNotInBio,
}

#[derive(Clone)]
pub struct AccountLinkService {
    gateway: Arc<dyn JudgeGateway>,
}

impl AccountLinkService {
    pub fn new(gateway: Arc<dyn JudgeGateway>) -> Self {
        Self { gateway }
    }

    /// Claims `handle` for the user, replacing any previous link and
    /// issuing a fresh verification code.
    pub async fn link(
        &self,
        pool: &SqlitePool,
        user_id: Uuid,
        handle: &str,
    ) -> Result<JudgeAccount, AccountLinkError> {
        if let Some(other) = JudgeAccount::find_verified_by_handle(pool, handle).await?
            && other.user_id != user_id
        {
            return Err(AccountLinkError::HandleTaken(handle.to_string()));
        }

        let code = verification_code();
        let account =
            JudgeAccount::create_pending(pool, Uuid::new_v4(), user_id, handle, &code).await?;
        info!(user_id = %user_id, handle, "created pending judge account link");
        Ok(account)
    }

    /// Checks the judge profile bio for the verification code and, on a
    /// match, marks the link verified and caches the profile numbers.
    /// Failure leaves the row pending so the user can retry.
    pub async fn verify(
        &self,
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<JudgeAccount, AccountLinkError> {
        let account = JudgeAccount::find_by_user_id(pool, user_id)
            .await?
            .ok_or(AccountLinkError::NotLinked)?;
        if account.status == LinkStatus::Verified {
            return Ok(account);
        }

        if let Some(other) = JudgeAccount::find_verified_by_handle(pool, &account.handle).await?
            && other.user_id != user_id
        {
            return Err(AccountLinkError::HandleTaken(account.handle));
        }

        let profile = self.fetch_profile(&account.handle).await?;
        let bio_has_code = profile
            .bio
            .as_deref()
            .is_some_and(|bio| bio.contains(&account.verification_code));
        if !bio_has_code {
            return Err(AccountLinkError::CodeNotInBio);
        }

        let verified = JudgeAccount::mark_verified(
            pool,
            account.id,
            profile.tier,
            profile.rating,
            profile.solved_count,
            profile.bio.as_deref(),
        )
        .await?;
        info!(user_id = %user_id, handle = %verified.handle, "judge account verified");
        Ok(verified)
    }

    /// Re-fetches tier/rating/solved count for a verified link. Shared by
    /// the manual refresh endpoint and the background sync poller.
    pub async fn refresh(
        &self,
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<JudgeAccount, AccountLinkError> {
        let account = JudgeAccount::find_by_user_id(pool, user_id)
            .await?
            .ok_or(AccountLinkError::NotLinked)?;
        if account.status != LinkStatus::Verified {
            return Err(AccountLinkError::NotVerified);
        }

        let profile = self.fetch_profile(&account.handle).await?;
        Ok(JudgeAccount::update_profile(
            pool,
            account.id,
            profile.tier,
            profile.rating,
            profile.solved_count,
            profile.bio.as_deref(),
        )
        .await?)
    }

    pub async fn get(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Option<JudgeAccount>, AccountLinkError> {
        Ok(JudgeAccount::find_by_user_id(pool, user_id).await?)
    }

    pub async fn unlink(pool: &SqlitePool, user_id: Uuid) -> Result<(), AccountLinkError> {
        let removed = JudgeAccount::delete_by_user_id(pool, user_id).await?;
        if removed == 0 {
            return Err(AccountLinkError::NotLinked);
        }
        Ok(())
    }

    async fn fetch_profile(&self, handle: &str) -> Result<JudgeUser, AccountLinkError> {
        self.gateway.fetch_user(handle).await.map_err(|e| match e {
            JudgeApiError::NotFound => AccountLinkError::HandleNotFound(handle.to_string()),
            other => AccountLinkError::JudgeApi(other),
        })
    }
}

fn verification_code() -> String {
    format!("solvelog-{}", hex::encode(rand::random::<[u8; 4]>()))
}
