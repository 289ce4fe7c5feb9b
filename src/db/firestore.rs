// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile + progression counters)
//! - Tasks and focus sessions
//! - Daily progress aggregates
//! - Achievement catalog and unlocks
//! - Weekly quests and their tasks
//! - Reward ledger, streak archive, friendships
//!
//! Multi-document writes go through [`UnitOfWork`], a Firestore transaction
//! whose reads use the transaction's consistency selector so that a
//! concurrent writer makes the commit fail instead of losing an update.

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    Achievement, ActiveSessionMarker, DailyProgress, FocusSession, Friendship, ProgressDelta,
    RewardHistory, StreakHistory, Task, TaskStatus, User, UserAchievement, UsernameClaim,
    WeeklyQuest, WeeklyQuestTask,
};
use chrono::NaiveDate;
use futures_util::{stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

const MAX_CONCURRENT_DB_OPS: usize = 50;
// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore aborts a transaction whose read set changed before commit.
fn is_contention(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("aborted") || lower.contains("contention")
}

/// A create precondition failed because the document is already there.
fn is_already_exists(error: &firestore::errors::FirestoreError) -> bool {
    matches!(error, firestore::errors::FirestoreError::DataConflictError(_))
        || error.to_string().to_ascii_lowercase().contains("already exists")
}

fn commit_error(message: String) -> AppError {
    if is_contention(&message) {
        AppError::Contention(message)
    } else {
        AppError::Database(format!("Transaction commit failed: {}", message))
    }
}

/// Position in a newest-first reward history listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCursor {
    /// `created_at` of the last entry already returned (fixed-width RFC3339)
    pub created_at: String,
    pub entry_id: String,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Begin a transactional unit of work.
    pub async fn begin(&self) -> Result<UnitOfWork<'_>, AppError> {
        let client = self.get_client()?;
        let transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;
        let reader = client.clone_with_consistency_selector(
            firestore::FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ),
        );

        Ok(UnitOfWork {
            client,
            reader,
            transaction,
        })
    }

    // ─── Generic Helpers ───────────────────────────────────────────

    async fn get_doc<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn put_doc<T>(&self, collection: &str, id: &str, object: &T) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Sync + Send,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_doc(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Create a document only if it does not exist yet.
    ///
    /// Returns `false` when the document already exists.
    async fn insert_doc<T>(&self, collection: &str, id: &str, object: &T) -> Result<bool, AppError>
    where
        T: Serialize + DeserializeOwned + Sync + Send,
    {
        let result: Result<(), firestore::errors::FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(id)
            .object(object)
            .execute()
            .await;

        match result {
            Ok(()) => Ok(true),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    /// Helper to batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_doc(collections::USERS, user_id).await
    }

    /// Create a user profile and claim its username in one commit.
    ///
    /// Returns `false` when the profile exists or the username is taken.
    pub async fn create_user(&self, user: &User) -> Result<bool, AppError> {
        let mut uow = self.begin().await?;
        if uow.get_user(&user.user_id).await?.is_some()
            || uow.get_username_claim(&user.username).await?.is_some()
        {
            uow.rollback().await;
            return Ok(false);
        }
        uow.claim_username(&UsernameClaim::for_user(user))?;
        uow.create_user(user)?;
        uow.commit_if_absent().await
    }

    /// Write the username and display name of `user`, moving the username
    /// claim from `previous_username` when it changed.
    ///
    /// Returns `false` when the new username belongs to someone else.
    /// Progression counters are left untouched.
    pub async fn update_profile(
        &self,
        user: &User,
        previous_username: &str,
    ) -> Result<bool, AppError> {
        let mut uow = self.begin().await?;
        if user.username != previous_username {
            let claim = uow.get_username_claim(&user.username).await?;
            match claim {
                Some(claim) if claim.user_id != user.user_id => {
                    uow.rollback().await;
                    return Ok(false);
                }
                Some(_) => {}
                None => uow.claim_username(&UsernameClaim::for_user(user))?,
            }
            let old = uow.get_username_claim(previous_username).await?;
            if old.is_some_and(|c| c.user_id == user.user_id) {
                uow.release_username(previous_username)?;
            }
        }
        uow.put_profile(user)?;
        uow.commit_if_absent().await
    }

    /// Write the settings fields of a user only.
    pub async fn update_user_settings(&self, user: &User) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(["quest_reset_day"])
            .in_col(collections::USERS)
            .document_id(&user.user_id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let username = username.to_string();
        let mut users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field("username").eq(username.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(users.pop())
    }

    /// Fetch several users concurrently. Missing users are skipped.
    pub async fn get_users(&self, user_ids: &[String]) -> Result<Vec<User>, AppError> {
        let results = stream::iter(user_ids.to_vec())
            .map(|id| async move { self.get_user(&id).await })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<Option<User>, AppError>>>()
            .await;

        let mut users = Vec::with_capacity(results.len());
        for result in results {
            if let Some(user) = result? {
                users.push(user);
            }
        }
        Ok(users)
    }

    // ─── Task Operations ─────────────────────────────────────────

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>, AppError> {
        self.get_doc(collections::TASKS, task_id).await
    }

    /// All tasks of a user, optionally restricted to one status.
    pub async fn list_tasks(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::TASKS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    status.and_then(|s| q.field("status").eq(s.as_str())),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a task together with its subtasks.
    pub async fn delete_task(&self, task_id: &str) -> Result<usize, AppError> {
        let parent = task_id.to_string();
        let subtasks: Vec<Task> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TASKS)
            .filter(move |q| q.for_all([q.field("parent_task_id").eq(parent.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.batch_delete(&subtasks, collections::TASKS, |t: &Task| t.task_id.clone())
            .await?;
        self.delete_doc(collections::TASKS, task_id).await?;

        tracing::debug!(task_id, subtasks = subtasks.len(), "Deleted task");
        Ok(subtasks.len() + 1)
    }

    // ─── Focus Session Operations ────────────────────────────────

    pub async fn get_session(&self, session_id: &str) -> Result<Option<FocusSession>, AppError> {
        self.get_doc(collections::FOCUS_SESSIONS, session_id).await
    }

    /// Sessions of a user, newest first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<FocusSession>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::FOCUS_SESSIONS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .order_by([("started_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Daily Progress Operations ───────────────────────────────

    pub async fn get_daily_progress(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyProgress>, AppError> {
        self.get_doc(
            collections::DAILY_PROGRESS,
            &DailyProgress::document_id(user_id, date),
        )
        .await
    }

    /// Daily rows from `since` (inclusive), oldest first.
    pub async fn list_daily_progress(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<DailyProgress>, AppError> {
        let user_id = user_id.to_string();
        let since = since.format("%Y-%m-%d").to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::DAILY_PROGRESS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("date").greater_than_or_equal(since.clone()),
                ])
            })
            .order_by([("date", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Achievement Operations ──────────────────────────────────

    /// Upsert catalog entries (idempotent, run at startup).
    pub async fn seed_achievements(&self, catalog: &[Achievement]) -> Result<(), AppError> {
        stream::iter(catalog.to_vec())
            .map(|entry| async move {
                self.put_doc(collections::ACHIEVEMENTS, &entry.key, &entry)
                    .await
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        tracing::info!(count = catalog.len(), "Achievement catalog seeded");
        Ok(())
    }

    pub async fn list_achievements(&self) -> Result<Vec<Achievement>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ACHIEVEMENTS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Unlocks of a user, newest first.
    pub async fn list_user_achievements(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserAchievement>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USER_ACHIEVEMENTS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .order_by([("unlocked_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Weekly Quest Operations ─────────────────────────────────

    pub async fn get_quest(&self, quest_id: &str) -> Result<Option<WeeklyQuest>, AppError> {
        self.get_doc(collections::WEEKLY_QUESTS, quest_id).await
    }

    pub async fn get_quest_task(
        &self,
        quest_task_id: &str,
    ) -> Result<Option<WeeklyQuestTask>, AppError> {
        self.get_doc(collections::WEEKLY_QUEST_TASKS, quest_task_id)
            .await
    }

    /// Quests of a user, newest first.
    pub async fn list_quests(&self, user_id: &str) -> Result<Vec<WeeklyQuest>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::WEEKLY_QUESTS)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    pub async fn list_quest_tasks(&self, quest_id: &str) -> Result<Vec<WeeklyQuestTask>, AppError> {
        let quest_id = quest_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::WEEKLY_QUEST_TASKS)
            .filter(move |q| q.for_all([q.field("quest_id").eq(quest_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Reward History Operations ───────────────────────────────

    /// Ledger entries of a user, newest first, strictly after `before` in
    /// `(created_at, entry_id)` descending order.
    pub async fn list_reward_history(
        &self,
        user_id: &str,
        before: Option<HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<RewardHistory>, AppError> {
        let user_id = user_id.to_string();
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::REWARD_HISTORY)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .order_by([
                ("created_at", firestore::FirestoreQueryDirection::Descending),
                ("entry_id", firestore::FirestoreQueryDirection::Descending),
            ])
            .limit(limit);

        // Cursor values follow the order_by fields
        let query = match before {
            Some(cursor) => query.start_at(firestore::FirestoreQueryCursor::AfterValue(vec![
                cursor.created_at.into(),
                cursor.entry_id.into(),
            ])),
            None => query,
        };

        query
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Friendship Operations ───────────────────────────────────

    pub async fn get_friendship(&self, friendship_id: &str) -> Result<Option<Friendship>, AppError> {
        self.get_doc(collections::FRIENDSHIPS, friendship_id).await
    }

    pub async fn set_friendship(&self, friendship: &Friendship) -> Result<(), AppError> {
        self.put_doc(
            collections::FRIENDSHIPS,
            &friendship.friendship_id,
            friendship,
        )
        .await
    }

    /// Create a friendship unless the pair already has one.
    pub async fn insert_friendship(&self, friendship: &Friendship) -> Result<bool, AppError> {
        self.insert_doc(
            collections::FRIENDSHIPS,
            &friendship.friendship_id,
            friendship,
        )
        .await
    }

    /// All friendships (any status) that include `user_id`.
    pub async fn list_friendships(&self, user_id: &str) -> Result<Vec<Friendship>, AppError> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::FRIENDSHIPS)
            .filter(move |q| q.for_all([q.field("members").array_contains(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// A Firestore transaction spanning one user action.
///
/// Reads observe the transaction snapshot; writes are buffered and applied
/// atomically by [`UnitOfWork::commit`]. Dropping without committing
/// discards every buffered write.
pub struct UnitOfWork<'a> {
    client: &'a firestore::FirestoreDb,
    reader: firestore::FirestoreDb,
    transaction: firestore::FirestoreTransaction<'a>,
}

impl<'a> UnitOfWork<'a> {
    async fn get<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        self.reader
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read {} in transaction: {}", collection, e))
            })
    }

    fn put<T>(&mut self, collection: &str, id: &str, object: &T) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Sync + Send,
    {
        self.client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(object)
            .add_to_transaction(&mut self.transaction)
            .map_err(|e| {
                AppError::Database(format!(
                    "Failed to add {} write to transaction: {}",
                    collection, e
                ))
            })?;
        Ok(())
    }

    /// Create a document; the commit fails if it already exists.
    fn create<T>(&mut self, collection: &str, id: &str, object: &T) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Sync + Send,
    {
        self.client
            .fluent()
            .update()
            .in_col(collection)
            .precondition(firestore::FirestoreWritePrecondition::Exists(false))
            .document_id(id)
            .object(object)
            .add_to_transaction(&mut self.transaction)
            .map_err(|e| {
                AppError::Database(format!(
                    "Failed to add {} create to transaction: {}",
                    collection, e
                ))
            })?;
        Ok(())
    }

    fn delete(&mut self, collection: &str, id: &str) -> Result<(), AppError> {
        self.client
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .add_to_transaction(&mut self.transaction)
            .map_err(|e| {
                AppError::Database(format!(
                    "Failed to add {} deletion to transaction: {}",
                    collection, e
                ))
            })?;
        Ok(())
    }

    /// Add `amount` to numeric fields server-side (no read-modify-write).
    fn increment(
        &mut self,
        collection: &str,
        id: &str,
        fields: &[(&str, i64)],
    ) -> Result<(), AppError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .transforms(|t| {
                let transforms: Vec<_> = fields
                    .iter()
                    .map(|(field, amount)| t.field(*field).increment(*amount))
                    .collect();
                t.fields(transforms)
            })
            .only_transform()
            .add_to_transaction(&mut self.transaction)
            .map_err(|e| {
                AppError::Database(format!(
                    "Failed to add {} increment to transaction: {}",
                    collection, e
                ))
            })?;
        Ok(())
    }

    // ─── Reads ───────────────────────────────────────────────────

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get(collections::USERS, user_id).await
    }

    pub async fn get_username_claim(
        &self,
        username: &str,
    ) -> Result<Option<UsernameClaim>, AppError> {
        self.get(collections::USERNAMES, username).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>, AppError> {
        self.get(collections::TASKS, task_id).await
    }

    pub async fn get_active_session(
        &self,
        user_id: &str,
    ) -> Result<Option<ActiveSessionMarker>, AppError> {
        self.get(collections::ACTIVE_FOCUS_SESSIONS, user_id).await
    }

    pub async fn get_user_achievement(
        &self,
        user_id: &str,
        achievement_key: &str,
    ) -> Result<Option<UserAchievement>, AppError> {
        self.get(
            collections::USER_ACHIEVEMENTS,
            &UserAchievement::document_id(user_id, achievement_key),
        )
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<FocusSession>, AppError> {
        self.get(collections::FOCUS_SESSIONS, session_id).await
    }

    pub async fn get_quest(&self, quest_id: &str) -> Result<Option<WeeklyQuest>, AppError> {
        self.get(collections::WEEKLY_QUESTS, quest_id).await
    }

    pub async fn get_quest_task(
        &self,
        quest_task_id: &str,
    ) -> Result<Option<WeeklyQuestTask>, AppError> {
        self.get(collections::WEEKLY_QUEST_TASKS, quest_task_id)
            .await
    }

    /// The quest's live child set, read inside the transaction.
    pub async fn list_quest_tasks(&self, quest_id: &str) -> Result<Vec<WeeklyQuestTask>, AppError> {
        let quest_id = quest_id.to_string();
        self.reader
            .fluent()
            .select()
            .from(collections::WEEKLY_QUEST_TASKS)
            .filter(move |q| q.for_all([q.field("quest_id").eq(quest_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read quest tasks in transaction: {}", e))
            })
    }

    /// Active quests of a user, read inside the transaction.
    pub async fn list_active_quests(&self, user_id: &str) -> Result<Vec<WeeklyQuest>, AppError> {
        let user_id = user_id.to_string();
        self.reader
            .fluent()
            .select()
            .from(collections::WEEKLY_QUESTS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("status").eq("active"),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read quests in transaction: {}", e))
            })
    }

    // ─── Writes ──────────────────────────────────────────────────

    pub fn create_user(&mut self, user: &User) -> Result<(), AppError> {
        self.create(collections::USERS, &user.user_id, user)
    }

    /// Write the username and display name of `user` only.
    pub fn put_profile(&mut self, user: &User) -> Result<(), AppError> {
        self.client
            .fluent()
            .update()
            .fields(["username", "display_name"])
            .in_col(collections::USERS)
            .document_id(&user.user_id)
            .object(user)
            .add_to_transaction(&mut self.transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add profile to transaction: {}", e))
            })?;
        Ok(())
    }

    pub fn claim_username(&mut self, claim: &UsernameClaim) -> Result<(), AppError> {
        self.create(collections::USERNAMES, &claim.username, claim)
    }

    pub fn release_username(&mut self, username: &str) -> Result<(), AppError> {
        self.delete(collections::USERNAMES, username)
    }

    /// Record an unlock; the commit fails if the pair already exists.
    pub fn create_user_achievement(&mut self, unlock: &UserAchievement) -> Result<(), AppError> {
        self.create(
            collections::USER_ACHIEVEMENTS,
            &UserAchievement::document_id(&unlock.user_id, &unlock.achievement_key),
            unlock,
        )
    }

    /// Mark `marker.session_id` as the user's open session; the commit fails
    /// if the user already has one.
    pub fn create_active_session(&mut self, marker: &ActiveSessionMarker) -> Result<(), AppError> {
        self.create(collections::ACTIVE_FOCUS_SESSIONS, &marker.user_id, marker)
    }

    pub fn clear_active_session(&mut self, user_id: &str) -> Result<(), AppError> {
        self.delete(collections::ACTIVE_FOCUS_SESSIONS, user_id)
    }

    pub fn put_task(&mut self, task: &Task) -> Result<(), AppError> {
        self.put(collections::TASKS, &task.task_id, task)
    }

    pub fn put_session(&mut self, session: &FocusSession) -> Result<(), AppError> {
        self.put(collections::FOCUS_SESSIONS, &session.session_id, session)
    }

    pub fn put_quest(&mut self, quest: &WeeklyQuest) -> Result<(), AppError> {
        self.put(collections::WEEKLY_QUESTS, &quest.quest_id, quest)
    }

    pub fn put_quest_task(&mut self, task: &WeeklyQuestTask) -> Result<(), AppError> {
        self.put(collections::WEEKLY_QUEST_TASKS, &task.quest_task_id, task)
    }

    pub fn delete_quest_task(&mut self, quest_task_id: &str) -> Result<(), AppError> {
        self.delete(collections::WEEKLY_QUEST_TASKS, quest_task_id)
    }

    /// Write the streak fields of `user` only.
    pub fn put_streak(&mut self, user: &User) -> Result<(), AppError> {
        self.client
            .fluent()
            .update()
            .fields([
                "current_streak",
                "longest_streak",
                "last_active_date",
                "streak_start_date",
            ])
            .in_col(collections::USERS)
            .document_id(&user.user_id)
            .object(user)
            .add_to_transaction(&mut self.transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add streak to transaction: {}", e))
            })?;
        Ok(())
    }

    /// Increment user counters such as `tasks_completed`.
    pub fn increment_user(&mut self, user_id: &str, fields: &[(&str, i64)]) -> Result<(), AppError> {
        self.increment(collections::USERS, user_id, fields)
    }

    /// Credit points to the user and append the ledger entry.
    pub fn credit(&mut self, entry: &RewardHistory) -> Result<(), AppError> {
        if entry.points > 0 {
            let points = i64::try_from(entry.points)
                .map_err(|_| AppError::Internal(anyhow::anyhow!("Point award overflow")))?;
            self.increment(collections::USERS, &entry.user_id, &[("total_points", points)])?;
        }
        self.put(collections::REWARD_HISTORY, &entry.entry_id, entry)
    }

    /// Upsert the `(user, date)` progress row and add `delta` to its counters.
    pub fn bump_progress(
        &mut self,
        user_id: &str,
        date: NaiveDate,
        delta: &ProgressDelta,
    ) -> Result<(), AppError> {
        let doc_id = DailyProgress::document_id(user_id, date);
        let base = DailyProgress::empty(user_id, date);
        let increments = delta.increments();

        // Key fields are written on every bump so the row exists before the
        // counters are incremented; counters are excluded from the mask.
        self.client
            .fluent()
            .update()
            .fields(["user_id", "date"])
            .in_col(collections::DAILY_PROGRESS)
            .document_id(&doc_id)
            .object(&base)
            .add_to_transaction(&mut self.transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add progress to transaction: {}", e))
            })?;

        self.increment(collections::DAILY_PROGRESS, &doc_id, &increments)
    }

    pub fn archive_streak(&mut self, record: &StreakHistory) -> Result<(), AppError> {
        let doc_id = format!(
            "{}_{}",
            record.user_id,
            record.end_date.format("%Y-%m-%d")
        );
        self.put(collections::STREAK_HISTORY, &doc_id, record)
    }

    /// Atomically apply every buffered write.
    pub async fn commit(self) -> Result<(), AppError> {
        self.transaction
            .commit()
            .await
            .map_err(|e| commit_error(e.to_string()))?;
        Ok(())
    }

    /// Like [`commit`](Self::commit), but a failed create precondition
    /// discards every write and returns `false`.
    pub async fn commit_if_absent(self) -> Result<bool, AppError> {
        match self.transaction.commit().await {
            Ok(_) => Ok(true),
            Err(e) if is_already_exists(&e) => {
                tracing::debug!(error = %e, "Create precondition failed, nothing written");
                Ok(false)
            }
            Err(e) => Err(commit_error(e.to_string())),
        }
    }

    /// Discard every buffered write.
    pub async fn rollback(self) {
        if let Err(e) = self.transaction.rollback().await {
            tracing::warn!(error = %e, "Transaction rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_error_mapping() {
        assert!(matches!(
            commit_error("status: Aborted, message: \"Too much contention\"".to_string()),
            AppError::Contention(_)
        ));
        assert!(matches!(
            commit_error("INVALID_ARGUMENT: bad field path".to_string()),
            AppError::Database(_)
        ));
    }

    #[test]
    fn test_contention_detection() {
        assert!(is_contention("status: Aborted, message: \"Too much contention\""));
        assert!(is_contention("ABORTED: transaction conflict"));
        assert!(!is_contention("PERMISSION_DENIED: missing credentials"));
    }
}
