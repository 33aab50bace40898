// Copyright 2025 Cadence Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Campaign store: templates, instances and enrollments.
//!
//! Counter *reads* live here; counter writes happen exclusively inside the
//! event pipeline's transaction. The store enforces the relational
//! invariants SurrealDB's partial indexes cannot: one active enrollment per
//! (instance, contact), and per-channel uniqueness of
//! `provider_message_id`.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::{queries, DBClient};
use crate::models::{
    CampaignCounters, CampaignEnrollment, CampaignEvent, CampaignInstance, CampaignTemplate,
    CampaignType, Channel, EnrollmentStatus, InstanceStatus, PathType, TemplateStep,
};
use crate::security::{ValidationError, Validator};

/// Campaign store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Store for campaign templates, instances and enrollments.
pub struct CampaignStore {
    db: Arc<DBClient>,
}

impl CampaignStore {
    pub fn new(db: Arc<DBClient>) -> Self {
        Self { db }
    }

    fn rows_to<T: serde::de::DeserializeOwned>(
        rows: Vec<serde_json::Value>,
    ) -> Result<Vec<T>, StoreError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| StoreError::Database(anyhow::anyhow!("deserialization failed: {}", e)))
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    /// Creates a template and returns its id.
    #[instrument(name = "store_create_template", skip(self, steps, settings), fields(owner = %owner_id, name = %name))]
    pub async fn create_template(
        &self,
        owner_id: &str,
        name: &str,
        campaign_type: CampaignType,
        path_type: PathType,
        steps: Vec<TemplateStep>,
        settings: serde_json::Value,
    ) -> Result<String, StoreError> {
        let name = Validator::validate_workflow_name(name)?;
        let id = Uuid::new_v4().to_string();

        self.db
            .create(
                "campaign_template",
                &id,
                serde_json::json!({
                    "owner_id": owner_id,
                    "name": name,
                    "campaign_type": campaign_type,
                    "path_type": path_type,
                    "is_active": true,
                    "steps": steps,
                    "settings": settings,
                }),
            )
            .await?;

        info!(template_id = %id, "Campaign template created");
        Ok(id)
    }

    /// Loads a template by id.
    pub async fn get_template(&self, id: &str) -> Result<CampaignTemplate, StoreError> {
        let id = Validator::validate_id(id)?;
        let query = format!(
            r#"SELECT meta::id(id) AS id, owner_id, name, campaign_type, path_type,
                   is_active, steps, settings, created_at
               FROM campaign_template WHERE meta::id(id) = '{}'"#,
            id
        );
        let rows = self.db.query_json(&query).await?;
        Self::rows_to::<CampaignTemplate>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("campaign_template:{}", id)))
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Materializes a template into a draft instance.
    #[instrument(name = "store_create_instance", skip(self), fields(template_id = %template_id))]
    pub async fn create_instance(
        &self,
        template_id: &str,
        owner_id: &str,
        name: &str,
        provider: &str,
    ) -> Result<String, StoreError> {
        // The template must exist; a dangling instance has no steps to run.
        self.get_template(template_id).await?;

        let name = Validator::validate_workflow_name(name)?;
        let id = Uuid::new_v4().to_string();

        self.db
            .create(
                "campaign_instance",
                &id,
                serde_json::json!({
                    "template_id": template_id,
                    "owner_id": owner_id,
                    "name": name,
                    "status": InstanceStatus::Draft,
                    "provider": provider,
                }),
            )
            .await?;

        info!(instance_id = %id, "Campaign instance created");
        Ok(id)
    }

    /// Loads an instance by id.
    pub async fn get_instance(&self, id: &str) -> Result<CampaignInstance, StoreError> {
        let id = Validator::validate_id(id)?;
        let query = format!(
            "{} WHERE meta::id(id) = '{}'",
            queries::instance::SELECT_BASE,
            id
        );
        let rows = self.db.query_json(&query).await?;
        Self::rows_to::<CampaignInstance>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("campaign_instance:{}", id)))
    }

    /// Counter snapshot for one instance.
    pub async fn get_counters(&self, id: &str) -> Result<CampaignCounters, StoreError> {
        Ok(self.get_instance(id).await?.counters)
    }

    /// Applies a validated status transition, stamping the lifecycle
    /// timestamp that goes with it.
    #[instrument(name = "store_transition_instance", skip(self), fields(instance_id = %id, next = %next))]
    pub async fn transition_instance(
        &self,
        id: &str,
        next: InstanceStatus,
    ) -> Result<(), StoreError> {
        let instance = self.get_instance(id).await?;

        if !instance.status.can_transition_to(next) {
            warn!(from = %instance.status, to = %next, "Rejected instance transition");
            return Err(StoreError::InvalidTransition {
                from: instance.status,
                to: next,
            });
        }

        let mut assignments = vec![format!("status = '{}'", next)];
        match next {
            InstanceStatus::Active => {
                assignments.push("started_at = started_at ?? time::now()".to_string())
            }
            InstanceStatus::Paused => assignments.push("paused_at = time::now()".to_string()),
            InstanceStatus::Completed => {
                assignments.push("completed_at = time::now()".to_string())
            }
            _ => {}
        }

        let query = format!(
            "UPDATE campaign_instance:`{}` SET {}",
            instance.id,
            assignments.join(", ")
        );
        self.db.execute(&query).await?;

        info!(from = %instance.status, to = %next, "Instance transitioned");
        Ok(())
    }

    /// Deletes an instance. Forbidden while active enrollments exist;
    /// archiving is the supported terminal transition for finished
    /// campaigns.
    #[instrument(name = "store_delete_instance", skip(self), fields(instance_id = %id))]
    pub async fn delete_instance(&self, id: &str) -> Result<(), StoreError> {
        let instance = self.get_instance(id).await?;

        let active = self
            .db
            .query_json_with_params(
                "SELECT count() AS n FROM campaign_enrollment \
                 WHERE instance_id = $instance AND status = 'active' GROUP ALL",
                vec![("instance".to_string(), serde_json::json!(instance.id))],
            )
            .await?;
        let active_count = active
            .first()
            .and_then(|row| row["n"].as_u64())
            .unwrap_or(0);

        if active_count > 0 {
            return Err(StoreError::Conflict(format!(
                "instance {} still has {} active enrollments; archive it instead",
                instance.id, active_count
            )));
        }

        self.db
            .delete(&format!("campaign_instance:{}", instance.id))
            .await?;
        info!("Instance deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Enrollments
    // ------------------------------------------------------------------

    /// Enrolls a contact into an instance.
    ///
    /// At most one *active* enrollment may exist per (instance, contact);
    /// re-enrolling a contact whose previous journey ended is allowed.
    #[instrument(name = "store_enroll", skip(self, contact), fields(instance_id = %instance_id, contact = %contact_email))]
    pub async fn enroll(
        &self,
        instance_id: &str,
        contact_email: &str,
        contact: serde_json::Value,
        channel: Channel,
    ) -> Result<String, StoreError> {
        let instance = self.get_instance(instance_id).await?;

        let existing = self
            .db
            .query_json_with_params(
                "SELECT count() AS n FROM campaign_enrollment \
                 WHERE instance_id = $instance AND contact_email = $email AND status = 'active' \
                 GROUP ALL",
                vec![
                    ("instance".to_string(), serde_json::json!(instance.id)),
                    ("email".to_string(), serde_json::json!(contact_email)),
                ],
            )
            .await?;
        let duplicates = existing
            .first()
            .and_then(|row| row["n"].as_u64())
            .unwrap_or(0);

        if duplicates > 0 {
            return Err(StoreError::Conflict(format!(
                "contact {} already has an active enrollment in instance {}",
                contact_email, instance.id
            )));
        }

        let id = Uuid::new_v4().to_string();
        self.db
            .create(
                "campaign_enrollment",
                &id,
                serde_json::json!({
                    "instance_id": instance.id,
                    "contact_email": contact_email,
                    "contact": contact,
                    "channel": channel,
                    "current_step": 0,
                    "status": EnrollmentStatus::Active,
                }),
            )
            .await?;

        info!(enrollment_id = %id, "Contact enrolled");
        Ok(id)
    }

    /// Records the provider message id written at outbound dispatch.
    ///
    /// The (channel, provider_message_id) pair is the correlation key
    /// webhooks resolve against, so it must be unique once set.
    #[instrument(name = "store_mark_dispatched", skip(self), fields(enrollment_id = %enrollment_id))]
    pub async fn mark_dispatched(
        &self,
        enrollment_id: &str,
        provider_message_id: &str,
    ) -> Result<(), StoreError> {
        let enrollment = self.get_enrollment(enrollment_id).await?;

        if let Some(holder) = self
            .find_enrollment_by_message(enrollment.channel, provider_message_id)
            .await?
        {
            if holder.id != enrollment.id {
                return Err(StoreError::Conflict(format!(
                    "provider_message_id {} already belongs to enrollment {} on channel {}",
                    provider_message_id, holder.id, enrollment.channel
                )));
            }
        }

        self.db
            .execute_with_params(
                "UPDATE type::thing('campaign_enrollment', $id) \
                 SET provider_message_id = $message_id",
                vec![
                    ("id".to_string(), serde_json::json!(enrollment.id)),
                    (
                        "message_id".to_string(),
                        serde_json::json!(provider_message_id),
                    ),
                ],
            )
            .await?;

        info!(message_id = %provider_message_id, "Enrollment marked dispatched");
        Ok(())
    }

    /// Loads an enrollment by id.
    pub async fn get_enrollment(&self, id: &str) -> Result<CampaignEnrollment, StoreError> {
        let id = Validator::validate_id(id)?;
        let query = format!(
            "{} WHERE meta::id(id) = '{}'",
            queries::enrollment::SELECT_BASE,
            id
        );
        let rows = self.db.query_json(&query).await?;
        Self::rows_to::<CampaignEnrollment>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("campaign_enrollment:{}", id)))
    }

    /// Telemetry events recorded for one enrollment, oldest first.
    pub async fn list_events(
        &self,
        enrollment_id: &str,
    ) -> Result<Vec<CampaignEvent>, StoreError> {
        let rows = self
            .db
            .query_json_with_params(
                &format!(
                    "{} WHERE enrollment_id = $enrollment ORDER BY timestamp ASC",
                    queries::event::SELECT_BASE
                ),
                vec![("enrollment".to_string(), serde_json::json!(enrollment_id))],
            )
            .await?;
        Self::rows_to::<CampaignEvent>(rows)
    }

    /// Resolves an enrollment from its webhook correlation key.
    pub async fn find_enrollment_by_message(
        &self,
        channel: Channel,
        provider_message_id: &str,
    ) -> Result<Option<CampaignEnrollment>, StoreError> {
        let rows = self
            .db
            .query_json_with_params(
                queries::enrollment::BY_MESSAGE,
                vec![
                    ("channel".to_string(), serde_json::json!(channel)),
                    (
                        "message_id".to_string(),
                        serde_json::json!(provider_message_id),
                    ),
                ],
            )
            .await?;

        Ok(Self::rows_to::<CampaignEnrollment>(rows)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (tempfile::TempDir, CampaignStore) {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("store_test_db");
        let db = Arc::new(
            DBClient::new(db_path.to_str().unwrap())
                .await
                .expect("DB creation failed"),
        );
        db.initialize_schema().await.expect("Schema init failed");
        (temp_dir, CampaignStore::new(db))
    }

    async fn seed_instance(store: &CampaignStore) -> String {
        let template_id = store
            .create_template(
                "acct_1",
                "SaaS founders sequence",
                CampaignType::Email,
                PathType::Structured,
                vec![TemplateStep {
                    step_number: 1,
                    channel: Channel::Email,
                    action: "send_email".to_string(),
                    delay_hours: 0,
                    settings: serde_json::json!({}),
                }],
                serde_json::json!({}),
            )
            .await
            .expect("template create failed");

        store
            .create_instance(&template_id, "acct_1", "Q3 outbound", "lemlist")
            .await
            .expect("instance create failed")
    }

    #[tokio::test]
    async fn test_instance_lifecycle() {
        let (_tmp, store) = setup().await;
        let instance_id = seed_instance(&store).await;

        let instance = store.get_instance(&instance_id).await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Draft);
        assert!(instance.started_at.is_none());

        store
            .transition_instance(&instance_id, InstanceStatus::Active)
            .await
            .unwrap();
        let instance = store.get_instance(&instance_id).await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Active);
        assert!(instance.started_at.is_some());

        // active -> archived skips completed and is not a legal edge
        let err = store
            .transition_instance(&instance_id, InstanceStatus::Archived)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_enroll_rejects_second_active() {
        let (_tmp, store) = setup().await;
        let instance_id = seed_instance(&store).await;

        store
            .enroll(
                &instance_id,
                "ada@example.com",
                serde_json::json!({"first_name": "Ada"}),
                Channel::Email,
            )
            .await
            .unwrap();

        let err = store
            .enroll(
                &instance_id,
                "ada@example.com",
                serde_json::json!({}),
                Channel::Email,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_mark_dispatched_and_lookup() {
        let (_tmp, store) = setup().await;
        let instance_id = seed_instance(&store).await;

        let enrollment_id = store
            .enroll(
                &instance_id,
                "ada@example.com",
                serde_json::json!({}),
                Channel::Email,
            )
            .await
            .unwrap();

        store
            .mark_dispatched(&enrollment_id, "msg_X")
            .await
            .unwrap();

        let found = store
            .find_enrollment_by_message(Channel::Email, "msg_X")
            .await
            .unwrap()
            .expect("enrollment should resolve");
        assert_eq!(found.id, enrollment_id);

        // Same key on another channel resolves nothing
        assert!(store
            .find_enrollment_by_message(Channel::Linkedin, "msg_X")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_dispatched_rejects_duplicate_key() {
        let (_tmp, store) = setup().await;
        let instance_id = seed_instance(&store).await;

        let first = store
            .enroll(&instance_id, "ada@example.com", serde_json::json!({}), Channel::Email)
            .await
            .unwrap();
        let second = store
            .enroll(&instance_id, "grace@example.com", serde_json::json!({}), Channel::Email)
            .await
            .unwrap();

        store.mark_dispatched(&first, "msg_shared").await.unwrap();
        let err = store
            .mark_dispatched(&second, "msg_shared")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_instance_blocked_by_active_enrollments() {
        let (_tmp, store) = setup().await;
        let instance_id = seed_instance(&store).await;

        store
            .enroll(&instance_id, "ada@example.com", serde_json::json!({}), Channel::Email)
            .await
            .unwrap();

        let err = store.delete_instance(&instance_id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_counters_start_at_zero() {
        let (_tmp, store) = setup().await;
        let instance_id = seed_instance(&store).await;

        let counters = store.get_counters(&instance_id).await.unwrap();
        assert_eq!(counters.total_sent, 0);
        assert_eq!(counters.total_delivered, 0);
        assert_eq!(counters.open_rate(), 0.0);
    }
}
