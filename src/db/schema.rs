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

pub const SCHEMA_SQL: &str = r#"
-- Namespace and database
DEFINE NAMESPACE cadence;
USE NS cadence;
DEFINE DATABASE core;
USE DB core;

-- Table: campaign_template
-- Reusable multi-step sequence definitions. Templates referenced by an
-- active instance are never mutated; a new version is created instead.
DEFINE TABLE OVERWRITE campaign_template SCHEMAFULL;
DEFINE FIELD OVERWRITE owner_id ON campaign_template TYPE string;
DEFINE FIELD OVERWRITE name ON campaign_template TYPE string
    ASSERT string::len($value) > 0 AND string::len($value) <= 256;
DEFINE FIELD OVERWRITE campaign_type ON campaign_template TYPE string
    ASSERT $value IN ['email', 'linkedin', 'multichannel'];
DEFINE FIELD OVERWRITE path_type ON campaign_template TYPE string
    ASSERT $value IN ['structured', 'dynamic'];
DEFINE FIELD OVERWRITE is_active ON campaign_template TYPE bool DEFAULT true;
DEFINE FIELD OVERWRITE steps ON campaign_template FLEXIBLE TYPE array;
DEFINE FIELD OVERWRITE settings ON campaign_template FLEXIBLE TYPE object DEFAULT {};
DEFINE FIELD OVERWRITE created_at ON campaign_template TYPE datetime DEFAULT time::now();

DEFINE INDEX OVERWRITE template_owner_idx ON campaign_template FIELDS owner_id;

-- Table: campaign_instance
-- Running materialization of a template; owner of the aggregate counters.
-- Counters are monotone and only move via the event pipeline's transaction
-- (database-side `+= 1`).
DEFINE TABLE OVERWRITE campaign_instance SCHEMAFULL;
DEFINE FIELD OVERWRITE template_id ON campaign_instance TYPE string;
DEFINE FIELD OVERWRITE owner_id ON campaign_instance TYPE string;
DEFINE FIELD OVERWRITE name ON campaign_instance TYPE string
    ASSERT string::len($value) > 0 AND string::len($value) <= 256;
DEFINE FIELD OVERWRITE status ON campaign_instance TYPE string DEFAULT 'draft'
    ASSERT $value IN ['draft', 'active', 'paused', 'completed', 'archived'];
DEFINE FIELD OVERWRITE provider ON campaign_instance TYPE string;
DEFINE FIELD OVERWRITE total_sent ON campaign_instance TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD OVERWRITE total_delivered ON campaign_instance TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD OVERWRITE total_opened ON campaign_instance TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD OVERWRITE total_clicked ON campaign_instance TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD OVERWRITE total_replied ON campaign_instance TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD OVERWRITE total_bounced ON campaign_instance TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD OVERWRITE total_unsubscribed ON campaign_instance TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD OVERWRITE total_errored ON campaign_instance TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD OVERWRITE started_at ON campaign_instance TYPE option<datetime>;
DEFINE FIELD OVERWRITE paused_at ON campaign_instance TYPE option<datetime>;
DEFINE FIELD OVERWRITE completed_at ON campaign_instance TYPE option<datetime>;
DEFINE FIELD OVERWRITE created_at ON campaign_instance TYPE datetime DEFAULT time::now();

DEFINE INDEX OVERWRITE instance_owner_idx ON campaign_instance FIELDS owner_id;
DEFINE INDEX OVERWRITE instance_template_idx ON campaign_instance FIELDS template_id;
DEFINE INDEX OVERWRITE instance_status_idx ON campaign_instance FIELDS status;

-- Table: campaign_enrollment
-- One contact's journey through one instance. provider_message_id is the
-- correlation key from webhooks back to the enrollment; the store enforces
-- one active enrollment per (instance, contact) and per-channel uniqueness
-- of provider_message_id before insert.
DEFINE TABLE OVERWRITE campaign_enrollment SCHEMAFULL;
DEFINE FIELD OVERWRITE instance_id ON campaign_enrollment TYPE string;
DEFINE FIELD OVERWRITE contact_email ON campaign_enrollment TYPE string
    ASSERT string::contains($value, '@');
DEFINE FIELD OVERWRITE contact ON campaign_enrollment FLEXIBLE TYPE object DEFAULT {};
DEFINE FIELD OVERWRITE channel ON campaign_enrollment TYPE string
    ASSERT $value IN ['email', 'linkedin', 'video'];
DEFINE FIELD OVERWRITE provider_message_id ON campaign_enrollment TYPE option<string>;
DEFINE FIELD OVERWRITE current_step ON campaign_enrollment TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD OVERWRITE status ON campaign_enrollment TYPE string DEFAULT 'active'
    ASSERT $value IN ['active', 'paused', 'completed', 'bounced', 'unsubscribed'];
DEFINE FIELD OVERWRITE next_action_at ON campaign_enrollment TYPE option<datetime>;
DEFINE FIELD OVERWRITE created_at ON campaign_enrollment TYPE datetime DEFAULT time::now();

DEFINE INDEX OVERWRITE enrollment_instance_idx ON campaign_enrollment FIELDS instance_id;
DEFINE INDEX OVERWRITE enrollment_message_idx ON campaign_enrollment FIELDS channel, provider_message_id;
DEFINE INDEX OVERWRITE enrollment_contact_idx ON campaign_enrollment FIELDS instance_id, contact_email;

-- Table: campaign_event
-- Normalized telemetry. The record id IS the dedup key (provider event id
-- scoped by provider, or a digest of the enrollment-scoped natural key), so
-- findOrCreate is a single idempotent CREATE; no separate unique index is
-- needed for events without a provider-supplied id.
DEFINE TABLE OVERWRITE campaign_event SCHEMAFULL;
DEFINE FIELD OVERWRITE enrollment_id ON campaign_event TYPE string;
DEFINE FIELD OVERWRITE instance_id ON campaign_event TYPE string;
DEFINE FIELD OVERWRITE event_type ON campaign_event TYPE string
    ASSERT $value IN ['sent', 'delivered', 'opened', 'clicked', 'replied',
        'bounced', 'unsubscribed', 'errored', 'video_generated', 'video_failed'];
DEFINE FIELD OVERWRITE channel ON campaign_event TYPE string
    ASSERT $value IN ['email', 'linkedin', 'video'];
DEFINE FIELD OVERWRITE provider ON campaign_event TYPE string;
DEFINE FIELD OVERWRITE provider_event_id ON campaign_event TYPE option<string>;
DEFINE FIELD OVERWRITE timestamp ON campaign_event TYPE datetime;
DEFINE FIELD OVERWRITE step_number ON campaign_event TYPE option<int>;
DEFINE FIELD OVERWRITE metadata ON campaign_event FLEXIBLE TYPE object DEFAULT {};

-- campaign_event is write-heavy (every webhook lands here); keep only the
-- indexes the read paths actually use.
DEFINE INDEX OVERWRITE event_instance_idx ON campaign_event FIELDS instance_id;
DEFINE INDEX OVERWRITE event_enrollment_idx ON campaign_event FIELDS enrollment_id;

-- Table: orphaned_event
-- Durable delayed-retry queue backing store. Entries become visible to the
-- processor once due_at passes.
DEFINE TABLE OVERWRITE orphaned_event SCHEMAFULL;
DEFINE FIELD OVERWRITE event ON orphaned_event FLEXIBLE TYPE object;
DEFINE FIELD OVERWRITE retry_count ON orphaned_event TYPE int DEFAULT 0 ASSERT $value >= 0;
DEFINE FIELD OVERWRITE due_at ON orphaned_event TYPE datetime;
DEFINE FIELD OVERWRITE created_at ON orphaned_event TYPE datetime DEFAULT time::now();

DEFINE INDEX OVERWRITE orphan_due_idx ON orphaned_event FIELDS due_at;

-- Table: dead_letter_event
-- Events rejected after all retries, held for admin replay.
DEFINE TABLE OVERWRITE dead_letter_event SCHEMAFULL;
DEFINE FIELD OVERWRITE provider ON dead_letter_event TYPE string;
DEFINE FIELD OVERWRITE payload ON dead_letter_event FLEXIBLE TYPE object;
DEFINE FIELD OVERWRITE signature ON dead_letter_event TYPE option<string>;
DEFINE FIELD OVERWRITE failure_reason ON dead_letter_event TYPE string;
DEFINE FIELD OVERWRITE status ON dead_letter_event TYPE string DEFAULT 'failed'
    ASSERT $value IN ['failed', 'replaying', 'replayed'];
DEFINE FIELD OVERWRITE created_at ON dead_letter_event TYPE datetime DEFAULT time::now();
DEFINE FIELD OVERWRITE replayed_at ON dead_letter_event TYPE option<datetime>;

DEFINE INDEX OVERWRITE dlq_status_idx ON dead_letter_event FIELDS status;
DEFINE INDEX OVERWRITE dlq_provider_idx ON dead_letter_event FIELDS provider;

-- Table: workflow_execution
-- One run of a declarative workflow. current_step is the index of the last
-- completed step (-1 before the first); terminal statuses are final.
DEFINE TABLE OVERWRITE workflow_execution SCHEMAFULL;
DEFINE FIELD OVERWRITE workflow_name ON workflow_execution TYPE string
    ASSERT string::len($value) > 0 AND string::len($value) <= 256;
DEFINE FIELD OVERWRITE status ON workflow_execution TYPE string DEFAULT 'running'
    ASSERT $value IN ['running', 'completed', 'failed'];
DEFINE FIELD OVERWRITE context ON workflow_execution FLEXIBLE TYPE object DEFAULT {};
DEFINE FIELD OVERWRITE current_step ON workflow_execution TYPE int DEFAULT -1;
DEFINE FIELD OVERWRITE error ON workflow_execution TYPE option<string>;
DEFINE FIELD OVERWRITE started_at ON workflow_execution TYPE datetime DEFAULT time::now();
DEFINE FIELD OVERWRITE completed_at ON workflow_execution TYPE option<datetime>;

DEFINE INDEX OVERWRITE wf_exec_name_idx ON workflow_execution FIELDS workflow_name;
DEFINE INDEX OVERWRITE wf_exec_status_idx ON workflow_execution FIELDS status;
DEFINE INDEX OVERWRITE wf_exec_started_idx ON workflow_execution FIELDS started_at;

-- Table: workflow_failure
-- Audit record written in the same transaction that flips an execution to
-- 'failed'.
DEFINE TABLE OVERWRITE workflow_failure SCHEMAFULL;
DEFINE FIELD OVERWRITE workflow_id ON workflow_failure TYPE string;
DEFINE FIELD OVERWRITE failed_step ON workflow_failure TYPE string;
DEFINE FIELD OVERWRITE error_message ON workflow_failure TYPE string;
DEFINE FIELD OVERWRITE context ON workflow_failure FLEXIBLE TYPE object DEFAULT {};
DEFINE FIELD OVERWRITE created_at ON workflow_failure TYPE datetime DEFAULT time::now();

DEFINE INDEX OVERWRITE wf_failure_workflow_idx ON workflow_failure FIELDS workflow_id;
"#;
