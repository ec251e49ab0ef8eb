//! Per-contact call lines of a campaign.
//!
//! Lines are keyed by `(campaign, external call id)` when the upstream call
//! id is known and by `(campaign, destination)` otherwise. An unkeyed line
//! is adopted (given the call id) the first time a call id for its
//! destination shows up, so one contact never ends up with a ghost line.

use std::sync::Arc;

use callsync_core::call_log::{self, CALL_STATUS, CALL_TIME, INTERACTION, RECORDING_URL, TRANSFERRED};
use callsync_core::campaign::{merge_numbers, CONTACT_NUMBER};
use callsync_core::fields::FieldChain;
use callsync_core::phone::PhoneNormalizer;
use callsync_core::status::{CallLineStatus, Interaction};
use callsync_core::types::DbId;
use callsync_db::models::call_line::{CallLine, CreateCallLine, UpdateCallLine};
use callsync_db::models::campaign::Campaign;
use callsync_events::{names, DomainEvent, EventSink};
use serde_json::Value;

use crate::error::SyncError;
use crate::recordings::RecordingResolver;
use crate::store::{StoreError, SyncStore};

/// Call id of a contact-list entry. Plain `id` is deliberately absent: on
/// contact entries it identifies the contact, not the call.
pub const CONTACT_CALL_ID: FieldChain = FieldChain::new(
    "contact_call_id",
    &["call_id", "callId", "execution_id", "call_sid"],
);

/// Identity of a line within a campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineKey {
    pub campaign_id: DbId,
    pub external_call_id: Option<String>,
    /// Canonical destination number.
    pub destination: String,
}

/// What an upsert did.
#[derive(Debug, Clone, PartialEq)]
pub enum LineWrite {
    Created(CallLine),
    Updated(CallLine),
    Unchanged(CallLine),
}

impl LineWrite {
    pub fn line(&self) -> &CallLine {
        match self {
            Self::Created(l) | Self::Updated(l) | Self::Unchanged(l) => l,
        }
    }
}

/// Merges contact-list attempts into call lines.
pub struct CallLineReconciler {
    store: Arc<dyn SyncStore>,
    events: Arc<dyn EventSink>,
    resolver: Arc<RecordingResolver>,
    phones: PhoneNormalizer,
}

impl CallLineReconciler {
    pub fn new(
        store: Arc<dyn SyncStore>,
        events: Arc<dyn EventSink>,
        resolver: Arc<RecordingResolver>,
        phones: PhoneNormalizer,
    ) -> Self {
        Self {
            store,
            events,
            resolver,
            phones,
        }
    }

    /// Reconcile a campaign's contact list. Returns the number of lines
    /// created or updated.
    ///
    /// Contacts are processed one at a time; a failed contact is logged and
    /// skipped. Afterwards every observed destination is unioned into the
    /// campaign's contact-number set.
    pub async fn reconcile_lines(&self, contacts: &[Value], campaign: &Campaign) -> usize {
        let mut touched = 0;
        let mut observed: Vec<String> = Vec::with_capacity(contacts.len());

        for contact in contacts {
            let Some(destination) = self.destination_of(contact) else {
                continue;
            };
            if !observed.contains(&destination) {
                observed.push(destination.clone());
            }

            match self.reconcile_contact(contact, &destination, campaign).await {
                Ok(LineWrite::Created(_) | LineWrite::Updated(_)) => touched += 1,
                Ok(LineWrite::Unchanged(_)) => {}
                Err(e) => tracing::warn!(
                    campaign_id = campaign.id,
                    destination = %destination,
                    error = %e,
                    "Call line reconcile failed"
                ),
            }
        }

        if let Err(e) = self.merge_contact_numbers(campaign, &observed).await {
            tracing::warn!(campaign_id = campaign.id, error = %e, "Contact number merge failed");
        }
        touched
    }

    fn destination_of(&self, contact: &Value) -> Option<String> {
        let raw = match contact {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(_) => CONTACT_NUMBER.text(contact),
            _ => None,
        }?;
        Some(self.phones.normalize(&raw)).filter(|n| !n.is_empty())
    }

    async fn reconcile_contact(
        &self,
        contact: &Value,
        destination: &str,
        campaign: &Campaign,
    ) -> Result<LineWrite, SyncError> {
        let mut fields = contact_fields(contact);
        let mut call_id = CONTACT_CALL_ID.text(contact);

        // Borrow what the contact entry lacks from a line already written
        // for the same call (typically by the log matcher).
        let source = match &call_id {
            Some(id) => match self.store.find_line_by_call_id(campaign.id, id).await? {
                Some(line) => Some(line),
                None => self.store.find_unkeyed_line(campaign.id, destination).await?,
            },
            None => {
                let latest = self
                    .store
                    .lines_to(campaign.id, destination)
                    .await?
                    .into_iter()
                    .next();
                if let Some(line) = &latest {
                    call_id = line.external_call_id.clone();
                }
                latest
            }
        };
        if let Some(line) = &source {
            borrow_fields(&mut fields, line);
        }

        if fields.recording_url.is_none() {
            if let Some(approx) = fields.call_time {
                let origin = campaign.origin_number.as_deref().unwrap_or("");
                fields.recording_url = self.resolver.resolve(destination, origin, approx).await;
            }
        }

        let key = LineKey {
            campaign_id: campaign.id,
            external_call_id: call_id,
            destination: destination.to_string(),
        };
        self.upsert_line(&key, fields).await
    }

    /// Insert or update the line identified by `key`.
    ///
    /// Present fields overwrite on update; absent fields are left alone. A
    /// duplicate-key insert (concurrent writer) falls back to an update.
    pub async fn upsert_line(
        &self,
        key: &LineKey,
        mut fields: UpdateCallLine,
    ) -> Result<LineWrite, SyncError> {
        fields.external_call_id = key.external_call_id.clone();

        if let Some(current) = self.find(key).await? {
            return self.apply(current, &fields).await;
        }

        let input = CreateCallLine {
            campaign_id: key.campaign_id,
            external_call_id: key.external_call_id.clone(),
            destination_number: key.destination.clone(),
            call_time: fields.call_time,
            status: fields.status.clone(),
            interaction: fields.interaction.clone(),
            duration_secs: fields.duration_secs,
            recording_url: fields.recording_url.clone(),
            transcript: fields.transcript.clone(),
            metadata: fields.metadata.clone(),
        };
        match self.store.create_line(&input).await {
            Ok(line) => {
                self.publish(names::CALL_LINE_CREATED, &line);
                Ok(LineWrite::Created(line))
            }
            Err(StoreError::Conflict(constraint)) => {
                tracing::debug!(
                    campaign_id = key.campaign_id,
                    constraint = %constraint,
                    "Duplicate call line insert, updating instead"
                );
                let current = self
                    .find(key)
                    .await?
                    .ok_or_else(|| SyncError::not_found("call_line", &key.destination))?;
                self.apply(current, &fields).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Keyed line, else an unkeyed line to the same destination.
    async fn find(&self, key: &LineKey) -> Result<Option<CallLine>, SyncError> {
        if let Some(call_id) = &key.external_call_id {
            if let Some(line) = self.store.find_line_by_call_id(key.campaign_id, call_id).await? {
                return Ok(Some(line));
            }
        }
        Ok(self
            .store
            .find_unkeyed_line(key.campaign_id, &key.destination)
            .await?)
    }

    async fn apply(&self, current: CallLine, fields: &UpdateCallLine) -> Result<LineWrite, SyncError> {
        if !differs(&current, fields) {
            return Ok(LineWrite::Unchanged(current));
        }
        let line = self.store.update_line(current.id, fields).await?;
        self.publish(names::CALL_LINE_UPDATED, &line);
        Ok(LineWrite::Updated(line))
    }

    async fn merge_contact_numbers(
        &self,
        campaign: &Campaign,
        observed: &[String],
    ) -> Result<(), SyncError> {
        // Re-read: the stored set may have grown since `campaign` was loaded.
        let current = self
            .store
            .find_campaign(campaign.id)
            .await?
            .ok_or_else(|| SyncError::not_found("campaign", campaign.id))?;
        let mut numbers = current.contact_numbers;
        if merge_numbers(&mut numbers, observed) {
            self.store.set_contact_numbers(campaign.id, &numbers).await?;
            tracing::debug!(
                campaign_id = campaign.id,
                contacts = numbers.len(),
                "Campaign contact numbers extended"
            );
        }
        Ok(())
    }

    fn publish(&self, name: &str, line: &CallLine) {
        self.events.publish(
            DomainEvent::new(name)
                .with_entity("call_line", line.id)
                .with_record(line),
        );
    }
}

/// Line fields carried by a contact-list entry.
pub fn contact_fields(contact: &Value) -> UpdateCallLine {
    if !contact.is_object() {
        return UpdateCallLine::default();
    }
    let status = CALL_STATUS.text(contact).map(|s| CallLineStatus::unify(&s));
    let duration_secs = call_log::duration_secs(contact);
    let interaction = INTERACTION
        .text(contact)
        .and_then(|s| Interaction::parse(&s))
        .or_else(|| {
            status.map(|st| {
                Interaction::derive(
                    st,
                    duration_secs.unwrap_or(0),
                    TRANSFERRED.flag(contact).unwrap_or(false),
                )
            })
        });

    UpdateCallLine {
        external_call_id: None,
        call_time: CALL_TIME.timestamp(contact),
        status: status.map(|s| s.as_str().to_string()),
        interaction: interaction.map(|i| i.as_str().to_string()),
        duration_secs,
        recording_url: RECORDING_URL.text(contact).filter(|u| u.starts_with("http")),
        transcript: call_log::transcript(contact),
        metadata: None,
    }
}

/// Fill fields `fields` lacks from an existing line. Defaults stored by the
/// schema (pending, zero duration) are not worth borrowing.
fn borrow_fields(fields: &mut UpdateCallLine, line: &CallLine) {
    if fields.call_time.is_none() {
        fields.call_time = line.call_time;
    }
    if fields.status.is_none() && line.status != CallLineStatus::Pending.as_str() {
        fields.status = Some(line.status.clone());
    }
    if fields.interaction.is_none() && line.interaction != Interaction::NoInteraction.as_str() {
        fields.interaction = Some(line.interaction.clone());
    }
    if fields.duration_secs.is_none() && line.duration_secs > 0 {
        fields.duration_secs = Some(line.duration_secs);
    }
    if fields.transcript.is_none() {
        fields.transcript = line.transcript.clone();
    }
    if fields.recording_url.is_none() {
        fields.recording_url = line.recording_url.clone();
    }
}

/// Whether applying `fields` would change `line`.
fn differs(line: &CallLine, fields: &UpdateCallLine) -> bool {
    fn set<T: PartialEq>(incoming: &Option<T>, stored: &T) -> bool {
        incoming.as_ref().is_some_and(|v| v != stored)
    }
    fn set_opt<T: PartialEq>(incoming: &Option<T>, stored: &Option<T>) -> bool {
        incoming.is_some() && incoming != stored
    }
    let metadata_changes = match (&fields.metadata, &line.metadata) {
        (Some(Value::Object(patch)), Value::Object(stored)) => {
            patch.iter().any(|(k, v)| stored.get(k) != Some(v))
        }
        (Some(patch), stored) => patch != stored,
        (None, _) => false,
    };

    set_opt(&fields.external_call_id, &line.external_call_id)
        || set_opt(&fields.call_time, &line.call_time)
        || set(&fields.status, &line.status)
        || set(&fields.interaction, &line.interaction)
        || set(&fields.duration_secs, &line.duration_secs)
        || set_opt(&fields.recording_url, &line.recording_url)
        || set_opt(&fields.transcript, &line.transcript)
        || metadata_changes
}
