//! In-process implementations of the external collaborator contracts.
//!
//! Real deployments inject their own directory, notification and storage
//! adapters; these cover the dev server and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use concourse_types::collaborators::{
    AttachmentStore, DirectoryUser, MentionNotification, NotificationSender, StoredAttachment,
    UserDirectory,
};

/// Directory backed by a map, loaded once at startup.
pub struct InMemoryDirectory {
    users: RwLock<HashMap<Uuid, DirectoryUser>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, user: DirectoryUser) {
        self.users
            .write()
            .expect("directory lock poisoned")
            .insert(user.id, user);
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn get(&self, user_id: Uuid) -> Option<DirectoryUser> {
        self.users
            .read()
            .expect("directory lock poisoned")
            .get(&user_id)
            .cloned()
    }

    async fn find_by_handle(&self, handle: &str) -> Option<DirectoryUser> {
        self.users
            .read()
            .expect("directory lock poisoned")
            .values()
            .find(|u| u.handle.eq_ignore_ascii_case(handle))
            .cloned()
    }
}

/// Notification sender that only logs. Stands in for push/email/toast in
/// the dev server.
pub struct LoggingNotifier;

#[async_trait]
impl NotificationSender for LoggingNotifier {
    async fn send(
        &self,
        recipient: Uuid,
        notification: MentionNotification,
    ) -> anyhow::Result<()> {
        info!(
            "notify {}: mentioned by {} in {} ({})",
            recipient,
            notification.mentioned_by_name,
            notification.container_name,
            notification.message_id
        );
        Ok(())
    }
}

/// Attachment store that keeps nothing and hands back a synthetic stable
/// URL per upload.
pub struct InMemoryAttachmentStore {
    counter: AtomicU64,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for InMemoryAttachmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn store(&self, name: &str, _kind: &str, bytes: Vec<u8>) -> anyhow::Result<StoredAttachment> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        info!("stored attachment '{}' ({} bytes)", name, bytes.len());
        Ok(StoredAttachment {
            url: format!("concourse://attachments/{seq}/{name}"),
        })
    }
}

/// Test double that records every notification it is asked to deliver.
#[cfg(test)]
pub(crate) struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<(Uuid, MentionNotification)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(Uuid, MentionNotification)> {
        self.sent.lock().expect("notifier lock poisoned").clone()
    }
}

#[cfg(test)]
#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(
        &self,
        recipient: Uuid,
        notification: MentionNotification,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("notifier lock poisoned")
            .push((recipient, notification));
        Ok(())
    }
}
