use std::sync::Arc;

use concourse_db::Database;
use concourse_gateway::dispatcher::Dispatcher;
use concourse_gateway::typing::TypingTracker;
use concourse_types::collaborators::{AttachmentStore, NotificationSender, UserDirectory};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub typing: TypingTracker,
    pub directory: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn NotificationSender>,
    pub attachments: Arc<dyn AttachmentStore>,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::collaborators::{InMemoryAttachmentStore, InMemoryDirectory, RecordingNotifier};
    use concourse_types::collaborators::DirectoryUser;
    use uuid::Uuid;

    pub struct TestHarness {
        pub state: AppState,
        pub directory: Arc<InMemoryDirectory>,
        pub notifier: Arc<RecordingNotifier>,
    }

    pub fn harness() -> TestHarness {
        let directory = Arc::new(InMemoryDirectory::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().expect("in-memory db"),
            dispatcher: Dispatcher::new(),
            typing: TypingTracker::new(),
            directory: directory.clone(),
            notifier: notifier.clone(),
            attachments: Arc::new(InMemoryAttachmentStore::new()),
        });
        TestHarness { state, directory, notifier }
    }

    pub fn seed_user(directory: &InMemoryDirectory, handle: &str) -> Uuid {
        let id = Uuid::new_v4();
        directory.insert(DirectoryUser {
            id,
            handle: handle.to_string(),
            display_name: handle.to_string(),
            email: format!("{handle}@example.test"),
            avatar_url: None,
            role: "staff".to_string(),
            online: true,
            last_seen_at: None,
        });
        id
    }
}
