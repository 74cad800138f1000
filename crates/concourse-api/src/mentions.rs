use std::collections::HashSet;

use tracing::{debug, warn};
use uuid::Uuid;

use concourse_types::collaborators::{
    DirectoryUser, MentionNotification, NotificationSender, UserDirectory,
};

fn is_handle_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Scan message content for `@handle` tokens.
///
/// A token starts at an `@` that is not glued to a preceding identifier
/// character, so email addresses are not picked up. Trailing sentence
/// punctuation that happens to be a handle character ("@alice.") is
/// trimmed. Duplicates are kept; resolution dedupes by user.
pub fn parse_mention_handles(content: &str) -> Vec<String> {
    let mut handles = Vec::new();
    let mut prev: Option<char> = None;

    for (i, c) in content.char_indices() {
        if c == '@' && prev.is_none_or(|p| !is_handle_char(p)) {
            let start = i + 1;
            let mut end = start;
            for (j, d) in content[start..].char_indices() {
                if !is_handle_char(d) {
                    break;
                }
                end = start + j + d.len_utf8();
            }

            let token = content[start..end].trim_end_matches(['.', '-']);
            if !token.is_empty() {
                handles.push(token.to_string());
            }
        }
        prev = Some(c);
    }

    handles
}

/// Resolve mention tokens against the user directory.
///
/// Handles match case-insensitively. Unresolvable tokens are skipped per
/// token, the author never mentions themselves into a notification, and a
/// user mentioned twice resolves once.
pub async fn resolve_mentions(
    directory: &dyn UserDirectory,
    author: Uuid,
    content: &str,
) -> Vec<DirectoryUser> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for handle in parse_mention_handles(content) {
        match directory.find_by_handle(&handle).await {
            Some(user) => {
                if user.id != author && seen.insert(user.id) {
                    resolved.push(user);
                }
            }
            None => debug!("unresolved mention token '@{}'", handle),
        }
    }

    resolved
}

/// Deliver one notification per recipient. Failures are logged and
/// skipped; the message is already persisted and a missed toast must not
/// fail the send.
pub async fn dispatch_mentions(
    notifier: &dyn NotificationSender,
    recipients: &[DirectoryUser],
    notification: &MentionNotification,
) {
    for recipient in recipients {
        if let Err(e) = notifier.send(recipient.id, notification.clone()).await {
            warn!(
                "mention notification to {} failed: {:#}",
                recipient.id, e
            );
        }
    }
}
