use thiserror::Error;

/// Error taxonomy for the messaging core.
///
/// Validation and permission variants are recoverable and surfaced to the
/// caller as-is; `Storage` covers infrastructure failures the calling layer
/// may retry.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("an active channel named \"{0}\" already exists")]
    DuplicateName(String),

    #[error("channel name is empty")]
    InvalidName,

    #[error("message content is empty")]
    EmptyContent,

    #[error("attachment payload is not valid base64")]
    InvalidAttachment,

    #[error("reply target does not exist in this container")]
    InvalidReply,

    #[error("a conversation needs two distinct participants")]
    InvalidParticipants,

    #[error("permission denied")]
    PermissionDenied,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    /// Whether the caller can fix this by changing the request, as opposed
    /// to a transient infrastructure failure worth retrying.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}
