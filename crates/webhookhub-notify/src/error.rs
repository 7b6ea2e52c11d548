/// Delivery failure for a single backend.
///
/// The dispatcher only distinguishes two kinds and logs both; neither ever
/// reaches the client that posted the webhook.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Network, TLS or configuration problem; the service never answered.
    #[error("{backend}: backend unavailable: {reason}")]
    Unavailable { backend: &'static str, reason: String },

    /// The service answered and refused the notification.
    #[error("{backend}: delivery rejected: {detail}")]
    Rejected { backend: &'static str, detail: String },
}

impl NotifyError {
    pub fn unavailable(backend: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            backend,
            reason: reason.to_string(),
        }
    }

    pub fn rejected(backend: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Rejected {
            backend,
            detail: detail.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::Rejected { .. } => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_backend() {
        let err = NotifyError::rejected("discord", "status=400");
        assert_eq!(err.kind(), "rejected");
        assert_eq!(err.to_string(), "discord: delivery rejected: status=400");

        let err = NotifyError::unavailable("smtp", "connection refused");
        assert_eq!(err.kind(), "unavailable");
        assert!(err.to_string().contains("connection refused"));
    }
}
