use fanout_dns_domain::DomainError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline carried by one in-flight query.
#[derive(Debug, Clone, Default)]
pub struct ExchangeSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ExchangeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Signal that fires when `token` is cancelled.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Child signal: cancelled with its parent, and additionally bounded by `timeout`
    /// (the earlier of the two deadlines wins).
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The error the signal would report right now, `None` while still live.
    pub fn error(&self) -> Option<DomainError> {
        if self.token.is_cancelled() {
            return Some(DomainError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DomainError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Completes once the signal fires, yielding its reason.
    pub async fn fired(&self) -> DomainError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => DomainError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => DomainError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                DomainError::Cancelled
            }
        }
    }
}
