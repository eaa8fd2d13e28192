//! Request-scoped trace identifier for correlating logs across fan-out tasks.
//!
//! The identifier lives in Tokio task-local storage. Task-locals are not
//! inherited by spawned tasks, so the fan-out executor and the datadump
//! worker re-enter the scope explicitly through [`TraceId::scope`] or
//! [`TraceId::propagate`].

use std::future::Future;

use tokio::task_local;
use uuid::Uuid;

task_local! {
    static TRACE_ID: TraceId;
}

/// Header carrying the trace identifier on every HTTP response.
pub const TRACE_ID_HEADER: &str = "trace-id";

/// Correlation identifier for one request or one datadump job.
///
/// # Examples
/// ```
/// use sensornet::domain::TraceId;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let trace_id: TraceId = "00000000-0000-0000-0000-000000000000".parse().expect("uuid");
/// let seen = TraceId::scope(trace_id, async { TraceId::current() }).await;
/// assert_eq!(seen, Some(trace_id));
/// # });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Generate a new random trace identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Construct a trace identifier from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the current trace identifier if one is in scope.
    #[must_use]
    pub fn current() -> Option<Self> {
        TRACE_ID.try_with(|id| *id).ok()
    }

    /// Execute `fut` with `trace_id` in scope.
    pub async fn scope<Fut>(trace_id: Self, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        TRACE_ID.scope(trace_id, fut).await
    }

    /// Wrap `fut` so that it runs under the caller's trace identifier, if any.
    ///
    /// The identifier is captured when this function is called, so the
    /// returned future can be handed to `tokio::spawn`.
    pub fn propagate<Fut>(fut: Fut) -> impl Future<Output = Fut::Output>
    where
        Fut: Future,
    {
        let captured = Self::current();
        async move {
            match captured {
                Some(id) => TRACE_ID.scope(id, fut).await,
                None => fut.await,
            }
        }
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TraceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_is_none_out_of_scope() {
        assert!(TraceId::current().is_none());
    }

    #[tokio::test]
    async fn spawned_task_sees_propagated_id() {
        let expected = TraceId::generate();
        let observed = TraceId::scope(expected, async {
            let handle = tokio::spawn(TraceId::propagate(async { TraceId::current() }));
            handle.await.expect("task joins")
        })
        .await;
        assert_eq!(observed, Some(expected));
    }

    #[tokio::test]
    async fn bare_spawn_loses_trace_id() {
        let observed = TraceId::scope(TraceId::generate(), async {
            tokio::spawn(async { TraceId::current() })
                .await
                .expect("task joins")
        })
        .await;
        assert_eq!(observed, None);
    }

    #[test]
    fn from_str_round_trips() {
        let uuid = Uuid::nil();
        let trace_id: TraceId = uuid.to_string().parse().expect("parse uuid");
        assert_eq!(trace_id.to_string(), uuid.to_string());
    }
}
