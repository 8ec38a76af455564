/// What a batch does when one of its tasks fails.
///
/// - `CollectAll`: every task runs to completion or failure; the caller gets
///   one `Result` per submission index.
/// - `FailFast`: the first failure (in completion order) abandons every
///   still-queued task of the batch and is returned as the batch error.
///   Tasks already running finish, but their results are discarded.
///
/// `CollectAll` is the default: missing one chunk should not doom a whole
/// generation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Run everything, report per index.
    #[default]
    CollectAll,
    /// Stop at the first failure.
    FailFast,
}

impl FailurePolicy {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            FailurePolicy::CollectAll => "collect_all",
            FailurePolicy::FailFast => "fail_fast",
        }
    }
}
