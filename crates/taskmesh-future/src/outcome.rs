//! Terminal snapshot of a completion cell.

/// The terminal state of an asynchronous result.
///
/// Values are cloned into every registered continuation, which is why the
/// handle types require `T: Clone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The producer delivered a value.
    Ready(T),
    /// The producer failed; the message travels verbatim.
    Failed(String),
    /// The producer honored a discard request (or abandoned the result).
    Discarded,
}

impl<T> Outcome<T> {
    /// Whether this is a `Ready` outcome.
    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }

    /// Whether this is a `Failed` outcome.
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Whether this is a `Discarded` outcome.
    pub fn is_discarded(&self) -> bool {
        matches!(self, Outcome::Discarded)
    }
}
