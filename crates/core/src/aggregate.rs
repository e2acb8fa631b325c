//! Aggregate contract and optimistic concurrency expectations.

/// Optimistic concurrency expectation for an append.
///
/// The version of a stream is the number of events it holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must not exist yet (first-time creation).
    NoStream,
    /// Require the stream to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::NoStream => actual == 0,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    /// Version the stream is expected to be at, `0` for [`ExpectedVersion::NoStream`].
    pub fn as_version(self) -> u64 {
        match self {
            ExpectedVersion::NoStream => 0,
            ExpectedVersion::Exact(v) => v,
        }
    }
}

/// Event-sourced aggregate (pure, deterministic).
///
/// An aggregate wraps a state value that is rebuilt by folding the aggregate's
/// event stream. Command methods are inherent methods on the implementing type:
/// they take `&self`, inspect the wrapped state and return the events to
/// append (an empty list when the command is a no-op).
///
/// Aggregates must not perform IO or mutate their state; state only evolves
/// by replaying events.
pub trait Aggregate: Sized {
    /// Folded state.
    type State: Default + Clone + core::fmt::Debug;
    /// Closed set of events this aggregate emits.
    type Event: Clone + core::fmt::Debug;

    /// Stable aggregate type name; also names the aggregate's feed.
    const AGGREGATE_TYPE: &'static str;

    fn from_state(state: Self::State) -> Self;

    fn state(&self) -> &Self::State;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_stream_only_matches_empty_streams() {
        assert!(ExpectedVersion::NoStream.matches(0));
        assert!(!ExpectedVersion::NoStream.matches(1));
    }

    #[test]
    fn exact_matches_only_its_version() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
        assert_eq!(ExpectedVersion::Exact(3).as_version(), 3);
    }
}
