//! Wire events for the reconciler's work channel.

use super::dag::NodeId;

#[derive(Clone, Debug)]
pub enum Event {
    /// Re-run the named node; collapses with any already-pending enqueue
    /// for the same node (§4.3 "latest-wins").
    Enqueue(NodeId),
    /// Periodic recency sweep: check every node's staleness threshold.
    Tick,
}
