/// Boxroom core: membership and live post aggregation for a box.
///
/// - `membership`: roster of one box with author protection
/// - `aggregate`: pure reduction of a feed snapshot into per-user stats
/// - `subscription`: lifecycle of live feed and profile subscriptions
/// - `watch`: subscriptions composed with reduction, published on `watch` channels
/// - `actions`: action-sheet command routing
///
/// Every store interaction goes through the collaborator traits in `ports`.

pub mod actions;
pub mod aggregate;
pub mod context;
pub mod membership;
pub mod notify;
pub mod ports;
pub mod subscription;
pub mod watch;

pub use actions::{ActionDispatcher, Outcome, Selection};
pub use aggregate::reduce;
pub use context::BoxContext;
pub use membership::MembershipStore;
pub use notify::{MemoryNotifier, Notifier, TracingNotifier};
pub use ports::{BoxStore, FeedStore, Listener, ListenerId, ProfileStore};
pub use subscription::{FeedSubscriber, ProfileSubscriber, SubscriptionHandle, SubscriptionState};
pub use watch::{ProfileWatcher, UserStatsWatcher};

#[cfg(test)]
mod testing;
