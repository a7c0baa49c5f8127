//! Collaborator abstractions the harness drives.
//!
//! The harness never talks to a cluster directly. Provisioning, event
//! transport and log collection are reached only through the three traits
//! below, so any channel backend can be tested without the harness branching
//! on a channel kind.
//!
//! ```text
//! ┌──────────────────┐
//! │ TestMatrixRunner │
//! └───┬────┬─────┬───┘
//!     │    │     │
//!     ▼    ▼     ▼
//! Cluster  EventPublisher  LogSource   (traits)
//!     │    │     │
//!     ▼    ▼     ▼
//!   real cluster / MemoryCluster
//! ```
//!
//! All traits are `Send + Sync + 'static` and their futures are `Send`, so a
//! single implementation can be shared across scenario tasks behind an `Arc`.

use std::future::Future;

use crate::error::ClusterError;
use crate::event::EventEnvelope;
use crate::types::{ChannelDescriptor, ResourceRef, ResourceStatus, SubscriptionSpec};

/// Resource lifecycle operations on the target cluster.
///
/// # Error Handling
///
/// - Missing resources: `ClusterError::NotFound`
/// - Name collisions: `ClusterError::AlreadyExists`
/// - Invalid requests (unserved API version, dangling references): `ClusterError::Rejected`
/// - Connectivity problems: `ClusterError::Unavailable`
pub trait Cluster: Send + Sync + 'static {
    /// Creates a channel of the given implementation.
    fn create_channel(
        &self,
        name: &str,
        channel: &ChannelDescriptor,
    ) -> impl Future<Output = Result<ResourceRef, ClusterError>> + Send;

    /// Creates the subscriber endpoint (event logger plus its service).
    fn create_subscriber(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<ResourceRef, ClusterError>> + Send;

    /// Creates a subscription binding a channel to a subscriber.
    ///
    /// Must fail without retrying when the referenced channel or subscriber
    /// does not exist.
    fn create_subscription(
        &self,
        spec: &SubscriptionSpec,
    ) -> impl Future<Output = Result<ResourceRef, ClusterError>> + Send;

    /// Reports the resource's self-assessed readiness.
    fn status(
        &self,
        resource: &ResourceRef,
    ) -> impl Future<Output = Result<ResourceStatus, ClusterError>> + Send;

    /// Resolves the address events should be sent to.
    fn address_of(
        &self,
        resource: &ResourceRef,
    ) -> impl Future<Output = Result<String, ClusterError>> + Send;

    /// Deletes a resource. Returns `ClusterError::NotFound` if it is already gone.
    fn delete(
        &self,
        resource: &ResourceRef,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;
}

/// Sends events to a channel.
pub trait EventPublisher: Send + Sync + 'static {
    /// Publishes one event to the channel.
    ///
    /// An `Ok` means the channel accepted the event; delivery to subscribers
    /// is confirmed separately from the subscriber's output.
    fn publish(
        &self,
        channel: &ResourceRef,
        event: &EventEnvelope,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;
}

/// Reads a subscriber's observable output.
pub trait LogSource: Send + Sync + 'static {
    /// Returns everything the subscriber has logged so far.
    fn read(
        &self,
        subscriber: &ResourceRef,
    ) -> impl Future<Output = Result<String, ClusterError>> + Send;
}
