//! The execution-context capability.
//!
//! Transports and subscriptions are generic over a [`NodeContext`]: the
//! messaging runtime that owns naming, channels and timers. The crate ships
//! an in-process implementation in [`memory`](crate::memory); a middleware
//! binding implements the same trait at the boundary.

use std::{sync::Arc, time::Duration};

use crate::{
    config::{ChannelOptions, QosProfile},
    error::TransportError,
    topic::expand_topic_name,
    types::Message,
};

/// Callback invoked for every message delivered on a channel.
pub type MessageCallback<M> = Box<dyn Fn(Arc<M>) + Send + Sync>;

/// Callback invoked on every timer period.
pub type TimerCallback = Box<dyn FnMut() + Send>;

/// An open publish endpoint on one channel. Dropping it releases the
/// channel registration.
pub trait ChannelPublisher<M>: Send + Sync {
    fn publish(&self, message: M);

    fn topic_name(&self) -> &str;

    fn subscription_count(&self) -> usize;
}

/// An open receive endpoint on one channel. Dropping it unsubscribes.
pub trait ChannelSubscription: Send + Sync {
    fn topic_name(&self) -> &str;

    fn publisher_count(&self) -> usize;
}

/// A periodic timer. Dropping the handle does not stop the timer; call
/// [`cancel`](TimerHandle::cancel).
pub trait TimerHandle: Send + Sync {
    fn cancel(&self);

    fn is_canceled(&self) -> bool;
}

/// Messaging runtime seen by transports: naming scope, channel factories
/// and timers.
///
/// The runtime delivers each channel's callbacks and the timer callbacks
/// serialized with respect to each other.
pub trait NodeContext: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn namespace(&self) -> &str;

    /// Expand `topic` under this node's naming scope.
    fn expand_topic(&self, topic: &str) -> Result<String, TransportError> {
        expand_topic_name(topic, self.name(), self.namespace())
    }

    fn create_publisher<M: Message>(
        &self,
        topic: &str,
        qos: &QosProfile,
        options: &ChannelOptions,
    ) -> Result<Box<dyn ChannelPublisher<M>>, TransportError>;

    fn create_subscription<M: Message>(
        &self,
        topic: &str,
        qos: &QosProfile,
        options: &ChannelOptions,
        callback: MessageCallback<M>,
    ) -> Result<Box<dyn ChannelSubscription>, TransportError>;

    fn create_wall_timer(&self, period: Duration, callback: TimerCallback) -> Box<dyn TimerHandle>;
}
