//! Subscribes to one image stream through a transport chosen by name.

use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    config::{ChannelOptions, QosProfile},
    context::NodeContext,
    error::TransportError,
    plugin::{ImageCallback, SubscriberPlugin},
    registry::PluginRegistry,
    types::Image,
};

/// Receives images of a base topic through one transport.
pub struct Subscriber<N: NodeContext> {
    base_topic: String,
    plugin: Box<dyn SubscriberPlugin<N>>,
    valid: bool,
}

impl<N: NodeContext> Subscriber<N> {
    pub fn subscribe<F>(
        node: &Arc<N>,
        registry: &PluginRegistry<N>,
        base_topic: &str,
        transport: &str,
        qos: &QosProfile,
        options: &ChannelOptions,
        callback: F,
    ) -> Result<Self, TransportError>
    where
        F: Fn(Arc<Image>) + Send + Sync + 'static,
    {
        Self::subscribe_with(node, registry, base_topic, transport, qos, options, Arc::new(callback))
    }

    /// Like [`subscribe`](Self::subscribe) with an already shared callback.
    pub fn subscribe_with(
        node: &Arc<N>,
        registry: &PluginRegistry<N>,
        base_topic: &str,
        transport: &str,
        qos: &QosProfile,
        options: &ChannelOptions,
        callback: ImageCallback,
    ) -> Result<Self, TransportError> {
        let base_topic = node.expand_topic(base_topic)?;
        warn_on_transport_topic(registry, &base_topic);

        let mut plugin = registry.create_subscriber(transport)?;
        plugin.subscribe(node, &base_topic, qos, options, callback)?;

        info!(
            base_topic = %base_topic,
            transport = %transport,
            topic = %plugin.topic(),
            "Subscribed to image topic"
        );

        Ok(Self {
            base_topic,
            plugin,
            valid: true,
        })
    }

    /// The channel the transport actually listens on, empty after shutdown.
    pub fn topic(&self) -> &str {
        self.plugin.topic()
    }

    /// The expanded base topic the transport channel was derived from.
    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    pub fn transport(&self) -> &str {
        self.plugin.transport_name()
    }

    pub fn num_publishers(&self) -> usize {
        self.plugin.num_publishers()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Stop receiving images. Calling it again has no effect.
    pub fn shutdown(&mut self) {
        if !self.valid {
            return;
        }
        self.valid = false;
        self.plugin.shutdown();
        info!(base_topic = %self.base_topic, "Unsubscribed from image topic");
    }
}

impl<N: NodeContext> Drop for Subscriber<N> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Warn when the base topic already ends in a transport name, e.g.
/// `/camera/image/raw`.
fn warn_on_transport_topic<N: NodeContext>(registry: &PluginRegistry<N>, base_topic: &str) {
    let Some((parent, last)) = base_topic.rsplit_once('/') else {
        return;
    };
    if parent.is_empty() || !registry.contains_subscriber(last) {
        return;
    }

    warn!(
        topic = %base_topic,
        "It looks like you are trying to subscribe directly to a transport-specific image topic. \
         Subscribe to the base topic '{parent}' with transport '{last}' instead."
    );
}
