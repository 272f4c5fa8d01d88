//! Publishes one image stream through every registered transport.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    config::{ChannelOptions, QosProfile},
    context::NodeContext,
    error::TransportError,
    plugin::PublisherPlugin,
    registry::PluginRegistry,
    types::Image,
};

/// Advertises a base image topic on every transport of a registry.
///
/// Each transport publishes on its own channel below the base topic, e.g.
/// `/camera/image/raw`. Images are only encoded for transports that
/// currently have subscribers.
pub struct Publisher<N: NodeContext> {
    base_topic: String,
    plugins: Vec<Box<dyn PublisherPlugin<N>>>,
    valid: bool,
}

impl<N: NodeContext> Publisher<N> {
    /// Advertise `base_topic` on every publisher plugin in `registry`.
    ///
    /// Transports that fail to load or advertise are skipped with a
    /// warning; it is an error if none succeeds.
    pub fn advertise(
        node: &Arc<N>,
        registry: &PluginRegistry<N>,
        base_topic: &str,
        qos: &QosProfile,
        options: &ChannelOptions,
    ) -> Result<Self, TransportError> {
        let base_topic = node.expand_topic(base_topic)?;
        let mut plugins = Vec::new();

        for transport in registry.publisher_transports() {
            let advertised = registry.create_publisher(transport).and_then(|mut plugin| {
                plugin.advertise(node, &base_topic, qos, options)?;
                Ok(plugin)
            });

            match advertised {
                Ok(plugin) => plugins.push(plugin),
                Err(err) => {
                    warn!(transport = %transport, base_topic = %base_topic, "Failed to load publisher plugin: {err}");
                }
            }
        }

        if plugins.is_empty() {
            return Err(TransportError::ConstructionFailure(format!(
                "no publisher plugin could advertise '{base_topic}'"
            )));
        }

        info!(
            base_topic = %base_topic,
            transports = plugins.len(),
            "Advertised image publisher"
        );

        Ok(Self {
            base_topic,
            plugins,
            valid: true,
        })
    }

    /// The base topic.
    pub fn topic(&self) -> &str {
        &self.base_topic
    }

    /// Subscribers summed over all transports.
    pub fn num_subscribers(&self) -> usize {
        self.plugins.iter().map(|plugin| plugin.num_subscribers()).sum()
    }

    pub fn transports(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|plugin| plugin.transport_name())
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Publish on every transport that has a subscriber.
    ///
    /// A failing transport does not prevent the others from publishing;
    /// the first failure is returned.
    pub fn publish(&self, image: &Image) -> Result<(), TransportError> {
        self.ensure_valid()?;

        let mut result = Ok(());
        for plugin in self.active_plugins() {
            record(&mut result, plugin, plugin.publish(image));
        }
        result
    }

    /// Publish a uniquely owned image.
    ///
    /// Transports that cannot take ownership receive a reference first. The
    /// remaining ones receive copies, except the last, which takes the
    /// image itself.
    pub fn publish_owned(&self, image: Image) -> Result<(), TransportError> {
        self.ensure_valid()?;

        let (owning, borrowing): (Vec<_>, Vec<_>) = self
            .active_plugins()
            .partition(|plugin| plugin.supports_take_ownership_publish());

        let mut result = Ok(());
        for plugin in borrowing {
            record(&mut result, plugin, plugin.publish(&image));
        }

        if let Some((&last, rest)) = owning.split_last() {
            for &plugin in rest {
                record(&mut result, plugin, plugin.publish_owned(image.clone()));
            }
            record(&mut result, last, last.publish_owned(image));
        }

        result
    }

    /// Shut down every transport. Calling it again has no effect.
    pub fn shutdown(&mut self) {
        if !self.valid {
            return;
        }
        self.valid = false;

        for plugin in &mut self.plugins {
            plugin.shutdown();
        }
        info!(base_topic = %self.base_topic, "Shut down image publisher");
    }

    fn active_plugins(&self) -> impl Iterator<Item = &dyn PublisherPlugin<N>> {
        self.plugins
            .iter()
            .map(|plugin| &**plugin)
            .filter(|plugin| plugin.num_subscribers() > 0)
    }

    fn ensure_valid(&self) -> Result<(), TransportError> {
        if self.valid {
            Ok(())
        } else {
            error!(base_topic = %self.base_topic, "Call to publish() on an invalid image publisher");
            Err(TransportError::topic_not_advertised(self.base_topic.clone()))
        }
    }
}

/// Keep the first failure, logging every one.
fn record<N: NodeContext>(
    result: &mut Result<(), TransportError>,
    plugin: &dyn PublisherPlugin<N>,
    outcome: Result<(), TransportError>,
) {
    if let Err(err) = outcome {
        error!(transport = %plugin.transport_name(), "Failed to publish image: {err}");
        if result.is_ok() {
            *result = Err(err);
        }
    }
}

impl<N: NodeContext> Drop for Publisher<N> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
