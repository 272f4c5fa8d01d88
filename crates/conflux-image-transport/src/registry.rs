//! Resolves transport names to plugin factories.

use indexmap::IndexMap;
use itertools::Itertools;
use tracing::{debug, warn};

use crate::{
    context::NodeContext,
    error::TransportError,
    plugin::{PublisherPlugin, SubscriberPlugin, publisher_lookup_name, subscriber_lookup_name},
    raw::{RAW_TRANSPORT, RawPublisher, RawSubscriber},
};

pub type PublisherFactory<N> =
    Box<dyn Fn() -> Result<Box<dyn PublisherPlugin<N>>, TransportError> + Send + Sync>;

pub type SubscriberFactory<N> =
    Box<dyn Fn() -> Result<Box<dyn SubscriberPlugin<N>>, TransportError> + Send + Sync>;

/// Publisher and subscriber factories keyed by plugin lookup name, e.g.
/// `image_transport/raw_pub`.
pub struct PluginRegistry<N: NodeContext> {
    publishers: IndexMap<String, (String, PublisherFactory<N>)>,
    subscribers: IndexMap<String, (String, SubscriberFactory<N>)>,
}

impl<N: NodeContext> Default for PluginRegistry<N> {
    fn default() -> Self {
        Self {
            publishers: IndexMap::new(),
            subscribers: IndexMap::new(),
        }
    }
}

impl<N: NodeContext> PluginRegistry<N> {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the `raw` transport.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_publisher(RAW_TRANSPORT, || {
            Ok(Box::new(RawPublisher::<N>::default()) as Box<dyn PublisherPlugin<N>>)
        });
        registry.register_subscriber(RAW_TRANSPORT, || {
            Ok(Box::new(RawSubscriber::<N>::default()) as Box<dyn SubscriberPlugin<N>>)
        });
        registry
    }

    /// Register the publisher half of `transport`, replacing any previous
    /// registration.
    pub fn register_publisher<F>(&mut self, transport: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn PublisherPlugin<N>>, TransportError> + Send + Sync + 'static,
    {
        let lookup_name = publisher_lookup_name(transport);
        debug!(lookup_name = %lookup_name, "Registered publisher plugin");
        self.publishers
            .insert(lookup_name, (transport.to_string(), Box::new(factory)));
    }

    /// Register the subscriber half of `transport`, replacing any previous
    /// registration.
    pub fn register_subscriber<F>(&mut self, transport: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn SubscriberPlugin<N>>, TransportError> + Send + Sync + 'static,
    {
        let lookup_name = subscriber_lookup_name(transport);
        debug!(lookup_name = %lookup_name, "Registered subscriber plugin");
        self.subscribers
            .insert(lookup_name, (transport.to_string(), Box::new(factory)));
    }

    pub fn create_publisher(&self, transport: &str) -> Result<Box<dyn PublisherPlugin<N>>, TransportError> {
        let lookup_name = publisher_lookup_name(transport);
        let Some((_, factory)) = self.publishers.get(&lookup_name) else {
            warn!(
                lookup_name = %lookup_name,
                declared = %self.publishers.keys().join(", "),
                "Unknown publisher plugin"
            );
            return Err(TransportError::UnknownTransport { lookup_name });
        };
        factory()
    }

    pub fn create_subscriber(&self, transport: &str) -> Result<Box<dyn SubscriberPlugin<N>>, TransportError> {
        let lookup_name = subscriber_lookup_name(transport);
        let Some((_, factory)) = self.subscribers.get(&lookup_name) else {
            warn!(
                lookup_name = %lookup_name,
                declared = %self.subscribers.keys().join(", "),
                "Unknown subscriber plugin"
            );
            return Err(TransportError::UnknownTransport { lookup_name });
        };
        factory()
    }

    /// Whether a subscriber plugin is registered for `transport`.
    pub fn contains_subscriber(&self, transport: &str) -> bool {
        self.subscribers
            .contains_key(&subscriber_lookup_name(transport))
    }

    /// Transport names with at least one registered half, in registration
    /// order.
    pub fn declared_transports(&self) -> Vec<String> {
        self.publishers
            .values()
            .map(|(name, _)| name)
            .chain(self.subscribers.values().map(|(name, _)| name))
            .unique()
            .cloned()
            .collect()
    }

    /// Transport names with a registered publisher, in registration order.
    pub fn publisher_transports(&self) -> impl Iterator<Item = &str> {
        self.publishers.values().map(|(name, _)| name.as_str())
    }

    /// Transports with both halves registered and whose publisher factory
    /// succeeds.
    pub fn loadable_transports(&self) -> Vec<String> {
        self.publishers
            .iter()
            .filter(|(_, (name, _))| self.contains_subscriber(name))
            .filter_map(|(lookup_name, (name, factory))| match factory() {
                Ok(_) => Some(name.clone()),
                Err(err) => {
                    debug!(lookup_name = %lookup_name, "Transport is not loadable: {err}");
                    None
                }
            })
            .collect()
    }
}
