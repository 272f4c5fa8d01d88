use std::sync::Arc;

use crate::{
    camera_publisher::CameraPublisher,
    camera_subscriber::CameraSubscriber,
    config::{ChannelOptions, QosProfile},
    context::NodeContext,
    error::TransportError,
    publisher::Publisher,
    registry::PluginRegistry,
    subscriber::Subscriber,
    types::{CameraInfo, Image},
};

/// Entry point bundling a node with the transports it may use.
pub struct ImageTransport<N: NodeContext> {
    node: Arc<N>,
    registry: PluginRegistry<N>,
    options: ChannelOptions,
}

impl<N: NodeContext> ImageTransport<N> {
    /// Use the default transports.
    pub fn new(node: Arc<N>) -> Self {
        Self::with_registry(node, PluginRegistry::with_defaults())
    }

    pub fn with_registry(node: Arc<N>, registry: PluginRegistry<N>) -> Self {
        Self {
            node,
            registry,
            options: ChannelOptions::new(),
        }
    }

    /// Options passed through to every channel opened from here.
    pub fn with_options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    pub fn node(&self) -> &Arc<N> {
        &self.node
    }

    pub fn registry(&self) -> &PluginRegistry<N> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PluginRegistry<N> {
        &mut self.registry
    }

    pub fn advertise(&self, base_topic: &str, qos: &QosProfile) -> Result<Publisher<N>, TransportError> {
        Publisher::advertise(&self.node, &self.registry, base_topic, qos, &self.options)
    }

    pub fn subscribe<F>(
        &self,
        base_topic: &str,
        transport: &str,
        qos: &QosProfile,
        callback: F,
    ) -> Result<Subscriber<N>, TransportError>
    where
        F: Fn(Arc<Image>) + Send + Sync + 'static,
    {
        Subscriber::subscribe(
            &self.node,
            &self.registry,
            base_topic,
            transport,
            qos,
            &self.options,
            callback,
        )
    }

    pub fn advertise_camera(
        &self,
        base_topic: &str,
        qos: &QosProfile,
    ) -> Result<CameraPublisher<N>, TransportError> {
        CameraPublisher::advertise(&self.node, &self.registry, base_topic, qos, &self.options)
    }

    pub fn subscribe_camera<F>(
        &self,
        base_topic: &str,
        transport: &str,
        qos: &QosProfile,
        callback: F,
    ) -> Result<CameraSubscriber<N>, TransportError>
    where
        F: Fn(Arc<Image>, Arc<CameraInfo>) + Send + Sync + 'static,
    {
        let mut subscriber = CameraSubscriber::new(self.node.clone()).with_options(self.options.clone());
        subscriber.open(&self.registry, base_topic, transport, qos, callback)?;
        Ok(subscriber)
    }

    /// Every transport name known to the registry.
    pub fn declared_transports(&self) -> Vec<String> {
        self.registry.declared_transports()
    }

    /// Transports that can actually be instantiated.
    pub fn loadable_transports(&self) -> Vec<String> {
        self.registry.loadable_transports()
    }
}
