//! The transport plugin contract.
//!
//! Every encoding provides a [`PublisherPlugin`] and a [`SubscriberPlugin`].
//! Callers never see the encoding: they hand an [`Image`] to a publisher
//! plugin and receive an [`Image`] from a subscriber plugin. Plugins are
//! resolved by name through the [`registry`](crate::registry).

use std::sync::Arc;

use crate::{
    config::{ChannelOptions, QosProfile},
    context::NodeContext,
    error::TransportError,
    types::{Image, TransportDescriptor},
};

/// Namespace prefixed to every plugin lookup name.
pub const PLUGIN_NAMESPACE: &str = "image_transport";

/// Registry key of the publisher half of `transport`.
///
/// ```
/// use conflux_image_transport::plugin::publisher_lookup_name;
///
/// assert_eq!(publisher_lookup_name("compressed"), "image_transport/compressed_pub");
/// ```
pub fn publisher_lookup_name(transport: &str) -> String {
    format!("{PLUGIN_NAMESPACE}/{transport}_pub")
}

/// Registry key of the subscriber half of `transport`.
pub fn subscriber_lookup_name(transport: &str) -> String {
    format!("{PLUGIN_NAMESPACE}/{transport}_sub")
}

/// Callback receiving decoded images.
pub type ImageCallback = Arc<dyn Fn(Arc<Image>) + Send + Sync>;

/// Publisher half of a transport.
pub trait PublisherPlugin<N: NodeContext>: Send + Sync {
    /// Stable, non-empty transport identifier.
    fn transport_name(&self) -> &str;

    /// Whether [`publish_owned`](Self::publish_owned) consumes the image
    /// without copying. Plugins returning `true` override both.
    fn supports_take_ownership_publish(&self) -> bool {
        false
    }

    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::new(self.transport_name(), self.supports_take_ownership_publish())
    }

    fn lookup_name(&self) -> String {
        publisher_lookup_name(self.transport_name())
    }

    /// Open the transport channel for `base_topic`.
    ///
    /// Fails with [`TransportError::AlreadyAdvertised`] when called again
    /// before [`shutdown`](Self::shutdown).
    fn advertise(
        &mut self,
        node: &N,
        base_topic: &str,
        qos: &QosProfile,
        options: &ChannelOptions,
    ) -> Result<(), TransportError>;

    /// Subscribers on the transport channel, 0 when not advertised.
    fn num_subscribers(&self) -> usize;

    /// The transport channel, empty when not advertised.
    fn topic(&self) -> &str;

    fn publish(&self, image: &Image) -> Result<(), TransportError>;

    /// Publish a uniquely owned image.
    fn publish_owned(&self, image: Image) -> Result<(), TransportError> {
        drop(image);
        Err(TransportError::not_implemented(
            self.transport_name(),
            "publish_owned",
        ))
    }

    /// Publish `template`'s layout with pixel data taken from `data`.
    ///
    /// `data` must hold at least `step * height` bytes; extra bytes are
    /// ignored.
    fn publish_from_raw_buffer(&self, template: &Image, data: &[u8]) -> Result<(), TransportError> {
        let expected = template.expected_len();
        let Some(payload) = data.get(..expected) else {
            return Err(TransportError::BufferTooSmall {
                expected,
                actual: data.len(),
            });
        };

        let mut image = template.layout_only();
        image.data = payload.to_vec();
        self.publish(&image)
    }

    /// Close the transport channel. Calling it again has no effect.
    fn shutdown(&mut self);
}

/// Subscriber half of a transport.
pub trait SubscriberPlugin<N: NodeContext>: Send + Sync {
    fn transport_name(&self) -> &str;

    fn lookup_name(&self) -> String {
        subscriber_lookup_name(self.transport_name())
    }

    /// Open the transport channel for `base_topic`. `callback` receives
    /// every decoded image.
    fn subscribe(
        &mut self,
        node: &N,
        base_topic: &str,
        qos: &QosProfile,
        options: &ChannelOptions,
        callback: ImageCallback,
    ) -> Result<(), TransportError>;

    fn topic(&self) -> &str;

    fn num_publishers(&self) -> usize;

    fn shutdown(&mut self);
}
