//! Subscriber plugin for encodings that map to exactly one channel.

use std::{marker::PhantomData, sync::Arc};
use tracing::{debug, warn};

use crate::{
    config::{ChannelOptions, QosProfile},
    context::{ChannelSubscription, NodeContext},
    error::TransportError,
    plugin::{ImageCallback, SubscriberPlugin},
    topic::transport_topic,
    types::{Image, Message},
};

/// The decode step of a single-channel transport.
pub trait ImageDecoder: Send + Sync + 'static {
    /// Message type received on the transport channel.
    type Encoded: Message;

    fn transport_name(&self) -> &str;

    fn decode(&self, message: Arc<Self::Encoded>) -> Result<Arc<Image>, TransportError>;

    /// Channel used for `base_topic`.
    fn topic_to_subscribe(&self, base_topic: &str) -> String {
        transport_topic(base_topic, self.transport_name())
    }
}

/// [`SubscriberPlugin`] built from an [`ImageDecoder`].
///
/// Messages that fail to decode are logged and skipped.
pub struct SimpleSubscriber<N, D>
where
    N: NodeContext,
    D: ImageDecoder,
{
    decoder: Arc<D>,
    subscription: Option<Box<dyn ChannelSubscription>>,
    _node: PhantomData<fn(&N)>,
}

impl<N, D> SimpleSubscriber<N, D>
where
    N: NodeContext,
    D: ImageDecoder,
{
    pub fn new(decoder: D) -> Self {
        Self {
            decoder: Arc::new(decoder),
            subscription: None,
            _node: PhantomData,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }
}

impl<N, D> Default for SimpleSubscriber<N, D>
where
    N: NodeContext,
    D: ImageDecoder + Default,
{
    fn default() -> Self {
        Self::new(D::default())
    }
}

impl<N, D> SubscriberPlugin<N> for SimpleSubscriber<N, D>
where
    N: NodeContext,
    D: ImageDecoder,
{
    fn transport_name(&self) -> &str {
        self.decoder.transport_name()
    }

    fn subscribe(
        &mut self,
        node: &N,
        base_topic: &str,
        qos: &QosProfile,
        options: &ChannelOptions,
        callback: ImageCallback,
    ) -> Result<(), TransportError> {
        if let Some(subscription) = &self.subscription {
            return Err(TransportError::AlreadySubscribed {
                transport: self.transport_name().to_string(),
                topic: subscription.topic_name().to_string(),
            });
        }

        let topic = self.decoder.topic_to_subscribe(base_topic);
        let decoder = self.decoder.clone();

        let subscription = node.create_subscription::<D::Encoded>(
            &topic,
            qos,
            options,
            Box::new(move |message: Arc<D::Encoded>| match decoder.decode(message) {
                Ok(image) => callback(image),
                Err(err) => {
                    warn!(transport = %decoder.transport_name(), "Dropping undecodable message: {err}");
                }
            }),
        )?;

        debug!(
            transport = %self.transport_name(),
            topic = %subscription.topic_name(),
            "Subscribed to transport channel"
        );
        self.subscription = Some(subscription);
        Ok(())
    }

    fn topic(&self) -> &str {
        self.subscription
            .as_ref()
            .map_or("", |subscription| subscription.topic_name())
    }

    fn num_publishers(&self) -> usize {
        self.subscription
            .as_ref()
            .map_or(0, |subscription| subscription.publisher_count())
    }

    fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            debug!(
                transport = %self.decoder.transport_name(),
                topic = %subscription.topic_name(),
                "Unsubscribed from transport channel"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBus, MemoryNode};
    use std::sync::Mutex;

    /// Transport carrying a width-only grey image, rejecting width 0.
    struct WidthDecoder;

    impl ImageDecoder for WidthDecoder {
        type Encoded = u32;

        fn transport_name(&self) -> &str {
            "width"
        }

        fn decode(&self, message: Arc<u32>) -> Result<Arc<Image>, TransportError> {
            if *message == 0 {
                return Err(TransportError::Decode {
                    transport: "width".to_string(),
                    reason: "zero width".to_string(),
                });
            }
            Ok(Arc::new(Image {
                width: *message,
                height: 1,
                step: *message,
                encoding: "mono8".to_string(),
                data: vec![0; *message as usize],
                ..Default::default()
            }))
        }
    }

    fn recorder() -> (ImageCallback, Arc<Mutex<Vec<u32>>>) {
        let widths = Arc::new(Mutex::new(Vec::new()));
        let sink = widths.clone();
        let callback: ImageCallback = Arc::new(move |image: Arc<Image>| {
            sink.lock().unwrap().push(image.width);
        });
        (callback, widths)
    }

    #[test]
    fn test_subscribe_decodes_messages() {
        let node = MemoryBus::new().create_node("viewer", "/");
        let (callback, widths) = recorder();

        let mut subscriber = SimpleSubscriber::<MemoryNode, _>::new(WidthDecoder);
        subscriber
            .subscribe(&node, "/camera/image", &QosProfile::default(), &ChannelOptions::new(), callback)
            .unwrap();
        assert_eq!(subscriber.topic(), "/camera/image/width");

        let publisher = node
            .create_publisher::<u32>("/camera/image/width", &QosProfile::default(), &ChannelOptions::new())
            .unwrap();
        assert_eq!(subscriber.num_publishers(), 1);

        publisher.publish(8);
        publisher.publish(0);
        publisher.publish(16);
        assert_eq!(*widths.lock().unwrap(), vec![8, 16]);
    }

    #[test]
    fn test_double_subscribe_rejected() {
        let node = MemoryBus::new().create_node("viewer", "/");
        let mut subscriber = SimpleSubscriber::<MemoryNode, _>::new(WidthDecoder);
        let qos = QosProfile::default();
        let options = ChannelOptions::new();

        subscriber
            .subscribe(&node, "/a", &qos, &options, recorder().0)
            .unwrap();
        let err = subscriber
            .subscribe(&node, "/b", &qos, &options, recorder().0)
            .unwrap_err();
        assert!(matches!(err, TransportError::AlreadySubscribed { .. }));
    }

    #[test]
    fn test_shutdown_stops_delivery() {
        let node = MemoryBus::new().create_node("viewer", "/");
        let (callback, widths) = recorder();

        let mut subscriber = SimpleSubscriber::<MemoryNode, _>::new(WidthDecoder);
        subscriber
            .subscribe(&node, "/camera/image", &QosProfile::default(), &ChannelOptions::new(), callback)
            .unwrap();
        let publisher = node
            .create_publisher::<u32>("/camera/image/width", &QosProfile::default(), &ChannelOptions::new())
            .unwrap();

        subscriber.shutdown();
        subscriber.shutdown();
        publisher.publish(4);

        assert!(!subscriber.is_subscribed());
        assert_eq!(subscriber.topic(), "");
        assert_eq!(subscriber.num_publishers(), 0);
        assert!(widths.lock().unwrap().is_empty());
    }
}
