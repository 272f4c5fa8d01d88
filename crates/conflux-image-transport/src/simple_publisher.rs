//! Publisher plugin for encodings that map to exactly one channel.
//!
//! A concrete encoding supplies an [`ImageEncoder`]; [`SimplePublisher`]
//! handles the channel lifecycle around it.

use std::marker::PhantomData;
use tracing::{debug, error};

use crate::{
    config::{ChannelOptions, QosProfile},
    context::{ChannelPublisher, NodeContext},
    error::TransportError,
    plugin::PublisherPlugin,
    topic::transport_topic,
    types::{Image, Message},
};

/// The encode step of a single-channel transport.
pub trait ImageEncoder: Send + Sync + 'static {
    /// Message type sent on the transport channel.
    type Encoded: Message;

    fn transport_name(&self) -> &str;

    /// Whether [`encode_owned`](Self::encode_owned) is implemented.
    fn supports_take_ownership(&self) -> bool {
        false
    }

    fn encode(&self, image: &Image) -> Result<Self::Encoded, TransportError>;

    fn encode_owned(&self, image: Image) -> Result<Self::Encoded, TransportError> {
        drop(image);
        Err(TransportError::not_implemented(
            self.transport_name(),
            "encode_owned",
        ))
    }

    /// Channel used for `base_topic`.
    fn topic_to_advertise(&self, base_topic: &str) -> String {
        transport_topic(base_topic, self.transport_name())
    }
}

/// [`PublisherPlugin`] built from an [`ImageEncoder`].
pub struct SimplePublisher<N, E>
where
    N: NodeContext,
    E: ImageEncoder,
{
    encoder: E,
    publisher: Option<Box<dyn ChannelPublisher<E::Encoded>>>,
    _node: PhantomData<fn(&N)>,
}

impl<N, E> SimplePublisher<N, E>
where
    N: NodeContext,
    E: ImageEncoder,
{
    pub fn new(encoder: E) -> Self {
        Self {
            encoder,
            publisher: None,
            _node: PhantomData,
        }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn is_advertised(&self) -> bool {
        self.publisher.is_some()
    }

    fn channel(&self) -> Result<&dyn ChannelPublisher<E::Encoded>, TransportError> {
        match &self.publisher {
            Some(publisher) => Ok(publisher.as_ref()),
            None => {
                let transport = self.encoder.transport_name();
                error!(
                    transport = %transport,
                    "Call to publish() on an invalid image_transport publisher"
                );
                Err(TransportError::not_advertised(transport))
            }
        }
    }
}

impl<N, E> Default for SimplePublisher<N, E>
where
    N: NodeContext,
    E: ImageEncoder + Default,
{
    fn default() -> Self {
        Self::new(E::default())
    }
}

impl<N, E> PublisherPlugin<N> for SimplePublisher<N, E>
where
    N: NodeContext,
    E: ImageEncoder,
{
    fn transport_name(&self) -> &str {
        self.encoder.transport_name()
    }

    fn supports_take_ownership_publish(&self) -> bool {
        self.encoder.supports_take_ownership()
    }

    fn advertise(
        &mut self,
        node: &N,
        base_topic: &str,
        qos: &QosProfile,
        options: &ChannelOptions,
    ) -> Result<(), TransportError> {
        if let Some(publisher) = &self.publisher {
            return Err(TransportError::AlreadyAdvertised {
                transport: self.transport_name().to_string(),
                topic: publisher.topic_name().to_string(),
            });
        }

        let topic = self.encoder.topic_to_advertise(base_topic);
        let publisher = node.create_publisher::<E::Encoded>(&topic, qos, options)?;

        debug!(
            transport = %self.transport_name(),
            topic = %publisher.topic_name(),
            "Advertised transport channel"
        );
        self.publisher = Some(publisher);
        Ok(())
    }

    fn num_subscribers(&self) -> usize {
        self.publisher
            .as_ref()
            .map_or(0, |publisher| publisher.subscription_count())
    }

    fn topic(&self) -> &str {
        self.publisher
            .as_ref()
            .map_or("", |publisher| publisher.topic_name())
    }

    fn publish(&self, image: &Image) -> Result<(), TransportError> {
        let channel = self.channel()?;
        channel.publish(self.encoder.encode(image)?);
        Ok(())
    }

    fn publish_owned(&self, image: Image) -> Result<(), TransportError> {
        if !self.encoder.supports_take_ownership() {
            return Err(TransportError::not_implemented(
                self.transport_name(),
                "publish_owned",
            ));
        }

        let channel = self.channel()?;
        channel.publish(self.encoder.encode_owned(image)?);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(publisher) = self.publisher.take() {
            debug!(
                transport = %self.encoder.transport_name(),
                topic = %publisher.topic_name(),
                "Shut down transport channel"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBus, MemoryNode};
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    /// Sends only the image dimensions.
    #[derive(Default)]
    struct SizeEncoder {
        encoded: AtomicUsize,
    }

    impl ImageEncoder for SizeEncoder {
        type Encoded = (u32, u32);

        fn transport_name(&self) -> &str {
            "size"
        }

        fn encode(&self, image: &Image) -> Result<Self::Encoded, TransportError> {
            self.encoded.fetch_add(1, Ordering::SeqCst);
            Ok((image.width, image.height))
        }
    }

    fn image(width: u32, height: u32) -> Image {
        Image {
            width,
            height,
            step: width,
            encoding: "mono8".to_string(),
            data: vec![0; (width * height) as usize],
            ..Default::default()
        }
    }

    fn listen(node: &MemoryNode, topic: &str) -> (Box<dyn crate::context::ChannelSubscription>, Arc<Mutex<Vec<(u32, u32)>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let subscription = node
            .create_subscription::<(u32, u32)>(
                topic,
                &QosProfile::default(),
                &ChannelOptions::new(),
                Box::new(move |msg: Arc<(u32, u32)>| sink.lock().unwrap().push(*msg)),
            )
            .unwrap();
        (subscription, received)
    }

    #[test]
    fn test_advertise_uses_transport_topic() {
        let node = MemoryBus::new().create_node("camera", "/");
        let mut publisher = SimplePublisher::<MemoryNode, _>::new(SizeEncoder::default());

        assert_eq!(publisher.topic(), "");
        assert_eq!(publisher.num_subscribers(), 0);

        publisher
            .advertise(&node, "/camera/image", &QosProfile::default(), &ChannelOptions::new())
            .unwrap();
        assert_eq!(publisher.topic(), "/camera/image/size");
    }

    #[test]
    fn test_publish_sends_encoded_message() {
        let node = MemoryBus::new().create_node("camera", "/");
        let (_sub, received) = listen(&node, "/camera/image/size");

        let mut publisher = SimplePublisher::<MemoryNode, _>::new(SizeEncoder::default());
        publisher
            .advertise(&node, "/camera/image", &QosProfile::default(), &ChannelOptions::new())
            .unwrap();
        assert_eq!(publisher.num_subscribers(), 1);

        publisher.publish(&image(4, 3)).unwrap();
        assert_eq!(*received.lock().unwrap(), vec![(4, 3)]);
    }

    #[test]
    fn test_publish_without_advertise_is_reported() {
        let publisher = SimplePublisher::<MemoryNode, _>::new(SizeEncoder::default());

        let err = publisher.publish(&image(1, 1)).unwrap_err();
        assert_eq!(err, TransportError::not_advertised("size"));
        assert_eq!(publisher.encoder().encoded.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_double_advertise_rejected() {
        let node = MemoryBus::new().create_node("camera", "/");
        let mut publisher = SimplePublisher::<MemoryNode, _>::new(SizeEncoder::default());
        let qos = QosProfile::default();
        let options = ChannelOptions::new();

        publisher.advertise(&node, "/a", &qos, &options).unwrap();
        let err = publisher.advertise(&node, "/b", &qos, &options).unwrap_err();
        assert!(matches!(err, TransportError::AlreadyAdvertised { .. }));
        assert_eq!(publisher.topic(), "/a/size");
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let node = MemoryBus::new().create_node("camera", "/");
        let mut publisher = SimplePublisher::<MemoryNode, _>::new(SizeEncoder::default());
        publisher
            .advertise(&node, "/camera/image", &QosProfile::default(), &ChannelOptions::new())
            .unwrap();

        publisher.shutdown();
        publisher.shutdown();

        assert!(!publisher.is_advertised());
        assert_eq!(publisher.topic(), "");
        assert!(node.bus().topic_names().is_empty());
        assert!(matches!(
            publisher.publish(&image(1, 1)),
            Err(TransportError::NotAdvertised { .. })
        ));
    }

    #[test]
    fn test_publish_owned_not_implemented_by_default() {
        let node = MemoryBus::new().create_node("camera", "/");
        let (_sub, received) = listen(&node, "/camera/image/size");

        let mut publisher = SimplePublisher::<MemoryNode, _>::new(SizeEncoder::default());
        publisher
            .advertise(&node, "/camera/image", &QosProfile::default(), &ChannelOptions::new())
            .unwrap();

        assert!(!publisher.supports_take_ownership_publish());
        let err = publisher.publish_owned(image(2, 2)).unwrap_err();
        assert_eq!(err, TransportError::not_implemented("size", "publish_owned"));
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_publish_from_raw_buffer() {
        let node = MemoryBus::new().create_node("camera", "/");
        let (_sub, received) = listen(&node, "/camera/image/size");

        let mut publisher = SimplePublisher::<MemoryNode, _>::new(SizeEncoder::default());
        publisher
            .advertise(&node, "/camera/image", &QosProfile::default(), &ChannelOptions::new())
            .unwrap();

        let mut template = image(2, 2);
        template.header.stamp = Duration::from_secs(1);
        template.data.clear();

        let err = publisher
            .publish_from_raw_buffer(&template, &[0, 1, 2])
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::BufferTooSmall {
                expected: 4,
                actual: 3
            }
        );

        publisher
            .publish_from_raw_buffer(&template, &[0, 1, 2, 3, 4])
            .unwrap();
        assert_eq!(*received.lock().unwrap(), vec![(2, 2)]);
    }
}
