//! Publishes images together with their camera calibration.

use std::{sync::Arc, time::Duration};
use tracing::{error, info};

use crate::{
    config::{ChannelOptions, QosProfile},
    context::{ChannelPublisher, NodeContext},
    error::TransportError,
    publisher::Publisher,
    registry::PluginRegistry,
    topic::camera_info_topic,
    types::{CameraInfo, Image},
};

/// Publishes an image stream through every transport plus a
/// [`CameraInfo`] channel next to it.
///
/// The image topic is resolved under the node's naming scope before the
/// info topic is derived from it, so `/camera/image` publishes its
/// calibration on `/camera/camera_info`.
pub struct CameraPublisher<N: NodeContext> {
    image: Publisher<N>,
    info: Option<Box<dyn ChannelPublisher<CameraInfo>>>,
    info_topic: String,
}

impl<N: NodeContext> CameraPublisher<N> {
    pub fn advertise(
        node: &Arc<N>,
        registry: &PluginRegistry<N>,
        base_topic: &str,
        qos: &QosProfile,
        options: &ChannelOptions,
    ) -> Result<Self, TransportError> {
        let image_topic = node.expand_topic(base_topic)?;
        let info_topic = camera_info_topic(&image_topic);

        let image = Publisher::advertise(node, registry, &image_topic, qos, options)?;
        let info = node.create_publisher::<CameraInfo>(&info_topic, qos, options)?;

        info!(
            image_topic = %image_topic,
            info_topic = %info_topic,
            "Advertised camera publisher"
        );

        Ok(Self {
            image,
            info: Some(info),
            info_topic,
        })
    }

    /// The resolved image topic.
    pub fn topic(&self) -> &str {
        self.image.topic()
    }

    pub fn info_topic(&self) -> &str {
        &self.info_topic
    }

    /// The larger of the image and info subscriber counts.
    pub fn num_subscribers(&self) -> usize {
        match &self.info {
            Some(info) => self.image.num_subscribers().max(info.subscription_count()),
            None => 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.info.is_some()
    }

    /// The info is sent even when a transport fails to publish the image,
    /// since the other transports have already sent it.
    pub fn publish(&self, image: &Image, info: &CameraInfo) -> Result<(), TransportError> {
        let info_publisher = self.info_publisher()?;
        let result = self.image.publish(image);
        info_publisher.publish(info.clone());
        result
    }

    /// Publish a uniquely owned pair without copying either message where
    /// the transports allow it.
    pub fn publish_owned(&self, image: Image, info: CameraInfo) -> Result<(), TransportError> {
        let info_publisher = self.info_publisher()?;
        let result = self.image.publish_owned(image);
        info_publisher.publish(info);
        result
    }

    /// Stamp both headers with `stamp`, then publish.
    pub fn publish_with_stamp(
        &self,
        mut image: Image,
        mut info: CameraInfo,
        stamp: Duration,
    ) -> Result<(), TransportError> {
        image.header.stamp = stamp;
        info.header.stamp = stamp;
        self.publish_owned(image, info)
    }

    /// Close both channels. Calling it again has no effect.
    pub fn shutdown(&mut self) {
        if self.info.take().is_some() {
            self.image.shutdown();
            info!(image_topic = %self.image.topic(), "Shut down camera publisher");
        }
    }

    fn info_publisher(&self) -> Result<&dyn ChannelPublisher<CameraInfo>, TransportError> {
        match &self.info {
            Some(info) => Ok(info.as_ref()),
            None => {
                error!(
                    image_topic = %self.image.topic(),
                    "Call to publish() on an invalid camera publisher"
                );
                Err(TransportError::topic_not_advertised(self.image.topic()))
            }
        }
    }
}

impl<N: NodeContext> Drop for CameraPublisher<N> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::{MemoryBus, MemoryNode},
        plugin::PublisherPlugin,
        simple_publisher::{ImageEncoder, SimplePublisher},
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct FailingEncoder;

    impl ImageEncoder for FailingEncoder {
        type Encoded = u8;

        fn transport_name(&self) -> &str {
            "failing"
        }

        fn encode(&self, _image: &Image) -> Result<u8, TransportError> {
            Err(TransportError::Encode {
                transport: "failing".to_string(),
                reason: "codec unavailable".to_string(),
            })
        }
    }

    type Log = Arc<Mutex<Vec<Duration>>>;

    fn listen<M>(node: &MemoryNode, topic: &str) -> (Box<dyn crate::context::ChannelSubscription>, Log)
    where
        M: crate::types::Message + crate::types::WithTimestamp,
    {
        let log: Log = Arc::default();
        let sink = log.clone();
        let sub = node
            .create_subscription::<M>(
                topic,
                &QosProfile::default(),
                &ChannelOptions::new(),
                Box::new(move |msg: Arc<M>| sink.lock().unwrap().push(msg.timestamp())),
            )
            .unwrap();
        (sub, log)
    }

    fn advertise(node: &Arc<MemoryNode>, base_topic: &str) -> CameraPublisher<MemoryNode> {
        CameraPublisher::advertise(
            node,
            &PluginRegistry::with_defaults(),
            base_topic,
            &QosProfile::default(),
            &ChannelOptions::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_topics_follow_sibling_convention() {
        let node = MemoryBus::new().create_node("driver", "/robot");
        let publisher = advertise(&node, "camera/image");

        assert_eq!(publisher.topic(), "/robot/camera/image");
        assert_eq!(publisher.info_topic(), "/robot/camera/camera_info");
        assert!(publisher.is_valid());
    }

    #[test]
    fn test_num_subscribers_is_max_of_channels() {
        let node = MemoryBus::new().create_node("driver", "/");
        let publisher = advertise(&node, "/camera/image");
        assert_eq!(publisher.num_subscribers(), 0);

        let (_info_a, _) = listen::<CameraInfo>(&node, "/camera/camera_info");
        let (_info_b, _) = listen::<CameraInfo>(&node, "/camera/camera_info");
        let (_image, _) = listen::<Image>(&node, "/camera/image/raw");

        assert_eq!(publisher.num_subscribers(), 2);
    }

    #[test]
    fn test_publish_with_stamp_rewrites_headers() {
        let node = MemoryBus::new().create_node("driver", "/");
        let publisher = advertise(&node, "/camera/image");
        let (_image_sub, images) = listen::<Image>(&node, "/camera/image/raw");
        let (_info_sub, infos) = listen::<CameraInfo>(&node, "/camera/camera_info");

        let stamp = Duration::from_millis(1234);
        publisher
            .publish_with_stamp(Image::default(), CameraInfo::default(), stamp)
            .unwrap();
        publisher
            .publish(&Image::default(), &CameraInfo::default())
            .unwrap();

        assert_eq!(*images.lock().unwrap(), vec![stamp, Duration::ZERO]);
        assert_eq!(*infos.lock().unwrap(), vec![stamp, Duration::ZERO]);
    }

    #[test]
    fn test_publish_after_shutdown_is_reported() {
        let node = MemoryBus::new().create_node("driver", "/");
        let mut publisher = advertise(&node, "/camera/image");
        let (_info_sub, infos) = listen::<CameraInfo>(&node, "/camera/camera_info");

        publisher.shutdown();
        publisher.shutdown();

        assert!(!publisher.is_valid());
        assert_eq!(publisher.num_subscribers(), 0);
        assert_eq!(publisher.info_topic(), "/camera/camera_info");

        let err = publisher
            .publish(&Image::default(), &CameraInfo::default())
            .unwrap_err();
        assert_eq!(err, TransportError::topic_not_advertised("/camera/image"));
        assert!(infos.lock().unwrap().is_empty());
    }

    #[test]
    fn test_info_sent_when_a_transport_fails() {
        let node = MemoryBus::new().create_node("driver", "/");
        let mut registry = PluginRegistry::with_defaults();
        registry.register_publisher("failing", || {
            Ok(Box::new(SimplePublisher::<MemoryNode, FailingEncoder>::default())
                as Box<dyn PublisherPlugin<MemoryNode>>)
        });
        let publisher = CameraPublisher::advertise(
            &node,
            &registry,
            "/camera/image",
            &QosProfile::default(),
            &ChannelOptions::new(),
        )
        .unwrap();

        let (_image_sub, images) = listen::<Image>(&node, "/camera/image/raw");
        let (_info_sub, infos) = listen::<CameraInfo>(&node, "/camera/camera_info");
        let _failing_sub = node
            .create_subscription::<u8>(
                "/camera/image/failing",
                &QosProfile::default(),
                &ChannelOptions::new(),
                Box::new(|_: Arc<u8>| {}),
            )
            .unwrap();

        let stamp = Duration::from_millis(7);
        let result = publisher.publish_with_stamp(Image::default(), CameraInfo::default(), stamp);
        assert!(matches!(result, Err(TransportError::Encode { .. })));

        let result = publisher.publish(&Image::default(), &CameraInfo::default());
        assert!(matches!(result, Err(TransportError::Encode { .. })));

        assert_eq!(*images.lock().unwrap(), vec![stamp, Duration::ZERO]);
        assert_eq!(*infos.lock().unwrap(), vec![stamp, Duration::ZERO]);
    }
}
