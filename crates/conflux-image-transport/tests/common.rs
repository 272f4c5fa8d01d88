use conflux_image_transport::{
    CameraInfo, CameraSubscriber, ChannelOptions, Header, Image, NodeContext, PluginRegistry,
    QosProfile,
    context::ChannelPublisher,
    memory::{MemoryBus, MemoryNode},
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing_subscriber::EnvFilter;

pub const IMAGE_TOPIC: &str = "/camera/image";
pub const RAW_TOPIC: &str = "/camera/image/raw";
pub const INFO_TOPIC: &str = "/camera/camera_info";

/// Install a test-friendly subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub fn create_image(timestamp_ms: u64) -> Image {
    Image {
        header: Header::new(Duration::from_millis(timestamp_ms), "camera_optical"),
        height: 2,
        width: 2,
        encoding: "mono8".to_string(),
        is_bigendian: false,
        step: 2,
        data: vec![0, 64, 128, 255],
    }
}

pub fn create_info(timestamp_ms: u64) -> CameraInfo {
    CameraInfo {
        header: Header::new(Duration::from_millis(timestamp_ms), "camera_optical"),
        height: 2,
        width: 2,
        distortion_model: "plumb_bob".to_string(),
        d: vec![0.0; 5],
        ..Default::default()
    }
}

/// Stamps of every pair delivered to a callback, in delivery order.
#[derive(Clone, Default)]
pub struct PairRecorder {
    pairs: Arc<Mutex<Vec<(Duration, Duration)>>>,
}

impl PairRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> impl Fn(Arc<Image>, Arc<CameraInfo>) + Send + Sync + 'static {
        let pairs = self.pairs.clone();
        move |image: Arc<Image>, info: Arc<CameraInfo>| {
            pairs
                .lock()
                .unwrap()
                .push((image.header.stamp, info.header.stamp));
        }
    }

    pub fn pairs(&self) -> Vec<(Duration, Duration)> {
        self.pairs.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn pairs_ms(&self) -> Vec<(u64, u64)> {
        self.pairs()
            .into_iter()
            .map(|(image, info)| (image.as_millis() as u64, info.as_millis() as u64))
            .collect()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.pairs.lock().unwrap().len()
    }
}

/// Raw image and camera info publishers feeding a camera subscriber.
pub struct CameraFeed {
    image: Box<dyn ChannelPublisher<Image>>,
    info: Box<dyn ChannelPublisher<CameraInfo>>,
}

impl CameraFeed {
    pub fn new(node: &MemoryNode) -> Self {
        let qos = QosProfile::default();
        let options = ChannelOptions::new();
        Self {
            image: node.create_publisher(RAW_TOPIC, &qos, &options).unwrap(),
            info: node.create_publisher(INFO_TOPIC, &qos, &options).unwrap(),
        }
    }

    pub fn image(&self, timestamp_ms: u64) -> &Self {
        self.image.publish(create_image(timestamp_ms));
        self
    }

    pub fn info(&self, timestamp_ms: u64) -> &Self {
        self.info.publish(create_info(timestamp_ms));
        self
    }

    #[allow(dead_code)]
    pub fn images(&self, timestamps_ms: &[u64]) -> &Self {
        for &ts in timestamps_ms {
            self.image(ts);
        }
        self
    }

    #[allow(dead_code)]
    pub fn infos(&self, timestamps_ms: &[u64]) -> &Self {
        for &ts in timestamps_ms {
            self.info(ts);
        }
        self
    }
}

/// A node, an open raw camera subscriber on [`IMAGE_TOPIC`] and a feed.
#[allow(dead_code)]
pub struct Harness {
    pub node: Arc<MemoryNode>,
    pub subscriber: CameraSubscriber<MemoryNode>,
    pub recorder: PairRecorder,
    pub feed: CameraFeed,
}

impl Harness {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::with_subscriber(CameraSubscriber::new)
    }

    #[allow(dead_code)]
    pub fn with_subscriber(
        build: impl FnOnce(Arc<MemoryNode>) -> CameraSubscriber<MemoryNode>,
    ) -> Self {
        init_tracing();

        let node = MemoryBus::new().create_node("camera_sync_test", "/");
        let recorder = PairRecorder::new();

        let mut subscriber = build(node.clone());
        subscriber
            .open(
                &PluginRegistry::with_defaults(),
                IMAGE_TOPIC,
                "raw",
                &QosProfile::default(),
                recorder.callback(),
            )
            .unwrap();

        let feed = CameraFeed::new(&node);
        Self {
            node,
            subscriber,
            recorder,
            feed,
        }
    }
}
