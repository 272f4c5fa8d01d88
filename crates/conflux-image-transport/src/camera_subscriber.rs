//! Synchronized subscription to an image stream and its camera calibration.
//!
//! A [`CameraSubscriber`] opens two channels: the image topic through a
//! transport chosen by name, and the [`CameraInfo`] topic next to it. Every
//! arriving message is handed to a [`PairSynchronizer`]; matched pairs are
//! delivered to a single callback. A periodic timer runs the
//! [`HealthMonitor`] over the interval's arrival counters and then resets
//! them.
//!
//! # Example
//!
//! ```
//! use conflux_image_transport::{
//!     CameraSubscriber, PluginRegistry, QosProfile, memory::MemoryBus,
//! };
//!
//! let bus = MemoryBus::new();
//! let node = bus.create_node("viewer", "/");
//! let registry = PluginRegistry::with_defaults();
//!
//! let subscriber = CameraSubscriber::subscribe(
//!     node,
//!     &registry,
//!     "/camera/image",
//!     "raw",
//!     &QosProfile::default(),
//!     |image, info| println!("pair at {:?} / {:?}", image.header.stamp, info.header.stamp),
//! )
//! .unwrap();
//!
//! assert_eq!(subscriber.topic(), "/camera/image/raw");
//! assert_eq!(subscriber.info_topic(), "/camera/camera_info");
//! ```

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    config::{ChannelOptions, Config, QosProfile, SyncConfig},
    context::{ChannelSubscription, NodeContext, TimerHandle},
    error::TransportError,
    health::{HealthMonitor, SyncCounters},
    plugin::ImageCallback,
    registry::PluginRegistry,
    subscriber::Subscriber,
    sync::{PairSynchronizer, SyncStats},
    topic::camera_info_topic,
    types::{CameraInfo, Image},
    utils::lock,
};

/// A matched image and its calibration.
pub type CameraPair = (Arc<Image>, Arc<CameraInfo>);

type PairCallback = Arc<dyn Fn(Arc<Image>, Arc<CameraInfo>) + Send + Sync>;

/// Counters and lifetime totals of a [`CameraSubscriber`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraSyncStats {
    /// Arrivals in the current check interval.
    pub interval: SyncCounters,

    pub sync: SyncStats,

    /// Number of skew diagnostics emitted so far.
    pub skew_warnings: u64,
}

/// State shared between the channel callbacks and the health timer.
struct PairState {
    sync: PairSynchronizer<Arc<Image>, Arc<CameraInfo>>,
    counters: SyncCounters,
    skew_warnings: u64,
}

impl PairState {
    fn new(config: &SyncConfig) -> Self {
        Self {
            sync: PairSynchronizer::new(config.queue_size, config.tolerance),
            counters: SyncCounters::default(),
            skew_warnings: 0,
        }
    }

    fn add_image(&mut self, image: Arc<Image>) -> Vec<CameraPair> {
        self.counters.images += 1;
        if let Err(image) = self.sync.push_first(image) {
            debug!(stamp = ?image.header.stamp, "Image not queued for synchronization");
        }
        self.collect_pairs()
    }

    fn add_info(&mut self, info: Arc<CameraInfo>) -> Vec<CameraPair> {
        self.counters.infos += 1;
        if let Err(info) = self.sync.push_second(info) {
            debug!(stamp = ?info.header.stamp, "Camera info not queued for synchronization");
        }
        self.collect_pairs()
    }

    fn collect_pairs(&mut self) -> Vec<CameraPair> {
        let pairs = self.sync.drain_matches();
        self.counters.pairs += pairs.len() as u64;
        pairs
    }

    fn stats(&self) -> CameraSyncStats {
        CameraSyncStats {
            interval: self.counters,
            sync: self.sync.stats(),
            skew_warnings: self.skew_warnings,
        }
    }
}

/// Feed one message into the shared state, then run the pair callback
/// outside the lock.
fn dispatch<M>(
    state: &Weak<Mutex<PairState>>,
    on_pair: &PairCallback,
    message: M,
    add: fn(&mut PairState, M) -> Vec<CameraPair>,
) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let pairs = add(&mut lock(&state), message);
    for (image, info) in pairs {
        on_pair(image, info);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unopened,
    Active,
    Closed,
}

/// Delivers time-matched ([`Image`], [`CameraInfo`]) pairs to one callback.
///
/// Lifecycle: `new` leaves it unopened, [`open`](Self::open) makes it
/// active, [`shutdown`](Self::shutdown) closes it for good. Dropping an
/// active subscriber shuts it down.
pub struct CameraSubscriber<N: NodeContext> {
    node: Arc<N>,
    phase: Phase,
    sync_config: SyncConfig,
    options: ChannelOptions,
    image_topic: String,
    info_topic: String,
    transport: String,
    image_sub: Option<Subscriber<N>>,
    info_sub: Option<Box<dyn ChannelSubscription>>,
    timer: Option<Box<dyn TimerHandle>>,
    state: Option<Arc<Mutex<PairState>>>,
}

impl<N: NodeContext> CameraSubscriber<N> {
    /// An unopened subscriber with the default [`SyncConfig`].
    pub fn new(node: Arc<N>) -> Self {
        Self {
            node,
            phase: Phase::Unopened,
            sync_config: SyncConfig::default(),
            options: ChannelOptions::new(),
            image_topic: String::new(),
            info_topic: String::new(),
            transport: String::new(),
            image_sub: None,
            info_sub: None,
            timer: None,
            state: None,
        }
    }

    pub fn with_sync_config(mut self, sync_config: SyncConfig) -> Self {
        self.sync_config = sync_config;
        self
    }

    /// Options passed through to both channels.
    pub fn with_options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    /// Open and activate a subscriber in one step.
    pub fn subscribe<F>(
        node: Arc<N>,
        registry: &PluginRegistry<N>,
        base_topic: &str,
        transport: &str,
        qos: &QosProfile,
        callback: F,
    ) -> Result<Self, TransportError>
    where
        F: Fn(Arc<Image>, Arc<CameraInfo>) + Send + Sync + 'static,
    {
        let mut subscriber = Self::new(node);
        subscriber.open(registry, base_topic, transport, qos, callback)?;
        Ok(subscriber)
    }

    /// Open a subscriber described by a [`Config`].
    pub fn from_config<F>(
        node: Arc<N>,
        registry: &PluginRegistry<N>,
        config: &Config,
        callback: F,
    ) -> Result<Self, TransportError>
    where
        F: Fn(Arc<Image>, Arc<CameraInfo>) + Send + Sync + 'static,
    {
        let mut subscriber = Self::new(node)
            .with_sync_config(config.sync.clone())
            .with_options(config.options.clone());
        subscriber.open(
            registry,
            &config.image_topic,
            &config.transport,
            &config.qos,
            callback,
        )?;
        Ok(subscriber)
    }

    /// Open a subscriber whose pairs are delivered as a stream.
    ///
    /// The stream ends once the subscriber is shut down.
    pub fn subscribe_stream(
        node: Arc<N>,
        registry: &PluginRegistry<N>,
        base_topic: &str,
        transport: &str,
        qos: &QosProfile,
    ) -> Result<(Self, BoxStream<'static, CameraPair>), TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let subscriber = Self::subscribe(node, registry, base_topic, transport, qos, move |image, info| {
            if tx.send((image, info)).is_err() {
                debug!("Pair stream receiver dropped");
            }
        })?;

        let pairs = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|pair| (pair, rx))
        })
        .boxed();

        Ok((subscriber, pairs))
    }

    /// Subscribe to `base_topic` through `transport` and to its sibling
    /// camera info topic.
    pub fn open<F>(
        &mut self,
        registry: &PluginRegistry<N>,
        base_topic: &str,
        transport: &str,
        qos: &QosProfile,
        callback: F,
    ) -> Result<(), TransportError>
    where
        F: Fn(Arc<Image>, Arc<CameraInfo>) + Send + Sync + 'static,
    {
        match self.phase {
            Phase::Unopened => {}
            Phase::Active => {
                return Err(TransportError::AlreadySubscribed {
                    transport: self.transport.clone(),
                    topic: self.image_topic.clone(),
                });
            }
            Phase::Closed => {
                return Err(TransportError::ConstructionFailure(
                    "camera subscriber was shut down and cannot be reopened".to_string(),
                ));
            }
        }

        self.sync_config
            .validate()
            .map_err(|err| TransportError::ConstructionFailure(err.to_string()))?;

        let base_topic = self.node.expand_topic(base_topic)?;
        let info_topic = camera_info_topic(&base_topic);

        let state = Arc::new(Mutex::new(PairState::new(&self.sync_config)));
        let on_pair: PairCallback = Arc::new(callback);

        let image_callback: ImageCallback = {
            let state = Arc::downgrade(&state);
            let on_pair = on_pair.clone();
            Arc::new(move |image: Arc<Image>| {
                dispatch(&state, &on_pair, image, PairState::add_image);
            })
        };
        let image_sub = Subscriber::subscribe_with(
            &self.node,
            registry,
            &base_topic,
            transport,
            qos,
            &self.options,
            image_callback,
        )?;
        let image_topic = image_sub.topic().to_string();

        let info_sub = {
            let state = Arc::downgrade(&state);
            self.node.create_subscription::<CameraInfo>(
                &info_topic,
                qos,
                &self.options,
                Box::new(move |info: Arc<CameraInfo>| {
                    dispatch(&state, &on_pair, info, PairState::add_info);
                }),
            )?
        };

        let timer = {
            let state = Arc::downgrade(&state);
            let monitor = HealthMonitor::new(
                image_topic.clone(),
                info_topic.clone(),
                self.sync_config.check_interval,
            );
            self.node.create_wall_timer(
                self.sync_config.check_interval,
                Box::new(move || check_health(&state, &monitor)),
            )
        };

        info!(
            image_topic = %image_topic,
            info_topic = %info_topic,
            transport = %transport,
            tolerance = ?self.sync_config.tolerance,
            queue_size = self.sync_config.queue_size,
            "Opened camera subscriber"
        );

        self.image_topic = image_topic;
        self.info_topic = info_topic;
        self.transport = transport.to_string();
        self.image_sub = Some(image_sub);
        self.info_sub = Some(info_sub);
        self.timer = Some(timer);
        self.state = Some(state);
        self.phase = Phase::Active;
        Ok(())
    }

    /// The image transport channel, e.g. `/camera/image/raw`, empty until
    /// opened.
    pub fn topic(&self) -> &str {
        &self.image_topic
    }

    /// The camera info topic, empty until opened.
    pub fn info_topic(&self) -> &str {
        &self.info_topic
    }

    /// The image transport name, empty until opened.
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// The larger of the image and info publisher counts.
    pub fn num_publishers(&self) -> usize {
        match (&self.image_sub, &self.info_sub) {
            (Some(image), Some(info)) => image.num_publishers().max(info.publisher_count()),
            _ => 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.phase == Phase::Active
    }

    pub fn sync_config(&self) -> &SyncConfig {
        &self.sync_config
    }

    /// Current counters, `None` unless active.
    pub fn stats(&self) -> Option<CameraSyncStats> {
        self.state.as_ref().map(|state| lock(state).stats())
    }

    /// Stop the health timer and unsubscribe both channels. No callback
    /// runs afterwards. Calling it again has no effect.
    pub fn shutdown(&mut self) {
        let was_active = self.phase == Phase::Active;
        self.phase = Phase::Closed;

        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if let Some(mut image_sub) = self.image_sub.take() {
            image_sub.shutdown();
        }
        self.info_sub = None;
        self.state = None;

        if was_active {
            info!(
                image_topic = %self.image_topic,
                info_topic = %self.info_topic,
                "Shut down camera subscriber"
            );
        }
    }
}

impl<N: NodeContext> Drop for CameraSubscriber<N> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_health(state: &Weak<Mutex<PairState>>, monitor: &HealthMonitor) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = lock(&state);
    let counters = state.counters.take();

    if let Some(report) = monitor.check(&counters) {
        state.skew_warnings += 1;
        warn!(
            image_topic = %report.image_topic,
            info_topic = %report.info_topic,
            images = report.counters.images,
            infos = report.counters.infos,
            pairs = report.counters.pairs,
            "{}",
            report.message()
        );
    }
}
