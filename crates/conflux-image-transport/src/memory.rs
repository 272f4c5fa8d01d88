//! In-process loopback transport.
//!
//! A [`MemoryBus`] is a set of typed topics shared by any number of
//! [`MemoryNode`]s. Publishing delivers the message synchronously, in
//! order, to every live subscription of the topic. Timers do not run on
//! their own: [`MemoryNode::advance`] moves the node's wall clock forward
//! and fires each timer once per elapsed period.
//!
//! ```
//! use conflux_image_transport::{memory::MemoryBus, context::NodeContext, QosProfile};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! let bus = MemoryBus::new();
//! let node = bus.create_node("talker", "/");
//! let received = Arc::new(AtomicUsize::new(0));
//!
//! let counter = received.clone();
//! let _sub = node
//!     .create_subscription::<u32>(
//!         "/chatter",
//!         &QosProfile::default(),
//!         &Default::default(),
//!         Box::new(move |_msg: Arc<u32>| {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!         }),
//!     )
//!     .unwrap();
//! let publisher = node
//!     .create_publisher::<u32>("/chatter", &QosProfile::default(), &Default::default())
//!     .unwrap();
//!
//! publisher.publish(7);
//! assert_eq!(received.load(Ordering::SeqCst), 1);
//! ```

use indexmap::IndexMap;
use std::{
    any::{Any, TypeId, type_name},
    marker::PhantomData,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::debug;

use crate::{
    config::{ChannelOptions, QosProfile},
    context::{
        ChannelPublisher, ChannelSubscription, MessageCallback, NodeContext, TimerCallback,
        TimerHandle,
    },
    error::TransportError,
    types::Message,
    utils::lock,
};

type Payload = Arc<dyn Any + Send + Sync>;
type ErasedCallback = Arc<dyn Fn(Payload) + Send + Sync>;

struct SubscriptionEntry {
    active: Arc<AtomicBool>,
    callback: ErasedCallback,
}

struct TopicEntry {
    type_id: TypeId,
    type_name: &'static str,
    publishers: usize,
    subscriptions: IndexMap<u64, SubscriptionEntry>,
}

impl TopicEntry {
    fn new<M: Message>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: type_name::<M>(),
            publishers: 0,
            subscriptions: IndexMap::new(),
        }
    }

    fn is_unused(&self) -> bool {
        self.publishers == 0 && self.subscriptions.is_empty()
    }
}

#[derive(Default)]
struct BusState {
    topics: IndexMap<String, TopicEntry>,
    next_id: u64,
}

impl BusState {
    fn entry<M: Message>(&mut self, topic: &str) -> Result<&mut TopicEntry, TransportError> {
        let entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(TopicEntry::new::<M>);

        if entry.type_id != TypeId::of::<M>() {
            return Err(TransportError::TypeMismatch {
                topic: topic.to_string(),
                existing: entry.type_name,
                requested: type_name::<M>(),
            });
        }
        Ok(entry)
    }

    fn prune(&mut self, topic: &str) {
        if self.topics.get(topic).is_some_and(TopicEntry::is_unused) {
            self.topics.shift_remove(topic);
        }
    }
}

/// A set of typed in-process topics.
#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node attached to this bus.
    pub fn create_node(&self, name: impl Into<String>, namespace: impl Into<String>) -> Arc<MemoryNode> {
        Arc::new(MemoryNode {
            name: name.into(),
            namespace: namespace.into(),
            bus: self.clone(),
            timers: Mutex::new(Vec::new()),
        })
    }

    /// Topics with at least one publisher or subscription, in creation order.
    pub fn topic_names(&self) -> Vec<String> {
        lock(&self.state).topics.keys().cloned().collect()
    }

    pub fn publisher_count(&self, topic: &str) -> usize {
        lock(&self.state)
            .topics
            .get(topic)
            .map_or(0, |entry| entry.publishers)
    }

    pub fn subscription_count(&self, topic: &str) -> usize {
        lock(&self.state)
            .topics
            .get(topic)
            .map_or(0, |entry| entry.subscriptions.len())
    }

    fn add_publisher<M: Message>(&self, topic: &str) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.entry::<M>(topic)?.publishers += 1;
        Ok(())
    }

    fn remove_publisher(&self, topic: &str) {
        let mut state = lock(&self.state);
        if let Some(entry) = state.topics.get_mut(topic) {
            entry.publishers = entry.publishers.saturating_sub(1);
        }
        state.prune(topic);
    }

    fn add_subscription<M: Message>(
        &self,
        topic: &str,
        callback: MessageCallback<M>,
    ) -> Result<(u64, Arc<AtomicBool>), TransportError> {
        let mut state = lock(&self.state);
        let id = state.next_id;
        let active = Arc::new(AtomicBool::new(true));

        let callback: ErasedCallback = Arc::new(move |payload: Payload| {
            if let Ok(message) = payload.downcast::<M>() {
                callback(message);
            }
        });

        state.entry::<M>(topic)?.subscriptions.insert(
            id,
            SubscriptionEntry {
                active: active.clone(),
                callback,
            },
        );
        state.next_id += 1;
        Ok((id, active))
    }

    fn remove_subscription(&self, topic: &str, id: u64) {
        let mut state = lock(&self.state);
        if let Some(entry) = state.topics.get_mut(topic) {
            entry.subscriptions.shift_remove(&id);
        }
        state.prune(topic);
    }

    fn deliver<M: Message>(&self, topic: &str, message: M) {
        // Callbacks run outside the lock so they may publish or unsubscribe.
        let receivers: Vec<_> = {
            let state = lock(&self.state);
            let Some(entry) = state.topics.get(topic) else {
                return;
            };
            entry
                .subscriptions
                .values()
                .map(|sub| (sub.active.clone(), sub.callback.clone()))
                .collect()
        };

        let payload: Payload = Arc::new(message);
        for (active, callback) in receivers {
            if active.load(Ordering::SeqCst) {
                callback(payload.clone());
            }
        }
    }
}

struct MemoryPublisher<M> {
    bus: MemoryBus,
    topic: String,
    _message: PhantomData<fn(M)>,
}

impl<M: Message> ChannelPublisher<M> for MemoryPublisher<M> {
    fn publish(&self, message: M) {
        self.bus.deliver(&self.topic, message);
    }

    fn topic_name(&self) -> &str {
        &self.topic
    }

    fn subscription_count(&self) -> usize {
        self.bus.subscription_count(&self.topic)
    }
}

impl<M> Drop for MemoryPublisher<M> {
    fn drop(&mut self) {
        self.bus.remove_publisher(&self.topic);
    }
}

struct MemorySubscription {
    bus: MemoryBus,
    topic: String,
    id: u64,
    active: Arc<AtomicBool>,
}

impl ChannelSubscription for MemorySubscription {
    fn topic_name(&self) -> &str {
        &self.topic
    }

    fn publisher_count(&self) -> usize {
        self.bus.publisher_count(&self.topic)
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.bus.remove_subscription(&self.topic, self.id);
    }
}

struct MemoryTimer {
    period: Duration,
    elapsed: Mutex<Duration>,
    canceled: AtomicBool,
    callback: Mutex<TimerCallback>,
}

impl MemoryTimer {
    /// Accumulate `by` and return how many periods completed.
    fn accumulate(&self, by: Duration) -> u128 {
        let mut elapsed = lock(&self.elapsed);
        *elapsed = elapsed.saturating_add(by);

        if self.period.is_zero() {
            *elapsed = Duration::ZERO;
            return 1;
        }

        let period = self.period.as_nanos();
        let total = elapsed.as_nanos();
        let remainder = total % period;
        *elapsed = Duration::new(
            (remainder / NANOS_PER_SEC) as u64,
            (remainder % NANOS_PER_SEC) as u32,
        );
        total / period
    }
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

struct MemoryTimerHandle(Arc<MemoryTimer>);

impl TimerHandle for MemoryTimerHandle {
    fn cancel(&self) {
        self.0.canceled.store(true, Ordering::SeqCst);
    }

    fn is_canceled(&self) -> bool {
        self.0.canceled.load(Ordering::SeqCst)
    }
}

/// A node on a [`MemoryBus`].
pub struct MemoryNode {
    name: String,
    namespace: String,
    bus: MemoryBus,
    timers: Mutex<Vec<Arc<MemoryTimer>>>,
}

impl MemoryNode {
    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    /// Number of timers that have not been canceled.
    pub fn live_timers(&self) -> usize {
        lock(&self.timers)
            .iter()
            .filter(|timer| !timer.canceled.load(Ordering::SeqCst))
            .count()
    }

    /// Advance this node's wall clock by `by`, firing every live timer once
    /// per completed period. Returns the number of timer invocations.
    pub fn advance(&self, by: Duration) -> usize {
        let timers: Vec<_> = {
            let mut timers = lock(&self.timers);
            timers.retain(|timer| !timer.canceled.load(Ordering::SeqCst));
            timers.clone()
        };

        let mut fired = 0;
        for timer in timers {
            let periods = timer.accumulate(by);
            for _ in 0..periods {
                if timer.canceled.load(Ordering::SeqCst) {
                    break;
                }
                let mut callback = lock(&timer.callback);
                (*callback)();
                fired += 1;
            }
        }
        fired
    }
}

impl NodeContext for MemoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn create_publisher<M: Message>(
        &self,
        topic: &str,
        qos: &QosProfile,
        _options: &ChannelOptions,
    ) -> Result<Box<dyn ChannelPublisher<M>>, TransportError> {
        let topic = self.expand_topic(topic)?;
        self.bus.add_publisher::<M>(&topic)?;

        debug!(node = %self.name, topic = %topic, ?qos, "Created memory publisher");

        Ok(Box::new(MemoryPublisher {
            bus: self.bus.clone(),
            topic,
            _message: PhantomData,
        }))
    }

    fn create_subscription<M: Message>(
        &self,
        topic: &str,
        qos: &QosProfile,
        _options: &ChannelOptions,
        callback: MessageCallback<M>,
    ) -> Result<Box<dyn ChannelSubscription>, TransportError> {
        let topic = self.expand_topic(topic)?;
        let (id, active) = self.bus.add_subscription::<M>(&topic, callback)?;

        debug!(node = %self.name, topic = %topic, ?qos, "Created memory subscription");

        Ok(Box::new(MemorySubscription {
            bus: self.bus.clone(),
            topic,
            id,
            active,
        }))
    }

    fn create_wall_timer(&self, period: Duration, callback: TimerCallback) -> Box<dyn TimerHandle> {
        let timer = Arc::new(MemoryTimer {
            period,
            elapsed: Mutex::new(Duration::ZERO),
            canceled: AtomicBool::new(false),
            callback: Mutex::new(callback),
        });
        lock(&self.timers).push(timer.clone());
        Box::new(MemoryTimerHandle(timer))
    }
}
