//! Pluggable image transports and synchronized camera subscriptions.
//!
//! Images are published and received through interchangeable encodings
//! ("transports") without the caller knowing which one is in use. A
//! transport is a pair of [`PublisherPlugin`] and [`SubscriberPlugin`]
//! resolved by name from a [`PluginRegistry`]; encodings that map to a
//! single channel only implement an [`ImageEncoder`] or [`ImageDecoder`]
//! and reuse [`SimplePublisher`] and [`SimpleSubscriber`].
//!
//! [`CameraSubscriber`] pairs every image with the [`CameraInfo`] published
//! next to it by approximate timestamp and warns when the two channels
//! drift apart.
//!
//! Everything is generic over a [`NodeContext`], the messaging runtime.
//! [`memory::MemoryBus`] is an in-process implementation.
//!
//! # Usage
//!
//! ```rust
//! use conflux_image_transport::{
//!     CameraInfo, Header, Image, ImageTransport, QosProfile, memory::MemoryBus,
//! };
//! use std::{
//!     sync::{Arc, Mutex},
//!     time::Duration,
//! };
//!
//! let bus = MemoryBus::new();
//! let transport = ImageTransport::new(bus.create_node("camera", "/"));
//! let qos = QosProfile::default();
//!
//! // Receive matched pairs
//! let pairs = Arc::new(Mutex::new(Vec::new()));
//! let sink = pairs.clone();
//! let _subscriber = transport
//!     .subscribe_camera("/camera/image", "raw", &qos, move |image, info| {
//!         sink.lock().unwrap().push((image.header.stamp, info.header.stamp));
//!     })
//!     .unwrap();
//!
//! // Publish an image and its calibration 2ms apart
//! let publisher = transport.advertise_camera("/camera/image", &qos).unwrap();
//! let image = Image {
//!     header: Header::new(Duration::ZERO, "camera"),
//!     ..Default::default()
//! };
//! let info = CameraInfo {
//!     header: Header::new(Duration::from_millis(2), "camera"),
//!     ..Default::default()
//! };
//! publisher.publish(&image, &info).unwrap();
//!
//! assert_eq!(
//!     *pairs.lock().unwrap(),
//!     vec![(Duration::ZERO, Duration::from_millis(2))]
//! );
//! ```

pub mod buffer;
pub mod camera_publisher;
pub mod camera_subscriber;
pub mod config;
pub mod context;
mod error;
pub mod health;
mod image_transport;
pub mod memory;
pub mod plugin;
pub mod publisher;
pub mod raw;
pub mod registry;
pub mod simple_publisher;
pub mod simple_subscriber;
pub mod subscriber;
pub mod sync;
pub mod topic;
mod types;
mod utils;

pub use camera_publisher::CameraPublisher;
pub use camera_subscriber::{CameraPair, CameraSubscriber, CameraSyncStats};
pub use config::{ChannelOptions, Config, Durability, QosProfile, Reliability, SyncConfig};
pub use context::NodeContext;
pub use error::TransportError;
pub use health::{HealthMonitor, SkewReport, SyncCounters};
pub use image_transport::ImageTransport;
pub use plugin::{ImageCallback, PublisherPlugin, SubscriberPlugin};
pub use publisher::Publisher;
pub use raw::{RAW_TRANSPORT, RawCodec, RawPublisher, RawSubscriber};
pub use registry::PluginRegistry;
pub use simple_publisher::{ImageEncoder, SimplePublisher};
pub use simple_subscriber::{ImageDecoder, SimpleSubscriber};
pub use subscriber::Subscriber;
pub use sync::{PairSynchronizer, SyncStats};
pub use types::*;
