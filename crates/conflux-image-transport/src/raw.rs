//! The `raw` transport: images travel unencoded.

use std::sync::Arc;

use crate::{
    error::TransportError,
    simple_publisher::{ImageEncoder, SimplePublisher},
    simple_subscriber::{ImageDecoder, SimpleSubscriber},
    types::Image,
};

pub const RAW_TRANSPORT: &str = "raw";

/// Encoder and decoder of the `raw` transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl ImageEncoder for RawCodec {
    type Encoded = Image;

    fn transport_name(&self) -> &str {
        RAW_TRANSPORT
    }

    fn supports_take_ownership(&self) -> bool {
        true
    }

    fn encode(&self, image: &Image) -> Result<Image, TransportError> {
        Ok(image.clone())
    }

    fn encode_owned(&self, image: Image) -> Result<Image, TransportError> {
        Ok(image)
    }
}

impl ImageDecoder for RawCodec {
    type Encoded = Image;

    fn transport_name(&self) -> &str {
        RAW_TRANSPORT
    }

    fn decode(&self, message: Arc<Image>) -> Result<Arc<Image>, TransportError> {
        Ok(message)
    }
}

pub type RawPublisher<N> = SimplePublisher<N, RawCodec>;

pub type RawSubscriber<N> = SimpleSubscriber<N, RawCodec>;
