use thiserror::Error;

/// Errors reported by transport plugins, subscriptions and the
/// execution context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// An optional plugin path (e.g. take-ownership publish) was invoked on
    /// a plugin that does not provide it.
    #[error("{operation} is not implemented by the '{transport}' transport")]
    NotImplemented {
        transport: String,
        operation: &'static str,
    },

    #[error("the '{transport}' publisher is not advertised")]
    NotAdvertised { transport: String },

    /// A facade over several channels was used after it was shut down.
    #[error("nothing is advertised on '{topic}'")]
    TopicNotAdvertised { topic: String },

    #[error("the '{transport}' subscriber is not subscribed")]
    NotSubscribed { transport: String },

    #[error("the '{transport}' publisher is already advertised on '{topic}'")]
    AlreadyAdvertised { transport: String, topic: String },

    #[error("the '{transport}' subscriber is already subscribed to '{topic}'")]
    AlreadySubscribed { transport: String, topic: String },

    /// Internal state was used before it was initialised, or after it was
    /// torn down for good.
    #[error("construction failure: {0}")]
    ConstructionFailure(String),

    #[error("no plugin registered under '{lookup_name}'")]
    UnknownTransport { lookup_name: String },

    #[error("invalid topic name '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: &'static str },

    #[error("topic '{topic}' carries '{existing}', cannot open it for '{requested}'")]
    TypeMismatch {
        topic: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("raw buffer holds {actual} bytes, the image layout needs {expected}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("failed to encode image for '{transport}': {reason}")]
    Encode { transport: String, reason: String },

    #[error("failed to decode image from '{transport}': {reason}")]
    Decode { transport: String, reason: String },
}

impl TransportError {
    pub fn not_implemented(transport: impl Into<String>, operation: &'static str) -> Self {
        Self::NotImplemented {
            transport: transport.into(),
            operation,
        }
    }

    pub fn not_advertised(transport: impl Into<String>) -> Self {
        Self::NotAdvertised {
            transport: transport.into(),
        }
    }

    pub fn topic_not_advertised(topic: impl Into<String>) -> Self {
        Self::TopicNotAdvertised {
            topic: topic.into(),
        }
    }

    pub fn not_subscribed(transport: impl Into<String>) -> Self {
        Self::NotSubscribed {
            transport: transport.into(),
        }
    }
}
