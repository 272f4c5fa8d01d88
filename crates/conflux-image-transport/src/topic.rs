//! Channel topic naming.
//!
//! Every mapping here is pure: the same inputs always produce the same
//! channel name.

use crate::error::TransportError;

/// The final path segment of the metadata channel next to an image topic.
pub const CAMERA_INFO_SEGMENT: &str = "camera_info";

/// Name of the encoded sub-channel of `base_topic` for `transport`.
///
/// ```
/// use conflux_image_transport::topic::transport_topic;
///
/// assert_eq!(transport_topic("/camera/image", "raw"), "/camera/image/raw");
/// ```
pub fn transport_topic(base_topic: &str, transport: &str) -> String {
    format!("{base_topic}/{transport}")
}

/// Derive the sibling metadata topic by replacing the last path segment of
/// a fully-qualified image topic.
///
/// ```
/// use conflux_image_transport::topic::camera_info_topic;
///
/// assert_eq!(camera_info_topic("/camera/image"), "/camera/camera_info");
/// assert_eq!(camera_info_topic("image"), "camera_info");
/// ```
pub fn camera_info_topic(image_topic: &str) -> String {
    match image_topic.rfind('/') {
        Some(pos) => format!("{}{CAMERA_INFO_SEGMENT}", &image_topic[..=pos]),
        None => CAMERA_INFO_SEGMENT.to_string(),
    }
}

/// Expand a topic name under a node's naming scope.
///
/// - `/abs/name` is kept as-is.
/// - `~` and `~/name` resolve inside the node's private namespace.
/// - `name` is prefixed with the node namespace.
pub fn expand_topic_name(
    topic: &str,
    node_name: &str,
    namespace: &str,
) -> Result<String, TransportError> {
    let invalid = |reason| TransportError::InvalidTopic {
        topic: topic.to_string(),
        reason,
    };

    if topic.is_empty() {
        return Err(invalid("topic name is empty"));
    }
    if node_name.is_empty() || node_name.contains('/') {
        return Err(invalid("node name must be a single non-empty segment"));
    }

    let namespace = namespace.trim_end_matches('/');
    let namespace = if namespace.is_empty() || namespace.starts_with('/') {
        namespace.to_string()
    } else {
        format!("/{namespace}")
    };

    let expanded = if topic.starts_with('/') {
        topic.to_string()
    } else if topic == "~" {
        format!("{namespace}/{node_name}")
    } else if let Some(rest) = topic.strip_prefix("~/") {
        format!("{namespace}/{node_name}/{rest}")
    } else if topic.starts_with('~') {
        return Err(invalid("'~' must be followed by '/'"));
    } else {
        format!("{namespace}/{topic}")
    };

    if expanded.contains("//") {
        return Err(invalid("topic name contains an empty segment"));
    }
    if expanded.len() > 1 && expanded.ends_with('/') {
        return Err(invalid("topic name ends with '/'"));
    }

    Ok(expanded)
}
