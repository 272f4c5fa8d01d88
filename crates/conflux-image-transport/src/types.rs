//! Message types carried by image transports.
//!
//! [`Image`] and [`CameraInfo`] mirror the `sensor_msgs` layouts closely
//! enough for transports to re-encode them, and both expose their header
//! stamp to the synchronizer through [`WithTimestamp`].

use std::{sync::Arc, time::Duration};

/// Creates a timestamp from the message passed to the synchronizer.
pub trait WithTimestamp {
    fn timestamp(&self) -> Duration;
}

impl<T> WithTimestamp for Arc<T>
where
    T: WithTimestamp + ?Sized,
{
    fn timestamp(&self) -> Duration {
        (**self).timestamp()
    }
}

/// Anything that can travel over a channel of the execution context.
pub trait Message: Clone + Send + Sync + 'static {}

impl<M> Message for M where M: Clone + Send + Sync + 'static {}

/// Immutable description of a transport: its name and whether it can
/// consume a uniquely owned image without copying.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportDescriptor {
    pub name: String,
    pub supports_take_ownership: bool,
}

impl TransportDescriptor {
    pub fn new(name: impl Into<String>, supports_take_ownership: bool) -> Self {
        Self {
            name: name.into(),
            supports_take_ownership,
        }
    }
}

/// Standard message header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Logical acquisition time, measured from the epoch.
    pub stamp: Duration,
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: Duration, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

/// An uncompressed image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    /// Pixel encoding, e.g. `rgb8` or `mono16`.
    pub encoding: String,
    pub is_bigendian: bool,
    /// Row length in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

impl Image {
    /// Number of payload bytes implied by `step * height`.
    pub fn expected_len(&self) -> usize {
        self.step as usize * self.height as usize
    }

    /// Copies every field except the pixel data.
    pub fn layout_only(&self) -> Self {
        Self {
            header: self.header.clone(),
            height: self.height,
            width: self.width,
            encoding: self.encoding.clone(),
            is_bigendian: self.is_bigendian,
            step: self.step,
            data: Vec::new(),
        }
    }
}

impl WithTimestamp for Image {
    fn timestamp(&self) -> Duration {
        self.header.stamp
    }
}

/// Region of interest inside the full sensor resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionOfInterest {
    pub x_offset: u32,
    pub y_offset: u32,
    pub height: u32,
    pub width: u32,
    pub do_rectify: bool,
}

/// Camera calibration published next to an image stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraInfo {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub distortion_model: String,
    /// Distortion parameters.
    pub d: Vec<f64>,
    /// Intrinsic camera matrix, row-major 3x3.
    pub k: [f64; 9],
    /// Rectification matrix, row-major 3x3.
    pub r: [f64; 9],
    /// Projection matrix, row-major 3x4.
    pub p: [f64; 12],
    pub binning_x: u32,
    pub binning_y: u32,
    pub roi: RegionOfInterest,
}

impl WithTimestamp for CameraInfo {
    fn timestamp(&self) -> Duration {
        self.header.stamp
    }
}

/// Convert ROS time (sec, nanosec) to Duration.
///
/// Negative seconds (pre-1970) floor to [`Duration::ZERO`].
///
/// ```
/// use conflux_image_transport::ros_time_to_duration;
/// use std::time::Duration;
///
/// assert_eq!(ros_time_to_duration(1000, 500_000_000), Duration::new(1000, 500_000_000));
/// assert_eq!(ros_time_to_duration(-1, 0), Duration::ZERO);
/// ```
pub fn ros_time_to_duration(sec: i32, nanosec: u32) -> Duration {
    if sec >= 0 {
        Duration::new(sec as u64, nanosec)
    } else {
        Duration::ZERO
    }
}

/// Convert Duration back to ROS time components, saturating at `i32::MAX`
/// seconds.
pub fn duration_to_ros_time(duration: Duration) -> (i32, u32) {
    let secs = duration.as_secs().min(i32::MAX as u64) as i32;
    (secs, duration.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_timestamp_from_header() {
        let image = Image {
            header: Header::new(Duration::from_millis(1500), "camera"),
            ..Default::default()
        };
        assert_eq!(image.timestamp(), Duration::from_millis(1500));
    }

    #[test]
    fn test_layout_only_drops_data() {
        let image = Image {
            header: Header::new(Duration::from_secs(1), "camera"),
            height: 2,
            width: 2,
            encoding: "mono8".to_string(),
            is_bigendian: false,
            step: 2,
            data: vec![1, 2, 3, 4],
        };

        let layout = image.layout_only();
        assert!(layout.data.is_empty());
        assert_eq!(layout.expected_len(), 4);
        assert_eq!(layout.encoding, "mono8");
    }

    #[test]
    fn test_duration_to_ros_time_saturates() {
        let (sec, nanosec) = duration_to_ros_time(Duration::new(u64::MAX, 7));
        assert_eq!(sec, i32::MAX);
        assert_eq!(nanosec, 7);
    }
}
