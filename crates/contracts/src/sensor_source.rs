//! SensorSource trait - producer side of a sensor or world queue
//!
//! Real host sensors and mock sensors both push frames through a callback
//! invoked on the host's delivery thread.

use std::sync::Arc;

use crate::RawSensorFrame;

/// Frame callback.
///
/// Called from the host's delivery thread; must not block.
pub type SensorDataCallback = Arc<dyn Fn(RawSensorFrame) + Send + Sync>;

/// Callback-driven frame producer
pub trait SensorSource: Send + Sync {
    /// Source name (sensor name, or `world`)
    fn sensor_id(&self) -> &str;

    /// Register the frame callback.
    ///
    /// Repeated calls while listening are ignored.
    fn listen(&self, callback: SensorDataCallback);

    /// Stop delivering frames. Idempotent.
    fn stop(&self);

    fn is_listening(&self) -> bool;
}
