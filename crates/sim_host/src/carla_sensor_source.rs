//! CARLA sensor wrapper
//!
//! Only compiled with the `real-carla` feature.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use carla::client::Sensor;
use contracts::{SensorDataCallback, SensorKind, SensorSource};
use tracing::{debug, trace};

use crate::sensor_data_converter::convert_sensor_data;

/// Native CARLA sensor exposed as a `SensorSource`
pub struct CarlaSensorSource {
    name: String,
    kind: SensorKind,
    sensor: Sensor,
    listening: Arc<AtomicBool>,
}

impl CarlaSensorSource {
    pub fn new(name: String, kind: SensorKind, sensor: Sensor) -> Self {
        Self {
            name,
            kind,
            sensor,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl SensorSource for CarlaSensorSource {
    fn sensor_id(&self) -> &str {
        &self.name
    }

    fn listen(&self, callback: SensorDataCallback) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let name = self.name.clone();
        let kind = self.kind;
        let listening = self.listening.clone();
        debug!(sensor = %name, %kind, "registering CARLA sensor callback");

        self.sensor.listen(move |data| {
            if !listening.load(Ordering::Relaxed) {
                return;
            }
            match convert_sensor_data(&name, kind, &data) {
                Some(frame) => callback(frame),
                None => trace!(sensor = %name, "measurement does not match sensor kind"),
            }
        });
    }

    fn stop(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            debug!(sensor = %self.name, "stopping CARLA sensor");
            self.sensor.stop();
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }
}
