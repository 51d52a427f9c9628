//! FileSink - dataset directory writer
//!
//! Layout under `path`, one subdirectory per sensor:
//! - `props.json`: sensor size `[height, width]` and creation time
//! - `<events>/<tick>.bin`: bincode `Vec<DvsEvent>` of that tick
//! - `<gray|rgb>/<n>.png`, `<flow>/<n>.bin` (bincode `FlowField`)
//! - `index.json` on close: frame and time records against the cumulative
//!   event count

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{
    ContractError, DataSink, ExtractedData, ExtractedFrame, ExtractedFrameSet, SensorId, Tick,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

pub const PROPS_FILE: &str = "props.json";
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub base_path: PathBuf,
    /// (height, width); taken from the first image-shaped frame when unset
    pub sensor_size: Option<(u32, u32)>,
}

impl FileSinkConfig {
    /// `path`, plus optional `sensor_height` / `sensor_width`
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));
        let dim = |key: &str| params.get(key).and_then(|v| v.parse::<u32>().ok());
        let sensor_size = dim("sensor_height").zip(dim("sensor_width"));

        Self {
            base_path,
            sensor_size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Props {
    sensor_size: [u32; 2],
    created_at: String,
}

/// Cumulative event count at a point in simulated time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeOffset {
    pub sim_time: f64,
    pub events_offset: u64,
}

/// One written image or flow frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub file: String,
    pub tick: Tick,
    pub sim_time: f64,
    /// Events written up to and including this tick
    pub events_offset: u64,
}

/// Contents of `index.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetIndex {
    pub time_to_events: Vec<TimeOffset>,
    /// Per image/flow sensor, in write order
    pub frames: BTreeMap<String, Vec<FrameRecord>>,
}

pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    created_dirs: HashSet<PathBuf>,
    props_written: bool,
    sequence: HashMap<SensorId, u64>,
    events_total: u64,
    index: DatasetIndex,
    closed: bool,
}

fn invalid_data(e: impl std::error::Error + Send + Sync + 'static) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e)
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            created_dirs: HashSet::new(),
            props_written: false,
            sequence: HashMap::new(),
            events_total: 0,
            index: DatasetIndex::default(),
            closed: false,
        })
    }

    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    pub fn index(&self) -> &DatasetIndex {
        &self.index
    }

    fn sensor_dir(&mut self, sensor: &str) -> std::io::Result<PathBuf> {
        let dir = self.config.base_path.join(sensor);
        if !self.created_dirs.contains(&dir) {
            fs::create_dir_all(&dir)?;
            self.created_dirs.insert(dir.clone());
        }
        Ok(dir)
    }

    fn write_props(&mut self, frame_set: &ExtractedFrameSet) -> std::io::Result<()> {
        if self.props_written {
            return Ok(());
        }
        let size = self
            .config
            .sensor_size
            .or_else(|| frame_set.frames.iter().find_map(|f| f.data.dimensions()));
        let Some((height, width)) = size else {
            return Ok(());
        };

        let props = Props {
            sensor_size: [height, width],
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let file = File::create(self.config.base_path.join(PROPS_FILE))?;
        serde_json::to_writer_pretty(file, &props).map_err(invalid_data)?;
        self.props_written = true;
        debug!(sink = %self.name, height, width, "props written");
        Ok(())
    }

    fn write_frame_set(&mut self, frame_set: &ExtractedFrameSet) -> std::io::Result<()> {
        self.write_props(frame_set)?;

        // Events first, so image records count this tick's events.
        let mut tick_events = false;
        for frame in &frame_set.frames {
            if let ExtractedData::Events(events) = &frame.data {
                let dir = self.sensor_dir(&frame.sensor)?;
                let path = dir.join(format!("{:06}.bin", frame.tick.frame()));
                let mut out = BufWriter::new(File::create(path)?);
                bincode::serialize_into(&mut out, events).map_err(invalid_data)?;
                out.flush()?;
                self.events_total += events.len() as u64;
                tick_events = true;
            }
        }
        if tick_events {
            self.index.time_to_events.push(TimeOffset {
                sim_time: frame_set.sim_time,
                events_offset: self.events_total,
            });
        }

        for frame in &frame_set.frames {
            if !matches!(frame.data, ExtractedData::Events(_)) {
                self.write_dense_frame(frame, frame_set.sim_time)?;
            }
        }
        Ok(())
    }

    fn write_dense_frame(&mut self, frame: &ExtractedFrame, sim_time: f64) -> std::io::Result<()> {
        let dir = self.sensor_dir(&frame.sensor)?;
        let n = self.sequence.entry(frame.sensor.clone()).or_insert(0);
        let seq = *n;
        *n += 1;

        let file = match &frame.data {
            ExtractedData::Rgb(img) => {
                let file = format!("{seq:06}.png");
                image::save_buffer(
                    dir.join(&file),
                    &img.data,
                    img.width,
                    img.height,
                    image::ColorType::Rgb8,
                )
                .map_err(std::io::Error::other)?;
                file
            }
            ExtractedData::Gray(img) => {
                let file = format!("{seq:06}.png");
                image::save_buffer(
                    dir.join(&file),
                    &img.data,
                    img.width,
                    img.height,
                    image::ColorType::L8,
                )
                .map_err(std::io::Error::other)?;
                file
            }
            ExtractedData::Flow(flow) => {
                let file = format!("{seq:06}.bin");
                let mut out = BufWriter::new(File::create(dir.join(&file))?);
                bincode::serialize_into(&mut out, flow).map_err(invalid_data)?;
                out.flush()?;
                file
            }
            ExtractedData::Events(_) => return Ok(()),
        };

        self.index
            .frames
            .entry(frame.sensor.to_string())
            .or_default()
            .push(FrameRecord {
                file,
                tick: frame.tick,
                sim_time,
                events_offset: self.events_total,
            });
        Ok(())
    }

    fn write_index(&self) -> std::io::Result<()> {
        let file = File::create(self.config.base_path.join(INDEX_FILE))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.index).map_err(invalid_data)
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, frame_set),
        fields(sink = %self.name, tick = %frame_set.tick)
    )]
    async fn write(&mut self, frame_set: &ExtractedFrameSet) -> Result<(), ContractError> {
        self.write_frame_set(frame_set).map_err(|e| {
            error!(sink = %self.name, tick = %frame_set.tick, error = %e, "write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.write_index()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        info!(
            sink = %self.name,
            path = %self.config.base_path.display(),
            events = self.events_total,
            "dataset index written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DvsEvent, FlowField, GrayImage, SensorKind};
    use tempfile::tempdir;

    fn gray(tick: u64) -> ExtractedFrame {
        ExtractedFrame {
            sensor: "gray".into(),
            kind: SensorKind::Gray,
            tick: Tick::new(tick),
            timestamp: 0.0,
            data: ExtractedData::Gray(GrayImage {
                width: 3,
                height: 2,
                data: vec![0, 50, 100, 150, 200, 250],
            }),
        }
    }

    fn events(tick: u64, n: usize) -> ExtractedFrame {
        ExtractedFrame {
            sensor: "events".into(),
            kind: SensorKind::Dvs,
            tick: Tick::new(tick),
            timestamp: 0.0,
            data: ExtractedData::Events(
                (0..n)
                    .map(|i| DvsEvent {
                        x: i as u16,
                        y: 1,
                        t: i as i64,
                        polarity: true,
                    })
                    .collect(),
            ),
        }
    }

    fn flow(tick: u64) -> ExtractedFrame {
        ExtractedFrame {
            sensor: "flow".into(),
            kind: SensorKind::OpticalFlow,
            tick: Tick::new(tick),
            timestamp: 0.0,
            data: ExtractedData::Flow(FlowField {
                width: 3,
                height: 2,
                vectors: vec![[1.0, -1.0]; 6],
            }),
        }
    }

    fn frame_set(tick: u64, sim_time: f64, frames: Vec<ExtractedFrame>) -> ExtractedFrameSet {
        ExtractedFrameSet {
            tick: Tick::new(tick),
            index: tick,
            sim_time,
            warmup: false,
            frames,
            absent: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_dataset_layout() {
        let dir = tempdir().unwrap();
        let config = FileSinkConfig {
            base_path: dir.path().to_path_buf(),
            sensor_size: None,
        };
        let mut sink = FileSink::new("dataset", config).unwrap();

        sink.write(&frame_set(10, 0.0, vec![gray(10), events(10, 4), flow(10)]))
            .await
            .unwrap();
        sink.write(&frame_set(11, 0.04, vec![events(11, 3)]))
            .await
            .unwrap();
        sink.write(&frame_set(12, 0.08, vec![events(12, 2), gray(12)]))
            .await
            .unwrap();
        sink.close().await.unwrap();

        let root = dir.path();
        assert!(root.join("gray/000000.png").exists());
        assert!(root.join("gray/000001.png").exists());
        assert!(root.join("flow/000000.bin").exists());
        assert!(root.join("events/000011.bin").exists());

        let props: serde_json::Value =
            serde_json::from_reader(File::open(root.join(PROPS_FILE)).unwrap()).unwrap();
        assert_eq!(props["sensor_size"], serde_json::json!([2, 3]));
        assert!(props["created_at"].is_string());

        let index: DatasetIndex =
            serde_json::from_reader(File::open(root.join(INDEX_FILE)).unwrap()).unwrap();
        let offsets: Vec<u64> = index.time_to_events.iter().map(|t| t.events_offset).collect();
        assert_eq!(offsets, vec![4, 7, 9]);
        let gray_records = &index.frames["gray"];
        assert_eq!(gray_records.len(), 2);
        assert_eq!(gray_records[0].events_offset, 4);
        assert_eq!(gray_records[1].events_offset, 9);
        assert_eq!(gray_records[1].file, "000001.png");
        assert_eq!(index.frames["flow"][0].tick, Tick::new(10));
    }

    #[tokio::test]
    async fn test_events_round_trip_through_bincode() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::from_params(
            "dataset",
            &HashMap::from([("path".to_string(), dir.path().display().to_string())]),
        )
        .unwrap();
        sink.write(&frame_set(5, 0.0, vec![events(5, 2)])).await.unwrap();

        let bytes = fs::read(dir.path().join("events/000005.bin")).unwrap();
        let decoded: Vec<DvsEvent> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].x, 1);
    }

    #[tokio::test]
    async fn test_configured_size_and_double_close() {
        let dir = tempdir().unwrap();
        let params = HashMap::from([
            ("path".to_string(), dir.path().display().to_string()),
            ("sensor_height".to_string(), "260".to_string()),
            ("sensor_width".to_string(), "346".to_string()),
        ]);
        let mut sink = FileSink::from_params("dataset", &params).unwrap();
        sink.write(&frame_set(1, 0.0, vec![events(1, 1)])).await.unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();

        let props: serde_json::Value =
            serde_json::from_reader(File::open(dir.path().join(PROPS_FILE)).unwrap()).unwrap();
        assert_eq!(props["sensor_size"], serde_json::json!([260, 346]));
        assert!(sink.index().frames.is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config = FileSinkConfig::from_params(&HashMap::new());
        assert_eq!(config.base_path, PathBuf::from("./output"));
        assert!(config.sensor_size.is_none());
    }
}
