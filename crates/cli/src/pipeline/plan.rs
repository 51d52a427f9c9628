//! Blueprint adjustments made before a run, and batch job discovery.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use contracts::{BatchConfig, ScenarioBlueprint, SinkType, WeatherPreset};
use tracing::{debug, warn};

/// One recording of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    pub recording: PathBuf,
    /// `<batch.output_dir>/<recording stem>`
    pub output_dir: PathBuf,
    pub map: Option<String>,
    pub weather: Option<WeatherPreset>,
}

/// Point every file sink at `dir`
pub fn redirect_file_sinks(blueprint: &mut ScenarioBlueprint, dir: &Path) {
    for output in &mut blueprint.outputs {
        if output.sink_type == SinkType::File {
            output
                .params
                .insert("path".to_string(), dir.display().to_string());
        }
    }
}

/// Give file sinks the scenario resolution unless they set their own
pub fn inject_sensor_size(blueprint: &mut ScenarioBlueprint) {
    let height = blueprint.resolution.height.to_string();
    let width = blueprint.resolution.width.to_string();
    for output in &mut blueprint.outputs {
        if output.sink_type == SinkType::File {
            output
                .params
                .entry("sensor_height".to_string())
                .or_insert_with(|| height.clone());
            output
                .params
                .entry("sensor_width".to_string())
                .or_insert_with(|| width.clone());
        }
    }
}

/// Map and weather named by tokens in a recording's file name.
///
/// Tokens are tried in key order; the first one contained in the name wins.
pub fn infer_world(file_name: &str, batch: &BatchConfig) -> (Option<String>, Option<WeatherPreset>) {
    let map = batch
        .towns
        .iter()
        .find(|(token, _)| file_name.contains(token.as_str()))
        .map(|(_, map)| map.clone());
    let weather = batch
        .weathers
        .iter()
        .find(|(token, _)| file_name.contains(token.as_str()))
        .map(|(_, preset)| *preset);
    (map, weather)
}

fn collect_recordings(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_recordings(&path, extension, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            out.push(path);
        }
    }
    Ok(())
}

/// Walk `batch.input_dir` recursively for recordings, sorted by path
pub fn discover_jobs(batch: &BatchConfig) -> io::Result<Vec<BatchJob>> {
    let mut recordings = Vec::new();
    collect_recordings(&batch.input_dir, &batch.extension, &mut recordings)?;
    recordings.sort();

    let jobs = recordings
        .into_iter()
        .filter_map(|recording| {
            let file_name = recording.file_name()?.to_string_lossy().into_owned();
            let stem = recording.file_stem()?.to_string_lossy().into_owned();
            let (map, weather) = infer_world(&file_name, batch);
            if map.is_none() {
                warn!(recording = %recording.display(), "no town token in file name, keeping configured map");
            }
            debug!(recording = %recording.display(), ?map, ?weather, "batch job");
            Some(BatchJob {
                output_dir: batch.output_dir.join(stem),
                recording,
                map,
                weather,
            })
        })
        .collect();
    Ok(jobs)
}

/// Blueprint of one batch job: world from the file name, outputs redirected
pub fn job_blueprint(base: &ScenarioBlueprint, job: &BatchJob) -> ScenarioBlueprint {
    let mut blueprint = base.clone();
    if job.map.is_some() {
        blueprint.world.map = job.map.clone();
    }
    if job.weather.is_some() {
        blueprint.world.weather = job.weather;
    }
    blueprint.recording.record_path = Some(job.recording.clone());
    redirect_file_sinks(&mut blueprint, &job.output_dir);
    blueprint
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SinkConfig;
    use std::collections::{BTreeMap, HashMap};
    use tempfile::tempdir;

    fn batch(input_dir: PathBuf, output_dir: PathBuf) -> BatchConfig {
        BatchConfig {
            input_dir,
            output_dir,
            extension: "log".to_string(),
            towns: BTreeMap::from([
                ("_town2_".to_string(), "Town02".to_string()),
                ("_town10_".to_string(), "Town10HD".to_string()),
            ]),
            weathers: BTreeMap::from([
                ("_clear-noon".to_string(), WeatherPreset::ClearNoon),
                ("_cloudy-sunset".to_string(), WeatherPreset::CloudySunset),
            ]),
        }
    }

    #[test]
    fn test_infer_world() {
        let b = batch(PathBuf::from("in"), PathBuf::from("out"));

        let (map, weather) = infer_world("dynamic_town2_forward_cloudy-sunset.log", &b);
        assert_eq!(map.as_deref(), Some("Town02"));
        assert_eq!(weather, Some(WeatherPreset::CloudySunset));

        let (map, weather) = infer_world("static_town10_left_rainy.log", &b);
        assert_eq!(map.as_deref(), Some("Town10HD"));
        assert_eq!(weather, None);
    }

    #[test]
    fn test_discover_jobs() {
        let input = tempdir().unwrap();
        let nested = input.path().join("both");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("b_town2_x_clear-noon.log"), b"").unwrap();
        fs::write(input.path().join("a_town10_y_cloudy-sunset.log"), b"").unwrap();
        fs::write(input.path().join("notes.txt"), b"").unwrap();

        let b = batch(input.path().to_path_buf(), PathBuf::from("/data/out"));
        let jobs = discover_jobs(&b).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(
            jobs[0].output_dir,
            PathBuf::from("/data/out/a_town10_y_cloudy-sunset")
        );
        assert_eq!(jobs[0].map.as_deref(), Some("Town10HD"));
        assert_eq!(jobs[1].weather, Some(WeatherPreset::ClearNoon));
    }

    #[test]
    fn test_job_blueprint_redirects_file_sinks() {
        let mut base = ScenarioBlueprint::default();
        base.outputs = vec![
            SinkConfig {
                name: "status".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 8,
                params: HashMap::new(),
            },
            SinkConfig {
                name: "dataset".to_string(),
                sink_type: SinkType::File,
                queue_capacity: 8,
                params: HashMap::from([("path".to_string(), "output/x".to_string())]),
            },
        ];
        let job = BatchJob {
            recording: PathBuf::from("in/r_town2_.log"),
            output_dir: PathBuf::from("out/r_town2_"),
            map: Some("Town02".to_string()),
            weather: None,
        };

        let mut blueprint = job_blueprint(&base, &job);
        inject_sensor_size(&mut blueprint);

        assert_eq!(blueprint.world.map.as_deref(), Some("Town02"));
        assert_eq!(blueprint.recording.record_path, Some(job.recording.clone()));
        assert!(blueprint.outputs[0].params.is_empty());
        let params = &blueprint.outputs[1].params;
        assert_eq!(params["path"], PathBuf::from("out/r_town2_").display().to_string());
        assert_eq!(params["sensor_height"], "260");
        assert_eq!(params["sensor_width"], "346");
    }
}
