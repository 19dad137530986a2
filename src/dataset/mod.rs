//! Dataset catalog access.
//!
//! The pipeline never holds a global dataset handle. Everything that needs
//! sample or calibration metadata takes a [`SensorCatalog`] explicitly.
//!
//! Two implementations are provided:
//! - [`InMemoryCatalog`] for tests and callers that already hold the tables
//! - [`JsonCatalog`] for a directory of JSON tables (`sample.json`,
//!   `sample_data.json`, `calibrated_sensor.json`, optional `sensor.json`
//!   and `scene.json`)
//!
//! In the nuScenes layout `sample.json` has no channel map. It is rebuilt
//! from the key-frame `sample_data` records, whose calibration points at a
//! `sensor` record naming the channel.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::transforms::Calibration;

/// Errors raised by catalog lookups and loading.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown {table} token: {token}")]
    UnknownToken { table: &'static str, token: String },

    #[error("malformed {table} record {token}: {reason}")]
    MalformedRecord {
        table: &'static str,
        token: String,
        reason: String,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// One point-in-time capture: sensor channel name to sample-data token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub token: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Sample {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            data: BTreeMap::new(),
        }
    }

    /// Builder-style setter for a channel's sample-data token.
    pub fn with_channel(mut self, channel: impl Into<String>, sample_data: impl Into<String>) -> Self {
        self.data.insert(channel.into(), sample_data.into());
        self
    }
}

/// A single sensor reading: where its file is and which calibration applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub token: String,
    /// Path relative to the data root, `/`-separated.
    pub filename: String,
    pub calibrated_sensor_token: String,
}

/// `sample_data.json` record, including the links used to rebuild a
/// sample's channel map.
#[derive(Debug, Clone, Deserialize)]
struct SampleDataRecord {
    token: String,
    filename: String,
    calibrated_sensor_token: String,
    #[serde(default)]
    sample_token: Option<String>,
    #[serde(default = "default_is_key_frame")]
    is_key_frame: bool,
}

fn default_is_key_frame() -> bool {
    true
}

/// `sensor.json` record.
#[derive(Debug, Clone, Deserialize)]
struct SensorRecord {
    token: String,
    channel: String,
}

/// Scene record; only the first sample is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub token: String,
    pub first_sample_token: String,
}

/// Calibration record as stored in `calibrated_sensor.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CalibrationRecord {
    token: String,
    #[serde(default)]
    sensor_token: Option<String>,
    rotation: Vec<f64>,
    translation: Vec<f64>,
}

impl CalibrationRecord {
    fn into_calibration(self) -> Result<(String, Calibration)> {
        let rotation: [f64; 4] = self.rotation.as_slice().try_into().map_err(|_| {
            CatalogError::MalformedRecord {
                table: "calibrated_sensor",
                token: self.token.clone(),
                reason: format!("rotation has {} components, expected 4", self.rotation.len()),
            }
        })?;
        let translation: [f64; 3] = self.translation.as_slice().try_into().map_err(|_| {
            CatalogError::MalformedRecord {
                table: "calibrated_sensor",
                token: self.token.clone(),
                reason: format!(
                    "translation has {} components, expected 3",
                    self.translation.len()
                ),
            }
        })?;
        Ok((
            self.token,
            Calibration {
                rotation,
                translation,
            },
        ))
    }
}

/// Read-only lookup interface onto the dataset.
pub trait SensorCatalog: Sync {
    /// Look up a sample by token.
    fn sample(&self, token: &str) -> Result<&Sample>;

    /// Look up a sensor reading by sample-data token.
    fn sample_data(&self, token: &str) -> Result<&SensorFrame>;

    /// Look up a sensor calibration by calibrated-sensor token.
    fn calibrated_sensor(&self, token: &str) -> Result<&Calibration>;
}

/// Catalog backed by in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    samples: HashMap<String, Sample>,
    frames: HashMap<String, SensorFrame>,
    calibrations: HashMap<String, Calibration>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sample(&mut self, sample: Sample) {
        self.samples.insert(sample.token.clone(), sample);
    }

    pub fn insert_frame(&mut self, frame: SensorFrame) {
        self.frames.insert(frame.token.clone(), frame);
    }

    pub fn insert_calibration(&mut self, token: impl Into<String>, calibration: Calibration) {
        self.calibrations.insert(token.into(), calibration);
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SensorCatalog for InMemoryCatalog {
    fn sample(&self, token: &str) -> Result<&Sample> {
        self.samples.get(token).ok_or_else(|| CatalogError::UnknownToken {
            table: "sample",
            token: token.to_string(),
        })
    }

    fn sample_data(&self, token: &str) -> Result<&SensorFrame> {
        self.frames.get(token).ok_or_else(|| CatalogError::UnknownToken {
            table: "sample_data",
            token: token.to_string(),
        })
    }

    fn calibrated_sensor(&self, token: &str) -> Result<&Calibration> {
        self.calibrations
            .get(token)
            .ok_or_else(|| CatalogError::UnknownToken {
                table: "calibrated_sensor",
                token: token.to_string(),
            })
    }
}

/// Catalog loaded from a directory of JSON tables.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    table_dir: PathBuf,
    tables: InMemoryCatalog,
    sample_order: Vec<String>,
    scenes: Vec<Scene>,
}

impl JsonCatalog {
    /// Load all tables from `table_dir`.
    ///
    /// `scene.json` is optional; the other three tables are required.
    pub fn load<P: AsRef<Path>>(table_dir: P) -> Result<Self> {
        let table_dir = table_dir.as_ref().to_path_buf();

        let mut samples: Vec<Sample> = read_table(&table_dir.join("sample.json"))?;
        let frames: Vec<SampleDataRecord> = read_table(&table_dir.join("sample_data.json"))?;
        let calibrations: Vec<CalibrationRecord> =
            read_table(&table_dir.join("calibrated_sensor.json"))?;
        let sensors: Vec<SensorRecord> = read_optional_table(&table_dir.join("sensor.json"))?;
        let scenes: Vec<Scene> = read_optional_table(&table_dir.join("scene.json"))?;

        let mut derived = derive_channel_maps(&frames, &calibrations, &sensors);
        for sample in &mut samples {
            if sample.data.is_empty() {
                sample.data = derived.remove(&sample.token).unwrap_or_default();
            }
            if sample.data.is_empty() {
                return Err(CatalogError::MalformedRecord {
                    table: "sample",
                    token: sample.token.clone(),
                    reason: "no sensor data: no `data` map and no key-frame sample_data \
                             linked to it through calibrated_sensor and sensor"
                        .to_string(),
                });
            }
        }

        let mut tables = InMemoryCatalog::new();
        let sample_order = samples.iter().map(|s| s.token.clone()).collect();
        for sample in samples {
            tables.insert_sample(sample);
        }
        for record in frames {
            tables.insert_frame(SensorFrame {
                token: record.token,
                filename: record.filename,
                calibrated_sensor_token: record.calibrated_sensor_token,
            });
        }
        for record in calibrations {
            let (token, calibration) = record.into_calibration()?;
            tables.insert_calibration(token, calibration);
        }

        info!(
            "Loaded catalog from {}: {} samples, {} sensor frames, {} calibrations, {} scenes",
            table_dir.display(),
            tables.samples.len(),
            tables.frames.len(),
            tables.calibrations.len(),
            scenes.len()
        );

        Ok(Self {
            table_dir,
            tables,
            sample_order,
            scenes,
        })
    }

    /// Directory the tables were loaded from.
    pub fn table_dir(&self) -> &Path {
        &self.table_dir
    }

    /// All samples, in table order.
    pub fn samples(&self) -> Vec<&Sample> {
        self.sample_order
            .iter()
            .filter_map(|token| self.tables.samples.get(token))
            .collect()
    }

    /// Scenes, in table order.
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// The first sample of every scene, in scene order.
    pub fn first_samples_of_scenes(&self) -> Result<Vec<&Sample>> {
        self.scenes
            .iter()
            .map(|scene| self.sample(&scene.first_sample_token))
            .collect()
    }
}

impl SensorCatalog for JsonCatalog {
    fn sample(&self, token: &str) -> Result<&Sample> {
        self.tables.sample(token)
    }

    fn sample_data(&self, token: &str) -> Result<&SensorFrame> {
        self.tables.sample_data(token)
    }

    fn calibrated_sensor(&self, token: &str) -> Result<&Calibration> {
        self.tables.calibrated_sensor(token)
    }
}

/// Channel maps per sample token, built from key-frame `sample_data` records.
///
/// A record contributes only when its calibration names a sensor listed in
/// `sensors`. The first key frame seen for a channel wins.
fn derive_channel_maps(
    frames: &[SampleDataRecord],
    calibrations: &[CalibrationRecord],
    sensors: &[SensorRecord],
) -> HashMap<String, BTreeMap<String, String>> {
    let channel_by_sensor: HashMap<&str, &str> = sensors
        .iter()
        .map(|s| (s.token.as_str(), s.channel.as_str()))
        .collect();
    let channel_by_calibration: HashMap<&str, &str> = calibrations
        .iter()
        .filter_map(|c| {
            let sensor = c.sensor_token.as_deref()?;
            Some((c.token.as_str(), *channel_by_sensor.get(sensor)?))
        })
        .collect();

    let mut maps: HashMap<String, BTreeMap<String, String>> = HashMap::new();
    for frame in frames.iter().filter(|f| f.is_key_frame) {
        let Some(sample_token) = &frame.sample_token else {
            continue;
        };
        let Some(channel) = channel_by_calibration.get(frame.calibrated_sensor_token.as_str())
        else {
            continue;
        };
        maps.entry(sample_token.clone())
            .or_default()
            .entry(channel.to_string())
            .or_insert_with(|| frame.token.clone());
    }
    maps
}

/// Read a table that may be absent; a missing file yields no records.
fn read_optional_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if path.exists() {
        read_table(path)
    } else {
        debug!("No table at {}", path.display());
        Ok(Vec::new())
    }
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| CatalogError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| CatalogError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_tables(dir: &Path, calibration_rotation: &str, with_scenes: bool) {
        fs::write(
            dir.join("sample.json"),
            r#"[
                {"token": "s1", "data": {"LIDAR_TOP": "sd1", "CAM_FRONT": "sd9"}},
                {"token": "s0", "data": {"LIDAR_TOP": "sd0"}}
            ]"#,
        )
        .unwrap();
        fs::write(
            dir.join("sample_data.json"),
            r#"[
                {"token": "sd0", "filename": "lidar/a.bin", "calibrated_sensor_token": "c0"},
                {"token": "sd1", "filename": "lidar/b.bin", "calibrated_sensor_token": "c0"}
            ]"#,
        )
        .unwrap();
        fs::write(
            dir.join("calibrated_sensor.json"),
            format!(
                r#"[{{"token": "c0", "rotation": {}, "translation": [1.0, 2.0, 3.0]}}]"#,
                calibration_rotation
            ),
        )
        .unwrap();
        if with_scenes {
            fs::write(
                dir.join("scene.json"),
                r#"[{"token": "scene0", "first_sample_token": "s0"}]"#,
            )
            .unwrap();
        }
    }

    #[test]
    fn test_in_memory_lookup() {
        let mut catalog = InMemoryCatalog::new();
        catalog.insert_sample(Sample::new("s").with_channel("LIDAR_TOP", "sd"));
        catalog.insert_frame(SensorFrame {
            token: "sd".to_string(),
            filename: "x.bin".to_string(),
            calibrated_sensor_token: "c".to_string(),
        });
        catalog.insert_calibration("c", Calibration::identity());

        let sample = catalog.sample("s").unwrap();
        let frame = catalog.sample_data(&sample.data["LIDAR_TOP"]).unwrap();
        let calibration = catalog.calibrated_sensor(&frame.calibrated_sensor_token).unwrap();
        assert_eq!(*calibration, Calibration::identity());
    }

    #[test]
    fn test_unknown_token() {
        let catalog = InMemoryCatalog::new();
        match catalog.sample_data("nope") {
            Err(CatalogError::UnknownToken { table, token }) => {
                assert_eq!(table, "sample_data");
                assert_eq!(token, "nope");
            }
            other => panic!("expected UnknownToken, got {:?}", other),
        }
    }

    #[test]
    fn test_json_catalog_load() {
        let dir = TempDir::new().unwrap();
        write_tables(dir.path(), "[1.0, 0.0, 0.0, 0.0]", true);

        let catalog = JsonCatalog::load(dir.path()).unwrap();
        let tokens: Vec<&str> = catalog.samples().iter().map(|s| s.token.as_str()).collect();
        assert_eq!(tokens, vec!["s1", "s0"]);

        let calibration = catalog.calibrated_sensor("c0").unwrap();
        assert_eq!(calibration.translation, [1.0, 2.0, 3.0]);

        let firsts = catalog.first_samples_of_scenes().unwrap();
        assert_eq!(firsts.len(), 1);
        assert_eq!(firsts[0].token, "s0");
    }

    #[test]
    fn test_json_catalog_without_scenes() {
        let dir = TempDir::new().unwrap();
        write_tables(dir.path(), "[1.0, 0.0, 0.0, 0.0]", false);

        let catalog = JsonCatalog::load(dir.path()).unwrap();
        assert!(catalog.scenes().is_empty());
        assert!(catalog.first_samples_of_scenes().unwrap().is_empty());
    }

    #[test]
    fn test_json_catalog_rejects_short_rotation() {
        let dir = TempDir::new().unwrap();
        write_tables(dir.path(), "[1.0, 0.0, 0.0]", false);

        match JsonCatalog::load(dir.path()) {
            Err(CatalogError::MalformedRecord { table, token, .. }) => {
                assert_eq!(table, "calibrated_sensor");
                assert_eq!(token, "c0");
            }
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }

    /// nuScenes layout: samples carry no channel map.
    fn write_nuscenes_tables(dir: &Path, with_sensors: bool) {
        fs::write(
            dir.join("sample.json"),
            r#"[{"token": "s0", "timestamp": 1532402927647951, "scene_token": "scene0"}]"#,
        )
        .unwrap();
        fs::write(
            dir.join("sample_data.json"),
            r#"[
                {"token": "sd_top", "sample_token": "s0", "is_key_frame": true,
                 "filename": "samples/LIDAR_TOP/a.bin", "calibrated_sensor_token": "c_top"},
                {"token": "sd_top_sweep", "sample_token": "s0", "is_key_frame": false,
                 "filename": "sweeps/LIDAR_TOP/b.bin", "calibrated_sensor_token": "c_top"},
                {"token": "sd_left", "sample_token": "s0", "is_key_frame": true,
                 "filename": "samples/LIDAR_FRONT_LEFT/c.bin", "calibrated_sensor_token": "c_left"},
                {"token": "sd_cam", "sample_token": "s0", "is_key_frame": true,
                 "filename": "samples/CAM_FRONT/d.jpg", "calibrated_sensor_token": "c_cam"}
            ]"#,
        )
        .unwrap();
        fs::write(
            dir.join("calibrated_sensor.json"),
            r#"[
                {"token": "c_top", "sensor_token": "lidar_top",
                 "rotation": [1.0, 0.0, 0.0, 0.0], "translation": [0.9, 0.0, 1.8]},
                {"token": "c_left", "sensor_token": "lidar_left",
                 "rotation": [1.0, 0.0, 0.0, 0.0], "translation": [1.5, 0.6, 1.6]},
                {"token": "c_cam", "sensor_token": "cam_front",
                 "rotation": [1.0, 0.0, 0.0, 0.0], "translation": [1.7, 0.0, 1.5]}
            ]"#,
        )
        .unwrap();
        if with_sensors {
            fs::write(
                dir.join("sensor.json"),
                r#"[
                    {"token": "lidar_top", "channel": "LIDAR_TOP", "modality": "lidar"},
                    {"token": "lidar_left", "channel": "LIDAR_FRONT_LEFT", "modality": "lidar"},
                    {"token": "cam_front", "channel": "CAM_FRONT", "modality": "camera"}
                ]"#,
            )
            .unwrap();
        }
    }

    #[test]
    fn test_json_catalog_derives_channels_from_nuscenes_tables() {
        let dir = TempDir::new().unwrap();
        write_nuscenes_tables(dir.path(), true);

        let catalog = JsonCatalog::load(dir.path()).unwrap();
        let sample = catalog.sample("s0").unwrap();
        assert_eq!(sample.data.len(), 3);
        assert_eq!(sample.data["LIDAR_TOP"], "sd_top");
        assert_eq!(sample.data["LIDAR_FRONT_LEFT"], "sd_left");
        assert_eq!(sample.data["CAM_FRONT"], "sd_cam");

        let frame = catalog.sample_data(&sample.data["LIDAR_TOP"]).unwrap();
        assert_eq!(frame.filename, "samples/LIDAR_TOP/a.bin");
        let calibration = catalog.calibrated_sensor(&frame.calibrated_sensor_token).unwrap();
        assert_eq!(calibration.translation, [0.9, 0.0, 1.8]);
    }

    #[test]
    fn test_json_catalog_rejects_sample_without_sensor_data() {
        let dir = TempDir::new().unwrap();
        write_nuscenes_tables(dir.path(), false);

        match JsonCatalog::load(dir.path()) {
            Err(CatalogError::MalformedRecord { table, token, .. }) => {
                assert_eq!(table, "sample");
                assert_eq!(token, "s0");
            }
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_json_catalog_missing_table() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            JsonCatalog::load(dir.path()),
            Err(CatalogError::Io { .. })
        ));
    }
}
