use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actuator::AlertTone;
use crate::camera::CameraConfig;
use crate::detect::ClassifierConfig;
use crate::motion::MotionSettings;
use crate::pipeline::PipelineSettings;

const DEFAULT_API_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_TARGET_CLASS: &str = "cat";
const DEFAULT_CAMERA: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_LOCK_TIMEOUT_MS: u64 = 2000;
const DEFAULT_SENSOR: &str = "stub://pir";
const DEFAULT_COOLDOWN_SECS: u64 = 10;
const DEFAULT_IDLE_INTERVAL_MS: u64 = 500;
const DEFAULT_ACTUATOR: &str = "stub://buzzer";
const DEFAULT_ALERT_DURATION_MS: u64 = 500;
const DEFAULT_ALERT_FREQUENCY_HZ: f64 = 1000.0;
const DEFAULT_DUTY_CYCLE: f64 = 0.5;
const DEFAULT_GATE_INTERVAL_MS: u64 = 100;
const DEFAULT_DEGRADED_AFTER: u32 = 3;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_CLASSIFIER: &str = "stub";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_IOU: f32 = 0.45;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ServiceConfigFile {
    target_class: Option<String>,
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    sensor: Option<SensorConfigFile>,
    actuator: Option<ActuatorConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    classifier: Option<ClassifierConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    lock_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SensorConfigFile {
    device: Option<String>,
    cooldown_secs: Option<u64>,
    idle_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ActuatorConfigFile {
    device: Option<String>,
    alert_duration_ms: Option<u64>,
    alert_frequency_hz: Option<f64>,
    duty_cycle: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    gate_interval_ms: Option<u64>,
    degraded_after: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ClassifierConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels: Option<Vec<String>>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence: Option<f32>,
    iou: Option<f32>,
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub api_addr: String,
    pub target_class: String,
    pub camera: CameraConfig,
    pub camera_lock_timeout: Duration,
    pub sensor: SensorSettings,
    pub actuator: ActuatorSettings,
    pub pipeline: PipelineTuning,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorSettings {
    pub device: String,
    pub motion: MotionSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorSettings {
    pub device: String,
    pub tone: AlertTone,
    pub duty_cycle: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineTuning {
    pub gate_interval: Duration,
    pub degraded_after: u32,
    pub jpeg_quality: u8,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_file(ServiceConfigFile::default())
    }
}

impl ServiceConfig {
    /// Defaults, then the file named by `CATWATCH_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CATWATCH_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ServiceConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let sensor = file.sensor.unwrap_or_default();
        let actuator = file.actuator.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        let classifier = file.classifier.unwrap_or_default();

        Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            target_class: file
                .target_class
                .unwrap_or_else(|| DEFAULT_TARGET_CLASS.to_string()),
            camera: CameraConfig {
                device: camera.device.unwrap_or_else(|| DEFAULT_CAMERA.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            camera_lock_timeout: Duration::from_millis(
                camera
                    .lock_timeout_ms
                    .unwrap_or(DEFAULT_CAMERA_LOCK_TIMEOUT_MS),
            ),
            sensor: SensorSettings {
                device: sensor.device.unwrap_or_else(|| DEFAULT_SENSOR.to_string()),
                motion: MotionSettings {
                    idle_interval: Duration::from_millis(
                        sensor.idle_interval_ms.unwrap_or(DEFAULT_IDLE_INTERVAL_MS),
                    ),
                    cooldown: Duration::from_secs(
                        sensor.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS),
                    ),
                },
            },
            actuator: ActuatorSettings {
                device: actuator
                    .device
                    .unwrap_or_else(|| DEFAULT_ACTUATOR.to_string()),
                tone: AlertTone {
                    duration: Duration::from_millis(
                        actuator
                            .alert_duration_ms
                            .unwrap_or(DEFAULT_ALERT_DURATION_MS),
                    ),
                    frequency_hz: actuator
                        .alert_frequency_hz
                        .unwrap_or(DEFAULT_ALERT_FREQUENCY_HZ),
                },
                duty_cycle: actuator.duty_cycle.unwrap_or(DEFAULT_DUTY_CYCLE),
            },
            pipeline: PipelineTuning {
                gate_interval: Duration::from_millis(
                    pipeline.gate_interval_ms.unwrap_or(DEFAULT_GATE_INTERVAL_MS),
                ),
                degraded_after: pipeline.degraded_after.unwrap_or(DEFAULT_DEGRADED_AFTER),
                jpeg_quality: pipeline.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            classifier: ClassifierConfig {
                backend: classifier
                    .backend
                    .unwrap_or_else(|| DEFAULT_CLASSIFIER.to_string()),
                model_path: classifier.model_path,
                labels: classifier
                    .labels
                    .unwrap_or_else(|| vec![DEFAULT_TARGET_CLASS.to_string()]),
                input_width: classifier.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: classifier.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
                confidence: classifier.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                iou: classifier.iou.unwrap_or(DEFAULT_IOU),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("CATWATCH_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(class) = env_value("CATWATCH_TARGET_CLASS") {
            self.target_class = class;
        }
        if let Some(device) = env_value("CATWATCH_CAMERA") {
            self.camera.device = device;
        }
        if let Some(device) = env_value("CATWATCH_SENSOR") {
            self.sensor.device = device;
        }
        if let Some(device) = env_value("CATWATCH_ACTUATOR") {
            self.actuator.device = device;
        }
        if let Some(backend) = env_value("CATWATCH_CLASSIFIER") {
            self.classifier.backend = backend;
        }
        if let Some(model) = env_value("CATWATCH_MODEL") {
            self.classifier.model_path = Some(PathBuf::from(model));
        }
        if let Some(cooldown) = env_value("CATWATCH_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("CATWATCH_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.sensor.motion.cooldown = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.target_class = self.target_class.trim().to_string();
        if self.target_class.is_empty() {
            return Err(anyhow!("target_class must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera.target_fps must be greater than zero"));
        }
        if self.camera_lock_timeout.is_zero() {
            return Err(anyhow!("camera.lock_timeout_ms must be greater than zero"));
        }
        if self.sensor.motion.cooldown.is_zero() {
            return Err(anyhow!("sensor cool-down must be greater than zero"));
        }
        if self.sensor.motion.idle_interval.is_zero() {
            return Err(anyhow!("sensor.idle_interval_ms must be greater than zero"));
        }
        if self.actuator.tone.duration.is_zero() {
            return Err(anyhow!("actuator.alert_duration_ms must be greater than zero"));
        }
        if self.actuator.tone.frequency_hz.is_nan() || self.actuator.tone.frequency_hz <= 0.0 {
            return Err(anyhow!("actuator.alert_frequency_hz must be greater than zero"));
        }
        let duty = self.actuator.duty_cycle;
        if duty.is_nan() || duty <= 0.0 || duty > 1.0 {
            return Err(anyhow!("actuator.duty_cycle must be in (0, 1]"));
        }
        if self.pipeline.gate_interval.is_zero() {
            return Err(anyhow!("pipeline.gate_interval_ms must be greater than zero"));
        }
        if self.pipeline.degraded_after == 0 {
            return Err(anyhow!("pipeline.degraded_after must be greater than zero"));
        }
        if !(1..=100).contains(&self.pipeline.jpeg_quality) {
            return Err(anyhow!("pipeline.jpeg_quality must be within 1..=100"));
        }
        match self.classifier.backend.as_str() {
            "stub" => {}
            "tract" => {
                if self.classifier.model_path.is_none() {
                    return Err(anyhow!("classifier backend 'tract' requires model_path"));
                }
            }
            other => return Err(anyhow!("unknown classifier backend '{}'", other)),
        }
        if self.classifier.labels.is_empty() {
            return Err(anyhow!("classifier.labels must not be empty"));
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            target_class: self.target_class.clone(),
            alert: self.actuator.tone,
            gate_interval: self.pipeline.gate_interval,
            degraded_after: self.pipeline.degraded_after,
            jpeg_quality: self.pipeline.jpeg_quality,
            frame_width: self.camera.width,
            frame_height: self.camera.height,
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
