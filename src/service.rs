//! Daemon wiring: open devices, start the monitor, serve HTTP.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::actuator::{open_actuator, ActuatorController, PwmDriver};
use crate::api::{ApiConfig, ApiHandle, ApiServer};
use crate::camera::{open_camera, FrameSource, SharedCamera};
use crate::config::ServiceConfig;
use crate::control::ControlState;
use crate::detect::{open_classifier, Classifier};
use crate::motion::MotionMonitor;
use crate::pipeline::PipelineContext;
use crate::sensor::{open_sensor, MotionSensor};

/// Opened hardware (or stand-ins), ready to be shared.
pub struct Devices {
    pub camera: Box<dyn FrameSource>,
    pub sensor: Box<dyn MotionSensor>,
    pub actuator: Box<dyn PwmDriver>,
    pub classifier: Box<dyn Classifier>,
}

impl Devices {
    /// Open every device named in `cfg`. Any failure is a startup failure.
    pub fn open(cfg: &ServiceConfig) -> Result<Self> {
        let mut camera = open_camera(&cfg.camera)
            .with_context(|| format!("camera {} unavailable", cfg.camera.device))?;
        camera
            .connect()
            .with_context(|| format!("camera {} failed to connect", cfg.camera.device))?;

        let sensor = open_sensor(&cfg.sensor.device)
            .with_context(|| format!("motion sensor {} unavailable", cfg.sensor.device))?;
        let actuator = open_actuator(&cfg.actuator.device)
            .with_context(|| format!("actuator {} unavailable", cfg.actuator.device))?;

        let mut classifier = open_classifier(&cfg.classifier)
            .with_context(|| format!("classifier '{}' unavailable", cfg.classifier.backend))?;
        classifier
            .warm_up()
            .with_context(|| format!("classifier '{}' failed warm-up", classifier.name()))?;

        log::info!(
            "devices ready: camera={} sensor={} actuator={} classifier={}",
            camera.name(),
            sensor.name(),
            actuator.name(),
            classifier.name()
        );
        Ok(Self {
            camera,
            sensor,
            actuator,
            classifier,
        })
    }
}

pub struct Service;

impl Service {
    /// Start the monitor and the HTTP surface over already-opened devices.
    pub fn start(cfg: &ServiceConfig, devices: Devices) -> Result<ServiceHandle> {
        let control = Arc::new(ControlState::new());
        let actuator = Arc::new(
            ActuatorController::new(devices.actuator, control.clone(), cfg.actuator.duty_cycle)
                .context("failed to silence actuator at startup")?,
        );
        let camera = Arc::new(SharedCamera::new(devices.camera, cfg.camera_lock_timeout));

        let monitor = MotionMonitor::spawn(devices.sensor, control.clone(), cfg.sensor.motion)?;

        let ctx = PipelineContext {
            control: control.clone(),
            camera,
            classifier: Arc::new(Mutex::new(devices.classifier)),
            actuator: actuator.clone(),
            settings: Arc::new(cfg.pipeline_settings()),
        };
        let api_config = ApiConfig {
            addr: cfg.api_addr.clone(),
        };
        let api = match ApiServer::new(api_config, ctx).spawn() {
            Ok(api) => api,
            Err(err) => {
                if let Err(stop_err) = monitor.stop() {
                    log::error!("motion monitor did not stop cleanly: {:#}", stop_err);
                }
                return Err(err);
            }
        };
        log::info!("catwatch listening on {}", api.addr);

        Ok(ServiceHandle {
            control,
            actuator,
            api,
            monitor,
        })
    }
}

pub struct ServiceHandle {
    control: Arc<ControlState>,
    actuator: Arc<ActuatorController>,
    api: ApiHandle,
    monitor: MotionMonitor,
}

impl ServiceHandle {
    pub fn addr(&self) -> SocketAddr {
        self.api.addr
    }

    pub fn control(&self) -> &Arc<ControlState> {
        &self.control
    }

    pub fn viewers(&self) -> usize {
        self.api.viewers()
    }

    /// Stop serving, stop the monitor and leave the actuator silent.
    pub fn stop(self) -> Result<()> {
        log::info!("stopping http surface");
        let api_result = self.api.stop();
        log::info!("stopping motion monitor");
        let monitor_result = self.monitor.stop();
        self.actuator.silence()?;
        api_result?;
        monitor_result?;
        log::info!("catwatch stopped");
        Ok(())
    }
}
