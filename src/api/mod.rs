//! HTTP control surface and MJPEG stream.
//!
//! A plain `TcpListener` accept loop with one thread per connection. Control
//! endpoints answer and close; `/video_feed` keeps its connection and drives
//! a private `InferencePipeline` until the viewer goes away or the server
//! stops.

mod http;
mod page;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::pipeline::{InferencePipeline, PipelineContext, StepOutcome};
use http::{
    peer_closed, read_request, write_json_response, write_redirect, write_response,
    write_stream_header, write_stream_part, HttpRequest, RequestTooLarge,
};

const BOUNDARY: &str = "frame";
const ACCEPT_POLL: Duration = Duration::from_millis(50);
const STREAM_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    viewers: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Connected `/video_feed` viewers.
    pub fn viewers(&self) -> usize {
        self.viewers.load(Ordering::SeqCst)
    }

    /// Stop accepting, end every viewer loop and wait for them.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    ctx: PipelineContext,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, ctx: PipelineContext) -> Self {
        Self { cfg, ctx }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid api address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("failed to bind {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let viewers = Arc::new(AtomicUsize::new(0));
        let shared = Arc::new(Shared {
            ctx: self.ctx,
            viewers: viewers.clone(),
            shutdown: shutdown.clone(),
        });
        let join = std::thread::Builder::new()
            .name("http-accept".into())
            .spawn(move || {
                if let Err(err) = run_api(listener, shared) {
                    log::error!("http server stopped: {}", err);
                }
            })
            .context("failed to spawn http accept thread")?;

        Ok(ApiHandle {
            addr,
            viewers,
            shutdown,
            join: Some(join),
        })
    }
}

struct Shared {
    ctx: PipelineContext,
    viewers: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

fn run_api(listener: TcpListener, shared: Arc<Shared>) -> Result<()> {
    let mut connections: Vec<JoinHandle<()>> = Vec::new();
    while !shared.shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let shared = shared.clone();
                let spawned = std::thread::Builder::new()
                    .name("http-conn".into())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, peer, &shared) {
                            log::warn!("request from {} rejected: {:#}", peer, err);
                        }
                    });
                match spawned {
                    Ok(handle) => connections.push(handle),
                    Err(err) => log::error!("failed to spawn connection thread: {}", err),
                }
                connections.retain(|handle| !handle.is_finished());
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) => return Err(err.into()),
        }
    }
    for handle in connections {
        if handle.join().is_err() {
            log::error!("connection thread panicked");
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, peer: SocketAddr, shared: &Shared) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            if err.is::<RequestTooLarge>() {
                write_json_response(&mut stream, 413, r#"{"error":"request_too_large"}"#)?;
            }
            return Err(err);
        }
    };

    match (request.path.as_str(), request.method.as_str()) {
        ("/", "GET") => {
            let settings = &shared.ctx.settings;
            let body = page::render_index(
                shared.ctx.control.get(),
                &settings.target_class,
                settings.frame_width,
                settings.frame_height,
            );
            write_response(&mut stream, 200, "text/html; charset=utf-8", body.as_bytes())
        }
        ("/", "POST") => {
            apply_toggles(&request, shared);
            write_redirect(&mut stream, "/")
        }
        ("/motion_status", "GET") => {
            let body = serde_json::to_vec(&MotionStatus {
                motion: shared.ctx.control.motion_active(),
            })?;
            write_response(&mut stream, 200, "application/json", &body)
        }
        ("/health", "GET") => {
            let snapshot = shared.ctx.control.get();
            let body = serde_json::to_vec(&HealthReport {
                status: if shared.ctx.camera.is_healthy() {
                    "ok"
                } else {
                    "degraded"
                },
                sensor_enabled: snapshot.sensor_enabled,
                actuator_enabled: snapshot.actuator_enabled,
                motion: snapshot.motion_active,
                viewers: shared.viewers.load(Ordering::SeqCst),
            })?;
            write_response(&mut stream, 200, "application/json", &body)
        }
        ("/video_feed", "GET") => {
            stream_video(stream, peer, shared);
            Ok(())
        }
        ("/" | "/motion_status" | "/health" | "/video_feed", _) => {
            write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

#[derive(Serialize)]
struct MotionStatus {
    motion: bool,
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    sensor_enabled: bool,
    actuator_enabled: bool,
    motion: bool,
    viewers: usize,
}

fn apply_toggles(request: &HttpRequest, shared: &Shared) {
    let fields = request.form_fields();
    let control = &shared.ctx.control;
    if fields.iter().any(|f| f == "toggle_pir") {
        let enabled = control.toggle_sensor();
        log::info!("motion sensor {}", if enabled { "enabled" } else { "disabled" });
    } else if fields.iter().any(|f| f == "toggle_buzzer") {
        let enabled = control.toggle_actuator();
        log::info!("buzzer {}", if enabled { "enabled" } else { "disabled" });
    }
}

/// Decrements the viewer count when the stream ends on any path.
struct ViewerSlot(Arc<AtomicUsize>);

impl ViewerSlot {
    fn claim(viewers: &Arc<AtomicUsize>) -> Self {
        viewers.fetch_add(1, Ordering::SeqCst);
        Self(viewers.clone())
    }
}

impl Drop for ViewerSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn stream_video(mut stream: TcpStream, peer: SocketAddr, shared: &Shared) {
    let _slot = ViewerSlot::claim(&shared.viewers);
    log::info!("viewer {} connected", peer);

    if let Err(err) = stream
        .set_write_timeout(Some(STREAM_WRITE_TIMEOUT))
        .and_then(|_| write_stream_header(&mut stream, BOUNDARY))
    {
        log::info!("viewer {} disconnected: {}", peer, err);
        return;
    }

    let mut pipeline = InferencePipeline::new(shared.ctx.clone());
    let mut frames: u64 = 0;
    while !shared.shutdown.load(Ordering::SeqCst) {
        match pipeline.step() {
            StepOutcome::Frame(jpeg) => {
                if let Err(err) = write_stream_part(&mut stream, BOUNDARY, &jpeg) {
                    log::info!("viewer {} disconnected after {} frames: {}", peer, frames, err);
                    return;
                }
                frames += 1;
            }
            StepOutcome::Degraded(jpeg) => {
                if let Err(err) = write_stream_part(&mut stream, BOUNDARY, &jpeg) {
                    log::info!("viewer {} disconnected after {} frames: {}", peer, frames, err);
                    return;
                }
                frames += 1;
                // A failing camera is retried at the gate pace, not flat out.
                std::thread::sleep(pipeline.gate_interval());
            }
            StepOutcome::Gated | StepOutcome::Skipped => {
                if peer_closed(&mut stream) {
                    log::info!("viewer {} disconnected after {} frames", peer, frames);
                    return;
                }
                std::thread::sleep(pipeline.gate_interval());
            }
        }
    }
    log::info!("viewer {} closed by shutdown", peer);
}
