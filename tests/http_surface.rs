use anyhow::{anyhow, Result};
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use catwatch::actuator::PwmRecorder;
use catwatch::api::{ApiConfig, ApiHandle, ApiServer};
use catwatch::camera::CameraProbe;
use catwatch::detect::ClassifierScript;
use catwatch::{
    ActuatorController, AlertTone, CameraConfig, Classifier, ControlState, FrameSource,
    PipelineContext, PipelineSettings, RecordingDriver, ScriptedClassifier, SharedCamera,
    SyntheticCamera,
};

struct TestApi {
    control: Arc<ControlState>,
    camera: CameraProbe,
    script: ClassifierScript,
    _pwm: PwmRecorder,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new() -> Result<Self> {
        let control = Arc::new(ControlState::new());
        let mut source = SyntheticCamera::new(CameraConfig {
            width: 64,
            height: 48,
            ..CameraConfig::default()
        });
        source.connect()?;
        let camera = source.probe();
        let (classifier, script) = ScriptedClassifier::new();
        let classifier: Box<dyn Classifier> = Box::new(classifier);
        let (driver, pwm) = RecordingDriver::new("stub://buzzer");
        let actuator = ActuatorController::new(Box::new(driver), control.clone(), 0.5)?;

        let ctx = PipelineContext {
            control: control.clone(),
            camera: Arc::new(SharedCamera::new(
                Box::new(source),
                Duration::from_millis(500),
            )),
            classifier: Arc::new(Mutex::new(classifier)),
            actuator: Arc::new(actuator),
            settings: Arc::new(PipelineSettings {
                alert: AlertTone {
                    duration: Duration::from_millis(5),
                    frequency_hz: 1000.0,
                },
                gate_interval: Duration::from_millis(20),
                frame_width: 64,
                frame_height: 48,
                ..PipelineSettings::default()
            }),
        };
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        };
        let api_handle = ApiServer::new(api_config, ctx).spawn()?;

        Ok(Self {
            control,
            camera,
            script,
            _pwm: pwm,
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(self.handle().addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        Ok(stream)
    }

    fn request(&self, raw: &str) -> Result<(String, String)> {
        let mut stream = self.connect()?;
        stream.write_all(raw.as_bytes())?;
        read_response(&mut stream)
    }

    fn wait_for_viewers(&self, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if self.handle().viewers() == expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

fn post_form(body: &str) -> String {
    format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

/// Read from a stream until `needle` has been seen `times` times.
fn read_until(stream: &mut TcpStream, needle: &[u8], times: usize) -> Result<Vec<u8>> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while count(&data, needle) < times {
        if Instant::now() > deadline {
            return Err(anyhow!("timed out waiting for stream data"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("stream closed early"));
        }
        data.extend_from_slice(&buf[..n]);
    }
    Ok(data)
}

#[test]
fn toggles_redirect_and_flip_state() -> Result<()> {
    let api = TestApi::new()?;

    let (headers, _) = api.request(&post_form("toggle_pir=1"))?;
    assert!(headers.contains("303 See Other"));
    assert!(headers.contains("Location: /"));
    assert!(!api.control.sensor_enabled());

    let (headers, _) = api.request(&post_form("toggle_buzzer=1"))?;
    assert!(headers.contains("303 See Other"));
    assert!(!api.control.actuator_enabled());

    // toggle_pir wins when both are submitted.
    api.request(&post_form("toggle_pir=1&toggle_buzzer=1"))?;
    assert!(api.control.sensor_enabled());
    assert!(!api.control.actuator_enabled());

    // Unknown fields are a no-op.
    let (headers, _) = api.request(&post_form("something=else"))?;
    assert!(headers.contains("303 See Other"));
    assert!(api.control.sensor_enabled());

    Ok(())
}

#[test]
fn index_reflects_toggle_state() -> Result<()> {
    let api = TestApi::new()?;

    let (headers, body) = api.request("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("text/html"));
    assert!(body.contains("Disable PIR Sensor"));
    assert!(body.contains("/motion_status"));

    api.control.set_sensor_enabled(false);
    let (_, body) = api.request("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(body.contains("Enable PIR Sensor"));

    Ok(())
}

#[test]
fn motion_status_reports_flag() -> Result<()> {
    let api = TestApi::new()?;

    let (headers, body) = api.request("GET /motion_status HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["motion"], false);

    api.control.set_motion_active(true);
    let (_, body) = api.request("GET /motion_status HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["motion"], true);

    Ok(())
}

#[test]
fn health_reports_flags_and_viewers() -> Result<()> {
    let api = TestApi::new()?;

    let (headers, body) = api.request("GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["status"], "ok");
    assert_eq!(value["sensor_enabled"], true);
    assert_eq!(value["actuator_enabled"], true);
    assert_eq!(value["motion"], false);
    assert_eq!(value["viewers"], 0);

    Ok(())
}

#[test]
fn unknown_routes_and_methods_are_rejected() -> Result<()> {
    let api = TestApi::new()?;

    let (headers, body) = api.request("GET /nope HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    assert!(headers.contains("404 Not Found"));
    assert!(body.contains(r#""error":"not_found""#));

    let (headers, _) =
        api.request("POST /motion_status HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n")?;
    assert!(headers.contains("405 Method Not Allowed"));

    Ok(())
}

#[test]
fn gated_stream_never_captures() -> Result<()> {
    let api = TestApi::new()?;

    let mut stream = api.connect()?;
    stream.write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let head = read_until(&mut stream, b"\r\n\r\n", 1)?;
    let head = String::from_utf8_lossy(&head);
    assert!(head.contains("200 OK"));
    assert!(head.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(api.wait_for_viewers(1));

    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(api.camera.captures(), 0);
    assert_eq!(api.script.calls(), 0);

    drop(stream);
    assert!(api.wait_for_viewers(0));
    Ok(())
}

#[test]
fn open_gate_streams_jpeg_parts() -> Result<()> {
    let api = TestApi::new()?;
    api.control.set_sensor_enabled(false);

    let mut stream = api.connect()?;
    stream.write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let data = read_until(&mut stream, b"--frame\r\n", 3)?;

    assert!(count(&data, b"Content-Type: image/jpeg\r\n") >= 2);
    assert!(count(&data, b"\r\n\r\n\xFF\xD8") >= 2);
    assert!(api.camera.captures() >= 2);
    Ok(())
}

/// Read everything the server sends during `window`.
fn read_for(stream: &mut TcpStream, window: Duration) -> Result<Vec<u8>> {
    stream.set_read_timeout(Some(Duration::from_millis(20)))?;
    let deadline = Instant::now() + window;
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    while Instant::now() < deadline {
        match stream.read(&mut buf) {
            Ok(0) => return Err(anyhow!("stream closed early")),
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(data)
}

#[test]
fn failing_camera_streams_placeholders_at_gate_pace() -> Result<()> {
    let api = TestApi::new()?;
    api.control.set_sensor_enabled(false);
    api.camera.fail_next(1_000_000);

    let mut stream = api.connect()?;
    stream.write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let data = read_for(&mut stream, Duration::from_millis(500))?;

    // 20 ms gate interval: roughly 20 placeholders in half a second.
    let parts = count(&data, b"--frame\r\n");
    assert!(parts >= 1, "no placeholder frames arrived");
    assert!(parts <= 40, "{} placeholder frames in 500 ms", parts);
    assert_eq!(api.camera.captures(), 0);
    Ok(())
}

#[test]
fn disconnect_frees_camera_for_next_viewer() -> Result<()> {
    let api = TestApi::new()?;
    api.control.set_sensor_enabled(false);

    let mut first = api.connect()?;
    first.write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    read_until(&mut first, b"--frame\r\n", 1)?;
    drop(first);
    assert!(api.wait_for_viewers(0));

    let started = Instant::now();
    let mut second = api.connect()?;
    second.write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    read_until(&mut second, b"--frame\r\n", 2)?;
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}
