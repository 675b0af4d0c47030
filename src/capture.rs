//! Capture recorder.
//!
//! [`Recorder`] is a caller of the [`ConnectionManager`]: it selects a
//! device, then saves view hierarchies as `<name>.json` and screenshots as
//! `<name>.png` under the output directory.
//!
//! When the agent cannot deliver a screenshot, a recorder with a
//! [`ScreenCapturer`] captures the screen without it. [`AdbScreenCapturer`]
//! tries `adb exec-out screencap -p` first, then `adb shell screencap`
//! followed by `adb pull`.
//!
//! # Example
//!
//! ```ignore
//! use device_agent_client::{Config, capture::Recorder};
//!
//! let mut recorder = Recorder::with_adb(Config::new().with_output_dir("out"));
//! recorder.set_device("emulator-5554").await;
//! let json = recorder.save_view_hierarchy("home").await?;
//! let png = recorder.save_screenshot("home").await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::{Cursor, Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use image::ImageFormat;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::manager::{AdbForwarder, ConnectionManager, PortForwarder};
use crate::protocol::Screenshot;

/// Directory on the device that `adb shell screencap` writes into.
pub const DEFAULT_DEVICE_DIR: &str = "/sdcard";

// ============================================================================
// ScreenCapturer
// ============================================================================

/// Captures the screen without going through the agent.
#[async_trait]
pub trait ScreenCapturer: Send + Sync {
    /// Writes a PNG screenshot of `device_id` to `dest`.
    ///
    /// An empty `device_id` targets the only attached device.
    async fn capture_to(&self, device_id: &str, dest: &Path) -> Result<()>;
}

// ============================================================================
// AdbScreenCapturer
// ============================================================================

/// [`ScreenCapturer`] backed by `adb screencap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbScreenCapturer {
    adb_path: PathBuf,
    device_dir: String,
}

impl AdbScreenCapturer {
    /// Creates a capturer using the given `adb` executable.
    #[must_use]
    pub fn new(adb_path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: adb_path.into(),
            device_dir: DEFAULT_DEVICE_DIR.to_string(),
        }
    }

    /// Creates a capturer from the `adb_path` setting.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.adb_path.clone())
    }

    /// Sets the device directory used by the `shell screencap` path.
    #[must_use]
    pub fn with_device_dir(mut self, dir: impl Into<String>) -> Self {
        self.device_dir = dir.into();
        self
    }

    /// `[-s <id>] exec-out screencap -p`
    #[must_use]
    pub fn exec_out_args(&self, device_id: &str) -> Vec<String> {
        let mut args = device_args(device_id);
        args.extend(["exec-out", "screencap", "-p"].map(String::from));
        args
    }

    /// `[-s <id>] shell screencap -p <remote>`
    #[must_use]
    pub fn shell_args(&self, device_id: &str, remote: &str) -> Vec<String> {
        let mut args = device_args(device_id);
        args.extend(["shell", "screencap", "-p", remote].map(String::from));
        args
    }

    /// `[-s <id>] pull <remote> <dest>`
    #[must_use]
    pub fn pull_args(&self, device_id: &str, remote: &str, dest: &Path) -> Vec<String> {
        let mut args = device_args(device_id);
        args.push("pull".to_string());
        args.push(remote.to_string());
        args.push(dest.display().to_string());
        args
    }

    /// Runs `adb` and returns its stdout.
    async fn run(&self, args: &[String]) -> Result<Vec<u8>> {
        debug!(adb = %self.adb_path.display(), ?args, "Running screen capture");

        let output = Command::new(&self.adb_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::capture(format!("failed to run {}: {e}", self.adb_path.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::capture(format!(
                "{} {} exited with {}: {}",
                self.adb_path.display(),
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

fn device_args(device_id: &str) -> Vec<String> {
    if device_id.is_empty() {
        Vec::new()
    } else {
        vec!["-s".to_string(), device_id.to_string()]
    }
}

#[async_trait]
impl ScreenCapturer for AdbScreenCapturer {
    async fn capture_to(&self, device_id: &str, dest: &Path) -> Result<()> {
        match self.run(&self.exec_out_args(device_id)).await {
            Ok(stdout) if !stdout.is_empty() => {
                tokio::fs::write(dest, stdout).await?;
                return Ok(());
            }
            Ok(_) => debug!("exec-out screencap produced no output"),
            Err(e) => debug!(error = %e, "exec-out screencap failed"),
        }

        let file_name = dest
            .file_name()
            .map_or_else(|| "screencap.png".into(), |name| name.to_string_lossy());
        let remote = format!("{}/{file_name}", self.device_dir);

        self.run(&self.shell_args(device_id, &remote)).await?;
        self.run(&self.pull_args(device_id, &remote, dest)).await?;
        Ok(())
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Saves agent captures to disk.
pub struct Recorder {
    manager: ConnectionManager,
    forwarder: Arc<dyn PortForwarder>,
    fallback: Option<Arc<dyn ScreenCapturer>>,
    output_dir: PathBuf,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("manager", &self.manager)
            .field("output_dir", &self.output_dir)
            .field("fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Creates a recorder without a screenshot fallback; the manager shares
    /// `forwarder`.
    #[must_use]
    pub fn new(config: Config, forwarder: Arc<dyn PortForwarder>) -> Self {
        let output_dir = config.output_dir.clone();
        let manager = ConnectionManager::new(config, Arc::clone(&forwarder));
        Self {
            manager,
            forwarder,
            fallback: None,
            output_dir,
        }
    }

    /// Creates a recorder that forwards ports with `adb` and falls back to
    /// `adb screencap` for screenshots.
    #[must_use]
    pub fn with_adb(config: Config) -> Self {
        let forwarder = Arc::new(AdbForwarder::from_config(&config));
        let capturer = Arc::new(AdbScreenCapturer::from_config(&config));
        Self::new(config, forwarder).with_fallback(capturer)
    }

    /// Sets the capturer used when the agent screenshot fails.
    #[must_use]
    pub fn with_fallback(mut self, capturer: Arc<dyn ScreenCapturer>) -> Self {
        self.fallback = Some(capturer);
        self
    }

    /// Returns the connection manager.
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Returns the connection manager mutably.
    #[inline]
    pub fn manager_mut(&mut self) -> &mut ConnectionManager {
        &mut self.manager
    }

    /// Returns the directory artifacts are written to.
    #[inline]
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Selects a device and connects to its agent.
    ///
    /// Forwards the configured local port to the device, points the manager
    /// at it and records the device id. A failed forward is logged; the
    /// connection is still attempted in case a mapping already exists.
    /// Returns whether the connection came up.
    pub async fn set_device(&mut self, device_id: impl Into<String>) -> bool {
        let device_id = device_id.into();
        let local_port = self.manager.config().local_port;

        if let Err(e) = self.forwarder.forward(&device_id, local_port).await {
            warn!(%device_id, local_port, error = %e, "Port forward failed");
        }

        let address = self.manager.config().ws_url();
        let connected = self.manager.change_address(address).await;
        self.manager.set_device_id(device_id);
        connected
    }

    /// Fetches the view hierarchy and writes `<name>.json`.
    ///
    /// The file holds `{"width", "height", "views"}`, pretty-printed, with
    /// each view's keys in the order the agent sent them.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the agent stays unreachable
    /// - Any error from [`ConnectionManager::get_view_hierarchy`]
    /// - [`Error::Io`] if the file cannot be written
    pub async fn save_view_hierarchy(&mut self, name: &str) -> Result<PathBuf> {
        let path = self.artifact_path(name, "json")?;
        self.connect().await?;

        let hierarchy = self.manager.get_view_hierarchy().await?;
        let json = serde_json::to_string_pretty(&hierarchy)?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&path, json).await?;

        info!(path = %path.display(), views = hierarchy.views.len(), "View hierarchy saved");
        Ok(path)
    }

    /// Captures the screen and writes `<name>.png`.
    ///
    /// PNG data is written byte-for-byte; any other format is re-encoded.
    /// If the agent is unreachable, times out or sends an unusable reply and
    /// a fallback is set, the screen is captured with the fallback instead.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the agent stays unreachable and there is
    ///   no fallback
    /// - Any error from [`ConnectionManager::get_screenshot`]
    /// - [`Error::Capture`] if the fallback ran and failed
    /// - [`Error::Io`] if the file cannot be written
    pub async fn save_screenshot(&mut self, name: &str) -> Result<PathBuf> {
        let path = self.artifact_path(name, "png")?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        match self.agent_screenshot().await {
            Ok(png) => tokio::fs::write(&path, png).await?,
            Err(e) if e.is_recoverable() || e.is_protocol_error() => {
                let Some(capturer) = self.fallback.clone() else {
                    return Err(e);
                };
                warn!(error = %e, "Agent screenshot failed, capturing without agent");
                self.fallback_screenshot(capturer.as_ref(), &path).await?;
            }
            Err(e) => return Err(e),
        }

        info!(path = %path.display(), "Screenshot saved");
        Ok(path)
    }

    async fn agent_screenshot(&mut self) -> Result<Vec<u8>> {
        self.connect().await?;
        let screenshot = self.manager.get_screenshot().await?;
        png_bytes(screenshot)
    }

    /// Runs `capturer` into `path` and checks the result is an image.
    async fn fallback_screenshot(&self, capturer: &dyn ScreenCapturer, path: &Path) -> Result<()> {
        capturer
            .capture_to(&self.manager.target().device_id, path)
            .await?;

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::capture(format!("no screenshot at {}: {e}", path.display()))
        })?;
        let png = match Screenshot::from_bytes(bytes).and_then(png_bytes) {
            Ok(png) => png,
            Err(e) => {
                let _ = tokio::fs::remove_file(path).await;
                return Err(Error::capture(e.to_string()));
            }
        };
        tokio::fs::write(path, png).await?;
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        if self.manager.ensure_connected_default().await {
            Ok(())
        } else {
            Err(Error::connection(format!(
                "agent at {} unreachable after {} attempts",
                self.manager.target().address,
                self.manager.config().max_retries
            )))
        }
    }

    /// `<output_dir>/<name>.<extension>`; `name` must be a plain file stem.
    fn artifact_path(&self, name: &str, extension: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != "..";
        if !plain {
            return Err(Error::Io(IoError::new(
                ErrorKind::InvalidInput,
                format!("invalid artifact name: {name:?}"),
            )));
        }
        Ok(self.output_dir.join(format!("{name}.{extension}")))
    }
}

/// PNG bytes for `screenshot`, re-encoding in memory if it is another format.
fn png_bytes(screenshot: Screenshot) -> Result<Vec<u8>> {
    if matches!(image::guess_format(screenshot.as_bytes()), Ok(ImageFormat::Png)) {
        return Ok(screenshot.into_bytes());
    }

    let mut bytes = Vec::new();
    screenshot
        .image()
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| Error::protocol(format!("Failed to encode PNG: {e}")))?;
    Ok(bytes)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use image::{DynamicImage, Rgb, RgbImage};
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use crate::protocol::envelope::{sample_png, screenshot_reply};
    use crate::transport::mock::{MockAgent, Reply};

    #[derive(Default)]
    struct RecordingForwarder {
        calls: Mutex<Vec<(String, u16)>>,
    }

    #[async_trait]
    impl PortForwarder for RecordingForwarder {
        async fn forward(&self, device_id: &str, local_port: u16) -> Result<()> {
            self.calls.lock().push((device_id.to_string(), local_port));
            Ok(())
        }
    }

    /// Writes fixed bytes and records the device ids it was asked for.
    struct FixedCapturer {
        bytes: Vec<u8>,
        calls: Mutex<Vec<String>>,
    }

    impl FixedCapturer {
        fn new(bytes: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                bytes,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ScreenCapturer for FixedCapturer {
        async fn capture_to(&self, device_id: &str, dest: &Path) -> Result<()> {
            self.calls.lock().push(device_id.to_string());
            tokio::fs::write(dest, &self.bytes).await?;
            Ok(())
        }
    }

    fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let pixels = RgbImage::from_pixel(width, height, Rgb([10, 120, 240]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(pixels)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .expect("encode jpeg");
        bytes
    }

    async fn device_agent() -> MockAgent {
        let png = sample_png(2, 3);
        MockAgent::spawn(move |text| match text {
            "view_hierarchy" => Reply::Text(
                r#"{"message":"[{\"text\":\"a\",\"id\":1}]","width":1080,"height":1920}"#.into(),
            ),
            "screenshot" => Reply::Text(screenshot_reply(&png)),
            _ => Reply::Silent,
        })
        .await
    }

    fn recorder_for(
        port: u16,
        dir: &Path,
        forwarder: &Arc<RecordingForwarder>,
    ) -> Recorder {
        let config = Config::new()
            .with_device_id("serial-1")
            .with_local_port(port)
            .with_output_dir(dir)
            .with_max_retries(1)
            .with_retry_interval(Duration::from_millis(10));
        Recorder::new(config, Arc::clone(forwarder) as Arc<dyn PortForwarder>)
    }

    #[tokio::test]
    async fn test_set_device() {
        let agent = device_agent().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut recorder = recorder_for(agent.port(), dir.path(), &forwarder);

        assert!(recorder.set_device("serial-9").await);

        assert_eq!(
            *forwarder.calls.lock(),
            vec![("serial-9".to_string(), agent.port())]
        );
        assert_eq!(recorder.manager().target().device_id, "serial-9");
        assert!(recorder.manager().is_connected());
    }

    #[tokio::test]
    async fn test_save_view_hierarchy() {
        let agent = device_agent().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut recorder = recorder_for(agent.port(), dir.path(), &forwarder);

        let path = recorder.save_view_hierarchy("home").await.expect("save");
        assert_eq!(path, dir.path().join("home.json"));

        let text = std::fs::read_to_string(&path).expect("read");
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(
            value,
            json!({"width": 1080, "height": 1920, "views": [{"text": "a", "id": 1}]})
        );
        assert!(text.find("\"text\"") < text.find("\"id\""));
    }

    #[tokio::test]
    async fn test_save_screenshot() {
        let agent = device_agent().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let capturer = FixedCapturer::new(sample_png(9, 9));
        let mut recorder = recorder_for(agent.port(), dir.path(), &forwarder)
            .with_fallback(Arc::clone(&capturer) as Arc<dyn ScreenCapturer>);

        let path = recorder.save_screenshot("home").await.expect("save");
        assert_eq!(path, dir.path().join("home.png"));
        assert_eq!(std::fs::read(&path).expect("read"), sample_png(2, 3));
        assert!(capturer.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_save_screenshot_reencodes_jpeg() {
        let jpeg = sample_jpeg(4, 2);
        let agent = MockAgent::spawn(move |_| Reply::Text(screenshot_reply(&jpeg))).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut recorder = recorder_for(agent.port(), dir.path(), &forwarder);

        let path = recorder.save_screenshot("home").await.expect("save");

        let bytes = std::fs::read(&path).expect("read");
        assert_eq!(image::guess_format(&bytes).expect("format"), ImageFormat::Png);
        let saved = image::load_from_memory(&bytes).expect("decode");
        assert_eq!((saved.width(), saved.height()), (4, 2));
    }

    #[tokio::test]
    async fn test_unreachable_agent() {
        let agent = MockAgent::rejecting().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut recorder = recorder_for(agent.port(), dir.path(), &forwarder);

        let err = recorder.save_screenshot("home").await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(!dir.path().join("home.png").exists());
    }

    #[tokio::test]
    async fn test_unreachable_agent_uses_fallback() {
        let agent = MockAgent::rejecting().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let capturer = FixedCapturer::new(sample_png(5, 5));
        let mut recorder = recorder_for(agent.port(), dir.path(), &forwarder)
            .with_fallback(Arc::clone(&capturer) as Arc<dyn ScreenCapturer>);

        let path = recorder.save_screenshot("home").await.expect("fallback");

        assert_eq!(std::fs::read(&path).expect("read"), sample_png(5, 5));
        assert_eq!(*capturer.calls.lock(), vec!["serial-1".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_reply_uses_fallback() {
        let agent = MockAgent::spawn(|_| Reply::Text(r#"{"data":"***"}"#.into())).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let capturer = FixedCapturer::new(sample_jpeg(3, 3));
        let mut recorder = recorder_for(agent.port(), dir.path(), &forwarder)
            .with_fallback(Arc::clone(&capturer) as Arc<dyn ScreenCapturer>);

        let path = recorder.save_screenshot("home").await.expect("fallback");

        let bytes = std::fs::read(&path).expect("read");
        assert_eq!(image::guess_format(&bytes).expect("format"), ImageFormat::Png);
        assert_eq!(capturer.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_output_not_an_image() {
        let agent = MockAgent::rejecting().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let capturer = FixedCapturer::new(b"error: no devices".to_vec());
        let mut recorder = recorder_for(agent.port(), dir.path(), &forwarder)
            .with_fallback(capturer as Arc<dyn ScreenCapturer>);

        let err = recorder.save_screenshot("home").await.unwrap_err();
        assert!(matches!(err, Error::Capture { .. }));
        assert!(!dir.path().join("home.png").exists());
    }

    #[tokio::test]
    async fn test_rejects_path_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut recorder = recorder_for(1, dir.path(), &forwarder);

        for name in ["", "..", "a/b", "a\\b"] {
            let err = recorder.save_view_hierarchy(name).await.unwrap_err();
            assert!(matches!(err, Error::Io(_)), "{name:?}");
        }
    }

    #[test]
    fn test_adb_capture_args() {
        let capturer = AdbScreenCapturer::new("adb").with_device_dir("/data/local/tmp");
        assert_eq!(capturer.exec_out_args(""), ["exec-out", "screencap", "-p"]);
        assert_eq!(
            capturer.shell_args("emulator-5554", "/data/local/tmp/home.png"),
            ["-s", "emulator-5554", "shell", "screencap", "-p", "/data/local/tmp/home.png"]
        );
        assert_eq!(
            capturer.pull_args("", "/sdcard/home.png", Path::new("out/home.png")),
            ["pull", "/sdcard/home.png", "out/home.png"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_adb_capture_exit_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("home.png");

        let err = AdbScreenCapturer::new("false")
            .capture_to("d", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Capture { .. }));

        // Empty exec-out output falls through to shell + pull.
        assert!(AdbScreenCapturer::new("true").capture_to("d", &dest).await.is_ok());
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_adb_fallback_that_writes_nothing() {
        let agent = MockAgent::rejecting().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut recorder = recorder_for(agent.port(), dir.path(), &forwarder)
            .with_fallback(Arc::new(AdbScreenCapturer::new("true")));

        let err = recorder.save_screenshot("home").await.unwrap_err();
        assert!(matches!(err, Error::Capture { .. }));
    }
}
