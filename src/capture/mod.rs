//! Screen capture backends
//!
//! The rest of the client only needs PNG bytes of the current screen.
//! Grabbing them is delegated to an external command so no platform
//! graphics stack is linked in.

use std::process::Command;

use thiserror::Error;

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Source of full-screen PNG images. Calls may block.
pub trait ScreenCapture: Send + Sync {
    fn capture(&self) -> Result<Vec<u8>, CaptureError>;
}

/// Runs an external grabber (`import`, `screencapture`, `grim`, ...) that
/// writes a PNG to stdout.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    argv: Vec<String>,
}

impl CommandCapture {
    pub fn new(argv: Vec<String>) -> Result<Self, CaptureError> {
        if argv.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(CaptureError::NotConfigured);
        }
        Ok(Self { argv })
    }
}

impl ScreenCapture for CommandCapture {
    fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        let output = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .output()
            .map_err(|e| CaptureError::Spawn(format!("{}: {}", self.argv[0], e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(CaptureError::CommandFailed {
                status: output.status.code(),
                stderr,
            });
        }
        if !output.stdout.starts_with(&PNG_SIGNATURE) {
            return Err(CaptureError::InvalidImage);
        }

        tracing::debug!(bytes = output.stdout.len(), "Captured screen");
        Ok(output.stdout)
    }
}

/// Fixed 1x1 PNG. For demos and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticCapture;

const SYNTHETIC_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x60,
    0x00, 0x02, 0x00, 0x00, 0x05, 0x00, 0x01, 0xe9, 0xfa, 0xdc, 0xd8, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

impl ScreenCapture for SyntheticCapture {
    fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        Ok(SYNTHETIC_PNG.to_vec())
    }
}

/// Capture layer error type.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capture command configured")]
    NotConfigured,
    #[error("failed to run capture command {0}")]
    Spawn(String),
    #[error("capture command exited with {status:?}: {stderr}")]
    CommandFailed { status: Option<i32>, stderr: String },
    #[error("capture command did not produce a PNG image")]
    InvalidImage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_synthetic_capture_is_png() {
        let bytes = SyntheticCapture.capture().unwrap();
        assert!(bytes.starts_with(&PNG_SIGNATURE));
        assert!(bytes.ends_with(&[0xae, 0x42, 0x60, 0x82]));
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(
            CommandCapture::new(Vec::new()),
            Err(CaptureError::NotConfigured)
        ));
        assert!(matches!(
            CommandCapture::new(argv(&[" "])),
            Err(CaptureError::NotConfigured)
        ));
    }

    #[test]
    fn test_missing_program() {
        let capture = CommandCapture::new(argv(&["worklog-no-such-grabber"])).unwrap();
        assert!(matches!(capture.capture(), Err(CaptureError::Spawn(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_output_must_be_png() {
        let capture = CommandCapture::new(argv(&["sh", "-c", "printf 'hello'"])).unwrap();
        assert!(matches!(capture.capture(), Err(CaptureError::InvalidImage)));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure_reports_stderr() {
        let capture =
            CommandCapture::new(argv(&["sh", "-c", "echo 'no display' >&2; exit 3"])).unwrap();
        match capture.capture() {
            Err(CaptureError::CommandFailed { status, stderr }) => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "no display");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_command_png_accepted() {
        let capture = CommandCapture::new(argv(&[
            "sh",
            "-c",
            "printf '\\211PNG\\r\\n\\032\\nrest'",
        ]))
        .unwrap();
        let bytes = capture.capture().unwrap();
        assert!(bytes.starts_with(&PNG_SIGNATURE));
        assert!(bytes.ends_with(b"rest"));
    }
}
