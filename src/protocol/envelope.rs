//! Response envelopes.
//!
//! The agent's replies carry no command tag, so a reply is decoded against
//! the [`Command`] that produced it. Anything that does not fit the expected
//! shape is an [`Error::Protocol`], never a connection failure.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::Command;

// ============================================================================
// Wire Shapes
// ============================================================================

/// `view_hierarchy` reply. `message` is itself a JSON-encoded array.
#[derive(Debug, Deserialize)]
struct ViewHierarchyWire {
    message: String,
    width: u32,
    height: u32,
}

/// `screenshot` reply. `data` is base64 PNG.
#[derive(Debug, Deserialize)]
struct ScreenshotWire {
    data: String,
}

// ============================================================================
// ResponseEnvelope
// ============================================================================

/// A decoded agent reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    /// View tree of the current screen.
    ViewHierarchy(ViewHierarchy),
    /// Raw image bytes, base64 already removed.
    Screenshot {
        /// Encoded image (PNG from the agent).
        data: Vec<u8>,
    },
}

impl ResponseEnvelope {
    /// Decodes `text` as the reply to `command`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on malformed JSON, missing fields, a
    /// non-array `message`, or invalid base64.
    pub fn decode(command: Command, text: &str) -> Result<Self> {
        match command {
            Command::ViewHierarchy => {
                let wire: ViewHierarchyWire = serde_json::from_str(text)
                    .map_err(|e| Error::protocol(format!("invalid {command} reply: {e}")))?;
                let views: Vec<Value> = serde_json::from_str(&wire.message)
                    .map_err(|e| Error::protocol(format!("invalid view list: {e}")))?;

                Ok(Self::ViewHierarchy(ViewHierarchy {
                    views,
                    width: wire.width,
                    height: wire.height,
                }))
            }
            Command::Screenshot => {
                let wire: ScreenshotWire = serde_json::from_str(text)
                    .map_err(|e| Error::protocol(format!("invalid {command} reply: {e}")))?;
                let data = Base64Standard
                    .decode(wire.data.trim())
                    .map_err(|e| Error::protocol(format!("Failed to decode base64: {e}")))?;

                Ok(Self::Screenshot { data })
            }
        }
    }

    /// Returns the command this envelope answers.
    #[inline]
    #[must_use]
    pub fn command(&self) -> Command {
        match self {
            Self::ViewHierarchy(_) => Command::ViewHierarchy,
            Self::Screenshot { .. } => Command::Screenshot,
        }
    }

    /// Unwraps a view hierarchy envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for any other kind.
    pub fn into_view_hierarchy(self) -> Result<ViewHierarchy> {
        match self {
            Self::ViewHierarchy(hierarchy) => Ok(hierarchy),
            other => Err(Error::protocol(format!(
                "expected view_hierarchy envelope, got {}",
                other.command()
            ))),
        }
    }

    /// Unwraps a screenshot envelope into its image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for any other kind.
    pub fn into_screenshot_data(self) -> Result<Vec<u8>> {
        match self {
            Self::Screenshot { data } => Ok(data),
            other => Err(Error::protocol(format!(
                "expected screenshot envelope, got {}",
                other.command()
            ))),
        }
    }
}

// ============================================================================
// ViewHierarchy
// ============================================================================

/// The view tree reported by the agent, with the screen size.
///
/// Serializes as `{"width", "height", "views"}`, the layout written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewHierarchy {
    /// Screen width in pixels.
    pub width: u32,
    /// Screen height in pixels.
    pub height: u32,
    /// View nodes in agent order.
    pub views: Vec<Value>,
}

// ============================================================================
// Screenshot
// ============================================================================

/// A captured screen: the bytes as sent plus the decoded image.
#[derive(Debug, Clone)]
pub struct Screenshot {
    bytes: Vec<u8>,
    image: DynamicImage,
}

impl Screenshot {
    /// Decodes image bytes (PNG or JPEG).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the bytes are not a supported image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let image = image::load_from_memory(&bytes)
            .map_err(|e| Error::protocol(format!("Failed to decode screenshot image: {e}")))?;
        Ok(Self { bytes, image })
    }

    /// Returns the encoded bytes exactly as received.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the screenshot, returning the encoded bytes.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the decoded image.
    #[inline]
    #[must_use]
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Image width in pixels.
    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Image height in pixels.
    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

// ============================================================================
// Test Support
// ============================================================================

/// Encodes a small solid PNG.
#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    use std::io::Cursor;

    let pixels = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 30, 90, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(pixels)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// Wraps image bytes the way the agent does.
#[cfg(test)]
pub(crate) fn screenshot_reply(bytes: &[u8]) -> String {
    serde_json::json!({ "data": Base64Standard.encode(bytes) }).to_string()
}

// ============================================================================
// Tests
// ============================================================================
