// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Port formats and the requested configuration applied to them.

use std::{fmt, str::FromStr, time::Duration};

use mmal_sys::Rational;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// A four-character encoding code such as `JPEG` or `I420`.
///
/// Serializes as its four-character string; trailing spaces are trimmed on
/// output and padded on input (`"GIF"` parses as `GIF `).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Encoding(u32);

impl Encoding {
    pub const UNKNOWN: Self = Self(mmal_sys::MMAL_ENCODING_UNKNOWN);
    pub const H264: Self = Self(mmal_sys::MMAL_ENCODING_H264);
    pub const MJPEG: Self = Self(mmal_sys::MMAL_ENCODING_MJPEG);
    pub const JPEG: Self = Self(mmal_sys::MMAL_ENCODING_JPEG);
    pub const GIF: Self = Self(mmal_sys::MMAL_ENCODING_GIF);
    pub const PNG: Self = Self(mmal_sys::MMAL_ENCODING_PNG);
    pub const BMP: Self = Self(mmal_sys::MMAL_ENCODING_BMP);
    pub const I420: Self = Self(mmal_sys::MMAL_ENCODING_I420);
    pub const YV12: Self = Self(mmal_sys::MMAL_ENCODING_YV12);
    pub const NV12: Self = Self(mmal_sys::MMAL_ENCODING_NV12);
    pub const RGB24: Self = Self(mmal_sys::MMAL_ENCODING_RGB24);
    pub const BGR24: Self = Self(mmal_sys::MMAL_ENCODING_BGR24);
    pub const RGBA: Self = Self(mmal_sys::MMAL_ENCODING_RGBA);
    pub const OPAQUE: Self = Self(mmal_sys::MMAL_ENCODING_OPAQUE);

    pub const fn from_four_cc(code: u32) -> Self {
        Self(code)
    }

    pub const fn four_cc(self) -> u32 {
        self.0
    }

    /// Returns `true` for uncompressed pixel formats.
    pub fn is_raw(self) -> bool {
        matches!(
            self,
            Self::I420 | Self::YV12 | Self::NV12 | Self::RGB24 | Self::BGR24 | Self::RGBA
        )
    }

    /// Bytes needed for one uncompressed frame, if this is a raw format.
    pub fn frame_size(self, width: u32, height: u32) -> Option<usize> {
        let pixels = width as usize * height as usize;
        match self {
            Self::I420 | Self::YV12 | Self::NV12 => Some(pixels * 3 / 2),
            Self::RGB24 | Self::BGR24 => Some(pixels * 3),
            Self::RGBA => Some(pixels * 4),
            _ => None,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::UNKNOWN {
            return f.write_str("UNKNOWN");
        }
        let bytes = self.0.to_le_bytes();
        let text: String = bytes.iter().map(|&b| b as char).collect();
        f.write_str(text.trim_end())
    }
}

impl fmt::Debug for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encoding({self})")
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("unknown") {
            return Ok(Self::UNKNOWN);
        }
        if s.is_empty() || s.len() > 4 || !s.is_ascii() {
            return Err(Error::InvalidArg(format!(
                "'{s}' is not a four-character encoding code"
            )));
        }
        let mut code = [b' '; 4];
        code[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self(mmal_sys::four_cc(&code)))
    }
}

impl Serialize for Encoding {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Encoding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Region of interest within a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The format committed on a port, including buffer requirements reported
/// by the native layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFormat {
    pub encoding: Encoding,
    pub encoding_variant: Encoding,
    pub width: u32,
    pub height: u32,
    pub crop: Crop,
    pub framerate: Rational,
    pub bitrate: u32,
    pub buffer_num: u32,
    pub buffer_num_min: u32,
    pub buffer_num_recommended: u32,
    pub buffer_size: usize,
    pub buffer_size_min: usize,
    pub buffer_size_recommended: usize,
}

impl Default for PortFormat {
    fn default() -> Self {
        Self {
            encoding: Encoding::UNKNOWN,
            encoding_variant: Encoding::UNKNOWN,
            width: 0,
            height: 0,
            crop: Crop::default(),
            framerate: Rational::new(0, 1),
            bitrate: 0,
            buffer_num: 0,
            buffer_num_min: 0,
            buffer_num_recommended: 0,
            buffer_size: 0,
            buffer_size_min: 0,
            buffer_size_recommended: 0,
        }
    }
}

/// How a port's output stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// End-of-frame is terminal: one frame (or still) per operation.
    #[default]
    Single,
    /// End-of-frame marks a frame boundary; the stream runs until
    /// end-of-stream, force stop or timeout.
    Continuous,
}

/// Requested configuration for a port.
///
/// Zero values for buffer count and size mean "use what the native layer
/// recommends". Resolution is padded to the alignment the native layer
/// expects (width to 32, height to 16).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub encoding: Encoding,
    pub pixel_format: Option<Encoding>,
    pub width: u32,
    pub height: u32,
    pub crop: Option<Crop>,
    /// Frames per second as numerator and denominator.
    pub framerate: Option<(i32, i32)>,
    pub bitrate: u32,
    pub quality: u32,
    pub zero_copy: bool,
    pub buffer_num: u32,
    pub buffer_size: usize,
    pub timeout_ms: Option<u64>,
    pub capture_mode: CaptureMode,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::I420,
            pixel_format: None,
            width: 0,
            height: 0,
            crop: None,
            framerate: None,
            bitrate: 0,
            quality: 0,
            zero_copy: false,
            buffer_num: 0,
            buffer_size: 0,
            timeout_ms: None,
            capture_mode: CaptureMode::Single,
        }
    }
}

impl PortConfig {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }

    pub fn with_pixel_format(mut self, pixel_format: Encoding) -> Self {
        self.pixel_format = Some(pixel_format);
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_framerate(mut self, num: i32, den: i32) -> Self {
        self.framerate = Some((num, den));
        self
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_zero_copy(mut self, zero_copy: bool) -> Self {
        self.zero_copy = zero_copy;
        self
    }

    /// Requests a buffer count and size; zero keeps the recommendation.
    pub fn with_buffers(mut self, buffer_num: u32, buffer_size: usize) -> Self {
        self.buffer_num = buffer_num;
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_capture_mode(mut self, capture_mode: CaptureMode) -> Self {
        self.capture_mode = capture_mode;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Rounds `value` up to a multiple of `alignment` (a power of two), or
/// `None` if the result does not fit in a `u32`.
pub fn align_up(value: u32, alignment: u32) -> Option<u32> {
    Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

pub fn pad_width(width: u32) -> Option<u32> {
    align_up(width, 32)
}

pub fn pad_height(height: u32) -> Option<u32> {
    align_up(height, 16)
}

/// Picks the requested value when set, the recommendation otherwise, and
/// never less than the minimum.
pub(crate) fn negotiate<T: Ord + Default + Copy>(requested: T, recommended: T, minimum: T) -> T {
    let wanted = if requested > T::default() {
        requested
    } else {
        recommended
    };
    wanted.max(minimum)
}
