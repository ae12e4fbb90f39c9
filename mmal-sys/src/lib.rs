// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # mmal-sys: vocabulary of the native multimedia layer
//!
//! This crate holds the plain-data vocabulary shared between the safe `mmal`
//! crate and whatever drives the underlying fixed-function media graph:
//! status codes, buffer header flags, event and encoding four-character
//! codes, port types, connection flags and parameter identifiers.
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe `mmal`
//! crate instead, which maps [`Status`] codes to Rust errors and wraps the
//! raw flag words in typed accessors.
//!
//! Native structure layouts are deliberately absent: the `mmal` crate talks
//! to the native layer through a trait, never through raw structures.

#![allow(non_upper_case_globals)]

/// Status code returned by every native call.
pub type Status = u32;

pub const MMAL_SUCCESS: Status = 0;
/// Out of memory.
pub const MMAL_ENOMEM: Status = 1;
/// Out of resources other than memory.
pub const MMAL_ENOSPC: Status = 2;
/// Argument is invalid.
pub const MMAL_EINVAL: Status = 3;
/// Function not implemented.
pub const MMAL_ENOSYS: Status = 4;
/// No such file or directory.
pub const MMAL_ENOENT: Status = 5;
/// No such device or address.
pub const MMAL_ENXIO: Status = 6;
/// I/O error.
pub const MMAL_EIO: Status = 7;
/// Illegal seek.
pub const MMAL_ESPIPE: Status = 8;
/// Data is corrupt.
pub const MMAL_ECORRUPT: Status = 9;
/// Component is not ready.
pub const MMAL_ENOTREADY: Status = 10;
/// Component is not configured.
pub const MMAL_ECONFIG: Status = 11;
/// Port is already connected.
pub const MMAL_EISCONN: Status = 12;
/// Port is disconnected.
pub const MMAL_ENOTCONN: Status = 13;
/// Resource temporarily unavailable; try again later.
pub const MMAL_EAGAIN: Status = 14;
/// Bad address.
pub const MMAL_EFAULT: Status = 15;

/// Returns a short human-readable description of a status code.
pub fn status_to_string(status: Status) -> &'static str {
    match status {
        MMAL_SUCCESS => "success",
        MMAL_ENOMEM => "out of memory",
        MMAL_ENOSPC => "out of resources",
        MMAL_EINVAL => "invalid argument",
        MMAL_ENOSYS => "not implemented",
        MMAL_ENOENT => "no such file or directory",
        MMAL_ENXIO => "no such device or address",
        MMAL_EIO => "i/o error",
        MMAL_ESPIPE => "illegal seek",
        MMAL_ECORRUPT => "data is corrupt",
        MMAL_ENOTREADY => "component is not ready",
        MMAL_ECONFIG => "component is not configured",
        MMAL_EISCONN => "port is already connected",
        MMAL_ENOTCONN => "port is disconnected",
        MMAL_EAGAIN => "resource temporarily unavailable",
        MMAL_EFAULT => "bad address",
        _ => "unknown status",
    }
}

/// Builds a four-character code the way the native layer packs them
/// (first character in the least significant byte).
pub const fn four_cc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

// Buffer header flags.
pub const MMAL_BUFFER_HEADER_FLAG_EOS: u32 = 1 << 0;
pub const MMAL_BUFFER_HEADER_FLAG_FRAME_START: u32 = 1 << 1;
pub const MMAL_BUFFER_HEADER_FLAG_FRAME_END: u32 = 1 << 2;
pub const MMAL_BUFFER_HEADER_FLAG_FRAME: u32 =
    MMAL_BUFFER_HEADER_FLAG_FRAME_START | MMAL_BUFFER_HEADER_FLAG_FRAME_END;
pub const MMAL_BUFFER_HEADER_FLAG_KEYFRAME: u32 = 1 << 3;
pub const MMAL_BUFFER_HEADER_FLAG_DISCONTINUITY: u32 = 1 << 4;
pub const MMAL_BUFFER_HEADER_FLAG_CONFIG: u32 = 1 << 5;
pub const MMAL_BUFFER_HEADER_FLAG_ENCRYPTED: u32 = 1 << 6;
pub const MMAL_BUFFER_HEADER_FLAG_CODECSIDEINFO: u32 = 1 << 7;
pub const MMAL_BUFFER_HEADER_FLAG_SNAPSHOT: u32 = 1 << 8;
pub const MMAL_BUFFER_HEADER_FLAG_CORRUPTED: u32 = 1 << 9;
pub const MMAL_BUFFER_HEADER_FLAG_TRANSMISSION_FAILED: u32 = 1 << 10;
pub const MMAL_BUFFER_HEADER_FLAG_DECODEONLY: u32 = 1 << 11;
pub const MMAL_BUFFER_HEADER_FLAG_NAL_END: u32 = 1 << 12;

/// Timestamp value meaning "no timestamp".
pub const MMAL_TIME_UNKNOWN: i64 = i64::MIN;

// Event codes carried in a buffer header's command field.
pub const MMAL_EVENT_ERROR: u32 = four_cc(b"ERRO");
pub const MMAL_EVENT_EOS: u32 = four_cc(b"EEOS");
pub const MMAL_EVENT_FORMAT_CHANGED: u32 = four_cc(b"EFCH");
pub const MMAL_EVENT_PARAMETER_CHANGED: u32 = four_cc(b"EPCH");

// Encodings.
pub const MMAL_ENCODING_UNKNOWN: u32 = 0;
pub const MMAL_ENCODING_H264: u32 = four_cc(b"H264");
pub const MMAL_ENCODING_MJPEG: u32 = four_cc(b"MJPG");
pub const MMAL_ENCODING_JPEG: u32 = four_cc(b"JPEG");
pub const MMAL_ENCODING_GIF: u32 = four_cc(b"GIF ");
pub const MMAL_ENCODING_PNG: u32 = four_cc(b"PNG ");
pub const MMAL_ENCODING_BMP: u32 = four_cc(b"BMP ");
pub const MMAL_ENCODING_I420: u32 = four_cc(b"I420");
pub const MMAL_ENCODING_YV12: u32 = four_cc(b"YV12");
pub const MMAL_ENCODING_NV12: u32 = four_cc(b"NV12");
pub const MMAL_ENCODING_RGB24: u32 = four_cc(b"RGB3");
pub const MMAL_ENCODING_BGR24: u32 = four_cc(b"BGR3");
pub const MMAL_ENCODING_RGBA: u32 = four_cc(b"RGBA");
pub const MMAL_ENCODING_OPAQUE: u32 = four_cc(b"OPQV");

// Port types.
pub const MMAL_PORT_TYPE_UNKNOWN: u32 = 0;
pub const MMAL_PORT_TYPE_CONTROL: u32 = 1;
pub const MMAL_PORT_TYPE_INPUT: u32 = 2;
pub const MMAL_PORT_TYPE_OUTPUT: u32 = 3;
pub const MMAL_PORT_TYPE_CLOCK: u32 = 4;

// Connection flags.
pub const MMAL_CONNECTION_FLAG_TUNNELLING: u32 = 0x1;
pub const MMAL_CONNECTION_FLAG_ALLOCATION_ON_INPUT: u32 = 0x2;
pub const MMAL_CONNECTION_FLAG_ALLOCATION_ON_OUTPUT: u32 = 0x4;
pub const MMAL_CONNECTION_FLAG_KEEP_BUFFER_REQUIREMENTS: u32 = 0x8;
pub const MMAL_CONNECTION_FLAG_DIRECT: u32 = 0x10;

// Parameter groups and identifiers.
pub const MMAL_PARAMETER_GROUP_COMMON: u32 = 0;
pub const MMAL_PARAMETER_GROUP_CAMERA: u32 = 1 << 16;
pub const MMAL_PARAMETER_GROUP_VIDEO: u32 = 2 << 16;

pub const MMAL_PARAMETER_ZERO_COPY: u32 = MMAL_PARAMETER_GROUP_COMMON + 4;
pub const MMAL_PARAMETER_BUFFER_REQUIREMENTS: u32 = MMAL_PARAMETER_GROUP_COMMON + 5;
pub const MMAL_PARAMETER_NO_IMAGE_PADDING: u32 = MMAL_PARAMETER_GROUP_COMMON + 14;

pub const MMAL_PARAMETER_CAPTURE_QUALITY: u32 = MMAL_PARAMETER_GROUP_CAMERA + 1;
pub const MMAL_PARAMETER_ROTATION: u32 = MMAL_PARAMETER_GROUP_CAMERA + 2;
pub const MMAL_PARAMETER_MIRROR: u32 = MMAL_PARAMETER_GROUP_CAMERA + 15;
pub const MMAL_PARAMETER_CAMERA_NUM: u32 = MMAL_PARAMETER_GROUP_CAMERA + 16;
pub const MMAL_PARAMETER_CAPTURE: u32 = MMAL_PARAMETER_GROUP_CAMERA + 17;
pub const MMAL_PARAMETER_BRIGHTNESS: u32 = MMAL_PARAMETER_GROUP_CAMERA + 36;
pub const MMAL_PARAMETER_ISO: u32 = MMAL_PARAMETER_GROUP_CAMERA + 38;
pub const MMAL_PARAMETER_SHUTTER_SPEED: u32 = MMAL_PARAMETER_GROUP_CAMERA + 64;
pub const MMAL_PARAMETER_ANNOTATE: u32 = MMAL_PARAMETER_GROUP_CAMERA + 67;

pub const MMAL_PARAMETER_VIDEO_BIT_RATE: u32 = MMAL_PARAMETER_GROUP_VIDEO + 6;
pub const MMAL_PARAMETER_INTRAPERIOD: u32 = MMAL_PARAMETER_GROUP_VIDEO + 12;

/// Rational number used for frame rates and pixel aspect ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }
}
