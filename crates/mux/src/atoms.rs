//! Low-level MP4 box (atom) writing primitives.
//!
//! MP4 files are nested boxes: a 4-byte big-endian size (header
//! included) followed by a 4-byte ASCII type. "Full boxes" add a 1-byte
//! version and 3-byte flags. Boxes whose size is unknown until their
//! content is written use a placeholder that gets patched afterwards;
//! the mdat box uses the 64-bit "largesize" form because encoded video
//! can cross the 4 GB line.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Seek, SeekFrom, Write};

use crate::error::{MuxError, MuxResult};

/// Track timescale: 90 kHz, the conventional video clock.
pub const VIDEO_TIMESCALE: u32 = 90_000;

/// Movie-level timescale (millisecond precision).
pub const MOVIE_TIMESCALE: u32 = 1000;

/// Seconds between the MP4 epoch (1904-01-01) and the Unix epoch.
pub const MP4_EPOCH_OFFSET: u64 = 2_082_844_800;

/// Write a standard box header: 4-byte size + 4-byte type.
pub fn write_box_header<W: Write>(writer: &mut W, box_type: &[u8; 4], size: u32) -> MuxResult<()> {
    writer.write_u32::<BigEndian>(size)?;
    writer.write_all(box_type)?;
    Ok(())
}

/// Write a full-box header: size + type + 1-byte version + 3-byte flags.
pub fn write_full_box_header<W: Write>(
    writer: &mut W,
    box_type: &[u8; 4],
    size: u32,
    version: u8,
    flags: u32,
) -> MuxResult<()> {
    writer.write_u32::<BigEndian>(size)?;
    writer.write_all(box_type)?;
    let version_flags = ((version as u32) << 24) | (flags & 0x00FF_FFFF);
    writer.write_u32::<BigEndian>(version_flags)?;
    Ok(())
}

/// Reserve a 4-byte size field and return its position for patching.
///
/// ```ignore
/// let pos = box_size_placeholder(&mut writer)?;
/// writer.write_all(b"moov")?;
/// // ... box content ...
/// fill_box_size(&mut writer, pos)?;
/// ```
pub fn box_size_placeholder<W: Write + Seek>(writer: &mut W) -> MuxResult<u64> {
    let pos = writer.stream_position()?;
    writer.write_u32::<BigEndian>(0)?;
    Ok(pos)
}

/// Patch a reserved size field with the byte count from it to the
/// current position.
pub fn fill_box_size<W: Write + Seek>(writer: &mut W, size_pos: u64) -> MuxResult<()> {
    let current = writer.stream_position()?;
    let size = current - size_pos;
    if size > u32::MAX as u64 {
        return Err(MuxError::Oversize(size));
    }
    writer.seek(SeekFrom::Start(size_pos))?;
    writer.write_u32::<BigEndian>(size as u32)?;
    writer.seek(SeekFrom::Start(current))?;
    Ok(())
}

/// Start a box in the 64-bit "largesize" form (size field = 1 followed
/// by an 8-byte extended size). Returns the position of the extended
/// size field for [`fill_large_box_size`].
pub fn large_box_size_placeholder<W: Write + Seek>(
    writer: &mut W,
    box_type: &[u8; 4],
) -> MuxResult<u64> {
    writer.write_u32::<BigEndian>(1)?;
    writer.write_all(box_type)?;
    let size_pos = writer.stream_position()?;
    writer.write_u64::<BigEndian>(0)?;
    Ok(size_pos)
}

/// Patch a 64-bit extended size. `size_pos` points at the 8-byte field,
/// which sits after the 8-byte standard header; the total box size
/// includes that header.
pub fn fill_large_box_size<W: Write + Seek>(writer: &mut W, size_pos: u64) -> MuxResult<()> {
    let current = writer.stream_position()?;
    let total_size = current - (size_pos - 8);
    writer.seek(SeekFrom::Start(size_pos))?;
    writer.write_u64::<BigEndian>(total_size)?;
    writer.seek(SeekFrom::Start(current))?;
    Ok(())
}

/// Convert nanoseconds to ticks of the given timescale.
pub fn nanos_to_timescale(nanos: i64, timescale: u32) -> u64 {
    if nanos <= 0 {
        return 0;
    }
    (nanos as i128 * timescale as i128 / 1_000_000_000) as u64
}

/// Convert a tick count back to seconds.
pub fn timescale_to_seconds(ticks: u64, timescale: u32) -> f64 {
    ticks as f64 / timescale as f64
}

/// Write a fixed-point 16.16 number.
pub fn write_fixed_point_16_16<W: Write>(writer: &mut W, value: f64) -> MuxResult<()> {
    let fixed = (value * 65536.0).round() as i32;
    writer.write_i32::<BigEndian>(fixed)?;
    Ok(())
}

/// Write a fixed-point 8.8 number.
pub fn write_fixed_point_8_8<W: Write>(writer: &mut W, value: f64) -> MuxResult<()> {
    let fixed = (value * 256.0).round() as i16;
    writer.write_i16::<BigEndian>(fixed)?;
    Ok(())
}

/// Write zero padding.
pub fn write_zeros<W: Write>(writer: &mut W, count: usize) -> MuxResult<()> {
    let zeros = vec![0u8; count];
    writer.write_all(&zeros)?;
    Ok(())
}

/// ISO 639-2/T language code packed into 3x5 bits ("und" for
/// undetermined).
pub fn encode_language(lang: &str) -> u16 {
    let bytes = lang.as_bytes();
    if bytes.len() < 3 {
        return encode_language("und");
    }
    let a = (bytes[0] - 0x60) as u16;
    let b = (bytes[1] - 0x60) as u16;
    let c = (bytes[2] - 0x60) as u16;
    (a << 10) | (b << 5) | c
}

/// Current time as an MP4 creation timestamp (seconds since 1904).
pub fn mp4_creation_time() -> u64 {
    let unix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    unix + MP4_EPOCH_OFFSET
}
