//! MP4 box writers for a single-H.264-track file (ISO 14496-12).
//!
//! Writes the structural boxes: ftyp up front, then at stop time the
//! moov tree — mvhd, one trak (tkhd with the orientation matrix, mdia,
//! minf, stbl with the avc1/avcC sample description and sample tables)
//! and an optional udta/©xyz geolocation entry. The mdat payload is
//! written progressively by the muxer, not here.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Seek, Write};

use vireo_common::config::{Location, Orientation};
use vireo_common::types::Resolution;

use crate::atoms::{
    box_size_placeholder, encode_language, fill_box_size, mp4_creation_time, nanos_to_timescale,
    timescale_to_seconds, write_box_header, write_fixed_point_16_16, write_fixed_point_8_8,
    write_full_box_header, write_zeros, MOVIE_TIMESCALE,
};
use crate::error::MuxResult;

/// Metadata for a single sample (one encoded access unit) in the track.
#[derive(Clone, Debug)]
pub struct SampleInfo {
    /// Absolute byte offset of the sample in the file.
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u32,
    /// Sample duration in track timescale units.
    pub duration: u32,
    /// Whether the sample is a sync point (IDR frame).
    pub is_sync: bool,
}

/// Everything the moov writer needs about the video track.
#[derive(Clone, Debug)]
pub struct VideoTrackInfo {
    /// 1-based track ID.
    pub track_id: u32,
    /// Track timescale.
    pub timescale: u32,
    /// Total duration in timescale units.
    pub duration: u64,
    pub resolution: Resolution,
    /// Playback rotation hint, encoded as the tkhd matrix.
    pub rotation: Orientation,
    /// H.264 SPS NAL unit, without start-code prefix.
    pub sps: Vec<u8>,
    /// H.264 PPS NAL unit, without start-code prefix.
    pub pps: Vec<u8>,
    pub samples: Vec<SampleInfo>,
}

/// Write the ftyp (File Type) box.
pub fn write_ftyp<W: Write>(writer: &mut W) -> MuxResult<()> {
    // header + major + minor + 3 compatible brands
    let size: u32 = 8 + 4 + 4 + 4 * 3;
    write_box_header(writer, b"ftyp", size)?;
    writer.write_all(b"isom")?; // major brand
    writer.write_u32::<BigEndian>(0x200)?; // minor version
    writer.write_all(b"isom")?;
    writer.write_all(b"avc1")?;
    writer.write_all(b"mp41")?;
    Ok(())
}

/// Write the mvhd (Movie Header) box.
pub fn write_mvhd<W: Write + Seek>(writer: &mut W, duration_secs: f64) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"mvhd")?;

    let creation_time = mp4_creation_time();
    let duration = (duration_secs * MOVIE_TIMESCALE as f64).round() as u64;

    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(creation_time as u32)?;
    writer.write_u32::<BigEndian>(creation_time as u32)?; // modification
    writer.write_u32::<BigEndian>(MOVIE_TIMESCALE)?;
    writer.write_u32::<BigEndian>(duration as u32)?;

    write_fixed_point_16_16(writer, 1.0)?; // rate
    write_fixed_point_8_8(writer, 1.0)?; // volume
    write_zeros(writer, 10)?; // reserved

    // Identity matrix; per-track rotation lives in tkhd
    write_identity_matrix(writer)?;

    write_zeros(writer, 24)?; // pre-defined
    writer.write_u32::<BigEndian>(2)?; // next_track_ID

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the tkhd (Track Header) box, including the rotation matrix for
/// the orientation hint. Width and height stay unrotated; players apply
/// the matrix at presentation time.
pub fn write_tkhd<W: Write + Seek>(
    writer: &mut W,
    track_id: u32,
    duration_secs: f64,
    resolution: Resolution,
    rotation: Orientation,
) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"tkhd")?;

    let creation_time = mp4_creation_time();
    let duration = (duration_secs * MOVIE_TIMESCALE as f64).round() as u64;

    // flags: track_enabled | track_in_movie
    writer.write_u32::<BigEndian>(0x00_000003)?;
    writer.write_u32::<BigEndian>(creation_time as u32)?;
    writer.write_u32::<BigEndian>(creation_time as u32)?;
    writer.write_u32::<BigEndian>(track_id)?;
    write_zeros(writer, 4)?; // reserved
    writer.write_u32::<BigEndian>(duration as u32)?;

    write_zeros(writer, 8)?; // reserved
    writer.write_i16::<BigEndian>(0)?; // layer
    writer.write_i16::<BigEndian>(0)?; // alternate_group
    write_fixed_point_8_8(writer, 0.0)?; // volume (video track)
    write_zeros(writer, 2)?; // reserved

    write_rotation_matrix(writer, rotation, resolution)?;

    write_fixed_point_16_16(writer, resolution.width as f64)?;
    write_fixed_point_16_16(writer, resolution.height as f64)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// The unity transformation matrix: {1,0,0, 0,1,0, 0,0,1} with the u/v
/// entries in 2.30 fixed point.
fn write_identity_matrix<W: Write + Seek>(writer: &mut W) -> MuxResult<()> {
    write_rotation_matrix(
        writer,
        Orientation::Deg0,
        Resolution::new(0, 0),
    )
}

/// Write the 3x3 tkhd matrix {a,b,u, c,d,v, x,y,w} for a clockwise
/// rotation hint. a-d and x,y are 16.16 fixed point; u,v,w are 2.30.
/// The translation keeps the rotated frame inside the positive quadrant.
fn write_rotation_matrix<W: Write + Seek>(
    writer: &mut W,
    rotation: Orientation,
    resolution: Resolution,
) -> MuxResult<()> {
    let w = resolution.width as f64;
    let h = resolution.height as f64;
    let (a, b, c, d, x, y) = match rotation {
        Orientation::Deg0 => (1.0, 0.0, 0.0, 1.0, 0.0, 0.0),
        Orientation::Deg90 => (0.0, 1.0, -1.0, 0.0, h, 0.0),
        Orientation::Deg180 => (-1.0, 0.0, 0.0, -1.0, w, h),
        Orientation::Deg270 => (0.0, -1.0, 1.0, 0.0, 0.0, w),
    };

    write_fixed_point_16_16(writer, a)?;
    write_fixed_point_16_16(writer, b)?;
    writer.write_u32::<BigEndian>(0)?; // u
    write_fixed_point_16_16(writer, c)?;
    write_fixed_point_16_16(writer, d)?;
    writer.write_u32::<BigEndian>(0)?; // v
    write_fixed_point_16_16(writer, x)?;
    write_fixed_point_16_16(writer, y)?;
    writer.write_u32::<BigEndian>(0x4000_0000)?; // w = 1.0 in 2.30
    Ok(())
}

/// Write the mdhd (Media Header) box.
pub fn write_mdhd<W: Write + Seek>(writer: &mut W, timescale: u32, duration: u64) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"mdhd")?;

    let creation_time = mp4_creation_time();

    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(creation_time as u32)?;
    writer.write_u32::<BigEndian>(creation_time as u32)?;
    writer.write_u32::<BigEndian>(timescale)?;
    writer.write_u32::<BigEndian>(duration as u32)?;
    writer.write_u16::<BigEndian>(encode_language("und"))?;
    writer.write_u16::<BigEndian>(0)?; // pre-defined

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the hdlr (Handler Reference) box for the video track.
pub fn write_hdlr<W: Write + Seek>(writer: &mut W) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"hdlr")?;

    writer.write_u32::<BigEndian>(0)?; // version + flags
    write_zeros(writer, 4)?; // pre_defined
    writer.write_all(b"vide")?;
    write_zeros(writer, 12)?; // reserved
    writer.write_all(b"VideoHandler\0")?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the avcC (AVC Decoder Configuration Record) box from the
/// negotiated SPS and PPS.
fn write_avcc<W: Write + Seek>(writer: &mut W, sps: &[u8], pps: &[u8]) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"avcC")?;

    writer.write_u8(1)?; // configurationVersion
    writer.write_u8(sps.get(1).copied().unwrap_or(0x42))?; // AVCProfileIndication
    writer.write_u8(sps.get(2).copied().unwrap_or(0x00))?; // profile_compatibility
    writer.write_u8(sps.get(3).copied().unwrap_or(0x1F))?; // AVCLevelIndication
    writer.write_u8(0xFF)?; // lengthSizeMinusOne = 3 | reserved

    writer.write_u8(0xE1)?; // one SPS | reserved
    writer.write_u16::<BigEndian>(sps.len() as u16)?;
    writer.write_all(sps)?;

    writer.write_u8(1)?; // one PPS
    writer.write_u16::<BigEndian>(pps.len() as u16)?;
    writer.write_all(pps)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the stsd (Sample Description) box with one avc1 entry.
pub fn write_stsd<W: Write + Seek>(
    writer: &mut W,
    resolution: Resolution,
    sps: &[u8],
    pps: &[u8],
) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stsd")?;
    writer.write_u32::<BigEndian>(0)?; // version + flags
    writer.write_u32::<BigEndian>(1)?; // entry_count

    let entry_size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"avc1")?;

    // VisualSampleEntry
    write_zeros(writer, 6)?; // reserved
    writer.write_u16::<BigEndian>(1)?; // data_reference_index
    write_zeros(writer, 16)?; // pre_defined + reserved
    writer.write_u16::<BigEndian>(resolution.width as u16)?;
    writer.write_u16::<BigEndian>(resolution.height as u16)?;
    writer.write_u32::<BigEndian>(0x0048_0000)?; // horizresolution (72 dpi)
    writer.write_u32::<BigEndian>(0x0048_0000)?; // vertresolution
    write_zeros(writer, 4)?; // reserved
    writer.write_u16::<BigEndian>(1)?; // frame_count
    write_zeros(writer, 32)?; // compressorname
    writer.write_u16::<BigEndian>(0x0018)?; // depth
    writer.write_i16::<BigEndian>(-1)?; // pre_defined

    write_avcc(writer, sps, pps)?;

    fill_box_size(writer, entry_size_pos)?;
    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the stbl (Sample Table) box with all sample metadata.
pub fn write_stbl<W: Write + Seek>(writer: &mut W, track: &VideoTrackInfo) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stbl")?;

    write_stsd(writer, track.resolution, &track.sps, &track.pps)?;
    write_stts(writer, &track.samples)?;
    write_stsc(writer, &track.samples)?;
    write_stsz(writer, &track.samples)?;

    let needs_co64 = track.samples.iter().any(|s| s.offset > u32::MAX as u64);
    if needs_co64 {
        write_co64(writer, &track.samples)?;
    } else {
        write_stco(writer, &track.samples)?;
    }

    write_stss(writer, &track.samples)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write stts (Decoding Time to Sample), run-length encoded.
fn write_stts<W: Write + Seek>(writer: &mut W, samples: &[SampleInfo]) -> MuxResult<()> {
    let entries = run_length_encode_durations(samples);

    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stts")?;
    writer.write_u32::<BigEndian>(0)?;
    writer.write_u32::<BigEndian>(entries.len() as u32)?;
    for (count, duration) in &entries {
        writer.write_u32::<BigEndian>(*count)?;
        writer.write_u32::<BigEndian>(*duration)?;
    }

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Run-length encode sample durations into (count, duration) pairs.
fn run_length_encode_durations(samples: &[SampleInfo]) -> Vec<(u32, u32)> {
    let mut entries: Vec<(u32, u32)> = Vec::new();
    for sample in samples {
        match entries.last_mut() {
            Some((count, duration)) if *duration == sample.duration => *count += 1,
            _ => entries.push((1, sample.duration)),
        }
    }
    entries
}

/// Write stsc (Sample to Chunk): one sample per chunk.
fn write_stsc<W: Write + Seek>(writer: &mut W, samples: &[SampleInfo]) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stsc")?;
    writer.write_u32::<BigEndian>(0)?;

    if samples.is_empty() {
        writer.write_u32::<BigEndian>(0)?;
    } else {
        writer.write_u32::<BigEndian>(1)?; // entry_count
        writer.write_u32::<BigEndian>(1)?; // first_chunk
        writer.write_u32::<BigEndian>(1)?; // samples_per_chunk
        writer.write_u32::<BigEndian>(1)?; // sample_description_index
    }

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write stsz (Sample Size); collapses to the uniform form when every
/// sample has the same size.
fn write_stsz<W: Write + Seek>(writer: &mut W, samples: &[SampleInfo]) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stsz")?;
    writer.write_u32::<BigEndian>(0)?;

    let uniform = samples
        .first()
        .filter(|first| samples.iter().all(|s| s.size == first.size));

    if let Some(first) = uniform {
        writer.write_u32::<BigEndian>(first.size)?;
        writer.write_u32::<BigEndian>(samples.len() as u32)?;
    } else {
        writer.write_u32::<BigEndian>(0)?; // variable sizes follow
        writer.write_u32::<BigEndian>(samples.len() as u32)?;
        for sample in samples {
            writer.write_u32::<BigEndian>(sample.size)?;
        }
    }

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write stco (Chunk Offset, 32-bit).
fn write_stco<W: Write + Seek>(writer: &mut W, samples: &[SampleInfo]) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stco")?;
    writer.write_u32::<BigEndian>(0)?;
    writer.write_u32::<BigEndian>(samples.len() as u32)?;
    for sample in samples {
        writer.write_u32::<BigEndian>(sample.offset as u32)?;
    }
    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write co64 (Chunk Offset, 64-bit) for files past 4 GB.
fn write_co64<W: Write + Seek>(writer: &mut W, samples: &[SampleInfo]) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"co64")?;
    writer.write_u32::<BigEndian>(0)?;
    writer.write_u32::<BigEndian>(samples.len() as u32)?;
    for sample in samples {
        writer.write_u64::<BigEndian>(sample.offset)?;
    }
    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write stss (Sync Sample): 1-based indices of key frames.
fn write_stss<W: Write + Seek>(writer: &mut W, samples: &[SampleInfo]) -> MuxResult<()> {
    let sync_samples: Vec<u32> = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_sync)
        .map(|(i, _)| (i + 1) as u32)
        .collect();

    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"stss")?;
    writer.write_u32::<BigEndian>(0)?;
    writer.write_u32::<BigEndian>(sync_samples.len() as u32)?;
    for sample_number in &sync_samples {
        writer.write_u32::<BigEndian>(*sample_number)?;
    }

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the dinf (Data Information) box with a self-contained dref.
fn write_dinf<W: Write + Seek>(writer: &mut W) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"dinf")?;

    let dref_size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"dref")?;
    writer.write_u32::<BigEndian>(0)?;
    writer.write_u32::<BigEndian>(1)?; // entry_count
    // url entry, flag 1 = data in this file
    write_full_box_header(writer, b"url ", 12, 0, 0x000001)?;

    fill_box_size(writer, dref_size_pos)?;
    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the minf (Media Information) box.
fn write_minf<W: Write + Seek>(writer: &mut W, track: &VideoTrackInfo) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"minf")?;

    // vmhd (Video Media Header)
    write_full_box_header(writer, b"vmhd", 20, 0, 0x000001)?;
    writer.write_u16::<BigEndian>(0)?; // graphicsmode
    write_zeros(writer, 6)?; // opcolor

    write_dinf(writer)?;
    write_stbl(writer, track)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the mdia (Media) box.
fn write_mdia<W: Write + Seek>(writer: &mut W, track: &VideoTrackInfo) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"mdia")?;

    write_mdhd(writer, track.timescale, track.duration)?;
    write_hdlr(writer)?;
    write_minf(writer, track)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the trak (Track) box.
fn write_trak<W: Write + Seek>(writer: &mut W, track: &VideoTrackInfo) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"trak")?;

    let duration_secs = timescale_to_seconds(track.duration, track.timescale);
    write_tkhd(
        writer,
        track.track_id,
        duration_secs,
        track.resolution,
        track.rotation,
    )?;
    write_mdia(writer, track)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Format a latitude/longitude pair as an ISO-6709 point string.
pub fn iso6709_string(location: Location) -> String {
    format!(
        "{:+08.4}{:+09.4}/",
        location.latitude, location.longitude
    )
}

/// Write the udta (User Data) box with a ©xyz geolocation entry.
fn write_udta_location<W: Write + Seek>(writer: &mut W, location: Location) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"udta")?;

    let value = iso6709_string(location);
    let xyz_size_pos = box_size_placeholder(writer)?;
    writer.write_all(&[0xA9, b'x', b'y', b'z'])?;
    writer.write_u16::<BigEndian>(value.len() as u16)?;
    writer.write_u16::<BigEndian>(0x15C7)?; // language: packed "eng"
    writer.write_all(value.as_bytes())?;
    fill_box_size(writer, xyz_size_pos)?;

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Write the complete moov (Movie) box.
pub fn write_moov<W: Write + Seek>(
    writer: &mut W,
    track: &VideoTrackInfo,
    location: Option<Location>,
) -> MuxResult<()> {
    let size_pos = box_size_placeholder(writer)?;
    writer.write_all(b"moov")?;

    let duration_secs = timescale_to_seconds(track.duration, track.timescale);
    write_mvhd(writer, duration_secs)?;
    write_trak(writer, track)?;
    if let Some(location) = location {
        write_udta_location(writer, location)?;
    }

    fill_box_size(writer, size_pos)?;
    Ok(())
}

/// Convert a presentation timestamp in nanoseconds to track ticks.
pub fn pts_to_ticks(nanos: i64, timescale: u32) -> u64 {
    nanos_to_timescale(nanos, timescale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::VIDEO_TIMESCALE;
    use std::io::Cursor;

    fn box_type_at(buf: &[u8], offset: usize) -> &[u8] {
        &buf[offset + 4..offset + 8]
    }

    fn box_size_at(buf: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap())
    }

    fn test_sps() -> Vec<u8> {
        vec![0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x02, 0x80, 0xF6, 0xC0, 0x44, 0x00, 0x00]
    }

    fn test_pps() -> Vec<u8> {
        vec![0x68, 0xCE, 0x38, 0x80]
    }

    fn test_track(samples: Vec<SampleInfo>) -> VideoTrackInfo {
        let duration = samples.iter().map(|s| s.duration as u64).sum();
        VideoTrackInfo {
            track_id: 1,
            timescale: VIDEO_TIMESCALE,
            duration,
            resolution: Resolution::CIF,
            rotation: Orientation::Deg0,
            sps: test_sps(),
            pps: test_pps(),
            samples,
        }
    }

    fn sample(offset: u64, size: u32, duration: u32, is_sync: bool) -> SampleInfo {
        SampleInfo {
            offset,
            size,
            duration,
            is_sync,
        }
    }

    #[test]
    fn ftyp_layout() {
        let mut buf = Vec::new();
        write_ftyp(&mut buf).unwrap();
        assert_eq!(buf.len(), 28);
        assert_eq!(box_size_at(&buf, 0), 28);
        assert_eq!(box_type_at(&buf, 0), b"ftyp");
        assert_eq!(&buf[8..12], b"isom");
        assert_eq!(&buf[16..20], b"isom");
        assert_eq!(&buf[20..24], b"avc1");
        assert_eq!(&buf[24..28], b"mp41");
    }

    #[test]
    fn mvhd_self_sized() {
        let mut cursor = Cursor::new(Vec::new());
        write_mvhd(&mut cursor, 10.0).unwrap();
        let buf = cursor.into_inner();
        assert_eq!(box_type_at(&buf, 0), b"mvhd");
        assert_eq!(buf.len(), box_size_at(&buf, 0) as usize);
    }

    #[test]
    fn tkhd_identity_matrix() {
        let mut cursor = Cursor::new(Vec::new());
        write_tkhd(&mut cursor, 1, 5.0, Resolution::CIF, Orientation::Deg0).unwrap();
        let buf = cursor.into_inner();
        assert_eq!(box_type_at(&buf, 0), b"tkhd");
        // Matrix starts after 8 header + 4 verflags + 4+4+4+4+4 + 8 + 2+2+2+2 = 48
        let m = &buf[48..84];
        // a = 1.0
        assert_eq!(&m[0..4], &[0x00, 0x01, 0x00, 0x00]);
        // b = 0
        assert_eq!(&m[4..8], &[0x00; 4]);
        // d = 1.0
        assert_eq!(&m[16..20], &[0x00, 0x01, 0x00, 0x00]);
        // w = 1.0 in 2.30
        assert_eq!(&m[32..36], &[0x40, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn tkhd_rotation_90() {
        let mut cursor = Cursor::new(Vec::new());
        write_tkhd(&mut cursor, 1, 5.0, Resolution::CIF, Orientation::Deg90).unwrap();
        let buf = cursor.into_inner();
        let m = &buf[48..84];
        // a = 0
        assert_eq!(&m[0..4], &[0x00; 4]);
        // b = 1.0
        assert_eq!(&m[4..8], &[0x00, 0x01, 0x00, 0x00]);
        // c = -1.0
        assert_eq!(&m[12..16], &[0xFF, 0xFF, 0x00, 0x00]);
        // x = height (288) in 16.16
        assert_eq!(&m[24..28], &[0x01, 0x20, 0x00, 0x00]);
        // Width/height fields stay unrotated
        let dims = &buf[84..92];
        assert_eq!(&dims[0..4], &[0x01, 0x60, 0x00, 0x00]); // 352
        assert_eq!(&dims[4..8], &[0x01, 0x20, 0x00, 0x00]); // 288
    }

    #[test]
    fn tkhd_rotation_180() {
        let mut cursor = Cursor::new(Vec::new());
        write_tkhd(&mut cursor, 1, 5.0, Resolution::CIF, Orientation::Deg180).unwrap();
        let buf = cursor.into_inner();
        let m = &buf[48..84];
        // a = -1.0, d = -1.0
        assert_eq!(&m[0..4], &[0xFF, 0xFF, 0x00, 0x00]);
        assert_eq!(&m[16..20], &[0xFF, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn stsd_contains_avc1_and_avcc() {
        let mut cursor = Cursor::new(Vec::new());
        write_stsd(&mut cursor, Resolution::CIF, &test_sps(), &test_pps()).unwrap();
        let buf = cursor.into_inner();
        assert_eq!(box_type_at(&buf, 0), b"stsd");
        assert!(buf.windows(4).any(|w| w == b"avc1"));
        assert!(buf.windows(4).any(|w| w == b"avcC"));
        // SPS bytes are embedded
        assert!(buf
            .windows(test_sps().len())
            .any(|w| w == test_sps().as_slice()));
    }

    #[test]
    fn stbl_box_set() {
        let track = test_track(vec![
            sample(100, 5000, 11_250, true),
            sample(5100, 3000, 11_250, false),
            sample(8100, 4000, 11_250, false),
        ]);
        let mut cursor = Cursor::new(Vec::new());
        write_stbl(&mut cursor, &track).unwrap();
        let buf = cursor.into_inner();
        assert_eq!(box_type_at(&buf, 0), b"stbl");
        for b in [b"stsd", b"stts", b"stsc", b"stsz", b"stco", b"stss"] {
            assert!(buf.windows(4).any(|w| w == *b), "missing {:?}", b);
        }
    }

    #[test]
    fn co64_for_large_offsets() {
        let track = test_track(vec![sample(5_000_000_000, 1000, 11_250, true)]);
        let mut cursor = Cursor::new(Vec::new());
        write_stbl(&mut cursor, &track).unwrap();
        let buf = cursor.into_inner();
        assert!(buf.windows(4).any(|w| w == b"co64"));
        assert!(!buf.windows(4).any(|w| w == b"stco"));
    }

    #[test]
    fn stss_lists_keyframes_one_based() {
        let samples = vec![
            sample(0, 5000, 3000, true),
            sample(5000, 1000, 3000, false),
            sample(6000, 1000, 3000, false),
            sample(7000, 5000, 3000, true),
        ];
        let mut cursor = Cursor::new(Vec::new());
        write_stss(&mut cursor, &samples).unwrap();
        let buf = cursor.into_inner();
        let entry_count = u32::from_be_bytes(buf[12..16].try_into().unwrap());
        assert_eq!(entry_count, 2);
        assert_eq!(u32::from_be_bytes(buf[16..20].try_into().unwrap()), 1);
        assert_eq!(u32::from_be_bytes(buf[20..24].try_into().unwrap()), 4);
    }

    #[test]
    fn stsz_uniform_collapses() {
        let samples = vec![sample(0, 1024, 3000, true), sample(1024, 1024, 3000, false)];
        let mut cursor = Cursor::new(Vec::new());
        write_stsz(&mut cursor, &samples).unwrap();
        let buf = cursor.into_inner();
        assert_eq!(u32::from_be_bytes(buf[12..16].try_into().unwrap()), 1024);
        assert_eq!(u32::from_be_bytes(buf[16..20].try_into().unwrap()), 2);
        assert_eq!(box_size_at(&buf, 0), 20);
    }

    #[test]
    fn stsz_variable_lists_sizes() {
        let samples = vec![sample(0, 5000, 3000, true), sample(5000, 3000, 3000, false)];
        let mut cursor = Cursor::new(Vec::new());
        write_stsz(&mut cursor, &samples).unwrap();
        let buf = cursor.into_inner();
        assert_eq!(u32::from_be_bytes(buf[12..16].try_into().unwrap()), 0);
        assert_eq!(u32::from_be_bytes(buf[20..24].try_into().unwrap()), 5000);
        assert_eq!(u32::from_be_bytes(buf[24..28].try_into().unwrap()), 3000);
    }

    #[test]
    fn rle_durations_uniform() {
        let samples: Vec<SampleInfo> = (0..100)
            .map(|i| sample(i * 1000, 1000, 3000, i == 0))
            .collect();
        assert_eq!(run_length_encode_durations(&samples), vec![(100, 3000)]);
    }

    #[test]
    fn rle_durations_varied() {
        let samples = vec![
            sample(0, 100, 3000, true),
            sample(100, 100, 3000, false),
            sample(200, 100, 6000, false),
        ];
        assert_eq!(
            run_length_encode_durations(&samples),
            vec![(2, 3000), (1, 6000)]
        );
    }

    #[test]
    fn rle_durations_empty() {
        assert!(run_length_encode_durations(&[]).is_empty());
    }

    #[test]
    fn iso6709_formatting() {
        let loc = Location::new(37.422, -122.084).unwrap();
        assert_eq!(iso6709_string(loc), "+37.4220-122.0840/");

        let loc = Location::new(-5.5, 8.25).unwrap();
        assert_eq!(iso6709_string(loc), "-05.5000+008.2500/");
    }

    #[test]
    fn moov_with_location_has_udta() {
        let track = test_track(vec![sample(100, 5000, 11_250, true)]);
        let mut cursor = Cursor::new(Vec::new());
        let loc = Location::new(55.7539, 37.6208).unwrap();
        write_moov(&mut cursor, &track, Some(loc)).unwrap();
        let buf = cursor.into_inner();
        assert_eq!(box_type_at(&buf, 0), b"moov");
        assert!(buf.windows(4).any(|w| w == b"udta"));
        assert!(buf.windows(4).any(|w| w == &[0xA9, b'x', b'y', b'z']));
        let s = iso6709_string(loc);
        assert!(buf.windows(s.len()).any(|w| w == s.as_bytes()));
    }

    #[test]
    fn moov_without_location_has_no_udta() {
        let track = test_track(vec![sample(100, 5000, 11_250, true)]);
        let mut cursor = Cursor::new(Vec::new());
        write_moov(&mut cursor, &track, None).unwrap();
        let buf = cursor.into_inner();
        assert!(!buf.windows(4).any(|w| w == b"udta"));
        assert!(buf.windows(4).any(|w| w == b"trak"));
        assert!(buf.windows(4).any(|w| w == b"mdia"));
        assert!(buf.windows(4).any(|w| w == b"vide"));
    }
}
