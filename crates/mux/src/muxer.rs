//! High-level MP4 muxer with a MediaMuxer-shaped lifecycle.
//!
//! ```ignore
//! let mut muxer = Mp4Muxer::new("output.mp4")?;
//! muxer.set_orientation_hint(Orientation::Deg90)?;   // before start
//! let track = muxer.add_video_track(&output_format)?; // before start
//! muxer.start()?;                                     // exactly once
//! muxer.write_sample(track, &payload, &info)?;        // in decode order
//! muxer.stop()?;                                      // writes moov
//! ```
//!
//! Sample payloads stream into the mdat box as they arrive; the moov box
//! with all sample tables is written once at `stop()`. Payloads in
//! Annex-B form (start-code delimited NAL units) are converted to the
//! length-prefixed AVCC form the avc1 sample entry declares.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use vireo_common::codec::{BufferInfo, OutputFormat};
use vireo_common::config::{Location, Orientation};
use vireo_common::types::Resolution;

use crate::atoms::{self, VIDEO_TIMESCALE};
use crate::error::{MuxError, MuxResult};
use crate::mp4::{self, SampleInfo, VideoTrackInfo};

/// The single video track id handed back by [`Mp4Muxer::add_video_track`].
const VIDEO_TRACK_ID: u32 = 1;

/// A sample recorded during writing; durations are derived from pts
/// deltas when the muxer stops.
#[derive(Debug)]
struct PendingSample {
    offset: u64,
    size: u32,
    pts_ticks: u64,
    is_sync: bool,
}

/// Per-track state while muxing.
#[derive(Debug)]
struct VideoTrack {
    resolution: Resolution,
    frame_rate: u32,
    sps: Vec<u8>,
    pps: Vec<u8>,
    samples: Vec<PendingSample>,
}

/// MP4 muxer writing one H.264 video track to a file.
pub struct Mp4Muxer {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Position of the mdat extended-size field, patched at stop.
    mdat_size_pos: u64,
    /// Byte offset where mdat payload starts.
    mdat_data_start: u64,
    track: Option<VideoTrack>,
    location: Option<Location>,
    orientation: Orientation,
    started: bool,
    stopped: bool,
}

impl Mp4Muxer {
    /// Create the output file and write the ftyp box plus the mdat
    /// placeholder. Fails with an I/O error if the path is not writable.
    pub fn new(path: impl AsRef<Path>) -> MuxResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            MuxError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to create output file {path:?}: {e}"),
            ))
        })?;
        let mut writer = BufWriter::new(file);

        mp4::write_ftyp(&mut writer)?;

        // The mdat size is unknown until stop and may pass 4 GB, so the
        // header goes down in 64-bit form and is patched later.
        let mdat_size_pos = atoms::large_box_size_placeholder(&mut writer, b"mdat")?;
        let mdat_data_start = writer.stream_position()?;

        debug!(path = %path.display(), "muxer created");

        Ok(Self {
            writer,
            path,
            mdat_size_pos,
            mdat_data_start,
            track: None,
            location: None,
            orientation: Orientation::Deg0,
            started: false,
            stopped: false,
        })
    }

    /// Store geodata in the output file (ISO-6709, udta box). Only legal
    /// before `start`.
    pub fn set_location(&mut self, location: Location) -> MuxResult<()> {
        if self.started {
            return Err(MuxError::InvalidState(
                "location must be set before start".into(),
            ));
        }
        self.location = Some(location);
        Ok(())
    }

    /// Store a playback orientation hint (track composition matrix).
    /// Does not rotate frames. Only legal before `start`.
    pub fn set_orientation_hint(&mut self, orientation: Orientation) -> MuxResult<()> {
        if self.started {
            return Err(MuxError::InvalidState(
                "orientation must be set before start".into(),
            ));
        }
        self.orientation = orientation;
        Ok(())
    }

    /// Add the video track from the encoder's negotiated output format.
    /// Exactly one track; must precede `start`.
    pub fn add_video_track(&mut self, format: &OutputFormat) -> MuxResult<u32> {
        if self.started {
            return Err(MuxError::InvalidState(
                "cannot add track after start".into(),
            ));
        }
        if self.track.is_some() {
            return Err(MuxError::Track("video track already added".into()));
        }
        if format.sps.is_empty() || format.pps.is_empty() {
            return Err(MuxError::InvalidConfig(
                "output format carries no SPS/PPS".into(),
            ));
        }

        self.track = Some(VideoTrack {
            resolution: format.resolution,
            frame_rate: format.frame_rate,
            sps: format.sps.clone(),
            pps: format.pps.clone(),
            samples: Vec::new(),
        });

        info!(
            track_id = VIDEO_TRACK_ID,
            resolution = %format.resolution,
            "video track added"
        );
        Ok(VIDEO_TRACK_ID)
    }

    /// Start the muxer. Requires the track; legal exactly once.
    pub fn start(&mut self) -> MuxResult<()> {
        if self.started {
            return Err(MuxError::InvalidState("muxer already started".into()));
        }
        if self.track.is_none() {
            return Err(MuxError::InvalidState(
                "cannot start before a track is added".into(),
            ));
        }
        self.started = true;
        info!("muxer started");
        Ok(())
    }

    /// Append one encoded access unit.
    ///
    /// Samples must arrive in decode order; they are written to the file
    /// in the order received, no reordering or cross-call buffering.
    pub fn write_sample(
        &mut self,
        track_id: u32,
        data: &[u8],
        info: &BufferInfo,
    ) -> MuxResult<()> {
        if !self.started || self.stopped {
            return Err(MuxError::InvalidState(
                "write_sample requires a started, unstopped muxer".into(),
            ));
        }
        if track_id != VIDEO_TRACK_ID || self.track.is_none() {
            return Err(MuxError::Track(format!("track {track_id} not found")));
        }

        let payload = annex_b_to_avcc(data);
        let offset = self.writer.stream_position()?;
        self.writer.write_all(&payload)?;

        let track = self
            .track
            .as_mut()
            .ok_or_else(|| MuxError::Track(format!("track {track_id} not found")))?;
        track.samples.push(PendingSample {
            offset,
            size: payload.len() as u32,
            pts_ticks: mp4::pts_to_ticks(info.presentation_time_nanos, VIDEO_TIMESCALE),
            is_sync: info.flags.key_frame,
        });

        Ok(())
    }

    /// Stop the muxer: patch the mdat size, write the moov box, flush.
    /// Legal exactly once, after `start`.
    pub fn stop(&mut self) -> MuxResult<()> {
        if !self.started {
            return Err(MuxError::InvalidState("stop before start".into()));
        }
        if self.stopped {
            return Err(MuxError::InvalidState("muxer already stopped".into()));
        }

        atoms::fill_large_box_size(&mut self.writer, self.mdat_size_pos)?;

        let track = self
            .track
            .as_ref()
            .ok_or_else(|| MuxError::InvalidState("started muxer has no track".into()))?;
        let track_info = build_track_info(track, self.orientation);
        mp4::write_moov(&mut self.writer, &track_info, self.location)?;

        self.writer.flush()?;
        self.stopped = true;

        info!(
            path = %self.path.display(),
            samples = track_info.samples.len(),
            "MP4 file finalized"
        );
        Ok(())
    }

    /// Number of samples written to the track so far.
    pub fn track_sample_count(&self, track_id: u32) -> MuxResult<usize> {
        if track_id != VIDEO_TRACK_ID {
            return Err(MuxError::Track(format!("track {track_id} not found")));
        }
        self.track
            .as_ref()
            .map(|t| t.samples.len())
            .ok_or_else(|| MuxError::Track("no video track".into()))
    }

    /// Payload bytes written into mdat so far.
    pub fn mdat_bytes_written(&mut self) -> MuxResult<u64> {
        let current = self.writer.stream_position()?;
        Ok(current - self.mdat_data_start)
    }
}

impl Drop for Mp4Muxer {
    fn drop(&mut self) {
        if self.started && !self.stopped && !std::thread::panicking() {
            warn!(
                path = %self.path.display(),
                "muxer dropped without stop(); file has no moov box and is unplayable"
            );
        }
    }
}

/// Derive per-sample durations from pts deltas and assemble the moov
/// input. The final sample inherits its predecessor's duration; a lone
/// sample falls back to one nominal frame interval.
fn build_track_info(track: &VideoTrack, rotation: Orientation) -> VideoTrackInfo {
    let default_duration = if track.frame_rate > 0 {
        VIDEO_TIMESCALE / track.frame_rate
    } else {
        VIDEO_TIMESCALE / 30
    };

    let mut samples = Vec::with_capacity(track.samples.len());
    for (i, s) in track.samples.iter().enumerate() {
        let duration = match track.samples.get(i + 1) {
            Some(next) => {
                let delta = next.pts_ticks.saturating_sub(s.pts_ticks) as u32;
                if delta == 0 {
                    default_duration
                } else {
                    delta
                }
            }
            None => samples
                .last()
                .map(|prev: &SampleInfo| prev.duration)
                .unwrap_or(default_duration),
        };
        samples.push(SampleInfo {
            offset: s.offset,
            size: s.size,
            duration,
            is_sync: s.is_sync,
        });
    }

    let duration = samples.iter().map(|s| s.duration as u64).sum();

    VideoTrackInfo {
        track_id: VIDEO_TRACK_ID,
        timescale: VIDEO_TIMESCALE,
        duration,
        resolution: track.resolution,
        rotation,
        sps: track.sps.clone(),
        pps: track.pps.clone(),
        samples,
    }
}

/// Convert an Annex-B payload (start-code delimited NAL units) to the
/// AVCC form (4-byte big-endian length prefixes). A payload with no
/// start code is treated as a single raw NAL unit.
fn annex_b_to_avcc(data: &[u8]) -> Vec<u8> {
    let starts = find_start_codes(data);
    let mut out = Vec::with_capacity(data.len() + 8);

    if starts.is_empty() {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
        return out;
    }

    for (i, &(pos, len)) in starts.iter().enumerate() {
        let nal_start = pos + len;
        let nal_end = starts.get(i + 1).map(|&(p, _)| p).unwrap_or(data.len());
        let nal = &data[nal_start..nal_end];
        if nal.is_empty() {
            continue;
        }
        out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}

/// Positions and lengths of 3- or 4-byte start codes in `data`.
fn find_start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut codes = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                codes.push((i, 3));
                i += 3;
                continue;
            }
            if i + 4 <= data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                codes.push((i, 4));
                i += 4;
                continue;
            }
        }
        i += 1;
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use vireo_common::codec::BufferFlags;

    fn temp_mp4_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("vireo_mux_test_{name}.mp4"));
        path
    }

    fn test_sps() -> Vec<u8> {
        vec![0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x02, 0x80, 0xF6, 0xC0, 0x44, 0x00, 0x00]
    }

    fn test_pps() -> Vec<u8> {
        vec![0x68, 0xCE, 0x38, 0x80]
    }

    fn test_format() -> OutputFormat {
        OutputFormat {
            resolution: Resolution::CIF,
            frame_rate: 8,
            sps: test_sps(),
            pps: test_pps(),
        }
    }

    fn fake_info(pts_nanos: i64, key_frame: bool) -> BufferInfo {
        BufferInfo {
            offset: 0,
            size: 8,
            presentation_time_nanos: pts_nanos,
            flags: BufferFlags {
                key_frame,
                ..Default::default()
            },
        }
    }

    fn fake_nal() -> Vec<u8> {
        vec![0x00, 0x00, 0x00, 0x01, 0x65, 0xAA, 0xBB, 0xCC]
    }

    fn read_file(path: &Path) -> Vec<u8> {
        let mut data = Vec::new();
        File::open(path).unwrap().read_to_end(&mut data).unwrap();
        data
    }

    #[test]
    fn full_lifecycle_box_structure() {
        let path = temp_mp4_path("lifecycle");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        let track = muxer.add_video_track(&test_format()).unwrap();
        assert_eq!(track, 1);
        muxer.start().unwrap();

        for i in 0..10 {
            let info = fake_info(i * 125_000_000, i % 5 == 0);
            muxer.write_sample(track, &fake_nal(), &info).unwrap();
        }
        assert_eq!(muxer.track_sample_count(track).unwrap(), 10);

        muxer.stop().unwrap();

        let data = read_file(&path);
        assert_eq!(&data[4..8], b"ftyp");
        for b in [
            b"mdat", b"moov", b"mvhd", b"trak", b"tkhd", b"mdia", b"mdhd", b"hdlr", b"minf",
            b"stbl", b"stsd", b"avc1", b"avcC", b"stts", b"stsc", b"stsz", b"stco", b"stss",
            b"vide",
        ] {
            assert!(data.windows(4).any(|w| w == *b), "missing box {:?}", b);
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn moov_is_last_top_level_box() {
        let path = temp_mp4_path("moov_last");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        let track = muxer.add_video_track(&test_format()).unwrap();
        muxer.start().unwrap();
        muxer
            .write_sample(track, &fake_nal(), &fake_info(0, true))
            .unwrap();
        muxer.stop().unwrap();

        let data = read_file(&path);
        let mut offset = 0usize;
        let mut last_box = [0u8; 4];
        while offset + 8 <= data.len() {
            let size = u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap());
            last_box.copy_from_slice(&data[offset + 4..offset + 8]);
            if size == 1 {
                let ext =
                    u64::from_be_bytes(data[offset + 8..offset + 16].try_into().unwrap());
                offset += ext as usize;
            } else if size == 0 {
                break;
            } else {
                offset += size as usize;
            }
        }
        assert_eq!(&last_box, b"moov");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn write_requires_start() {
        let path = temp_mp4_path("write_before_start");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        let track = muxer.add_video_track(&test_format()).unwrap();
        let err = muxer
            .write_sample(track, &fake_nal(), &fake_info(0, true))
            .unwrap_err();
        assert!(matches!(err, MuxError::InvalidState(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn start_requires_track() {
        let path = temp_mp4_path("start_no_track");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        assert!(matches!(
            muxer.start().unwrap_err(),
            MuxError::InvalidState(_)
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn start_twice_rejected() {
        let path = temp_mp4_path("double_start");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        muxer.add_video_track(&test_format()).unwrap();
        muxer.start().unwrap();
        assert!(matches!(
            muxer.start().unwrap_err(),
            MuxError::InvalidState(_)
        ));
        muxer.stop().unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn second_track_rejected() {
        let path = temp_mp4_path("second_track");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        muxer.add_video_track(&test_format()).unwrap();
        assert!(matches!(
            muxer.add_video_track(&test_format()).unwrap_err(),
            MuxError::Track(_)
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn track_after_start_rejected() {
        let path = temp_mp4_path("track_after_start");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        muxer.add_video_track(&test_format()).unwrap();
        muxer.start().unwrap();
        assert!(matches!(
            muxer.add_video_track(&test_format()).unwrap_err(),
            MuxError::InvalidState(_)
        ));
        muxer.stop().unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn write_to_unknown_track_rejected() {
        let path = temp_mp4_path("unknown_track");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        muxer.add_video_track(&test_format()).unwrap();
        muxer.start().unwrap();
        let err = muxer
            .write_sample(999, &fake_nal(), &fake_info(0, true))
            .unwrap_err();
        assert!(matches!(err, MuxError::Track(_)));
        muxer.stop().unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn stop_twice_rejected() {
        let path = temp_mp4_path("double_stop");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        muxer.add_video_track(&test_format()).unwrap();
        muxer.start().unwrap();
        muxer.stop().unwrap();
        assert!(matches!(
            muxer.stop().unwrap_err(),
            MuxError::InvalidState(_)
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn format_without_csd_rejected() {
        let path = temp_mp4_path("no_csd");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        let format = OutputFormat {
            resolution: Resolution::CIF,
            frame_rate: 8,
            sps: vec![],
            pps: vec![],
        };
        assert!(matches!(
            muxer.add_video_track(&format).unwrap_err(),
            MuxError::InvalidConfig(_)
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn hints_rejected_after_start() {
        let path = temp_mp4_path("late_hints");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        muxer.add_video_track(&test_format()).unwrap();
        muxer.start().unwrap();
        assert!(muxer
            .set_location(Location::new(0.0, 0.0).unwrap())
            .is_err());
        assert!(muxer.set_orientation_hint(Orientation::Deg90).is_err());
        muxer.stop().unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn location_lands_in_udta() {
        let path = temp_mp4_path("location");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        let loc = Location::new(37.422, -122.084).unwrap();
        muxer.set_location(loc).unwrap();
        let track = muxer.add_video_track(&test_format()).unwrap();
        muxer.start().unwrap();
        muxer
            .write_sample(track, &fake_nal(), &fake_info(0, true))
            .unwrap();
        muxer.stop().unwrap();

        let data = read_file(&path);
        let iso = mp4::iso6709_string(loc);
        assert!(data.windows(iso.len()).any(|w| w == iso.as_bytes()));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mdat_byte_accounting() {
        let path = temp_mp4_path("mdat_bytes");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        let track = muxer.add_video_track(&test_format()).unwrap();
        muxer.start().unwrap();
        assert_eq!(muxer.mdat_bytes_written().unwrap(), 0);

        // 8-byte Annex-B payload converts to 4-byte length + 4-byte NAL
        muxer
            .write_sample(track, &fake_nal(), &fake_info(0, true))
            .unwrap();
        assert_eq!(muxer.mdat_bytes_written().unwrap(), 8);
        muxer.stop().unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_track_stops_cleanly() {
        let path = temp_mp4_path("empty_track");
        let mut muxer = Mp4Muxer::new(&path).unwrap();
        muxer.add_video_track(&test_format()).unwrap();
        muxer.start().unwrap();
        muxer.stop().unwrap();
        assert!(path.exists());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn annexb_four_byte_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, //
            0x00, 0x00, 0x00, 0x01, 0x65, 0xAA, 0xBB,
        ];
        let out = annex_b_to_avcc(&data);
        assert_eq!(
            out,
            vec![
                0x00, 0x00, 0x00, 0x02, 0x67, 0x42, //
                0x00, 0x00, 0x00, 0x03, 0x65, 0xAA, 0xBB,
            ]
        );
    }

    #[test]
    fn annexb_three_byte_start_codes() {
        let data = [0x00, 0x00, 0x01, 0x65, 0x11, 0x22, 0x33];
        let out = annex_b_to_avcc(&data);
        assert_eq!(out, vec![0x00, 0x00, 0x00, 0x04, 0x65, 0x11, 0x22, 0x33]);
    }

    #[test]
    fn raw_nal_gets_length_prefixed() {
        let data = [0x65, 0x01, 0x02];
        let out = annex_b_to_avcc(&data);
        assert_eq!(out, vec![0x00, 0x00, 0x00, 0x03, 0x65, 0x01, 0x02]);
    }

    #[test]
    fn durations_from_pts_deltas() {
        let track = VideoTrack {
            resolution: Resolution::CIF,
            frame_rate: 8,
            sps: test_sps(),
            pps: test_pps(),
            samples: vec![
                PendingSample {
                    offset: 0,
                    size: 10,
                    pts_ticks: 0,
                    is_sync: true,
                },
                PendingSample {
                    offset: 10,
                    size: 10,
                    pts_ticks: 11_250,
                    is_sync: false,
                },
                PendingSample {
                    offset: 20,
                    size: 10,
                    pts_ticks: 22_500,
                    is_sync: false,
                },
            ],
        };
        let info = build_track_info(&track, Orientation::Deg0);
        // 8 fps at 90kHz = 11250 ticks per frame; last sample inherits
        assert_eq!(
            info.samples.iter().map(|s| s.duration).collect::<Vec<_>>(),
            vec![11_250, 11_250, 11_250]
        );
        assert_eq!(info.duration, 33_750);
    }

    #[test]
    fn lone_sample_uses_nominal_duration() {
        let track = VideoTrack {
            resolution: Resolution::CIF,
            frame_rate: 8,
            sps: test_sps(),
            pps: test_pps(),
            samples: vec![PendingSample {
                offset: 0,
                size: 10,
                pts_ticks: 0,
                is_sync: true,
            }],
        };
        let info = build_track_info(&track, Orientation::Deg0);
        assert_eq!(info.samples[0].duration, VIDEO_TIMESCALE / 8);
    }
}
