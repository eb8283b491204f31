//! Transcode targets and output mime type selection.

use std::fmt;

use pmoformats::names::{AAC_LC, AC3, H264, H265, LPCM, MP3, MPEG2, MPEGPS, MPEGTS, MPEGTS_HLS, WAV, WMA, WMV};

pub const MPEG_TYPEMIME: &str = "video/mpeg";
pub const MPEGTS_TYPEMIME: &str = "video/vnd.dlna.mpeg-tts";
pub const HLS_TYPEMIME: &str = "application/x-mpegURL";
pub const WMV_TYPEMIME: &str = "video/x-ms-wmv";
pub const AUDIO_LPCM_TYPEMIME: &str = "audio/L16";
pub const AUDIO_MP3_TYPEMIME: &str = "audio/mpeg";
pub const AUDIO_WAV_TYPEMIME: &str = "audio/wav";

/// Video transcoding target (`TranscodeVideo` profile key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoTranscode {
    HlsMpegtsH264Ac3,
    HlsMpegtsH264Aac,
    MpegtsH264Ac3,
    MpegtsH264Aac,
    MpegtsH265Ac3,
    MpegtsH265Aac,
    MpegtsMpeg2Ac3,
    Wmv,
    #[default]
    MpegpsMpeg2Ac3,
}

impl VideoTranscode {
    /// Parses the profile value, `None` when unknown.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        Some(match normalized.as_str() {
            "HLS-MPEGTS-H264-AC3" => VideoTranscode::HlsMpegtsH264Ac3,
            "HLS-MPEGTS-H264-AAC" => VideoTranscode::HlsMpegtsH264Aac,
            "MPEGTS-H264-AC3" => VideoTranscode::MpegtsH264Ac3,
            "MPEGTS-H264-AAC" => VideoTranscode::MpegtsH264Aac,
            "MPEGTS-H265-AC3" => VideoTranscode::MpegtsH265Ac3,
            "MPEGTS-H265-AAC" => VideoTranscode::MpegtsH265Aac,
            "MPEGTS-MPEG2-AC3" => VideoTranscode::MpegtsMpeg2Ac3,
            "WMV" => VideoTranscode::Wmv,
            "MPEGPS-MPEG2-AC3" => VideoTranscode::MpegpsMpeg2Ac3,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoTranscode::HlsMpegtsH264Ac3 => "HLS-MPEGTS-H264-AC3",
            VideoTranscode::HlsMpegtsH264Aac => "HLS-MPEGTS-H264-AAC",
            VideoTranscode::MpegtsH264Ac3 => "MPEGTS-H264-AC3",
            VideoTranscode::MpegtsH264Aac => "MPEGTS-H264-AAC",
            VideoTranscode::MpegtsH265Ac3 => "MPEGTS-H265-AC3",
            VideoTranscode::MpegtsH265Aac => "MPEGTS-H265-AAC",
            VideoTranscode::MpegtsMpeg2Ac3 => "MPEGTS-MPEG2-AC3",
            VideoTranscode::Wmv => "WMV",
            VideoTranscode::MpegpsMpeg2Ac3 => "MPEGPS-MPEG2-AC3",
        }
    }

    /// (container, video codec, audio codec) presented to the rules.
    pub fn format(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            VideoTranscode::HlsMpegtsH264Ac3 => (MPEGTS_HLS, H264, AC3),
            VideoTranscode::HlsMpegtsH264Aac => (MPEGTS_HLS, H264, AAC_LC),
            VideoTranscode::MpegtsH264Ac3 => (MPEGTS, H264, AC3),
            VideoTranscode::MpegtsH264Aac => (MPEGTS, H264, AAC_LC),
            VideoTranscode::MpegtsH265Ac3 => (MPEGTS, H265, AC3),
            VideoTranscode::MpegtsH265Aac => (MPEGTS, H265, AAC_LC),
            VideoTranscode::MpegtsMpeg2Ac3 => (MPEGTS, MPEG2, AC3),
            VideoTranscode::Wmv => (WMV, WMV, WMA),
            VideoTranscode::MpegpsMpeg2Ac3 => (MPEGPS, MPEG2, AC3),
        }
    }

    pub fn is_hls(&self) -> bool {
        matches!(self, VideoTranscode::HlsMpegtsH264Ac3 | VideoTranscode::HlsMpegtsH264Aac)
    }

    pub fn is_mpegts(&self) -> bool {
        !matches!(self, VideoTranscode::Wmv | VideoTranscode::MpegpsMpeg2Ac3)
    }

    /// Mime type used when no rule of the profile covers the target.
    pub fn stock_mime(&self) -> &'static str {
        if *self == VideoTranscode::Wmv {
            WMV_TYPEMIME
        } else if self.is_hls() {
            HLS_TYPEMIME
        } else if self.is_mpegts() {
            MPEGTS_TYPEMIME
        } else {
            MPEG_TYPEMIME
        }
    }
}

impl fmt::Display for VideoTranscode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio transcoding target (`TranscodeAudio` profile key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioTranscode {
    #[default]
    Lpcm,
    Mp3,
    Wav,
}

impl AudioTranscode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LPCM" => Some(AudioTranscode::Lpcm),
            "MP3" => Some(AudioTranscode::Mp3),
            "WAV" => Some(AudioTranscode::Wav),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioTranscode::Lpcm => "LPCM",
            AudioTranscode::Mp3 => "MP3",
            AudioTranscode::Wav => "WAV",
        }
    }

    pub fn container(&self) -> &'static str {
        match self {
            AudioTranscode::Lpcm => LPCM,
            AudioTranscode::Mp3 => MP3,
            AudioTranscode::Wav => WAV,
        }
    }

    pub fn stock_mime(&self) -> &'static str {
        match self {
            AudioTranscode::Lpcm => AUDIO_LPCM_TYPEMIME,
            AudioTranscode::Mp3 => AUDIO_MP3_TYPEMIME,
            AudioTranscode::Wav => AUDIO_WAV_TYPEMIME,
        }
    }
}

impl fmt::Display for AudioTranscode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `;rate=…;channels=…` suffix of an LPCM stream.
///
/// With resampling the output is stereo at 44.1 or 48 kHz; otherwise the
/// source values are used when known.
pub fn lpcm_suffix(resample: bool, to_44k: bool, source_rate: u64, source_channels: u64) -> String {
    if resample {
        let rate = if to_44k { 44100 } else { 48000 };
        return format!(";rate={rate};channels=2");
    }
    let mut suffix = String::new();
    if source_rate > 0 {
        suffix.push_str(&format!(";rate={source_rate}"));
    }
    if source_channels > 0 {
        suffix.push_str(&format!(";channels={source_channels}"));
    }
    suffix
}

/// Parses `MimeTypesChanges` entries (`old=new`), keys lower-cased.
pub fn parse_aliases<I, S>(entries: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter_map(|entry| {
            let (old, new) = entry.as_ref().split_once('=')?;
            let (old, new) = (old.trim(), new.trim());
            (!old.is_empty() && !new.is_empty()).then(|| (old.to_lowercase(), new.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_targets() {
        assert_eq!(VideoTranscode::parse("mpegts-h264-ac3"), Some(VideoTranscode::MpegtsH264Ac3));
        assert_eq!(VideoTranscode::parse("MPEGPSMPEG2AC3"), None);
        assert_eq!(VideoTranscode::default().format(), (MPEGPS, MPEG2, AC3));
        assert_eq!(VideoTranscode::HlsMpegtsH264Aac.stock_mime(), HLS_TYPEMIME);
        assert_eq!(VideoTranscode::MpegtsH265Aac.stock_mime(), MPEGTS_TYPEMIME);
        assert_eq!(VideoTranscode::Wmv.stock_mime(), WMV_TYPEMIME);
        assert_eq!(VideoTranscode::MpegpsMpeg2Ac3.stock_mime(), MPEG_TYPEMIME);
    }

    #[test]
    fn test_lpcm_suffix() {
        assert_eq!(lpcm_suffix(true, true, 96000, 6), ";rate=44100;channels=2");
        assert_eq!(lpcm_suffix(true, false, 0, 0), ";rate=48000;channels=2");
        assert_eq!(lpcm_suffix(false, false, 96000, 6), ";rate=96000;channels=6");
        assert_eq!(lpcm_suffix(false, false, 0, 2), ";channels=2");
    }

    #[test]
    fn test_aliases() {
        let aliases = parse_aliases(["Video/AVI=video/x-divx", "broken", "audio/wav = audio/L16"]);
        assert_eq!(
            aliases,
            vec![
                ("video/avi".to_string(), "video/x-divx".to_string()),
                ("audio/wav".to_string(), "audio/L16".to_string())
            ]
        );
    }
}
