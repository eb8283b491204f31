//! Media descriptors evaluated by the rule engine.
//!
//! [`MediaQuery`] is the flat, borrowed view a single [`FormatRule`](crate::FormatRule)
//! is evaluated against. [`MediaInfo`] is the owned, multi-track descriptor of a
//! media item; it produces one query per audio track.

use std::collections::HashMap;

/// One candidate (container, codecs, limits) presented to the rules.
///
/// Numeric fields use `0` for "unknown": an unknown value never fails a
/// ceiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaQuery<'a> {
    pub container: Option<&'a str>,
    pub video_codec: Option<&'a str>,
    pub audio_codec: Option<&'a str>,
    pub channels: u64,
    pub frequency: u64,
    pub bitrate: u64,
    pub framerate: u64,
    pub width: u64,
    pub height: u64,
    pub extras: Option<&'a HashMap<String, String>>,
}

impl<'a> MediaQuery<'a> {
    pub fn new(container: &'a str) -> Self {
        Self {
            container: Some(container),
            ..Self::default()
        }
    }

    pub fn video_codec(mut self, codec: &'a str) -> Self {
        self.video_codec = Some(codec);
        self
    }

    pub fn audio_codec(mut self, codec: &'a str) -> Self {
        self.audio_codec = Some(codec);
        self
    }

    pub fn channels(mut self, channels: u64) -> Self {
        self.channels = channels;
        self
    }

    pub fn frequency(mut self, frequency: u64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn framerate(mut self, framerate: u64) -> Self {
        self.framerate = framerate;
        self
    }

    pub fn resolution(mut self, width: u64, height: u64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn extras(mut self, extras: &'a HashMap<String, String>) -> Self {
        self.extras = Some(extras);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct VideoTrack {
    pub codec: Option<String>,
    pub width: u64,
    pub height: u64,
    /// Extra attributes such as `qpel`, `gmc` or `gop`, keyed in lower case.
    pub extras: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct AudioTrack {
    pub codec: Option<String>,
    pub channels: u64,
    pub sample_rate: u64,
    pub bitrate: u64,
}

/// Descripteur complet d'un média : conteneur, piste vidéo éventuelle et
/// pistes audio.
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub container: Option<String>,
    /// Overall bitrate in bits per second.
    pub bitrate: u64,
    pub framerate: Option<f64>,
    pub video: Option<VideoTrack>,
    pub audio_tracks: Vec<AudioTrack>,
    /// MPEG-4 SLS: a lossless extension layered over a lossy core. Only the
    /// core (first) audio track is presented to the rules.
    pub sls: bool,
}

impl MediaInfo {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: Some(container.into()),
            ..Self::default()
        }
    }

    pub fn with_video(mut self, video: VideoTrack) -> Self {
        self.video = Some(video);
        self
    }

    pub fn with_audio(mut self, audio: AudioTrack) -> Self {
        self.audio_tracks.push(audio);
        self
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn is_video(&self) -> bool {
        self.video.is_some()
    }

    fn rounded_framerate(&self) -> u64 {
        match self.framerate {
            Some(fps) if fps.is_finite() && fps > 0.0 => fps.round() as u64,
            _ => 0,
        }
    }

    /// Builds the query for this media item paired with one audio track
    /// (or none).
    pub fn query<'a>(&'a self, audio: Option<&'a AudioTrack>) -> MediaQuery<'a> {
        let video = self.video.as_ref();
        MediaQuery {
            container: self.container.as_deref(),
            video_codec: video.and_then(|v| v.codec.as_deref()),
            audio_codec: audio.and_then(|a| a.codec.as_deref()),
            channels: audio.map(|a| a.channels).unwrap_or(0),
            frequency: audio.map(|a| a.sample_rate).unwrap_or(0),
            bitrate: self.bitrate,
            framerate: self.rounded_framerate(),
            width: video.map(|v| v.width).unwrap_or(0),
            height: video.map(|v| v.height).unwrap_or(0),
            extras: video.map(|v| &v.extras),
        }
    }
}

impl AudioTrack {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: Some(codec.into()),
            ..Self::default()
        }
    }

    pub fn with_channels(mut self, channels: u64) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u64) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

impl VideoTrack {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: Some(codec.into()),
            ..Self::default()
        }
    }

    pub fn with_resolution(mut self, width: u64, height: u64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extras.insert(key.to_ascii_lowercase(), value.into());
        self
    }
}
