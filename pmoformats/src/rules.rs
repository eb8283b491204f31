//! Ordered rule set of a profile.

use tracing::{debug, trace, warn};

use crate::errors::RuleError;
use crate::media::{MediaInfo, MediaQuery};
use crate::names::{DTS, H264, LPCM, MPEG2, MPEGPS, MPEGTS};
use crate::rule::FormatRule;

/// Result of compiling a list of rule lines: the valid rules, in declared
/// order, and one diagnostic per dropped line.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    pub rules: FormatRules,
    pub dropped: Vec<RuleError>,
}

#[derive(Debug, Clone, Default)]
pub struct FormatRules {
    rules: Vec<FormatRule>,
}

impl FormatRules {
    /// Compiles every line. Blank lines are skipped, invalid lines are
    /// reported in [`CompiledRules::dropped`] and never abort the others.
    pub fn compile<I, S>(lines: I) -> CompiledRules
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = CompiledRules::default();
        for line in lines {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            match FormatRule::compile(line) {
                Ok(rule) => compiled.rules.rules.push(rule),
                Err(err) => compiled.dropped.push(err),
            }
        }
        compiled
    }

    /// Same as [`FormatRules::compile`], logging and discarding diagnostics.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let compiled = Self::compile(lines);
        for err in &compiled.dropped {
            warn!(error = %err, "Dropping invalid Supported rule");
        }
        compiled.rules
    }

    /// A rule set accepting any container (`f:.+`).
    pub fn accept_all() -> Self {
        Self::from_lines(["f:.+"])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormatRule> {
        self.rules.iter()
    }

    /// First matching rule, in declared order.
    pub fn first_match(&self, query: &MediaQuery<'_>) -> Option<&FormatRule> {
        self.rules.iter().find(|rule| rule.matches(query))
    }

    /// Mime type of the first matching rule, `None` when the candidate is
    /// not natively supported.
    pub fn matched_mime_type(&self, query: &MediaQuery<'_>) -> Option<&str> {
        self.first_match(query).map(FormatRule::mime_type)
    }

    /// Evaluates a whole media item.
    ///
    /// Every audio track must match on its own; a single failing track makes
    /// the item unsupported. The returned mime type is the one matched for
    /// the first track. For MPEG-4 SLS items only the core track is checked.
    pub fn match_media(&self, media: &MediaInfo) -> Option<&str> {
        if media.audio_tracks.is_empty() {
            return self.matched_mime_type(&media.query(None));
        }

        if media.sls {
            let core = &media.audio_tracks[0];
            let mut query = media.query(Some(core));
            if core.bitrate > 0 {
                query.bitrate = core.bitrate;
            }
            return self.matched_mime_type(&query);
        }

        let mut mime = None;
        for (index, track) in media.audio_tracks.iter().enumerate() {
            match self.matched_mime_type(&media.query(Some(track))) {
                Some(m) => {
                    trace!(track = index, mime = m, "audio track supported");
                    mime.get_or_insert(m);
                }
                None => {
                    debug!(
                        track = index,
                        codec = ?track.codec,
                        "audio track not supported, the media must be transcoded"
                    );
                    return None;
                }
            }
        }
        mime
    }

    pub fn is_format_supported(&self, container: &str) -> bool {
        self.matched_mime_type(&MediaQuery::new(container)).is_some()
    }

    fn supported_in_mpeg(&self, video: Option<&str>, audio: Option<&str>) -> bool {
        [MPEGPS, MPEGTS].into_iter().any(|container| {
            let query = MediaQuery {
                container: Some(container),
                video_codec: video,
                audio_codec: audio,
                ..MediaQuery::default()
            };
            self.matched_mime_type(&query).is_some()
        })
    }

    pub fn is_dts_supported(&self) -> bool {
        self.supported_in_mpeg(None, Some(DTS))
    }

    pub fn is_lpcm_supported(&self) -> bool {
        self.supported_in_mpeg(None, Some(LPCM))
    }

    pub fn is_mpeg2_supported(&self) -> bool {
        self.supported_in_mpeg(Some(MPEG2), None)
    }

    /// Whether H.264 video can be remuxed into MPEG-TS without re-encoding.
    pub fn is_muxable_h264_mpegts(&self) -> bool {
        self.matched_mime_type(&MediaQuery::new(MPEGTS).video_codec(H264))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{AudioTrack, VideoTrack};

    #[test]
    fn test_invalid_lines_are_dropped_not_fatal() {
        let compiled = FormatRules::compile([
            "f:mpegts v:h264 a:ac3",
            "f:mp(3",
            "",
            "f:wav n:two",
            "f:flac m:audio/flac",
        ]);
        assert_eq!(compiled.rules.len(), 2);
        assert_eq!(compiled.dropped.len(), 2);
        assert_eq!(compiled.dropped[0].rule(), "f:mp(3");
    }

    #[test]
    fn test_first_match_wins() {
        let rules = FormatRules::from_lines([
            "f:mp3 m:audio/mpeg",
            "f:mp3|wav m:audio/other",
        ]);
        assert_eq!(rules.matched_mime_type(&MediaQuery::new("mp3")), Some("audio/mpeg"));
        assert_eq!(rules.matched_mime_type(&MediaQuery::new("wav")), Some("audio/other"));
        assert_eq!(rules.matched_mime_type(&MediaQuery::new("ogg")), None);
    }

    #[test]
    fn test_probes() {
        let rules = FormatRules::from_lines([
            "f:mpegps v:mpeg2 a:ac3|lpcm m:video/mpeg",
            "f:mpegts v:h264|mpeg2 a:ac3|dts m:video/vnd.dlna.mpeg-tts",
        ]);
        assert!(rules.is_dts_supported());
        assert!(rules.is_lpcm_supported());
        assert!(rules.is_mpeg2_supported());
        assert!(rules.is_muxable_h264_mpegts());
        assert!(rules.is_format_supported("mpegps"));
        assert!(!rules.is_format_supported("mkv"));

        let none = FormatRules::default();
        assert!(!none.is_dts_supported());
        assert!(none.is_empty());
    }

    #[test]
    fn test_video_without_audio() {
        let rules = FormatRules::from_lines(["f:mp4 v:h264 w:1920 h:1080 m:video/mp4"]);
        let media = MediaInfo::new("mp4").with_video(VideoTrack::new("h264").with_resolution(1920, 1080));
        assert_eq!(rules.match_media(&media), Some("video/mp4"));
    }

    #[test]
    fn test_sls_checks_core_track_only() {
        let rules = FormatRules::from_lines(["f:mp4 a:aac-lc m:audio/mp4"]);
        let mut media = MediaInfo::new("mp4")
            .with_audio(AudioTrack::new("aac-lc"))
            .with_audio(AudioTrack::new("sls"));
        assert_eq!(rules.match_media(&media), None);
        media.sls = true;
        assert_eq!(rules.match_media(&media), Some("audio/mp4"));
    }
}
