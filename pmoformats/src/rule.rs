//! A single compatibility rule (`Supported` line of a profile).
//!
//! A rule is a whitespace separated list of `key:value` tokens:
//!
//! | key   | meaning                         |
//! |-------|---------------------------------|
//! | `f`   | container pattern (required)    |
//! | `v`   | video codec pattern             |
//! | `a`   | audio codec pattern             |
//! | `n`   | max audio channels              |
//! | `s`   | max audio frequency (Hz)        |
//! | `b`   | max bitrate (bit/s)             |
//! | `fps` | max framerate                   |
//! | `w`   | max video width                 |
//! | `h`   | max video height                |
//! | `m`   | mime type served for a match    |
//!
//! `si` and `se` (subtitle formats) are recognised and ignored. Any other
//! `key:value` token is an extra attribute constraint.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use tracing::trace;

use crate::errors::RuleError;
use crate::media::MediaQuery;
use crate::names::MIMETYPE_AUTO;

/// Upper bound for the compiled size of a rule pattern.
pub const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Compiles `pattern` so that it must match the whole candidate.
pub(crate) fn compile_full_match(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
}

#[derive(Debug, Clone)]
pub struct FormatRule {
    line: String,
    container: Regex,
    video_codec: Option<Regex>,
    audio_codec: Option<Regex>,
    max_channels: u64,
    max_frequency: u64,
    max_bitrate: u64,
    max_framerate: u64,
    max_width: u64,
    max_height: u64,
    extras: BTreeMap<String, Regex>,
    mime_type: String,
}

#[derive(Default)]
struct RawRule<'a> {
    container: Option<&'a str>,
    video_codec: Option<&'a str>,
    audio_codec: Option<&'a str>,
    channels: Option<&'a str>,
    frequency: Option<&'a str>,
    bitrate: Option<&'a str>,
    framerate: Option<&'a str>,
    width: Option<&'a str>,
    height: Option<&'a str>,
    mime_type: Option<&'a str>,
    extras: Vec<(&'a str, &'a str)>,
}

impl<'a> RawRule<'a> {
    fn tokenize(line: &'a str) -> Self {
        let mut raw = RawRule::default();
        for token in line.split_whitespace() {
            let Some((key, value)) = token.split_once(':') else {
                continue;
            };
            match key {
                "f" => raw.container = Some(value),
                "v" => raw.video_codec = Some(value),
                "a" => raw.audio_codec = Some(value),
                "n" => raw.channels = Some(value),
                "s" => raw.frequency = Some(value),
                "b" => raw.bitrate = Some(value),
                "fps" => raw.framerate = Some(value),
                "w" => raw.width = Some(value),
                "h" => raw.height = Some(value),
                "m" => raw.mime_type = Some(value),
                "si" | "se" => {}
                _ => raw.extras.push((key, value)),
            }
        }
        raw
    }
}

fn compile_field(line: &str, field: &str, pattern: Option<&str>) -> Result<Option<Regex>, RuleError> {
    match pattern {
        None => Ok(None),
        Some(p) => compile_full_match(p)
            .map(Some)
            .map_err(|e| RuleError::invalid_pattern(line, field, p, &e)),
    }
}

/// Parses a numeric ceiling. Zero or negative values mean "unlimited".
fn parse_ceiling(line: &str, field: &str, value: Option<&str>) -> Result<u64, RuleError> {
    match value {
        None => Ok(0),
        Some(v) => v
            .parse::<i64>()
            .map(|n| u64::try_from(n).unwrap_or(0))
            .map_err(|e| RuleError::invalid_number(line, field, v, &e)),
    }
}

/// A ceiling passes when either side is unknown or the candidate fits.
fn within(candidate: u64, ceiling: u64) -> bool {
    candidate == 0 || ceiling == 0 || candidate <= ceiling
}

impl FormatRule {
    /// Compiles one rule line. A rule with no container, an invalid
    /// pattern or a non-integer ceiling is rejected.
    pub fn compile(line: &str) -> Result<Self, RuleError> {
        let line = line.trim();
        let raw = RawRule::tokenize(line);

        let container_pattern = raw
            .container
            .filter(|c| !c.is_empty())
            .ok_or_else(|| RuleError::MissingContainer(line.to_string()))?;
        let container = compile_full_match(container_pattern)
            .map_err(|e| RuleError::invalid_pattern(line, "container", container_pattern, &e))?;

        let mut extras = BTreeMap::new();
        for (key, pattern) in &raw.extras {
            let regex = compile_full_match(pattern)
                .map_err(|e| RuleError::invalid_pattern(line, key, pattern, &e))?;
            extras.insert(key.to_ascii_lowercase(), regex);
        }

        Ok(Self {
            container,
            video_codec: compile_field(line, "video codec", raw.video_codec)?,
            audio_codec: compile_field(line, "audio codec", raw.audio_codec)?,
            max_channels: parse_ceiling(line, "channels", raw.channels)?,
            max_frequency: parse_ceiling(line, "frequency", raw.frequency)?,
            max_bitrate: parse_ceiling(line, "bitrate", raw.bitrate)?,
            max_framerate: parse_ceiling(line, "framerate", raw.framerate)?,
            max_width: parse_ceiling(line, "width", raw.width)?,
            max_height: parse_ceiling(line, "height", raw.height)?,
            extras,
            mime_type: raw
                .mime_type
                .filter(|m| !m.is_empty())
                .unwrap_or(MIMETYPE_AUTO)
                .to_string(),
            line: line.to_string(),
        })
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn matches_container(&self, container: &str) -> bool {
        self.container.is_match(container)
    }

    pub fn matches_video_codec(&self, codec: &str) -> bool {
        self.video_codec.as_ref().is_some_and(|re| re.is_match(codec))
    }

    pub fn matches_audio_codec(&self, codec: &str) -> bool {
        self.audio_codec.as_ref().is_some_and(|re| re.is_match(codec))
    }

    /// Evaluates the rule against one candidate.
    pub fn matches(&self, query: &MediaQuery<'_>) -> bool {
        if query.container.is_none() && query.video_codec.is_none() && query.audio_codec.is_none() {
            trace!(rule = %self.line, "nothing to match");
            return false;
        }

        if let Some(container) = query.container {
            if !self.container.is_match(container) {
                trace!(rule = %self.line, container, "container failed to match");
                return false;
            }
        }

        if let (Some(codec), Some(re)) = (query.video_codec, self.video_codec.as_ref()) {
            if !re.is_match(codec) {
                trace!(rule = %self.line, codec, "video codec failed to match");
                return false;
            }
        }

        if let (Some(codec), Some(re)) = (query.audio_codec, self.audio_codec.as_ref()) {
            if !re.is_match(codec) {
                trace!(rule = %self.line, codec, "audio codec failed to match");
                return false;
            }
        }

        let ceilings = [
            ("channels", query.channels, self.max_channels),
            ("frequency", query.frequency, self.max_frequency),
            ("bitrate", query.bitrate, self.max_bitrate),
            ("framerate", query.framerate, self.max_framerate),
            ("width", query.width, self.max_width),
            ("height", query.height, self.max_height),
        ];
        for (field, candidate, ceiling) in ceilings {
            if !within(candidate, ceiling) {
                trace!(rule = %self.line, field, candidate, ceiling, "value exceeds ceiling");
                return false;
            }
        }

        if let Some(extras) = query.extras {
            for (key, value) in extras {
                let Some(re) = self.extras.get(&key.to_ascii_lowercase()) else {
                    continue;
                };
                if !re.is_match(&value.to_lowercase()) {
                    trace!(rule = %self.line, key = %key, value = %value, "extra attribute failed to match");
                    return false;
                }
            }
        }

        trace!(rule = %self.line, "matched");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_compile_requires_container() {
        let err = FormatRule::compile("v:h264 a:ac3").unwrap_err();
        assert!(matches!(err, RuleError::MissingContainer(_)));
    }

    #[test]
    fn test_compile_rejects_bad_pattern() {
        let err = FormatRule::compile("f:mp(eg").unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { .. }));
    }

    #[test]
    fn test_compile_rejects_non_integer_ceiling() {
        let err = FormatRule::compile("f:mpegts b:fast").unwrap_err();
        match err {
            RuleError::InvalidNumber { field, value, .. } => {
                assert_eq!(field, "bitrate");
                assert_eq!(value, "fast");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_default_mime_is_auto() {
        let rule = FormatRule::compile("f:mp3").unwrap();
        assert_eq!(rule.mime_type(), MIMETYPE_AUTO);

        let rule = FormatRule::compile("f:mp3 m:audio/mpeg").unwrap();
        assert_eq!(rule.mime_type(), "audio/mpeg");
    }

    #[test]
    fn test_container_is_full_match() {
        let rule = FormatRule::compile("f:mpeg").unwrap();
        assert!(rule.matches(&MediaQuery::new("mpeg")));
        assert!(!rule.matches(&MediaQuery::new("mpegts")));

        let rule = FormatRule::compile("f:mpegps|mpegts").unwrap();
        assert!(rule.matches(&MediaQuery::new("mpegts")));
    }

    #[test]
    fn test_undeclared_codec_is_dont_care() {
        let rule = FormatRule::compile("f:mkv v:h264").unwrap();
        assert!(rule.matches(&MediaQuery::new("mkv").video_codec("h264").audio_codec("dts")));
        assert!(!rule.matches(&MediaQuery::new("mkv").video_codec("mpeg2")));
    }

    #[test]
    fn test_zero_means_unknown_or_unlimited() {
        let rule = FormatRule::compile("f:mp4 w:1920 h:1080 n:0").unwrap();
        assert!(rule.matches(&MediaQuery::new("mp4").resolution(0, 0)));
        assert!(rule.matches(&MediaQuery::new("mp4").resolution(1280, 720).channels(8)));
        assert!(!rule.matches(&MediaQuery::new("mp4").resolution(3840, 2160)));

        let rule = FormatRule::compile("f:mp4 w:-1").unwrap();
        assert!(rule.matches(&MediaQuery::new("mp4").resolution(3840, 2160)));
    }

    #[test]
    fn test_framerate_ceiling() {
        let rule = FormatRule::compile("f:mp4 fps:30").unwrap();
        assert!(rule.matches(&MediaQuery::new("mp4").framerate(25)));
        assert!(!rule.matches(&MediaQuery::new("mp4").framerate(60)));
    }

    #[test]
    fn test_extras_match_lowercased_value() {
        let rule = FormatRule::compile("f:avi v:mp4 qpel:no gmc:0").unwrap();
        let mut extras = HashMap::new();
        extras.insert("qpel".to_string(), "No".to_string());
        assert!(rule.matches(&MediaQuery::new("avi").video_codec("mp4").extras(&extras)));

        extras.insert("qpel".to_string(), "yes".to_string());
        assert!(!rule.matches(&MediaQuery::new("avi").video_codec("mp4").extras(&extras)));

        // Attribut absent de la règle : ignoré.
        let mut other = HashMap::new();
        other.insert("vbd".to_string(), "10".to_string());
        assert!(rule.matches(&MediaQuery::new("avi").extras(&other)));
    }

    #[test]
    fn test_empty_query_never_matches() {
        let rule = FormatRule::compile("f:.+").unwrap();
        assert!(!rule.matches(&MediaQuery::default()));
    }

    #[test]
    fn test_subtitle_tokens_are_not_extras() {
        let rule = FormatRule::compile("f:mkv si:ass|srt se:srt").unwrap();
        assert!(rule.extras.is_empty());
    }
}
