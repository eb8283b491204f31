//! Capability profiles.
//!
//! A [`CapabilityProfile`] is the compiled, immutable form of one `.conf`
//! file. Reloading a file builds a new profile and swaps it into the
//! [`ProfileHandle`] shared by the collection and the associations bound to
//! it.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use pmoformats::names::MIMETYPE_AUTO;
use pmoformats::{FormatRules, MediaInfo, MediaQuery, RuleError};
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::ProfileError;
use crate::headers::{HeaderMatcher, SortedHeaders, USER_AGENT};
use crate::mime::{self, AudioTranscode, VideoTranscode};
use crate::profile_file::ProfileFile;
use crate::upnp::{UpnpDetails, UpnpMatcher};

pub const KEY_RENDERER_NAME: &str = "RendererName";
pub const KEY_RENDERER_ICON: &str = "RendererIcon";
pub const KEY_LOADING_PRIORITY: &str = "LoadingPriority";
pub const KEY_USER_AGENT: &str = "UserAgentSearch";
pub const KEY_USER_AGENT_ADDITIONAL_HEADER: &str = "UserAgentAdditionalHeader";
pub const KEY_USER_AGENT_ADDITIONAL_SEARCH: &str = "UserAgentAdditionalHeaderSearch";
pub const KEY_UPNP_DETAILS: &str = "UpnpDetailsSearch";
pub const KEY_UPNP_ALLOW: &str = "UpnpAllow";
pub const KEY_SUPPORTED: &str = "Supported";
pub const KEY_VIDEO: &str = "Video";
pub const KEY_AUDIO: &str = "Audio";
pub const KEY_IMAGE: &str = "Image";
pub const KEY_TRANSCODE_VIDEO: &str = "TranscodeVideo";
pub const KEY_TRANSCODE_AUDIO: &str = "TranscodeAudio";
pub const KEY_TRANSCODE_AUDIO_441KHZ: &str = "TranscodeAudioTo441kHz";
pub const KEY_MAX_VIDEO_WIDTH: &str = "MaxVideoWidth";
pub const KEY_MAX_VIDEO_HEIGHT: &str = "MaxVideoHeight";
pub const KEY_MAX_VIDEO_BITRATE: &str = "MaxVideoBitrateMbps";
pub const KEY_MIME_TYPES_CHANGES: &str = "MimeTypesChanges";
pub const KEY_DEVICE_ID: &str = "Device";

/// Name of the built-in fallback profile.
pub const DEFAULT_PROFILE_NAME: &str = "Unknown renderer";

const BUILTIN_DEFAULT: &str = "\
RendererName = Unknown renderer
Supported = f:.+
";

/// How the server may drive a device through UPnP (`UpnpAllow`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum UpnpMode {
    #[default]
    Allow,
    Postpone,
    Block,
}

impl UpnpMode {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("false") => UpnpMode::Block,
            Some("postpone") => UpnpMode::Postpone,
            _ => UpnpMode::Allow,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub video: bool,
    pub audio: bool,
    pub image: bool,
    #[serde(serialize_with = "serialize_display")]
    pub transcode_video: VideoTranscode,
    #[serde(serialize_with = "serialize_display")]
    pub transcode_audio: AudioTranscode,
    pub transcode_audio_to_441khz: bool,
    /// 0 means unlimited.
    pub max_video_width: u64,
    pub max_video_height: u64,
    pub max_video_bitrate_mbps: u64,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
            image: true,
            transcode_video: VideoTranscode::default(),
            transcode_audio: AudioTranscode::default(),
            transcode_audio_to_441khz: false,
            max_video_width: 0,
            max_video_height: 0,
            max_video_bitrate_mbps: 0,
        }
    }
}

fn serialize_display<T: std::fmt::Display, S: serde::Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

/// Kind of stream a mime type is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind<'a> {
    /// Item served as is, with its own mime type.
    Native(&'a str),
    VideoTranscode,
    AudioTranscode,
}

/// Outcome of matching a media item against a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// The device plays the item as is, served with this mime type.
    Native(String),
    /// The item must be transcoded; the output is served with this mime type.
    Transcode(String),
    /// The device does not handle this kind of media at all.
    Unsupported,
}

/// Short description of a profile, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub priority: i32,
    pub rank: usize,
    pub file: Option<PathBuf>,
    pub header_pattern: Option<String>,
    pub upnp_pattern: Option<String>,
    pub rules: usize,
    pub dropped_rules: usize,
    pub upnp_mode: UpnpMode,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone)]
pub struct CapabilityProfile {
    name: String,
    priority: i32,
    rank: usize,
    file: Option<PathBuf>,
    properties: ProfileFile,
    header_matcher: Option<HeaderMatcher>,
    upnp_matcher: Option<UpnpMatcher>,
    rules: FormatRules,
    dropped_rules: Vec<RuleError>,
    capabilities: Capabilities,
    upnp_mode: UpnpMode,
    mime_aliases: Vec<(String, String)>,
    icon: Option<String>,
}

fn file_stem_name(file: Option<&Path>) -> Option<String> {
    file.and_then(|f| f.file_stem())
        .map(|s| s.to_string_lossy().to_string())
}

fn parse_limit(properties: &ProfileFile, profile: &str, key: &str) -> Result<u64, ProfileError> {
    match properties.get_int(key) {
        Ok(value) => Ok(value.map(|v| u64::try_from(v).unwrap_or(0)).unwrap_or(0)),
        Err(value) => Err(ProfileError::invalid_value(profile, key, &value)),
    }
}

impl CapabilityProfile {
    /// Compiles a parsed profile file.
    ///
    /// An invalid header or UPnP pattern, or a non-integer priority or
    /// limit, rejects the whole profile. Invalid `Supported` rules are
    /// dropped individually and kept as diagnostics.
    pub fn compile(properties: ProfileFile, file: Option<PathBuf>) -> Result<Self, ProfileError> {
        let name = properties
            .get(KEY_RENDERER_NAME)
            .map(str::to_string)
            .or_else(|| file_stem_name(file.as_deref()))
            .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string());

        let priority = match properties.get_int(KEY_LOADING_PRIORITY) {
            Ok(p) => p.unwrap_or(0).clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            Err(value) => return Err(ProfileError::invalid_value(&name, KEY_LOADING_PRIORITY, &value)),
        };

        let user_agent = properties.get(KEY_USER_AGENT).unwrap_or("");
        let additional_header = properties.get(KEY_USER_AGENT_ADDITIONAL_HEADER).unwrap_or("");
        let additional_search = properties.get(KEY_USER_AGENT_ADDITIONAL_SEARCH).unwrap_or("");
        let mut criteria = vec![(USER_AGENT, user_agent)];
        if !additional_header.trim().is_empty() {
            criteria.push((additional_header, additional_search));
        }
        let header_matcher = HeaderMatcher::compile(criteria.iter().copied()).map_err(|e| {
            let pattern = [user_agent, additional_search].join(" ");
            ProfileError::invalid_pattern(&name, KEY_USER_AGENT, pattern.trim(), &e)
        })?;

        let upnp_search = properties.get(KEY_UPNP_DETAILS).unwrap_or("");
        let upnp_matcher = UpnpMatcher::compile(upnp_search)
            .map_err(|e| ProfileError::invalid_pattern(&name, KEY_UPNP_DETAILS, upnp_search, &e))?;

        let compiled = FormatRules::compile(properties.get_all(KEY_SUPPORTED));
        for err in &compiled.dropped {
            warn!(profile = %name, error = %err, "Dropping invalid Supported rule");
        }

        let transcode_video = match properties.get(KEY_TRANSCODE_VIDEO) {
            None => VideoTranscode::default(),
            Some(v) => VideoTranscode::parse(v).unwrap_or_else(|| {
                warn!(profile = %name, value = v, "Unknown TranscodeVideo target, using default");
                VideoTranscode::default()
            }),
        };
        let transcode_audio = match properties.get(KEY_TRANSCODE_AUDIO) {
            None => AudioTranscode::default(),
            Some(v) => AudioTranscode::parse(v).unwrap_or_else(|| {
                warn!(profile = %name, value = v, "Unknown TranscodeAudio target, using default");
                AudioTranscode::default()
            }),
        };

        let capabilities = Capabilities {
            video: properties.get_bool(KEY_VIDEO, true),
            audio: properties.get_bool(KEY_AUDIO, true),
            image: properties.get_bool(KEY_IMAGE, true),
            transcode_video,
            transcode_audio,
            transcode_audio_to_441khz: properties.get_bool(KEY_TRANSCODE_AUDIO_441KHZ, false),
            max_video_width: parse_limit(&properties, &name, KEY_MAX_VIDEO_WIDTH)?,
            max_video_height: parse_limit(&properties, &name, KEY_MAX_VIDEO_HEIGHT)?,
            max_video_bitrate_mbps: parse_limit(&properties, &name, KEY_MAX_VIDEO_BITRATE)?,
        };

        let mime_aliases = mime::parse_aliases(properties.get_list(KEY_MIME_TYPES_CHANGES, &['|']));
        let upnp_mode = UpnpMode::parse(properties.get(KEY_UPNP_ALLOW));
        let icon = properties.get(KEY_RENDERER_ICON).map(str::to_string);

        debug!(
            profile = %name,
            priority,
            rules = compiled.rules.len(),
            dropped = compiled.dropped.len(),
            "Compiled renderer profile"
        );

        Ok(Self {
            name,
            priority,
            rank: 0,
            file,
            properties,
            header_matcher,
            upnp_matcher,
            rules: compiled.rules,
            dropped_rules: compiled.dropped,
            capabilities,
            upnp_mode,
            mime_aliases,
            icon,
        })
    }

    /// The always-available fallback profile.
    pub fn builtin_default() -> Self {
        let properties = ProfileFile::parse(BUILTIN_DEFAULT);
        Self {
            name: DEFAULT_PROFILE_NAME.to_string(),
            priority: 0,
            rank: 0,
            file: None,
            header_matcher: None,
            upnp_matcher: None,
            rules: FormatRules::from_lines(properties.get_all(KEY_SUPPORTED)),
            dropped_rules: Vec::new(),
            capabilities: Capabilities::default(),
            upnp_mode: UpnpMode::Allow,
            mime_aliases: Vec::new(),
            icon: None,
            properties,
        }
    }

    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = rank;
        self
    }

    /// Recompiles this profile with a device override layer on top.
    ///
    /// Name, priority, rank and backing file stay those of the base profile.
    pub fn with_overrides(&self, overrides: &ProfileFile) -> Result<Self, ProfileError> {
        let merged = self.properties.overlay(overrides);
        let mut profile = Self::compile(merged, self.file.clone())?;
        profile.name = self.name.clone();
        profile.priority = self.priority;
        profile.rank = self.rank;
        Ok(profile)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn properties(&self) -> &ProfileFile {
        &self.properties
    }

    pub fn rules(&self) -> &FormatRules {
        &self.rules
    }

    pub fn dropped_rules(&self) -> &[RuleError] {
        &self.dropped_rules
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn upnp_mode(&self) -> UpnpMode {
        self.upnp_mode
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    /// Group of the profile: its name up to the first space.
    pub fn group(&self) -> &str {
        self.name.split(' ').next().unwrap_or(&self.name)
    }

    /// A profile carrying `Device` is a per-device override file, not a
    /// renderer profile.
    pub fn is_device_file(&self) -> bool {
        self.properties.contains_key(KEY_DEVICE_ID)
    }

    pub fn header_pattern(&self) -> Option<&str> {
        self.header_matcher.as_ref().map(HeaderMatcher::as_str)
    }

    pub fn upnp_pattern(&self) -> Option<&str> {
        self.upnp_matcher.as_ref().map(UpnpMatcher::as_str)
    }

    /// False when the profile has no header criteria or `headers` is empty.
    pub fn match_headers(&self, headers: &SortedHeaders) -> bool {
        self.header_matcher
            .as_ref()
            .is_some_and(|m| m.is_match(headers))
    }

    pub fn match_upnp_details(&self, details: &UpnpDetails) -> bool {
        self.upnp_matcher.as_ref().is_some_and(|m| m.is_match(details))
    }

    /// Priority descending, then case-insensitive name.
    pub fn ordering(a: &Self, b: &Self) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    }

    /// Applies the `MimeTypesChanges` aliases.
    pub fn alias(&self, mime: &str) -> String {
        let lower = mime.to_lowercase();
        self.mime_aliases
            .iter()
            .find(|(old, _)| *old == lower)
            .map(|(_, new)| new.clone())
            .unwrap_or_else(|| mime.to_string())
    }

    fn rule_mime(&self, query: &MediaQuery<'_>) -> Option<String> {
        self.rules
            .matched_mime_type(query)
            .filter(|m| *m != MIMETYPE_AUTO)
            .map(str::to_string)
    }

    /// Mime type announced for a stream of the given kind.
    ///
    /// For transcoded streams the profile's target is looked up in its own
    /// rules first, then in the stock mime types. LPCM gets its
    /// `;rate=…;channels=…` suffix. Aliases are applied last.
    pub fn mime_type(&self, kind: StreamKind<'_>, media: Option<&MediaInfo>, audio_resample: bool) -> String {
        let matched = match kind {
            StreamKind::Native(mime) => mime.to_string(),
            StreamKind::VideoTranscode => {
                let target = self.capabilities.transcode_video;
                let (container, video, audio) = target.format();
                let query = MediaQuery::new(container).video_codec(video).audio_codec(audio);
                self.rule_mime(&query)
                    .unwrap_or_else(|| target.stock_mime().to_string())
            }
            StreamKind::AudioTranscode => {
                let target = self.capabilities.transcode_audio;
                let base = self
                    .rule_mime(&MediaQuery::new(target.container()))
                    .unwrap_or_else(|| target.stock_mime().to_string());
                if target == AudioTranscode::Lpcm {
                    let first = media.and_then(|m| m.audio_tracks.first());
                    let suffix = mime::lpcm_suffix(
                        audio_resample,
                        self.capabilities.transcode_audio_to_441khz,
                        first.map(|a| a.sample_rate).unwrap_or(0),
                        first.map(|a| a.channels).unwrap_or(0),
                    );
                    base + &suffix
                } else {
                    base
                }
            }
        };
        self.alias(&matched)
    }

    fn exceeds_video_limits(&self, media: &MediaInfo) -> bool {
        let caps = &self.capabilities;
        let Some(video) = media.video.as_ref() else {
            return false;
        };
        let over = |value: u64, max: u64| max > 0 && value > max;
        over(video.width, caps.max_video_width)
            || over(video.height, caps.max_video_height)
            || over(media.bitrate, caps.max_video_bitrate_mbps.saturating_mul(1_000_000))
    }

    /// Decides how a media item is served to a device bound to this profile.
    ///
    /// `source_mime` is the item's own mime type, used for rules without an
    /// explicit `m:` token.
    pub fn negotiate(&self, media: &MediaInfo, source_mime: &str, audio_resample: bool) -> Negotiation {
        let video = media.is_video();
        if (video && !self.capabilities.video) || (!video && !self.capabilities.audio) {
            return Negotiation::Unsupported;
        }

        let kind = if video {
            StreamKind::VideoTranscode
        } else {
            StreamKind::AudioTranscode
        };

        if self.exceeds_video_limits(media) {
            debug!(profile = %self.name, "Media exceeds video limits, transcoding");
            return Negotiation::Transcode(self.mime_type(kind, Some(media), audio_resample));
        }

        match self.rules.match_media(media) {
            Some(mime) => {
                let mime = if mime == MIMETYPE_AUTO { source_mime } else { mime };
                Negotiation::Native(self.alias(mime))
            }
            None => Negotiation::Transcode(self.mime_type(kind, Some(media), audio_resample)),
        }
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            name: self.name.clone(),
            priority: self.priority,
            rank: self.rank,
            file: self.file.clone(),
            header_pattern: self.header_pattern().map(str::to_string),
            upnp_pattern: self.upnp_pattern().map(str::to_string),
            rules: self.rules.len(),
            dropped_rules: self.dropped_rules.len(),
            upnp_mode: self.upnp_mode,
            capabilities: self.capabilities.clone(),
        }
    }
}

/// Shared slot holding the current compiled state of one profile.
///
/// Readers take a cheap `Arc` snapshot; a reload swaps the whole profile
/// under the write lock.
#[derive(Debug)]
pub struct ProfileHandle {
    current: RwLock<Arc<CapabilityProfile>>,
}

impl ProfileHandle {
    pub fn new(profile: CapabilityProfile) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(Arc::new(profile)),
        })
    }

    pub fn load(&self) -> Arc<CapabilityProfile> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swaps in a new compiled state and returns the previous one.
    pub fn replace(&self, profile: CapabilityProfile) -> Arc<CapabilityProfile> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, Arc::new(profile))
    }

    pub fn name(&self) -> String {
        self.load().name().to_string()
    }

    pub fn priority(&self) -> i32 {
        self.load().priority()
    }

    pub fn file(&self) -> Option<PathBuf> {
        self.load().file().map(Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmoformats::{AudioTrack, VideoTrack};

    fn compile(text: &str) -> CapabilityProfile {
        CapabilityProfile::compile(ProfileFile::parse(text), None).unwrap()
    }

    #[test]
    fn test_compile_defaults() {
        let profile = compile("RendererName = Test TV\nSupported = f:mp3");
        assert_eq!(profile.name(), "Test TV");
        assert_eq!(profile.group(), "Test");
        assert_eq!(profile.priority(), 0);
        assert_eq!(profile.upnp_mode(), UpnpMode::Allow);
        assert!(profile.capabilities().video);
        assert_eq!(profile.capabilities().transcode_video, VideoTranscode::MpegpsMpeg2Ac3);
        assert_eq!(profile.capabilities().transcode_audio, AudioTranscode::Lpcm);
        assert!(profile.header_pattern().is_none());
        assert!(!profile.match_headers(&[(USER_AGENT, "anything")].into_iter().collect()));
    }

    #[test]
    fn test_name_falls_back_to_file_stem() {
        let profile = CapabilityProfile::compile(
            ProfileFile::parse("LoadingPriority = 1"),
            Some(PathBuf::from("/tmp/Roku-TV.conf")),
        )
        .unwrap();
        assert_eq!(profile.name(), "Roku-TV");
    }

    #[test]
    fn test_invalid_patterns_reject_profile() {
        let err = CapabilityProfile::compile(ProfileFile::parse("RendererName = X\nUserAgentSearch = (bad"), None)
            .unwrap_err();
        assert!(matches!(err, ProfileError::InvalidPattern { .. }));

        let err = CapabilityProfile::compile(ProfileFile::parse("RendererName = X\nUpnpDetailsSearch = a , [b"), None)
            .unwrap_err();
        assert!(matches!(err, ProfileError::InvalidPattern { .. }));

        let err = CapabilityProfile::compile(ProfileFile::parse("RendererName = X\nLoadingPriority = top"), None)
            .unwrap_err();
        assert!(matches!(err, ProfileError::InvalidValue { .. }));
    }

    #[test]
    fn test_invalid_rule_is_dropped_not_fatal() {
        let profile = compile("RendererName = X\nSupported = f:mp3\nSupported = f:wav n:stereo");
        assert_eq!(profile.rules().len(), 1);
        assert_eq!(profile.dropped_rules().len(), 1);
    }

    #[test]
    fn test_upnp_mode() {
        assert_eq!(UpnpMode::parse(Some("false")), UpnpMode::Block);
        assert_eq!(UpnpMode::parse(Some("Postpone")), UpnpMode::Postpone);
        assert_eq!(UpnpMode::parse(Some("true")), UpnpMode::Allow);
        assert_eq!(UpnpMode::parse(None), UpnpMode::Allow);
    }

    #[test]
    fn test_ordering() {
        let a = compile("RendererName = beta\nLoadingPriority = 1");
        let b = compile("RendererName = Alpha\nLoadingPriority = 1");
        let c = compile("RendererName = Zeta\nLoadingPriority = 5");
        let mut all = vec![&a, &b, &c];
        all.sort_by(|x, y| CapabilityProfile::ordering(x, y));
        let names: Vec<_> = all.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "beta"]);
    }

    #[test]
    fn test_transcode_mime_selection() {
        let profile = compile(
            "RendererName = X\n\
             TranscodeVideo = MPEGTS-H264-AC3\n\
             Supported = f:mpegts v:h264 a:ac3 m:video/mp2t\n\
             MimeTypesChanges = audio/wav=audio/x-wav",
        );
        assert_eq!(profile.mime_type(StreamKind::VideoTranscode, None, true), "video/mp2t");
        assert_eq!(
            profile.mime_type(StreamKind::AudioTranscode, None, true),
            "audio/L16;rate=48000;channels=2"
        );
        assert_eq!(profile.mime_type(StreamKind::Native("audio/wav"), None, true), "audio/x-wav");

        let stock = compile("RendererName = Y\nTranscodeVideo = HLS-MPEGTS-H264-AAC\nTranscodeAudio = MP3\nTranscodeAudioTo441kHz = true");
        assert_eq!(stock.mime_type(StreamKind::VideoTranscode, None, true), mime::HLS_TYPEMIME);
        assert_eq!(stock.mime_type(StreamKind::AudioTranscode, None, true), "audio/mpeg");

        let lpcm = compile("RendererName = Z\nTranscodeAudioTo441kHz = true");
        let media = MediaInfo::new("flac").with_audio(AudioTrack::new("flac").with_sample_rate(96000).with_channels(2));
        assert_eq!(
            lpcm.mime_type(StreamKind::AudioTranscode, Some(&media), true),
            "audio/L16;rate=44100;channels=2"
        );
        assert_eq!(
            lpcm.mime_type(StreamKind::AudioTranscode, Some(&media), false),
            "audio/L16;rate=96000;channels=2"
        );
    }

    #[test]
    fn test_negotiate() {
        let profile = compile(
            "RendererName = X\n\
             MaxVideoWidth = 1920\n\
             MaxVideoHeight = 1080\n\
             Supported = f:mkv v:h264 a:ac3 m:video/x-matroska\n\
             Supported = f:flac\n\
             Image = false",
        );

        let hd = MediaInfo::new("mkv")
            .with_video(VideoTrack::new("h264").with_resolution(1920, 1080))
            .with_audio(AudioTrack::new("ac3"));
        assert_eq!(
            profile.negotiate(&hd, "video/x-mkv", false),
            Negotiation::Native("video/x-matroska".to_string())
        );

        let uhd = MediaInfo::new("mkv")
            .with_video(VideoTrack::new("h264").with_resolution(3840, 2160))
            .with_audio(AudioTrack::new("ac3"));
        assert_eq!(
            profile.negotiate(&uhd, "video/x-mkv", false),
            Negotiation::Transcode(mime::MPEG_TYPEMIME.to_string())
        );

        let flac = MediaInfo::new("flac").with_audio(AudioTrack::new("flac"));
        assert_eq!(
            profile.negotiate(&flac, "audio/flac", false),
            Negotiation::Native("audio/flac".to_string())
        );

        let no_audio = compile("RendererName = V\nAudio = false");
        assert_eq!(no_audio.negotiate(&flac, "audio/flac", false), Negotiation::Unsupported);
    }

    #[test]
    fn test_overrides_keep_identity() {
        let base = compile("RendererName = Sony BRAVIA\nLoadingPriority = 2\nSupported = f:mp3").with_rank(4);
        let device = ProfileFile::parse("Device = 10.0.0.5\nRendererName = Salon\nSupported = f:flac");
        let overridden = base.with_overrides(&device).unwrap();
        assert_eq!(overridden.name(), "Sony BRAVIA");
        assert_eq!(overridden.priority(), 2);
        assert_eq!(overridden.rank(), 4);
        assert!(overridden.rules().is_format_supported("flac"));
        assert!(!overridden.rules().is_format_supported("mp3"));
    }

    #[test]
    fn test_handle_swap() {
        let handle = ProfileHandle::new(compile("RendererName = A\nLoadingPriority = 1"));
        let before = handle.load();
        let old = handle.replace(compile("RendererName = A\nLoadingPriority = 7"));
        assert!(Arc::ptr_eq(&before, &old));
        assert_eq!(handle.priority(), 7);
        assert_eq!(before.priority(), 1);
    }

    #[test]
    fn test_builtin_default_accepts_everything() {
        let default = CapabilityProfile::builtin_default();
        assert_eq!(default.name(), DEFAULT_PROFILE_NAME);
        assert!(default.rules().is_format_supported("anything"));
    }
}
