//! Noms canoniques des conteneurs et codecs tels qu'ils apparaissent
//! dans les règles `Supported` des profils.

pub const AAC_LC: &str = "aac-lc";
pub const AC3: &str = "ac3";
pub const DTS: &str = "dts";
pub const FLAC: &str = "flac";
pub const H264: &str = "h264";
pub const H265: &str = "h265";
pub const LPCM: &str = "lpcm";
pub const MP3: &str = "mp3";
pub const MPEG2: &str = "mpeg2";
pub const MPEGPS: &str = "mpegps";
pub const MPEGTS: &str = "mpegts";
pub const MPEGTS_HLS: &str = "hls";
pub const WAV: &str = "wav";
pub const WMA: &str = "wma";
pub const WMV: &str = "wmv";

/// Mime type placeholder used by rules without an `m:` token. The caller
/// substitutes the stock mime type of the container.
pub const MIMETYPE_AUTO: &str = "MIMETYPE_AUTO";

/// Extra attribute keys understood by the media descriptors.
pub const MI_QPEL: &str = "qpel";
pub const MI_GMC: &str = "gmc";
pub const MI_GOP: &str = "gop";
