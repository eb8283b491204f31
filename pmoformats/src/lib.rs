//! # pmoformats - Moteur de règles de compatibilité des formats
//!
//! Chaque profil de renderer déclare une liste ordonnée de règles
//! `Supported` décrivant les couples conteneur/codecs qu'il sait lire
//! nativement, avec leurs limites (canaux, fréquence, débit, résolution).
//! Ce crate compile ces règles et évalue un média contre elles.
//!
//! ```
//! use pmoformats::{FormatRules, MediaQuery};
//!
//! let rules = FormatRules::from_lines(["f:mpegts v:h264 a:ac3 b:15000 m:video/mpeg"]);
//! let query = MediaQuery::new("mpegts").video_codec("h264").audio_codec("ac3");
//!
//! assert_eq!(rules.matched_mime_type(&query.bitrate(10000)), Some("video/mpeg"));
//! assert_eq!(rules.matched_mime_type(&query.bitrate(20000)), None);
//! ```
//!
//! La correspondance est pure : un [`FormatRules`] compilé est immuable et
//! peut être partagé entre threads.

pub mod errors;
pub mod media;
pub mod names;
pub mod rule;
pub mod rules;

pub use errors::RuleError;
pub use media::{AudioTrack, MediaInfo, MediaQuery, VideoTrack};
pub use rule::FormatRule;
pub use rules::{CompiledRules, FormatRules};
