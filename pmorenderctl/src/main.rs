//! pmorenderctl - diagnostic des profils de renderers
//!
//! ```bash
//! # Profils actifs, dans l'ordre de résolution
//! pmorenderctl list
//!
//! # Profil retenu pour des en-têtes HTTP
//! pmorenderctl headers -H "User-Agent: SEC_HHP_[TV] UE40ES6100/1.0"
//!
//! # Profil retenu pour des détails UPnP
//! pmorenderctl upnp --manufacturer "Sony Corporation" --model-name KDL-40EX720
//!
//! # Lecture native ou transcodage d'un média pour un profil
//! pmorenderctl media --profile "Sony BRAVIA" --container mkv --video h264 --audio ac3:6:48000
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use pmoconfig::Config;
use pmoformats::{AudioTrack, MediaInfo, VideoTrack};
use pmorenderers::{Negotiation, Renderers, SortedHeaders, UpnpDetails};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pmorenderctl")]
#[command(version)]
#[command(about = "Inspect renderer profiles and device resolution")]
struct Cli {
    /// Configuration directory (default: $PMORENDERERS_CONFIG, ./.pmorenderers, ~/.pmorenderers)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List enabled profiles in resolution order
    List {
        /// Also list loaded profiles that are not selected
        #[arg(long)]
        all: bool,
    },

    /// Resolve a profile from HTTP headers
    Headers {
        /// Header line, repeatable
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE", required = true)]
        headers: Vec<String>,
    },

    /// Resolve a profile from UPnP device details
    Upnp {
        #[arg(long)]
        manufacturer: Option<String>,
        #[arg(long)]
        model_name: Option<String>,
        #[arg(long)]
        model_number: Option<String>,
        #[arg(long)]
        friendly_name: Option<String>,
        #[arg(long)]
        udn: Option<String>,
    },

    /// Decide how a media item is served by a profile
    Media {
        /// Profile name (substring); the default profile when omitted
        #[arg(short, long)]
        profile: Option<String>,
        #[arg(long)]
        container: String,
        #[arg(long)]
        video: Option<String>,
        #[arg(long, default_value_t = 0)]
        width: u64,
        #[arg(long, default_value_t = 0)]
        height: u64,
        /// Audio track as codec[:channels[:rate]], repeatable
        #[arg(long)]
        audio: Vec<String>,
        /// Bitrate in bits per second
        #[arg(long, default_value_t = 0)]
        bitrate: u64,
        #[arg(long)]
        fps: Option<f64>,
        /// Mime type of the source file
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
    },
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_audio(value: &str) -> Result<AudioTrack> {
    let mut parts = value.split(':');
    let codec = parts
        .next()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow!("empty audio track"))?;
    let mut track = AudioTrack::new(codec);
    if let Some(channels) = parts.next() {
        track = track.with_channels(channels.parse().with_context(|| format!("invalid channel count in {value}"))?);
    }
    if let Some(rate) = parts.next() {
        track = track.with_sample_rate(rate.parse().with_context(|| format!("invalid sample rate in {value}"))?);
    }
    if parts.next().is_some() {
        bail!("too many fields in audio track {value}");
    }
    Ok(track)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn list(renderers: &Renderers, all: bool, as_json: bool) -> Result<()> {
    let profiles: Vec<_> = renderers.profiles().iter().map(|p| p.summary()).collect();
    if as_json {
        return print_json(&json!({
            "enabled": profiles,
            "default": renderers.default_profile().summary(),
            "all": if all { renderers.all_profile_names().to_vec() } else { Vec::new() },
            "skipped": renderers.skipped().iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        }));
    }

    for p in &profiles {
        println!("{:>4}  {}", p.priority, p.name);
        if let Some(pattern) = &p.header_pattern {
            println!("        headers: {pattern}");
        }
        if let Some(pattern) = &p.upnp_pattern {
            println!("        upnp:    {pattern}");
        }
        println!("        rules:   {} ({} dropped)", p.rules, p.dropped_rules);
    }
    println!("default: {}", renderers.default_profile().name());
    if all {
        println!("loaded: {}", renderers.all_profile_names().join(", "));
    }
    for e in renderers.skipped() {
        println!("skipped: {e}");
    }
    Ok(())
}

fn print_match(name: Option<String>, as_json: bool) -> Result<()> {
    if as_json {
        return print_json(&json!({ "recognized": name.is_some(), "profile": name }));
    }
    match name {
        Some(name) => println!("{name}"),
        None => println!("not recognized"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_config(cli.config.as_deref()).context("Cannot load configuration")?;
    init_logging(&config);
    debug!(directory = %config.get_config_dir().display(), "Configuration loaded");

    let renderers = Renderers::new(&config).context("Cannot load renderer profiles")?;

    let result = match cli.command {
        Commands::List { all } => list(&renderers, all, cli.json),

        Commands::Headers { headers } => {
            let mut sorted = SortedHeaders::new();
            for line in &headers {
                sorted.insert_line(line);
            }
            if sorted.is_empty() {
                bail!("no valid \"Name: value\" header given");
            }
            let matched = renderers.resolver().resolve_by_headers(&sorted);
            print_match(matched.map(|h| h.name()), cli.json)
        }

        Commands::Upnp {
            manufacturer,
            model_name,
            model_number,
            friendly_name,
            udn,
        } => {
            let details = UpnpDetails {
                manufacturer,
                model_name,
                model_number,
                friendly_name,
                udn,
                ..UpnpDetails::default()
            };
            debug!(details = %details.details_string(), "Matching UPnP details");
            let matched = renderers.resolver().resolve_by_upnp_details(&details);
            print_match(matched.map(|h| h.name()), cli.json)
        }

        Commands::Media {
            profile,
            container,
            video,
            width,
            height,
            audio,
            bitrate,
            fps,
            mime,
        } => {
            let profile = match profile.as_deref() {
                Some(name) => renderers
                    .resolve_by_name(name)
                    .ok_or_else(|| anyhow!("no enabled profile matches \"{name}\""))?
                    .load(),
                None => renderers.default_profile(),
            };

            let mut media = MediaInfo::new(container).with_bitrate(bitrate);
            media.framerate = fps;
            if let Some(codec) = video {
                media = media.with_video(VideoTrack::new(codec).with_resolution(width, height));
            }
            for value in &audio {
                media = media.with_audio(parse_audio(value)?);
            }

            let outcome = profile.negotiate(&media, &mime, config.get_audio_resample());
            let (decision, mime) = match &outcome {
                Negotiation::Native(mime) => ("native", Some(mime.as_str())),
                Negotiation::Transcode(mime) => ("transcode", Some(mime.as_str())),
                Negotiation::Unsupported => ("unsupported", None),
            };
            if cli.json {
                print_json(&json!({ "profile": profile.name(), "decision": decision, "mime": mime }))
            } else {
                println!("{}: {decision} {}", profile.name(), mime.unwrap_or(""));
                Ok(())
            }
        }
    };

    renderers.shutdown();
    result
}
