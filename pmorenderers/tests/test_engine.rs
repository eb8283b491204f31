use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use pmoconfig::ALL_RENDERERS;
use pmoformats::{AudioTrack, MediaInfo, VideoTrack};
use pmorenderers::{
    Negotiation, ProfileFile, ProfileLoader, RegistryEvent, RendererError, Renderers, RenderersOptions,
    SortedHeaders, UpnpDetails,
};
use tempfile::TempDir;

const SONY_BRAVIA: &str = "\
# Sony BRAVIA EX series
RendererName = Sony BRAVIA EX
LoadingPriority = 2
UserAgentSearch = BRAVIA
UpnpDetailsSearch = Sony , KDL
TranscodeVideo = MPEGTS-H264-AC3
Supported = f:mpegts v:h264 a:ac3 m:video/vnd.dlna.mpeg-tts
Supported = f:mp3 m:audio/mpeg
";

const DEFAULT_DLNA: &str = "\
RendererName = Generic DLNA
LoadingPriority = 0
UserAgentSearch = DLNADOC
UpnpDetailsSearch = MediaRenderer
Supported = f:mp3 m:audio/mpeg
Supported = f:wav m:audio/wav
";

struct Fixture {
    profiles: TempDir,
    generated: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let profiles = TempDir::new().unwrap();
        fs::write(profiles.path().join("SonyBRAVIA.conf"), SONY_BRAVIA).unwrap();
        fs::write(profiles.path().join("DefaultDLNA.conf"), DEFAULT_DLNA).unwrap();
        Self {
            profiles,
            generated: TempDir::new().unwrap(),
        }
    }

    fn options(&self) -> RenderersOptions {
        RenderersOptions {
            loader: ProfileLoader::new(
                vec![self.profiles.path().to_path_buf()],
                vec![ALL_RENDERERS.to_string()],
                None,
            ),
            profile_dir: self.generated.path().to_path_buf(),
            force_default: false,
            ghost_grace_delay: Duration::from_millis(50),
            reload_poll_interval: None,
            audio_resample: true,
        }
    }

    fn engine(&self) -> Renderers {
        Renderers::with_options(self.options()).unwrap()
    }
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn dlna_headers() -> SortedHeaders {
    [("User-Agent", "Linux/3.0 DLNADOC/1.50 UPnP/1.0"), ("Host", "192.168.1.2:5001")]
        .into_iter()
        .collect()
}

fn bravia_details() -> UpnpDetails {
    UpnpDetails::new("Sony Corporation", "KDL-40EX720")
        .with_friendly_name("Salon")
        .with_udn("uuid:3e8a1c2b-0000-1000-8000-0024be000000")
}

fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_header_match_then_upnp_upgrade() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let events = engine.subscribe();
    let address = ip("192.168.1.30");

    let association = engine.identify(address, &dlna_headers());
    assert!(association.is_recognized());
    assert_eq!(association.profile().name(), "Generic DLNA");

    let upgraded = engine.upnp_device_seen(address, bravia_details());
    assert!(std::sync::Arc::ptr_eq(&association, &upgraded));
    assert_eq!(association.profile().name(), "Sony BRAVIA EX");
    assert_eq!(association.uuid().as_deref(), Some("3e8a1c2b-0000-1000-8000-0024be000000"));
    assert_eq!(association.display_name(), "Salon");

    // Une requête HTTP générique ne rétrograde pas l'association
    engine.identify(address, &dlna_headers());
    assert_eq!(association.profile().name(), "Sony BRAVIA EX");

    assert!(matches!(events.try_recv().unwrap(), RegistryEvent::Associated { recognized: true, .. }));
    assert_eq!(
        events.try_recv().unwrap(),
        RegistryEvent::Upgraded {
            address,
            from: "Generic DLNA".to_string(),
            to: "Sony BRAVIA EX".to_string()
        }
    );
    assert!(events.try_recv().is_err());

    let by_uuid = engine.association_by_uuid("uuid:3E8A1C2B-0000-1000-8000-0024BE000000").unwrap();
    assert!(std::sync::Arc::ptr_eq(&by_uuid, &association));
}

#[test]
fn test_unrecognized_then_upnp_upgrade() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let events = engine.subscribe();
    let address = ip("192.168.1.29");

    let headers: SortedHeaders = [("User-Agent", "Mozilla/5.0 (X11; Linux x86_64)")].into_iter().collect();
    let association = engine.identify(address, &headers);
    assert!(!association.is_recognized());
    assert!(!association.is_loaded());
    assert_eq!(association.profile().name(), "Unknown renderer");

    let upgraded = engine.upnp_device_seen(address, bravia_details());
    assert!(std::sync::Arc::ptr_eq(&association, &upgraded));
    assert!(association.is_recognized());
    assert!(association.is_loaded());
    assert_eq!(association.profile().name(), "Sony BRAVIA EX");

    assert!(matches!(events.try_recv().unwrap(), RegistryEvent::Associated { recognized: false, .. }));
    assert_eq!(
        events.try_recv().unwrap(),
        RegistryEvent::Upgraded {
            address,
            from: "Unknown renderer".to_string(),
            to: "Sony BRAVIA EX".to_string()
        }
    );
    assert!(events.try_recv().is_err());
}

#[test]
fn test_bravia_headers_not_downgraded_by_generic_upnp() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let address = ip("192.168.1.31");

    let headers: SortedHeaders = [("User-Agent", "SonyBRAVIA/KDL DLNADOC/1.50")].into_iter().collect();
    let association = engine.identify(address, &headers);
    assert_eq!(association.profile().name(), "Sony BRAVIA EX");

    let generic = UpnpDetails::new("Acme", "MediaRenderer 2");
    engine.upnp_device_seen(address, generic);
    assert_eq!(association.profile().name(), "Sony BRAVIA EX");
}

#[test]
fn test_unrecognized_device_keeps_identifiers() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let address = ip("192.168.1.32");
    let headers: SortedHeaders = [
        ("User-Agent", "FooPlayer/1.0"),
        ("X-Foo-Client", "model=box3"),
        ("Accept", "*/*"),
    ]
    .into_iter()
    .collect();

    let association = engine.identify(address, &headers);
    assert!(!association.is_recognized());
    assert!(!association.is_loaded());
    assert_eq!(association.profile().name(), "Unknown renderer");
    assert_eq!(
        association.identifiers(),
        vec!["User-Agent: FooPlayer/1.0".to_string(), "X-Foo-Client: model=box3".to_string()]
    );

    // Une requête reconnue plus tard lie encore l'association
    engine.identify(address, &dlna_headers());
    assert_eq!(association.profile().name(), "Generic DLNA");
    assert!(association.is_loaded());
}

#[test]
fn test_negotiation_through_bound_profile() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let address = ip("192.168.1.33");
    let headers: SortedHeaders = [("User-Agent", "BRAVIA")].into_iter().collect();
    engine.identify(address, &headers);

    let native = MediaInfo::new("mpegts")
        .with_video(VideoTrack::new("h264").with_resolution(1920, 1080))
        .with_audio(AudioTrack::new("ac3"));
    assert_eq!(
        engine.negotiate(address, &native, "video/mp2t"),
        Some(Negotiation::Native("video/vnd.dlna.mpeg-tts".to_string()))
    );

    let mkv = MediaInfo::new("mkv")
        .with_video(VideoTrack::new("h264"))
        .with_audio(AudioTrack::new("ac3"))
        .with_audio(AudioTrack::new("dts"));
    assert_eq!(
        engine.negotiate(address, &mkv, "video/x-matroska"),
        Some(Negotiation::Transcode("video/vnd.dlna.mpeg-tts".to_string()))
    );

    let flac = MediaInfo::new("flac").with_audio(AudioTrack::new("flac").with_sample_rate(96000));
    assert_eq!(
        engine.negotiate(address, &flac, "audio/flac"),
        Some(Negotiation::Transcode("audio/L16;rate=48000;channels=2".to_string()))
    );

    assert_eq!(engine.negotiate(ip("10.9.9.9"), &flac, "audio/flac"), None);
}

#[test]
fn test_device_overrides_apply_to_association() {
    let fixture = Fixture::new();
    fs::write(
        fixture.profiles.path().join("Salon.conf"),
        "Device = 3e8a1c2b-0000-1000-8000-0024be000000\nSupported = f:flac m:audio/flac",
    )
    .unwrap();
    let engine = fixture.engine();
    let address = ip("192.168.1.34");

    let association = engine.upnp_device_seen(address, bravia_details());
    let profile = association.profile();
    assert_eq!(profile.name(), "Sony BRAVIA EX");
    assert!(profile.rules().is_format_supported("flac"));
    assert!(!profile.rules().is_format_supported("mp3"));
    assert!(association.base_profile().rules().is_format_supported("mp3"));
}

#[test]
fn test_force_default() {
    let fixture = Fixture::new();
    let mut options = fixture.options();
    options.force_default = true;
    let engine = Renderers::with_options(options).unwrap();

    let association = engine.identify(ip("192.168.1.35"), &dlna_headers());
    assert_eq!(association.profile().name(), "Unknown renderer");
    assert!(association.is_recognized());
}

#[test]
fn test_generate_profile_and_device_file() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let address = ip("192.168.1.36");
    let headers: SortedHeaders = [("User-Agent", "FooPlayer/1.0"), ("X-Foo-Client", "box3")]
        .into_iter()
        .collect();
    engine.upnp_device_seen(address, UpnpDetails::new("Acme", "Box 3").with_friendly_name("Chambre"));
    engine.identify(address, &headers);

    let path = engine.generate_profile(address, Some("Generic DLNA")).unwrap();
    assert_eq!(path, fixture.generated.path().join("Chambre.conf"));
    let generated = ProfileFile::load(&path).unwrap();
    assert_eq!(generated.get("RendererName"), Some("Chambre"));
    assert_eq!(generated.get("UpnpDetailsSearch"), Some("Acme , Box 3"));
    assert_eq!(generated.get_all("Supported").len(), 2);
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("# X-Foo-Client: box3"));

    assert!(matches!(
        engine.generate_profile(address, None),
        Err(RendererError::ProfileExists(_))
    ));
    assert!(matches!(
        engine.generate_profile(address, Some("Roku")),
        Err(RendererError::UnknownProfile(_))
    ));
    assert!(matches!(
        engine.generate_profile(ip("10.9.9.9"), None),
        Err(RendererError::UnknownDevice(_))
    ));

    let device = engine.generate_device_file(address).unwrap();
    let device_file = ProfileFile::load(&device).unwrap();
    assert_eq!(device_file.get("Device"), Some("192.168.1.36"));
}

fn touch_later(path: &Path) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();
}

#[test]
fn test_watched_profile_is_reloaded() {
    let fixture = Fixture::new();
    let mut options = fixture.options();
    options.reload_poll_interval = Some(Duration::from_millis(20));
    let engine = Renderers::with_options(options).unwrap();
    let address = ip("192.168.1.37");

    let association = engine.identify(address, &dlna_headers());
    assert!(!association.profile().rules().is_format_supported("flac"));

    let path = fixture.profiles.path().join("DefaultDLNA.conf");
    fs::write(&path, format!("{DEFAULT_DLNA}Supported = f:flac m:audio/flac\nLoadingPriority = 7\n")).unwrap();
    touch_later(&path);

    assert!(wait_until(Duration::from_secs(3), || {
        association.profile().rules().is_format_supported("flac")
    }));
    assert_eq!(engine.profiles()[0].name(), "Generic DLNA");
    assert_eq!(engine.profiles()[0].priority(), 7);
    engine.shutdown();
}

#[test]
fn test_invalid_reload_keeps_previous_state() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let path = fixture.profiles.path().join("SonyBRAVIA.conf");

    fs::write(&path, "RendererName = Sony BRAVIA EX\nUserAgentSearch = BRAVIA(").unwrap();
    assert!(engine.reload_file(&path).is_err());

    let headers: SortedHeaders = [("User-Agent", "BRAVIA")].into_iter().collect();
    let association = engine.identify(ip("192.168.1.38"), &headers);
    assert_eq!(association.profile().name(), "Sony BRAVIA EX");
    assert_eq!(association.profile().priority(), 2);
}

#[test]
fn test_association_info_serializes() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let address = ip("192.168.1.39");
    engine.upnp_device_seen(address, bravia_details());

    let info = engine.association(address).unwrap().info();
    let value = serde_json::to_value(&info).unwrap();
    assert_eq!(value["address"], "192.168.1.39");
    assert_eq!(value["profile"], "Sony BRAVIA EX");
    assert_eq!(value["name"], "Salon");
    assert_eq!(value["recognized"], true);
    assert_eq!(value["uuid"], "3e8a1c2b-0000-1000-8000-0024be000000");
    assert!(value.get("firstSeen").is_some());
    assert!(value.get("overrideFile").is_some());
}
