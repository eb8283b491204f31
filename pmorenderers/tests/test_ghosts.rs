use std::fs;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pmoconfig::ALL_RENDERERS;
use pmorenderers::{
    AddressAssociationRegistry, CapabilityProfile, DeviceAssociation, OverrideSet, ProfileHandle, ProfileLoader,
    RegistryEvent, Renderers, RenderersOptions, UpnpDetails, UpnpDirectory,
};
use tempfile::TempDir;

const GRACE: Duration = Duration::from_millis(60);

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn engine(profiles: &TempDir, generated: &TempDir) -> Renderers {
    Renderers::with_options(RenderersOptions {
        loader: ProfileLoader::new(vec![profiles.path().to_path_buf()], vec![ALL_RENDERERS.to_string()], None),
        profile_dir: generated.path().to_path_buf(),
        force_default: false,
        ghost_grace_delay: GRACE,
        reload_poll_interval: None,
        audio_resample: false,
    })
    .unwrap()
}

fn details(udn: &str) -> UpnpDetails {
    UpnpDetails::new("Acme", "Streamer").with_udn(udn)
}

const UDN: &str = "uuid:11111111-2222-3333-4444-555555555555";
const UUID: &str = "11111111-2222-3333-4444-555555555555";

#[test]
fn test_lost_device_is_reaped_after_grace_delay() {
    let (profiles, generated) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let engine = engine(&profiles, &generated);
    let events = engine.subscribe();
    let address = ip("192.168.1.60");

    engine.upnp_device_seen(address, details(UDN));
    let _ = events.try_recv();
    engine.upnp_device_lost(UDN);

    // Pas de retrait synchrone
    assert!(engine.association(address).is_some());

    let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(
        event,
        RegistryEvent::Removed {
            address,
            uuid: Some(UUID.to_string())
        }
    );
    assert!(engine.association(address).is_none());
    assert!(engine.association_by_uuid(UUID).is_none());
}

#[test]
fn test_renewed_activity_cancels_removal() {
    let (profiles, generated) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let engine = engine(&profiles, &generated);
    let events = engine.subscribe();
    let address = ip("192.168.1.61");

    let association = engine.upnp_device_seen(address, details(UDN));
    let _ = events.try_recv();
    engine.upnp_device_lost(UDN);
    assert!(!association.is_active());

    engine.upnp_device_seen(address, details(UDN));
    assert!(association.is_active());

    thread::sleep(GRACE * 3);
    assert!(events.try_recv().is_err());
    assert!(Arc::ptr_eq(&engine.association(address).unwrap(), &association));
}

#[test]
fn test_blocked_device_is_never_reaped() {
    let (profiles, generated) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    fs::write(
        profiles.path().join("Acme.conf"),
        "RendererName = Acme Streamer\nUpnpDetailsSearch = Acme\nUpnpAllow = false",
    )
    .unwrap();
    let engine = engine(&profiles, &generated);
    let address = ip("192.168.1.62");

    let association = engine.upnp_device_seen(address, details(UDN));
    assert_eq!(association.profile().name(), "Acme Streamer");
    engine.upnp_device_lost(UDN);
    assert!(association.is_active());

    thread::sleep(GRACE * 3);
    assert!(engine.association(address).is_some());
}

#[test]
fn test_displaced_association_is_retired_silently() {
    let registry = AddressAssociationRegistry::new(
        ProfileHandle::new(CapabilityProfile::builtin_default()),
        Arc::new(OverrideSet::default()),
        Arc::new(UpnpDirectory::new()),
    );
    registry.start_ghost_reaper(GRACE).unwrap();
    let events = registry.subscribe();
    let address = ip("192.168.1.63");

    let old = registry.resolve(address, None);
    let _ = events.try_recv();
    let fresh = Arc::new(DeviceAssociation::new(
        1000,
        address,
        ProfileHandle::new(CapabilityProfile::builtin_default()),
        false,
    ));
    registry.associate(Arc::clone(&fresh));
    assert!(!old.is_active());

    // L'ancienne association n'est plus indexée : rien à retirer, rien à annoncer
    assert!(events.recv_timeout(GRACE * 4).is_err());
    assert!(Arc::ptr_eq(&registry.get(address).unwrap(), &fresh));
    assert_eq!(registry.len(), 1);
    registry.shutdown();
}
