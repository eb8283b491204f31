use std::net::IpAddr;
use std::sync::{Arc, Barrier};
use std::thread;

use pmorenderers::{
    AddressAssociationRegistry, CapabilityProfile, OverrideSet, ProfileCollection, ProfileFile, ProfileHandle,
    ProfileResolver, SortedHeaders, UpnpDirectory,
};

fn handle(text: &str) -> Arc<ProfileHandle> {
    ProfileHandle::new(CapabilityProfile::compile(ProfileFile::parse(text), None).unwrap())
}

fn priority(name: &str, priority: i32) -> Arc<ProfileHandle> {
    handle(&format!("RendererName = {name}\nLoadingPriority = {priority}"))
}

fn registry() -> Arc<AddressAssociationRegistry> {
    AddressAssociationRegistry::new(
        ProfileHandle::new(CapabilityProfile::builtin_default()),
        Arc::new(OverrideSet::default()),
        Arc::new(UpnpDirectory::new()),
    )
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn test_higher_priority_profile_wins() {
    let p1 = handle("RendererName = P1\nLoadingPriority = 5\nUserAgentSearch = Renderer");
    let p2 = handle("RendererName = P2\nLoadingPriority = 1\nUserAgentSearch = Renderer");
    let collection = Arc::new(ProfileCollection::new(
        vec![p2, p1],
        ProfileHandle::new(CapabilityProfile::builtin_default()),
        Vec::new(),
    ));
    let resolver = ProfileResolver::new(collection, false);
    let headers: SortedHeaders = [("User-Agent", "Some Renderer/2.0")].into_iter().collect();

    for _ in 0..10 {
        assert_eq!(resolver.resolve_by_headers(&headers).unwrap().name(), "P1");
    }
}

#[test]
fn test_concurrent_first_sight_shares_one_association() {
    let registry = registry();
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let generic = priority("Generic", 1);

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            let matched = (i % 2 == 0).then(|| Arc::clone(&generic));
            thread::spawn(move || {
                barrier.wait();
                registry.resolve(ip("192.168.1.50"), matched)
            })
        })
        .collect();

    let associations: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let first = &associations[0];
    assert!(associations.iter().all(|a| Arc::ptr_eq(a, first)));
    assert_eq!(registry.len(), 1);
    // Au moins une résolution portait un profil : l'association est chargée
    assert!(first.is_loaded());
    assert_eq!(first.base_profile().name(), "Generic");
}

#[test]
fn test_upgrade_is_monotonic() {
    let registry = registry();
    let address = ip("10.1.1.1");
    let sequence = [1, 0, 3, 2, 3, 5, 4, 5, -1];
    let mut best = i32::MIN;

    for (i, p) in sequence.iter().enumerate() {
        let association = registry.resolve(address, Some(priority(&format!("P{i}"), *p)));
        best = best.max(*p);
        assert_eq!(association.base_profile().priority(), best);
    }

    // Priorité égale : la première liaison est conservée
    let association = registry.get(address).unwrap();
    assert_eq!(association.base_profile().name(), "P5");
}

#[test]
fn test_unmatched_resolution_stays_upgradable() {
    let registry = registry();
    let address = ip("10.1.1.2");

    let a = registry.resolve(address, None);
    let b = registry.resolve(address, None);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!a.is_loaded());
    assert!(!a.is_recognized());

    // Même un profil de priorité négative remplace le profil par défaut
    registry.resolve(address, Some(priority("Low", -3)));
    assert!(a.is_loaded());
    assert_eq!(a.base_profile().name(), "Low");
}

#[test]
fn test_distinct_addresses_are_independent() {
    let registry = registry();
    let a = registry.resolve(ip("10.0.0.1"), Some(priority("A", 1)));
    let b = registry.resolve(ip("10.0.0.2"), None);
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(registry.associations().len(), 2);
    assert_eq!(registry.associations()[0].address(), ip("10.0.0.1"));
}
