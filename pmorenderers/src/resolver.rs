use std::sync::Arc;

use tracing::{debug, trace};

use crate::collection::ProfileCollection;
use crate::headers::SortedHeaders;
use crate::profile::{CapabilityProfile, ProfileHandle};
use crate::upnp::UpnpDetails;

/// Finds the profile a device belongs to.
///
/// Enabled profiles are tried in collection order; the first match wins.
/// `None` means the device is not recognized, which is not an error. With
/// `force_default` every lookup returns the default profile.
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    collection: Arc<ProfileCollection>,
    force_default: bool,
}

impl ProfileResolver {
    pub fn new(collection: Arc<ProfileCollection>, force_default: bool) -> Self {
        Self {
            collection,
            force_default,
        }
    }

    pub fn collection(&self) -> &Arc<ProfileCollection> {
        &self.collection
    }

    pub fn force_default(&self) -> bool {
        self.force_default
    }

    fn first_match<F>(&self, what: &str, matches: F) -> Option<Arc<ProfileHandle>>
    where
        F: Fn(&CapabilityProfile) -> bool,
    {
        if self.force_default {
            trace!(lookup = what, "Default profile forced");
            return Some(self.collection.default_profile());
        }
        let found = self
            .collection
            .enabled()
            .into_iter()
            .find(|handle| matches(&*handle.load()));
        match &found {
            Some(handle) => debug!(lookup = what, profile = %handle.name(), "Profile matched"),
            None => trace!(lookup = what, "No profile matched"),
        }
        found
    }

    pub fn resolve_by_headers(&self, headers: &SortedHeaders) -> Option<Arc<ProfileHandle>> {
        self.first_match("headers", |p| p.match_headers(headers))
    }

    pub fn resolve_by_upnp_details(&self, details: &UpnpDetails) -> Option<Arc<ProfileHandle>> {
        self.first_match("upnp", |p| p.match_upnp_details(details))
    }

    pub fn resolve_by_name(&self, name: &str) -> Option<Arc<ProfileHandle>> {
        if self.force_default {
            return Some(self.collection.default_profile());
        }
        self.collection.by_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::USER_AGENT;
    use crate::profile_file::ProfileFile;

    fn handle(text: &str) -> Arc<ProfileHandle> {
        ProfileHandle::new(CapabilityProfile::compile(ProfileFile::parse(text), None).unwrap())
    }

    fn collection() -> Arc<ProfileCollection> {
        Arc::new(ProfileCollection::new(
            vec![
                handle("RendererName = Generic\nLoadingPriority = 1\nUserAgentSearch = UPnP/1.0"),
                handle("RendererName = Bravia\nLoadingPriority = 5\nUserAgentSearch = BRAVIA\nUpnpDetailsSearch = Sony , KDL"),
            ],
            ProfileHandle::new(CapabilityProfile::builtin_default()),
            Vec::new(),
        ))
    }

    #[test]
    fn test_highest_priority_wins() {
        let resolver = ProfileResolver::new(collection(), false);
        let headers: SortedHeaders = [(USER_AGENT, "Linux UPnP/1.0 BRAVIA")].into_iter().collect();
        assert_eq!(resolver.resolve_by_headers(&headers).unwrap().name(), "Bravia");

        let headers: SortedHeaders = [(USER_AGENT, "Linux UPnP/1.0 Kodi")].into_iter().collect();
        assert_eq!(resolver.resolve_by_headers(&headers).unwrap().name(), "Generic");

        let headers: SortedHeaders = [(USER_AGENT, "curl/8.0")].into_iter().collect();
        assert!(resolver.resolve_by_headers(&headers).is_none());
        assert!(resolver.resolve_by_headers(&SortedHeaders::new()).is_none());
    }

    #[test]
    fn test_upnp_and_name() {
        let resolver = ProfileResolver::new(collection(), false);
        let details = UpnpDetails::new("Sony Corporation", "KDL-40EX720");
        assert_eq!(resolver.resolve_by_upnp_details(&details).unwrap().name(), "Bravia");
        assert_eq!(resolver.resolve_by_name("gener").unwrap().name(), "Generic");
    }

    #[test]
    fn test_force_default() {
        let resolver = ProfileResolver::new(collection(), true);
        let headers: SortedHeaders = [(USER_AGENT, "BRAVIA")].into_iter().collect();
        assert_eq!(resolver.resolve_by_headers(&headers).unwrap().name(), "Unknown renderer");
        assert_eq!(resolver.resolve_by_name("Bravia").unwrap().name(), "Unknown renderer");
    }
}
