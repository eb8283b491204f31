//! # pmorenderers - Identification des renderers DLNA
//!
//! Ce crate reconnaît les appareils qui se connectent au serveur et leur
//! associe un profil de capacités :
//!
//! - les profils sont des fichiers `.conf` chargés par [`ProfileLoader`] et
//!   compilés en [`CapabilityProfile`] ;
//! - [`ProfileResolver`] choisit le profil d'un appareil d'après ses
//!   en-têtes HTTP ou ses détails UPnP, par priorité décroissante ;
//! - [`AddressAssociationRegistry`] garde une association par adresse,
//!   la promeut vers un profil plus prioritaire, et confie les associations
//!   devenues invalides au [`GhostReaper`] ;
//! - chaque profil négocie ensuite le type MIME servi pour un média
//!   (lecture native ou transcodage).
//!
//! La façade [`Renderers`] assemble le tout depuis un [`pmoconfig::Config`] :
//!
//! ```no_run
//! use pmoconfig::Config;
//! use pmorenderers::{Renderers, SortedHeaders};
//!
//! let config = Config::load_config(None)?;
//! let renderers = Renderers::new(&config)?;
//!
//! let headers: SortedHeaders = [("User-Agent", "SEC_HHP_[TV] Samsung")].into_iter().collect();
//! let association = renderers.identify("192.168.1.20".parse()?, &headers);
//! println!("{} -> {}", association.address(), association.profile().name());
//!
//! renderers.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod association;
pub mod collection;
pub mod errors;
pub mod events;
pub mod ghost;
pub mod headers;
pub mod loader;
pub mod mime;
pub mod overrides;
pub mod profile;
pub mod profile_file;
pub mod registry;
pub mod reload;
pub mod renderers;
pub mod resolver;
pub mod template;
pub mod upnp;

pub use association::{AssociationInfo, DeviceAssociation};
pub use collection::ProfileCollection;
pub use errors::{ProfileError, RendererError};
pub use events::RegistryEvent;
pub use ghost::{DeviceLocator, GhostReaper, UpnpDirectory};
pub use headers::{HeaderMatcher, SortedHeaders};
pub use loader::{LoadedProfiles, ProfileLoader};
pub use mime::{AudioTranscode, VideoTranscode};
pub use overrides::{DeviceOverrides, OverrideSet};
pub use profile::{
    Capabilities, CapabilityProfile, Negotiation, ProfileHandle, ProfileSummary, StreamKind, UpnpMode,
};
pub use profile_file::ProfileFile;
pub use registry::AddressAssociationRegistry;
pub use reload::{FileWatcher, ReloadMessage, ReloadOutcome, ReloadWorker};
pub use renderers::{Renderers, RenderersOptions};
pub use resolver::ProfileResolver;
pub use upnp::{UpnpDetails, UpnpMatcher};
