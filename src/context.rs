// Shared daemon context
//
// The process-wide state the original kept in global singletons (the config
// instance, the display number list, the cached X.Org version) lives in one
// explicit object threaded through constructors instead.

use std::sync::Arc;

use crate::config::Config;
use crate::vt::VtRegistry;
use crate::xserver::allocator::DisplayNumberAllocator;
use crate::xserver::version::VersionProbe;

/// Shared handles every display server needs; cheap to clone.
#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub display_numbers: Arc<DisplayNumberAllocator>,
    pub vts: Arc<VtRegistry>,
    pub xorg_version: Arc<VersionProbe>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        let display_numbers =
            DisplayNumberAllocator::new(config.lightdm.minimum_display_number);
        Self {
            config: Arc::new(config),
            display_numbers: Arc::new(display_numbers),
            vts: Arc::new(VtRegistry::default()),
            xorg_version: Arc::new(VersionProbe::new()),
        }
    }
}
