//! The plugin library (§4.6): seven filters and three weighers, each a
//! stateless `Step` registered by name in `pipeline::registry`.

mod filters;
mod weighers;

use std::sync::Arc;

use crate::pipeline::step::Step;

/// Every built-in step implementation, in no particular order — the
/// pipeline config, not this list, determines execution order.
pub fn builtins() -> Vec<Arc<dyn Step>> {
    vec![
        Arc::new(filters::FilterCorrectAZ),
        Arc::new(filters::FilterDisabled),
        Arc::new(filters::FilterHasRequestedTraits),
        Arc::new(filters::FilterHasEnoughCapacity),
        Arc::new(filters::FilterComputeCapabilities),
        Arc::new(filters::FilterHostInstructions),
        Arc::new(filters::FilterExternalCustomer),
        Arc::new(weighers::ResourceBalancing),
        Arc::new(weighers::AntiAffinityNoisyProjects),
        Arc::new(weighers::AvoidContendedHosts::new(
            "avoid_contended_hosts_long",
            crate::model::feature::contention::Window::Long,
        )),
        Arc::new(weighers::AvoidContendedHosts::new(
            "avoid_contended_hosts_short",
            crate::model::feature::contention::Window::Short,
        )),
    ]
}
