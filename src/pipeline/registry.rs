//! Name → factory table for step implementations (§9): a pipeline config
//! names each step's `impl`; the registry resolves that to a concrete
//! `Step`, leaving the set of known implementations closed over exactly
//! the plugin library in `crate::steps`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::pipeline::step::Step;

pub struct StepRegistry {
    factories: HashMap<&'static str, Arc<dyn Step>>,
}

impl StepRegistry {
    pub fn with_builtins() -> Self {
        let mut factories: HashMap<&'static str, Arc<dyn Step>> = HashMap::new();
        for step in crate::steps::builtins() {
            factories.insert(step.name(), step);
        }
        Self { factories }
    }

    pub fn get(&self, implementation: &str) -> Option<Arc<dyn Step>> {
        self.factories.get(implementation).cloned()
    }
}
