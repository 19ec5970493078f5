//! The dependency DAG (§4.3): nodes are `{datasources} ∪ {extractors} ∪
//! {pipelines}`; edges run from a trigger's name to every node that
//! declared it as an upstream dependency.

use std::collections::HashMap;

/// One schedulable node. Pipelines are carried in the DAG for
/// completeness (§4.3 names them as nodes) but are never actively
/// ticked by the reconciler — they run on request, per §4.4.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeId {
    Datasource(String),
    Extractor(String),
    Pipeline(String),
}

impl NodeId {
    pub fn name(&self) -> &str {
        match self {
            NodeId::Datasource(n) | NodeId::Extractor(n) | NodeId::Pipeline(n) => n,
        }
    }

    pub fn key(&self) -> String {
        match self {
            NodeId::Datasource(n) => format!("datasource:{n}"),
            NodeId::Extractor(n) => format!("extractor:{n}"),
            NodeId::Pipeline(n) => format!("pipeline:{n}"),
        }
    }
}

/// Maps a trigger name to the nodes that listed it in their `triggers`
/// (§4.2). Built once at startup from the configured extractors and
/// pipelines; never mutated afterward.
#[derive(Default)]
pub struct Dag {
    dependents: HashMap<String, Vec<NodeId>>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, trigger_name: &str, dependent: NodeId) {
        self.dependents
            .entry(trigger_name.to_string())
            .or_default()
            .push(dependent);
    }

    pub fn dependents_of(&self, trigger_name: &str) -> &[NodeId] {
        self.dependents
            .get(trigger_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependents_resolve_by_trigger_name() {
        let mut dag = Dag::new();
        dag.add_edge("compute", NodeId::Extractor("feature_az".into()));
        dag.add_edge("compute", NodeId::Extractor("feature_utilization".into()));

        let deps = dag.dependents_of("compute");
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().any(|n| n.name() == "feature_az"));
    }

    #[test]
    fn unknown_trigger_has_no_dependents() {
        let dag = Dag::new();
        assert!(dag.dependents_of("nothing").is_empty());
    }
}
