use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use serde::Serialize;

use crate::error::LibSchemaError;
use crate::schema::Migration;

/// Identity of a migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MigrationKey {
    pub app: &'static str,
    pub name: &'static str,
}

impl fmt::Display for MigrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app, self.name)
    }
}

/// Parses the four digit sequence prefix of a migration name
/// (`0006_alter_book_best_seller` -> 6).
pub fn sequence_number(name: &str) -> Option<u32> {
    let (prefix, rest) = name.split_once('_')?;
    if prefix.len() != 4 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if rest.is_empty()
        || !rest
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return None;
    }
    prefix.parse().ok()
}

/// Validated dependency graph of every known migration. Edges run from a
/// dependency to the step that declares it.
pub struct MigrationGraph {
    graph: DiGraph<MigrationKey, ()>,
    indices: BTreeMap<MigrationKey, NodeIndex>,
    nodes: BTreeMap<MigrationKey, &'static Migration>,
    parents: BTreeMap<MigrationKey, Vec<MigrationKey>>,
}

impl MigrationGraph {
    pub fn build(migrations: &[&'static Migration]) -> Result<Self, LibSchemaError> {
        let mut nodes = BTreeMap::new();

        for migration in migrations {
            let key = MigrationKey {
                app: migration.app_label,
                name: migration.name,
            };
            if sequence_number(key.name).is_none() {
                return Err(LibSchemaError::Graph(format!(
                    "Migration name {key} does not follow the NNNN_name convention"
                )));
            }
            if nodes.insert(key, *migration).is_some() {
                return Err(LibSchemaError::Graph(format!("Duplicate migration {key}")));
            }
        }

        // Nodes go in sorted key order so toposort is stable across builds
        let mut graph = DiGraph::new();
        let mut indices = BTreeMap::new();
        for key in nodes.keys() {
            indices.insert(*key, graph.add_node(*key));
        }

        let mut parents = BTreeMap::new();
        for (key, migration) in &nodes {
            let mut deps = Vec::with_capacity(migration.dependencies.len());
            for (dep_app, dep_name) in migration.dependencies {
                let dep = nodes
                    .keys()
                    .find(|k| k.app == *dep_app && k.name == *dep_name)
                    .copied()
                    .ok_or_else(|| {
                        LibSchemaError::Graph(format!(
                            "Migration {key} depends on nonexistent {dep_app}.{dep_name}"
                        ))
                    })?;

                if dep.app == key.app && sequence_number(dep.name) >= sequence_number(key.name) {
                    return Err(LibSchemaError::Graph(format!(
                        "Migration {key} depends on {dep}, which does not precede it"
                    )));
                }
                graph.add_edge(indices[&dep], indices[key], ());
                deps.push(dep);
            }
            parents.insert(*key, deps);
        }

        let cycles: Vec<Vec<NodeIndex>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .collect();
        if let Some(cycle) = cycles.first() {
            let mut members: Vec<String> = cycle.iter().map(|ix| graph[*ix].to_string()).collect();
            members.sort();
            return Err(LibSchemaError::Graph(format!(
                "Dependency cycle among: {}",
                members.join(", ")
            )));
        }

        Ok(Self {
            graph,
            indices,
            nodes,
            parents,
        })
    }

    pub fn key(&self, app: &str, name: &str) -> Option<MigrationKey> {
        self.nodes
            .keys()
            .find(|k| k.app == app && k.name == name)
            .copied()
    }

    pub fn migration(&self, key: &MigrationKey) -> Option<&'static Migration> {
        self.nodes.get(key).copied()
    }

    /// Declared dependencies of `key`, in declaration order.
    pub fn dependencies(&self, key: &MigrationKey) -> &[MigrationKey] {
        self.parents.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Steps of `app` that no other step of `app` depends on.
    pub fn leaf_nodes(&self, app: &str) -> Vec<MigrationKey> {
        self.indices
            .iter()
            .filter(|(key, _)| key.app == app)
            .filter(|(_, ix)| {
                !self
                    .graph
                    .neighbors_directed(**ix, Direction::Outgoing)
                    .any(|child| self.graph[child].app == app)
            })
            .map(|(key, _)| *key)
            .collect()
    }

    /// Every ancestor of `target` followed by `target` itself.
    pub fn forwards_plan(&self, target: MigrationKey) -> Result<Vec<MigrationKey>, LibSchemaError> {
        let start = *self
            .indices
            .get(&target)
            .ok_or_else(|| LibSchemaError::NotFound(format!("Migration {target}")))?;

        let reversed = Reversed(&self.graph);
        let mut ancestors = BTreeSet::new();
        let mut dfs = Dfs::new(reversed, start);
        while let Some(ix) = dfs.next(reversed) {
            ancestors.insert(self.graph[ix]);
        }

        Ok(self
            .full_plan()?
            .into_iter()
            .filter(|key| ancestors.contains(key))
            .collect())
    }

    /// Topological order of the whole graph.
    pub fn full_plan(&self) -> Result<Vec<MigrationKey>, LibSchemaError> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|ix| self.graph[ix]).collect())
            .map_err(|cycle| {
                LibSchemaError::Graph(format!(
                    "Dependency cycle involving {}",
                    self.graph[cycle.node_id()]
                ))
            })
    }
}
