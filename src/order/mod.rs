//! Dependency resolver: orders planned objects so that referenced objects are
//! applied before the objects that reference them.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::db::{ConnectionProvider, require_environment};
use crate::diff::acquire;
use crate::error::EngineError;
use crate::introspect::{self, CatalogDependency};
use crate::model::{ObjectRef, ObjectType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyNode {
    pub object: ObjectRef,
    /// Node keys of the planned objects this one references.
    pub deps: Vec<String>,
}

impl DependencyNode {
    pub fn key(&self) -> String {
        self.object.node_key()
    }
}

/// Apply order plus the objects that could not be placed because they sit
/// on, or depend on, a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ordering {
    pub order: Vec<ObjectRef>,
    pub unordered: Vec<ObjectRef>,
}

impl Ordering {
    /// Request order with no dependency information.
    pub fn sequential(objects: impl IntoIterator<Item = ObjectRef>) -> Self {
        Self {
            order: objects.into_iter().collect(),
            unordered: Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectRef> {
        self.order.iter().chain(self.unordered.iter())
    }
}

fn same_object(object: &ObjectRef, schema: &str, name: &str) -> bool {
    object.schema.eq_ignore_ascii_case(schema) && object.name.eq_ignore_ascii_case(name)
}

/// Builds one node per distinct object. `lookup` maps node keys to the
/// catalog dependencies of that object; references to objects outside the
/// set, and self references, are ignored. Indexes depend on their parent
/// table when it is part of the set.
pub fn build_nodes(
    objects: &[ObjectRef],
    lookup: &HashMap<String, Vec<CatalogDependency>>,
) -> Vec<DependencyNode> {
    let mut seen = HashSet::new();
    let distinct: Vec<&ObjectRef> = objects
        .iter()
        .filter(|object| seen.insert(object.node_key()))
        .collect();

    distinct
        .iter()
        .map(|object| {
            let mut deps: Vec<String> = Vec::new();
            let mut push = |key: String| {
                if key != object.node_key() && !deps.contains(&key) {
                    deps.push(key);
                }
            };
            for dep in lookup.get(&object.node_key()).into_iter().flatten() {
                for other in distinct.iter().filter(|o| same_object(o, &dep.schema, &dep.name)) {
                    push(other.node_key());
                }
            }
            if let (ObjectType::Index, Some(table)) = (object.object_type, object.table.as_deref()) {
                for other in distinct.iter().filter(|o| {
                    o.object_type == ObjectType::Table && same_object(o, &object.schema, table)
                }) {
                    push(other.node_key());
                }
            }
            DependencyNode {
                object: (*object).clone(),
                deps,
            }
        })
        .collect()
}

/// Kahn's algorithm, dependencies first. Ready nodes are taken in request
/// order; nodes left over by a cycle are returned in `unordered`.
pub fn order(nodes: &[DependencyNode]) -> Ordering {
    let index: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.key(), idx))
        .collect();

    let mut pending: Vec<usize> = vec![0; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (idx, node) in nodes.iter().enumerate() {
        for dep in &node.deps {
            if let Some(&target) = index.get(dep) {
                pending[idx] += 1;
                dependents[target].push(idx);
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&idx| pending[idx] == 0).collect();
    let mut placed = vec![false; nodes.len()];
    let mut ordering = Ordering::default();
    while let Some(idx) = ready.pop_first() {
        placed[idx] = true;
        ordering.order.push(nodes[idx].object.clone());
        for &dependent in &dependents[idx] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    ordering.unordered = nodes
        .iter()
        .zip(placed)
        .filter(|(_, placed)| !placed)
        .map(|(node, _)| node.object.clone())
        .collect();
    if !ordering.unordered.is_empty() {
        warn!(
            count = ordering.unordered.len(),
            "dependency cycle detected; objects left unordered"
        );
    }
    ordering
}

/// Fetches catalog dependencies from `environment` and orders `objects`.
/// A failed lookup leaves that object without edges.
pub async fn resolve<P: ConnectionProvider + ?Sized>(
    provider: &P,
    environment: &str,
    objects: &[ObjectRef],
) -> Result<Ordering, EngineError> {
    require_environment(provider, environment)?;
    let mut session = acquire(provider, environment).await?;

    let mut lookup = HashMap::new();
    for object in objects {
        if object.object_type == ObjectType::Index {
            continue;
        }
        match introspect::dependencies(&mut session, &object.schema, &object.name).await {
            Ok(deps) => {
                lookup.insert(object.node_key(), deps);
            }
            Err(err) => warn!(object = %object, error = %err, "dependency lookup failed"),
        }
    }
    provider.release(session).await;

    let ordering = order(&build_nodes(objects, &lookup));
    debug!(
        ordered = ordering.order.len(),
        unordered = ordering.unordered.len(),
        "apply order resolved"
    );
    Ok(ordering)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::{FakeProvider, FakeSession};
    use crate::db::{ResultSet, Value};

    fn dep(schema: &str, name: &str) -> CatalogDependency {
        CatalogDependency {
            schema: schema.to_string(),
            name: name.to_string(),
            class: "OBJECT_OR_COLUMN".to_string(),
        }
    }

    fn names(objects: &[ObjectRef]) -> Vec<&str> {
        objects.iter().map(|o| o.name.as_str()).collect()
    }

    #[test]
    fn dependencies_come_first() {
        let view = ObjectRef::new(ObjectType::View, "dbo", "vOrders");
        let table = ObjectRef::table("dbo", "Orders");
        let mut lookup = HashMap::new();
        lookup.insert(view.node_key(), vec![dep("DBO", "orders"), dep("dbo", "Elsewhere")]);
        let ordering = order(&build_nodes(&[view, table], &lookup));
        assert_eq!(names(&ordering.order), vec!["Orders", "vOrders"]);
        assert!(ordering.unordered.is_empty());
    }

    #[test]
    fn independent_objects_keep_request_order() {
        let objects = vec![
            ObjectRef::table("dbo", "C"),
            ObjectRef::table("dbo", "A"),
            ObjectRef::table("dbo", "B"),
        ];
        let ordering = order(&build_nodes(&objects, &HashMap::new()));
        assert_eq!(names(&ordering.order), vec!["C", "A", "B"]);
    }

    #[test]
    fn cycles_are_reported_not_dropped() {
        let a = ObjectRef::new(ObjectType::View, "dbo", "A");
        let b = ObjectRef::new(ObjectType::View, "dbo", "B");
        let c = ObjectRef::new(ObjectType::View, "dbo", "C");
        let d = ObjectRef::table("dbo", "D");
        let mut lookup = HashMap::new();
        lookup.insert(a.node_key(), vec![dep("dbo", "B")]);
        lookup.insert(b.node_key(), vec![dep("dbo", "A")]);
        lookup.insert(c.node_key(), vec![dep("dbo", "A")]);
        let ordering = order(&build_nodes(&[a, b, c, d], &lookup));
        assert_eq!(names(&ordering.order), vec!["D"]);
        assert_eq!(names(&ordering.unordered), vec!["A", "B", "C"]);
    }

    #[test]
    fn self_references_and_duplicates_are_ignored() {
        let t = ObjectRef::table("dbo", "T");
        let mut lookup = HashMap::new();
        lookup.insert(t.node_key(), vec![dep("dbo", "T")]);
        let nodes = build_nodes(&[t.clone(), t], &lookup);
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].deps.is_empty());
    }

    #[test]
    fn indexes_follow_their_table() {
        let index = ObjectRef::index("dbo", "Orders", "IX_Orders");
        let table = ObjectRef::table("dbo", "Orders");
        let ordering = order(&build_nodes(&[index, table], &HashMap::new()));
        assert_eq!(names(&ordering.order), vec!["Orders", "IX_Orders"]);
    }

    #[tokio::test]
    async fn resolve_reads_dependencies_from_the_environment() {
        let session = FakeSession::new().respond(
            "sql_expression_dependencies",
            vec![ResultSet::new(
                &["referenced_schema_name", "referenced_entity_name", "referenced_class_desc"],
                vec![vec![
                    Value::Text("dbo".into()),
                    Value::Text("Orders".into()),
                    Value::Text("OBJECT_OR_COLUMN".into()),
                ]],
            )],
        );
        let provider = FakeProvider::default().with("DEV", session);
        let view = ObjectRef::new(ObjectType::View, "dbo", "vOrders");
        let table = ObjectRef::table("dbo", "Orders");
        let ordering = resolve(&provider, "DEV", &[view, table]).await.expect("ordering");
        // Both objects report a dependency on Orders; the table's own is a self reference.
        assert_eq!(names(&ordering.order), vec!["Orders", "vOrders"]);
        assert_eq!(provider.release_count(), 1);
    }
}
