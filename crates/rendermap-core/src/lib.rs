use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Resource types (matching the hosting provider's REST API) ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    WebService,
    PrivateService,
    BackgroundWorker,
    StaticSite,
    CronJob,
}

/// A deployed compute service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// "suspended" or "not_suspended" on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<String>,
}

/// A managed PostgreSQL instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresInstance {
    pub id: String,
    pub name: String,
    pub database_name: String,
    #[serde(default)]
    pub primary_connection_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A managed key-value (Redis-compatible) instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueInstance {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One environment variable scoped to a service. `value` is absent when the
/// secret is not materialized through the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

// --- Inferred edges ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Postgres,
    Redis,
    Internal,
    Unknown,
}

/// A dependency edge inferred from a service's environment variables.
/// `source` is the resource being depended on (database, cache, or another
/// service); `target` is the service whose env var referenced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub connection_type: ConnectionType,
    pub env_var_key: String,
    pub healthy: bool,
}

/// Generate an edge ID from the owning service and the resolved resource.
pub fn make_edge_id(service_id: &str, resource_id: &str) -> String {
    format!("edge-{}-{}", service_id, resource_id)
}

// --- Canvas node types (matching ReactFlow's Node structure) ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    WebService,
    PrivateService,
    BackgroundWorker,
    StaticSite,
    CronJob,
    Postgres,
    KeyValue,
}

impl ResourceKind {
    pub fn is_database(&self) -> bool {
        matches!(self, ResourceKind::Postgres | ResourceKind::KeyValue)
    }

    pub fn size_class(&self) -> SizeClass {
        if self.is_database() {
            SizeClass::Database
        } else {
            SizeClass::Compute
        }
    }
}

impl From<ServiceType> for ResourceKind {
    fn from(t: ServiceType) -> Self {
        match t {
            ServiceType::WebService => ResourceKind::WebService,
            ServiceType::PrivateService => ResourceKind::PrivateService,
            ServiceType::BackgroundWorker => ResourceKind::BackgroundWorker,
            ServiceType::StaticSite => ResourceKind::StaticSite,
            ServiceType::CronJob => ResourceKind::CronJob,
        }
    }
}

/// Layout footprint of a node. Database nodes render slightly smaller than
/// compute nodes, and the layout solver spaces siblings by these boxes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SizeClass {
    Compute,
    Database,
}

impl SizeClass {
    pub fn width(&self) -> f64 {
        match self {
            SizeClass::Compute => 240.0,
            SizeClass::Database => 220.0,
        }
    }

    pub fn height(&self) -> f64 {
        match self {
            SizeClass::Compute => 120.0,
            SizeClass::Database => 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A node on the canvas. Positions are top-left origins, assigned by the
/// layout engine or by user drag in the surrounding UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub position: Position,
    pub size_class: SizeClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ResourceKind) -> Self {
        GraphNode {
            id: id.into(),
            name: name.into(),
            kind,
            position: Position::default(),
            size_class: kind.size_class(),
            status: None,
        }
    }
}

// --- Resource-to-node mapping ---

/// Map the fetched resource lists to canvas nodes. Positions come from the
/// override map when the user has already placed a node, else (0, 0) until
/// the layout engine runs.
pub fn map_resources_to_nodes(
    services: &[Service],
    databases: &[PostgresInstance],
    key_values: &[KeyValueInstance],
    positions: &HashMap<String, Position>,
) -> Vec<GraphNode> {
    let mut nodes = Vec::with_capacity(services.len() + databases.len() + key_values.len());

    for svc in services {
        let mut node = GraphNode::new(&svc.id, &svc.name, ResourceKind::from(svc.service_type));
        node.status = if svc.suspended.as_deref() == Some("suspended") {
            Some("suspended".to_string())
        } else {
            svc.status.clone()
        };
        node.position = positions.get(&svc.id).copied().unwrap_or_default();
        nodes.push(node);
    }

    for db in databases {
        let mut node = GraphNode::new(&db.id, &db.name, ResourceKind::Postgres);
        node.status = db.status.clone();
        node.position = positions.get(&db.id).copied().unwrap_or_default();
        nodes.push(node);
    }

    for kv in key_values {
        let mut node = GraphNode::new(&kv.id, &kv.name, ResourceKind::KeyValue);
        node.status = kv.status.clone();
        node.position = positions.get(&kv.id).copied().unwrap_or_default();
        nodes.push(node);
    }

    nodes
}
