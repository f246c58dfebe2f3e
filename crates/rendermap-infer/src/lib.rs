pub mod patterns;
mod resolve;

pub use patterns::{detect_connection_type, INTERNAL_HOST_SUFFIX};

use async_trait::async_trait;
use futures::future::join_all;
use rendermap_core::{
    make_edge_id, ConnectionEdge, ConnectionType, EnvVar, KeyValueInstance, PostgresInstance,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Upstream rate-limit policy: at most this many env-var fetches in flight,
/// with a pause between batches.
const BATCH_SIZE: usize = 5;
const BATCH_DELAY: Duration = Duration::from_millis(200);

/// Capability for fetching a service's environment variables, supplied by
/// the API-client collaborator. Only the batching policy around calls lives
/// in this crate, not the transport.
#[async_trait]
pub trait EnvVarSource: Send + Sync {
    async fn env_vars(&self, service_id: &str) -> Result<Vec<EnvVar>, String>;
}

/// Fetch env vars for every service in fixed-size batches. Each batch runs
/// concurrently and must fully settle before the next one starts; a failed
/// fetch degrades to an empty list for that service.
async fn fetch_env_vars_batched<S: EnvVarSource + ?Sized>(
    source: &S,
    service_ids: &[String],
) -> HashMap<String, Vec<EnvVar>> {
    let mut result = HashMap::with_capacity(service_ids.len());
    let batches: Vec<&[String]> = service_ids.chunks(BATCH_SIZE).collect();
    let last = batches.len().saturating_sub(1);

    for (i, batch) in batches.iter().enumerate() {
        let fetches = batch.iter().map(|id| async move {
            match source.env_vars(id).await {
                Ok(vars) => (id.clone(), vars),
                Err(e) => {
                    eprintln!("[rendermap-infer] env fetch failed for {}: {}", id, e);
                    (id.clone(), Vec::new())
                }
            }
        });
        for (id, vars) in join_all(fetches).await {
            result.insert(id, vars);
        }
        if i < last {
            tokio::time::sleep(BATCH_DELAY).await;
        }
    }

    result
}

/// Infer dependency edges for an account from its services' environment
/// variables.
///
/// Every variable value is classified against the known connection-string
/// shapes and resolved to a concrete resource; an edge points from the
/// resolved resource (the dependency) to the service owning the variable.
/// Self-references are skipped and only the first edge per (service,
/// resource) pair survives. Never fails: fetch errors degrade per service
/// and unresolvable values are simply dropped.
pub async fn detect_connections<S: EnvVarSource + ?Sized>(
    source: &S,
    service_ids: &[String],
    databases: &[PostgresInstance],
    key_values: &[KeyValueInstance],
    service_names: &HashMap<String, String>,
) -> Vec<ConnectionEdge> {
    let env_vars = fetch_env_vars_batched(source, service_ids).await;

    // Sorted so ambiguous hostname matches resolve identically on every pass.
    let mut name_pairs: Vec<(String, String)> = service_names
        .iter()
        .map(|(id, name)| (id.clone(), name.clone()))
        .collect();
    name_pairs.sort();

    let mut edges = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for service_id in service_ids {
        let Some(vars) = env_vars.get(service_id) else {
            continue;
        };
        for var in vars {
            let Some(value) = &var.value else { continue };

            let conn_type = detect_connection_type(value);
            if conn_type == ConnectionType::Unknown && !value.contains(INTERNAL_HOST_SUFFIX) {
                continue;
            }

            let Some(target_id) = resolve::resolve_target(value, databases, key_values, &name_pairs)
            else {
                continue;
            };
            if &target_id == service_id {
                continue;
            }
            if !seen.insert((service_id.clone(), target_id.clone())) {
                continue;
            }

            edges.push(ConnectionEdge {
                id: make_edge_id(service_id, &target_id),
                source: target_id,
                target: service_id.clone(),
                connection_type: conn_type,
                env_var_key: var.key.clone(),
                healthy: true,
            });
        }
    }

    eprintln!(
        "[rendermap-infer] inferred {} edges across {} services",
        edges.len(),
        service_ids.len()
    );
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticSource(HashMap<String, Vec<EnvVar>>);

    #[async_trait]
    impl EnvVarSource for StaticSource {
        async fn env_vars(&self, service_id: &str) -> Result<Vec<EnvVar>, String> {
            Ok(self.0.get(service_id).cloned().unwrap_or_default())
        }
    }

    /// Fails for one service, delegates to a static map for the rest.
    struct FlakySource {
        fail_for: String,
        inner: StaticSource,
    }

    #[async_trait]
    impl EnvVarSource for FlakySource {
        async fn env_vars(&self, service_id: &str) -> Result<Vec<EnvVar>, String> {
            if service_id == self.fail_for {
                Err("503 from upstream".to_string())
            } else {
                self.inner.env_vars(service_id).await
            }
        }
    }

    /// Tracks how many fetches are in flight at once and in what order
    /// services were seen.
    struct CountingSource {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    impl CountingSource {
        fn new() -> Self {
            CountingSource {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                order: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EnvVarSource for CountingSource {
        async fn env_vars(&self, service_id: &str) -> Result<Vec<EnvVar>, String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.order.lock().unwrap().push(service_id.to_string());
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn var(key: &str, value: &str) -> EnvVar {
        EnvVar {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    fn postgres(id: &str, db_name: &str, conn: &str) -> PostgresInstance {
        PostgresInstance {
            id: id.into(),
            name: id.into(),
            database_name: db_name.into(),
            primary_connection_string: conn.into(),
            status: None,
        }
    }

    #[tokio::test]
    async fn end_to_end_postgres_edge() {
        let mut vars = HashMap::new();
        vars.insert(
            "svc1".to_string(),
            vec![var("DATABASE_URL", "postgres://u:p@host1/app")],
        );
        vars.insert("svc2".to_string(), vec![]);
        let source = StaticSource(vars);
        let dbs = vec![postgres("db1", "app", "postgres://u:p@host1/app")];

        let edges =
            detect_connections(&source, &ids(&["svc1", "svc2"]), &dbs, &[], &HashMap::new()).await;

        assert_eq!(edges.len(), 1);
        let edge = &edges[0];
        assert_eq!(edge.source, "db1");
        assert_eq!(edge.target, "svc1");
        assert_eq!(edge.connection_type, ConnectionType::Postgres);
        assert_eq!(edge.env_var_key, "DATABASE_URL");
        assert!(edge.healthy);
        assert!(!edges.iter().any(|e| e.source == "svc2" || e.target == "svc2"));
    }

    #[tokio::test]
    async fn internal_hostname_resolves_to_service() {
        let mut vars = HashMap::new();
        vars.insert(
            "svc1".to_string(),
            vec![var("API_URL", "https://my-api.onrender.com")],
        );
        let source = StaticSource(vars);
        let mut names = HashMap::new();
        names.insert("svc2".to_string(), "My API".to_string());

        let edges =
            detect_connections(&source, &ids(&["svc1"]), &[], &[], &names).await;

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, "svc2");
        assert_eq!(edges[0].target, "svc1");
        assert_eq!(edges[0].connection_type, ConnectionType::Internal);
    }

    #[tokio::test]
    async fn never_emits_self_edges() {
        let mut vars = HashMap::new();
        vars.insert(
            "svc1".to_string(),
            vec![var("SELF_URL", "https://my-api.onrender.com")],
        );
        let source = StaticSource(vars);
        let mut names = HashMap::new();
        names.insert("svc1".to_string(), "My API".to_string());

        let edges = detect_connections(&source, &ids(&["svc1"]), &[], &[], &names).await;
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn duplicate_pairs_keep_first_match() {
        let mut vars = HashMap::new();
        vars.insert(
            "svc1".to_string(),
            vec![
                var("DATABASE_URL", "postgres://u:p@host1/app"),
                var("DB_BACKUP_URL", "postgres://u:p@host1/app"),
            ],
        );
        let source = StaticSource(vars);
        let dbs = vec![postgres("db1", "app", "postgres://u:p@host1/app")];

        let edges = detect_connections(&source, &ids(&["svc1"]), &dbs, &[], &HashMap::new()).await;

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].env_var_key, "DATABASE_URL");
    }

    #[tokio::test]
    async fn valueless_vars_produce_no_edges() {
        let mut vars = HashMap::new();
        vars.insert(
            "svc1".to_string(),
            vec![EnvVar {
                key: "DATABASE_URL".into(),
                value: None,
            }],
        );
        let source = StaticSource(vars);
        let dbs = vec![postgres("db1", "app", "postgres://u:p@host1/app")];

        let edges = detect_connections(&source, &ids(&["svc1"]), &dbs, &[], &HashMap::new()).await;
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn one_failing_fetch_does_not_abort_the_pass() {
        let mut vars = HashMap::new();
        vars.insert(
            "svc2".to_string(),
            vec![var("DATABASE_URL", "postgres://u:p@host1/app")],
        );
        let source = FlakySource {
            fail_for: "svc1".to_string(),
            inner: StaticSource(vars),
        };
        let dbs = vec![postgres("db1", "app", "postgres://u:p@host1/app")];

        let edges =
            detect_connections(&source, &ids(&["svc1", "svc2"]), &dbs, &[], &HashMap::new()).await;

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, "svc2");
    }

    #[tokio::test]
    async fn unknown_values_are_skipped_before_resolution() {
        let mut vars = HashMap::new();
        vars.insert(
            "svc1".to_string(),
            vec![var("NODE_ENV", "production"), var("CACHE_TTL", "redis-like-but-not")],
        );
        let source = StaticSource(vars);
        let kvs = vec![KeyValueInstance {
            id: "red-1".into(),
            name: "cache".into(),
            status: None,
        }];

        // Neither value matches a connection shape or the internal suffix,
        // so the kv containment rules never run.
        let edges = detect_connections(&source, &ids(&["svc1"]), &[], &kvs, &HashMap::new()).await;
        assert!(edges.is_empty());
    }

    #[tokio::test]
    async fn redis_value_resolves_to_key_value_instance() {
        let mut vars = HashMap::new();
        vars.insert(
            "svc1".to_string(),
            vec![var("REDIS_URL", "redis://red-host:6379")],
        );
        let source = StaticSource(vars);
        let kvs = vec![KeyValueInstance {
            id: "red-1".into(),
            name: "cache".into(),
            status: None,
        }];

        let edges = detect_connections(&source, &ids(&["svc1"]), &[], &kvs, &HashMap::new()).await;
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, "red-1");
        assert_eq!(edges[0].connection_type, ConnectionType::Redis);
    }

    #[tokio::test]
    async fn at_most_one_edge_per_ordered_pair() {
        let mut vars = HashMap::new();
        vars.insert(
            "svc1".to_string(),
            vec![
                var("DATABASE_URL", "postgres://u:p@host1/app"),
                var("REDIS_URL", "redis://red-host:6379"),
                var("PG_AGAIN", "postgresql://u:p@host1/app"),
            ],
        );
        let source = StaticSource(vars);
        let dbs = vec![postgres("db1", "app", "postgres://u:p@host1/app")];
        let kvs = vec![KeyValueInstance {
            id: "red-1".into(),
            name: "cache".into(),
            status: None,
        }];

        let edges = detect_connections(&source, &ids(&["svc1"]), &dbs, &kvs, &HashMap::new()).await;

        let mut pairs: Vec<(String, String)> = edges
            .iter()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();
        let before = pairs.len();
        pairs.sort();
        pairs.dedup();
        assert_eq!(before, pairs.len());
        assert_eq!(edges.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_run_in_batches_of_five() {
        let source = CountingSource::new();
        let service_ids: Vec<String> = (0..12).map(|i| format!("srv-{}", i)).collect();

        fetch_env_vars_batched(&source, &service_ids).await;

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 5);
        let order = source.order.lock().unwrap();
        assert_eq!(order.len(), 12);
        // Every request of a batch starts before any request of the next.
        for (i, id) in order.iter().enumerate() {
            let batch = service_ids.iter().position(|s| s == id).unwrap() / 5;
            assert_eq!(batch, i / 5);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn all_services_are_fetched_exactly_once() {
        let source = CountingSource::new();
        let service_ids: Vec<String> = (0..7).map(|i| format!("srv-{}", i)).collect();

        let result = fetch_env_vars_batched(&source, &service_ids).await;

        assert_eq!(result.len(), 7);
        let mut order = source.order.lock().unwrap().clone();
        order.sort();
        let mut expected = service_ids.clone();
        expected.sort();
        assert_eq!(order, expected);
    }
}
