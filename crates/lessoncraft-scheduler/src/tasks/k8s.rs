//! Kubernetes cluster probes.
//!
//! Instances tagged `k8s` run a cluster node whose API server listens on
//! the instance address. The status probe records whether the node is a
//! control-plane member; the port probe merges NodePort services into the
//! instance's port list.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::api::{Api, ListParams};
use kube::Client;
use lessoncraft_store::{ClusterRole, Instance, Store};
use tracing::debug;

use crate::error::{Result, SchedulerError};
use crate::Task;

/// Instance type tag for Kubernetes cluster nodes.
const K8S_KIND: &str = "k8s";

/// Label carried by control-plane nodes.
const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";

fn client_for(instance: &Instance) -> Result<Client> {
    let url = format!("https://{}:6443", instance.ip);
    let cluster_url = url
        .parse()
        .map_err(|e| SchedulerError::Kubernetes(format!("bad cluster url: {e}")))?;
    let mut config = kube::Config::new(cluster_url);
    // Learner clusters mint their own certificates.
    config.accept_invalid_certs = true;

    Client::try_from(config).map_err(SchedulerError::from)
}

/// Determine the cluster role of the node matching the instance hostname.
fn role_of(nodes: &[Node], hostname: &str) -> Option<ClusterRole> {
    let node = nodes.iter().find(|n| {
        n.metadata
            .name
            .as_deref()
            .is_some_and(|name| name == hostname)
    })?;

    let is_control_plane = node
        .metadata
        .labels
        .as_ref()
        .is_some_and(|labels| labels.contains_key(CONTROL_PLANE_LABEL));

    Some(if is_control_plane {
        ClusterRole::Manager
    } else {
        ClusterRole::Worker
    })
}

/// Collect NodePort ports from a service list.
fn node_ports(services: &[Service]) -> Vec<u16> {
    let mut ports: Vec<u16> = services
        .iter()
        .filter(|svc| {
            svc.spec
                .as_ref()
                .and_then(|s| s.type_.as_deref())
                .is_some_and(|t| t == "NodePort")
        })
        .flat_map(|svc| {
            svc.spec
                .as_ref()
                .and_then(|s| s.ports.as_ref())
                .into_iter()
                .flatten()
        })
        .filter_map(|port| port.node_port)
        .filter_map(|port| u16::try_from(port).ok())
        .collect();
    ports.sort_unstable();
    ports.dedup();
    ports
}

/// The `CheckK8sClusterStatus` sweep task.
pub struct CheckK8sClusterStatus<S> {
    store: Arc<S>,
}

impl<S: Store> CheckK8sClusterStatus<S> {
    /// Create the task.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store + 'static> Task for CheckK8sClusterStatus<S> {
    fn name(&self) -> &'static str {
        "CheckK8sClusterStatus"
    }

    async fn run(&self, instance: &Instance) -> Result<()> {
        if instance.kind != K8S_KIND {
            return Ok(());
        }

        let client = client_for(instance)?;
        let nodes = Api::<Node>::all(client)
            .list(&ListParams::default())
            .await?;

        let role = role_of(&nodes.items, &instance.hostname);
        if role != instance.cluster_role {
            debug!(instance = %instance.name, ?role, "cluster role changed");
            let mut updated = instance.clone();
            updated.cluster_role = role;
            self.store.instance_put(&updated).await?;
        }
        Ok(())
    }
}

/// The `CheckK8sClusterExposedPorts` sweep task.
pub struct CheckK8sClusterExposedPorts<S> {
    store: Arc<S>,
}

impl<S: Store> CheckK8sClusterExposedPorts<S> {
    /// Create the task.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store + 'static> Task for CheckK8sClusterExposedPorts<S> {
    fn name(&self) -> &'static str {
        "CheckK8sClusterExposedPorts"
    }

    async fn run(&self, instance: &Instance) -> Result<()> {
        if instance.kind != K8S_KIND || instance.cluster_role != Some(ClusterRole::Manager) {
            return Ok(());
        }

        let client = client_for(instance)?;
        let services = Api::<Service>::all(client)
            .list(&ListParams::default())
            .await?;

        let mut merged = instance.ports.clone();
        merged.extend(node_ports(&services.items));
        merged.sort_unstable();
        merged.dedup();

        if merged != instance.ports {
            debug!(instance = %instance.name, ports = ?merged, "exposed node ports changed");
            let mut updated = instance.clone();
            updated.ports = merged;
            self.store.instance_put(&updated).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeSpec, ServicePort, ServiceSpec};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn node(name: &str, control_plane: bool) -> Node {
        let mut labels = BTreeMap::new();
        if control_plane {
            labels.insert(CONTROL_PLANE_LABEL.to_string(), String::new());
        }
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..ObjectMeta::default()
            },
            spec: Some(NodeSpec::default()),
            status: None,
        }
    }

    #[test]
    fn role_matches_hostname() {
        let nodes = vec![node("node1", true), node("node2", false)];
        assert_eq!(role_of(&nodes, "node1"), Some(ClusterRole::Manager));
        assert_eq!(role_of(&nodes, "node2"), Some(ClusterRole::Worker));
        assert_eq!(role_of(&nodes, "node3"), None);
    }

    #[test]
    fn node_ports_from_nodeport_services() {
        let nodeport = Service {
            metadata: ObjectMeta::default(),
            spec: Some(ServiceSpec {
                type_: Some("NodePort".to_string()),
                ports: Some(vec![
                    ServicePort {
                        node_port: Some(30080),
                        ..ServicePort::default()
                    },
                    ServicePort {
                        node_port: Some(30090),
                        ..ServicePort::default()
                    },
                ]),
                ..ServiceSpec::default()
            }),
            status: None,
        };
        let cluster_ip = Service {
            metadata: ObjectMeta::default(),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                ports: Some(vec![ServicePort {
                    node_port: Some(31000),
                    ..ServicePort::default()
                }]),
                ..ServiceSpec::default()
            }),
            status: None,
        };

        assert_eq!(node_ports(&[nodeport, cluster_ip]), vec![30080, 30090]);
    }
}
