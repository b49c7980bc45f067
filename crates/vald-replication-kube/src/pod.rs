//! Conversion from Kubernetes pods to member records.

use k8s_openapi::api::core::v1::Pod;
use vald_replication::{MemberRecord, MemberSnapshot};

/// Label used to group pods by application when none is configured.
pub const DEFAULT_APP_LABEL: &str = "app";

const RUNNING: &str = "Running";

/// Converts a pod into its application group and member record.
///
/// Returns `None` for pods that cannot serve traffic: pods being deleted,
/// pods without an IP, pods outside the `Running` phase, and pods missing
/// the app label or a name.
pub fn member_from_pod(pod: &Pod, app_label: &str) -> Option<(String, MemberRecord)> {
    let meta = &pod.metadata;
    if meta.deletion_timestamp.is_some() {
        return None;
    }

    let status = pod.status.as_ref()?;
    if status.phase.as_deref() != Some(RUNNING) {
        return None;
    }
    let address = status.pod_ip.as_deref().filter(|ip| !ip.is_empty())?;

    let app = meta.labels.as_ref()?.get(app_label)?;
    let name = meta.name.as_deref()?;
    let node_name = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.node_name.as_deref())
        .unwrap_or_default();

    let record = MemberRecord::new(
        name,
        meta.namespace.as_deref().unwrap_or_default(),
        address,
        node_name,
    );
    Some((app.clone(), record))
}

/// Groups every eligible pod by application. Groups are sorted by member
/// name so identical pod sets always produce identical snapshots.
pub fn snapshot_from_pods<'a>(
    pods: impl IntoIterator<Item = &'a Pod>,
    app_label: &str,
) -> MemberSnapshot {
    let mut snapshot = MemberSnapshot::new();
    for (app, record) in pods
        .into_iter()
        .filter_map(|pod| member_from_pod(pod, app_label))
    {
        snapshot.entry(app).or_default().push(record);
    }
    for members in snapshot.values_mut() {
        members.sort_by(|a, b| a.name.cmp(&b.name));
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(name: &str, app: &str, ip: Option<&str>, phase: &str) -> Pod {
        serde_json::from_value(json!({
            "metadata": {
                "name": name,
                "namespace": "vald",
                "labels": { "app": app },
            },
            "spec": {
                "nodeName": "node-a",
                "containers": [],
            },
            "status": {
                "phase": phase,
                "podIP": ip,
            },
        }))
        .unwrap()
    }

    #[test]
    fn running_pod_becomes_member() {
        let pod = pod("vald-agent-0", "vald-agent", Some("10.0.0.1"), "Running");

        let (app, record) = member_from_pod(&pod, DEFAULT_APP_LABEL).unwrap();

        assert_eq!(app, "vald-agent");
        assert_eq!(
            record,
            MemberRecord::new("vald-agent-0", "vald", "10.0.0.1", "node-a")
        );
    }

    #[test]
    fn pending_pod_is_skipped() {
        let pod = pod("vald-agent-0", "vald-agent", Some("10.0.0.1"), "Pending");
        assert!(member_from_pod(&pod, DEFAULT_APP_LABEL).is_none());
    }

    #[test]
    fn pod_without_ip_is_skipped() {
        let pod = pod("vald-agent-0", "vald-agent", None, "Running");
        assert!(member_from_pod(&pod, DEFAULT_APP_LABEL).is_none());

        let pod = pod_with_empty_ip();
        assert!(member_from_pod(&pod, DEFAULT_APP_LABEL).is_none());
    }

    fn pod_with_empty_ip() -> Pod {
        let mut pod = pod("vald-agent-0", "vald-agent", None, "Running");
        if let Some(status) = pod.status.as_mut() {
            status.pod_ip = Some(String::new());
        }
        pod
    }

    #[test]
    fn terminating_pod_is_skipped() {
        let mut pod = pod("vald-agent-0", "vald-agent", Some("10.0.0.1"), "Running");
        pod.metadata.deletion_timestamp =
            Some(serde_json::from_value(json!("2024-01-01T00:00:00Z")).unwrap());

        assert!(member_from_pod(&pod, DEFAULT_APP_LABEL).is_none());
    }

    #[test]
    fn custom_app_label() {
        let pod = pod("vald-agent-0", "vald-agent", Some("10.0.0.1"), "Running");

        assert!(member_from_pod(&pod, "app.kubernetes.io/name").is_none());
    }

    #[test]
    fn unscheduled_pod_has_empty_node_name() {
        let mut pod = pod("vald-agent-0", "vald-agent", Some("10.0.0.1"), "Running");
        pod.spec = None;

        let (_, record) = member_from_pod(&pod, DEFAULT_APP_LABEL).unwrap();
        assert_eq!(record.node_name, "");
    }

    #[test]
    fn snapshot_groups_and_sorts() {
        let pods = [
            pod("vald-agent-1", "vald-agent", Some("10.0.0.2"), "Running"),
            pod("vald-lb-0", "vald-lb-gateway", Some("10.0.1.1"), "Running"),
            pod("vald-agent-0", "vald-agent", Some("10.0.0.1"), "Running"),
            pod("vald-agent-2", "vald-agent", None, "Pending"),
        ];

        let snapshot = snapshot_from_pods(&pods, DEFAULT_APP_LABEL);

        assert_eq!(snapshot.len(), 2);
        let agents: Vec<_> = snapshot["vald-agent"]
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(agents, ["vald-agent-0", "vald-agent-1"]);
        assert_eq!(snapshot["vald-lb-gateway"].len(), 1);
    }
}
