//! Unary long-poll fetch.
//!
//! A client posts the version it holds; the answer is either a newer
//! state-of-the-world response or, after `fetch_timeout_secs`, nothing.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::discovery::protocol::{DiscoveryRequest, DiscoveryResponse};
use crate::discovery::{sotw, DiscoveryService};
use crate::error::{Result, XdsError};
use crate::resources::{NodeGroup, ResourceType};

impl DiscoveryService {
    /// Fetch `resource_type` for the request's node group.
    ///
    /// Returns `Ok(None)` when no version other than `version_info` appeared
    /// before the fetch timeout.
    pub async fn fetch(
        &self,
        resource_type: ResourceType,
        request: DiscoveryRequest,
    ) -> Result<Option<DiscoveryResponse>> {
        if !request.type_url.is_empty() && ResourceType::parse(&request.type_url)? != resource_type {
            return Err(XdsError::MalformedRequest(format!(
                "body names {} but the path names {}",
                request.type_url, resource_type
            )));
        }

        let node_group = if request.node_group.trim().is_empty() {
            self.default_group().clone()
        } else {
            NodeGroup::new(request.node_group)
        };
        let known = (!request.version_info.is_empty()).then_some(request.version_info);
        let names: BTreeSet<String> = request.resource_names.into_iter().collect();

        let mut watch = self.store().watch(&node_group, resource_type, known.clone());
        let wait = Duration::from_secs(self.config().fetch_timeout_secs);

        let snapshot = match tokio::time::timeout(wait, watch.changed()).await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                tracing::debug!(
                    node_group = %node_group,
                    resource_type = %resource_type,
                    version_info = ?known,
                    "Fetch timed out without a newer version"
                );
                return Ok(None);
            }
        };

        let nonce = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            node_group = %node_group,
            resource_type = %resource_type,
            version = %snapshot.version(),
            "Fetch answered"
        );
        Ok(Some(sotw::response(
            &snapshot,
            resource_type,
            |name| names.is_empty() || names.contains(name),
            nonce,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SnapshotStore;
    use crate::config::DiscoveryConfig;
    use crate::resilience::backoff::Backoff;
    use crate::resources::{Resource, Snapshot};
    use crate::subscription::SubscriptionTracker;
    use std::sync::Arc;

    fn service() -> DiscoveryService {
        DiscoveryService::new(
            Arc::new(SnapshotStore::new()),
            Arc::new(SubscriptionTracker::new(Backoff::default())),
            DiscoveryConfig {
                fetch_timeout_secs: 1,
                ..DiscoveryConfig::default()
            },
            NodeGroup::from("default"),
        )
    }

    fn publish(service: &DiscoveryService, version: &str) {
        let snapshot = Snapshot::new(
            version,
            [(
                ResourceType::Cluster,
                vec![
                    Resource::new("web_service", b"web".to_vec()),
                    Resource::new("auth", b"auth".to_vec()),
                ],
            )],
        )
        .unwrap();
        service.store().set_snapshot(&"default".into(), snapshot).unwrap();
    }

    #[tokio::test]
    async fn answers_immediately_when_behind() {
        let service = service();
        publish(&service, "1");
        let response = service
            .fetch(
                ResourceType::Cluster,
                DiscoveryRequest {
                    resource_names: vec!["web_service".into()],
                    ..DiscoveryRequest::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.version_info, "1");
        assert_eq!(response.resources.len(), 1);
        assert!(uuid::Uuid::parse_str(&response.nonce).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_current() {
        let service = service();
        publish(&service, "1");
        let response = service
            .fetch(
                ResourceType::Cluster,
                DiscoveryRequest {
                    version_info: "1".into(),
                    ..DiscoveryRequest::default()
                },
            )
            .await
            .unwrap();
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn waits_for_next_publish() {
        let service = Arc::new(service());
        publish(&service, "1");
        let waiter = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .fetch(
                        ResourceType::Cluster,
                        DiscoveryRequest {
                            version_info: "1".into(),
                            ..DiscoveryRequest::default()
                        },
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        publish(&service, "2");
        let response = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(response.version_info, "2");
    }

    #[tokio::test]
    async fn mismatched_type_is_malformed() {
        let service = service();
        let err = service
            .fetch(
                ResourceType::Cluster,
                DiscoveryRequest {
                    type_url: "listener".into(),
                    ..DiscoveryRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, XdsError::MalformedRequest(_)));
    }
}
