use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use warden_security::ThreatFinding;
use warden_types::{
    AgentRef, AuthorityLevel, ContractStatus, ServerStatus, ThreatSeverity,
};

/// Typed events published by the control plane. Subscribers register for
/// a component's stream and match on the variants they care about; there
/// are no wildcard listeners.
#[derive(Debug, Clone, Serialize)]
pub enum ControlPlaneEvent {
    ContractCreated {
        contract_id: Uuid,
        task_id: String,
        delegator_id: Uuid,
        delegatee_id: Uuid,
        delegation_depth: u32,
    },
    ContractStatusChanged {
        contract_id: Uuid,
        old_status: ContractStatus,
        new_status: ContractStatus,
    },
    ContractCancelled {
        contract_id: Uuid,
        reason: String,
    },
    SecurityThreatDetected {
        delegator_id: Uuid,
        delegatee_id: Uuid,
        blocked: bool,
        worst_severity: Option<ThreatSeverity>,
        findings: Vec<ThreatFinding>,
    },
    ReputationUpdated {
        agent_id: Uuid,
        outcome: String,
        reliability: f64,
        speed: f64,
        quality: f64,
        security: f64,
        aggregate: f64,
    },
    OverrideRequested {
        override_id: Uuid,
        requesting_agent: AgentRef,
        target_agent: AgentRef,
        authority_level: AuthorityLevel,
    },
    ServerHealthChanged {
        name: String,
        old_status: ServerStatus,
        new_status: ServerStatus,
    },
}

/// Broadcast-backed event bus. Each publishing component owns a handle;
/// publishing never blocks and never fails. Events published with no
/// subscribers are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ControlPlaneEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlPlaneEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ControlPlaneEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(ControlPlaneEvent::ContractCancelled {
            contract_id: Uuid::new_v4(),
            reason: "operator request".into(),
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            ControlPlaneEvent::ContractCancelled { .. },
        ));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(ControlPlaneEvent::ContractStatusChanged {
            contract_id: Uuid::new_v4(),
            old_status: ContractStatus::Pending,
            new_status: ContractStatus::Active,
        });
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_get_events() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(ControlPlaneEvent::ContractCancelled {
            contract_id: Uuid::new_v4(),
            reason: "x".into(),
        });
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_component_variants_roundtrip() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let agent = Uuid::new_v4();

        bus.publish(ControlPlaneEvent::ReputationUpdated {
            agent_id: agent,
            outcome: "success".into(),
            reliability: 0.65,
            speed: 0.5,
            quality: 0.65,
            security: 0.5,
            aggregate: 0.6,
        });
        bus.publish(ControlPlaneEvent::OverrideRequested {
            override_id: Uuid::new_v4(),
            requesting_agent: AgentRef::new(Uuid::new_v4(), "supervisor-7"),
            target_agent: AgentRef::new(Uuid::new_v4(), "worker"),
            authority_level: AuthorityLevel::Manager,
        });
        bus.publish(ControlPlaneEvent::ServerHealthChanged {
            name: "search".into(),
            old_status: ServerStatus::Unavailable,
            new_status: ServerStatus::Available,
        });

        match rx.recv().await.unwrap() {
            ControlPlaneEvent::ReputationUpdated { agent_id, .. } => {
                assert_eq!(agent_id, agent);
            }
            other => panic!("expected ReputationUpdated, got {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            ControlPlaneEvent::OverrideRequested { .. },
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ControlPlaneEvent::ServerHealthChanged { .. },
        ));
    }
}
