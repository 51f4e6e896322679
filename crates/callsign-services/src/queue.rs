//! Call-center queues on top of mod_callcenter
//!
//! Callers are placed with the `callcenter` application. Agents and tiers
//! are mirrored into the switch with `callcenter_config` so the database
//! stays the source of truth across switch restarts.

use async_trait::async_trait;
use callsign_core::models::{AgentStatus, QueueAgent};
use callsign_core::{AppError, AppResult};
use callsign_esl::{CallChannel, CallHandler, SwitchApi};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::prompts::CANNOT_COMPLETE;
use crate::Repositories;

/// Live queue counters read from the switch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub waiting_calls: usize,
    pub available_agents: usize,
    pub total_agents: usize,
}

pub struct QueueService {
    repos: Repositories,
    switch: Arc<dyn SwitchApi>,
}

impl QueueService {
    pub fn new(repos: Repositories, switch: Arc<dyn SwitchApi>) -> Self {
        Self { repos, switch }
    }

    async fn callcenter_config(&self, args: &str) {
        let command = format!("callcenter_config {}", args);
        if let Err(e) = self.switch.api(&command).await {
            warn!(command = %command, error = %e, "callcenter_config failed");
        }
    }

    async fn push_agent(&self, agent: &QueueAgent) {
        self.callcenter_config(&format!("agent add {} callback", agent.agent_name))
            .await;
        if let Some(contact) = agent.contact.as_deref().filter(|c| !c.is_empty()) {
            self.callcenter_config(&format!(
                "agent set contact {} {}",
                agent.agent_name, contact
            ))
            .await;
        }
    }

    /// Push every stored agent with its contact and status to the switch
    pub async fn sync_agents(&self) -> AppResult<usize> {
        let agents = self.repos.queues.all_agents().await?;
        for agent in &agents {
            self.push_agent(agent).await;
            self.callcenter_config(&format!(
                "agent set status {} '{}'",
                agent.agent_name, agent.status
            ))
            .await;
        }
        info!(count = agents.len(), "Synced queue agents to switch");
        Ok(agents.len())
    }

    /// Store a new agent for a queue and register it with its tier
    pub async fn add_agent(
        &self,
        queue_id: i64,
        agent_name: &str,
        contact: Option<&str>,
    ) -> AppResult<QueueAgent> {
        let queue = self
            .repos
            .queues
            .find_queue_by_id(queue_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("queue {}", queue_id)))?;

        let agent = self
            .repos
            .queues
            .create_agent(&QueueAgent {
                queue_id,
                tenant_id: queue.tenant_id,
                agent_name: agent_name.to_string(),
                contact: contact.map(str::to_string),
                status: AgentStatus::LoggedOut,
                ..Default::default()
            })
            .await?;

        self.push_agent(&agent).await;
        self.callcenter_config(&format!(
            "tier add {} {} {} {}",
            queue.name, agent.agent_name, agent.tier_level, agent.tier_position
        ))
        .await;

        info!(queue = %queue.name, agent = %agent.agent_name, "Queue agent added");
        Ok(agent)
    }

    pub async fn set_agent_status(&self, agent_id: i64, status: AgentStatus) -> AppResult<()> {
        let agent = self
            .repos
            .queues
            .find_agent(agent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("queue agent {}", agent_id)))?;

        self.repos.queues.set_agent_status(agent_id, status).await?;
        self.callcenter_config(&format!(
            "agent set status {} '{}'",
            agent.agent_name, status
        ))
        .await;
        Ok(())
    }

    /// Waiting callers and agent counts; zeros for anything the switch
    /// did not answer
    pub async fn queue_stats(&self, queue_name: &str) -> QueueStats {
        let mut stats = QueueStats {
            queue_name: queue_name.to_string(),
            ..Default::default()
        };

        if let Ok(body) = self
            .switch
            .api(&format!("callcenter_config queue list members {}", queue_name))
            .await
        {
            stats.waiting_calls = listing_rows(&body);
        }
        if let Ok(body) = self
            .switch
            .api(&format!(
                "callcenter_config queue count agents {} Available",
                queue_name
            ))
            .await
        {
            stats.available_agents = body.trim().parse().unwrap_or(0);
        }
        if let Ok(body) = self
            .switch
            .api(&format!("callcenter_config tier list {}", queue_name))
            .await
        {
            stats.total_agents = listing_rows(&body);
        }
        stats
    }
}

/// Data rows of a `callcenter_config ... list` answer: header line and the
/// trailing `+OK` excluded
fn listing_rows(body: &str) -> usize {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "+OK")
        .count()
        .saturating_sub(1)
}

#[async_trait]
impl CallHandler for QueueService {
    async fn handle_call(&self, call: &mut dyn CallChannel) -> AppResult<()> {
        let data = call.data().clone();
        let queue_name = data
            .variable("queue_name")
            .unwrap_or(&data.destination)
            .to_string();
        info!(
            uuid = %data.uuid,
            caller = %data.caller_id_number,
            queue = %queue_name,
            domain = %data.domain,
            "Queue: incoming call"
        );

        let queue = match self.repos.queues.find_queue(data.tenant_id, &queue_name).await {
            Ok(Some(queue)) => queue,
            Ok(None) => {
                warn!(uuid = %data.uuid, queue = %queue_name, "Queue not found");
                call.playback(CANNOT_COMPLETE).await?;
                return call.hangup("").await;
            }
            Err(e) => {
                warn!(uuid = %data.uuid, queue = %queue_name, error = %e, "Queue lookup failed");
                call.playback(CANNOT_COMPLETE).await?;
                return call.hangup("").await;
            }
        };

        call.set_var("effective_caller_id_name", &data.caller_id_name)
            .await?;
        call.set_var("effective_caller_id_number", &data.caller_id_number)
            .await?;
        call.answer().await?;

        if let Some(sound) = queue.announce_sound.as_deref().filter(|s| !s.is_empty()) {
            call.playback(sound).await?;
        }

        let target = if data.domain.is_empty() {
            queue.name.clone()
        } else {
            format!("{}@{}", queue.name, data.domain)
        };
        info!(uuid = %data.uuid, queue = %target, "Joining caller to queue");
        call.execute_async("callcenter", &target).await?;

        // Bridged to an agent or still waiting until the callcenter app returns
        let cause = match call.wait_for_app("callcenter").await {
            Ok(event) => event.hangup_cause().unwrap_or_default().to_string(),
            Err(_) => String::new(),
        };
        info!(uuid = %data.uuid, hangup_cause = %cause, "Queue: call ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{strict_repositories, FakeCall, RecordingSwitch};
    use callsign_core::models::Queue;
    use callsign_core::traits::MockQueueRepository;
    use callsign_esl::events::{CHANNEL_BRIDGE, CUSTOM};
    use callsign_esl::EslEvent;
    use mockall::predicate::eq;

    fn sales() -> Queue {
        Queue {
            id: 4,
            tenant_id: 42,
            name: "sales".to_string(),
            extension: Some("5000".to_string()),
            strategy: "longest-idle-agent".to_string(),
            announce_sound: Some("ivr/sales-welcome.wav".to_string()),
            enabled: true,
        }
    }

    fn service(queues: MockQueueRepository) -> (QueueService, Arc<RecordingSwitch>) {
        let switch = Arc::new(RecordingSwitch::default());
        let service = QueueService::new(
            Repositories {
                queues: Arc::new(queues),
                ..strict_repositories()
            },
            switch.clone(),
        );
        (service, switch)
    }

    #[tokio::test]
    async fn test_caller_joins_queue() {
        let mut queues = MockQueueRepository::new();
        queues
            .expect_find_queue()
            .withf(|tenant, name| *tenant == 42 && name == "5000")
            .returning(|_, _| Ok(Some(sales())));
        let (service, _) = service(queues);

        // Held in the queue, bridged to an agent, then the caller hangs up
        let mut call = FakeCall::new("1001", "5000", "acme.example.com", 42)
            .with_blocking_app(
                "callcenter",
                vec![
                    EslEvent::new()
                        .with_header("Event-Name", CUSTOM)
                        .with_header("Event-Subclass", "callcenter::info")
                        .with_header("CC-Action", "member-queue-start"),
                    EslEvent::new()
                        .with_header("Event-Name", CHANNEL_BRIDGE)
                        .with_header("Unique-ID", "call-0001-uuid"),
                ],
            )
            .with_hangup("NORMAL_CLEARING");
        service.handle_call(&mut call).await.unwrap();

        assert_eq!(
            call.script(),
            vec![
                "set effective_caller_id_name=Alice".to_string(),
                "set effective_caller_id_number=1001".to_string(),
                "answer".to_string(),
                "playback ivr/sales-welcome.wav".to_string(),
                "callcenter sales@acme.example.com".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_queue_name_variable_wins_over_destination() {
        let mut queues = MockQueueRepository::new();
        queues
            .expect_find_queue()
            .withf(|_, name| name == "support")
            .returning(|_, _| Ok(None));
        let (service, _) = service(queues);

        let mut call = FakeCall::new("1001", "5000", "acme.example.com", 42)
            .with_variable("queue_name", "support");
        service.handle_call(&mut call).await.unwrap();

        assert_eq!(
            call.script(),
            vec![format!("playback {}", CANNOT_COMPLETE), "hangup".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sync_agents() {
        let mut queues = MockQueueRepository::new();
        queues.expect_all_agents().returning(|| {
            Ok(vec![
                QueueAgent {
                    id: 1,
                    agent_name: "1001@acme.example.com".to_string(),
                    contact: Some("user/1001@acme.example.com".to_string()),
                    status: AgentStatus::Available,
                    ..Default::default()
                },
                QueueAgent {
                    id: 2,
                    agent_name: "1002@acme.example.com".to_string(),
                    ..Default::default()
                },
            ])
        });
        let (service, switch) = service(queues);

        assert_eq!(service.sync_agents().await.unwrap(), 2);
        assert_eq!(
            switch.commands(),
            vec![
                "callcenter_config agent add 1001@acme.example.com callback".to_string(),
                "callcenter_config agent set contact 1001@acme.example.com user/1001@acme.example.com"
                    .to_string(),
                "callcenter_config agent set status 1001@acme.example.com 'Available'".to_string(),
                "callcenter_config agent add 1002@acme.example.com callback".to_string(),
                "callcenter_config agent set status 1002@acme.example.com 'Logged Out'".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_add_agent_registers_tier() {
        let mut queues = MockQueueRepository::new();
        queues
            .expect_find_queue_by_id()
            .with(eq(4))
            .returning(|_| Ok(Some(sales())));
        queues.expect_create_agent().returning(|agent| {
            Ok(QueueAgent {
                id: 17,
                tier_level: 1,
                tier_position: 1,
                ..agent.clone()
            })
        });
        let (service, switch) = service(queues);

        let agent = service
            .add_agent(4, "1003@acme.example.com", None)
            .await
            .unwrap();
        assert_eq!(agent.id, 17);
        assert_eq!(agent.tenant_id, 42);
        assert_eq!(agent.status, AgentStatus::LoggedOut);
        assert_eq!(
            switch.commands(),
            vec![
                "callcenter_config agent add 1003@acme.example.com callback".to_string(),
                "callcenter_config tier add sales 1003@acme.example.com 1 1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_add_agent_unknown_queue() {
        let mut queues = MockQueueRepository::new();
        queues.expect_find_queue_by_id().returning(|_| Ok(None));
        let (service, switch) = service(queues);

        let err = service.add_agent(99, "1003@acme.example.com", None).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
        assert!(switch.commands().is_empty());
    }

    #[tokio::test]
    async fn test_set_agent_status_updates_switch() {
        let mut queues = MockQueueRepository::new();
        queues.expect_find_agent().returning(|id| {
            Ok(Some(QueueAgent {
                id,
                agent_name: "1001@acme.example.com".to_string(),
                ..Default::default()
            }))
        });
        queues
            .expect_set_agent_status()
            .with(eq(1), eq(AgentStatus::OnBreak))
            .times(1)
            .returning(|_, _| Ok(()));
        let (service, switch) = service(queues);

        service.set_agent_status(1, AgentStatus::OnBreak).await.unwrap();
        assert_eq!(
            switch.commands(),
            vec!["callcenter_config agent set status 1001@acme.example.com 'On Break'".to_string()]
        );
    }

    #[tokio::test]
    async fn test_queue_stats() {
        let (service, switch) = service(MockQueueRepository::new());
        switch.respond(
            "callcenter_config queue list members",
            "queue|uuid|session_uuid|cid_number\nsales|a|b|1001\nsales|c|d|1002\n+OK\n",
        );
        switch.respond("callcenter_config queue count agents", "3\n");
        switch.respond("callcenter_config tier list", "queue|agent|state\nsales|1001|Ready\n+OK");

        let stats = service.queue_stats("sales@acme.example.com").await;
        assert_eq!(stats.waiting_calls, 2);
        assert_eq!(stats.available_agents, 3);
        assert_eq!(stats.total_agents, 1);
    }
}
