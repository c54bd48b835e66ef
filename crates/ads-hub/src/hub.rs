// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Drives a turn through the tool loop (Phase 1), delegation rounds
//! (Phase 2), and finalization (Phase 3) described for the collaborative
//! orchestration loop. Mirrors the shape of a classic model-call /
//! tool-call agentic loop, generalized to run over any registered agent
//! and to fan a supervisor's response out into sub-agent delegations.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ads_core::IntoErrorKind;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use ads_agents::{SendOptions, SendResult, Usage};
use ads_config::AgentConfig;
use ads_tools::{ToolCall, ToolRegistry};

use crate::blocks::{parse_blocks, strip_delegation_blocks, Block};
use crate::events::HubEvent;
use crate::orchestrator::{Orchestrator, OrchestratorError};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("turn cancelled")]
    Cancelled,
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl ads_core::IntoErrorKind for HubError {
    fn error_kind(&self) -> ads_core::ErrorKind {
        match self {
            HubError::Cancelled => ads_core::ErrorKind::Abort,
            HubError::Orchestrator(e) => e.error_kind(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DelegationRecord {
    pub agent_id: String,
    pub prompt: String,
    pub response: String,
}

#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub max_supervisor_rounds: Option<u32>,
    pub max_delegations: Option<u32>,
    pub max_tool_rounds: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub usage: Option<Usage>,
    pub delegations: Vec<DelegationRecord>,
    pub supervisor_rounds: u32,
}

/// Truncate a tool result to a character budget, same deterministic scheme
/// `ads-hub`'s session compaction uses for oversized results: hard cut with
/// a visible marker rather than attempting to summarize.
fn truncate_for_feedback(text: &str, cap_chars: usize) -> String {
    if cap_chars == 0 || text.len() <= cap_chars {
        return text.to_string();
    }
    format!("{}\n…[truncated, {} bytes omitted]", &text[..cap_chars], text.len() - cap_chars)
}

pub struct AgentHub {
    orchestrator: Arc<Orchestrator>,
    tools: Arc<ToolRegistry>,
    config: Arc<AgentConfig>,
}

impl AgentHub {
    pub fn new(orchestrator: Arc<Orchestrator>, tools: Arc<ToolRegistry>, config: Arc<AgentConfig>) -> Self {
        Self { orchestrator, tools, config }
    }

    pub async fn run_turn(
        &self,
        agent_id: &str,
        input: &str,
        opts: TurnOptions,
        events: mpsc::Sender<HubEvent>,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, HubError> {
        let max_supervisor_rounds = opts.max_supervisor_rounds.unwrap_or(self.config.max_supervisor_rounds);
        let max_delegations = opts.max_delegations.unwrap_or(self.config.max_delegations);
        let max_tool_rounds = opts.max_tool_rounds.unwrap_or(self.config.max_tool_rounds);

        let (mut response, mut usage) =
            self.run_tool_loop(agent_id, input, max_tool_rounds, &events, &cancel).await?;

        let mut delegations = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut supervisor_rounds = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(HubError::Cancelled);
            }
            if delegations.len() as u32 >= max_delegations || supervisor_rounds >= max_supervisor_rounds {
                break;
            }

            let directives: Vec<(String, String)> = parse_blocks(&response)
                .into_iter()
                .filter_map(|b| match b {
                    Block::Delegation(d) if d.agent_id != agent_id => Some((d.agent_id, d.prompt)),
                    _ => None,
                })
                .filter(|pair| seen.insert(pair.clone()))
                .collect();

            if directives.is_empty() {
                break;
            }

            supervisor_rounds += 1;
            let _ = events.send(HubEvent::SupervisorRoundStarted { round: supervisor_rounds }).await;

            let remaining_budget = max_delegations.saturating_sub(delegations.len() as u32) as usize;
            let directives: Vec<(String, String)> = directives.into_iter().take(remaining_budget).collect();

            let mut by_agent: HashMap<String, Vec<String>> = HashMap::new();
            for (id, prompt) in directives {
                by_agent.entry(id).or_default().push(prompt);
            }

            let semaphore = Arc::new(Semaphore::new(self.config.delegation_concurrency.max(1)));
            let mut handles = Vec::with_capacity(by_agent.len());
            for (id, prompts) in by_agent {
                let semaphore = semaphore.clone();
                let events = events.clone();
                let cancel = cancel.clone();
                handles.push(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore not closed");
                    let mut records = Vec::with_capacity(prompts.len());
                    for prompt in prompts {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let _ = events
                            .send(HubEvent::DelegationStarted { agent_id: id.clone(), prompt: prompt.clone() })
                            .await;
                        records.push((id.clone(), prompt));
                    }
                    records
                });
            }

            // Run each agent-id group concurrently (bounded by the semaphore),
            // executing each group's own prompts one at a time.
            let mut grouped_futures = Vec::new();
            for fut in handles {
                grouped_futures.push(fut);
            }
            let per_group_ids: Vec<Vec<(String, String)>> = futures::future::join_all(grouped_futures).await;

            for group in per_group_ids {
                for (id, prompt) in group {
                    if cancel.is_cancelled() {
                        return Err(HubError::Cancelled);
                    }
                    let (sub_response, _sub_usage) =
                        self.run_tool_loop(&id, &prompt, max_tool_rounds, &events, &cancel).await?;
                    let _ = events
                        .send(HubEvent::DelegationFinished { agent_id: id.clone(), response: sub_response.clone() })
                        .await;
                    delegations.push(DelegationRecord {
                        agent_id: id,
                        prompt,
                        response: sub_response,
                    });
                }
            }

            let reconciliation = build_reconciliation_prompt(&delegations);
            let (new_response, new_usage) =
                self.run_tool_loop(agent_id, &reconciliation, max_tool_rounds, &events, &cancel).await?;
            response = new_response;
            usage = new_usage.or(usage);
        }

        let final_response = strip_delegation_blocks(&response);
        let _ = events.send(HubEvent::TurnComplete).await;

        Ok(TurnOutcome { response: final_response, usage, delegations, supervisor_rounds })
    }

    /// Phase 1: invoke `agent_id`, executing any `<<<tool.NAME>>>` blocks it
    /// emits and feeding results back, until it produces a response with no
    /// tool blocks or `max_tool_rounds` is reached.
    async fn run_tool_loop(
        &self,
        agent_id: &str,
        input: &str,
        max_tool_rounds: u32,
        events: &mpsc::Sender<HubEvent>,
        cancel: &CancellationToken,
    ) -> Result<(String, Option<Usage>), HubError> {
        let mut current_input = input.to_string();
        let mut usage = None;
        let mut rounds = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(HubError::Cancelled);
            }

            let SendResult { response, usage: turn_usage, .. } =
                self.orchestrator.invoke_agent(agent_id, &current_input, SendOptions::default()).await?;
            usage = turn_usage.or(usage);

            let tool_blocks: Vec<_> = parse_blocks(&response)
                .into_iter()
                .filter_map(|b| match b {
                    Block::Tool(t) => Some(t),
                    _ => None,
                })
                .collect();

            if tool_blocks.is_empty() {
                let _ = events.send(HubEvent::TextComplete(response.clone())).await;
                return Ok((response, usage));
            }

            rounds += 1;
            if rounds > max_tool_rounds {
                let _ = events.send(HubEvent::Error(format!(
                    "agent {agent_id:?} exceeded {max_tool_rounds} tool rounds; returning stripped response"
                ))).await;
                return Ok((crate::blocks::strip_blocks(&response), usage));
            }

            let mut feedback = String::from(
                "Tool results:\n",
            );
            for block in &tool_blocks {
                let args: serde_json::Value =
                    serde_json::from_str(&block.body).unwrap_or(serde_json::Value::Object(Default::default()));
                let call = ToolCall { id: format!("{agent_id}_{rounds}_{}", block.name), name: block.name.clone(), args };
                let _ = events.send(HubEvent::ToolCallStarted(call.clone())).await;
                let output = self.tools.execute(&call).await;
                let truncated = truncate_for_feedback(&output.content, self.config.tool_result_token_cap * 4);
                let _ = events
                    .send(HubEvent::ToolCallFinished {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        output: truncated.clone(),
                        is_error: output.is_error,
                    })
                    .await;
                feedback.push_str(&format!("\n<<<tool.{}\n{}\n>>>\n", block.name, truncated));
            }

            current_input = feedback;
        }
    }
}

fn build_reconciliation_prompt(delegations: &[DelegationRecord]) -> String {
    let mut out = String::from(
        "The following delegated sub-agents have responded. Incorporate their \
         findings and either continue delegating or produce the final answer.\n",
    );
    for d in delegations {
        out.push_str(&format!(
            "\n---\nAgent: {}\nPrompt given: {}\nResponse:\n{}\n",
            d.agent_id, d.prompt, d.response
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ads_agents::{AgentAdapter, ScriptedMockAdapter};
    use ads_tools::ToolRegistry;

    fn hub_with(agents: Vec<(&str, Arc<dyn AgentAdapter>)>, tools: ToolRegistry) -> (AgentHub, Arc<Orchestrator>) {
        let orch = Arc::new(Orchestrator::new());
        for (id, adapter) in agents {
            orch.register(id, adapter);
        }
        let hub = AgentHub::new(orch.clone(), Arc::new(tools), Arc::new(AgentConfig::default()));
        (hub, orch)
    }

    #[tokio::test]
    async fn returns_response_unchanged_when_no_blocks() {
        let scripted = Arc::new(ScriptedMockAdapter::new("solo", vec!["just an answer".into()]));
        let (hub, _orch) = hub_with(vec![("solo", scripted)], ToolRegistry::default());
        let (tx, _rx) = mpsc::channel(16);
        let outcome = hub
            .run_turn("solo", "hi", TurnOptions::default(), tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.response, "just an answer");
        assert!(outcome.delegations.is_empty());
    }

    #[tokio::test]
    async fn strips_delegation_blocks_from_final_response() {
        let supervisor = Arc::new(ScriptedMockAdapter::new(
            "sup",
            vec![
                "checking with a peer\n<<<agent.peer\nplease verify\n>>>".into(),
                "final answer after reconciliation".into(),
            ],
        ));
        let peer = Arc::new(ScriptedMockAdapter::new("peer", vec!["verified, looks good".into()]));
        let (hub, _orch) =
            hub_with(vec![("sup", supervisor), ("peer", peer)], ToolRegistry::default());
        let (tx, _rx) = mpsc::channel(16);
        let outcome = hub
            .run_turn("sup", "do the task", TurnOptions::default(), tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.response, "final answer after reconciliation");
        assert_eq!(outcome.delegations.len(), 1);
        assert_eq!(outcome.delegations[0].agent_id, "peer");
    }

    #[tokio::test]
    async fn cancellation_aborts_the_turn() {
        let scripted = Arc::new(ScriptedMockAdapter::new("solo", vec!["never reached".into()]));
        let (hub, _orch) = hub_with(vec![("solo", scripted)], ToolRegistry::default());
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = hub.run_turn("solo", "hi", TurnOptions::default(), tx, cancel).await;
        assert!(matches!(result, Err(HubError::Cancelled)));
    }

    #[tokio::test]
    async fn self_addressed_delegation_block_is_not_treated_as_delegation() {
        let scripted = Arc::new(ScriptedMockAdapter::new("solo", vec!["<<<agent.solo\nnote to self\n>>>done".into()]));
        let (hub, _orch) = hub_with(vec![("solo", scripted)], ToolRegistry::default());
        let (tx, _rx) = mpsc::channel(16);
        let outcome = hub
            .run_turn("solo", "hi", TurnOptions::default(), tx, CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.delegations.is_empty());
    }
}
