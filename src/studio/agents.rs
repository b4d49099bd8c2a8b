//! Agent engine: named strategies that turn briefing text into roadmap text.
//!
//! Agents are pure and synchronous. The engine is a lookup table keyed by
//! registry name with one default entry; orchestration code only ever asks
//! the engine to `select_agent`, so new strategies can be registered without
//! touching the run pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Registry key of the agent used when nothing more specific applies.
pub const DEFAULT_AGENT_KEY: &str = "growth";

/// Output of a single agent invocation.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A content-generation strategy.
pub trait Agent: Send + Sync {
    /// Stable identifier of the strategy.
    fn name(&self) -> &'static str;

    /// Tag written to `agent_logs.agent_name` for agent-level events.
    fn log_name(&self) -> &'static str;

    fn run(&self, briefing: &str) -> AgentResult;
}

/// Produces the ORION growth roadmap template around the briefing text.
#[derive(Debug, Default)]
pub struct GrowthStrategistAgent;

impl GrowthStrategistAgent {
    pub fn render(&self, briefing: &str, generated_at: DateTime<Utc>) -> String {
        format!(
            "
ORION GROWTH ROADMAP

Generated: {generated}

BRIEFING ANALYSIS:
{briefing}

STRATEGY:

1. Define ICP precisely
2. Identify acquisition channels
3. Deploy paid acquisition tests
4. Build organic acquisition engine
5. Automate conversion funnels
6. Optimize retention

EXECUTION PLAN:

Phase 1 — Validation
Phase 2 — Acquisition
Phase 3 — Scale
Phase 4 — Automation

",
            generated = generated_at.format("%Y-%m-%d %H:%M:%S%.6f"),
            briefing = briefing,
        )
    }
}

impl Agent for GrowthStrategistAgent {
    fn name(&self) -> &'static str {
        "growth_strategist"
    }

    fn log_name(&self) -> &'static str {
        "GROWTH_AGENT"
    }

    fn run(&self, briefing: &str) -> AgentResult {
        let created_at = Utc::now();
        AgentResult {
            content: self.render(briefing, created_at),
            created_at,
        }
    }
}

/// Registry of agents keyed by name.
#[derive(Clone)]
pub struct AgentEngine {
    agents: BTreeMap<String, Arc<dyn Agent>>,
    default_key: String,
}

impl Default for AgentEngine {
    fn default() -> Self {
        let mut engine = Self {
            agents: BTreeMap::new(),
            default_key: DEFAULT_AGENT_KEY.to_string(),
        };
        engine.register(DEFAULT_AGENT_KEY, Arc::new(GrowthStrategistAgent));
        engine
    }
}

impl AgentEngine {
    /// Build an engine whose default is `default_key`. Fails if that key is
    /// not among `agents`.
    pub fn with_agents(
        agents: Vec<(&str, Arc<dyn Agent>)>,
        default_key: &str,
    ) -> anyhow::Result<Self> {
        let agents: BTreeMap<String, Arc<dyn Agent>> = agents
            .into_iter()
            .map(|(key, agent)| (key.to_string(), agent))
            .collect();
        if !agents.contains_key(default_key) {
            anyhow::bail!("Default agent '{}' is not registered", default_key);
        }
        Ok(Self {
            agents,
            default_key: default_key.to_string(),
        })
    }

    pub fn register(&mut self, key: &str, agent: Arc<dyn Agent>) {
        self.agents.insert(key.to_string(), agent);
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    /// Pick the agent for a briefing. Selection is currently constant.
    // TODO: route on briefing content once a second strategy is registered.
    pub fn select_agent(&self, _briefing: &str) -> Arc<dyn Agent> {
        self.agents
            .get(&self.default_key)
            .cloned()
            .unwrap_or_else(|| Arc::new(GrowthStrategistAgent))
    }

    pub fn run(&self, briefing: &str) -> AgentResult {
        self.select_agent(briefing).run(briefing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct EchoAgent;

    impl Agent for EchoAgent {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn log_name(&self) -> &'static str {
            "ECHO_AGENT"
        }
        fn run(&self, briefing: &str) -> AgentResult {
            AgentResult {
                content: briefing.to_string(),
                created_at: Utc::now(),
            }
        }
    }

    #[test]
    fn test_growth_roadmap_embeds_briefing() {
        let result = GrowthStrategistAgent.run("Grow my SaaS");
        assert!(result.content.contains("ORION GROWTH ROADMAP"));
        assert!(result.content.contains("BRIEFING ANALYSIS:\nGrow my SaaS"));
        assert!(result.content.contains("6. Optimize retention"));
        assert!(result.content.contains("Phase 4 — Automation"));
        assert!(result.content.contains("Phase 1 — Validation\nPhase 2 — Acquisition"));
    }

    #[test]
    fn test_render_differs_only_in_timestamp() {
        let agent = GrowthStrategistAgent;
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 30, 0).unwrap();
        let a = agent.render("Launch in Brazil", t1);
        let b = agent.render("Launch in Brazil", t2);
        assert_ne!(a, b);

        let strip = |s: &str| {
            s.lines()
                .filter(|l| !l.starts_with("Generated:"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(strip(&a), strip(&b));
        assert_eq!(a, agent.render("Launch in Brazil", t1));
    }

    #[test]
    fn test_default_engine_selects_growth_agent() {
        let engine = AgentEngine::default();
        assert_eq!(engine.default_key(), "growth");
        assert_eq!(engine.names(), vec!["growth".to_string()]);
        let agent = engine.select_agent("anything");
        assert_eq!(agent.name(), "growth_strategist");
        assert_eq!(agent.log_name(), "GROWTH_AGENT");
    }

    #[test]
    fn test_registered_agent_is_listed() {
        let mut engine = AgentEngine::default();
        engine.register("echo", Arc::new(EchoAgent));
        assert_eq!(engine.names(), vec!["echo".to_string(), "growth".to_string()]);
        // default selection is unchanged by registering more agents
        assert_eq!(engine.select_agent("x").name(), "growth_strategist");
    }

    #[test]
    fn test_with_agents_requires_default() {
        let err = AgentEngine::with_agents(
            vec![("echo", Arc::new(EchoAgent) as Arc<dyn Agent>)],
            "growth",
        );
        assert!(err.is_err());

        let engine =
            AgentEngine::with_agents(vec![("echo", Arc::new(EchoAgent) as Arc<dyn Agent>)], "echo")
                .unwrap();
        assert_eq!(engine.run("hello").content, "hello");
    }
}
