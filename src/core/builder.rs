//! 引擎构建器：统一的引擎初始化逻辑
//!
//! 由 AppConfig 决定检查点后端、工具注册、LLM 后端与策略参数；测试可直接注入 store / LLM / 工具。

use std::sync::Arc;

use crate::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use crate::config::{AppConfig, CheckpointBackend};
use crate::core::{Engine, PersistenceError};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::planner::{LlmPlanner, LlmResponder, Planner, Responder};
use crate::tools::{EchoTool, ErrorMarkers, RecordsTool, Tool, ToolExecutor, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_key = std::env::var("OPENAI_API_KEY").is_ok();

    if provider != "mock" && has_key {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            None,
        ))
    } else {
        if provider != "mock" {
            tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
        } else {
            tracing::info!("Using Mock LLM");
        }
        Arc::new(MockLlmClient)
    }
}

/// 引擎构建器
pub struct EngineBuilder {
    config: AppConfig,
    registry: ToolRegistry,
    store: Option<Arc<dyn CheckpointStore>>,
    llm: Option<Arc<dyn LlmClient>>,
    planner: Option<Arc<dyn Planner>>,
    responder: Option<Arc<dyn Responder>>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: ToolRegistry::new(),
            store: None,
            llm: None,
            planner: None,
            responder: None,
        }
    }

    /// 追加工具（与配置中的工具一起注册）
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.registry.register(tool);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = Some(responder);
        self
    }

    async fn open_store(&self) -> Result<Arc<dyn CheckpointStore>, PersistenceError> {
        match self.config.checkpoint.backend {
            CheckpointBackend::Memory => {
                tracing::info!("Using in-memory checkpoint store");
                Ok(Arc::new(InMemoryCheckpointStore::new()))
            }
            #[cfg(feature = "async-sqlite")]
            CheckpointBackend::Sqlite => {
                let path = &self.config.checkpoint.path;
                tracing::info!("Using SQLite checkpoint store at {}", path.display());
                Ok(Arc::new(
                    crate::checkpoint::SqliteCheckpointStore::open(path).await?,
                ))
            }
            #[cfg(not(feature = "async-sqlite"))]
            CheckpointBackend::Sqlite => {
                tracing::warn!("async-sqlite feature disabled, using in-memory checkpoint store");
                Ok(Arc::new(InMemoryCheckpointStore::new()))
            }
        }
    }

    pub async fn build(mut self) -> Result<Engine, PersistenceError> {
        let store = match self.store.take() {
            Some(store) => store,
            None => self.open_store().await?,
        };

        let mut registry = std::mem::take(&mut self.registry);
        if registry.get("echo").is_none() {
            registry.register(EchoTool);
        }
        for records in self.config.tools.records.iter().cloned() {
            registry.register(RecordsTool::new(records));
        }
        tracing::info!("Registered tools: {}", registry.tool_names().join(", "));

        let executor = ToolExecutor::new(registry, self.config.tools.tool_timeout_secs)
            .with_markers(ErrorMarkers::new(self.config.tools.error_markers.clone()));

        let llm = match self.llm.take() {
            Some(llm) => llm,
            None => create_llm_from_config(&self.config),
        };
        let planner: Arc<dyn Planner> = match self.planner.take() {
            Some(planner) => planner,
            None => Arc::new(LlmPlanner::new(llm.clone())),
        };
        let responder: Arc<dyn Responder> = match self.responder.take() {
            Some(responder) => responder,
            None => Arc::new(LlmResponder::new(llm)),
        };

        let engine_cfg = &self.config.engine;
        Ok(Engine::new(store, Arc::new(executor), planner, responder)
            .with_escalation(engine_cfg.escalation)
            .with_negotiation(engine_cfg.negotiation.clone())
            .with_affirmative_tokens(engine_cfg.affirmative_tokens.clone()))
    }
}
