//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters / returns / execute），启动时注册一次，
//! 之后按名称精确查找；ToolExecutor 在调用时加超时、识别 soft error 并统一转 ToolError。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::tools::ErrorMarkers;

/// 工具 trait：名称、描述（供规划方理解）、参数说明、返回结构、异步执行
///
/// 失败约定：要么返回 Err，要么返回命中错误标记的内容（见 [`Tool::is_error_payload`]），
/// 两种形式在引擎里等价处理。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（计划中 Step.tool_name 必须与之完全一致）
    fn name(&self) -> &str;

    /// 工具描述（供规划方理解功能）
    fn description(&self) -> &str;

    /// 参数名 -> 参数说明
    fn parameters(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// 返回记录集的列名；返回标量的工具留空
    fn returns(&self) -> Vec<String> {
        Vec::new()
    }

    /// 返回内容是否表示失败；默认按执行器的错误标记判断
    fn is_error_payload(&self, output: &Value, markers: &ErrorMarkers) -> bool {
        markers.matches(output)
    }

    /// 执行工具：成功返回标量或记录数组
    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String>;
}

/// 工具目录中的一项，交给规划方
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, String>,
    pub returns: Vec<String>,
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!("Tool '{}' registered twice, keeping the latest", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 按名称排序的工具目录
    pub fn catalogue(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
                returns: tool.returns(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}
