//! 计划类型定义
//!
//! Plan 由外部规划方生成，审批通过后不再修改（人工求助阶段的参数修订除外）。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::PlanningError;

pub type StepId = u32;

/// 计划中的一步：调用哪个工具、传什么参数、为什么
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    /// 序号（从 1 开始，连续递增）
    #[serde(alias = "step_id")]
    pub id: StepId,
    /// 工具名，必须与注册表中的名称完全一致
    #[serde(alias = "tool")]
    pub tool_name: String,
    /// 工具参数；字符串值可以是 "ref:step_N" / "$step_N" 占位符
    #[serde(default, alias = "tool_arguments", alias = "args")]
    pub arguments: Map<String, Value>,
    /// 这一步做什么
    #[serde(default)]
    pub description: String,
    /// 为什么需要这一步
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Step {
    pub fn new(id: StepId, tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id,
            tool_name: tool_name.into(),
            arguments,
            description: String::new(),
            rationale: None,
        }
    }

    /// 结果表中的键："step_<id>"
    pub fn result_key(&self) -> String {
        step_key(self.id)
    }
}

pub fn step_key(id: StepId) -> String {
    format!("step_{id}")
}

/// 有序步骤 + 目标描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// 按执行顺序排列的步骤
    pub steps: Vec<Step>,
    /// 计划完成后要达成的目标
    #[serde(default, alias = "final_objective")]
    pub objective: String,
}

impl Plan {
    pub fn new(objective: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            steps,
            objective: objective.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 结构校验：非空、id 从 1 开始连续递增、工具名非空。不检查语义。
    pub fn validate(&self) -> Result<(), PlanningError> {
        if self.steps.is_empty() {
            return Err(PlanningError::EmptyPlan);
        }
        for (index, step) in self.steps.iter().enumerate() {
            let expected = index as StepId + 1;
            if step.id != expected {
                return Err(PlanningError::NonContiguousIds {
                    expected,
                    found: step.id,
                });
            }
            if step.tool_name.trim().is_empty() {
                return Err(PlanningError::MissingToolName(step.id));
            }
        }
        Ok(())
    }

    /// 生成给人审阅的文本（审批闸门展示用）
    pub fn render(&self) -> String {
        let mut out = format!("Proposed plan: {}\n", self.objective);
        for step in &self.steps {
            out.push_str(&format!("  Step {}: {}\n", step.id, step.tool_name));
            if !step.description.is_empty() {
                out.push_str(&format!("      Description: {}\n", step.description));
            }
            if let Some(rationale) = &step.rationale {
                out.push_str(&format!("      Why: {}\n", rationale));
            }
            out.push_str(&format!(
                "      Args: {}\n",
                Value::Object(step.arguments.clone())
            ));
        }
        out
    }
}
