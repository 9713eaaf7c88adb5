//! 重试 / 升级策略
//!
//! 纯函数：失败后先把 retry_count 加一，再按新计数决定自动重试、请人帮忙还是放弃。
//! 默认档位：1-2 自动重试；3 暂停求助；4-5 带着人工指导重试；>5 放弃。

use serde::Deserialize;

/// 策略给出的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 静默自动重试当前步骤
    Retry,
    /// 暂停在 waiting_help，展示错误并请求指导
    AskHuman,
    /// 放弃，以失败总结结束
    GiveUp,
}

/// 升级档位配置（对应 [engine] 段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EscalationPolicy {
    /// 达到该计数时请人帮忙（之前的失败都自动重试）
    #[serde(default = "default_ask_human_at")]
    pub ask_human_at: u32,
    /// 超过该计数即放弃
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_ask_human_at() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    5
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            ask_human_at: default_ask_human_at(),
            max_retries: default_max_retries(),
        }
    }
}

impl EscalationPolicy {
    /// retry_count 为本次失败后已递增的计数
    pub fn decide(&self, retry_count: u32) -> RecoveryAction {
        if retry_count > self.max_retries {
            RecoveryAction::GiveUp
        } else if retry_count == self.ask_human_at {
            RecoveryAction::AskHuman
        } else {
            RecoveryAction::Retry
        }
    }

    /// 是否处于「人工指导后重试」档（ask_human_at 之后、放弃之前）
    pub fn is_guided(&self, retry_count: u32) -> bool {
        retry_count > self.ask_human_at && retry_count <= self.max_retries
    }
}

/// 默认档位下的决策
pub fn decide(retry_count: u32) -> RecoveryAction {
    EscalationPolicy::default().decide(retry_count)
}

/// 放弃时给用户的最终答复（必须包含最后一次错误原文）
pub fn give_up_message(last_error: &str) -> String {
    format!("I failed to execute the plan after multiple attempts. Last error: {last_error}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder() {
        let cases = [
            (1, RecoveryAction::Retry),
            (2, RecoveryAction::Retry),
            (3, RecoveryAction::AskHuman),
            (4, RecoveryAction::Retry),
            (5, RecoveryAction::Retry),
            (6, RecoveryAction::GiveUp),
            (7, RecoveryAction::GiveUp),
            (100, RecoveryAction::GiveUp),
        ];
        for (count, expected) in cases {
            assert_eq!(decide(count), expected, "retry_count = {count}");
        }
    }

    #[test]
    fn test_exactly_one_ask_human_in_ladder() {
        let asks = (1..=10)
            .filter(|c| decide(*c) == RecoveryAction::AskHuman)
            .count();
        assert_eq!(asks, 1);
    }

    #[test]
    fn test_guided_tier() {
        let policy = EscalationPolicy::default();
        assert!(!policy.is_guided(3));
        assert!(policy.is_guided(4));
        assert!(policy.is_guided(5));
        assert!(!policy.is_guided(6));
    }

    #[test]
    fn test_custom_policy() {
        let policy = EscalationPolicy {
            ask_human_at: 1,
            max_retries: 1,
        };
        assert_eq!(policy.decide(1), RecoveryAction::AskHuman);
        assert_eq!(policy.decide(2), RecoveryAction::GiveUp);
    }

    #[test]
    fn test_give_up_message_contains_error() {
        let msg = give_up_message("Invalid column name 'DATE'");
        assert!(msg.contains("multiple attempts"));
        assert!(msg.contains("Invalid column name 'DATE'"));
    }
}
