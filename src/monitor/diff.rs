//! 输出差异检测 - 增量内容提取与回应结束判断
//!
//! 回应结束的判断是启发式的：回应正好以提示符样式结尾会误判为结束，
//! 未登记的自定义提示符则永远不会被识别（只能等待停滞超时）。

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// 默认的空闲提示符模式（按顺序匹配，作用于 trim 后的文本）
static DEFAULT_PROMPT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // 标准 Claude Code 提示符
        r"(?m)> $",
        // 自定义 prompt
        r"(?m)claude>$",
        // shell 提示符
        r"(?m)\$ $",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// 回应结束标记判断
///
/// 状态机只依赖这个 trait，可以替换成更可靠的完成信号。
pub trait EndMarker: Send + Sync {
    /// `trimmed` 是否表示会话已回到等待输入状态
    fn is_end(&self, trimmed: &str) -> bool;
}

/// 基于有序正则列表的提示符匹配器
#[derive(Debug, Clone)]
pub struct PromptMatcher {
    patterns: Vec<Regex>,
}

impl PromptMatcher {
    /// 用自定义模式创建
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// 追加一个模式（排在已有模式之后）
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.patterns.push(Regex::new(pattern)?);
        Ok(self)
    }

    /// 第一个命中的模式
    pub fn first_match(&self, trimmed: &str) -> Option<&Regex> {
        self.patterns.iter().find(|p| p.is_match(trimmed))
    }
}

impl Default for PromptMatcher {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PROMPT_PATTERNS.clone(),
        }
    }
}

impl EndMarker for PromptMatcher {
    fn is_end(&self, trimmed: &str) -> bool {
        match self.first_match(trimmed) {
            Some(pattern) => {
                debug!(pattern = pattern.as_str(), "Response end detected");
                true
            }
            None => false,
        }
    }
}

/// 差异检测器（无状态）
pub struct DiffDetector {
    marker: Box<dyn EndMarker>,
}

impl DiffDetector {
    pub fn new() -> Self {
        Self::with_marker(PromptMatcher::default())
    }

    /// 使用自定义结束标记
    pub fn with_marker(marker: impl EndMarker + 'static) -> Self {
        Self {
            marker: Box::new(marker),
        }
    }

    /// 提取新增内容
    ///
    /// `current` 以 `previous` 为前缀时返回后缀；前缀关系被破坏（滚屏、清屏）
    /// 时返回完整的 `current`，宁可重复也不丢数据。
    pub fn extract_new_content<'a>(&self, previous: &str, current: &'a str) -> &'a str {
        if previous.is_empty() {
            return current;
        }

        match current.strip_prefix(previous) {
            Some(new_content) => {
                debug!(
                    previous_len = previous.len(),
                    current_len = current.len(),
                    new_len = new_content.len(),
                    "Extracted new content"
                );
                new_content
            }
            None => {
                warn!("Output is not an append of the previous capture, returning full output");
                current
            }
        }
    }

    /// 输出是否表示回应已结束
    pub fn detect_response_end(&self, output: &str) -> bool {
        self.marker.is_end(output.trim())
    }

    /// 输出是否有变化
    pub fn has_changed(&self, previous: &str, current: &str) -> bool {
        previous != current
    }
}

impl Default for DiffDetector {
    fn default() -> Self {
        Self::new()
    }
}
