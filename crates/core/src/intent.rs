use serde::{Deserialize, Serialize};

/// How a workflow executes its work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// Preprocess → augment → single agent → postprocess.
    Simple,
    /// Ordered multi-agent sequence, optionally paused for a user decision.
    Chain,
}

/// Recognized user goals. Closed set; classification never invents one.
///
/// Declaration order doubles as the tie-break order for the rule classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// 续写/写正文 — produce new story content
    WriteContent,
    /// 修改/润色已有内容
    ReviseContent,
    /// 一致性检查（人设、时间线、设定冲突）
    CheckConsistency,
    /// 人物设计
    DesignCharacter,
    /// 章节大纲/情节规划
    PlanOutline,
    /// 世界观设定
    BuildWorld,
    /// 内容总结/回顾
    Summarize,
    /// 闲聊兜底
    GeneralChat,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::WriteContent,
        Intent::ReviseContent,
        Intent::CheckConsistency,
        Intent::DesignCharacter,
        Intent::PlanOutline,
        Intent::BuildWorld,
        Intent::Summarize,
        Intent::GeneralChat,
    ];

    /// Trigger keywords for the rule classifier. Bilingual: users mix
    /// Chinese and English freely.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Intent::WriteContent => &[
                "写", "续写", "接着写", "写作", "正文", "写一段", "写一章",
                "write", "continue", "draft", "compose", "scene",
            ],
            Intent::ReviseContent => &[
                "修改", "润色", "重写", "改写", "调整", "优化这段",
                "revise", "rewrite", "polish", "edit", "improve",
            ],
            Intent::CheckConsistency => &[
                "检查", "一致性", "矛盾", "冲突", "时间线", "逻辑",
                "check", "consistency", "contradiction", "continuity",
            ],
            Intent::DesignCharacter => &[
                "人物", "角色", "人设", "性格", "主角", "配角",
                "character", "protagonist", "persona",
            ],
            Intent::PlanOutline => &[
                "大纲", "章节", "情节", "剧情", "结构", "规划",
                "outline", "plot", "chapter plan", "structure", "arc",
            ],
            Intent::BuildWorld => &[
                "世界观", "设定", "背景", "体系", "地图", "势力",
                "world", "worldbuilding", "setting", "lore",
            ],
            Intent::Summarize => &[
                "总结", "概括", "回顾", "梳理",
                "summarize", "summary", "recap",
            ],
            // Deliberately narrow: casual chatter ("随便聊聊") should fall
            // through to the no-match default so the fallback reasoner gets
            // a say, not resolve here at full confidence.
            Intent::GeneralChat => &[
                "你好", "谢谢",
                "chat", "hello", "thanks",
            ],
        }
    }

    /// Leading command token that resolves this intent without classification.
    pub fn command_prefix(&self) -> &'static str {
        match self {
            Intent::WriteContent => "/write",
            Intent::ReviseContent => "/revise",
            Intent::CheckConsistency => "/check",
            Intent::DesignCharacter => "/character",
            Intent::PlanOutline => "/outline",
            Intent::BuildWorld => "/world",
            Intent::Summarize => "/summary",
            Intent::GeneralChat => "/chat",
        }
    }

    /// Name of the workflow this intent routes to by default.
    pub fn default_target(&self) -> &'static str {
        match self {
            Intent::WriteContent => "writing",
            Intent::ReviseContent => "revision",
            Intent::CheckConsistency => "consistency",
            Intent::DesignCharacter => "character",
            Intent::PlanOutline => "outline",
            Intent::BuildWorld => "worldbuilding",
            Intent::Summarize => "summary",
            Intent::GeneralChat => "conversation",
        }
    }

    pub fn workflow_type(&self) -> WorkflowType {
        match self {
            Intent::PlanOutline => WorkflowType::Chain,
            _ => WorkflowType::Simple,
        }
    }

    pub fn from_command_prefix(token: &str) -> Option<Intent> {
        Intent::ALL.iter().copied().find(|i| i.command_prefix() == token)
    }
}

/// Which path produced an [`IntentResult`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    /// Explicit hint on the request.
    Hint,
    /// Leading command prefix.
    Prefix,
    /// Keyword rule classifier.
    RuleEngine,
    /// Fallback reasoner.
    Reasoner,
    /// Blank input / nothing matched.
    Default,
}

/// Outcome of intent resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    /// Always within [0, 1].
    pub confidence: f64,
    /// Runner-up intents, ranked best first.
    pub alternatives: Vec<(Intent, f64)>,
    pub source: IntentSource,
    /// Resolved workflow name.
    pub target: String,
}

impl IntentResult {
    pub fn new(intent: Intent, confidence: f64, source: IntentSource) -> Self {
        Self {
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            alternatives: Vec::new(),
            source,
            target: intent.default_target().to_string(),
        }
    }

    #[must_use]
    pub fn with_alternatives(mut self, alternatives: Vec<(Intent, f64)>) -> Self {
        self.alternatives = alternatives;
        self
    }
}

/// Which fast-path shortcut fired.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Shortcut {
    Hint,
    Prefix,
}

/// Result of the router's pre-classification shortcut check.
#[derive(Debug, Clone, PartialEq)]
pub enum FastPathResult {
    /// Both classifiers may be skipped.
    Hit {
        intent: Intent,
        target: String,
        shortcut: Shortcut,
    },
    /// No shortcut available; classification is required.
    Miss,
}
