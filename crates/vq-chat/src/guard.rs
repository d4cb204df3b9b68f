//! Red-flag screen run before any provider call.

/// Why a message was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedFlag {
    /// Asks the bot to argue against evidence-locked foundations.
    Tier0Violation,
    /// Asks the bot to recast a historical claim as non-historical.
    SemanticSubstitution,
}

impl RedFlag {
    pub fn reason(&self) -> &'static str {
        match self {
            RedFlag::Tier0Violation => "Tier 0 violation - request to argue against locked historical evidence",
            RedFlag::SemanticSubstitution => {
                "Semantic substitution - attempt to redefine Tier 0 as non-historical"
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RedFlag::Tier0Violation => "tier0_violation",
            RedFlag::SemanticSubstitution => "semantic_substitution",
        }
    }

    /// Fixed answer returned instead of calling the completion provider.
    pub fn response(&self) -> String {
        format!(
            "I can't do that because it would violate evidence-locked foundations (ETS Tier 0).\n\n\
             **Why this crosses the line:** {}\n\n\
             The resurrection evidence (empty tomb, 500+ witnesses, martyrdom behavior, early creed \
             2-5 years post-event, Paul's conversion) must be evaluated with the SAME standards \
             applied to all historical claims.\n\n\
             **Want to engage honestly?** Let's examine the evidence itself using consistent \
             Bayesian standards, or we can use a different methodology (Historical-Critical, \
             Legal-Historical, IBE) - your choice. The symmetric standards apply regardless.\n\n\
             I'm here to reason with you, not to dodge tough questions. But I won't use double \
             standards. 🕊️",
            self.reason()
        )
    }
}

const TIER0_PATTERNS: &[&str] = &[
    "argue against the resurrection",
    "prove resurrection false",
    "show why resurrection didn't happen",
    "resurrection is just a myth",
    "make case against jesus",
];

const SEMANTIC_PATTERNS: &[&str] = &[
    "treat resurrection as metaphor",
    "reframe resurrection as",
    "imagine resurrection as symbol",
];

/// Case-insensitive substring screen. Tier 0 patterns are checked first.
pub fn detect_red_flag(message: &str) -> Option<RedFlag> {
    let lower = message.to_lowercase();
    if TIER0_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(RedFlag::Tier0Violation);
    }
    if SEMANTIC_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(RedFlag::SemanticSubstitution);
    }
    None
}
