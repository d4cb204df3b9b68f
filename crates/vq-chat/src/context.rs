//! Context blob assembly
//!
//! The always-on core identity text plus topic blobs selected by keyword.
//! Blob text is authored outside the service and loaded once at startup from
//! `<context_dir>/<file>`; a missing file simply contributes nothing.

use std::path::Path;

pub const CORE_IDENTITY_FILE: &str = "core_identity.txt";

/// How a matched topic's text reaches the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Spliced in verbatim.
    Open,
    /// Wrapped in a pastoral-deflection instruction; the model decides
    /// whether the crisis condition applies.
    Pastoral,
}

#[derive(Debug, Clone, Copy)]
pub struct TopicRule {
    pub topic: &'static str,
    pub file: &'static str,
    pub keywords: &'static [&'static str],
    pub gate: Gate,
}

/// Evaluated in order; every matching row contributes.
pub const TOPIC_TABLE: &[TopicRule] = &[
    TopicRule {
        topic: "mission",
        file: "mission.txt",
        keywords: &["mission", "vision", "safe harbor", "mandate", "agape", "why did you build", "purpose"],
        gate: Gate::Open,
    },
    TopicRule {
        topic: "methodology",
        file: "methodology.txt",
        keywords: &[
            "methodology",
            "bayes",
            "bayesian",
            "inference to best explanation",
            "legal-historical",
            "historical-critical",
            "cumulative case",
            "likelihood ratio",
            "symmetric",
            "epistemic",
            "tier 0",
        ],
        gate: Gate::Open,
    },
    TopicRule {
        topic: "tools",
        file: "tools.txt",
        keywords: &[
            "tool",
            "resurrection engine",
            "crucible",
            "comparison engine",
            "empty tomb witness",
            "beta",
            "calculator",
        ],
        gate: Gate::Open,
    },
    TopicRule {
        topic: "robot",
        file: "robot.txt",
        keywords: &["robot", "vq-1", "vq1", "reachy", "embodied", "hardware"],
        gate: Gate::Open,
    },
    TopicRule {
        topic: "resources",
        file: "resources.txt",
        keywords: &["paper", "resources", "documentation", "research", "study", "studies", "test results"],
        gate: Gate::Open,
    },
    TopicRule {
        topic: "about",
        file: "about.txt",
        keywords: &["who built", "who made", "who created", "founder", "about cai", "what is cai", "christ-anchored"],
        gate: Gate::Open,
    },
    TopicRule {
        topic: "eschatology",
        file: "eschatology.txt",
        keywords: &[
            "end times",
            "end of the world",
            "rapture",
            "antichrist",
            "apocalypse",
            "tribulation",
            "second coming",
            "armageddon",
            "mark of the beast",
            "judgment day",
        ],
        gate: Gate::Pastoral,
    },
];

struct LoadedTopic {
    rule: TopicRule,
    text: String,
}

pub struct ContextLibrary {
    core_identity: String,
    topics: Vec<LoadedTopic>,
}

impl ContextLibrary {
    /// Read the core identity and every topic blob from `dir`.
    pub fn load(dir: &Path) -> Self {
        let core_identity = read_blob(&dir.join(CORE_IDENTITY_FILE));
        let topics = TOPIC_TABLE
            .iter()
            .map(|rule| LoadedTopic {
                rule: *rule,
                text: read_blob(&dir.join(rule.file)),
            })
            .collect::<Vec<_>>();

        let library = Self { core_identity, topics };
        tracing::info!(
            dir = %dir.display(),
            core_identity = !library.core_identity.is_empty(),
            topics = library.topic_count(),
            "Loaded context blobs"
        );
        library
    }

    /// Build from in-memory text keyed by topic name.
    pub fn from_blobs(core_identity: &str, blobs: &[(&str, &str)]) -> Self {
        let topics = TOPIC_TABLE
            .iter()
            .map(|rule| LoadedTopic {
                rule: *rule,
                text: blobs
                    .iter()
                    .find(|(topic, _)| *topic == rule.topic)
                    .map(|(_, text)| text.trim().to_string())
                    .unwrap_or_default(),
            })
            .collect();
        Self {
            core_identity: core_identity.trim().to_string(),
            topics,
        }
    }

    pub fn core_identity(&self) -> &str {
        &self.core_identity
    }

    /// Number of topics with non-empty text.
    pub fn topic_count(&self) -> usize {
        self.topics.iter().filter(|t| !t.text.is_empty()).count()
    }

    /// Names of the topics whose keywords occur in `message`, in table order.
    pub fn matched_topics(&self, message: &str) -> Vec<&'static str> {
        let lower = message.to_lowercase();
        self.topics
            .iter()
            .filter(|t| t.rule.keywords.iter().any(|k| lower.contains(k)))
            .map(|t| t.rule.topic)
            .collect()
    }

    /// Core identity followed by every matching topic blob. Never fails; empty
    /// open blobs contribute nothing, gated topics always emit their wrapper.
    pub fn assemble(&self, message: &str) -> String {
        let lower = message.to_lowercase();
        let mut sections = Vec::with_capacity(self.topics.len() + 1);
        if !self.core_identity.is_empty() {
            sections.push(self.core_identity.clone());
        }

        for topic in &self.topics {
            if !topic.rule.keywords.iter().any(|k| lower.contains(k)) {
                continue;
            }
            match topic.rule.gate {
                Gate::Open if topic.text.is_empty() => {}
                Gate::Open => sections.push(format!(
                    "# CONTEXT: {}\n{}",
                    topic.rule.topic.to_uppercase(),
                    topic.text
                )),
                Gate::Pastoral => sections.push(pastoral_wrapper(topic.rule.topic, &topic.text)),
            }
        }

        sections.join("\n\n")
    }
}

fn pastoral_wrapper(topic: &str, text: &str) -> String {
    let mut wrapper = format!(
        "# SENSITIVE TOPIC: {topic}\n\
         DEFAULT RESPONSE: Do not teach, speculate or predict on this topic. Respond warmly and \
         briefly, acknowledge the question, and point the visitor to a trusted local pastor, \
         church community, or (if they sound distressed) a crisis line such as 988 in the US."
    );
    if !text.is_empty() {
        wrapper.push_str(&format!(
            "\nONLY EXCEPTION: if the visitor explicitly and repeatedly says they are in fear or \
             spiritual crisis about this topic AND has already been pointed to human support in this \
             conversation, you may draw gently on the reference material below to offer hope. \
             Never use it to set dates, name people, or frighten.\n\
             --- BEGIN RESTRICTED REFERENCE ---\n\
             {text}\n\
             --- END RESTRICTED REFERENCE ---"
        ));
    }
    wrapper
}

fn read_blob(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Context blob unavailable");
            String::new()
        }
    }
}
