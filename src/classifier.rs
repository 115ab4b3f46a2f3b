//! Maps a decrypted task title to an executor type via an ordered
//! prefix-tag rule list. Pure function over the plaintext title; the rule
//! list is closed over by the core and not extensible at runtime (§4.1).

use crate::models::ExecutorType;
use regex::Regex;
use std::sync::LazyLock;

struct Rule {
    pattern: Regex,
    executor_type: ExecutorType,
}

/// Declaration order encodes priority: explicit literal tags first, legacy
/// synonyms next, semantic verbs last. The first matching rule wins.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let tag = |pat: &str| {
        Regex::new(&format!(r"(?i)^\[{pat}\]")).expect("classifier rule pattern is valid regex")
    };
    vec![
        // Explicit literal tags
        Rule { pattern: tag(r"ai"), executor_type: ExecutorType::Ai },
        Rule { pattern: tag(r"human-ai"), executor_type: ExecutorType::HumanAi },
        Rule { pattern: tag(r"human"), executor_type: ExecutorType::Human },
        // Legacy synonyms
        Rule { pattern: tag(r"claude-code"), executor_type: ExecutorType::Ai },
        Rule { pattern: tag(r"cc"), executor_type: ExecutorType::Ai },
        Rule { pattern: tag(r"de"), executor_type: ExecutorType::HumanAi },
        Rule { pattern: tag(r"pair"), executor_type: ExecutorType::HumanAi },
        // Semantic verbs
        Rule { pattern: tag(r"implement"), executor_type: ExecutorType::Ai },
        Rule { pattern: tag(r"deploy"), executor_type: ExecutorType::Ai },
        Rule { pattern: tag(r"research"), executor_type: ExecutorType::HumanAi },
        Rule { pattern: tag(r"plan"), executor_type: ExecutorType::HumanAi },
        Rule { pattern: tag(r"review"), executor_type: ExecutorType::HumanAi },
        Rule { pattern: tag(r"decide"), executor_type: ExecutorType::Human },
        Rule { pattern: tag(r"call"), executor_type: ExecutorType::Human },
        Rule { pattern: tag(r"meeting"), executor_type: ExecutorType::Human },
    ]
});

/// Classifies a plaintext title. Unmatched titles default to `human`.
pub fn classify(title: &str) -> ExecutorType {
    for rule in RULES.iter() {
        if rule.pattern.is_match(title) {
            return rule.executor_type;
        }
    }
    ExecutorType::Human
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_ai_tag_wins() {
        assert_eq!(classify("[ai] refactor the parser"), ExecutorType::Ai);
    }

    #[test]
    fn explicit_human_ai_tag() {
        assert_eq!(classify("[human-ai] review design doc"), ExecutorType::HumanAi);
    }

    #[test]
    fn case_insensitive_match() {
        assert_eq!(classify("[AI] add login"), ExecutorType::Ai);
        assert_eq!(classify("[Human]  call the vendor"), ExecutorType::Human);
    }

    #[test]
    fn legacy_synonym_maps_to_ai() {
        assert_eq!(classify("[claude-code] add tests"), ExecutorType::Ai);
        assert_eq!(classify("[CC] fix bug"), ExecutorType::Ai);
    }

    #[test]
    fn semantic_verb_implement_maps_to_ai() {
        assert_eq!(classify("[implement] add login"), ExecutorType::Ai);
    }

    #[test]
    fn semantic_verb_research_maps_to_human_ai() {
        assert_eq!(classify("[research] competitor pricing"), ExecutorType::HumanAi);
    }

    #[test]
    fn unmatched_title_defaults_to_human() {
        assert_eq!(classify("buy groceries"), ExecutorType::Human);
        assert_eq!(classify("[unknown-tag] something"), ExecutorType::Human);
    }

    #[test]
    fn tag_must_be_a_prefix() {
        assert_eq!(classify("please [ai] do this"), ExecutorType::Human);
    }

    #[test]
    fn explicit_tag_outranks_semantic_verb_in_same_title() {
        // "[human] implement the thing" — literal tag wins even though
        // "implement" would otherwise route to ai.
        assert_eq!(classify("[human] implement the thing"), ExecutorType::Human);
    }
}
