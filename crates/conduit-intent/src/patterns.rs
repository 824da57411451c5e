use once_cell::sync::Lazy;
use regex::Regex;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("classifier regex is a compile-time literal"))
        .collect()
}

/// §4.C regex families, anchored fragments, case-insensitive (the `(?i)`
/// flag is baked into each pattern rather than relying on caller-side
/// lowercasing, though the classifier also normalizes its input first).
pub static PROJECT_CREATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\b(create|build|make|develop|generate|start)\s+(?:a\s+)?(?:new\s+)?(project|app|application|website|api|service)\b",
        r"(?i)\bi\s*(?:'d)?\s*want\s+(?:a\s+)?new\s+(project|app|application)\b",
        r"(?i)\bnew\s+(project|app|application|website)\b",
    ])
});

pub static PROJECT_MODIFY: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\b(change|modify|update|add|remove|delete|edit)\b",
        r"(?i)\b(implement|integrate|include)\b.*\bfeature\b",
    ])
});

pub static PROJECT_INFO: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[r"(?i)\b(show|display|what|get)\b.*\b(status|info|details|project)\b"])
});

pub static HELP: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\b(help|guide|how\s+to|tutorial|example|what\s+can)\b",
        r"(?i)\b(explain|tell\s+me\s+about)\b",
    ])
});

pub static GREETING: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)^(hi|hello|hey|greetings|good\s+(morning|afternoon|evening))\b",
        r"(?i)\bhow\s+are\s+you\b",
    ])
});

pub fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}

/// First capture from a `project_create`-style match, used as the
/// `project_type` metadata field when present.
pub fn first_captured_project_type(text: &str) -> Option<String> {
    PROJECT_CREATE.iter().find_map(|re| {
        re.captures(text)
            .and_then(|c| c.get(2).or_else(|| c.get(1)))
            .map(|m| m.as_str().to_string())
    })
}

/// The verb matched by the `project_modify` family, used as the
/// `modification_verb` metadata field.
pub fn first_modification_verb(text: &str) -> Option<String> {
    PROJECT_MODIFY.iter().find_map(|re| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
    })
}
