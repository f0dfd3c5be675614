//! Regex rules mapping raw input to registry states

use super::{Definitions, DefinitionReader, FileTracker, LoadError};
use crate::state_machine::Param;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

pub const RULES_FILE: &str = "regexes.json";

#[derive(Deserialize)]
struct RawRule {
    regex: String,
    state: String,
    #[serde(default)]
    params: Vec<GroupRef>,
}

/// Capture group named in a rule's `params`: `1` or `"1"` by position,
/// any other string by group name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum GroupRef {
    Index(usize),
    Name(String),
}

impl From<&str> for GroupRef {
    fn from(name: &str) -> Self {
        GroupRef::Name(name.to_string())
    }
}

/// A rule: when `pattern` matches, load `state` with the named groups as params
#[derive(Debug, Clone)]
pub struct RegexRule {
    pub pattern: Regex,
    pub state: String,
    pub params: Vec<GroupRef>,
}

impl RegexRule {
    /// Capture groups named by `params`, in order. A group that does not
    /// exist or did not participate in the match is `None`.
    pub fn captures(&self, text: &str) -> Option<Vec<Param>> {
        let captures = self.pattern.captures(text)?;
        Some(
            self.params
                .iter()
                .map(|param| {
                    let group = match param {
                        GroupRef::Index(position) => captures.get(*position),
                        GroupRef::Name(name) => match name.parse::<usize>() {
                            Ok(position) => captures.get(position),
                            Err(_) => captures.name(name),
                        },
                    };
                    group.map(|m| m.as_str().to_string())
                })
                .collect(),
        )
    }
}

/// Ordered rule list; the first matching rule wins
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RegexRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<RegexRule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn first_match(&self, text: &str) -> Option<(&RegexRule, Vec<Param>)> {
        self.rules
            .iter()
            .find_map(|rule| rule.captures(text).map(|params| (rule, params)))
    }
}

impl Definitions for RuleSet {
    const KIND: &'static str = "regexes";

    fn load(data_dir: &Path, files: &mut FileTracker) -> Result<Self, LoadError> {
        let mut rules = Vec::new();
        let mut reader = DefinitionReader::new(data_dir, files);
        reader.read_list(RULES_FILE, &mut |reader, path, entry| {
            add_rule(reader, path, &mut rules, entry)
        })?;
        Ok(Self { rules })
    }
}

fn add_rule(
    reader: &mut DefinitionReader<'_>,
    path: &Path,
    rules: &mut Vec<RegexRule>,
    entry: Value,
) -> Result<(), LoadError> {
    if let Some(target) = entry.get("redirect") {
        let Some(target) = target.as_str() else {
            return Err(LoadError::definition(path, "redirect must be a file name"));
        };
        return reader.read_list(target, &mut |reader, path, entry| {
            add_rule(reader, path, rules, entry)
        });
    }

    let raw: RawRule = serde_json::from_value(entry)
        .map_err(|e| LoadError::definition(path, format!("invalid regex rule: {e}")))?;
    let pattern = Regex::new(&raw.regex).map_err(|source| LoadError::Regex {
        pattern: raw.regex.clone(),
        source,
    })?;
    rules.push(RegexRule {
        pattern,
        state: raw.state,
        params: raw.params,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::testing::write_definition;
    use serde_json::json;
    use tempfile::TempDir;

    fn rule(pattern: &str, state: &str, params: &[&str]) -> RegexRule {
        RegexRule {
            pattern: Regex::new(pattern).unwrap(),
            state: state.to_string(),
            params: params.iter().copied().map(GroupRef::from).collect(),
        }
    }

    #[test]
    fn test_missing_groups_are_none() {
        let rule = rule(
            r"^describe(?: (?P<df>\w+))?(?: (?P<col>\w+))?$",
            "data?select_column",
            &["df", "col", "absent"],
        );
        assert_eq!(
            rule.captures("describe sales").unwrap(),
            vec![Some("sales".to_string()), None, None]
        );
        assert!(rule.captures("plot").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let rules = RuleSet::new(vec![
            rule("^hello", "a?first", &[]),
            rule("hello", "a?second", &[]),
        ]);
        let (matched, params) = rules.first_match("hello there").unwrap();
        assert_eq!(matched.state, "a?first");
        assert!(params.is_empty());
        assert_eq!(rules.first_match("oh hello").unwrap().0.state, "a?second");
    }

    #[test]
    fn test_load_follows_redirects() {
        let dir = TempDir::new().unwrap();
        write_definition(
            dir.path(),
            RULES_FILE,
            &json!([
                {"regex": "^one$", "state": "m?one"},
                {"redirect": "more.json"},
                {"regex": "^three$", "state": "m?three"}
            ]),
        );
        write_definition(
            dir.path(),
            "more.json",
            &json!([{"regex": "^(two)$", "state": "m?two", "params": ["1"]}]),
        );
        let mut files = FileTracker::default();
        let rules = RuleSet::load(dir.path(), &mut files).unwrap();
        assert_eq!(rules.len(), 3);
        let (matched, params) = rules.first_match("two").unwrap();
        assert_eq!(matched.state, "m?two");
        assert_eq!(params, vec![Some("two".to_string())]);
    }

    #[test]
    fn test_integer_params_load() {
        let dir = TempDir::new().unwrap();
        write_definition(
            dir.path(),
            RULES_FILE,
            &json!([{
                "regex": "^plot (\\w+) against (?P<y>\\w+)$",
                "state": "m?plot",
                "params": [1, "y", 3]
            }]),
        );
        let mut files = FileTracker::default();
        let rules = RuleSet::load(dir.path(), &mut files).unwrap();
        let (matched, params) = rules.first_match("plot price against time").unwrap();
        assert_eq!(
            matched.params,
            vec![GroupRef::Index(1), GroupRef::from("y"), GroupRef::Index(3)]
        );
        assert_eq!(
            params,
            vec![Some("price".to_string()), Some("time".to_string()), None]
        );
    }

    #[test]
    fn test_invalid_regex_fails_load() {
        let dir = TempDir::new().unwrap();
        write_definition(dir.path(), RULES_FILE, &json!([{"regex": "(", "state": "m?x"}]));
        let mut files = FileTracker::default();
        let err = RuleSet::load(dir.path(), &mut files).unwrap_err();
        assert!(matches!(err, LoadError::Regex { .. }));
    }
}
