use super::Error;
use std::collections::BTreeMap;

/// Operator of a single selector requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Requirement is one term of a label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    pub values: Vec<String>,
}

impl Requirement {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.operator {
            Operator::In => labels
                .get(&self.key)
                .is_some_and(|v| self.values.iter().any(|m| m == v)),
            // NotIn also selects documents lacking the label entirely.
            Operator::NotIn => labels
                .get(&self.key)
                .map_or(true, |v| !self.values.iter().any(|m| m == v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

/// Selector is a conjunction of label requirements.
///
/// The textual form follows the familiar Kubernetes syntax:
/// `app=web,tier!=cache,env in (prod, staging),!legacy,canary`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub requirements: Vec<Requirement>,
}

impl Selector {
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// An empty selector matches every label set.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    pub fn parse(selector: &str) -> Result<Self, Error> {
        let err = |detail: &str| Error::InvalidSelector {
            selector: selector.to_string(),
            detail: detail.to_string(),
        };

        let mut requirements = Vec::new();
        for term in split_terms(selector) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }

            let requirement = if let Some(key) = term.strip_prefix('!') {
                Requirement {
                    key: key.trim().to_string(),
                    operator: Operator::DoesNotExist,
                    values: Vec::new(),
                }
            } else if let Some((key, rest)) = split_set_op(term, " notin ") {
                Requirement {
                    key,
                    operator: Operator::NotIn,
                    values: parse_set(rest).ok_or_else(|| err("expected ( values )"))?,
                }
            } else if let Some((key, rest)) = split_set_op(term, " in ") {
                Requirement {
                    key,
                    operator: Operator::In,
                    values: parse_set(rest).ok_or_else(|| err("expected ( values )"))?,
                }
            } else if let Some((key, value)) = term.split_once("!=") {
                Requirement {
                    key: key.trim().to_string(),
                    operator: Operator::NotIn,
                    values: vec![value.trim().to_string()],
                }
            } else if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
                Requirement {
                    key: key.trim().to_string(),
                    operator: Operator::In,
                    values: vec![value.trim().to_string()],
                }
            } else {
                Requirement {
                    key: term.to_string(),
                    operator: Operator::Exists,
                    values: Vec::new(),
                }
            };

            if requirement.key.is_empty() {
                return Err(err("empty label name"));
            }
            requirements.push(requirement);
        }

        Ok(Self { requirements })
    }
}

// Split on commas which are not enclosed by a value set's parentheses.
fn split_terms(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let (mut depth, mut start) = (0usize, 0usize);
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    out.push(&s[start..]);
    out
}

fn split_set_op(term: &str, op: &str) -> Option<(String, String)> {
    let (key, rest) = term.split_once(op)?;
    Some((key.trim().to_string(), rest.trim().to_string()))
}

fn parse_set(rest: String) -> Option<Vec<String>> {
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    Some(
        inner
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parse_and_match() {
        let sel = Selector::parse("app=web, tier != cache, env in (prod, staging), !legacy, canary")
            .unwrap();
        assert_eq!(sel.requirements.len(), 5);

        assert!(sel.matches(&labels(&[
            ("app", "web"),
            ("env", "prod"),
            ("canary", "true"),
        ])));

        // tier=cache is excluded.
        assert!(!sel.matches(&labels(&[
            ("app", "web"),
            ("tier", "cache"),
            ("env", "prod"),
            ("canary", "true"),
        ])));

        // The legacy label must be absent.
        assert!(!sel.matches(&labels(&[
            ("app", "web"),
            ("env", "prod"),
            ("canary", "true"),
            ("legacy", "y"),
        ])));
    }

    #[test]
    fn not_in_matches_absent_label() {
        let sel = Selector::parse("tier notin (cache, edge)").unwrap();
        assert!(sel.matches(&labels(&[("app", "web")])));
        assert!(sel.matches(&labels(&[("tier", "db")])));
        assert!(!sel.matches(&labels(&[("tier", "edge")])));
    }

    #[test]
    fn empty_selector_matches_all() {
        let sel = Selector::parse("").unwrap();
        assert!(sel.is_empty());
        assert!(sel.matches(&labels(&[("anything", "at-all")])));
    }

    #[test]
    fn parse_rejects_malformed() {
        insta::assert_display_snapshot!(
            Selector::parse("env in prod").unwrap_err(),
            @r###"invalid label selector "env in prod": expected ( values )"###);
        assert!(Selector::parse("=value").is_err());
    }
}
