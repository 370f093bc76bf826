//! # Discovery Filter
//!
//! Predicate carried in a request that selects which nodes act on it. An
//! empty filter matches every node.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

const FACT_OPERATORS: [&str; 7] = [">=", "<=", "<", ">", "!=", "==", "=~"];

/// A single fact comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactFilter {
    /// Fact name
    pub fact: String,
    /// Comparison operator
    pub operator: String,
    /// Value to compare with
    pub value: String,
}

/// Discovery predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    fact: Vec<FactFilter>,
    #[serde(rename = "cf_class", default)]
    class: Vec<String>,
    #[serde(default)]
    agent: Vec<String>,
    #[serde(default)]
    identity: Vec<String>,
    #[serde(default)]
    compound: Vec<Vec<BTreeMap<String, String>>>,
}

/// Matches `needle` against `pattern`, a `/regex/` or an exact string.
fn matches_pattern(pattern: &str, needle: &str) -> bool {
    if pattern.len() > 1 && pattern.starts_with('/') && pattern.ends_with('/') {
        return Regex::new(&pattern[1..pattern.len() - 1])
            .map(|re| re.is_match(needle))
            .unwrap_or(false);
    }

    pattern == needle
}

impl Filter {
    /// An empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no predicate of any kind is set.
    pub fn is_empty(&self) -> bool {
        self.fact.is_empty()
            && self.class.is_empty()
            && self.agent.is_empty()
            && self.identity.is_empty()
            && self.compound.is_empty()
    }

    /// Require an agent. Empty and duplicate names are ignored.
    pub fn add_agent_filter(&mut self, agent: &str) {
        if !agent.is_empty() && !self.agent.iter().any(|a| a == agent) {
            self.agent.push(agent.to_string());
        }
    }

    /// Require a configuration management class.
    pub fn add_class_filter(&mut self, class: &str) {
        if !self.class.iter().any(|c| c == class) {
            self.class.push(class.to_string());
        }
    }

    /// Match an identity.
    pub fn add_identity_filter(&mut self, identity: &str) {
        if !self.identity.iter().any(|i| i == identity) {
            self.identity.push(identity.to_string());
        }
    }

    /// Require a fact comparison.
    pub fn add_fact_filter(&mut self, fact: &str, operator: &str, value: &str) -> Result<(), String> {
        if !FACT_OPERATORS.contains(&operator) {
            return Err(format!("{} is not a valid fact operator", operator));
        }

        self.fact.push(FactFilter {
            fact: fact.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
        });

        Ok(())
    }

    /// Add a compound expression. Empty queries are ignored.
    pub fn add_compound_filter(&mut self, query: &str) {
        if query.is_empty() {
            return;
        }

        self.compound
            .push(vec![BTreeMap::from([("expr".to_string(), query.to_string())])]);
    }

    /// Agent predicates.
    pub fn agent_filters(&self) -> &[String] {
        &self.agent
    }

    /// Class predicates.
    pub fn class_filters(&self) -> &[String] {
        &self.class
    }

    /// Identity predicates.
    pub fn identity_filters(&self) -> &[String] {
        &self.identity
    }

    /// Compound expressions.
    pub fn compound_filters(&self) -> &[Vec<BTreeMap<String, String>>] {
        &self.compound
    }

    /// Fact predicates as `[fact, operator, value]` triples.
    pub fn fact_filters(&self) -> Vec<[String; 3]> {
        self.fact
            .iter()
            .map(|f| [f.fact.clone(), f.operator.clone(), f.value.clone()])
            .collect()
    }

    /// Whether `identity` satisfies any identity predicate.
    pub fn match_identity(&self, identity: &str) -> bool {
        self.identity.iter().any(|p| matches_pattern(p, identity))
    }

    /// Whether every agent predicate is satisfied by `known`.
    pub fn match_agents(&self, known: &[String]) -> bool {
        self.agent.iter().all(|p| known.iter().any(|k| matches_pattern(p, k)))
    }

    /// Whether every class predicate is satisfied by `known`.
    pub fn match_classes(&self, known: &[String]) -> bool {
        self.class.iter().all(|p| known.iter().any(|k| matches_pattern(p, k)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_filter_is_empty() {
        let f = Filter::new();
        assert!(f.is_empty());
        assert_eq!(
            serde_json::to_string(&f).unwrap(),
            r#"{"fact":[],"cf_class":[],"agent":[],"identity":[],"compound":[]}"#
        );
    }

    #[test]
    fn test_agent_filter() {
        let mut f = Filter::new();
        f.add_agent_filter("");
        assert!(f.is_empty());

        f.add_agent_filter("rpcutil");
        f.add_agent_filter("rpcutil");
        assert_eq!(f.agent_filters(), ["rpcutil".to_string()]);
        assert!(!f.is_empty());
    }

    #[test]
    fn test_identity_and_class_dedupe() {
        let mut f = Filter::new();
        f.add_identity_filter("n1");
        f.add_identity_filter("n1");
        f.add_class_filter("apache");
        f.add_class_filter("apache");

        assert_eq!(f.identity_filters().len(), 1);
        assert_eq!(f.class_filters().len(), 1);
    }

    #[test]
    fn test_fact_filter_operators() {
        let mut f = Filter::new();
        assert!(f.add_fact_filter("country", "==", "mt").is_ok());
        assert_eq!(
            f.add_fact_filter("country", "~", "mt").unwrap_err(),
            "~ is not a valid fact operator"
        );
        assert_eq!(
            f.fact_filters(),
            vec![["country".to_string(), "==".to_string(), "mt".to_string()]]
        );
    }

    #[test]
    fn test_compound_filter() {
        let mut f = Filter::new();
        f.add_compound_filter("");
        assert!(f.is_empty());

        f.add_compound_filter("with('apache')");
        assert_eq!(f.compound_filters()[0][0]["expr"], "with('apache')");
    }

    #[test]
    fn test_matching() {
        let mut f = Filter::new();
        f.add_identity_filter("/^web\\d+/");
        f.add_identity_filter("db1");
        f.add_agent_filter("rpcutil");
        f.add_class_filter("/apache/");

        assert!(f.match_identity("web10.example.net"));
        assert!(f.match_identity("db1"));
        assert!(!f.match_identity("db2"));

        assert!(f.match_agents(&["rpcutil".into(), "puppet".into()]));
        assert!(!f.match_agents(&["puppet".into()]));

        assert!(f.match_classes(&["role::apache".into()]));
        assert!(!f.match_classes(&["nginx".into()]));
    }

    #[test]
    fn test_missing_lists_deserialize_as_empty() {
        let f: Filter = serde_json::from_str(r#"{"agent":["x"]}"#).unwrap();
        assert_eq!(f.agent_filters(), ["x".to_string()]);
        assert!(f.fact_filters().is_empty());
    }
}
