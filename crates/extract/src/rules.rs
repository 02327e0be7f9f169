//! Prioritised rule tables: VIP aliases, context disambiguation and type
//! heuristics. Every table is an ordered list evaluated first-match-wins.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use ingest::span::{ceil_char_boundary, floor_char_boundary};

use crate::normalizer::name_key;
use crate::schema::{EntityType, RiskProfile};

/// One entry of an ordered rule table.
pub trait Rule {
    type Output;

    fn name(&self) -> &str;

    /// `Some` when the rule fires for this candidate in this context.
    fn apply(&self, candidate: &str, context: &str) -> Option<Self::Output>;
}

pub struct RuleSet<R> {
    rules: Vec<R>,
}

impl<R: Rule> RuleSet<R> {
    pub fn new(rules: Vec<R>) -> Self {
        Self { rules }
    }

    /// Output of the first firing rule, with that rule's name.
    pub fn first_match(&self, candidate: &str, context: &str) -> Option<(&str, R::Output)> {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(candidate, context).map(|out| (rule.name(), out)))
    }

    /// Outputs of every firing rule, in table order.
    pub fn all_matches(&self, candidate: &str, context: &str) -> Vec<R::Output> {
        self.rules
            .iter()
            .filter_map(|rule| rule.apply(candidate, context))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A resolved canonical identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub canonical: String,
    pub entity_type: EntityType,
    pub aliases: BTreeSet<String>,
    pub risk: RiskProfile,
}

// --- VIP table -------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VipEntry {
    pub canonical_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub metadata: RiskProfile,
}

/// Curated alias -> canonical table. Always beats every later stage.
pub struct VipTable {
    entries: Vec<VipEntry>,
    by_key: HashMap<String, usize>,
}

impl VipTable {
    pub fn new(entries: Vec<VipEntry>) -> Self {
        let mut by_key = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            for name in std::iter::once(&entry.canonical_name).chain(entry.aliases.iter()) {
                // earlier entries keep contested aliases
                by_key.entry(name_key(name)).or_insert(idx);
            }
        }
        Self { entries, by_key }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(include_str!("../data/vip_rules.json"))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<VipEntry> =
            serde_json::from_str(json).context("Failed to parse VIP rule table")?;
        Ok(Self::new(entries))
    }

    pub fn lookup(&self, candidate: &str) -> Option<&VipEntry> {
        self.by_key
            .get(&name_key(candidate))
            .map(|&idx| &self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Rule for VipTable {
    type Output = Resolution;

    fn name(&self) -> &str {
        "vip"
    }

    fn apply(&self, candidate: &str, _context: &str) -> Option<Resolution> {
        self.lookup(candidate).map(|entry| Resolution {
            canonical: entry.canonical_name.clone(),
            entity_type: entry.entity_type,
            aliases: entry.aliases.iter().cloned().collect(),
            risk: entry.metadata.clone(),
        })
    }
}

// --- Context rules ---------------------------------------------------------

/// Disambiguates one candidate string by looking at nearby text.
pub struct ContextRule {
    name: String,
    candidate_key: String,
    requires: Regex,
    canonical: String,
    entity_type: EntityType,
    window: usize,
}

impl ContextRule {
    pub fn new(
        candidate: &str,
        requires: &str,
        canonical: &str,
        entity_type: EntityType,
        window: usize,
    ) -> Result<Self> {
        let requires = Regex::new(requires)
            .with_context(|| format!("Invalid context pattern for {}", candidate))?;

        Ok(Self {
            name: format!("{} => {}", candidate, canonical),
            candidate_key: name_key(candidate),
            requires,
            canonical: canonical.to_string(),
            entity_type,
            window,
        })
    }
}

impl Rule for ContextRule {
    type Output = Resolution;

    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, candidate: &str, context: &str) -> Option<Resolution> {
        let at = match context.find(candidate) {
            Some(pos) => pos..pos + candidate.len(),
            None => 0..context.len(),
        };
        self.apply_at(candidate, context, at)
    }
}

impl ContextRule {
    /// Fires only on text within `window` bytes of the occurrence at `at`.
    pub fn apply_at(&self, candidate: &str, context: &str, at: Range<usize>) -> Option<Resolution> {
        if name_key(candidate) != self.candidate_key {
            return None;
        }

        let start = at.start.min(context.len()).saturating_sub(self.window);
        let start = floor_char_boundary(context, start);
        let end = ceil_char_boundary(context, at.end.saturating_add(self.window).min(context.len()));
        self.requires.is_match(&context[start..end.max(start)]).then(|| Resolution {
            canonical: self.canonical.clone(),
            entity_type: self.entity_type,
            aliases: BTreeSet::from([candidate.to_string()]),
            risk: RiskProfile::default(),
        })
    }
}

impl RuleSet<ContextRule> {
    /// `first_match` pinned to one occurrence of the candidate.
    pub fn first_match_at(
        &self,
        candidate: &str,
        context: &str,
        at: Range<usize>,
    ) -> Option<(&str, Resolution)> {
        self.rules.iter().find_map(|rule| {
            rule.apply_at(candidate, context, at.clone())
                .map(|out| (rule.name(), out))
        })
    }
}

pub fn builtin_context_rules() -> Result<RuleSet<ContextRule>> {
    let rules = vec![
        ContextRule::new(
            "Palm Beach",
            r"(?i)\b(police|detective|officer|pbpd)\b",
            "Palm Beach Police Department",
            EntityType::Organization,
            60,
        )?,
        ContextRule::new(
            "Palm Beach",
            r"(?i)\b(state attorney|prosecutor|grand jury)\b",
            "Palm Beach County State Attorney's Office",
            EntityType::Organization,
            60,
        )?,
        ContextRule::new(
            "Southern District",
            r"(?i)\bnew york\b",
            "U.S. Attorney's Office for the Southern District of New York",
            EntityType::Organization,
            40,
        )?,
        ContextRule::new(
            "Virgin Islands",
            r"(?i)\b(attorney general|government|sued|lawsuit|complaint)\b",
            "Government of the U.S. Virgin Islands",
            EntityType::Organization,
            60,
        )?,
        ContextRule::new(
            "Bear Stearns",
            r"(?i)\b(bank|trader|trading|securities|investment)\b",
            "Bear Stearns",
            EntityType::Financial,
            80,
        )?,
    ];

    Ok(RuleSet::new(rules))
}

// --- Type heuristics -------------------------------------------------------

pub struct TypeRule {
    name: String,
    entity_type: EntityType,
    pattern: Regex,
    exclude: Option<Regex>,
}

impl TypeRule {
    pub fn new(name: &str, entity_type: EntityType, pattern: &str, exclude: Option<&str>) -> Result<Self> {
        let pattern = Regex::new(pattern).with_context(|| format!("Invalid type pattern {}", name))?;
        let exclude = exclude
            .map(|p| Regex::new(p).with_context(|| format!("Invalid exclusion for {}", name)))
            .transpose()?;

        Ok(Self {
            name: name.to_string(),
            entity_type,
            pattern,
            exclude,
        })
    }
}

impl Rule for TypeRule {
    type Output = EntityType;

    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, candidate: &str, _context: &str) -> Option<EntityType> {
        if self.exclude.as_ref().is_some_and(|ex| ex.is_match(candidate)) {
            return None;
        }
        self.pattern.is_match(candidate).then_some(self.entity_type)
    }
}

/// Ordered type heuristics for names no earlier stage resolved.
pub struct TypeClassifier {
    rules: RuleSet<TypeRule>,
}

impl TypeClassifier {
    pub fn new(rules: RuleSet<TypeRule>) -> Self {
        Self { rules }
    }

    pub fn builtin() -> Result<Self> {
        let rules = vec![
            TypeRule::new(
                "organization_suffix",
                EntityType::Organization,
                r"(?i)\b(inc|llc|ltd|limited|corp|corporation|company|co|foundation|trust|group|holdings|partners|associates|university|college|institute|school|association|department|office|agency|bureau|police|court|committee|council|church|hospital)\.?$",
                None,
            )?,
            TypeRule::new(
                "media_outlet",
                EntityType::Media,
                r"(?i)\b(times|post|news|herald|journal|gazette|tribune|magazine|daily|press|reporter|television|tv|radio|broadcasting|media|network|cnn|bbc|nbc|abc|cbs|fox)\b",
                None,
            )?,
            TypeRule::new(
                "financial_term",
                EntityType::Financial,
                r"(?i)\b(bank|capital|fund|funds|investments?|securities|financial|bancorp|wealth|advisors|credit|exchange)\b",
                None,
            )?,
            TypeRule::new(
                "location_term",
                EntityType::Location,
                r"(?i)\b(island|islands|beach|ranch|house|mansion|estate|airport|street|avenue|road|county|city|park|bay|lake|mountain|valley|new york|new mexico|florida|london|paris|manhattan|santa fe)",
                Some(r"(?i)housekeeper"),
            )?,
            TypeRule::new(
                "person_tokens",
                EntityType::Person,
                r"^\S+( \S+){1,3}$",
                None,
            )?,
        ];

        Ok(Self::new(RuleSet::new(rules)))
    }

    /// Falls through to `Other` when nothing fires.
    pub fn classify(&self, name: &str) -> EntityType {
        self.rules
            .first_match(name, "")
            .map(|(_, ty)| ty)
            .unwrap_or(EntityType::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vip_lookup_is_normalized() {
        let vip = VipTable::builtin().unwrap();

        let entry = vip.lookup("  jeffrey e. epstein. ").unwrap();
        assert_eq!(entry.canonical_name, "Jeffrey Epstein");
        assert_eq!(entry.metadata.risk_level.as_deref(), Some("high"));

        let island = vip.apply("Epstein Island", "").unwrap();
        assert_eq!(island.canonical, "Little St. James");
        assert_eq!(island.entity_type, EntityType::Location);

        assert!(vip.lookup("Nobody Special").is_none());
    }

    #[test]
    fn test_vip_from_json() {
        let vip = VipTable::from_json(
            r#"[{"canonicalName": "Sarah Kellen", "aliases": ["Sarah Kensington"], "type": "Person"}]"#,
        )
        .unwrap();
        assert_eq!(vip.lookup("Sarah Kensington").unwrap().canonical_name, "Sarah Kellen");
        assert!(vip.lookup("Sarah Kellen").unwrap().metadata.is_empty());
        assert!(VipTable::from_json("{not json").is_err());
    }

    #[test]
    fn test_context_rules_first_match_wins() {
        let rules = builtin_context_rules().unwrap();

        let (_, police) = rules
            .first_match("Palm Beach", "a Palm Beach detective interviewed her")
            .unwrap();
        assert_eq!(police.canonical, "Palm Beach Police Department");

        // both rules could fire; table order decides
        let (_, first) = rules
            .first_match("Palm Beach", "the Palm Beach police and the state attorney")
            .unwrap();
        assert_eq!(first.canonical, "Palm Beach Police Department");

        let (_, prosecutor) = rules
            .first_match("Palm Beach", "the Palm Beach state attorney declined")
            .unwrap();
        assert_eq!(prosecutor.canonical, "Palm Beach County State Attorney's Office");

        assert!(rules.first_match("Palm Beach", "a house in Palm Beach").is_none());
    }

    #[test]
    fn test_context_rule_respects_window() {
        let rule = ContextRule::new("Palm Beach", r"(?i)police", "PBPD", EntityType::Organization, 10).unwrap();
        let near = "Palm Beach police";
        let far = "Palm Beach is where, many years later, police arrived";

        assert!(rule.apply("Palm Beach", near).is_some());
        assert!(rule.apply("Palm Beach", far).is_none());
    }

    #[test]
    fn test_context_rule_looks_at_given_occurrence() {
        let rules = builtin_context_rules().unwrap();
        let text = format!(
            "Palm Beach police opened a file.{}she later bought a villa in Palm Beach with cash.",
            " and then nothing happened for a long while".repeat(4)
        );
        let later = text.rfind("Palm Beach").unwrap();

        let first = rules.first_match_at("Palm Beach", &text, 0..10).unwrap();
        assert_eq!(first.1.canonical, "Palm Beach Police Department");
        assert!(rules.first_match_at("Palm Beach", &text, later..later + 10).is_none());
    }

    #[test]
    fn test_type_heuristics_order() {
        let types = TypeClassifier::builtin().unwrap();

        assert_eq!(types.classify("Southern Trust Company"), EntityType::Organization);
        assert_eq!(types.classify("New York Post"), EntityType::Media);
        assert_eq!(types.classify("Financial Trust Bank Holdings"), EntityType::Organization);
        assert_eq!(types.classify("Bear Stearns Capital"), EntityType::Financial);
        assert_eq!(types.classify("El Brillo Beach"), EntityType::Location);
        assert_eq!(types.classify("Sarah Kellen"), EntityType::Person);
        assert_eq!(types.classify("One Two Three Four Five"), EntityType::Other);
    }

    #[test]
    fn test_housekeeper_is_not_a_location() {
        let types = TypeClassifier::builtin().unwrap();
        assert_eq!(types.classify("Housekeeper Juan Alessi"), EntityType::Person);
        assert_eq!(types.classify("Juan House"), EntityType::Location);
    }
}
