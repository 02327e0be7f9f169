use std::collections::BTreeSet;
use std::ops::Range;

use anyhow::Result;

use crate::rules::{builtin_context_rules, ContextRule, Rule, RuleSet, TypeClassifier, VipTable};
use crate::schema::{EntityType, ResolutionMethod, RiskProfile};

/// Outcome of the name stages (VIP, context rule, pass-through).
#[derive(Debug, Clone, PartialEq)]
pub struct NameResolution {
    pub name: String,
    /// `None` for pass-through names; typed later only if newly seen.
    pub entity_type: Option<EntityType>,
    pub method: ResolutionMethod,
    pub aliases: BTreeSet<String>,
    pub risk: RiskProfile,
}

impl NameResolution {
    pub fn is_vip(&self) -> bool {
        self.method == ResolutionMethod::VipRule
    }
}

/// Canonicalises candidate names. VIP rules win over context rules, which
/// win over pass-through.
pub struct Resolver {
    vip: VipTable,
    context_rules: RuleSet<ContextRule>,
    types: TypeClassifier,
}

impl Resolver {
    pub fn new(vip: VipTable, context_rules: RuleSet<ContextRule>, types: TypeClassifier) -> Self {
        Self {
            vip,
            context_rules,
            types,
        }
    }

    pub fn builtin() -> Result<Self> {
        Ok(Self::new(
            VipTable::builtin()?,
            builtin_context_rules()?,
            TypeClassifier::builtin()?,
        ))
    }

    /// Same tables as `builtin` with a caller-supplied VIP table.
    pub fn with_vip(vip: VipTable) -> Result<Self> {
        Ok(Self::new(vip, builtin_context_rules()?, TypeClassifier::builtin()?))
    }

    /// Resolve the occurrence of `candidate` at byte range `at` of `context`.
    pub fn resolve_name(&self, candidate: &str, context: &str, at: Range<usize>) -> NameResolution {
        if let Some(hit) = self.vip.apply(candidate, context) {
            let mut aliases = hit.aliases;
            aliases.insert(candidate.to_string());
            return NameResolution {
                name: hit.canonical,
                entity_type: Some(hit.entity_type),
                method: ResolutionMethod::VipRule,
                aliases,
                risk: hit.risk,
            };
        }

        if let Some((rule, hit)) = self.context_rules.first_match_at(candidate, context, at) {
            tracing::debug!(candidate, rule, canonical = %hit.canonical, "Context rule fired");
            return NameResolution {
                name: hit.canonical,
                entity_type: Some(hit.entity_type),
                method: ResolutionMethod::ContextRule,
                aliases: hit.aliases,
                risk: hit.risk,
            };
        }

        NameResolution {
            name: candidate.to_string(),
            entity_type: None,
            method: ResolutionMethod::Heuristic,
            aliases: BTreeSet::new(),
            risk: RiskProfile::default(),
        }
    }

    pub fn classify(&self, name: &str) -> EntityType {
        self.types.classify(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::VipEntry;

    #[test]
    fn test_vip_overrides_context_rules() {
        // "Palm Beach" is both a VIP alias and a context-rule key here
        let vip = VipTable::new(vec![VipEntry {
            canonical_name: "Town of Palm Beach".into(),
            aliases: vec!["Palm Beach".into()],
            entity_type: EntityType::Location,
            metadata: RiskProfile::default(),
        }]);
        let resolver = Resolver::with_vip(vip).unwrap();

        let resolved = resolver.resolve_name("Palm Beach", "Palm Beach police detectives said", 0..10);
        assert_eq!(resolved.name, "Town of Palm Beach");
        assert_eq!(resolved.method, ResolutionMethod::VipRule);
        assert_eq!(resolved.entity_type, Some(EntityType::Location));
        assert!(resolved.aliases.contains("Palm Beach"));
    }

    #[test]
    fn test_context_rule_then_pass_through() {
        let resolver = Resolver::with_vip(VipTable::empty()).unwrap();

        let ruled = resolver.resolve_name("Palm Beach", "Palm Beach police detectives said", 0..10);
        assert_eq!(ruled.method, ResolutionMethod::ContextRule);
        assert_eq!(ruled.name, "Palm Beach Police Department");

        let plain = resolver.resolve_name("Sarah Kellen", "Sarah Kellen called twice", 0..12);
        assert_eq!(plain.method, ResolutionMethod::Heuristic);
        assert_eq!(plain.name, "Sarah Kellen");
        assert_eq!(plain.entity_type, None);
        assert_eq!(resolver.classify(&plain.name), EntityType::Person);
    }

    #[test]
    fn test_builtin_vip_carries_risk() {
        let resolver = Resolver::builtin().unwrap();
        let resolved = resolver.resolve_name("Jeff Epstein", "", 0..0);

        assert!(resolved.is_vip());
        assert_eq!(resolved.name, "Jeffrey Epstein");
        assert_eq!(resolved.risk.red_flag_rating, Some(5));
    }
}
