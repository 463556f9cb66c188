//! Compiled alias specifications.
//!
//! One `AliasSpec` corresponds to one `ACCOUNT … ;` statement: the delivery
//! accounts, the alias form, the compiled pattern and calculation.

use crate::core::calc::Calc;
use crate::core::chars::CharClass;
use crate::core::matcher::{MatchContext, Verified};
use crate::core::pattern::Pattern;

/// What `%alias%` stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aliases {
    /// No `ALIASED` clause (or `ALIASED *`): the alias is the account name.
    Same,
    /// `ALIASED a, b, …`: only these names satisfy `%alias%`.
    Explicit(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct AliasSpec {
    accounts: Vec<String>,
    accounts_folded: Vec<String>,
    aliases: Aliases,
    aliases_folded: Vec<String>,
    anchor_class: CharClass,
    pattern: Pattern,
    calc: Calc,
    context_ambiguous: bool,
    line: usize,
}

impl AliasSpec {
    /// Assemble a specification, enforcing the per-statement invariants:
    /// an explicit alias list requires exactly one account, and a
    /// multi-account pattern without `%account%` is tagged context-ambiguous.
    pub fn build(
        accounts: Vec<String>,
        aliases: Aliases,
        anchor_class: CharClass,
        pattern: Pattern,
        calc: Calc,
        fold: bool,
        line: usize,
    ) -> Result<AliasSpec, String> {
        if accounts.is_empty() {
            return Err("at least one account is required".to_string());
        }
        if let Aliases::Explicit(list) = &aliases {
            if list.is_empty() {
                return Err("ALIASED requires at least one alias".to_string());
            }
            if accounts.len() > 1 {
                return Err("explicit aliases require exactly one account".to_string());
            }
        }
        let fold_all = |names: &[String]| -> Vec<String> {
            names
                .iter()
                .map(|n| if fold { n.to_ascii_lowercase() } else { n.clone() })
                .collect()
        };
        let accounts_folded = fold_all(&accounts);
        let aliases_folded = match &aliases {
            Aliases::Same => Vec::new(),
            Aliases::Explicit(list) => fold_all(list),
        };
        // With `Aliases::Same`, `%alias%` expands to the account names and
        // anchors the delivery account just as `%account%` would.
        let anchored =
            pattern.has_account() || (pattern.has_alias() && matches!(aliases, Aliases::Same));
        let context_ambiguous = accounts.len() > 1 && !anchored;

        Ok(AliasSpec {
            accounts,
            accounts_folded,
            aliases,
            aliases_folded,
            anchor_class,
            pattern,
            calc,
            context_ambiguous,
            line,
        })
    }

    /// Declared accounts, canonical case.
    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn aliases(&self) -> &Aliases {
        &self.aliases
    }

    pub fn anchor_class(&self) -> CharClass {
        self.anchor_class
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn calc(&self) -> &Calc {
        &self.calc
    }

    /// True when a match against this specification cannot by itself pick
    /// the delivery account.
    pub fn context_ambiguous(&self) -> bool {
        self.context_ambiguous
    }

    pub(crate) fn mark_context_ambiguous(&mut self) {
        self.context_ambiguous = true;
    }

    /// Source line of the `ACCOUNT` keyword.
    pub fn line(&self) -> usize {
        self.line
    }

    pub(crate) fn hits(&self, folded_input: &str) -> Vec<Verified> {
        MatchContext {
            pattern: &self.pattern,
            calc: &self.calc,
            accounts: &self.accounts_folded,
            aliases: &self.aliases_folded,
        }
        .run(folded_input)
    }

    /// Canonical-case accounts this input verifiably resolves to.
    pub fn matching_accounts(&self, folded_input: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for hit in self.hits(folded_input) {
            let account = self.accounts[hit.account].as_str();
            if !out.contains(&account) {
                out.push(account);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calc::RawCalc;

    fn spec(accounts: &[&str], aliases: Aliases, expr: &str) -> Result<AliasSpec, String> {
        let pattern = Pattern::compile(expr, true).unwrap();
        let raw = [RawCalc::Call {
            name: "CHARS".to_string(),
            args: vec![],
        }];
        let has_aliases = matches!(aliases, Aliases::Explicit(_));
        let calc = Calc::compile(&raw, &pattern, CharClass::Ident, has_aliases, true).unwrap();
        AliasSpec::build(
            accounts.iter().map(|a| a.to_string()).collect(),
            aliases,
            CharClass::Ident,
            pattern,
            calc,
            true,
            1,
        )
    }

    #[test]
    fn explicit_aliases_require_single_account() {
        let aliases = Aliases::Explicit(vec!["joe".to_string()]);
        assert!(spec(&["foo", "bar"], aliases, "%alias%-%ident%-%code%").is_err());
        let aliases = Aliases::Explicit(vec!["joe".to_string()]);
        assert!(spec(&["foo"], aliases, "%alias%-%ident%-%code%").is_ok());
    }

    #[test]
    fn multi_account_without_anchor_is_context_ambiguous() {
        let s = spec(&["foo", "bar"], Aliases::Same, "%ident%-%code%").unwrap();
        assert!(s.context_ambiguous());
        let s = spec(&["foo", "bar"], Aliases::Same, "%account%-%ident%-%code%").unwrap();
        assert!(!s.context_ambiguous());
    }

    #[test]
    fn account_case_is_preserved_in_results() {
        let s = spec(&["Foo"], Aliases::Same, "%account%-%ident%-%code%").unwrap();
        assert_eq!(s.matching_accounts("foo-macys-5"), vec!["Foo"]);
    }
}
