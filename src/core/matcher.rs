//! Decomposition enumeration.
//!
//! Variable-width fields separated by fixed literals admit more than one
//! split of the same input (`%ident%-%code%` can place a `-` inside either
//! capture). The matcher therefore enumerates every decomposition whose
//! literals anchor exactly and whose captures satisfy their classes, and
//! lets the code verification collapse the candidates. `%account%` and
//! `%alias%` are never free fields: they are expanded to the declared names
//! before enumeration.

use crate::core::calc::{Calc, Captures, CodeAlphabet};
use crate::core::chars::CharClass;
use crate::core::pattern::{FieldKind, Pattern, PatternElement};

/// One verified decomposition: the account to deliver to, the alias form
/// that matched, and the code as it appeared in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    /// Index into the specification's declared accounts.
    pub account: usize,
    pub alias: String,
    pub code: String,
}

/// Pattern elements with anchors substituted for one (account, alias) pair.
#[derive(Debug, Clone)]
enum Concrete {
    Literal(String),
    Field(CharClass),
    Code,
}

/// A capture produced during enumeration: either an identifier field value
/// or the code region.
#[derive(Debug, Clone, Copy)]
enum Capture<'a> {
    Field(CharClass, &'a str),
    Code(&'a str),
}

pub(crate) struct MatchContext<'a> {
    pub pattern: &'a Pattern,
    pub calc: &'a Calc,
    /// Folded account names, parallel to the declared list.
    pub accounts: &'a [String],
    /// Folded alias names; empty means `%alias%` stands for the account.
    pub aliases: &'a [String],
}

impl<'a> MatchContext<'a> {
    /// Enumerate every (account, alias) substitution and collect the
    /// decompositions whose computed code equals the captured code.
    pub fn run(&self, input: &str) -> Vec<Verified> {
        let alphabet = self.calc.code_alphabet();
        let min_code = self.calc.min_len();
        let mut verified: Vec<Verified> = Vec::new();

        for (account_idx, account) in self.accounts.iter().enumerate() {
            let aliases: &[String] = if self.aliases.is_empty() {
                std::slice::from_ref(account)
            } else {
                self.aliases
            };
            for alias in aliases {
                let concrete = self.substitute(account, alias);
                let mut captures = Vec::new();
                let mut hits = Vec::new();
                enumerate(&concrete, input, &mut captures, &mut hits, &alphabet, min_code);
                for decomposition in hits {
                    let mut fields = Vec::new();
                    let mut code = "";
                    for capture in decomposition {
                        match capture {
                            Capture::Field(class, value) => fields.push((class, value)),
                            Capture::Code(value) => code = value,
                        }
                    }
                    let caps = Captures {
                        fields: &fields,
                        account,
                        alias,
                    };
                    if self.calc.expected_code(&caps).as_deref() == Some(code) {
                        let hit = Verified {
                            account: account_idx,
                            alias: alias.clone(),
                            code: code.to_string(),
                        };
                        if !verified.contains(&hit) {
                            verified.push(hit);
                        }
                    }
                }
            }
        }
        verified
    }

    /// Replace `%account%`/`%alias%` with concrete names, merging the result
    /// into the neighboring literals so every anchor is a single run.
    fn substitute(&self, account: &str, alias: &str) -> Vec<Concrete> {
        let mut out: Vec<Concrete> = Vec::new();
        let mut run = String::new();
        let mut flush = |out: &mut Vec<Concrete>, run: &mut String| {
            if !run.is_empty() {
                out.push(Concrete::Literal(std::mem::take(run)));
            }
        };
        for element in self.pattern.elements() {
            match element {
                PatternElement::Literal(text) => run.push_str(text),
                PatternElement::Field(FieldKind::Account) => run.push_str(account),
                PatternElement::Field(FieldKind::Alias) => run.push_str(alias),
                PatternElement::Field(FieldKind::Code) => {
                    flush(&mut out, &mut run);
                    out.push(Concrete::Code);
                }
                PatternElement::Field(FieldKind::Ident { class, .. }) => {
                    flush(&mut out, &mut run);
                    out.push(Concrete::Field(*class));
                }
            }
        }
        flush(&mut out, &mut run);
        out
    }
}

/// Depth-first walk over the element list, trying every capture length.
fn enumerate<'a>(
    elements: &[Concrete],
    input: &'a str,
    captures: &mut Vec<Capture<'a>>,
    hits: &mut Vec<Vec<Capture<'a>>>,
    alphabet: &CodeAlphabet,
    min_code: usize,
) {
    let Some((element, rest)) = elements.split_first() else {
        if input.is_empty() {
            hits.push(captures.clone());
        }
        return;
    };

    if let Concrete::Literal(text) = element {
        if let Some(remaining) = input.strip_prefix(text.as_str()) {
            enumerate(rest, remaining, captures, hits, alphabet, min_code);
        }
        return;
    }

    for end in 1..=input.len() {
        if !input.is_char_boundary(end) {
            continue;
        }
        let candidate = &input[..end];
        let capture = match element {
            Concrete::Field(class) => {
                if !class.accepts(candidate) {
                    continue;
                }
                Capture::Field(*class, candidate)
            }
            Concrete::Code => {
                if end < min_code || !candidate.bytes().all(|b| alphabet.contains(b)) {
                    continue;
                }
                Capture::Code(candidate)
            }
            Concrete::Literal(_) => unreachable!(),
        };
        captures.push(capture);
        enumerate(rest, &input[end..], captures, hits, alphabet, min_code);
        captures.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calc::RawCalc;

    fn context(
        expr: &str,
        calcs: &[(&str, &[&str])],
        accounts: &[&str],
        aliases: &[&str],
    ) -> (Pattern, Calc, Vec<String>, Vec<String>) {
        let pattern = Pattern::compile(expr, true).unwrap();
        let raw: Vec<RawCalc> = calcs
            .iter()
            .map(|(name, args)| RawCalc::Call {
                name: name.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            })
            .collect();
        let calc = Calc::compile(&raw, &pattern, CharClass::Ident, !aliases.is_empty(), true)
            .unwrap();
        (
            pattern,
            calc,
            accounts.iter().map(|a| a.to_string()).collect(),
            aliases.iter().map(|a| a.to_string()).collect(),
        )
    }

    fn run(
        parts: &(Pattern, Calc, Vec<String>, Vec<String>),
        input: &str,
    ) -> Vec<Verified> {
        MatchContext {
            pattern: &parts.0,
            calc: &parts.1,
            accounts: &parts.2,
            aliases: &parts.3,
        }
        .run(input)
    }

    #[test]
    fn verifies_and_rejects_codes() {
        let parts = context(
            "%account%-%ident%-%code%",
            &[("CHAR", &["1", "-"]), ("CHARS", &[])],
            &["foo"],
            &[],
        );
        let hits = run(&parts, "foo-macys-m5");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].account, 0);
        assert_eq!(hits[0].code, "m5");
        assert!(run(&parts, "foo-macys-m6").is_empty());
        assert!(run(&parts, "bar-macys-m5").is_empty());
    }

    #[test]
    fn dash_inside_the_identifier_capture() {
        // "foo-ab-cd-a5": the ident can be "ab-cd" (code "a5") or "ab"
        // (code "cd-a5"); only the former verifies.
        let parts = context(
            "%account%-%ident%-%code%",
            &[("CHAR", &["1", "-"]), ("CHARS", &[])],
            &["foo"],
            &[],
        );
        let hits = run(&parts, "foo-ab-cd-a5");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code, "a5");
    }

    #[test]
    fn alias_substitution_resolves_to_account() {
        let parts = context(
            "%alias%-%ident%-%code%",
            &[("CHAR", &["1", "-"]), ("CHARS", &[])],
            &["foo"],
            &["joe", "paul"],
        );
        let hits = run(&parts, "joe-google-g6");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].account, 0);
        assert_eq!(hits[0].alias, "joe");
        assert!(run(&parts, "foo-google-g6").is_empty());
    }

    #[test]
    fn ambiguous_decompositions_collapse_when_codes_agree() {
        // %ident%x%ident% against "axaxa..." admits several splits; they all
        // resolve to the same account so one hit per verifying code remains.
        let parts = context(
            "%ident%x%ident%.%code%",
            &[("CHARS", &["1"]), ("CHARS", &["2"])],
            &["baz"],
            &[],
        );
        let hits = run(&parts, "axaxa.13");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code, "13");
    }

    #[test]
    fn alpha_number_adjacency_splits_uniquely() {
        let parts = context(
            "%alpha%%number%-%code%",
            &[("CHARS", &["1"]), ("CHARS", &["2"])],
            &["foo"],
            &[],
        );
        let hits = run(&parts, "ab123-23");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_captures_are_invalid() {
        let parts = context(
            "%account%-%ident%-%code%",
            &[("CHAR", &["1", "-"]), ("CHARS", &[])],
            &["foo"],
            &[],
        );
        assert!(run(&parts, "foo--m0").is_empty());
    }

    #[test]
    fn literal_prefix_must_anchor() {
        let parts = context(
            "%account%-%ident%-%code%",
            &[("CHAR", &["1", "-"]), ("CHARS", &[])],
            &["foo"],
            &[],
        );
        assert!(run(&parts, "xfoo-macys-m5").is_empty());
        assert!(run(&parts, "foo-macys-m5x").is_empty());
    }
}
