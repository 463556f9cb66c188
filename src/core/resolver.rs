//! Address resolution.
//!
//! `resolve` is pure given a configuration snapshot and an input string: it
//! performs no I/O and is safe to call from any number of worker threads.

use std::collections::BTreeSet;

use crate::config::ConfigurationSet;

/// Which lookup form the embedding service speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Bare local part in, bare account out (aliases(5) style).
    Account,
    /// `local@domain` in, `account@domain` out (virtual(5) style).
    Virtual,
}

/// Outcome of one lookup. Never an error: unmatched input is a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Match {
        /// The delivery account, canonical case.
        account: String,
        /// The string to send back to the client.
        reply: String,
    },
    NotFound,
    /// Several accounts verified; routed to the configured debug account.
    Debug { reply: String },
}

impl Resolved {
    /// The reply string, when there is one.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Resolved::Match { reply, .. } | Resolved::Debug { reply } => Some(reply),
            Resolved::NotFound => None,
        }
    }
}

pub fn resolve(set: &ConfigurationSet, mode: Mode, raw: &str) -> Resolved {
    let options = &set.options;
    match mode {
        Mode::Account => {
            let local = fold(raw, options.case_sensitive);
            finish(set, &local, None)
        }
        Mode::Virtual => {
            let parts: Vec<&str> = raw.split('@').collect();
            if parts.len() != 2 {
                return Resolved::NotFound;
            }
            let (local, domain) = (parts[0], parts[1]);
            if !options.alias_domains.contains(&domain.to_ascii_lowercase()) {
                return Resolved::NotFound;
            }
            let local = fold(local, options.case_sensitive);
            finish(set, &local, Some(domain))
        }
    }
}

fn fold(s: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        s.to_string()
    } else {
        s.to_ascii_lowercase()
    }
}

/// Collect the winning accounts across all specifications and apply the
/// disambiguation policy. `domain` is the domain as given, for virtual-form
/// replies.
fn finish(set: &ConfigurationSet, local: &str, domain: Option<&str>) -> Resolved {
    let mut winning: BTreeSet<&str> = BTreeSet::new();
    for spec in &set.specs {
        winning.extend(spec.matching_accounts(local));
    }

    let reply_for = |account: &str| match domain {
        Some(domain) => format!("{account}@{domain}"),
        None => account.to_string(),
    };

    let mut accounts = winning.into_iter();
    match (accounts.next(), accounts.next()) {
        (None, _) => Resolved::NotFound,
        (Some(account), None) => Resolved::Match {
            account: account.to_string(),
            reply: reply_for(account),
        },
        (Some(_), Some(_)) => match &set.options.debug_account {
            Some(debug_acct) => {
                tracing::info!(input = local, debug_account = %debug_acct, "ambiguous, routed to debug account");
                Resolved::Debug {
                    reply: reply_for(debug_acct),
                }
            }
            None => {
                tracing::info!(input = local, "ambiguous and no debug account, not found");
                Resolved::NotFound
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::compile;

    #[test]
    fn virtual_mode_gates_on_domain() {
        let set = compile(
            "ALIAS DOMAINS: example.com\n\
             ACCOUNT foo MATCHES %account%-%ident%-%code% WITH CHAR(1,-), CHARS();\n",
        )
        .unwrap();
        assert_eq!(
            resolve(&set, Mode::Virtual, "foo-macys-m5@example.com"),
            Resolved::Match {
                account: "foo".to_string(),
                reply: "foo@example.com".to_string(),
            }
        );
        assert_eq!(
            resolve(&set, Mode::Virtual, "foo-macys-m5@elsewhere.com"),
            Resolved::NotFound
        );
        assert_eq!(resolve(&set, Mode::Virtual, "foo-macys-m5"), Resolved::NotFound);
        assert_eq!(
            resolve(&set, Mode::Virtual, "foo@macys@example.com"),
            Resolved::NotFound
        );
    }

    #[test]
    fn virtual_reply_keeps_the_domain_as_given() {
        let set = compile(
            "ALIAS DOMAINS: example.com\n\
             ACCOUNT foo MATCHES %account%-%ident%-%code% WITH CHAR(1,-), CHARS();\n",
        )
        .unwrap();
        let resolved = resolve(&set, Mode::Virtual, "foo-macys-m5@Example.COM");
        assert_eq!(resolved.reply(), Some("foo@Example.COM"));
    }

    // "foo-3" verifies against both specifications below: spec one as
    // account "foo" (code = CHARS(account) = 3), spec two as account "bar"
    // (ident "foo", code = CHARS() = 3).
    const AMBIGUOUS: &str = "ACCOUNT foo MATCHES %account%-%code% WITH CHARS(account);\n\
         ACCOUNT bar MATCHES %ident%-%code% WITH CHARS();\n";

    #[test]
    fn ambiguity_routes_to_debug_account() {
        let set = compile(&format!("DEBUG ACCOUNT: postmaster\n{AMBIGUOUS}")).unwrap();
        assert_eq!(
            resolve(&set, Mode::Account, "foo-3"),
            Resolved::Debug {
                reply: "postmaster".to_string(),
            }
        );
        // Unambiguous inputs still resolve normally.
        assert_eq!(
            resolve(&set, Mode::Account, "quux-4"),
            Resolved::Match {
                account: "bar".to_string(),
                reply: "bar".to_string(),
            }
        );
    }

    #[test]
    fn ambiguity_without_debug_account_is_not_found() {
        let set = compile(AMBIGUOUS).unwrap();
        assert_eq!(resolve(&set, Mode::Account, "foo-3"), Resolved::NotFound);
    }

    #[test]
    fn case_insensitive_by_default() {
        let set = compile(
            "ACCOUNT foo MATCHES %account%-%ident%-%code% WITH CHAR(1,-), CHARS();\n",
        )
        .unwrap();
        assert_eq!(
            resolve(&set, Mode::Account, "FOO-MACYS-M5"),
            resolve(&set, Mode::Account, "foo-macys-m5"),
        );
        assert!(matches!(
            resolve(&set, Mode::Account, "FOO-MACYS-M5"),
            Resolved::Match { .. }
        ));
    }
}
