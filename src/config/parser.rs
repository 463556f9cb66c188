//! Configuration text parsing and compilation.
//!
//! The format is line-oriented: `ITEM: value` statements are confined to one
//! line, `ACCOUNT … ;` alias specifications may span lines. `#` starts a
//! comment. Compilation is all-or-nothing: any diagnostic prevents the new
//! set from replacing the current one.

use std::collections::HashMap;
use std::path::Path;

use crate::config::schema::{ConfigurationSet, LogLevel, Options};
use crate::core::{AliasSpec, Aliases, Calc, CharClass, Pattern, RawCalc};
use crate::error::{Diagnostic, DiagnosticList};

/// Compile configuration text into an immutable set.
pub fn compile(source: &str) -> Result<ConfigurationSet, DiagnosticList> {
    Compiler::default().run(source)
}

/// Read and compile a configuration file.
pub fn compile_path(path: &Path) -> crate::Result<ConfigurationSet> {
    let source = std::fs::read_to_string(path).map_err(|source| crate::Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(compile(&source)?)
}

/// Leading keywords that commit a line to being a config statement.
const CONFIG_FIRST_WORDS: &[&str] = &[
    "CASE",
    "HOST",
    "PORT",
    "LOGGING",
    "DEBUG",
    "ALIAS",
    "STATISTICS",
    "PROCESSOR",
    "SMTP",
    "LOCAL",
];

const CONFIG_ITEMS: &[&str] = &[
    "CASE SENSITIVE",
    "HOST",
    "PORT",
    "LOGGING",
    "DEBUG ACCOUNT",
    "ALIAS DOMAINS",
    "STATISTICS",
    "PROCESSOR",
    "SMTP HOST",
    "SMTP PORT",
    "LOCAL HOST",
    "LOCAL DOMAINS",
];

/// An unresolved `ACCOUNT` statement, as tokenized.
struct RawSpec {
    line: usize,
    accounts: Vec<String>,
    anchor: Option<(String, usize)>,
    aliased: Option<AliasedClause>,
    expression: (String, usize),
    calcs: Vec<RawCalc>,
}

enum AliasedClause {
    Star,
    Names(Vec<String>),
}

#[derive(Default)]
struct Compiler {
    diags: Vec<Diagnostic>,
    options: Options,
    raw_specs: Vec<RawSpec>,
}

impl Compiler {
    fn run(mut self, source: &str) -> Result<ConfigurationSet, DiagnosticList> {
        let mut pending: Option<SpecBuilder> = None;

        for (idx, raw_line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comment(raw_line);

            if pending.is_none() {
                if line.trim().is_empty() {
                    continue;
                }
                let first = line.split_whitespace().next().unwrap_or("");
                if CONFIG_FIRST_WORDS.contains(&first) {
                    if let Err(d) = self.config_statement(line, line_no) {
                        self.diags.push(d);
                        return Err(DiagnosticList(self.diags));
                    }
                    continue;
                }
            }

            for (col, tok) in tokenize(line) {
                if pending.is_none() {
                    if tok == "ACCOUNT" {
                        pending = Some(SpecBuilder::new(line_no));
                        continue;
                    }
                    self.diags.push(Diagnostic::syntax(
                        line_no,
                        col,
                        format!("unexpected token {tok:?}, expecting a statement"),
                    ));
                    return Err(DiagnosticList(self.diags));
                }
                let fed = match pending.as_mut() {
                    Some(builder) => builder.feed(tok, line_no, col),
                    None => continue,
                };
                match fed {
                    Ok(false) => {}
                    Ok(true) => {
                        if let Some(builder) = pending.take() {
                            match builder.finish() {
                                Ok(spec) => self.raw_specs.push(spec),
                                Err(d) => {
                                    self.diags.push(d);
                                    return Err(DiagnosticList(self.diags));
                                }
                            }
                        }
                    }
                    Err(d) => {
                        self.diags.push(d);
                        return Err(DiagnosticList(self.diags));
                    }
                }
            }
        }

        if let Some(builder) = pending {
            self.diags.push(Diagnostic::syntax(
                builder.line,
                0,
                "unexpected end of file inside an ACCOUNT statement",
            ));
            return Err(DiagnosticList(self.diags));
        }

        let specs = self.compile_specs();
        if self.diags.is_empty() {
            Ok(ConfigurationSet {
                options: self.options,
                specs,
            })
        } else {
            Err(DiagnosticList(self.diags))
        }
    }

    /// Parse one `ITEM: value` line.
    fn config_statement(&mut self, line: &str, line_no: usize) -> Result<(), Diagnostic> {
        let colon = line.find(':').ok_or_else(|| {
            Diagnostic::syntax(line_no, 0, "expected ':' in configuration statement")
        })?;
        let head_raw = &line[..colon];
        let head = head_raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let value = line[colon + 1..].trim();
        let value_col = colon + 2;

        if !CONFIG_ITEMS.contains(&head.as_str()) {
            return Err(Diagnostic::syntax(
                line_no,
                1,
                format!("unrecognized configuration item {head:?}"),
            ));
        }

        let invalid = |why: String| Diagnostic::syntax(line_no, value_col, why);
        match head.as_str() {
            "CASE SENSITIVE" => {
                self.options.case_sensitive = match value.to_ascii_lowercase().as_str() {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => return Err(invalid(format!("not a recognized boolean value: {value:?}"))),
                };
            }
            "HOST" => {
                self.options.host = value
                    .parse()
                    .map_err(|_| invalid(format!("not a valid address: {value:?}")))?;
            }
            "PORT" => {
                self.options.port = value
                    .parse()
                    .map_err(|_| invalid(format!("not valid for a port number: {value:?}")))?;
            }
            "LOGGING" => {
                self.options.log_level = LogLevel::parse(value)
                    .ok_or_else(|| invalid(format!("not a valid logging level: {value:?}")))?;
            }
            "DEBUG ACCOUNT" => {
                if value.is_empty() || value.contains(['@', ' ']) {
                    return Err(invalid(format!("not a valid account: {value:?}")));
                }
                self.options.debug_account = Some(value.to_string());
            }
            "ALIAS DOMAINS" => {
                self.options.alias_domains = value
                    .split_whitespace()
                    .map(|d| d.to_ascii_lowercase())
                    .collect();
            }
            "STATISTICS" => {
                let seconds: u64 = value
                    .parse()
                    .map_err(|_| invalid(format!("not a valid report interval: {value:?}")))?;
                self.options.statistics = (seconds > 0).then(|| std::time::Duration::from_secs(seconds));
            }
            "PROCESSOR" => {
                if !valid_name(value) {
                    return Err(invalid(format!("not a valid processor name: {value:?}")));
                }
                self.options.processor = Some(value.to_string());
            }
            // Milter-only items: accepted so shared config files load, unused here.
            "SMTP HOST" | "SMTP PORT" | "LOCAL HOST" | "LOCAL DOMAINS" => {
                tracing::debug!(item = head.as_str(), "ignoring milter-only configuration item");
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Resolve the raw specifications against the now-known options and run
    /// every cross-specification check. Semantic diagnostics accumulate.
    fn compile_specs(&mut self) -> Vec<AliasSpec> {
        let fold = !self.options.case_sensitive;
        let mut specs: Vec<AliasSpec> = Vec::new();

        for raw in std::mem::take(&mut self.raw_specs) {
            let mut bad = false;

            for name in &raw.accounts {
                if !valid_name(name) {
                    self.diags
                        .push(Diagnostic::semantic(raw.line, format!("invalid account name {name:?}")));
                    bad = true;
                }
            }
            let aliases = match &raw.aliased {
                None | Some(AliasedClause::Star) => Aliases::Same,
                Some(AliasedClause::Names(names)) => {
                    for name in names {
                        if !valid_name(name) {
                            self.diags.push(Diagnostic::semantic(
                                raw.line,
                                format!("invalid alias name {name:?}"),
                            ));
                            bad = true;
                        }
                    }
                    Aliases::Explicit(names.clone())
                }
            };

            let anchor_class = match &raw.anchor {
                None => CharClass::Ident,
                Some((name, line)) => match CharClass::parse(name) {
                    Some(class) => class,
                    None => {
                        self.diags.push(Diagnostic::semantic(
                            *line,
                            format!("unrecognized identifier matcher {name:?}"),
                        ));
                        bad = true;
                        CharClass::Ident
                    }
                },
            };

            let (expr, expr_line) = &raw.expression;
            let pattern = match Pattern::compile(expr, fold) {
                Ok(pattern) => pattern,
                Err(why) => {
                    self.diags.push(Diagnostic::semantic(*expr_line, why));
                    continue;
                }
            };
            let has_aliases = matches!(aliases, Aliases::Explicit(_));
            let calc = match Calc::compile(&raw.calcs, &pattern, anchor_class, has_aliases, fold) {
                Ok(calc) => calc,
                Err(why) => {
                    self.diags.push(Diagnostic::semantic(raw.line, why));
                    continue;
                }
            };
            if bad {
                continue;
            }
            match AliasSpec::build(
                raw.accounts,
                aliases,
                anchor_class,
                pattern,
                calc,
                fold,
                raw.line,
            ) {
                Ok(spec) => specs.push(spec),
                Err(why) => self.diags.push(Diagnostic::semantic(raw.line, why)),
            }
        }

        self.cross_checks(&mut specs);
        specs
    }

    fn cross_checks(&mut self, specs: &mut [AliasSpec]) {
        let fold_key = |name: &str, fold: bool| {
            if fold { name.to_ascii_lowercase() } else { name.to_string() }
        };
        let fold = !self.options.case_sensitive;

        // Invariant: an account (and an explicit alias) belongs to at most
        // one specification.
        let mut seen_accounts: HashMap<String, usize> = HashMap::new();
        let mut seen_aliases: HashMap<String, usize> = HashMap::new();
        for spec in specs.iter() {
            for account in spec.accounts() {
                let key = fold_key(account, fold);
                if let Some(first) = seen_accounts.insert(key, spec.line()) {
                    self.diags.push(Diagnostic::semantic(
                        spec.line(),
                        format!("account {account:?} already declared on line {first}"),
                    ));
                }
            }
            if let Aliases::Explicit(names) = spec.aliases() {
                for alias in names {
                    let key = fold_key(alias, fold);
                    if let Some(first) = seen_aliases.insert(key, spec.line()) {
                        self.diags.push(Diagnostic::semantic(
                            spec.line(),
                            format!("alias {alias:?} already declared on line {first}"),
                        ));
                    }
                }
            }
        }

        // Identical patterns without an account/alias anchor cannot pick a
        // specification apart; tag them so operators know the debug-account
        // policy decides.
        let mut by_fingerprint: HashMap<String, usize> = HashMap::new();
        for spec in specs.iter() {
            *by_fingerprint.entry(spec.pattern().fingerprint()).or_insert(0) += 1;
        }
        for spec in specs.iter_mut() {
            let shared = by_fingerprint[&spec.pattern().fingerprint()] > 1;
            if shared && !spec.pattern().has_account() && !spec.pattern().has_alias() {
                spec.mark_context_ambiguous();
            }
            if spec.context_ambiguous() {
                tracing::warn!(
                    line = spec.line(),
                    pattern = spec.pattern().source(),
                    "specification is context-ambiguous"
                );
            }
        }
    }
}

/// `ACCOUNT` statement state machine, fed one token at a time.
struct SpecBuilder {
    line: usize,
    state: SpecState,
    accounts: Vec<String>,
    trailing_comma: bool,
    anchor: Option<(String, usize)>,
    aliased: Option<AliasedClause>,
    expression: Option<(String, usize)>,
    calcs: Vec<RawCalc>,
    awaiting_separator: bool,
}

enum SpecState {
    Accounts,
    UsingClass,
    PostUsing,
    AliasList,
    MatchExpr,
    ExpectWith,
    Calcs,
}

impl SpecBuilder {
    fn new(line: usize) -> SpecBuilder {
        SpecBuilder {
            line,
            state: SpecState::Accounts,
            accounts: Vec::new(),
            trailing_comma: false,
            anchor: None,
            aliased: None,
            expression: None,
            calcs: Vec::new(),
            awaiting_separator: false,
        }
    }

    /// Returns `Ok(true)` when the terminating `;` has been consumed.
    fn feed(&mut self, tok: &str, line: usize, col: usize) -> Result<bool, Diagnostic> {
        let err = |msg: String| Diagnostic::syntax(line, col, msg);
        match self.state {
            SpecState::Accounts => match tok {
                "USING" | "ALIASED" | "MATCHES" if !self.trailing_comma && !self.accounts.is_empty() => {
                    self.state = match tok {
                        "USING" => SpecState::UsingClass,
                        "ALIASED" => SpecState::AliasList,
                        _ => SpecState::MatchExpr,
                    };
                    Ok(false)
                }
                _ => {
                    push_names(&mut self.accounts, &mut self.trailing_comma, tok)
                        .map_err(err)?;
                    Ok(false)
                }
            },
            SpecState::UsingClass => {
                self.anchor = Some((tok.to_string(), line));
                self.state = SpecState::PostUsing;
                Ok(false)
            }
            SpecState::PostUsing => match tok {
                "ALIASED" => {
                    self.state = SpecState::AliasList;
                    Ok(false)
                }
                "MATCHES" => {
                    self.state = SpecState::MatchExpr;
                    Ok(false)
                }
                _ => Err(err(format!(
                    "unrecognized keyword {tok:?}, expecting ALIASED or MATCHES"
                ))),
            },
            SpecState::AliasList => match tok {
                "MATCHES" if !self.trailing_comma && self.aliased.is_some() => {
                    self.state = SpecState::MatchExpr;
                    Ok(false)
                }
                "*" if self.aliased.is_none() => {
                    self.aliased = Some(AliasedClause::Star);
                    Ok(false)
                }
                _ => {
                    if matches!(self.aliased, Some(AliasedClause::Star)) {
                        return Err(err("\"*\" must be the entire ALIASED clause".to_string()));
                    }
                    if self.aliased.is_none() {
                        self.aliased = Some(AliasedClause::Names(Vec::new()));
                    }
                    let Some(AliasedClause::Names(names)) = self.aliased.as_mut() else {
                        return Err(err("malformed ALIASED clause".to_string()));
                    };
                    push_names(names, &mut self.trailing_comma, tok).map_err(err)?;
                    Ok(false)
                }
            },
            SpecState::MatchExpr => {
                let expr = match tok.strip_prefix('"') {
                    Some(inner) => inner
                        .strip_suffix('"')
                        .ok_or_else(|| err("unterminated quoted match expression".to_string()))?,
                    None => tok,
                };
                if expr.is_empty() {
                    return Err(err("empty match expression".to_string()));
                }
                self.expression = Some((expr.to_string(), line));
                self.state = SpecState::ExpectWith;
                Ok(false)
            }
            SpecState::ExpectWith => {
                if tok == "WITH" {
                    self.state = SpecState::Calcs;
                    Ok(false)
                } else {
                    Err(err(format!("unrecognized keyword {tok:?}, expecting WITH")))
                }
            }
            SpecState::Calcs => self.feed_calc(tok, line, col),
        }
    }

    fn feed_calc(&mut self, tok: &str, line: usize, col: usize) -> Result<bool, Diagnostic> {
        let err = |msg: String| Diagnostic::syntax(line, col, msg);

        if self.awaiting_separator {
            self.awaiting_separator = false;
            return match tok {
                "," => Ok(false),
                ";" => Ok(true),
                _ => Err(err(format!("expected ',' or ';' after a calc op, found {tok:?}"))),
            };
        }

        let (op, tail) = if let Some(inner) = tok.strip_prefix('"') {
            let end = inner
                .find('"')
                .ok_or_else(|| err("unterminated literal in calculation".to_string()))?;
            (RawCalc::Literal(inner[..end].to_string()), &inner[end + 1..])
        } else {
            let open = tok
                .find('(')
                .ok_or_else(|| err(format!("expected a calc function call, found {tok:?}")))?;
            let close = tok
                .rfind(')')
                .ok_or_else(|| err(format!("missing ')' in calc op {tok:?}")))?;
            if close < open {
                return Err(err(format!("malformed calc op {tok:?}")));
            }
            let name = &tok[..open];
            let inside = &tok[open + 1..close];
            let args = if inside.is_empty() {
                Vec::new()
            } else {
                inside.split(',').map(str::to_string).collect()
            };
            if name.is_empty() {
                return Err(err(format!("missing function name in calc op {tok:?}")));
            }
            (
                RawCalc::Call {
                    name: name.to_string(),
                    args,
                },
                &tok[close + 1..],
            )
        };
        self.calcs.push(op);

        match tail {
            "" => {
                self.awaiting_separator = true;
                Ok(false)
            }
            "," => Ok(false),
            ";" => Ok(true),
            _ => Err(err(format!("unexpected trailing {tail:?} after calc op"))),
        }
    }

    fn finish(self) -> Result<RawSpec, Diagnostic> {
        let expression = self
            .expression
            .ok_or_else(|| Diagnostic::syntax(self.line, 0, "ACCOUNT statement has no MATCHES"))?;
        Ok(RawSpec {
            line: self.line,
            accounts: self.accounts,
            anchor: self.anchor,
            aliased: self.aliased,
            expression,
            calcs: self.calcs,
        })
    }
}

/// Accumulate comma-separated names across whitespace tokens:
/// `a,b`, `a,` + `b` and `a` + `,b` all read the same.
fn push_names(list: &mut Vec<String>, trailing: &mut bool, tok: &str) -> Result<(), String> {
    let continuing = tok.starts_with(',');
    if !list.is_empty() && !*trailing && !continuing {
        return Err(format!(
            "unexpected token {tok:?}, expecting ',' or a keyword"
        ));
    }
    *trailing = false;
    let parts: Vec<&str> = tok.split(',').collect();
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            if i == last {
                *trailing = true;
            } else if i > 0 {
                return Err("empty name in list".to_string());
            }
            continue;
        }
        list.push(part.to_string());
    }
    Ok(())
}

fn valid_name(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(at) => &line[..at],
        None => line,
    }
}

/// Whitespace-separated tokens with their 1-based columns.
fn tokenize(line: &str) -> Vec<(usize, &str)> {
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if start < i {
            out.push((start + 1, &line[start..i]));
        }
    }
    out
}
