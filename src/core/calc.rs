//! Calculation expressions.
//!
//! A calculation is the ordered list of operations that recompute the code
//! embedded in an alias. Compilation resolves every reference (subscripts,
//! label selectors, CHAR argument shapes) against the pattern so evaluation
//! is a closed match over tagged variants.

use crate::core::chars::{CharClass, is_vowel};
use crate::core::pattern::Pattern;

/// Which capture an operation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// 1-based ordinal among the pattern's identifier fields.
    Ordinal(usize),
    Account,
    Alias,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Digits,
    Alphas,
    Chars,
    Vowels,
    Labels,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalcOp {
    /// Emitted verbatim.
    Literal(String),
    Count {
        kind: CountKind,
        target: Target,
    },
    /// The lexicographically smallest byte occurring in the capture.
    Any {
        target: Target,
    },
    /// The smallest alnum byte absent from the capture.
    NoneOf {
        target: Target,
    },
    CharAt {
        target: Target,
        /// 1-based label selector for fqdn targets; negative counts from the end.
        label: Option<i32>,
        /// 1-based character position; negative counts from the end.
        index: i32,
        /// Emitted when `index` (or `label`) is out of range.
        default: u8,
    },
}

/// A calc op as tokenized by the configuration parser, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawCalc {
    Literal(String),
    Call { name: String, args: Vec<String> },
}

/// Captured values for one candidate decomposition.
pub struct Captures<'a> {
    /// Identifier captures in ordinal order.
    pub fields: &'a [(CharClass, &'a str)],
    pub account: &'a str,
    pub alias: &'a str,
}

/// Conservative set of bytes the code region of an address may contain.
#[derive(Debug, Clone)]
pub struct CodeAlphabet([bool; 256]);

impl CodeAlphabet {
    pub fn contains(&self, b: u8) -> bool {
        self.0[b as usize]
    }
}

/// Byte order used by `NONE()` when picking a character guaranteed absent
/// from the capture. Digits sort before letters, matching ASCII.
const NONE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone)]
pub struct Calc {
    ops: Vec<CalcOp>,
}

impl Calc {
    /// Resolve raw ops against `pattern`. `anchor_class` is the `USING`
    /// class (constrains label use on `account`/`alias` references),
    /// `has_aliases` gates `alias` references, `fold` lower-cases literals
    /// and CHAR defaults.
    pub fn compile(
        raw: &[RawCalc],
        pattern: &Pattern,
        anchor_class: CharClass,
        has_aliases: bool,
        fold: bool,
    ) -> Result<Calc, String> {
        if raw.is_empty() {
            return Err("empty calculation".to_string());
        }
        let mut ops = Vec::with_capacity(raw.len());
        for item in raw {
            ops.push(match item {
                RawCalc::Literal(text) => {
                    if text.is_empty() {
                        return Err("empty literal in calculation".to_string());
                    }
                    let text = if fold { text.to_ascii_lowercase() } else { text.clone() };
                    CalcOp::Literal(text)
                }
                RawCalc::Call { name, args } => {
                    compile_call(name, args, pattern, anchor_class, has_aliases, fold)?
                }
            });
        }
        Ok(Calc { ops })
    }

    pub fn ops(&self) -> &[CalcOp] {
        &self.ops
    }

    /// Every op emits at least one byte; literals emit their full length.
    pub fn min_len(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                CalcOp::Literal(text) => text.len(),
                _ => 1,
            })
            .sum()
    }

    /// Bytes a code capture may consist of: alphanumerics, the punctuation
    /// identifier classes can surface through `ANY`, CHAR defaults, and
    /// literal bytes.
    pub fn code_alphabet(&self) -> CodeAlphabet {
        let mut set = [false; 256];
        for b in 0..=255u8 {
            if b.is_ascii_alphanumeric() {
                set[b as usize] = true;
            }
        }
        for b in [b'-', b'_', b'.'] {
            set[b as usize] = true;
        }
        for op in &self.ops {
            match op {
                CalcOp::Literal(text) => {
                    for b in text.bytes() {
                        set[b as usize] = true;
                    }
                }
                CalcOp::CharAt { default, .. } => set[*default as usize] = true,
                _ => {}
            }
        }
        CodeAlphabet(set)
    }

    /// Compute the expected code for one decomposition, or `None` when an
    /// operation cannot produce a value (which fails the candidate).
    pub fn expected_code(&self, caps: &Captures<'_>) -> Option<String> {
        let mut out = String::new();
        for op in &self.ops {
            match op {
                CalcOp::Literal(text) => out.push_str(text),
                CalcOp::Count { kind, target } => {
                    let value = resolve(caps, *target);
                    let n = match kind {
                        CountKind::Digits => value.bytes().filter(u8::is_ascii_digit).count(),
                        CountKind::Alphas => {
                            value.bytes().filter(u8::is_ascii_alphabetic).count()
                        }
                        CountKind::Chars => value.len(),
                        CountKind::Vowels => value.bytes().filter(|&b| is_vowel(b)).count(),
                        CountKind::Labels => value.split('.').count(),
                    };
                    out.push_str(&n.to_string());
                }
                CalcOp::Any { target } => {
                    let b = resolve(caps, *target).bytes().min()?;
                    out.push(b as char);
                }
                CalcOp::NoneOf { target } => {
                    let value = resolve(caps, *target);
                    let b = NONE_ALPHABET
                        .iter()
                        .copied()
                        .find(|&b| !value.bytes().any(|v| v == b))?;
                    out.push(b as char);
                }
                CalcOp::CharAt {
                    target,
                    label,
                    index,
                    default,
                } => {
                    let value = resolve(caps, *target);
                    let value = match label {
                        None => value,
                        Some(l) => {
                            let labels: Vec<&str> = value.split('.').collect();
                            match pick(labels.len(), *l) {
                                Some(i) => labels[i],
                                None => {
                                    out.push(*default as char);
                                    continue;
                                }
                            }
                        }
                    };
                    match pick(value.len(), *index) {
                        Some(i) => out.push(value.as_bytes()[i] as char),
                        None => out.push(*default as char),
                    }
                }
            }
        }
        Some(out)
    }
}

fn resolve<'a>(caps: &Captures<'a>, target: Target) -> &'a str {
    match target {
        Target::Ordinal(n) => caps.fields[n - 1].1,
        Target::Account => caps.account,
        Target::Alias => caps.alias,
    }
}

/// Map a 1-based, possibly negative position onto `0..len`.
fn pick(len: usize, position: i32) -> Option<usize> {
    if position == 0 || position.unsigned_abs() as usize > len {
        return None;
    }
    if position > 0 {
        Some(position as usize - 1)
    } else {
        Some(len - position.unsigned_abs() as usize)
    }
}

fn compile_call(
    name: &str,
    args: &[String],
    pattern: &Pattern,
    anchor_class: CharClass,
    has_aliases: bool,
    fold: bool,
) -> Result<CalcOp, String> {
    let n_fields = pattern.fields().len();

    let parse_target = |arg: &str| -> Result<(Target, Option<CharClass>), String> {
        match arg.to_ascii_lowercase().as_str() {
            "account" => Ok((Target::Account, Some(anchor_class))),
            "alias" => {
                if !has_aliases {
                    return Err(format!("\"alias\" referenced in {name}() but no aliases declared"));
                }
                Ok((Target::Alias, Some(anchor_class)))
            }
            "*" => Err(format!("\"*\" is not a valid subscript in {name}()")),
            _ => {
                let ordinal: usize = arg
                    .parse()
                    .map_err(|_| format!("{name}() subscript {arg:?} is not an identifier reference"))?;
                let class = pattern
                    .field_class(ordinal)
                    .ok_or_else(|| format!("{name}() index must be between 1 and {n_fields}"))?;
                Ok((Target::Ordinal(ordinal), Some(class)))
            }
        }
    };

    let parse_number = |arg: &str, what: &str| -> Result<i32, String> {
        if arg == "*" {
            return Err(format!("\"*\" is not a valid {what} in {name}()"));
        }
        let value: i32 = arg
            .parse()
            .map_err(|_| format!("{name}() has an invalid {what} {arg:?}"))?;
        if value == 0 {
            return Err(format!("{name}() {what} is 1-based and must not be zero"));
        }
        Ok(value)
    };

    let parse_default = |arg: &str| -> Result<u8, String> {
        // "*" shows up in the wild as an undocumented label selector; there
        // is no defined semantics for it, so refuse it outright.
        if arg == "*" {
            return Err(format!("\"*\" is not a supported argument to {name}()"));
        }
        if arg.len() != 1 || !arg.is_ascii() {
            return Err(format!("{name}() default must be a single character, got {arg:?}"));
        }
        let b = arg.as_bytes()[0];
        Ok(if fold { b.to_ascii_lowercase() } else { b })
    };

    if name == "CHAR" {
        if args.len() > 4 {
            return Err("CHAR() requires at most 4 arguments".to_string());
        }
        if args.len() < 2 {
            return Err("CHAR() requires at least 2 arguments".to_string());
        }
        return match args.len() {
            4 => {
                let (target, class) = parse_target(&args[0])?;
                if !matches!(target, Target::Ordinal(_)) || class != Some(CharClass::Fqdn) {
                    return Err(format!(
                        "CHAR() index {:?} does not reference an fqdn field",
                        args[0]
                    ));
                }
                Ok(CalcOp::CharAt {
                    target,
                    label: Some(parse_number(&args[1], "label index")?),
                    index: parse_number(&args[2], "character index")?,
                    default: parse_default(&args[3])?,
                })
            }
            3 if n_fields == 1 && pattern.field_class(1) == Some(CharClass::Fqdn) => {
                // Single fqdn field: the leading argument is the label selector.
                Ok(CalcOp::CharAt {
                    target: Target::Ordinal(1),
                    label: Some(parse_number(&args[0], "label index")?),
                    index: parse_number(&args[1], "character index")?,
                    default: parse_default(&args[2])?,
                })
            }
            3 => {
                let (target, class) = parse_target(&args[0])?;
                if matches!(target, Target::Ordinal(_)) && class == Some(CharClass::Fqdn) {
                    return Err(format!(
                        "CHAR() index {:?} references an fqdn and needs a label index",
                        args[0]
                    ));
                }
                Ok(CalcOp::CharAt {
                    target,
                    label: None,
                    index: parse_number(&args[1], "character index")?,
                    default: parse_default(&args[2])?,
                })
            }
            _ => {
                // CHAR(index, default) over the sole identifier field.
                if n_fields > 1 {
                    return Err("CHAR() requires an identifier subscript".to_string());
                }
                if pattern.field_class(1) == Some(CharClass::Fqdn) {
                    return Err("CHAR() on an fqdn needs a label index".to_string());
                }
                if n_fields == 0 {
                    return Err("CHAR() references an identifier but the pattern has none".to_string());
                }
                Ok(CalcOp::CharAt {
                    target: Target::Ordinal(1),
                    label: None,
                    index: parse_number(&args[0], "character index")?,
                    default: parse_default(&args[1])?,
                })
            }
        };
    }

    // Counting functions and ANY/NONE: zero or one argument.
    if args.len() > 1 {
        return Err(format!("{name}() requires at most 1 argument"));
    }
    let (target, class) = match args.first() {
        Some(arg) => parse_target(arg)?,
        None => {
            if n_fields > 1 {
                return Err(format!("{name}() requires an identifier subscript"));
            }
            if n_fields == 0 {
                return Err(format!(
                    "{name}() references an identifier but the pattern has none"
                ));
            }
            (Target::Ordinal(1), pattern.field_class(1))
        }
    };

    let kind = match name {
        "DIGITS" => CountKind::Digits,
        "ALPHAS" => CountKind::Alphas,
        "CHARS" => CountKind::Chars,
        "VOWELS" => CountKind::Vowels,
        "LABELS" => {
            if class != Some(CharClass::Fqdn) {
                return Err("LABELS() must reference an fqdn field".to_string());
            }
            CountKind::Labels
        }
        "ANY" => return Ok(CalcOp::Any { target }),
        "NONE" => return Ok(CalcOp::NoneOf { target }),
        _ => return Err(format!("unrecognized calc function {name:?}")),
    };
    Ok(CalcOp::Count { kind, target })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(expr: &str) -> Pattern {
        Pattern::compile(expr, true).unwrap()
    }

    fn call(name: &str, args: &[&str]) -> RawCalc {
        RawCalc::Call {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn compile(raw: &[RawCalc], expr: &str) -> Result<Calc, String> {
        Calc::compile(raw, &pattern(expr), CharClass::Ident, false, true)
    }

    #[test]
    fn char_plus_chars_over_single_ident() {
        let calc = compile(
            &[call("CHAR", &["1", "-"]), call("CHARS", &[])],
            "%account%-%ident%-%code%",
        )
        .unwrap();
        let caps = Captures {
            fields: &[(CharClass::Ident, "macys")],
            account: "foo",
            alias: "",
        };
        assert_eq!(calc.expected_code(&caps).unwrap(), "m5");
    }

    #[test]
    fn fqdn_labels_and_negative_indices() {
        // CHAR(1,1,-) CHAR(2,-1,-) CHARS() over a single fqdn field.
        let calc = compile(
            &[
                call("CHAR", &["1", "1", "-"]),
                call("CHAR", &["2", "-1", "-"]),
                call("CHARS", &[]),
            ],
            "%account%-%fqdn%-%code%",
        )
        .unwrap();
        let caps = Captures {
            fields: &[(CharClass::Fqdn, "register.co.uk")],
            account: "foo",
            alias: "",
        };
        assert_eq!(calc.expected_code(&caps).unwrap(), "ro14");
    }

    #[test]
    fn chars_counts_dots_and_labels_counts_labels() {
        let calc = compile(
            &[call("LABELS", &[]), call("CHARS", &[])],
            "%fqdn%-%code%",
        )
        .unwrap();
        let caps = Captures {
            fields: &[(CharClass::Fqdn, "register.co.uk")],
            account: "x",
            alias: "",
        };
        assert_eq!(calc.expected_code(&caps).unwrap(), "314");
    }

    #[test]
    fn counts_over_two_fields_need_subscripts() {
        assert!(compile(&[call("CHARS", &[])], "%alpha%is%alpha%.%code%").is_err());
        let calc = compile(
            &[call("CHARS", &["1"]), call("CHARS", &["2"])],
            "%alpha%is%alpha%.%code%",
        )
        .unwrap();
        let caps = Captures {
            fields: &[(CharClass::Alpha, "sam"), (CharClass::Alpha, "sexy")],
            account: "baz",
            alias: "",
        };
        assert_eq!(calc.expected_code(&caps).unwrap(), "34");
    }

    #[test]
    fn digits_vowels_alphas() {
        let calc = compile(
            &[
                call("DIGITS", &[]),
                call("VOWELS", &[]),
                call("ALPHAS", &[]),
            ],
            "%ident%-%code%",
        )
        .unwrap();
        let caps = Captures {
            fields: &[(CharClass::Ident, "23skidoo")],
            account: "x",
            alias: "",
        };
        assert_eq!(calc.expected_code(&caps).unwrap(), "236");
    }

    #[test]
    fn any_is_deterministic_smallest_byte() {
        let calc = compile(&[call("ANY", &[])], "%ident%-%code%").unwrap();
        let caps = Captures {
            fields: &[(CharClass::Ident, "skidoo2")],
            account: "x",
            alias: "",
        };
        assert_eq!(calc.expected_code(&caps).unwrap(), "2");
    }

    #[test]
    fn none_picks_an_absent_byte() {
        let calc = compile(&[call("NONE", &[])], "%ident%-%code%").unwrap();
        let caps = Captures {
            fields: &[(CharClass::Ident, "0123456789")],
            account: "x",
            alias: "",
        };
        // All digits present, so the first absent alnum byte is 'a'.
        assert_eq!(calc.expected_code(&caps).unwrap(), "a");
    }

    #[test]
    fn char_default_on_out_of_range() {
        let calc = compile(&[call("CHAR", &["7", "x"])], "%ident%-%code%").unwrap();
        let caps = Captures {
            fields: &[(CharClass::Ident, "abc")],
            account: "x",
            alias: "",
        };
        assert_eq!(calc.expected_code(&caps).unwrap(), "x");
    }

    #[test]
    fn named_account_reference() {
        let calc = compile(&[call("CHARS", &["account"])], "%account%-%ident%-%code%").unwrap();
        let caps = Captures {
            fields: &[(CharClass::Ident, "whatever")],
            account: "foo",
            alias: "",
        };
        assert_eq!(calc.expected_code(&caps).unwrap(), "3");
    }

    #[test]
    fn alias_reference_requires_aliases() {
        let raw = [call("CHARS", &["alias"])];
        let p = pattern("%alias%-%ident%-%code%");
        assert!(Calc::compile(&raw, &p, CharClass::Ident, false, true).is_err());
        assert!(Calc::compile(&raw, &p, CharClass::Ident, true, true).is_ok());
    }

    #[test]
    fn star_subscript_rejected() {
        assert!(compile(&[call("CHAR", &["1", "*"])], "%ident%-%code%").is_err());
        assert!(compile(&[call("CHARS", &["*"])], "%ident%-%code%").is_err());
    }

    #[test]
    fn labels_on_non_fqdn_rejected() {
        assert!(compile(&[call("LABELS", &[])], "%ident%-%code%").is_err());
    }

    #[test]
    fn char_arity_shapes() {
        // 4-arg form must reference an fqdn.
        assert!(compile(&[call("CHAR", &["1", "1", "1", "-"])], "%ident%-%code%").is_err());
        assert!(compile(&[call("CHAR", &["2", "1", "1", "-"])], "%ident%.%fqdn%-%code%").is_ok());
        // Ordinal referencing an fqdn without a label is rejected.
        assert!(compile(&[call("CHAR", &["2", "1", "-"])], "%ident%.%fqdn%-%code%").is_err());
        // Bare 2-arg form is illegal over a single fqdn.
        assert!(compile(&[call("CHAR", &["1", "-"])], "%fqdn%-%code%").is_err());
        assert!(compile(&[call("CHAR", &["1", "-", "-", "-", "-"])], "%ident%-%code%").is_err());
    }

    #[test]
    fn literal_op_and_alphabet() {
        let calc = Calc::compile(
            &[RawCalc::Literal("K!".to_string()), call("CHARS", &[])],
            &pattern("%ident%-%code%"),
            CharClass::Ident,
            false,
            true,
        )
        .unwrap();
        let caps = Captures {
            fields: &[(CharClass::Ident, "ab")],
            account: "x",
            alias: "",
        };
        assert_eq!(calc.expected_code(&caps).unwrap(), "k!2");
        assert_eq!(calc.min_len(), 3);
        let alphabet = calc.code_alphabet();
        assert!(alphabet.contains(b'!'));
        assert!(alphabet.contains(b'7'));
        assert!(!alphabet.contains(b'@'));
    }
}
