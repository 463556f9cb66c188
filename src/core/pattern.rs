//! Match-expression compilation.
//!
//! A match expression like `%account%-%fqdn%-%code%` compiles to a sequence
//! of literal runs and typed fields. Compilation rejects pattern ambiguity:
//! two variable-width fields may only touch when one is `%alpha%` and the
//! other `%number%`, because that adjacency has a unique split point.

use crate::core::chars::CharClass;

/// What a `%field%` stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// An identifier field; `ordinal` is its 1-based position among all
    /// identifier fields of the pattern, left to right.
    Ident { class: CharClass, ordinal: usize },
    Account,
    Alias,
    Code,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternElement {
    Literal(String),
    Field(FieldKind),
}

/// A compiled match expression.
#[derive(Debug, Clone)]
pub struct Pattern {
    elements: Vec<PatternElement>,
    /// Classes of the identifier fields, in ordinal order.
    fields: Vec<CharClass>,
    has_account: bool,
    has_alias: bool,
    source: String,
}

impl Pattern {
    /// Compile `expr`. `fold` lower-cases literals for case-insensitive
    /// configurations. `%account%`/`%alias%` are anchors, expanded against
    /// declared names at match time; their `USING` class only matters to
    /// calculation references and is kept by the owning specification.
    pub fn compile(expr: &str, fold: bool) -> Result<Pattern, String> {
        let mut elements = Vec::new();
        let mut fields = Vec::new();
        let mut has_account = false;
        let mut has_alias = false;
        let mut code_fields = 0usize;

        // Adjacency state: what kind of field, if any, immediately precedes
        // the cursor with no literal in between.
        #[derive(PartialEq, Clone, Copy)]
        enum Prev {
            Nothing,
            Friendly(CharClass),
            Poison,
        }
        let mut prev = Prev::Nothing;

        let mut literal = String::new();
        let mut rest = expr;
        while !rest.is_empty() {
            match rest.find('%') {
                None => {
                    literal.push_str(rest);
                    rest = "";
                }
                Some(at) => {
                    literal.push_str(&rest[..at]);
                    rest = &rest[at + 1..];
                    let end = rest
                        .find('%')
                        .ok_or_else(|| format!("unterminated field in \"{expr}\""))?;
                    let name = &rest[..end];
                    rest = &rest[end + 1..];
                    if name.is_empty() {
                        // "%%" is a literal percent sign.
                        literal.push('%');
                        continue;
                    }

                    if !literal.is_empty() {
                        elements.push(PatternElement::Literal(std::mem::take(&mut literal)));
                        prev = Prev::Nothing;
                    }

                    let kind = match name {
                        "account" => {
                            has_account = true;
                            FieldKind::Account
                        }
                        "alias" => {
                            has_alias = true;
                            FieldKind::Alias
                        }
                        "code" => {
                            code_fields += 1;
                            FieldKind::Code
                        }
                        other => match CharClass::parse(other) {
                            Some(class) => {
                                fields.push(class);
                                FieldKind::Ident {
                                    class,
                                    ordinal: fields.len(),
                                }
                            }
                            None => return Err(format!("unrecognized matchvalue \"{other}\"")),
                        },
                    };

                    let friendly = match kind {
                        FieldKind::Ident { class, .. }
                            if matches!(class, CharClass::Alpha | CharClass::Number) =>
                        {
                            Some(class)
                        }
                        _ => None,
                    };
                    match (prev, friendly) {
                        (Prev::Nothing, _) => {}
                        (Prev::Poison, _) | (Prev::Friendly(_), None) => {
                            return Err(format!(
                                "\"{name}\" cannot occur next to another field in \"{expr}\""
                            ));
                        }
                        (Prev::Friendly(p), Some(c)) if p == c => {
                            return Err(format!(
                                "\"{name}\" cannot occur next to itself in \"{expr}\""
                            ));
                        }
                        (Prev::Friendly(_), Some(_)) => {}
                    }
                    prev = match friendly {
                        Some(class) => Prev::Friendly(class),
                        None => Prev::Poison,
                    };

                    elements.push(PatternElement::Field(kind));
                }
            }
        }
        if !literal.is_empty() {
            elements.push(PatternElement::Literal(literal));
        }

        if code_fields != 1 {
            return Err(format!(
                "expected exactly one %code% field, found {code_fields} in \"{expr}\""
            ));
        }

        let mut pattern = Pattern {
            elements,
            fields,
            has_account,
            has_alias,
            source: expr.to_string(),
        };
        if fold {
            for element in &mut pattern.elements {
                if let PatternElement::Literal(text) = element {
                    *text = text.to_ascii_lowercase();
                }
            }
        }
        Ok(pattern)
    }

    pub fn elements(&self) -> &[PatternElement] {
        &self.elements
    }

    /// Identifier field classes in ordinal order (1-based ordinals).
    pub fn fields(&self) -> &[CharClass] {
        &self.fields
    }

    pub fn field_class(&self, ordinal: usize) -> Option<CharClass> {
        self.fields.get(ordinal.checked_sub(1)?).copied()
    }

    pub fn has_account(&self) -> bool {
        self.has_account
    }

    pub fn has_alias(&self) -> bool {
        self.has_alias
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Canonical text used to detect colliding patterns across specifications.
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        for element in &self.elements {
            match element {
                PatternElement::Literal(text) => {
                    for ch in text.chars() {
                        if ch == '%' {
                            out.push_str("%%");
                        } else {
                            out.push(ch);
                        }
                    }
                }
                PatternElement::Field(kind) => {
                    out.push('%');
                    out.push_str(match kind {
                        FieldKind::Ident { class, .. } => class.name(),
                        FieldKind::Account => "account",
                        FieldKind::Alias => "alias",
                        FieldKind::Code => "code",
                    });
                    out.push('%');
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(expr: &str) -> Result<Pattern, String> {
        Pattern::compile(expr, true)
    }

    #[test]
    fn simple_pattern() {
        let p = compile("%account%-%ident%-%code%").unwrap();
        assert_eq!(p.fields(), &[CharClass::Ident]);
        assert!(p.has_account());
        assert!(!p.has_alias());
        assert_eq!(p.elements().len(), 5);
    }

    #[test]
    fn ordinals_run_left_to_right_across_classes() {
        let p = compile("%alpha%is%alpha%.%code%").unwrap();
        assert_eq!(p.fields(), &[CharClass::Alpha, CharClass::Alpha]);
        assert_eq!(p.field_class(2), Some(CharClass::Alpha));
        assert_eq!(p.field_class(3), None);
    }

    #[test]
    fn percent_escape_is_a_literal() {
        let p = compile("x%%y%code%").unwrap();
        assert_eq!(
            p.elements()[0],
            PatternElement::Literal("x%y".to_string())
        );
        assert_eq!(p.fingerprint(), "x%%y%code%");
    }

    #[test]
    fn literals_fold_when_case_insensitive() {
        let p = compile("FOO%code%").unwrap();
        assert_eq!(p.elements()[0], PatternElement::Literal("foo".to_string()));
        let p = Pattern::compile("FOO%code%", false).unwrap();
        assert_eq!(p.elements()[0], PatternElement::Literal("FOO".to_string()));
    }

    #[test]
    fn exactly_one_code_field() {
        assert!(compile("%ident%").is_err());
        assert!(compile("%code%-%code%").is_err());
    }

    #[test]
    fn adjacency_rules() {
        // The only legal adjacency: alpha/number in either order.
        assert!(compile("%alpha%%number%%code%").is_err()); // number then code adjacency
        assert!(compile("%alpha%%number%-%code%").is_ok());
        assert!(compile("%number%%alpha%-%code%").is_ok());
        assert!(compile("%alpha%%alpha%-%code%").is_err());
        assert!(compile("%ident%%ident%-%code%").is_err());
        assert!(compile("%alnum%%alnum%-%code%").is_err());
        assert!(compile("%ident%%alpha%-%code%").is_err());
        assert!(compile("%account%%ident%-%code%").is_err());
        assert!(compile("%ident%-%code%").is_ok());
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(compile("%walrus%-%code%").is_err());
        assert!(compile("%ident").is_err());
    }
}
