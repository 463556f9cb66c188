//! The specification compiler and address-resolution engine.

pub mod calc;
pub mod chars;
pub mod matcher;
pub mod pattern;
pub mod resolver;
pub mod spec;

pub use calc::{Calc, CalcOp, Captures, CountKind, RawCalc, Target};
pub use chars::CharClass;
pub use pattern::{FieldKind, Pattern, PatternElement};
pub use resolver::{Mode, Resolved, resolve};
pub use spec::{AliasSpec, Aliases};
