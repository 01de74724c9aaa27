//! The structure expression language.
//!
//! ```text
//! [label =] operand (op operand)*
//! operand := name | ( expression ) | margin( expression , number )
//! op      := ∪ | ∩ | ⊕ | -        (ASCII aliases: | & ^)
//! ```
//!
//! All binary operators share one precedence level and associate to the left;
//! parentheses override. Expressions are converted to postfix with the
//! shunting-yard algorithm and evaluated over a stack of slice maps.

pub mod lexer;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::clipping::{BooleanOp, ClipPrimitive, OffsetPrimitive};
use crate::config::AlgebraConfig;
use crate::error::{AlgebraError, Error, Result};
use crate::structure::{RoiNumber, StructureStore};

use super::binary::ApplyBinary;
use super::margin::ApplyMargin;
use super::slice_index::SliceMap;
use super::{OperationType, SliceOutcome};
use lexer::{tokenize, Spanned, Token};

/// Name of the built-in margin function.
const MARGIN_FN: &str = "margin";

/// Resolves operand names to slice maps.
pub trait SliceSource {
    /// Returns the slice map for `name`, or `None` if no such operand exists.
    fn slice_map(&self, name: &str, tolerance: f64) -> Option<SliceMap>;
}

/// Resolves names against the live structures of a structure store.
///
/// Aliases pin a name to a ROI number so a renamed source structure still
/// resolves.
pub struct StoreSource<'a> {
    store: &'a dyn StructureStore,
    aliases: HashMap<String, RoiNumber>,
}

impl<'a> StoreSource<'a> {
    /// Creates a resolver that looks structures up by name.
    #[must_use]
    pub fn new(store: &'a dyn StructureStore) -> Self {
        Self {
            store,
            aliases: HashMap::new(),
        }
    }

    /// Pins each name to a ROI number.
    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = (S, RoiNumber)>,
        S: Into<String>,
    {
        self.aliases
            .extend(aliases.into_iter().map(|(name, roi)| (name.into(), roi)));
        self
    }
}

impl SliceSource for StoreSource<'_> {
    fn slice_map(&self, name: &str, tolerance: f64) -> Option<SliceMap> {
        let structure = match self.aliases.get(name) {
            Some(&roi) => self.store.structure(roi),
            None => self.store.find_by_name(name),
        }?;
        Some(SliceMap::from_structure(&structure, tolerance))
    }
}

/// One item of an expression in postfix order.
#[derive(Debug, Clone, PartialEq)]
enum Postfix {
    Operand(String),
    Number(f64),
    Binary(BooleanOp),
    Margin,
}

/// An entry on the shunting-yard operator stack.
#[derive(Debug, Clone, Copy)]
enum Pending {
    Op(BooleanOp),
    /// An open parenthesis. `arg` counts commas seen inside a margin call.
    Group { call: bool, arg: usize, position: usize },
}

/// A parsed structure expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    label: Option<String>,
    postfix: Vec<Postfix>,
}

impl Expression {
    /// Parses an expression.
    ///
    /// # Errors
    ///
    /// Returns `AlgebraError::MalformedExpression` on unbalanced parentheses,
    /// a dangling or missing operator, a misplaced number, comma or `=`, or an
    /// empty expression.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let end = source.chars().count();

        let (label, body) = match tokens.as_slice() {
            [Spanned {
                token: Token::Name(name),
                ..
            }, Spanned {
                token: Token::Assign,
                ..
            }, rest @ ..] => (Some(name.clone()), rest),
            _ => (None, tokens.as_slice()),
        };

        let postfix = to_postfix(body, end)?;
        Ok(Self {
            source: source.to_owned(),
            label,
            postfix,
        })
    }

    /// The expression text as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The name given to the result by a leading `label =`, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Distinct operand names in order of first appearance.
    #[must_use]
    pub fn operand_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.postfix
            .iter()
            .filter_map(|item| match item {
                Postfix::Operand(name) => Some(name.as_str()),
                _ => None,
            })
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// The single kind of operation the expression uses, or `Complex` when
    /// it mixes kinds or has no operator at all.
    #[must_use]
    pub fn operation_type(&self) -> OperationType {
        let mut kinds = self.postfix.iter().filter_map(|item| match item {
            Postfix::Binary(op) => Some(OperationType::from(*op)),
            Postfix::Margin => Some(OperationType::Margin),
            _ => None,
        });
        match kinds.next() {
            Some(first) if kinds.all(|k| k == first) => first,
            _ => OperationType::Complex,
        }
    }

    /// Evaluates the expression.
    ///
    /// Every operand is resolved before any clipping starts, so an unknown
    /// name aborts the whole expression without a partial result.
    ///
    /// # Errors
    ///
    /// Returns `AlgebraError::StructureNotFound` naming the first operand
    /// `source` cannot resolve.
    pub fn evaluate<S, C>(&self, source: &S, clipper: &C, config: AlgebraConfig) -> Result<SliceOutcome>
    where
        S: SliceSource + ?Sized,
        C: ClipPrimitive + OffsetPrimitive + ?Sized,
    {
        let mut operands: HashMap<&str, SliceMap> = HashMap::new();
        for name in self.operand_names() {
            let map = source
                .slice_map(name, config.slice_tolerance)
                .ok_or_else(|| AlgebraError::StructureNotFound {
                    name: name.to_owned(),
                })?;
            operands.insert(name, map);
        }

        let mut stack: Vec<Value> = Vec::new();
        let mut skipped: Vec<f64> = Vec::new();
        for item in &self.postfix {
            let value = match item {
                Postfix::Operand(name) => {
                    Value::Slices(operands.get(name.as_str()).cloned().unwrap_or_default())
                }
                Postfix::Number(v) => Value::Number(*v),
                Postfix::Binary(op) => {
                    let b = pop_slices(&mut stack)?;
                    let a = pop_slices(&mut stack)?;
                    let outcome = ApplyBinary::new(*op, &a, &b)
                        .with_config(config)
                        .execute(clipper);
                    skipped.extend(outcome.skipped);
                    Value::Slices(outcome.slices)
                }
                Postfix::Margin => {
                    let distance = match stack.pop() {
                        Some(Value::Number(d)) => d,
                        _ => return Err(stack_error()),
                    };
                    let map = pop_slices(&mut stack)?;
                    let outcome = ApplyMargin::new(&map, distance)
                        .with_config(config)
                        .execute(clipper);
                    skipped.extend(outcome.skipped);
                    Value::Slices(outcome.slices)
                }
            };
            stack.push(value);
        }

        let slices = pop_slices(&mut stack)?;
        if !stack.is_empty() {
            return Err(stack_error());
        }
        debug!(
            expression = %self.source,
            slices = slices.len(),
            skipped = skipped.len(),
            "evaluated expression"
        );
        Ok(SliceOutcome {
            slices,
            skipped: Vec::new(),
        }
        .with_skipped(&skipped))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Expression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

enum Value {
    Slices(SliceMap),
    Number(f64),
}

fn pop_slices(stack: &mut Vec<Value>) -> Result<SliceMap> {
    match stack.pop() {
        Some(Value::Slices(map)) => Ok(map),
        _ => Err(stack_error()),
    }
}

fn stack_error() -> Error {
    AlgebraError::malformed("operator is missing an operand", 0).into()
}

/// Returns `true` when the innermost open group is a margin call waiting for
/// its distance argument.
fn in_distance_arg(stack: &[Pending]) -> bool {
    matches!(stack.last(), Some(Pending::Group { call: true, arg: 1, .. }))
}

/// Moves operators to the output until the innermost open group.
fn flush_ops(stack: &mut Vec<Pending>, output: &mut Vec<Postfix>) {
    while let Some(&Pending::Op(op)) = stack.last() {
        output.push(Postfix::Binary(op));
        stack.pop();
    }
}

/// Shunting-yard conversion with a single precedence class.
fn to_postfix(tokens: &[Spanned], end: usize) -> Result<Vec<Postfix>> {
    let mut output: Vec<Postfix> = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Pending> = Vec::new();
    let mut expect_operand = true;
    let mut i = 0;

    while i < tokens.len() {
        let Spanned { token, position } = &tokens[i];
        let position = *position;
        let fail = |reason: String| -> Error { AlgebraError::malformed(reason, position).into() };

        match token {
            Token::Name(name)
                if name.eq_ignore_ascii_case(MARGIN_FN)
                    && matches!(tokens.get(i + 1).map(|t| &t.token), Some(Token::LParen)) =>
            {
                if !expect_operand || in_distance_arg(&stack) {
                    return Err(fail(format!("unexpected '{name}'")));
                }
                stack.push(Pending::Group {
                    call: true,
                    arg: 0,
                    position,
                });
                i += 1;
            }
            Token::Name(name) => {
                if !expect_operand {
                    return Err(fail(format!("missing operator before '{name}'")));
                }
                if in_distance_arg(&stack) {
                    return Err(fail("margin distance must be a number".to_owned()));
                }
                output.push(Postfix::Operand(name.clone()));
                expect_operand = false;
            }
            Token::Number(value) => {
                if !expect_operand || !in_distance_arg(&stack) {
                    return Err(fail(format!("unexpected number {value}")));
                }
                output.push(Postfix::Number(*value));
                expect_operand = false;
            }
            Token::Op(op) => {
                if expect_operand {
                    return Err(fail(format!("operator '{}' is missing its left operand", op.glyph())));
                }
                if in_distance_arg(&stack) {
                    return Err(fail("margin distance must be a number".to_owned()));
                }
                flush_ops(&mut stack, &mut output);
                stack.push(Pending::Op(*op));
                expect_operand = true;
            }
            Token::LParen => {
                if !expect_operand {
                    return Err(fail("missing operator before '('".to_owned()));
                }
                if in_distance_arg(&stack) {
                    return Err(fail("margin distance must be a number".to_owned()));
                }
                stack.push(Pending::Group {
                    call: false,
                    arg: 0,
                    position,
                });
            }
            Token::Comma => {
                if expect_operand {
                    return Err(fail("missing operand before ','".to_owned()));
                }
                flush_ops(&mut stack, &mut output);
                match stack.last_mut() {
                    Some(Pending::Group {
                        call: true, arg, ..
                    }) if *arg == 0 => *arg = 1,
                    _ => return Err(fail("unexpected ','".to_owned())),
                }
                expect_operand = true;
            }
            Token::RParen => {
                if expect_operand {
                    return Err(fail("missing operand before ')'".to_owned()));
                }
                flush_ops(&mut stack, &mut output);
                match stack.pop() {
                    Some(Pending::Group { call: false, .. }) => {}
                    Some(Pending::Group { call: true, arg: 1, .. }) => output.push(Postfix::Margin),
                    Some(Pending::Group { call: true, .. }) => {
                        return Err(fail("margin takes a structure and a distance".to_owned()))
                    }
                    _ => return Err(fail("unbalanced ')'".to_owned())),
                }
            }
            Token::Assign => return Err(fail("unexpected '='".to_owned())),
        }
        i += 1;
    }

    if expect_operand {
        let reason = if output.is_empty() && stack.is_empty() {
            "empty expression"
        } else {
            "expression ends with an operator"
        };
        return Err(AlgebraError::malformed(reason, end).into());
    }
    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Op(op) => output.push(Postfix::Binary(op)),
            Pending::Group { position, .. } => {
                return Err(AlgebraError::malformed("unbalanced '('", position).into())
            }
        }
    }
    Ok(output)
}
