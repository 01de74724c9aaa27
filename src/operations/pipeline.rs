use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::clipping::{BooleanOp, ClipPrimitive, OffsetPrimitive};
use crate::config::AlgebraConfig;
use crate::error::{AlgebraError, Result};

use super::binary::ApplyBinary;
use super::expression::lexer::is_valid_name;
use super::expression::SliceSource;
use super::margin::ApplyMargin;
use super::slice_index::SliceMap;
use super::SliceOutcome;

/// The operation of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOp {
    Union,
    Intersect,
    Subtract,
    Xor,
    /// In-plane margin in millimetres; negative values contract.
    Margin(f64),
}

impl StepOp {
    fn boolean(self) -> Option<BooleanOp> {
        match self {
            Self::Union => Some(BooleanOp::Union),
            Self::Intersect => Some(BooleanOp::Intersect),
            Self::Subtract => Some(BooleanOp::Subtract),
            Self::Xor => Some(BooleanOp::Xor),
            Self::Margin(_) => None,
        }
    }
}

/// One named step of a pipeline. Inputs may name structures or the result
/// of an earlier step; an earlier result shadows a structure of the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub input_a: String,
    /// Second operand; unused by margin steps.
    #[serde(default)]
    pub input_b: Option<String>,
    pub operation: StepOp,
    pub result: String,
}

impl PipelineStep {
    /// A boolean step `result = a op b`.
    #[must_use]
    pub fn boolean(
        input_a: impl Into<String>,
        op: BooleanOp,
        input_b: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        let operation = match op {
            BooleanOp::Union => StepOp::Union,
            BooleanOp::Intersect => StepOp::Intersect,
            BooleanOp::Subtract => StepOp::Subtract,
            BooleanOp::Xor => StepOp::Xor,
        };
        Self {
            input_a: input_a.into(),
            input_b: Some(input_b.into()),
            operation,
            result: result.into(),
        }
    }

    /// A margin step `result = margin(input, distance)`.
    #[must_use]
    pub fn margin(input: impl Into<String>, distance: f64, result: impl Into<String>) -> Self {
        Self {
            input_a: input.into(),
            input_b: None,
            operation: StepOp::Margin(distance),
            result: result.into(),
        }
    }
}

/// An explicit multi-step boolean/margin computation. The result of the last
/// step is the pipeline's result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub steps: Vec<PipelineStep>,
}

impl Pipeline {
    /// Creates a pipeline from its steps.
    #[must_use]
    pub fn new(steps: Vec<PipelineStep>) -> Self {
        Self { steps }
    }

    /// Name of the final result.
    #[must_use]
    pub fn result_name(&self) -> Option<&str> {
        self.steps.last().map(|s| s.result.as_str())
    }

    /// Evaluates every step in order.
    ///
    /// # Errors
    ///
    /// Returns `AlgebraError::MalformedExpression` for an empty pipeline or a
    /// boolean step without a second input, and
    /// `AlgebraError::StructureNotFound` for an input that is neither an
    /// earlier result nor a known structure.
    pub fn evaluate<S, C>(&self, source: &S, clipper: &C, config: AlgebraConfig) -> Result<SliceOutcome>
    where
        S: SliceSource + ?Sized,
        C: ClipPrimitive + OffsetPrimitive + ?Sized,
    {
        self.validate()?;

        // Inputs not produced by an earlier step are structures; resolve them
        // all before any clipping so an unknown name aborts the whole run.
        let mut produced: HashSet<&str> = HashSet::new();
        let mut structures: HashMap<&str, SliceMap> = HashMap::new();
        for step in &self.steps {
            for name in std::iter::once(&step.input_a).chain(&step.input_b) {
                let name = name.as_str();
                if produced.contains(name) || structures.contains_key(name) {
                    continue;
                }
                let map = source
                    .slice_map(name, config.slice_tolerance)
                    .ok_or_else(|| AlgebraError::StructureNotFound {
                        name: name.to_owned(),
                    })?;
                structures.insert(name, map);
            }
            produced.insert(step.result.as_str());
        }

        let mut results: HashMap<&str, SliceMap> = HashMap::new();
        let mut skipped = Vec::new();
        let mut last = SliceMap::new();

        for (index, step) in self.steps.iter().enumerate() {
            let a = lookup(&results, &structures, &step.input_a);
            let outcome = match (step.operation, &step.input_b) {
                (StepOp::Margin(distance), _) => {
                    ApplyMargin::new(&a, distance).with_config(config).execute(clipper)
                }
                (op, Some(input_b)) => {
                    let b = lookup(&results, &structures, input_b);
                    let op = op.boolean().ok_or_else(|| missing_input_b(index))?;
                    ApplyBinary::new(op, &a, &b).with_config(config).execute(clipper)
                }
                (_, None) => return Err(missing_input_b(index).into()),
            };
            skipped.extend(outcome.skipped);
            if index + 1 == self.steps.len() {
                last = outcome.slices;
            } else {
                results.insert(step.result.as_str(), outcome.slices);
            }
        }

        Ok(SliceOutcome {
            slices: last,
            skipped: Vec::new(),
        }
        .with_skipped(&skipped))
    }

    /// Renders the pipeline as one expression, `result = ...`, that
    /// evaluates to the same slices. Intermediate results are inlined in
    /// parentheses; steps the final result does not depend on are dropped.
    ///
    /// # Errors
    ///
    /// Returns `AlgebraError::MalformedExpression` for an empty pipeline, a
    /// boolean step without a second input, or a name the expression grammar
    /// cannot express.
    pub fn to_expression(&self) -> Result<String> {
        self.validate()?;
        let mut rendered: HashMap<&str, String> = HashMap::new();
        let mut last = String::new();

        for (index, step) in self.steps.iter().enumerate() {
            let a = render_input(&rendered, &step.input_a, index)?;
            let text = match (step.operation, &step.input_b) {
                (StepOp::Margin(distance), _) => format!("margin({}, {distance})", strip_parens(&a)),
                (op, Some(input_b)) => {
                    let b = render_input(&rendered, input_b, index)?;
                    let op = op.boolean().ok_or_else(|| missing_input_b(index))?;
                    format!("{a} {} {b}", op.glyph())
                }
                (_, None) => return Err(missing_input_b(index).into()),
            };
            last.clone_from(&text);
            rendered.insert(step.result.as_str(), text);
        }

        let result = self.result_name().unwrap_or_default();
        if !is_valid_name(result) {
            return Err(AlgebraError::malformed(format!("invalid result name '{result}'"), 0).into());
        }
        Ok(format!("{result} = {last}"))
    }

    fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(AlgebraError::malformed("pipeline has no steps", 0).into());
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.operation.boolean().is_some() && step.input_b.is_none() {
                return Err(missing_input_b(index).into());
            }
        }
        Ok(())
    }
}

fn missing_input_b(index: usize) -> AlgebraError {
    AlgebraError::malformed(format!("step {index} needs a second input"), index)
}

/// Earlier step results shadow structures of the same name.
fn lookup(
    results: &HashMap<&str, SliceMap>,
    structures: &HashMap<&str, SliceMap>,
    name: &str,
) -> SliceMap {
    results
        .get(name)
        .or_else(|| structures.get(name))
        .cloned()
        .unwrap_or_default()
}

/// Renders an input as an operand: an earlier result in parentheses, or a
/// structure name.
fn render_input(rendered: &HashMap<&str, String>, name: &str, index: usize) -> Result<String> {
    if let Some(text) = rendered.get(name) {
        return Ok(format!("({text})"));
    }
    if is_valid_name(name) {
        Ok(name.to_owned())
    } else {
        Err(AlgebraError::malformed(format!("invalid structure name '{name}'"), index).into())
    }
}

fn strip_parens(text: &str) -> &str {
    text.strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(text)
}
