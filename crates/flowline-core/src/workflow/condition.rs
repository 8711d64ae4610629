//! Restricted boolean predicates for step branching and chain hand-off.
//!
//! Conditions are JEXL expressions, parsed with `jexl_parser` and lowered
//! into a small [`Expr`] tree. Only part of the language is evaluated:
//! `||`, `&&`, `!`, parentheses, comparisons (`==`, `!=`, `<`, `<=`, `>`,
//! `>=`) and operands that are reference paths or literals (numbers, quoted
//! strings, `true`, `false`, `null`). A bare operand is tested for
//! truthiness.
//!
//! Paths use dots for fields and brackets for sequence indexes or field
//! names that are not identifiers: `fetch.result.items[0]`,
//! `fetch.result.headers['content-type']`.
//!
//! Anything else JEXL accepts (arithmetic, `in`, transforms, ternaries,
//! array and object literals, computed indexes) makes the whole condition
//! evaluate to `false`, with a warning. Text JEXL cannot parse is a
//! [`ConditionError`], reported when the workflow is compiled.

use std::fmt;

use flowline_types::value::StepValue;
use jexl_parser::ast::{Expression, OpCode, UnaryOpCode};
use jexl_parser::Parser;
use thiserror::Error;

use super::path::{PathError, PathSyntax, ReferencePath};
use super::resolver::{resolve, PathScope, ResolutionError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error(transparent)]
    InvalidPath(#[from] PathError),
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn from_opcode(op: &OpCode) -> Option<Self> {
        match op {
            OpCode::Equal => Some(CompareOp::Eq),
            OpCode::NotEqual => Some(CompareOp::Ne),
            OpCode::Less => Some(CompareOp::Lt),
            OpCode::LessEqual => Some(CompareOp::Le),
            OpCode::Greater => Some(CompareOp::Gt),
            OpCode::GreaterEqual => Some(CompareOp::Ge),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(ReferencePath),
    Literal(StepValue),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    Truthy(Operand),
    /// A sub-expression the condition language does not evaluate.
    Unsupported { construct: String },
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
    unsupported: Vec<String>,
}

impl Condition {
    /// Parse a workflow condition (paths like `step.result.field`).
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        Self::parse_with(source, PathSyntax::Workflow)
    }

    /// Parse a condition over named roots (paths like `output.field`).
    pub fn parse_named(source: &str) -> Result<Self, ConditionError> {
        Self::parse_with(source, PathSyntax::Named)
    }

    pub fn parse_with(source: &str, syntax: PathSyntax) -> Result<Self, ConditionError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ConditionError::Empty);
        }
        let ast = Parser::parse(source).map_err(|e| ConditionError::Syntax(format!("{e:?}")))?;

        let mut lowering = Lowering {
            syntax,
            unsupported: Vec::new(),
        };
        let expr = lowering.expr(&ast)?;
        Ok(Self {
            source: source.to_string(),
            expr,
            unsupported: lowering.unsupported,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Whether the condition contains constructs that force it to `false`.
    pub fn is_supported(&self) -> bool {
        self.unsupported.is_empty()
    }

    /// Every reference path mentioned by the condition.
    pub fn paths(&self) -> Vec<&ReferencePath> {
        let mut out = Vec::new();
        collect_paths(&self.expr, &mut out);
        out
    }

    /// Evaluate against a scope.
    ///
    /// Conditions with unsupported constructs are `false` without resolving
    /// anything. A path that fails to resolve is an error.
    pub fn evaluate<S>(&self, scope: &S) -> Result<bool, ResolutionError>
    where
        S: PathScope + ?Sized,
    {
        if !self.unsupported.is_empty() {
            tracing::warn!(
                condition = %self.source,
                constructs = ?self.unsupported,
                "condition uses unsupported constructs, evaluating to false"
            );
            return Ok(false);
        }
        eval_expr(&self.expr, scope, &self.source)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse and evaluate a workflow condition in one go.
pub fn evaluate_condition<S>(source: &str, scope: &S) -> Result<bool, EvaluateError>
where
    S: PathScope + ?Sized,
{
    let condition = Condition::parse(source)?;
    Ok(condition.evaluate(scope)?)
}

/// Error from [`evaluate_condition`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluateError {
    #[error("malformed condition: {0}")]
    Malformed(#[from] ConditionError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

fn collect_paths<'a>(expr: &'a Expr, out: &mut Vec<&'a ReferencePath>) {
    match expr {
        Expr::Or(left, right) | Expr::And(left, right) => {
            collect_paths(left, out);
            collect_paths(right, out);
        }
        Expr::Not(inner) => collect_paths(inner, out),
        Expr::Compare { left, right, .. } => {
            for operand in [left, right] {
                if let Operand::Path(p) = operand {
                    out.push(p);
                }
            }
        }
        Expr::Truthy(Operand::Path(p)) => out.push(p),
        Expr::Truthy(Operand::Literal(_)) | Expr::Unsupported { .. } => {}
    }
}

// ---------------------------------------------------------------------------
// Lowering from the JEXL AST
// ---------------------------------------------------------------------------

struct Lowering {
    syntax: PathSyntax,
    unsupported: Vec<String>,
}

impl Lowering {
    fn expr(&mut self, node: &Expression) -> Result<Expr, ConditionError> {
        match node {
            Expression::BinaryOperation {
                operation,
                left,
                right,
            } => match operation {
                OpCode::And => Ok(Expr::And(Box::new(self.expr(left)?), Box::new(self.expr(right)?))),
                OpCode::Or => Ok(Expr::Or(Box::new(self.expr(left)?), Box::new(self.expr(right)?))),
                op => match CompareOp::from_opcode(op) {
                    Some(cmp) => {
                        let (Some(l), Some(r)) = (self.operand(left)?, self.operand(right)?) else {
                            return Ok(Expr::Unsupported {
                                construct: "nested expression".to_string(),
                            });
                        };
                        Ok(Expr::Compare {
                            left: l,
                            op: cmp,
                            right: r,
                        })
                    }
                    None => Ok(self.unsupported(format!("{op:?}"))),
                },
            },
            Expression::UnaryOperation {
                operation: UnaryOpCode::Not,
                right,
            } => Ok(Expr::Not(Box::new(self.expr(right)?))),
            other => Ok(match self.operand(other)? {
                Some(operand) => Expr::Truthy(operand),
                None => Expr::Unsupported {
                    construct: describe(other),
                },
            }),
        }
    }

    /// A literal or path operand. `None` means the node is unsupported; it
    /// has already been recorded.
    fn operand(&mut self, node: &Expression) -> Result<Option<Operand>, ConditionError> {
        let literal = match node {
            Expression::Number(n) => Some(StepValue::Number(*n)),
            Expression::String(s) => Some(StepValue::String(s.clone())),
            Expression::Boolean(b) => Some(StepValue::Bool(*b)),
            Expression::Null => Some(StepValue::Null),
            Expression::Identifier(name) => match name.as_str() {
                "true" => Some(StepValue::Bool(true)),
                "false" => Some(StepValue::Bool(false)),
                "null" => Some(StepValue::Null),
                _ => None,
            },
            _ => None,
        };
        if let Some(value) = literal {
            return Ok(Some(Operand::Literal(value)));
        }

        let mut segments = Vec::new();
        if path_segments(node, &mut segments) {
            let path = ReferencePath::from_segments(&segments, self.syntax)?;
            return Ok(Some(Operand::Path(path)));
        }

        self.unsupported.push(describe(node));
        Ok(None)
    }

    fn unsupported(&mut self, construct: String) -> Expr {
        self.unsupported.push(construct.clone());
        Expr::Unsupported { construct }
    }
}

/// Flatten `a.b[0]['c-d']` into `["a", "b", "0", "c-d"]`. Returns false for
/// anything that is not a plain path.
fn path_segments(node: &Expression, out: &mut Vec<String>) -> bool {
    match node {
        Expression::Identifier(name) => {
            out.push(name.clone());
            true
        }
        Expression::DotOperation { subject, ident } => {
            if !path_segments(subject, out) {
                return false;
            }
            out.push(ident.clone());
            true
        }
        Expression::IndexOperation { subject, index } => {
            if !path_segments(subject, out) {
                return false;
            }
            match &**index {
                Expression::String(key) => out.push(key.clone()),
                Expression::Number(n) if *n >= 0.0 && n.fract() == 0.0 => out.push(format!("{}", *n as u64)),
                _ => return false,
            }
            true
        }
        _ => false,
    }
}

fn describe(node: &Expression) -> String {
    match node {
        Expression::BinaryOperation { operation, .. } => format!("{operation:?}"),
        Expression::Transform { name, .. } => format!("transform '{name}'"),
        Expression::IndexOperation { .. } => "computed index".to_string(),
        Expression::UnaryOperation { .. } => "nested expression".to_string(),
        _ => "unsupported expression".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval_expr<S>(expr: &Expr, scope: &S, source: &str) -> Result<bool, ResolutionError>
where
    S: PathScope + ?Sized,
{
    match expr {
        Expr::Or(left, right) => Ok(eval_expr(left, scope, source)? || eval_expr(right, scope, source)?),
        Expr::And(left, right) => Ok(eval_expr(left, scope, source)? && eval_expr(right, scope, source)?),
        Expr::Not(inner) => Ok(!eval_expr(inner, scope, source)?),
        Expr::Truthy(operand) => Ok(operand_value(operand, scope)?.is_truthy()),
        Expr::Compare { left, op, right } => {
            let l = operand_value(left, scope)?;
            let r = operand_value(right, scope)?;
            Ok(compare(l, *op, r, source))
        }
        // Unreachable through `Condition::evaluate`, which bails out first.
        Expr::Unsupported { .. } => Ok(false),
    }
}

fn operand_value<'a, S>(operand: &'a Operand, scope: &'a S) -> Result<&'a StepValue, ResolutionError>
where
    S: PathScope + ?Sized,
{
    match operand {
        Operand::Literal(value) => Ok(value),
        Operand::Path(path) => resolve(path, scope),
    }
}

fn compare(left: &StepValue, op: CompareOp, right: &StepValue, source: &str) -> bool {
    match op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        _ => {
            let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
                tracing::warn!(
                    condition = %source,
                    operator = op.symbol(),
                    left = %left.kind(),
                    right = %right.kind(),
                    "numeric comparison on non-numbers, evaluating to false"
                );
                return false;
            };
            match op {
                CompareOp::Lt => l < r,
                CompareOp::Le => l <= r,
                CompareOp::Gt => l > r,
                CompareOp::Ge => l >= r,
                CompareOp::Eq => l == r,
                CompareOp::Ne => l != r,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::context::ExecutionContext;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(Uuid::now_v7(), StepValue::from(json!({"limit": 3})));
        ctx.record_result(
            "fetch",
            StepValue::from(json!({
                "status": 200,
                "ok": true,
                "tag": "beta",
                "items": [],
                "name": "",
                "list": ["x", "y"],
                "headers": {"content-type": "application/json"}
            })),
        );
        ctx
    }

    fn eval(source: &str) -> bool {
        Condition::parse(source).unwrap().evaluate(&ctx()).unwrap()
    }

    #[test]
    fn equality() {
        assert!(eval("fetch.result.status == 200"));
        assert!(!eval("fetch.result.status == 500"));
        assert!(eval("fetch.result.status != 500"));
        assert!(eval("fetch.result.tag == 'beta'"));
        assert!(eval("fetch.result.tag == \"beta\""));
        assert!(!eval("fetch.result.status == '200'"));
    }

    #[test]
    fn numeric_comparison() {
        assert!(eval("fetch.result.status >= 200"));
        assert!(eval("fetch.result.status < 300"));
        assert!(!eval("fetch.result.status > 200"));
        assert!(eval("inputs.limit <= 3"));
    }

    #[test]
    fn numeric_comparison_on_strings_is_false() {
        assert!(!eval("fetch.result.tag > 1"));
        assert!(!eval("fetch.result.tag < 'zzz'"));
    }

    #[test]
    fn truthiness() {
        assert!(eval("fetch.result.ok"));
        assert!(!eval("fetch.result.items"));
        assert!(!eval("fetch.result.name"));
        assert!(eval("!fetch.result.items"));
    }

    #[test]
    fn boolean_connectives_and_grouping() {
        assert!(eval("fetch.result.ok && fetch.result.status == 200"));
        assert!(!eval("fetch.result.ok && fetch.result.status == 500"));
        assert!(eval("fetch.result.status == 500 || fetch.result.tag == 'beta'"));
        assert!(eval("!(fetch.result.status == 500) && (true || false)"));
    }

    #[test]
    fn brackets_index_sequences_and_odd_keys() {
        assert!(eval("fetch.result.list[1] == 'y'"));
        assert!(eval("fetch.result.headers['content-type'] == 'application/json'"));
        let condition = Condition::parse("fetch.result.list[0]").unwrap();
        assert_eq!(condition.paths()[0].as_str(), "fetch.result.list.0");
    }

    #[test]
    fn or_short_circuits_before_unresolved_path() {
        assert!(eval("fetch.result.ok || later.result.value"));
    }

    #[test]
    fn unsupported_constructs_fail_closed() {
        for source in [
            "fetch.result.status + 1 == 201",
            "'beta' in fetch.result.list",
            "fetch.result.tag|upper == 'BETA'",
            "!(fetch.result.status * 2 == 400)",
            "fetch.result.ok || fetch.result.status % 2",
            "fetch.result.list[fetch.result.status] == 'x'",
        ] {
            let condition = Condition::parse(source).unwrap();
            assert!(!condition.is_supported(), "{source}");
            assert!(!condition.evaluate(&ctx()).unwrap(), "{source}");
        }
    }

    #[test]
    fn malformed_conditions() {
        assert_eq!(Condition::parse("   ").unwrap_err(), ConditionError::Empty);
        for source in [
            "(fetch.result.ok",
            "fetch.result.ok)",
            "fetch.result.tag == 'beta",
            "fetch.result.status ==",
            "fetch.result.ok &&",
            "fetch.result.ok fetch.result.ok",
            "fetch.result.a # 1",
            "fetch.result.status = 200",
        ] {
            assert!(
                matches!(Condition::parse(source), Err(ConditionError::Syntax(_))),
                "{source}"
            );
        }
        assert!(matches!(
            Condition::parse("fetch.status == 1").unwrap_err(),
            ConditionError::InvalidPath(_)
        ));
    }

    #[test]
    fn unresolved_path_is_error() {
        let condition = Condition::parse("later.result.value == 1").unwrap();
        assert!(matches!(
            condition.evaluate(&ctx()).unwrap_err(),
            ResolutionError::UnknownStep { .. }
        ));
    }

    #[test]
    fn collects_paths() {
        let condition =
            Condition::parse("a.result.x == 1 && (!b.result || inputs.flag) && c.result.y > 2").unwrap();
        let paths: Vec<&str> = condition.paths().iter().map(|p| p.as_str()).collect();
        assert_eq!(paths, vec!["a.result.x", "b.result", "inputs.flag", "c.result.y"]);
    }

    #[test]
    fn named_syntax_for_chain_scopes() {
        let scope = StepValue::from(json!({"output": {"score": 0.8}, "agent": {"id": "writer"}}));
        let condition = Condition::parse_named("output.score > 0.5 && agent.id == 'writer'").unwrap();
        assert!(condition.evaluate(&scope).unwrap());
    }

    #[test]
    fn literal_keywords() {
        assert!(eval("true"));
        assert!(!eval("false"));
        assert!(!eval("null"));
        assert!(eval("null == null"));
    }

    #[test]
    fn evaluate_condition_helper() {
        assert!(evaluate_condition("fetch.result.status == 200", &ctx()).unwrap());
        assert!(matches!(
            evaluate_condition("(", &ctx()).unwrap_err(),
            EvaluateError::Malformed(_)
        ));
    }
}
