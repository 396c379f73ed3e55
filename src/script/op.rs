// Compiled operations - the immutable op-sequence the compiler hands over
// One strongly-typed variant per command kind; nested expressions are
// recursive variants, compiled if/for bodies are nested operation lists

use super::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// An operation argument: literal, variable reference, or nested expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn int(n: i64) -> Self {
        Expr::Literal(Value::Int(n))
    }

    pub fn str(s: &str) -> Self {
        Expr::Literal(Value::Str(s.to_string()))
    }

    pub fn var(name: &str) -> Self {
        Expr::Var(name.to_string())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

/// One compiled script command.
///
/// Side-effecting variants delegate to the stage backend; `Wait` arms the
/// owning sequencer's suspension counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Suspend for N script steps (argument evaluated at execution time)
    Wait(Expr),
    /// Assign a variable (local if already bound locally, else global)
    Set { name: String, value: Expr },
    /// Print to the stage console
    Print(Expr),
    If {
        cond: Expr,
        then_body: Vec<Operation>,
        else_body: Vec<Operation>,
    },
    For {
        var: String,
        from: Expr,
        to: Expr,
        body: Vec<Operation>,
    },
    OpenWindow { width: Expr, height: Expr },
    LoadImage { slot: Expr, path: Expr },
    MoveSprite { slot: Expr, x: Expr, y: Expr },
    ShowSprite { slot: Expr, visible: Expr },
}

impl Operation {
    /// Command-kind name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Wait(_) => "wait",
            Operation::Set { .. } => "set",
            Operation::Print(_) => "print",
            Operation::If { .. } => "if",
            Operation::For { .. } => "for",
            Operation::OpenWindow { .. } => "open_window",
            Operation::LoadImage { .. } => "load_image",
            Operation::MoveSprite { .. } => "move_sprite",
            Operation::ShowSprite { .. } => "show_sprite",
        }
    }
}

/// An immutable, ordered op-sequence. Shared between sequencers via `Arc`,
/// so registration never copies the compiled body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OpSequence {
    ops: Vec<Operation>,
}

impl OpSequence {
    pub fn new(ops: Vec<Operation>) -> Arc<Self> {
        Arc::new(Self { ops })
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Operation> {
        self.ops.get(index)
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }
}
