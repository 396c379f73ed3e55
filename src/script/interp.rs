// Operation interpreter - executes one compiled Operation per dispatch
// Errors here are per-operation: the scheduler logs them and moves on,
// they never abort the sequencer or leak across sequencers

use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use super::op::{BinaryOp, Expr, Operation, UnaryOp};
use super::value::Value;
use crate::stage::{SPRITE_SLOTS, StageBackend, StageError};

/// Operation-execution failure. Logged with sequencer id, program counter
/// and command kind; execution continues at the next operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("type mismatch: expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),
    #[error("division by zero")]
    DivideByZero,
    #[error("sprite slot {0} out of range")]
    SlotOutOfRange(i64),
}

/// Execution context for one operation: the sequencer's locals shadowing
/// the shared globals, the stage collaborator, and the wait request armed
/// during this dispatch (if any).
pub struct ExecCtx<'a> {
    pub locals: &'a mut HashMap<String, Value>,
    pub globals: &'a mut HashMap<String, Value>,
    pub stage: &'a mut dyn StageBackend,
    /// Steps requested by a `Wait` executed this dispatch; always > 0.
    pub pending_wait: Option<u64>,
}

impl ExecCtx<'_> {
    fn read(&self, name: &str) -> Result<Value, ExecError> {
        self.locals
            .get(name)
            .or_else(|| self.globals.get(name))
            .cloned()
            .ok_or_else(|| ExecError::UndefinedVariable(name.to_string()))
    }

    /// Writes through to a local binding if one exists (for-loop counters),
    /// otherwise to the shared global store.
    fn write(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.locals.get_mut(name) {
            *slot = value;
        } else {
            self.globals.insert(name.to_string(), value);
        }
    }

    fn write_local(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_string(), value);
    }
}

/// Execute one operation. If/for bodies run inline within this dispatch;
/// a nested `Wait` arms the counter but does not cut the body short.
pub fn execute(ctx: &mut ExecCtx<'_>, op: &Operation) -> Result<(), ExecError> {
    match op {
        Operation::Wait(steps) => {
            let n = int_arg(ctx, steps)?;
            if n > 0 {
                ctx.pending_wait = Some(n as u64);
            }
        }
        Operation::Set { name, value } => {
            let v = eval(ctx, value)?;
            ctx.write(name, v);
        }
        Operation::Print(expr) => {
            let v = eval(ctx, expr)?;
            ctx.stage.print(&v.to_string());
        }
        Operation::If {
            cond,
            then_body,
            else_body,
        } => {
            let body = if eval(ctx, cond)?.is_truthy() {
                then_body
            } else {
                else_body
            };
            for nested in body {
                execute(ctx, nested)?;
            }
        }
        Operation::For {
            var,
            from,
            to,
            body,
        } => {
            let from = int_arg(ctx, from)?;
            let to = int_arg(ctx, to)?;
            for i in from..=to {
                ctx.write_local(var, Value::Int(i));
                for nested in body {
                    execute(ctx, nested)?;
                }
            }
        }
        Operation::OpenWindow { width, height } => {
            let w = int_arg(ctx, width)?.clamp(0, u32::MAX as i64) as u32;
            let h = int_arg(ctx, height)?.clamp(0, u32::MAX as i64) as u32;
            ctx.stage.open_window(w, h);
        }
        Operation::LoadImage { slot, path } => {
            let slot = slot_arg(ctx, slot)?;
            let path = str_arg(ctx, path)?;
            // Missing asset is a sentinel, not an engine error: the slot
            // stays empty and the script keeps running.
            if let Err(StageError::ResourceUnavailable(p)) = ctx.stage.load_image(slot, &path) {
                debug!("image `{}` unavailable, slot {} left empty", p, slot);
            }
        }
        Operation::MoveSprite { slot, x, y } => {
            let slot = slot_arg(ctx, slot)?;
            let x = int_arg(ctx, x)?;
            let y = int_arg(ctx, y)?;
            ctx.stage.move_sprite(slot, x, y);
        }
        Operation::ShowSprite { slot, visible } => {
            let slot = slot_arg(ctx, slot)?;
            let visible = eval(ctx, visible)?.is_truthy();
            ctx.stage.show_sprite(slot, visible);
        }
    }
    Ok(())
}

/// Evaluate an argument expression against the current scopes.
pub fn eval(ctx: &ExecCtx<'_>, expr: &Expr) -> Result<Value, ExecError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => ctx.read(name),
        Expr::Unary { op, operand } => {
            let v = eval(ctx, operand)?;
            eval_unary(*op, v)
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(ctx, lhs)?;
            // Short-circuit before evaluating the right-hand side
            match op {
                BinaryOp::And if !l.is_truthy() => return Ok(Value::Bool(false)),
                BinaryOp::Or if l.is_truthy() => return Ok(Value::Bool(true)),
                _ => {}
            }
            let r = eval(ctx, rhs)?;
            eval_binary(*op, l, r)
        }
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> Result<Value, ExecError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
        UnaryOp::Neg => match v {
            Value::Int(n) => Ok(Value::Int(-n)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(type_mismatch("number", &other)),
        },
    }
}

fn eval_binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, ExecError> {
    match op {
        BinaryOp::Add => match (&l, &r) {
            (Value::Str(a), b) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            _ => numeric(op, &l, &r, |a, b| a + b),
        },
        BinaryOp::Sub => match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
            _ => numeric(op, &l, &r, |a, b| a - b),
        },
        BinaryOp::Mul => match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
            _ => numeric(op, &l, &r, |a, b| a * b),
        },
        BinaryOp::Div => match (&l, &r) {
            (Value::Int(_), Value::Int(0)) => Err(ExecError::DivideByZero),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(*b))),
            _ => numeric(op, &l, &r, |a, b| a / b),
        },
        BinaryOp::Mod => match (&l, &r) {
            (Value::Int(_), Value::Int(0)) => Err(ExecError::DivideByZero),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_rem(*b))),
            _ => numeric(op, &l, &r, |a, b| a % b),
        },
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinaryOp::Lt => ordering(&l, &r, |o| o == std::cmp::Ordering::Less),
        BinaryOp::Le => ordering(&l, &r, |o| o != std::cmp::Ordering::Greater),
        BinaryOp::Gt => ordering(&l, &r, |o| o == std::cmp::Ordering::Greater),
        BinaryOp::Ge => ordering(&l, &r, |o| o != std::cmp::Ordering::Less),
        // Operands already truthiness-checked by the short-circuit path
        BinaryOp::And => Ok(Value::Bool(r.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(r.is_truthy())),
    }
}

fn numeric(
    _op: BinaryOp,
    l: &Value,
    r: &Value,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, ExecError> {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(f(a, b))),
        (None, _) => Err(type_mismatch("number", l)),
        (_, None) => Err(type_mismatch("number", r)),
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Nil, Value::Nil) => true,
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn ordering(
    l: &Value,
    r: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, ExecError> {
    let ord = match (l, r) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => {
            let a = l.as_f64().ok_or_else(|| type_mismatch("number", l))?;
            let b = r.as_f64().ok_or_else(|| type_mismatch("number", r))?;
            a.partial_cmp(&b)
                .ok_or(ExecError::TypeMismatch {
                    expected: "number",
                    found: "nan",
                })?
        }
    };
    Ok(Value::Bool(accept(ord)))
}

fn type_mismatch(expected: &'static str, found: &Value) -> ExecError {
    ExecError::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

fn int_arg(ctx: &ExecCtx<'_>, expr: &Expr) -> Result<i64, ExecError> {
    let v = eval(ctx, expr)?;
    v.as_int().ok_or_else(|| type_mismatch("number", &v))
}

fn str_arg(ctx: &ExecCtx<'_>, expr: &Expr) -> Result<String, ExecError> {
    match eval(ctx, expr)? {
        Value::Str(s) => Ok(s),
        other => Err(type_mismatch("string", &other)),
    }
}

fn slot_arg(ctx: &ExecCtx<'_>, expr: &Expr) -> Result<usize, ExecError> {
    let n = int_arg(ctx, expr)?;
    if n < 0 || n as usize >= SPRITE_SLOTS {
        return Err(ExecError::SlotOutOfRange(n));
    }
    Ok(n as usize)
}
