//! The polymorphic infix operator family.
//!
//! One implementation serves every operator name: the arithmetic group
//! (`+ - * /`), the comparison group (`== != < > <= >=`) and the boolean
//! group (`and or not`). String interpolation lowers to the `+` operator,
//! so string concatenation lives here too.

use crate::{
    ast::{ExprId, Node},
    errors::{LangError, LangResult},
    funcs::{BuiltFunc, FuncInfo},
    span::SrcSpan,
    types::Type,
    unify::Invariant,
    value::Value,
};

/// Every operator name the default registry exposes.
pub const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "==", "!=", "<", ">", "<=", ">=", "and", "or", "not",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpGroup {
    /// `a op b` where both sides and the result share one type.
    Arith,
    /// `a op b -> bool` over any comparable type.
    Cmp,
    /// `a op b -> bool` over ordered types.
    Ord,
    /// Boolean connectives.
    Logic,
    /// Unary boolean negation.
    Not,
}

fn group_of(op: &str) -> OpGroup {
    match op {
        "+" | "-" | "*" | "/" => OpGroup::Arith,
        "==" | "!=" => OpGroup::Cmp,
        "<" | ">" | "<=" | ">=" => OpGroup::Ord,
        "and" | "or" => OpGroup::Logic,
        "not" => OpGroup::Not,
        _ => unreachable!("unknown operator `{op}`"),
    }
}

/// A single operator instance; `build` pins it to one monomorphic type.
#[derive(Debug, Clone)]
pub struct OperatorFunc {
    op: String,
    built: Option<Type>,
}

impl OperatorFunc {
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            built: None,
        }
    }

    fn operand_ok(&self, t: &Type) -> bool {
        match group_of(&self.op) {
            OpGroup::Arith => {
                matches!(t, Type::Int | Type::Float) || (self.op == "+" && matches!(t, Type::Str))
            }
            OpGroup::Cmp => matches!(t, Type::Bool | Type::Str | Type::Int | Type::Float),
            OpGroup::Ord => matches!(t, Type::Str | Type::Int | Type::Float),
            OpGroup::Logic | OpGroup::Not => matches!(t, Type::Bool),
        }
    }
}

impl BuiltFunc for OperatorFunc {
    fn info(&self) -> FuncInfo {
        FuncInfo {
            pure: true,
            memo: true,
            sig: self.built.clone(),
            err: None,
        }
    }

    fn build(&mut self, typ: &Type) -> LangResult<Type> {
        let span = SrcSpan::default();
        let Type::Func { args, ret } = typ else {
            return Err(LangError::type_error(
                format!("operator `{}` built with non-function type `{typ}`", self.op),
                span,
            ));
        };
        let expected_arity = if group_of(&self.op) == OpGroup::Not { 1 } else { 2 };
        if args.len() != expected_arity {
            return Err(LangError::type_error(
                format!("operator `{}` takes {expected_arity} arguments, got {}", self.op, args.len()),
                span,
            ));
        }
        let operand = &args[0].1;
        if !operand.is_ground() || !self.operand_ok(operand) {
            return Err(LangError::type_error(
                format!("operator `{}` is not defined over `{operand}`", self.op),
                span,
            ));
        }
        if args.iter().any(|(_, t)| !t.cmp(operand)) {
            return Err(LangError::type_error(
                format!("operator `{}` operands must share one type", self.op),
                span,
            ));
        }
        let expected_ret = match group_of(&self.op) {
            OpGroup::Arith => operand.clone(),
            _ => Type::Bool,
        };
        if !ret.cmp(&expected_ret) {
            return Err(LangError::type_error(
                format!("operator `{}` returns `{expected_ret}`, not `{ret}`", self.op),
                span,
            ));
        }
        self.built = Some(typ.clone());
        Ok(typ.clone())
    }

    fn call(&self, args: &[Value]) -> LangResult<Value> {
        let span = SrcSpan::default();
        let bug = || LangError::graph(format!("operator `{}` on incompatible values", self.op), span);
        match self.op.as_str() {
            "+" => match args {
                [Value::Str(a), Value::Str(b)] => Ok(Value::Str(format!("{a}{b}"))),
                [Value::Int(a), Value::Int(b)] => a.checked_add(*b).map(Value::Int).ok_or_else(|| {
                    LangError::graph("integer overflow in `+`", span)
                }),
                [Value::Float(a), Value::Float(b)] => Ok(Value::Float(a + b)),
                _ => Err(bug()),
            },
            "-" => match args {
                [Value::Int(a), Value::Int(b)] => a
                    .checked_sub(*b)
                    .map(Value::Int)
                    .ok_or_else(|| LangError::graph("integer overflow in `-`", span)),
                [Value::Float(a), Value::Float(b)] => Ok(Value::Float(a - b)),
                _ => Err(bug()),
            },
            "*" => match args {
                [Value::Int(a), Value::Int(b)] => a
                    .checked_mul(*b)
                    .map(Value::Int)
                    .ok_or_else(|| LangError::graph("integer overflow in `*`", span)),
                [Value::Float(a), Value::Float(b)] => Ok(Value::Float(a * b)),
                _ => Err(bug()),
            },
            "/" => match args {
                [Value::Int(a), Value::Int(b)] => {
                    if *b == 0 {
                        Err(LangError::graph("division by zero", span))
                    } else {
                        Ok(Value::Int(a / b))
                    }
                }
                [Value::Float(a), Value::Float(b)] => Ok(Value::Float(a / b)),
                _ => Err(bug()),
            },
            "==" => two(args).map(|(a, b)| Value::Bool(a == b)).ok_or_else(bug),
            "!=" => two(args).map(|(a, b)| Value::Bool(a != b)).ok_or_else(bug),
            "<" | ">" | "<=" | ">=" => {
                let (a, b) = two(args).ok_or_else(bug)?;
                let ord = compare(a, b).ok_or_else(bug)?;
                let keep = match self.op.as_str() {
                    "<" => ord.is_lt(),
                    ">" => ord.is_gt(),
                    "<=" => ord.is_le(),
                    _ => ord.is_ge(),
                };
                Ok(Value::Bool(keep))
            }
            "and" => match args {
                [Value::Bool(a), Value::Bool(b)] => Ok(Value::Bool(*a && *b)),
                _ => Err(bug()),
            },
            "or" => match args {
                [Value::Bool(a), Value::Bool(b)] => Ok(Value::Bool(*a || *b)),
                _ => Err(bug()),
            },
            "not" => match args {
                [Value::Bool(a)] => Ok(Value::Bool(!*a)),
                _ => Err(bug()),
            },
            other => Err(LangError::graph(format!("unknown operator `{other}`"), span)),
        }
    }

    /// Relates the call site's argument and return variables so the solver
    /// can pick one operand type: all operands unify with the first, and
    /// non-arithmetic operators return `bool`.
    fn func_infer(&self, partial: &Type, node: ExprId) -> Option<(Type, Vec<Invariant>)> {
        let Type::Func { args, ret } = partial else {
            return None;
        };
        let expected_arity = if group_of(&self.op) == OpGroup::Not { 1 } else { 2 };
        if args.len() != expected_arity {
            return None;
        }
        let operand = args[0].1.clone();
        let mut invariants = Vec::new();
        for (_, t) in &args[1..] {
            invariants.push(Invariant {
                node: Node::Expr(node),
                expr: node,
                expect: operand.clone(),
                actual: t.clone(),
            });
        }
        let ret_type = match group_of(&self.op) {
            OpGroup::Arith => operand.clone(),
            OpGroup::Logic | OpGroup::Not => {
                invariants.push(Invariant {
                    node: Node::Expr(node),
                    expr: node,
                    expect: Type::Bool,
                    actual: operand.clone(),
                });
                Type::Bool
            }
            _ => Type::Bool,
        };
        invariants.push(Invariant {
            node: Node::Expr(node),
            expr: node,
            expect: ret_type.clone(),
            actual: (**ret).clone(),
        });
        let sig = Type::Func {
            args: args.clone(),
            ret: Box::new(ret_type),
        };
        Some((sig, invariants))
    }

    fn arg_name(&self, i: usize) -> Option<String> {
        match (group_of(&self.op), i) {
            (OpGroup::Not, 0) => Some("a".to_owned()),
            (_, 0) => Some("a".to_owned()),
            (_, 1) => Some("b".to_owned()),
            _ => None,
        }
    }

    fn copy_func(&self) -> Box<dyn BuiltFunc> {
        Box::new(self.clone())
    }
}

fn two(args: &[Value]) -> Option<(&Value, &Value)> {
    match args {
        [a, b] => Some((a, b)),
        _ => None,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

macro_rules! op_factories {
    ($($name:ident => $op:literal),* $(,)?) => {
        $(fn $name() -> Box<dyn BuiltFunc> {
            Box::new(OperatorFunc::new($op))
        })*

        /// Factory for one operator name from [`OPERATORS`].
        pub fn factory_for(op: &str) -> crate::funcs::FuncFactory {
            match op {
                $($op => $name,)*
                other => unreachable!("unknown operator `{other}`"),
            }
        }
    };
}

op_factories! {
    op_add => "+",
    op_sub => "-",
    op_mul => "*",
    op_div => "/",
    op_eq => "==",
    op_ne => "!=",
    op_lt => "<",
    op_gt => ">",
    op_le => "<=",
    op_ge => ">=",
    op_and => "and",
    op_or => "or",
    op_not => "not",
}
