use core::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::eval::value::Value;
use crate::functions::FunctionDescriptor;

bitflags! {
    /// Static result-type hint used by validators at bind time.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct ReturnType: u8 {
        const BOOLEAN = 1 << 0;
        const NUMBER = 1 << 1;
        const STRING = 1 << 2;
        const ARRAY = 1 << 3;
        /// Unknown until evaluation; compatible with every expectation.
        const OBJECT = 1 << 4;
    }
}

impl ReturnType {
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Boolean(_) => ReturnType::BOOLEAN,
            Value::Integer(_) | Value::Float(_) => ReturnType::NUMBER,
            Value::String(_) => ReturnType::STRING,
            Value::List(_) => ReturnType::ARRAY,
            Value::Map(_) | Value::Null => ReturnType::OBJECT,
        }
    }

    pub fn accepts(self, actual: ReturnType) -> bool {
        actual.contains(ReturnType::OBJECT) || self.intersects(actual)
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = self
            .iter_names()
            .map(|(name, _)| name)
            .collect();
        write!(f, "{}", names.join("|").to_lowercase())
    }
}

// Parsed but not yet bound to the function table.
#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    Literal(Value),
    Path(String),
    Call { name: String, args: Vec<Syntax> },
    Template(Vec<TemplateSegment>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    Text(String),
    /// Raw source of an embedded `${...}` expression.
    Source(String),
}

/// Bound, validated expression tree. Immutable once built.
#[derive(Debug, Clone)]
pub enum Expression {
    Constant(Value),
    Accessor { path: String },
    FunctionCall {
        function: Arc<FunctionDescriptor>,
        args: Vec<Expression>,
    },
    Interpolation(Vec<TemplatePart>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expression(Expression),
}

impl Expression {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expression::Constant(value.into())
    }

    pub fn accessor(path: impl Into<String>) -> Self {
        Expression::Accessor { path: path.into() }
    }

    pub fn return_type(&self) -> ReturnType {
        match self {
            Expression::Constant(value) => ReturnType::of_value(value),
            Expression::Accessor { .. } => ReturnType::OBJECT,
            Expression::FunctionCall { function, .. } => function.return_type,
            Expression::Interpolation(_) => ReturnType::STRING,
        }
    }

    pub fn children(&self) -> &[Expression] {
        match self {
            Expression::FunctionCall { args, .. } => args,
            _ => &[],
        }
    }

    pub fn function_name(&self) -> Option<&str> {
        match self {
            Expression::FunctionCall { function, .. } => Some(&function.name),
            _ => None,
        }
    }

    /// Re-runs every static validator in the tree.
    pub fn validate_tree(&self) -> Result<(), crate::eval::EvalError> {
        match self {
            Expression::FunctionCall { function, args } => {
                args.iter().try_for_each(Expression::validate_tree)?;
                function.validate(self)
            }
            Expression::Interpolation(parts) => parts.iter().try_for_each(|part| match part {
                TemplatePart::Expression(expr) => expr.validate_tree(),
                TemplatePart::Text(_) => Ok(()),
            }),
            _ => Ok(()),
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expression::Constant(a), Expression::Constant(b)) => a == b,
            (Expression::Accessor { path: a }, Expression::Accessor { path: b }) => a == b,
            (
                Expression::FunctionCall { function: f1, args: a1 },
                Expression::FunctionCall { function: f2, args: a2 },
            ) => f1.name == f2.name && a1 == a2,
            (Expression::Interpolation(a), Expression::Interpolation(b)) => a == b,
            _ => false,
        }
    }
}

const INFIX: &[&str] = &[
    "+", "-", "*", "/", "%", "^", "&", "==", "!=", "<", "<=", ">", ">=", "&&", "||",
];

fn write_constant(f: &mut fmt::Formatter, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
        Value::Null => write!(f, "null"),
        other => write!(f, "{}", other.to_display_string()),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Constant(value) => write_constant(f, value),
            Expression::Accessor { path } => write!(f, "{}", path),
            Expression::FunctionCall { function, args } => {
                let name = function.name.as_str();
                match args.as_slice() {
                    [left, right] if INFIX.contains(&name) => {
                        write!(f, "({} {} {})", left, name, right)
                    }
                    [operand] if name == "!" => write!(f, "!{}", operand),
                    _ => {
                        write!(f, "{}(", name)?;
                        for (i, arg) in args.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", arg)?;
                        }
                        write!(f, ")")
                    }
                }
            }
            Expression::Interpolation(parts) => {
                write!(f, "`")?;
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => write!(f, "{}", text)?,
                        TemplatePart::Expression(expr) => write!(f, "${{{}}}", expr)?,
                    }
                }
                write!(f, "`")
            }
        }
    }
}
