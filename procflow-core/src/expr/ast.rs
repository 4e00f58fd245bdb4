use std::collections::BTreeSet;

use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(JsonValue),
    Var(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Size,
    IsEmpty,
    Contains,
    StartsWith,
    Matches,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "size" => Some(Function::Size),
            "isEmpty" => Some(Function::IsEmpty),
            "contains" => Some(Function::Contains),
            "startsWith" => Some(Function::StartsWith),
            "matches" => Some(Function::Matches),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Size => "size",
            Function::IsEmpty => "isEmpty",
            Function::Contains => "contains",
            Function::StartsWith => "startsWith",
            Function::Matches => "matches",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Size | Function::IsEmpty => 1,
            Function::Contains | Function::StartsWith | Function::Matches => 2,
        }
    }
}

impl Expr {
    /// Root variable names referenced anywhere in the expression.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Member(base, _) => base.collect_variables(out),
            Expr::Index(base, idx) => {
                base.collect_variables(out);
                idx.collect_variables(out);
            }
            Expr::Unary(_, e) => e.collect_variables(out),
            Expr::Binary(_, l, r) => {
                l.collect_variables(out);
                r.collect_variables(out);
            }
            Expr::Call(_, args) => {
                for a in args {
                    a.collect_variables(out);
                }
            }
        }
    }
}
