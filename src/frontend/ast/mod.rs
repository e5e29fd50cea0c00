use indexmap::IndexMap;

use crate::value::{Value, ValueType};

/// Expression tree produced by lowering `hcl-rs` syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    /// Object constructor. Keys are expressions so `(var.name) = ...` works.
    Map(Vec<(Expr, Expr)>),
    /// A chain of names starting at a root, e.g. `var.names` or `aws_iam_user.example.name`.
    /// Which prefix forms the binding address is decided at resolution time.
    Reference(Vec<String>),
    GetAttr {
        expr: Box<Expr>,
        name: String,
    },
    Index {
        expr: Box<Expr>,
        key: Box<Expr>,
    },
    /// `expr[*].op...`: `each` is applied to every element of `expr`.
    Splat {
        expr: Box<Expr>,
        each: Vec<SplatOp>,
    },
    FunctionCall {
        name: String,
        args: Vec<Expr>,
        /// `f(list...)`: the final argument is spread into positional arguments.
        expand_final: bool,
    },
    Conditional {
        cond: Box<Expr>,
        true_expr: Box<Expr>,
        false_expr: Box<Expr>,
    },
    For(Box<ForExpr>),
    Template(Vec<TemplatePart>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn reference(path: &[&str]) -> Self {
        Expr::Reference(path.iter().map(|s| s.to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SplatOp {
    GetAttr(String),
    Index(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForExpr {
    pub key_var: Option<String>,
    pub value_var: String,
    pub collection: Expr,
    pub key_expr: Option<Expr>,
    pub value_expr: Expr,
    pub cond: Option<Expr>,
    /// `...` after the value: collect values sharing a key into lists.
    pub grouping: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
}

/// A whole configuration: every block from every loaded file.
///
/// Blocks are keyed by their address (`var.name`, `local.name`, `type.name`,
/// `data.type.name`, `output.name`) and kept in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub variables: IndexMap<String, VariableBlock>,
    pub locals: IndexMap<String, Expr>,
    pub data: IndexMap<String, ResourceBlock>,
    pub resources: IndexMap<String, ResourceBlock>,
    pub outputs: IndexMap<String, OutputBlock>,
}

/// A borrowed view of one block, as seen by the dependency graph and the engine.
#[derive(Debug, Clone, Copy)]
pub enum BlockRef<'a> {
    Variable(&'a VariableBlock),
    Local(&'a Expr),
    Resource(&'a ResourceBlock),
    Output(&'a OutputBlock),
}

impl Config {
    /// All blocks with their addresses: variables, locals, data sources, resources, outputs.
    pub fn blocks(&self) -> Vec<(String, BlockRef<'_>)> {
        let mut out = Vec::new();
        for (name, v) in &self.variables {
            out.push((format!("var.{name}"), BlockRef::Variable(v)));
        }
        for (name, e) in &self.locals {
            out.push((format!("local.{name}"), BlockRef::Local(e)));
        }
        for (addr, r) in self.data.iter().chain(self.resources.iter()) {
            out.push((addr.clone(), BlockRef::Resource(r)));
        }
        for (name, o) in &self.outputs {
            out.push((format!("output.{name}"), BlockRef::Output(o)));
        }
        out
    }

    pub fn resource(&self, address: &str) -> Option<&ResourceBlock> {
        self.resources
            .get(address)
            .or_else(|| self.data.get(address))
    }
}

#[derive(Debug, Clone)]
pub struct VariableBlock {
    pub name: String,
    pub ty: Option<ValueType>,
    pub default: Option<Expr>,
    pub description: Option<String>,
    pub sensitive: bool,
    pub nullable: bool,
    pub validations: Vec<Validation>,
}

#[derive(Debug, Clone)]
pub struct Validation {
    pub condition: Expr,
    pub error_message: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    Managed,
    Data,
}

#[derive(Debug, Clone)]
pub struct ResourceBlock {
    pub mode: ResourceMode,
    pub resource_type: String,
    pub name: String,
    pub count: Option<Expr>,
    pub for_each: Option<Expr>,
    pub depends_on: Vec<Expr>,
    pub body: Body,
}

impl ResourceBlock {
    pub fn address(&self) -> String {
        match self.mode {
            ResourceMode::Managed => format!("{}.{}", self.resource_type, self.name),
            ResourceMode::Data => format!("data.{}.{}", self.resource_type, self.name),
        }
    }
}

/// Attributes and nested blocks of a resource body or a nested block.
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub attributes: IndexMap<String, Expr>,
    pub blocks: Vec<NestedBlock>,
}

#[derive(Debug, Clone)]
pub enum NestedBlock {
    Static {
        kind: String,
        body: Body,
    },
    /// `dynamic "kind" { for_each = ..., iterator = ..., content { ... } }`
    Dynamic {
        kind: String,
        for_each: Expr,
        iterator: String,
        content: Body,
    },
}

#[derive(Debug, Clone)]
pub struct OutputBlock {
    pub name: String,
    pub value: Expr,
    pub description: Option<String>,
    pub sensitive: bool,
}
