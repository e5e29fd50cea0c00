//! Lowering from `hcl-rs` syntax trees into the engine's own expression and block types.
//!
//! Parsing itself is done by `hcl::from_str`. Everything here is structural: no expression is
//! evaluated while lowering.
use anyhow::{anyhow, bail, Context, Result};
use hcl::expr::{BinaryOperator, Operation, TemplateExpr, TraversalOperator, UnaryOperator};
use hcl::template::{Element, Template};
use hcl::{Block, Structure};
use indexmap::IndexMap;
use log::debug;

use crate::frontend::ast::{
    BinaryOp, Body, Expr, ForExpr, NestedBlock, OutputBlock, ResourceBlock, ResourceMode,
    SplatOp, TemplatePart, UnaryOp, Validation, VariableBlock,
};
use crate::value::{Value, ValueType};

/// One top-level declaration found in a file.
#[derive(Debug, Clone)]
pub enum Declaration {
    Variable(VariableBlock),
    Local(String, Expr),
    Resource(ResourceBlock),
    Output(OutputBlock),
}

impl Declaration {
    pub fn address(&self) -> String {
        match self {
            Declaration::Variable(v) => format!("var.{}", v.name),
            Declaration::Local(name, _) => format!("local.{name}"),
            Declaration::Resource(r) => r.address(),
            Declaration::Output(o) => format!("output.{}", o.name),
        }
    }
}

/// Lower every top-level block of a parsed file, in file order.
pub fn lower_file(body: &hcl::Body) -> Result<Vec<Declaration>> {
    let mut out = Vec::new();
    for structure in body.iter() {
        let block = match structure {
            Structure::Block(block) => block,
            Structure::Attribute(attr) => {
                bail!("unexpected top-level attribute '{}'", attr.key())
            }
        };
        match block.identifier() {
            "variable" => out.push(Declaration::Variable(lower_variable(block)?)),
            "locals" => {
                for attr in block.body().attributes() {
                    let expr = lower_expr(attr.expr())
                        .with_context(|| format!("in local '{}'", attr.key()))?;
                    out.push(Declaration::Local(attr.key().to_string(), expr));
                }
            }
            "resource" => out.push(Declaration::Resource(lower_resource(
                block,
                ResourceMode::Managed,
            )?)),
            "data" => out.push(Declaration::Resource(lower_resource(
                block,
                ResourceMode::Data,
            )?)),
            "output" => out.push(Declaration::Output(lower_output(block)?)),
            "terraform" | "provider" => {
                debug!("ignoring '{}' block", block.identifier());
            }
            "module" => bail!("module blocks are not supported"),
            other => bail!("unsupported top-level block '{other}'"),
        }
    }
    Ok(out)
}

fn label(block: &Block, idx: usize, what: &str) -> Result<String> {
    block
        .labels()
        .get(idx)
        .map(|l| l.as_str().to_string())
        .ok_or_else(|| anyhow!("{} block missing {what} label", block.identifier()))
}

fn literal_string(expr: &hcl::Expression, what: &str) -> Result<String> {
    match expr {
        hcl::Expression::String(s) => Ok(s.clone()),
        hcl::Expression::TemplateExpr(t) => {
            let tpl = Template::from_expr(t as &TemplateExpr)?;
            let mut out = String::new();
            for el in tpl.elements() {
                match el {
                    Element::Literal(s) => out.push_str(s),
                    _ => bail!("{what} must be a literal string"),
                }
            }
            Ok(out)
        }
        _ => bail!("{what} must be a literal string"),
    }
}

fn literal_bool(expr: &hcl::Expression, what: &str) -> Result<bool> {
    match expr {
        hcl::Expression::Bool(b) => Ok(*b),
        _ => bail!("{what} must be true or false"),
    }
}

fn lower_variable(block: &Block) -> Result<VariableBlock> {
    let name = label(block, 0, "name")?;
    let mut var = VariableBlock {
        name: name.clone(),
        ty: None,
        default: None,
        description: None,
        sensitive: false,
        nullable: true,
        validations: Vec::new(),
    };
    for attr in block.body().attributes() {
        let expr = attr.expr();
        match attr.key() {
            "type" => {
                let text = match expr {
                    hcl::Expression::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let ty: ValueType = text
                    .parse()
                    .map_err(|e: String| anyhow!(e))
                    .with_context(|| format!("parsing type for variable '{name}'"))?;
                var.ty = Some(ty);
            }
            "default" => var.default = Some(lower_expr(expr)?),
            "description" => var.description = Some(literal_string(expr, "description")?),
            "sensitive" => var.sensitive = literal_bool(expr, "sensitive")?,
            "nullable" => var.nullable = literal_bool(expr, "nullable")?,
            other => bail!("unsupported attribute '{other}' in variable '{name}'"),
        }
    }
    for vblk in block.body().blocks() {
        if vblk.identifier() != "validation" {
            bail!(
                "unsupported block '{}' in variable '{name}'",
                vblk.identifier()
            );
        }
        let find = |key: &str| {
            vblk.body()
                .attributes()
                .find(|a| a.key() == key)
                .ok_or_else(|| anyhow!("validation block in variable '{name}' missing '{key}'"))
        };
        var.validations.push(Validation {
            condition: lower_expr(find("condition")?.expr())?,
            error_message: lower_expr(find("error_message")?.expr())?,
        });
    }
    Ok(var)
}

fn lower_output(block: &Block) -> Result<OutputBlock> {
    let name = label(block, 0, "name")?;
    let mut value = None;
    let mut description = None;
    let mut sensitive = false;
    for attr in block.body().attributes() {
        match attr.key() {
            "value" => {
                value = Some(
                    lower_expr(attr.expr()).with_context(|| format!("in output '{name}'"))?,
                )
            }
            "description" => description = Some(literal_string(attr.expr(), "description")?),
            "sensitive" => sensitive = literal_bool(attr.expr(), "sensitive")?,
            "depends_on" => {}
            other => bail!("unsupported attribute '{other}' in output '{name}'"),
        }
    }
    let value = value.ok_or_else(|| anyhow!("output '{name}' missing 'value'"))?;
    Ok(OutputBlock {
        name,
        value,
        description,
        sensitive,
    })
}

fn lower_resource(block: &Block, mode: ResourceMode) -> Result<ResourceBlock> {
    let resource_type = label(block, 0, "type")?;
    let name = label(block, 1, "name")?;
    let mut res = ResourceBlock {
        mode,
        resource_type,
        name,
        count: None,
        for_each: None,
        depends_on: Vec::new(),
        body: Body::default(),
    };
    let addr = res.address();
    for structure in block.body().iter() {
        match structure {
            Structure::Attribute(attr) => match attr.key() {
                "count" => res.count = Some(lower_expr(attr.expr())?),
                "for_each" => res.for_each = Some(lower_expr(attr.expr())?),
                "depends_on" => match attr.expr() {
                    hcl::Expression::Array(items) => {
                        res.depends_on = items.iter().map(lower_expr).collect::<Result<_>>()?
                    }
                    _ => bail!("depends_on in '{addr}' must be a list of references"),
                },
                "provider" => {}
                key => {
                    let expr = lower_expr(attr.expr())
                        .with_context(|| format!("in attribute '{key}' of '{addr}'"))?;
                    res.body.attributes.insert(key.to_string(), expr);
                }
            },
            Structure::Block(nested) if nested.identifier() == "lifecycle" => {}
            Structure::Block(nested) => res
                .body
                .blocks
                .push(lower_nested(nested).with_context(|| format!("in '{addr}'"))?),
        }
    }
    Ok(res)
}

fn lower_body(body: &hcl::Body) -> Result<Body> {
    let mut attributes = IndexMap::new();
    let mut blocks = Vec::new();
    for structure in body.iter() {
        match structure {
            Structure::Attribute(attr) => {
                attributes.insert(attr.key().to_string(), lower_expr(attr.expr())?);
            }
            Structure::Block(block) => blocks.push(lower_nested(block)?),
        }
    }
    Ok(Body { attributes, blocks })
}

fn lower_nested(block: &Block) -> Result<NestedBlock> {
    if block.identifier() != "dynamic" {
        return Ok(NestedBlock::Static {
            kind: block.identifier().to_string(),
            body: lower_body(block.body())?,
        });
    }
    let kind = label(block, 0, "type")?;
    let mut for_each = None;
    let mut iterator = kind.clone();
    for attr in block.body().attributes() {
        match attr.key() {
            "for_each" => for_each = Some(lower_expr(attr.expr())?),
            "iterator" => match attr.expr() {
                hcl::Expression::Variable(v) => iterator = v.as_str().to_string(),
                other => iterator = literal_string(other, "iterator")?,
            },
            other => bail!("unsupported attribute '{other}' in dynamic \"{kind}\""),
        }
    }
    let for_each = for_each.ok_or_else(|| anyhow!("dynamic \"{kind}\" missing for_each"))?;
    let content = block
        .body()
        .blocks()
        .find(|b| b.identifier() == "content")
        .ok_or_else(|| anyhow!("dynamic \"{kind}\" missing content block"))?;
    Ok(NestedBlock::Dynamic {
        kind,
        for_each,
        iterator,
        content: lower_body(content.body())?,
    })
}

/// Lower a single `hcl-rs` expression.
pub fn lower_expr(expr: &hcl::Expression) -> Result<Expr> {
    Ok(match expr {
        hcl::Expression::Null => Expr::Literal(Value::Null),
        hcl::Expression::Bool(b) => Expr::Literal(Value::Bool(*b)),
        hcl::Expression::Number(n) => Expr::Literal(Value::Number(
            n.as_f64()
                .ok_or_else(|| anyhow!("number {n} is not representable"))?,
        )),
        hcl::Expression::String(s) => Expr::Literal(Value::String(s.clone())),
        hcl::Expression::Array(items) => {
            Expr::List(items.iter().map(lower_expr).collect::<Result<_>>()?)
        }
        hcl::Expression::Object(obj) => {
            let mut entries = Vec::with_capacity(obj.len());
            for (key, value) in obj.iter() {
                entries.push((lower_object_key(key)?, lower_expr(value)?));
            }
            Expr::Map(entries)
        }
        hcl::Expression::TemplateExpr(t) => lower_template(t)?,
        hcl::Expression::Variable(v) => Expr::Reference(vec![v.as_str().to_string()]),
        hcl::Expression::Traversal(tr) => lower_traversal(&tr.expr, &tr.operators)?,
        hcl::Expression::FuncCall(call) => Expr::FunctionCall {
            name: call.name.to_string(),
            args: call.args.iter().map(lower_expr).collect::<Result<_>>()?,
            expand_final: call.expand_final,
        },
        hcl::Expression::Parenthesis(inner) => lower_expr(inner)?,
        hcl::Expression::Conditional(c) => Expr::Conditional {
            cond: Box::new(lower_expr(&c.cond_expr)?),
            true_expr: Box::new(lower_expr(&c.true_expr)?),
            false_expr: Box::new(lower_expr(&c.false_expr)?),
        },
        hcl::Expression::Operation(op) => match op.as_ref() {
            Operation::Unary(u) => Expr::Unary {
                op: match u.operator {
                    UnaryOperator::Not => UnaryOp::Not,
                    UnaryOperator::Neg => UnaryOp::Neg,
                },
                expr: Box::new(lower_expr(&u.expr)?),
            },
            Operation::Binary(b) => Expr::Binary {
                op: lower_binary_op(b.operator),
                lhs: Box::new(lower_expr(&b.lhs_expr)?),
                rhs: Box::new(lower_expr(&b.rhs_expr)?),
            },
        },
        hcl::Expression::ForExpr(fe) => Expr::For(Box::new(ForExpr {
            key_var: fe.key_var.as_ref().map(|k| k.as_str().to_string()),
            value_var: fe.value_var.as_str().to_string(),
            collection: lower_expr(&fe.collection_expr)?,
            key_expr: fe.key_expr.as_ref().map(lower_expr).transpose()?,
            value_expr: lower_expr(&fe.value_expr)?,
            cond: fe.cond_expr.as_ref().map(lower_expr).transpose()?,
            grouping: fe.grouping,
        })),
        #[allow(unreachable_patterns)]
        other => bail!("unsupported expression: {other:?}"),
    })
}

fn lower_binary_op(op: BinaryOperator) -> BinaryOp {
    match op {
        BinaryOperator::Eq => BinaryOp::Eq,
        BinaryOperator::NotEq => BinaryOp::NotEq,
        BinaryOperator::Less => BinaryOp::Less,
        BinaryOperator::LessEq => BinaryOp::LessEq,
        BinaryOperator::Greater => BinaryOp::Greater,
        BinaryOperator::GreaterEq => BinaryOp::GreaterEq,
        BinaryOperator::Plus => BinaryOp::Add,
        BinaryOperator::Minus => BinaryOp::Sub,
        BinaryOperator::Mul => BinaryOp::Mul,
        BinaryOperator::Div => BinaryOp::Div,
        BinaryOperator::Mod => BinaryOp::Mod,
        BinaryOperator::And => BinaryOp::And,
        BinaryOperator::Or => BinaryOp::Or,
    }
}

fn lower_object_key(key: &hcl::ObjectKey) -> Result<Expr> {
    #[allow(unreachable_patterns)]
    match key {
        hcl::ObjectKey::Identifier(id) => Ok(Expr::Literal(Value::String(id.as_str().to_string()))),
        // A bare word key such as `{ Name = ... }` parses as a variable expression.
        hcl::ObjectKey::Expression(hcl::Expression::Variable(v)) => {
            Ok(Expr::Literal(Value::String(v.as_str().to_string())))
        }
        hcl::ObjectKey::Expression(e) => lower_expr(e),
        other => bail!("unsupported object key: {other:?}"),
    }
}

fn lower_template(t: &TemplateExpr) -> Result<Expr> {
    let tpl = Template::from_expr(t)?;
    let mut parts = Vec::new();
    for el in tpl.elements() {
        match el {
            Element::Literal(s) => parts.push(TemplatePart::Literal(s.clone())),
            Element::Interpolation(ip) => parts.push(TemplatePart::Interpolation(lower_expr(&ip.expr)?)),
            Element::Directive(_) => bail!("template directives (%{{ if }}, %{{ for }}) are not supported"),
        }
    }
    // A template with no interpolation is a plain string.
    match parts.as_slice() {
        [] => Ok(Expr::Literal(Value::String(String::new()))),
        [TemplatePart::Literal(s)] => Ok(Expr::Literal(Value::String(s.clone()))),
        _ => Ok(Expr::Template(parts)),
    }
}

fn lower_traversal(root: &hcl::Expression, operators: &[TraversalOperator]) -> Result<Expr> {
    let mut current = match root {
        hcl::Expression::Variable(v) => Expr::Reference(vec![v.as_str().to_string()]),
        other => lower_expr(other)?,
    };
    let mut ops = operators.iter().peekable();
    while let Some(op) = ops.next() {
        current = match op {
            TraversalOperator::GetAttr(name) => match current {
                Expr::Reference(mut path) => {
                    path.push(name.as_str().to_string());
                    Expr::Reference(path)
                }
                other => Expr::GetAttr {
                    expr: Box::new(other),
                    name: name.as_str().to_string(),
                },
            },
            TraversalOperator::Index(key) => Expr::Index {
                expr: Box::new(current),
                key: Box::new(lower_expr(key)?),
            },
            TraversalOperator::LegacyIndex(n) => Expr::Index {
                expr: Box::new(current),
                key: Box::new(Expr::Literal(Value::from(*n as i64))),
            },
            TraversalOperator::FullSplat | TraversalOperator::AttrSplat => {
                // `.*` only carries the attribute accesses that follow it; `[*]` carries
                // indexes too. Either stops at the next splat, which then applies to the result.
                let full = matches!(op, TraversalOperator::FullSplat);
                let mut each = Vec::new();
                while let Some(next) = ops.peek() {
                    match next {
                        TraversalOperator::GetAttr(name) => {
                            each.push(SplatOp::GetAttr(name.as_str().to_string()))
                        }
                        TraversalOperator::Index(key) if full => {
                            each.push(SplatOp::Index(lower_expr(key)?))
                        }
                        TraversalOperator::LegacyIndex(n) if full => {
                            each.push(SplatOp::Index(Expr::Literal(Value::from(*n as i64))))
                        }
                        _ => break,
                    }
                    ops.next();
                }
                Expr::Splat {
                    expr: Box::new(current),
                    each,
                }
            }
            #[allow(unreachable_patterns)]
            _ => bail!("unsupported traversal operator"),
        };
    }
    Ok(current)
}

/// Parse and lower a standalone expression, e.g. a `--var` value.
pub fn parse_expr(src: &str) -> Result<Expr> {
    let expr: hcl::Expression = src
        .parse()
        .with_context(|| format!("parsing expression `{src}`"))?;
    lower_expr(&expr)
}
