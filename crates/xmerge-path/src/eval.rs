//! Query evaluation against an element tree.

use std::collections::{HashMap, HashSet};

use xmerge_dom::{escape_text, normalize_whitespace, to_xml_string, Attribute, Content, Element};

use crate::error::{PathError, PathResult};
use crate::parser::{parse, ArithOp, Axis, CompareOp, Expr, Function, NodeTest, Step};

/// One result of a query.
///
/// Node-set results yield node items in document order; any other result
/// type yields exactly one atomic item.
#[derive(Clone, Debug, PartialEq)]
pub enum Item<'a> {
    Element(&'a Element),
    Attribute(&'a Attribute),
    Text(&'a str),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl<'a> Item<'a> {
    /// The element, if this item is one.
    pub fn as_element(&self) -> Option<&'a Element> {
        match self {
            Item::Element(e) => Some(*e),
            _ => None,
        }
    }

    /// The XPath string value of the item.
    pub fn string_value(&self) -> String {
        match self {
            Item::Element(e) => e.string_value(),
            Item::Attribute(a) => a.value.clone(),
            Item::Text(t) => t.to_string(),
            Item::Boolean(b) => b.to_string(),
            Item::Number(n) => format_number(*n),
            Item::String(s) => s.clone(),
        }
    }

    /// Serialized form used for exact value comparison.
    ///
    /// Elements serialize as compact XML, attributes as `name="value"`
    /// (with `{namespace}` before the name when qualified), text and
    /// strings as escaped character data.
    pub fn canonical(&self) -> String {
        match self {
            Item::Element(e) => to_xml_string(e),
            Item::Attribute(a) if a.namespace.is_empty() => {
                format!("{}=\"{}\"", a.name, escape_text(&a.value))
            }
            Item::Attribute(a) => {
                format!("{{{}}}{}=\"{}\"", a.namespace, a.name, escape_text(&a.value))
            }
            Item::Text(t) => escape_text(t),
            Item::String(s) => escape_text(s),
            Item::Boolean(_) | Item::Number(_) => self.string_value(),
        }
    }
}

/// A compiled path query.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    source: String,
    expr: Expr,
}

impl Query {
    /// Parse `source` into a reusable query.
    pub fn compile(source: &str) -> PathResult<Self> {
        Ok(Self {
            source: source.to_string(),
            expr: parse(source)?,
        })
    }

    /// The query text this was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate relative to `element` and return the result sequence.
    pub fn select<'a>(&self, element: &'a Element) -> PathResult<Vec<Item<'a>>> {
        let value = Evaluator::new(element).eval(&self.expr, &Context::root(element))?;
        Ok(match value {
            Value::Nodes(nodes) => nodes.into_iter().map(Node::into_item).collect(),
            Value::Boolean(b) => vec![Item::Boolean(b)],
            Value::Number(n) => vec![Item::Number(n)],
            Value::String(s) => vec![Item::String(s)],
        })
    }

    /// Evaluate relative to `element` and convert the result with
    /// `boolean()` semantics.
    pub fn test(&self, element: &Element) -> PathResult<bool> {
        let value = Evaluator::new(element).eval(&self.expr, &Context::root(element))?;
        Ok(value.to_boolean())
    }
}

/// Compile and run `query` against `element`.
pub fn select<'a>(query: &str, element: &'a Element) -> PathResult<Vec<Item<'a>>> {
    Query::compile(query)?.select(element)
}

/// Compile `query` and evaluate it as a predicate on `element`.
pub fn test(query: &str, element: &Element) -> PathResult<bool> {
    Query::compile(query)?.test(element)
}

/// Format a number the way XPath `string()` does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

/// XPath `number()` of a string: optional minus, digits with at most one
/// dot, surrounding whitespace allowed; anything else is NaN.
fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = body.chars().any(|c| c.is_ascii_digit())
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.matches('.').count() <= 1;
    if valid {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

#[derive(Clone, Copy, Debug)]
enum Node<'a> {
    Element(&'a Element),
    Attribute(&'a Attribute),
    Text(&'a str),
}

impl<'a> Node<'a> {
    /// Identity of the node within the evaluated tree.
    fn key(self) -> (u8, usize, usize) {
        match self {
            Node::Element(e) => (0, e as *const Element as usize, 0),
            Node::Attribute(a) => (1, a as *const Attribute as usize, 0),
            Node::Text(t) => (2, t.as_ptr() as usize, t.len()),
        }
    }

    fn string_value(self) -> String {
        match self {
            Node::Element(e) => e.string_value(),
            Node::Attribute(a) => a.value.clone(),
            Node::Text(t) => t.to_string(),
        }
    }

    fn into_item(self) -> Item<'a> {
        match self {
            Node::Element(e) => Item::Element(e),
            Node::Attribute(a) => Item::Attribute(a),
            Node::Text(t) => Item::Text(t),
        }
    }

    fn from_content(content: &'a Content) -> Self {
        match content {
            Content::Element(e) => Node::Element(e),
            Content::Text(t) => Node::Text(t),
        }
    }
}

#[derive(Clone, Debug)]
enum Value<'a> {
    Nodes(Vec<Node<'a>>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl<'a> Value<'a> {
    fn to_boolean(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            other => parse_number(&other.to_xpath_string()),
        }
    }

    fn to_xpath_string(&self) -> String {
        match self {
            Value::Nodes(nodes) => nodes.first().map(|n| n.string_value()).unwrap_or_default(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
        }
    }

    fn into_nodes(self, what: &str) -> PathResult<Vec<Node<'a>>> {
        match self {
            Value::Nodes(nodes) => Ok(nodes),
            _ => Err(PathError::Type(format!("{what} requires a node-set"))),
        }
    }
}

#[derive(Clone, Copy)]
struct Context<'a> {
    node: Node<'a>,
    position: usize,
    size: usize,
}

impl<'a> Context<'a> {
    fn root(element: &'a Element) -> Self {
        Self {
            node: Node::Element(element),
            position: 1,
            size: 1,
        }
    }
}

struct Evaluator<'a> {
    root: &'a Element,
}

impl<'a> Evaluator<'a> {
    fn new(root: &'a Element) -> Self {
        Self { root }
    }

    fn eval(&self, expr: &Expr, ctx: &Context<'a>) -> PathResult<Value<'a>> {
        match expr {
            Expr::Or(lhs, rhs) => Ok(Value::Boolean(
                self.eval(lhs, ctx)?.to_boolean() || self.eval(rhs, ctx)?.to_boolean(),
            )),
            Expr::And(lhs, rhs) => Ok(Value::Boolean(
                self.eval(lhs, ctx)?.to_boolean() && self.eval(rhs, ctx)?.to_boolean(),
            )),
            Expr::Compare(op, lhs, rhs) => {
                let lhs = self.eval(lhs, ctx)?;
                let rhs = self.eval(rhs, ctx)?;
                Ok(Value::Boolean(compare(*op, &lhs, &rhs)))
            }
            Expr::Arith(op, lhs, rhs) => {
                let a = self.eval(lhs, ctx)?.to_number();
                let b = self.eval(rhs, ctx)?.to_number();
                Ok(Value::Number(match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Mod => a % b,
                }))
            }
            Expr::Negate(inner) => Ok(Value::Number(-self.eval(inner, ctx)?.to_number())),
            Expr::Union(lhs, rhs) => {
                let mut nodes = self.eval(lhs, ctx)?.into_nodes("'|'")?;
                nodes.extend(self.eval(rhs, ctx)?.into_nodes("'|'")?);
                Ok(Value::Nodes(self.document_order(nodes)))
            }
            Expr::Path(steps) => Ok(Value::Nodes(self.apply_steps(vec![ctx.node], steps)?)),
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let mut nodes = self.eval(primary, ctx)?.into_nodes("a filter expression")?;
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(Value::Nodes(self.apply_steps(nodes, steps)?))
            }
            Expr::Literal(s) => Ok(Value::String(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Call(function, args) => self.call(*function, args, ctx),
        }
    }

    fn apply_steps(&self, start: Vec<Node<'a>>, steps: &[Step]) -> PathResult<Vec<Node<'a>>> {
        let mut current = start;
        for step in steps {
            let contexts = current.len();
            let mut next = Vec::new();
            let mut seen = HashSet::new();
            for node in current {
                let mut candidates: Vec<Node<'a>> = axis_nodes(node, step.axis)
                    .into_iter()
                    .filter(|n| node_test(*n, &step.test, step.axis))
                    .collect();
                for predicate in &step.predicates {
                    candidates = self.filter(candidates, predicate)?;
                }
                for candidate in candidates {
                    if seen.insert(candidate.key()) {
                        next.push(candidate);
                    }
                }
            }
            current = if contexts > 1 {
                self.document_order(next)
            } else {
                next
            };
        }
        Ok(current)
    }

    fn filter(&self, nodes: Vec<Node<'a>>, predicate: &Expr) -> PathResult<Vec<Node<'a>>> {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (index, node) in nodes.into_iter().enumerate() {
            let ctx = Context {
                node,
                position: index + 1,
                size,
            };
            let keep = match self.eval(predicate, &ctx)? {
                Value::Number(n) => n == ctx.position as f64,
                other => other.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    /// Sort `nodes` into document order of the evaluated tree, dropping
    /// duplicates.
    fn document_order(&self, nodes: Vec<Node<'a>>) -> Vec<Node<'a>> {
        fn index(element: &Element, order: &mut HashMap<(u8, usize, usize), usize>) {
            let next = order.len();
            order.insert(Node::Element(element).key(), next);
            for attribute in &element.attributes {
                let next = order.len();
                order.insert(Node::Attribute(attribute).key(), next);
            }
            for item in &element.content {
                match item {
                    Content::Element(child) => index(child, order),
                    Content::Text(t) => {
                        let next = order.len();
                        order.insert(Node::Text(t).key(), next);
                    }
                }
            }
        }

        let mut order = HashMap::new();
        index(self.root, &mut order);

        let mut seen = HashSet::new();
        let mut unique: Vec<Node<'a>> = nodes.into_iter().filter(|n| seen.insert(n.key())).collect();
        unique.sort_by_key(|n| order.get(&n.key()).copied().unwrap_or(usize::MAX));
        unique
    }

    fn call(&self, function: Function, args: &[Expr], ctx: &Context<'a>) -> PathResult<Value<'a>> {
        let arg = |i: usize| -> PathResult<Value<'a>> {
            match args.get(i) {
                Some(expr) => self.eval(expr, ctx),
                None => Ok(Value::Nodes(vec![ctx.node])),
            }
        };

        Ok(match function {
            Function::True => Value::Boolean(true),
            Function::False => Value::Boolean(false),
            Function::Not => Value::Boolean(!arg(0)?.to_boolean()),
            Function::Boolean => Value::Boolean(arg(0)?.to_boolean()),
            Function::Count => Value::Number(arg(0)?.into_nodes("count()")?.len() as f64),
            Function::String => Value::String(arg(0)?.to_xpath_string()),
            Function::Number => Value::Number(arg(0)?.to_number()),
            Function::Concat => {
                let mut out = String::new();
                for i in 0..args.len() {
                    out.push_str(&arg(i)?.to_xpath_string());
                }
                Value::String(out)
            }
            Function::Contains => {
                let haystack = arg(0)?.to_xpath_string();
                Value::Boolean(haystack.contains(&arg(1)?.to_xpath_string()))
            }
            Function::StartsWith => {
                let haystack = arg(0)?.to_xpath_string();
                Value::Boolean(haystack.starts_with(&arg(1)?.to_xpath_string()))
            }
            Function::NormalizeSpace => {
                Value::String(normalize_whitespace(&arg(0)?.to_xpath_string()))
            }
            Function::StringLength => {
                Value::Number(arg(0)?.to_xpath_string().chars().count() as f64)
            }
            Function::LocalName | Function::Name | Function::NamespaceUri => {
                let nodes = arg(0)?.into_nodes("a name function")?;
                Value::String(nodes.first().map(|n| node_name(*n, function)).unwrap_or_default())
            }
            Function::Position => Value::Number(ctx.position as f64),
            Function::Last => Value::Number(ctx.size as f64),
        })
    }
}

fn axis_nodes(node: Node<'_>, axis: Axis) -> Vec<Node<'_>> {
    fn descendants<'a>(element: &'a Element, out: &mut Vec<Node<'a>>) {
        for item in &element.content {
            out.push(Node::from_content(item));
            if let Content::Element(child) = item {
                descendants(child, out);
            }
        }
    }

    let Node::Element(element) = node else {
        return match axis {
            Axis::SelfAxis | Axis::DescendantOrSelf => vec![node],
            _ => Vec::new(),
        };
    };

    match axis {
        Axis::Child => element.content.iter().map(Node::from_content).collect(),
        Axis::Attribute => element.attributes.iter().map(Node::Attribute).collect(),
        Axis::SelfAxis => vec![node],
        Axis::Descendant => {
            let mut out = Vec::new();
            descendants(element, &mut out);
            out
        }
        Axis::DescendantOrSelf => {
            let mut out = vec![node];
            descendants(element, &mut out);
            out
        }
    }
}

fn node_test(node: Node<'_>, test: &NodeTest, axis: Axis) -> bool {
    match (test, node) {
        (NodeTest::Node, _) => true,
        (NodeTest::Text, Node::Text(_)) => true,
        (NodeTest::Text, _) => false,
        (NodeTest::Any, Node::Attribute(_)) => axis == Axis::Attribute,
        (NodeTest::Any, Node::Element(_)) => axis != Axis::Attribute,
        (NodeTest::Name(name), Node::Attribute(a)) => axis == Axis::Attribute && a.name == *name,
        (NodeTest::Name(name), Node::Element(e)) => axis != Axis::Attribute && e.name == *name,
        (_, Node::Text(_)) => false,
    }
}

fn node_name(node: Node<'_>, function: Function) -> String {
    match (node, function) {
        (Node::Element(e), Function::LocalName) => e.name.clone(),
        (Node::Element(e), Function::Name) => e.qualified_name(),
        (Node::Element(e), _) => e.namespace.clone(),
        (Node::Attribute(a), Function::LocalName) => a.name.clone(),
        (Node::Attribute(a), Function::Name) => match a.prefix.as_deref() {
            Some(p) if !p.is_empty() => format!("{p}:{}", a.name),
            _ => a.name.clone(),
        },
        (Node::Attribute(a), _) => a.namespace.clone(),
        (Node::Text(_), _) => String::new(),
    }
}

fn compare(op: CompareOp, lhs: &Value<'_>, rhs: &Value<'_>) -> bool {
    match (lhs, rhs) {
        (Value::Nodes(a), Value::Nodes(b)) => a.iter().any(|x| {
            let x = Value::String(x.string_value());
            b.iter()
                .any(|y| compare_atoms(op, &x, &Value::String(y.string_value())))
        }),
        (Value::Nodes(nodes), other) => compare_node_set(op, nodes, other, false),
        (other, Value::Nodes(nodes)) => compare_node_set(op, nodes, other, true),
        (a, b) => compare_atoms(op, a, b),
    }
}

/// Compare each node of a node-set with an atomic value; `swapped` means
/// the node-set was the right operand.
fn compare_node_set(op: CompareOp, nodes: &[Node<'_>], other: &Value<'_>, swapped: bool) -> bool {
    let ordered = |a: &Value<'_>, b: &Value<'_>| {
        if swapped {
            compare_atoms(op, b, a)
        } else {
            compare_atoms(op, a, b)
        }
    };

    if let Value::Boolean(_) = other {
        return ordered(&Value::Boolean(!nodes.is_empty()), other);
    }
    nodes.iter().any(|node| {
        let text = node.string_value();
        let atom = match other {
            Value::Number(_) => Value::Number(parse_number(&text)),
            _ => Value::String(text),
        };
        ordered(&atom, other)
    })
}

fn compare_atoms(op: CompareOp, a: &Value<'_>, b: &Value<'_>) -> bool {
    match op {
        CompareOp::Eq | CompareOp::Neq => {
            let eq = op == CompareOp::Eq;
            match (a, b) {
                (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
                    (a.to_boolean() == b.to_boolean()) == eq
                }
                (Value::Number(_), _) | (_, Value::Number(_)) => {
                    let (x, y) = (a.to_number(), b.to_number());
                    if eq {
                        x == y
                    } else {
                        x != y
                    }
                }
                _ => (a.to_xpath_string() == b.to_xpath_string()) == eq,
            }
        }
        CompareOp::Lt => a.to_number() < b.to_number(),
        CompareOp::Le => a.to_number() <= b.to_number(),
        CompareOp::Gt => a.to_number() > b.to_number(),
        CompareOp::Ge => a.to_number() >= b.to_number(),
    }
}
