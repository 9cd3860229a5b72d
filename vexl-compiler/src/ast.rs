use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl SourceSpan {
    pub fn new(line: usize, column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            line,
            column,
            end_line,
            end_column,
        }
    }

    pub fn single_point(line: usize, column: usize) -> Self {
        Self::new(line, column, line, column)
    }

    pub fn union(a: &Self, b: &Self) -> Self {
        if a.line == 0 {
            return *b;
        }
        if b.line == 0 {
            return *a;
        }

        let (start_line, start_column) =
            if (a.line < b.line) || (a.line == b.line && a.column <= b.column) {
                (a.line, a.column)
            } else {
                (b.line, b.column)
            };

        let (end_line, end_column) = if (a.end_line > b.end_line)
            || (a.end_line == b.end_line && a.end_column >= b.end_column)
        {
            (a.end_line, a.end_column)
        } else {
            (b.end_line, b.end_column)
        };

        Self::new(start_line, start_column, end_line, end_column)
    }
}

impl Default for SourceSpan {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

/// A parsed expression program: zero or more local assignments followed by
/// the expression whose value is the result.
#[derive(Debug, Clone)]
pub struct Script {
    pub assignments: Vec<Assignment>,
    pub result: Expression,
}

impl Script {
    /// Visits every call site in evaluation order.
    pub fn call_sites(&self) -> Vec<&CallExpression> {
        let mut calls = Vec::new();
        for assignment in &self.assignments {
            assignment.value.collect_calls(&mut calls);
        }
        self.result.collect_calls(&mut calls);
        calls
    }
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub name: String,
    pub name_span: SourceSpan,
    pub value: Expression,
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub span: SourceSpan,
    pub kind: ExpressionKind,
}

impl Expression {
    fn collect_calls<'a>(&'a self, calls: &mut Vec<&'a CallExpression>) {
        match &self.kind {
            ExpressionKind::Number(_)
            | ExpressionKind::String(_)
            | ExpressionKind::Local(_)
            | ExpressionKind::Variable(_) => {}
            ExpressionKind::Vector(elements) => {
                for element in elements {
                    element.collect_calls(calls);
                }
            }
            ExpressionKind::Unary(unary) => unary.operand.collect_calls(calls),
            ExpressionKind::Binary(binary) => {
                binary.left.collect_calls(calls);
                binary.right.collect_calls(calls);
            }
            ExpressionKind::Call(call) => {
                for argument in &call.arguments {
                    argument.collect_calls(calls);
                }
                calls.push(call);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    Number(f64),
    String(String),
    Vector(Vec<Expression>),
    /// A name bound by an earlier assignment in the same script.
    Local(String),
    /// A `$name` host variable supplied by the embedder.
    Variable(String),
    Unary(UnaryExpression),
    Binary(BinaryExpression),
    Call(CallExpression),
}

#[derive(Debug, Clone)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    pub operand: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
}

#[derive(Debug, Clone)]
pub struct BinaryExpression {
    pub operator: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::Less
                | BinaryOperator::LessEqual
                | BinaryOperator::Greater
                | BinaryOperator::GreaterEqual
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Identifies one call site for the lifetime of a parsed script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSiteId(pub usize);

#[derive(Debug, Clone)]
pub struct CallExpression {
    pub id: CallSiteId,
    pub name: String,
    pub name_span: SourceSpan,
    pub arguments: Vec<Expression>,
}
