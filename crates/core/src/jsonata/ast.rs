/// Parsed JSONata expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    /// `$name`; the empty name is the context value `$`, `"$"` is the root `$$`.
    Variable(String),
    /// A bare field name (or a back-quoted one).
    Field(String),
    /// `*` in step position.
    Wildcard,
    /// `a.b.c` - each step is evaluated against the results of the previous one.
    Path(Vec<Expr>),
    /// `expr[predicate]`
    Filter(Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Condition(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    Array(Vec<Expr>),
    /// `a..b` inside an array constructor.
    Range(Box<Expr>, Box<Expr>),
    Object(Vec<(Expr, Expr)>),
    /// `$name(args)`
    Call(String, Vec<Expr>),
    /// `( e1; e2; ... )`
    Block(Vec<Expr>),
    /// `$name := expr`
    Bind(String, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::In => "in",
        }
    }
}
