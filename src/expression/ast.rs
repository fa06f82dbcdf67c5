use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Field(String),
    /// `LAST Field`: the field on the previous record.
    Last(String),
    Now,
    Today,
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinaryOperator {
    #[strum(serialize = ".OR.")]
    Or,
    #[strum(serialize = ".AND.")]
    And,
    #[strum(serialize = "=")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanEqual,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanEqual,
    #[strum(serialize = ".CONTAINS.")]
    Contains,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Function {
    Iif,
    Length,
    Match,
    Upper,
    Lower,
}

impl Function {
    pub fn arity(&self) -> usize {
        match self {
            Function::Iif => 3,
            Function::Match => 2,
            Function::Length | Function::Upper | Function::Lower => 1,
        }
    }
}

impl Expr {
    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Number of nodes on the longest path from this node to a leaf.
    pub fn height(&self) -> usize {
        match self {
            Expr::Literal(_) | Expr::Field(_) | Expr::Last(_) | Expr::Now | Expr::Today => 1,
            Expr::Not(inner) | Expr::Negate(inner) => 1 + inner.height(),
            Expr::Binary { left, right, .. } => 1 + left.height().max(right.height()),
            Expr::Call { args, .. } => 1 + args.iter().map(Expr::height).max().unwrap_or(0),
        }
    }
}
