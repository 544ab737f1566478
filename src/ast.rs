// ABOUTME: Tagged-tree AST shared by parser and evaluator; every node carries a span.

use crate::error::SourceSpan;

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_name: Option<String>,
    pub is_const: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Is,
    In,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Name(String),
    Member { object: Box<Expr>, name: String },
    Index { object: Box<Expr>, index: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLiteral { text: String },
    FloatLiteral(f64),
    StringLiteral(String),
    FString(Vec<FStringPart>),
    BoolLiteral(bool),
    NoneLiteral,
    ListLiteral(Vec<Expr>),
    DictLiteral(Vec<(Expr, Expr)>),
    Identifier(String),
    This,
    Super,

    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    NullishCoalesce {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Pipe {
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Member {
        object: Box<Expr>,
        name: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Slice {
        object: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },

    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        optional: bool,
    },
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        optional: bool,
    },

    Assign {
        target: Box<AssignTarget>,
        value: Box<Expr>,
    },
    CompoundAssign {
        target: Box<AssignTarget>,
        op: BinaryOp,
        value: Box<Expr>,
    },
    PreIncrement {
        target: Box<AssignTarget>,
        increment: bool,
    },
    PostIncrement {
        target: Box<AssignTarget>,
        increment: bool,
    },
    ListDestructureAssign {
        targets: Vec<AssignTarget>,
        value: Box<Expr>,
    },

    Lambda {
        params: Vec<Param>,
        body: Box<LambdaBody>,
        is_async: bool,
    },

    Await {
        expr: Box<Expr>,
    },
    Spawn {
        expr: Box<Expr>,
    },

    Ternary {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LambdaBody {
    Expr(Expr),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

impl Expr {
    pub fn new(kind: ExprKind, span: SourceSpan) -> Expr {
        Expr { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub type_name: Option<String>,
    pub is_const: bool,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub value: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEachVars {
    pub names: Vec<String>,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    pub is_abstract: bool,
    pub is_internal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberVarDecl {
    pub name: String,
    pub type_name: Option<String>,
    pub is_const: bool,
    pub has_explicit_type: bool,
    pub has_default_value: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_internal: bool,
    pub members: Vec<MemberVarDecl>,
    pub methods: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceMethodSig {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: String,
    pub is_internal: bool,
    pub methods: Vec<InterfaceMethodSig>,
}

/// A single `enum` member: either a bare tag (`Red`) or a tuple tag that
/// carries positional data (`Pair(x, y)`).
#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariantDecl {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub is_internal: bool,
    pub variants: Vec<EnumVariantDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportDecl {
    /// `import math [as alias]` — possibly dotted.
    Bare { path: Vec<String>, alias: Option<String> },
    /// `import a, b from mod [as alias]`
    Named { names: Vec<String>, module: String, alias: Option<String> },
    /// `import "./lib.zephyr" [as alias]`
    Path { path: String, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    ExprStmt(Expr),
    Block(Vec<Stmt>),
    VarDecl(VarDecl),

    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    DoUntil {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Expr>,
        body: Box<Stmt>,
    },
    ForEach {
        vars: ForEachVars,
        iterable: Expr,
        filter: Option<Expr>,
        body: Box<Stmt>,
    },
    Loop {
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
    },
    TryCatch {
        try_block: Box<Stmt>,
        catch_var: Option<String>,
        catch_block: Box<Stmt>,
        finally_block: Option<Box<Stmt>>,
    },
    With {
        ctx_expr: Expr,
        var: String,
        body: Box<Stmt>,
    },
    Throw(Expr),

    FuncDecl(FunctionDecl),
    ClassDecl(ClassDecl),
    InterfaceDecl(InterfaceDecl),
    EnumDecl(EnumDecl),
    Import(ImportDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: SourceSpan) -> Stmt {
        Stmt { kind, span }
    }
}

pub type Program = Vec<Stmt>;
