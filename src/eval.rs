// ABOUTME: Tree-walking evaluator -- the visitor over `ast::{Stmt, Expr}`
// ABOUTME: that owns the module loader and scheduler and drives everything.

use crate::ast::{
    AssignTarget, ClassDecl, Expr, ExprKind, FStringPart, FunctionDecl, ImportDecl,
    InterfaceDecl, LambdaBody, Param, Program, Stmt, StmtKind, UnaryOp,
};
use crate::ast::{BinaryOp, LogicalOp};
use crate::env::Environment;
use crate::error::{SourceSpan, SpanGuard, ZephyrError};
use crate::integer::Integer;
use crate::module_loader::ModuleLoader;
use crate::overload;
use crate::scheduler::Scheduler;
use crate::value::{
    BuiltinFunction, ClassValue, EnumVariantValue, FunctionValue, InstanceValue, InterfaceValue,
    LambdaValue, ModuleHandleValue, ModuleValue, Overload, PromiseState, Value,
};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// What a statement did to control flow, threaded back up through block,
/// loop, and function execution instead of panicking or using exceptions.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Owns the pieces that outlive any single call: the module cache/resolver,
/// the cooperative scheduler, and the stack of classes whose methods are
/// currently executing (so `super` knows where to resume dispatch).
pub struct Evaluator {
    pub module_loader: ModuleLoader,
    pub scheduler: Scheduler,
    class_stack: RefCell<Vec<Rc<ClassValue>>>,
    /// Directory of the module/script currently executing; imports with a
    /// path specifier resolve relative to this.
    dir_stack: RefCell<Vec<PathBuf>>,
    /// One set per module currently executing, tracking canonical paths
    /// already imported so re-importing the same module twice in one file
    /// is an error.
    imported_stack: RefCell<Vec<HashSet<PathBuf>>>,
}

struct ClassGuard<'a> {
    stack: &'a RefCell<Vec<Rc<ClassValue>>>,
}

impl Drop for ClassGuard<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

impl Evaluator {
    pub fn new(module_loader: ModuleLoader) -> Evaluator {
        Evaluator {
            module_loader,
            scheduler: Scheduler::new(),
            class_stack: RefCell::new(Vec::new()),
            dir_stack: RefCell::new(vec![std::env::current_dir().unwrap_or_default()]),
            imported_stack: RefCell::new(vec![HashSet::new()]),
        }
    }

    fn push_class(&self, class: Rc<ClassValue>) -> ClassGuard {
        self.class_stack.borrow_mut().push(class);
        ClassGuard { stack: &self.class_stack }
    }

    fn current_dir(&self) -> PathBuf {
        self.dir_stack.borrow().last().cloned().unwrap_or_default()
    }

    /// Called at every loop-iteration entry and function call, giving one
    /// other ready task a chance to run every so often.
    fn checkpoint(&self) {
        let mut run = |expr: &Expr, env: Rc<Environment>| self.eval_expr(expr, &env);
        self.scheduler.checkpoint(&mut run);
    }

    fn run_fn(&self) -> impl FnMut(&Expr, Rc<Environment>) -> Result<Value, ZephyrError> + '_ {
        move |expr, env| self.eval_expr(expr, &env)
    }

    /// Runs a whole program (script or REPL chunk) in `env`, draining any
    /// spawned tasks before returning. Returns the value of the final
    /// top-level expression statement, for REPL echoing.
    pub fn eval_program(&self, program: &Program, env: &Rc<Environment>) -> Result<Value, ZephyrError> {
        let mut last = Value::None;
        for stmt in program {
            if let StmtKind::ExprStmt(expr) = &stmt.kind {
                last = self.eval_expr(expr, env)?;
            } else {
                match self.exec_stmt(stmt, env)? {
                    Flow::Normal => {}
                    Flow::Return(_) => {
                        return Err(ZephyrError::internal("'return' outside a function", stmt.span))
                    }
                    Flow::Break | Flow::Continue => {
                        return Err(ZephyrError::internal("'break'/'continue' outside a loop", stmt.span))
                    }
                }
            }
        }
        self.scheduler.run_to_completion(&mut self.run_fn());
        Ok(last)
    }

    // ---- statements ----------------------------------------------------

    fn exec_block(&self, stmts: &[Stmt], env: &Rc<Environment>) -> Result<Flow, ZephyrError> {
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&self, stmt: &Stmt, env: &Rc<Environment>) -> Result<Flow, ZephyrError> {
        let _guard = SpanGuard::enter(stmt.span);
        match &stmt.kind {
            StmtKind::ExprStmt(expr) => {
                self.eval_expr(expr, env)?;
                Ok(Flow::Normal)
            }
            StmtKind::Block(stmts) => {
                let scope = Environment::with_parent(env.clone());
                self.exec_block(stmts, &scope)
            }
            StmtKind::VarDecl(decl) => {
                let value = match &decl.value {
                    Some(e) => self.eval_expr(e, env)?,
                    None => Value::None,
                };
                let value = match &decl.type_name {
                    Some(t) => overload::coerce_to_declared_type(value, t, stmt.span)?,
                    None => value,
                };
                env.declare(&decl.name, value, decl.is_const, decl.type_name.clone());
                Ok(Flow::Normal)
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                if self.eval_expr(cond, env)?.is_truthy() {
                    self.exec_stmt(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { cond, body } => {
                while self.eval_expr(cond, env)?.is_truthy() {
                    self.checkpoint();
                    match self.exec_stmt(body, env)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        other @ Flow::Return(_) => return Ok(other),
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::DoWhile { body, cond } => {
                loop {
                    self.checkpoint();
                    match self.exec_stmt(body, env)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        other @ Flow::Return(_) => return Ok(other),
                    }
                    if !self.eval_expr(cond, env)?.is_truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::DoUntil { body, cond } => {
                loop {
                    self.checkpoint();
                    match self.exec_stmt(body, env)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        other @ Flow::Return(_) => return Ok(other),
                    }
                    if self.eval_expr(cond, env)?.is_truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::For { init, cond, post, body } => {
                let scope = Environment::with_parent(env.clone());
                if let Some(init) = init {
                    self.exec_stmt(init, &scope)?;
                }
                loop {
                    if let Some(cond) = cond {
                        if !self.eval_expr(cond, &scope)?.is_truthy() {
                            break;
                        }
                    }
                    self.checkpoint();
                    match self.exec_stmt(body, &scope)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        other @ Flow::Return(_) => return Ok(other),
                    }
                    if let Some(post) = post {
                        self.eval_expr(post, &scope)?;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::ForEach { vars, iterable, filter, body } => {
                self.exec_for_each(vars, iterable, filter.as_ref(), body, env)
            }
            StmtKind::Loop { body } => loop {
                self.checkpoint();
                match self.exec_stmt(body, env)? {
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Continue | Flow::Normal => {}
                    other @ Flow::Return(_) => return Ok(other),
                }
            },
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval_expr(e, env)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Switch { subject, cases, default } => {
                self.exec_switch(subject, cases, default.as_ref(), env)
            }
            StmtKind::TryCatch { try_block, catch_var, catch_block, finally_block } => {
                self.exec_try_catch(try_block, catch_var.as_deref(), catch_block, finally_block.as_deref(), env)
            }
            StmtKind::With { ctx_expr, var, body } => self.exec_with(ctx_expr, var, body, env),
            StmtKind::Throw(expr) => {
                let value = self.eval_expr(expr, env)?;
                let message = match &value {
                    Value::Str(s) => s.to_string(),
                    other => other.to_string(),
                };
                Err(ZephyrError::value(message, stmt.span))
            }
            StmtKind::FuncDecl(decl) => {
                self.declare_function(env, decl, stmt.span)?;
                Ok(Flow::Normal)
            }
            StmtKind::ClassDecl(decl) => {
                self.declare_class(env, decl, stmt.span)?;
                Ok(Flow::Normal)
            }
            StmtKind::InterfaceDecl(decl) => {
                self.declare_interface(env, decl);
                Ok(Flow::Normal)
            }
            StmtKind::EnumDecl(decl) => {
                self.declare_enum(env, decl);
                Ok(Flow::Normal)
            }
            StmtKind::Import(decl) => {
                self.exec_import(decl, env, stmt.span)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_for_each(
        &self,
        vars: &crate::ast::ForEachVars,
        iterable: &Expr,
        filter: Option<&Expr>,
        body: &Stmt,
        env: &Rc<Environment>,
    ) -> Result<Flow, ZephyrError> {
        let span = iterable.span;
        let subject = self.eval_expr(iterable, env)?;
        let items: Vec<Vec<Value>> = match &subject {
            Value::List(list) => {
                let snapshot: Vec<Value> = list.borrow().clone();
                snapshot
                    .into_iter()
                    .map(|item| match vars.names.len() {
                        1 => Ok(vec![item]),
                        n => {
                            let Value::List(inner) = &item else {
                                return Err(ZephyrError::type_error(
                                    format!("cannot destructure a {} into {} names", item.type_name(), n),
                                    span,
                                ));
                            };
                            let inner = inner.borrow();
                            if inner.len() != n {
                                return Err(ZephyrError::value(
                                    format!("expected {} elements to destructure, found {}", n, inner.len()),
                                    span,
                                ));
                            }
                            Ok(inner.clone())
                        }
                    })
                    .collect::<Result<_, _>>()?
            }
            Value::Dict(dict) => {
                let snapshot: Vec<(Rc<str>, Value)> = dict.borrow().clone();
                snapshot
                    .into_iter()
                    .map(|(k, v)| match vars.names.len() {
                        1 => vec![Value::Str(k)],
                        _ => vec![Value::Str(k), v],
                    })
                    .collect()
            }
            Value::Str(s) => s.chars().map(|c| vec![Value::str(c.to_string())]).collect(),
            other => {
                return Err(ZephyrError::type_error(
                    format!("'{}' is not iterable", other.type_name()),
                    span,
                ))
            }
        };

        for row in items {
            self.checkpoint();
            let scope = Environment::with_parent(env.clone());
            for (name, value) in vars.names.iter().zip(row.into_iter()) {
                scope.declare(name, value, vars.is_const, None);
            }
            if let Some(filter) = filter {
                if !self.eval_expr(filter, &scope)?.is_truthy() {
                    continue;
                }
            }
            match self.exec_stmt(body, &scope)? {
                Flow::Break => break,
                Flow::Continue | Flow::Normal => {}
                other @ Flow::Return(_) => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_switch(
        &self,
        subject: &Expr,
        cases: &[crate::ast::SwitchCase],
        default: Option<&Vec<Stmt>>,
        env: &Rc<Environment>,
    ) -> Result<Flow, ZephyrError> {
        let scope = Environment::with_parent(env.clone());
        let value = self.eval_expr(subject, &scope)?;
        let mut matched = None;
        for (i, case) in cases.iter().enumerate() {
            let case_value = self.eval_expr(&case.value, &scope)?;
            if value_equals(&value, &case_value) {
                matched = Some(i);
                break;
            }
        }
        let Some(start) = matched else {
            return match default {
                Some(stmts) => self.exec_block(stmts, &scope),
                None => Ok(Flow::Normal),
            };
        };
        for case in &cases[start..] {
            match self.exec_block(&case.body, &scope)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        if let Some(stmts) = default {
            return self.exec_block(stmts, &scope);
        }
        Ok(Flow::Normal)
    }

    fn exec_try_catch(
        &self,
        try_block: &Stmt,
        catch_var: Option<&str>,
        catch_block: &Stmt,
        finally_block: Option<&Stmt>,
        env: &Rc<Environment>,
    ) -> Result<Flow, ZephyrError> {
        let result = match self.exec_stmt(try_block, env) {
            Ok(flow) => Ok(flow),
            Err(err) => {
                let scope = Environment::with_parent(env.clone());
                if let Some(name) = catch_var {
                    scope.declare(name, Value::str(err.message.clone()), false, None);
                }
                self.exec_stmt(catch_block, &scope)
            }
        };
        if let Some(finally) = finally_block {
            match self.exec_stmt(finally, env)? {
                Flow::Normal => result,
                other => Ok(other),
            }
        } else {
            result
        }
    }

    fn exec_with(&self, ctx_expr: &Expr, var: &str, body: &Stmt, env: &Rc<Environment>) -> Result<Flow, ZephyrError> {
        let span = ctx_expr.span;
        let ctx = self.eval_expr(ctx_expr, env)?;
        let Value::Instance(inst) = &ctx else {
            return Err(ZephyrError::type_error(
                format!("'with' requires a class instance context manager, found '{}'", ctx.type_name()),
                span,
            ));
        };
        let entered = match inst.class.find_method("__enter__") {
            Some((declaring, overloads)) => {
                let (overload, converted) = overload::resolve("__enter__", &overloads, &[], span)?;
                self.invoke(&overload.function, converted, Some(ctx.clone()), Some(declaring), span)?
            }
            None => ctx.clone(),
        };
        let scope = Environment::with_parent(env.clone());
        scope.declare(var, entered, false, None);

        let result = self.exec_stmt(body, &scope);

        let (kind, message): (Value, Value) = match &result {
            Err(err) => (Value::str(err.kind.name()), Value::str(err.message.clone())),
            Ok(_) => (Value::None, Value::None),
        };
        if let Some((declaring, overloads)) = inst.class.find_method("__exit__") {
            let args = vec![kind, message];
            if let Ok((overload, converted)) = overload::resolve("__exit__", &overloads, &args, span) {
                let suppressed = self.invoke(&overload.function, converted, Some(ctx.clone()), Some(declaring), span)?;
                if result.is_err() && suppressed.is_truthy() {
                    return Ok(Flow::Normal);
                }
            }
        }
        result
    }

    // ---- declarations ----------------------------------------------------

    fn declare_function(&self, env: &Rc<Environment>, decl: &FunctionDecl, span: SourceSpan) -> Result<(), ZephyrError> {
        let function = Rc::new(FunctionValue { decl: Rc::new(decl.clone()), closure: env.clone() });
        let new_overload = Overload { function };
        match env.get_own(&decl.name) {
            Some(Value::Function(existing)) => {
                let existing_overload = Overload { function: existing };
                overload::check_duplicate(&decl.name, std::slice::from_ref(&existing_overload), &decl.params, span)?;
                env.declare(
                    &decl.name,
                    Value::OverloadSet(Rc::new(RefCell::new(vec![existing_overload, new_overload]))),
                    false,
                    None,
                );
            }
            Some(Value::OverloadSet(set)) => {
                overload::check_duplicate(&decl.name, &set.borrow(), &decl.params, span)?;
                set.borrow_mut().push(new_overload);
            }
            Some(_) => {
                return Err(ZephyrError::name(
                    format!("'{}' is already bound to a non-function value", decl.name),
                    span,
                ))
            }
            None => env.declare(&decl.name, Value::Function(new_overload.function), false, None),
        }
        Ok(())
    }

    fn declare_interface(&self, env: &Rc<Environment>, decl: &InterfaceDecl) {
        let value = Value::Interface(Rc::new(InterfaceValue {
            name: decl.name.clone(),
            is_internal: decl.is_internal,
            methods: decl.methods.clone(),
        }));
        env.declare(&decl.name, value, true, None);
    }

    fn declare_enum(&self, env: &Rc<Environment>, decl: &crate::ast::EnumDecl) {
        let variants = decl.variants.iter().map(|v| (v.name.clone(), v.params.clone())).collect();
        let value = Value::Enum(Rc::new(crate::value::EnumTypeValue { name: decl.name.clone(), variants }));
        env.declare(&decl.name, value, true, None);
    }

    fn declare_class(&self, env: &Rc<Environment>, decl: &ClassDecl, span: SourceSpan) -> Result<(), ZephyrError> {
        let mut names: Vec<&str> = Vec::new();
        names.extend(decl.parent.as_deref());
        names.extend(decl.interfaces.iter().map(String::as_str));

        let mut parent: Option<Rc<ClassValue>> = None;
        let mut interfaces: Vec<Rc<InterfaceValue>> = Vec::new();
        for name in names {
            match env.get(name) {
                Some(Value::Class(c)) => {
                    if parent.is_some() {
                        return Err(ZephyrError::type_error(
                            format!("class '{}' may inherit from only one parent class", decl.name),
                            span,
                        ));
                    }
                    parent = Some(c);
                }
                Some(Value::Interface(i)) => interfaces.push(i),
                Some(_) => {
                    return Err(ZephyrError::type_error(
                        format!("'{}' in inheritance list of '{}' is neither a class nor an interface", name, decl.name),
                        span,
                    ))
                }
                None => return Err(ZephyrError::name(format!("undefined name '{}'", name), span)),
            }
        }
        if let Some(p) = &parent {
            if p.is_final {
                return Err(ZephyrError::type_error(
                    format!("class '{}' cannot inherit from final class '{}'", decl.name, p.name),
                    span,
                ));
            }
        }

        let class = Rc::new(ClassValue {
            name: decl.name.clone(),
            parent: RefCell::new(parent.clone()),
            interfaces: RefCell::new(interfaces),
            members: decl.members.clone(),
            methods: RefCell::new(HashMap::new()),
            is_final: decl.is_final,
            is_abstract: decl.is_abstract,
            is_internal: decl.is_internal,
            invalid_init: Cell::new(false),
            closure: env.clone(),
        });

        for method in &decl.methods {
            let function = Rc::new(FunctionValue { decl: Rc::new(method.clone()), closure: env.clone() });
            let mut methods = class.methods.borrow_mut();
            let entry = methods.entry(method.name.clone()).or_default();
            overload::check_duplicate(&method.name, entry, &method.params, span)?;
            entry.push(Overload { function });
        }

        let inherited_abstract = match &parent {
            Some(p) => effective_abstract_methods(p),
            None => HashSet::new(),
        };
        if !decl.is_abstract {
            let overridden: HashSet<&str> = class
                .methods
                .borrow()
                .iter()
                .filter(|(_, overloads)| overloads.iter().all(|o| !o.function.decl.is_abstract))
                .map(|(name, _)| name.as_str())
                .collect();
            if inherited_abstract.iter().any(|name| !overridden.contains(name.as_str())) {
                class.invalid_init.set(true);
            }
        }

        env.declare(&decl.name, Value::Class(class), true, None);
        Ok(())
    }

    fn exec_import(&self, decl: &ImportDecl, env: &Rc<Environment>, span: SourceSpan) -> Result<(), ZephyrError> {
        match decl {
            ImportDecl::Bare { path, alias } => {
                let canonical = self.module_loader.resolve_bare_specifier(path, span)?;
                let module = self.load_module(&canonical, &path.join("."), span)?;
                let name = alias.clone().unwrap_or_else(|| path.last().cloned().unwrap_or_default());
                env.declare(&name, Value::ModuleHandle(Rc::new(ModuleHandleValue { module, whitelist: None })), true, None);
            }
            ImportDecl::Named { names, module, alias } => {
                let canonical = self.module_loader.resolve_bare_specifier(std::slice::from_ref(module), span)?;
                let loaded = self.load_module(&canonical, module, span)?;
                if let Some(alias) = alias {
                    env.declare(
                        alias,
                        Value::ModuleHandle(Rc::new(ModuleHandleValue { module: loaded, whitelist: Some(names.clone()) })),
                        true,
                        None,
                    );
                } else {
                    for name in names {
                        let value = loaded.exports.borrow().get(name).cloned().ok_or_else(|| {
                            ZephyrError::import(format!("module '{}' has no exported name '{}'", module, name), span)
                        })?;
                        env.declare(name, value, true, None);
                    }
                }
            }
            ImportDecl::Path { path, alias } => {
                let requester_dir = self.current_dir();
                let canonical = self.module_loader.resolve_path_specifier(path, &requester_dir, span)?;
                let module = self.load_module(&canonical, path, span)?;
                let name = alias.clone().unwrap_or_else(|| module_default_name(&canonical));
                env.declare(&name, Value::ModuleHandle(Rc::new(ModuleHandleValue { module, whitelist: None })), true, None);
            }
        }
        Ok(())
    }

    /// Loads (or returns the cached) module at `canonical`, guarding against
    /// cycles and double-imports from the same importing module.
    fn load_module(&self, canonical: &Path, display_name: &str, span: SourceSpan) -> Result<Rc<ModuleValue>, ZephyrError> {
        if let Some(already) = self.imported_stack.borrow().last() {
            if already.contains(canonical) {
                return Err(ZephyrError::import(
                    format!("module '{}' imported twice in the same module", display_name),
                    span,
                ));
            }
        }
        if let Some(cached) = self.module_loader.get_cached(canonical) {
            self.imported_stack.borrow_mut().last_mut().unwrap().insert(canonical.to_path_buf());
            return Ok(cached);
        }

        let _guard = self.module_loader.start_loading(canonical, display_name, span)?;
        let source = std::fs::read_to_string(canonical)
            .map_err(|e| ZephyrError::io(format!("cannot read module '{}': {}", display_name, e), span))?;
        let program = crate::parser::parse(&source)?;

        let module = Rc::new(ModuleValue {
            name: display_name.to_string(),
            canonical_path: canonical.to_path_buf(),
            source,
            exports: RefCell::new(HashMap::new()),
            executed: Cell::new(false),
            global_scope: RefCell::new(None),
        });

        let module_env = Environment::new();
        self.dir_stack.borrow_mut().push(canonical.parent().map(Path::to_path_buf).unwrap_or_default());
        self.imported_stack.borrow_mut().push(HashSet::new());
        let result = self.eval_program(&program, &module_env);
        self.imported_stack.borrow_mut().pop();
        self.dir_stack.borrow_mut().pop();
        result?;

        let exports = collect_exports(&program, &module_env);
        *module.exports.borrow_mut() = exports;
        module.executed.set(true);
        *module.global_scope.borrow_mut() = Some(module_env);

        self.module_loader.insert(canonical.to_path_buf(), module.clone());
        self.imported_stack.borrow_mut().last_mut().unwrap().insert(canonical.to_path_buf());
        Ok(module)
    }

    // ---- expressions -----------------------------------------------------

    fn eval_expr(&self, expr: &Expr, env: &Rc<Environment>) -> Result<Value, ZephyrError> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::IntLiteral { text } => {
                Integer::from_str_with_suffix(text).map(Value::Int).map_err(|e| ZephyrError::new(e.kind, e.message, span))
            }
            ExprKind::FloatLiteral(f) => Ok(Value::Float(*f)),
            ExprKind::StringLiteral(s) => Ok(Value::str(s.clone())),
            ExprKind::FString(parts) => self.eval_fstring(parts, env),
            ExprKind::BoolLiteral(b) => Ok(Value::Bool(*b)),
            ExprKind::NoneLiteral => Ok(Value::None),
            ExprKind::ListLiteral(items) => {
                let values = items.iter().map(|e| self.eval_expr(e, env)).collect::<Result<_, _>>()?;
                Ok(Value::list(values))
            }
            ExprKind::DictLiteral(pairs) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = self.eval_expr(k, env)?;
                    let Value::Str(key) = key else {
                        return Err(ZephyrError::type_error(
                            format!("dict keys must be strings, found '{}'", key.type_name()),
                            k.span,
                        ));
                    };
                    let value = self.eval_expr(v, env)?;
                    entries.push((key, value));
                }
                Ok(Value::dict(entries))
            }
            ExprKind::Identifier(name) => env
                .get(name)
                .ok_or_else(|| ZephyrError::name(format!("undefined name '{}'", name), span)),
            ExprKind::This => env
                .get("this")
                .ok_or_else(|| ZephyrError::name("'this' used outside a method", span)),
            ExprKind::Super => env
                .get("this")
                .ok_or_else(|| ZephyrError::name("'super' used outside a method", span)),

            ExprKind::Unary { op, expr: inner } => {
                let value = self.eval_expr(inner, env)?;
                unary_op(op, value, span)
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                binary_op(op, l, r, span)
            }
            ExprKind::Logical { op, left, right } => {
                let l = self.eval_expr(left, env)?;
                match op {
                    LogicalOp::And if !l.is_truthy() => Ok(l),
                    LogicalOp::And => self.eval_expr(right, env),
                    LogicalOp::Or if l.is_truthy() => Ok(l),
                    LogicalOp::Or => self.eval_expr(right, env),
                }
            }
            ExprKind::NullishCoalesce { left, right } => {
                let l = self.eval_expr(left, env)?;
                if matches!(l, Value::None) {
                    self.eval_expr(right, env)
                } else {
                    Ok(l)
                }
            }
            ExprKind::Pipe { left, right } => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                self.call_value(r, vec![l], span)
            }

            ExprKind::Member { object, name, optional } => {
                let obj = self.eval_expr(object, env)?;
                if *optional && matches!(obj, Value::None) {
                    return Ok(Value::None);
                }
                self.get_member(&obj, name, span)
            }
            ExprKind::Index { object, index, optional } => {
                let obj = self.eval_expr(object, env)?;
                if *optional && matches!(obj, Value::None) {
                    return Ok(Value::None);
                }
                let idx = self.eval_expr(index, env)?;
                index_get(&obj, &idx, span)
            }
            ExprKind::Slice { object, start, end, step } => {
                let obj = self.eval_expr(object, env)?;
                let start = start.as_ref().map(|e| self.eval_expr(e, env)).transpose()?;
                let end = end.as_ref().map(|e| self.eval_expr(e, env)).transpose()?;
                let step = step.as_ref().map(|e| self.eval_expr(e, env)).transpose()?;
                eval_slice(&obj, start, end, step, span)
            }

            ExprKind::Call { callee, args, optional } => {
                if let ExprKind::Super = callee.kind {
                    return Err(ZephyrError::syntax("'super' must be followed by a method call", span));
                }
                let callee_value = self.eval_expr(callee, env)?;
                if *optional && matches!(callee_value, Value::None) {
                    return Ok(Value::None);
                }
                let arg_values = args.iter().map(|a| self.eval_expr(a, env)).collect::<Result<_, _>>()?;
                self.call_value(callee_value, arg_values, span)
            }
            ExprKind::MethodCall { object, method, args, optional } => {
                self.eval_method_call(object, method, args, *optional, env, span)
            }

            ExprKind::Assign { target, value } => {
                let v = self.eval_expr(value, env)?;
                self.assign_target(target, v.clone(), env, span)?;
                Ok(v)
            }
            ExprKind::CompoundAssign { target, op, value } => {
                let current = self.read_target(target, env, span)?;
                let rhs = self.eval_expr(value, env)?;
                let result = binary_op(op, current, rhs, span)?;
                self.assign_target(target, result.clone(), env, span)?;
                Ok(result)
            }
            ExprKind::PreIncrement { target, increment } => {
                let current = self.read_target(target, env, span)?;
                let updated = step_value(&current, *increment, span)?;
                self.assign_target(target, updated.clone(), env, span)?;
                Ok(updated)
            }
            ExprKind::PostIncrement { target, increment } => {
                let current = self.read_target(target, env, span)?;
                let updated = step_value(&current, *increment, span)?;
                self.assign_target(target, updated, env, span)?;
                Ok(current)
            }
            ExprKind::ListDestructureAssign { targets, value } => {
                let v = self.eval_expr(value, env)?;
                let Value::List(list) = &v else {
                    return Err(ZephyrError::type_error(format!("cannot destructure a '{}'", v.type_name()), span));
                };
                let items = list.borrow().clone();
                if items.len() != targets.len() {
                    return Err(ZephyrError::value(
                        format!("expected {} elements to destructure, found {}", targets.len(), items.len()),
                        span,
                    ));
                }
                for (target, item) in targets.iter().zip(items.iter()) {
                    self.assign_target(target, item.clone(), env, span)?;
                }
                Ok(v)
            }

            ExprKind::Lambda { params, body, is_async } => Ok(Value::Lambda(Rc::new(LambdaValue {
                params: params.clone(),
                body: Rc::new((**body).clone()),
                is_async: *is_async,
                captures: env.clone(),
            }))),

            ExprKind::Await { expr: inner } => {
                let value = self.eval_expr(inner, env)?;
                let Value::Promise(promise) = value else {
                    return Err(ZephyrError::type_error(
                        format!("'await' requires a promise, found '{}'", value.type_name()),
                        span,
                    ));
                };
                self.scheduler.await_promise(&promise, &mut self.run_fn(), span)
            }
            ExprKind::Spawn { expr: inner } => {
                let promise = self.scheduler.spawn((**inner).clone(), env.clone());
                Ok(Value::Promise(promise))
            }

            ExprKind::Ternary { cond, then_branch, else_branch } => {
                if self.eval_expr(cond, env)?.is_truthy() {
                    self.eval_expr(then_branch, env)
                } else {
                    self.eval_expr(else_branch, env)
                }
            }
        }
    }

    fn eval_fstring(&self, parts: &[FStringPart], env: &Rc<Environment>) -> Result<Value, ZephyrError> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Text(t) => out.push_str(t),
                FStringPart::Expr(e) => out.push_str(&self.eval_expr(e, env)?.to_string()),
            }
        }
        Ok(Value::str(out))
    }

    fn eval_method_call(
        &self,
        object: &Expr,
        method: &str,
        args: &[Expr],
        optional: bool,
        env: &Rc<Environment>,
        span: SourceSpan,
    ) -> Result<Value, ZephyrError> {
        if let ExprKind::Super = object.kind {
            let this = env.get("this").ok_or_else(|| ZephyrError::name("'super' used outside a method", span))?;
            let current = self
                .class_stack
                .borrow()
                .last()
                .cloned()
                .ok_or_else(|| ZephyrError::name("'super' used outside a method", span))?;
            let parent = current
                .parent
                .borrow()
                .clone()
                .ok_or_else(|| ZephyrError::type_error(format!("class '{}' has no parent class", current.name), span))?;
            let arg_values = args.iter().map(|a| self.eval_expr(a, env)).collect::<Result<_, _>>()?;
            return self.call_method(this, &parent, method, arg_values, span);
        }

        if let ExprKind::Identifier(name) = &object.kind {
            if name == "Promise" && method == "all" && env.get("Promise").is_none() {
                let arg_values: Vec<Value> = args.iter().map(|a| self.eval_expr(a, env)).collect::<Result<_, _>>()?;
                return self.eval_promise_all(arg_values, span);
            }
        }

        let obj = self.eval_expr(object, env)?;
        if optional && matches!(obj, Value::None) {
            return Ok(Value::None);
        }
        let arg_values: Vec<Value> = args.iter().map(|a| self.eval_expr(a, env)).collect::<Result<_, _>>()?;

        match &obj {
            Value::Instance(inst) => self.call_method(obj.clone(), &inst.class, method, arg_values, span),
            Value::Module(m) => {
                let value = m.exports.borrow().get(method).cloned().ok_or_else(|| {
                    ZephyrError::attribute(format!("module '{}' has no member '{}'", m.name, method), span)
                })?;
                self.call_value(value, arg_values, span)
            }
            Value::ModuleHandle(h) => {
                let value = h
                    .get(method)
                    .ok_or_else(|| ZephyrError::attribute(format!("module '{}' has no member '{}'", h.module.name, method), span))?;
                self.call_value(value, arg_values, span)
            }
            Value::Promise(promise) => self.eval_promise_then_catch(promise, method, arg_values, span),
            other => Err(ZephyrError::attribute(format!("'{}' has no method '{}'", other.type_name(), method), span)),
        }
    }

    fn eval_promise_then_catch(
        &self,
        promise: &Rc<RefCell<crate::value::PromiseValue>>,
        method: &str,
        mut args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<Value, ZephyrError> {
        if method != "then" && method != "catch" {
            return Err(ZephyrError::attribute(format!("promise has no method '{}'", method), span));
        }
        if args.len() != 1 {
            return Err(ZephyrError::type_error(format!("'{}' takes exactly one callback argument", method), span));
        }
        let callback = args.remove(0);
        let state = loop {
            let snapshot = promise.borrow().state.clone();
            match snapshot {
                PromiseState::Pending => {
                    if !self.scheduler.has_ready_task() {
                        return Err(ZephyrError::internal("promise will never resolve (no ready tasks remain)", span));
                    }
                    self.scheduler.checkpoint(&mut self.run_fn());
                }
                settled => break settled,
            }
        };
        match (method, state) {
            ("then", PromiseState::Fulfilled(v)) => {
                let result = self.call_value(callback, vec![v], span)?;
                Ok(Value::Promise(Rc::new(RefCell::new(crate::value::PromiseValue {
                    state: PromiseState::Fulfilled(result),
                    callbacks: Vec::new(),
                }))))
            }
            ("then", PromiseState::Rejected(message)) => Ok(Value::Promise(Rc::new(RefCell::new(
                crate::value::PromiseValue { state: PromiseState::Rejected(message), callbacks: Vec::new() },
            )))),
            ("catch", PromiseState::Rejected(message)) => {
                let result = self.call_value(callback, vec![Value::str(message)], span)?;
                Ok(Value::Promise(Rc::new(RefCell::new(crate::value::PromiseValue {
                    state: PromiseState::Fulfilled(result),
                    callbacks: Vec::new(),
                }))))
            }
            ("catch", PromiseState::Fulfilled(v)) => Ok(Value::Promise(Rc::new(RefCell::new(
                crate::value::PromiseValue { state: PromiseState::Fulfilled(v), callbacks: Vec::new() },
            )))),
            _ => unreachable!("pending state already drained above"),
        }
    }

    /// `Promise.all([p1, p2, ...])`: resolves to the list of settled values
    /// in input order once every promise is fulfilled, or rejects with the
    /// first rejection encountered (spec.md 4.7).
    fn eval_promise_all(&self, mut arg_values: Vec<Value>, span: SourceSpan) -> Result<Value, ZephyrError> {
        if arg_values.len() != 1 {
            return Err(ZephyrError::type_error("'Promise.all' takes exactly one list argument", span));
        }
        let Value::List(list) = arg_values.remove(0) else {
            return Err(ZephyrError::type_error("'Promise.all' requires a list of promises", span));
        };
        let promises: Vec<Rc<RefCell<crate::value::PromiseValue>>> = list
            .borrow()
            .iter()
            .map(|v| match v {
                Value::Promise(p) => Ok(p.clone()),
                other => Err(ZephyrError::type_error(
                    format!("'Promise.all' requires a list of promises, found '{}'", other.type_name()),
                    span,
                )),
            })
            .collect::<Result<_, _>>()?;

        let mut results = Vec::with_capacity(promises.len());
        for promise in &promises {
            results.push(self.scheduler.await_promise(promise, &mut self.run_fn(), span)?);
        }
        Ok(Value::List(Rc::new(RefCell::new(results))))
    }

    fn get_member(&self, obj: &Value, name: &str, span: SourceSpan) -> Result<Value, ZephyrError> {
        match obj {
            Value::Instance(inst) => inst
                .members
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| ZephyrError::attribute(format!("'{}' has no member '{}'", inst.class.name, name), span)),
            Value::Module(m) => m
                .exports
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| ZephyrError::attribute(format!("module '{}' has no member '{}'", m.name, name), span)),
            Value::ModuleHandle(h) => h
                .get(name)
                .ok_or_else(|| ZephyrError::attribute(format!("module '{}' has no member '{}'", h.module.name, name), span)),
            Value::Enum(e) => {
                let Some((index, params)) = e.variant(name) else {
                    return Err(ZephyrError::attribute(format!("enum '{}' has no variant '{}'", e.name, name), span));
                };
                if params.is_empty() {
                    Ok(Value::EnumVariant(Rc::new(EnumVariantValue {
                        enum_name: e.name.clone(),
                        variant_name: name.to_string(),
                        variant_index: index,
                        data: Vec::new(),
                    })))
                } else {
                    let enum_type = e.clone();
                    let variant_name = name.to_string();
                    let arity = params.len();
                    Ok(Value::Builtin(Rc::new(BuiltinFunction {
                        name: format!("{}.{}", enum_type.name, variant_name),
                        func: Box::new(move |args, span, _call| {
                            if args.len() != arity {
                                return Err(ZephyrError::type_error(
                                    format!("variant '{}.{}' takes {} argument(s), got {}", enum_type.name, variant_name, arity, args.len()),
                                    span,
                                ));
                            }
                            Ok(Value::EnumVariant(Rc::new(EnumVariantValue {
                                enum_name: enum_type.name.clone(),
                                variant_name: variant_name.clone(),
                                variant_index: index,
                                data: args.to_vec(),
                            })))
                        }),
                    })))
                }
            }
            other => Err(ZephyrError::attribute(format!("'{}' has no member '{}'", other.type_name(), name), span)),
        }
    }

    // ---- calling ----------------------------------------------------------

    pub fn call_value(&self, callee: Value, args: Vec<Value>, span: SourceSpan) -> Result<Value, ZephyrError> {
        match callee {
            Value::Function(f) => {
                let converted = self.check_arity_and_convert("function", &f.decl.name, &f.decl.params, args, span)?;
                self.invoke(&f, converted, None, None, span)
            }
            Value::OverloadSet(set) => {
                let overloads = set.borrow().clone();
                let name = overloads.first().map(|o| o.function.name().to_string()).unwrap_or_default();
                let (overload, converted) = overload::resolve(&name, &overloads, &args, span)?;
                self.invoke(&overload.function, converted, None, None, span)
            }
            Value::Lambda(l) => self.call_lambda(&l, args, span),
            Value::Class(c) => self.instantiate_class(&c, args, span),
            Value::Builtin(b) => {
                let call = |f: &Value, a: &[Value], s: SourceSpan| self.call_value(f.clone(), a.to_vec(), s);
                (b.func)(&args, span, &call)
            }
            other => Err(ZephyrError::type_error(format!("'{}' is not callable", other.type_name()), span)),
        }
    }

    /// Arity-checks a plain (non-overloaded) function/lambda call and
    /// coerces each argument to its declared parameter type, if any; unlike
    /// `overload::resolve` this doesn't score candidates since there's
    /// exactly one.
    fn check_arity_and_convert(
        &self,
        kind: &str,
        name: &str,
        params: &[Param],
        args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<Vec<Value>, ZephyrError> {
        if params.len() != args.len() {
            return Err(ZephyrError::type_error(
                format!("{} '{}' takes {} argument(s), got {}", kind, name, params.len(), args.len()),
                span,
            ));
        }
        let mut converted = Vec::with_capacity(args.len());
        for (param, arg) in params.iter().zip(args.into_iter()) {
            let value = match &param.type_name {
                Some(t) => overload::coerce_to_declared_type(arg, t, span)?,
                None => arg,
            };
            converted.push(value);
        }
        Ok(converted)
    }

    fn call_lambda(&self, lambda: &Rc<LambdaValue>, args: Vec<Value>, span: SourceSpan) -> Result<Value, ZephyrError> {
        if lambda.params.len() != args.len() {
            return Err(ZephyrError::type_error(
                format!("lambda takes {} argument(s), got {}", lambda.params.len(), args.len()),
                span,
            ));
        }
        let call_env = Environment::with_parent(lambda.captures.clone());
        for (param, arg) in lambda.params.iter().zip(args.into_iter()) {
            let value = match &param.type_name {
                Some(t) => overload::coerce_to_declared_type(arg, t, span)?,
                None => arg,
            };
            call_env.declare(&param.name, value, param.is_const, param.type_name.clone());
        }
        self.checkpoint();
        match lambda.body.as_ref() {
            LambdaBody::Expr(e) => self.eval_expr(e, &call_env),
            LambdaBody::Block(stmts) => match self.exec_block(stmts, &call_env)? {
                Flow::Return(v) => Ok(v),
                Flow::Normal => Ok(Value::None),
                Flow::Break | Flow::Continue => Err(ZephyrError::internal("'break'/'continue' outside a loop", span)),
            },
        }
    }

    /// Shared call path for free functions, methods, and constructors: binds
    /// `this` (if any), binds parameters, pushes the declaring class for
    /// `super` resolution (if any), runs the body, and coerces the return.
    fn invoke(
        &self,
        function: &Rc<FunctionValue>,
        args: Vec<Value>,
        this: Option<Value>,
        declaring_class: Option<Rc<ClassValue>>,
        span: SourceSpan,
    ) -> Result<Value, ZephyrError> {
        let call_env = Environment::with_parent(function.closure.clone());
        if let Some(t) = &this {
            call_env.declare("this", t.clone(), true, None);
        }
        for (param, arg) in function.decl.params.iter().zip(args.into_iter()) {
            call_env.declare(&param.name, arg, param.is_const, param.type_name.clone());
        }
        let _guard = declaring_class.map(|c| self.push_class(c));
        self.checkpoint();
        let flow = self.exec_block(&function.decl.body, &call_env)?;
        let value = match flow {
            Flow::Return(v) => v,
            Flow::Normal => Value::None,
            Flow::Break | Flow::Continue => return Err(ZephyrError::internal("'break'/'continue' outside a loop", span)),
        };
        match &function.decl.return_type {
            Some(rt) => overload::coerce_to_declared_type(value, rt, span),
            None => Ok(value),
        }
    }

    /// `this.foo()`/`obj.foo()`/`super.foo()` dispatch: looks up `method` on
    /// `search_class` (child-first up its parent chain), resolves overloads,
    /// and invokes with `this` bound to `target`.
    fn call_method(
        &self,
        target: Value,
        search_class: &Rc<ClassValue>,
        method: &str,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<Value, ZephyrError> {
        let (declaring_class, overloads) = search_class
            .find_method(method)
            .ok_or_else(|| ZephyrError::attribute(format!("'{}' has no method '{}'", search_class.name, method), span))?;
        let (overload, converted) = overload::resolve(method, &overloads, &args, span)?;
        self.invoke(&overload.function, converted, Some(target), Some(declaring_class), span)
    }

    fn instantiate_class(&self, class: &Rc<ClassValue>, args: Vec<Value>, span: SourceSpan) -> Result<Value, ZephyrError> {
        if class.is_abstract {
            return Err(ZephyrError::type_error(format!("cannot instantiate abstract class '{}'", class.name), span));
        }
        if class.invalid_init.get() {
            return Err(ZephyrError::type_error(
                format!("class '{}' has unimplemented abstract methods", class.name),
                span,
            ));
        }
        let instance = Rc::new(InstanceValue {
            class: class.clone(),
            members: RefCell::new(HashMap::new()),
            const_members: RefCell::new(HashSet::new()),
        });
        self.init_members(class, &instance, span)?;

        match class.find_method("init") {
            Some((declaring, overloads)) => {
                let (overload, converted) = overload::resolve("init", &overloads, &args, span)?;
                self.invoke(&overload.function, converted, Some(Value::Instance(instance.clone())), Some(declaring), span)?;
            }
            None if !args.is_empty() => {
                return Err(ZephyrError::type_error(format!("'{}' takes no arguments (no 'init' defined)", class.name), span))
            }
            None => {}
        }
        Ok(Value::Instance(instance))
    }

    fn init_members(&self, class: &Rc<ClassValue>, instance: &Rc<InstanceValue>, span: SourceSpan) -> Result<(), ZephyrError> {
        if let Some(parent) = class.parent.borrow().as_ref() {
            self.init_members(parent, instance, span)?;
        }
        let scope = Environment::with_parent(class.closure.clone());
        scope.declare("this", Value::Instance(instance.clone()), true, None);
        for member in &class.members {
            let value = if member.has_default_value {
                self.eval_expr(member.default.as_ref().unwrap(), &scope)?
            } else {
                Value::None
            };
            let value = if member.has_explicit_type {
                overload::coerce_to_declared_type(value, member.type_name.as_ref().unwrap(), span)?
            } else {
                value
            };
            instance.members.borrow_mut().insert(member.name.clone(), value);
            if member.is_const {
                instance.const_members.borrow_mut().insert(member.name.clone());
            }
        }
        Ok(())
    }

    // ---- assignment --------------------------------------------------------

    fn read_target(&self, target: &AssignTarget, env: &Rc<Environment>, span: SourceSpan) -> Result<Value, ZephyrError> {
        match target {
            AssignTarget::Name(name) => env
                .get(name)
                .ok_or_else(|| ZephyrError::name(format!("undefined name '{}'", name), span)),
            AssignTarget::Member { object, name } => {
                let obj = self.eval_expr(object, env)?;
                self.get_member(&obj, name, span)
            }
            AssignTarget::Index { object, index } => {
                let obj = self.eval_expr(object, env)?;
                let idx = self.eval_expr(index, env)?;
                index_get(&obj, &idx, span)
            }
        }
    }

    fn assign_target(&self, target: &AssignTarget, value: Value, env: &Rc<Environment>, span: SourceSpan) -> Result<(), ZephyrError> {
        match target {
            AssignTarget::Name(name) => {
                let value = match env.type_constraint(name) {
                    Some(t) => overload::coerce_to_declared_type(value, &t, span)?,
                    None => value,
                };
                if !env.assign(name, value.clone(), span)? {
                    env.declare(name, value, false, None);
                }
                Ok(())
            }
            AssignTarget::Member { object, name } => {
                let obj = self.eval_expr(object, env)?;
                match obj {
                    Value::Instance(inst) => {
                        if inst.const_members.borrow().contains(name) {
                            return Err(ZephyrError::type_error(format!("cannot assign to const member '{}'", name), span));
                        }
                        inst.members.borrow_mut().insert(name.clone(), value);
                        Ok(())
                    }
                    other => Err(ZephyrError::attribute(
                        format!("cannot assign member '{}' on a '{}'", name, other.type_name()),
                        span,
                    )),
                }
            }
            AssignTarget::Index { object, index } => {
                let obj = self.eval_expr(object, env)?;
                let idx = self.eval_expr(index, env)?;
                index_set(&obj, &idx, value, span)
            }
        }
    }
}

fn module_default_name(canonical: &Path) -> String {
    canonical.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "module".to_string())
}

/// Every method name that is abstract in `class` or any ancestor and not
/// concretely overridden anywhere along the chain up to `class`.
fn effective_abstract_methods(class: &Rc<ClassValue>) -> HashSet<String> {
    let mut result = match class.parent.borrow().as_ref() {
        Some(parent) => effective_abstract_methods(parent),
        None => HashSet::new(),
    };
    for (name, overloads) in class.methods.borrow().iter() {
        if overloads.iter().any(|o| o.function.decl.is_abstract) {
            result.insert(name.clone());
        } else {
            result.remove(name);
        }
    }
    result
}

/// Builds the export map for a finished module: every top-level name bound
/// in its global scope, minus anything declared `internal`.
fn collect_exports(program: &Program, module_env: &Rc<Environment>) -> HashMap<String, Value> {
    let mut internal: HashSet<&str> = HashSet::new();
    for stmt in program {
        match &stmt.kind {
            StmtKind::FuncDecl(d) if d.is_internal => {
                internal.insert(&d.name);
            }
            StmtKind::ClassDecl(d) if d.is_internal => {
                internal.insert(&d.name);
            }
            StmtKind::InterfaceDecl(d) if d.is_internal => {
                internal.insert(&d.name);
            }
            StmtKind::EnumDecl(d) if d.is_internal => {
                internal.insert(&d.name);
            }
            _ => {}
        }
    }
    let mut exports = HashMap::new();
    for stmt in program {
        let name = match &stmt.kind {
            StmtKind::FuncDecl(d) => Some(d.name.as_str()),
            StmtKind::ClassDecl(d) => Some(d.name.as_str()),
            StmtKind::InterfaceDecl(d) => Some(d.name.as_str()),
            StmtKind::EnumDecl(d) => Some(d.name.as_str()),
            StmtKind::VarDecl(d) => Some(d.name.as_str()),
            _ => None,
        };
        if let Some(name) = name {
            if internal.contains(name) {
                continue;
            }
            if let Some(value) = module_env.get_own(name) {
                exports.insert(name.to_string(), value);
            }
        }
    }
    exports
}

// ---- value-level operators ------------------------------------------------

pub fn value_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => x.as_f64() == *y,
        (Value::Int(x), Value::Int(y)) => x.value() == y.value(),
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| value_equals(a, b))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().all(|(k, v)| y.iter().any(|(k2, v2)| k == k2 && value_equals(v, v2)))
        }
        (Value::EnumVariant(x), Value::EnumVariant(y)) => {
            x.enum_name == y.enum_name
                && x.variant_index == y.variant_index
                && x.data.len() == y.data.len()
                && x.data.iter().zip(y.data.iter()).all(|(a, b)| value_equals(a, b))
        }
        _ => a.is_identical(b),
    }
}

fn numeric_compare(a: &Value, b: &Value, span: SourceSpan) -> Result<std::cmp::Ordering, ZephyrError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.value().cmp(&y.value())),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).ok_or_else(|| ZephyrError::value("NaN is unordered", span)),
        (Value::Int(x), Value::Float(y)) => x.as_f64().partial_cmp(y).ok_or_else(|| ZephyrError::value("NaN is unordered", span)),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&y.as_f64()).ok_or_else(|| ZephyrError::value("NaN is unordered", span)),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => Err(ZephyrError::type_error(format!("cannot compare '{}' and '{}'", a.type_name(), b.type_name()), span)),
    }
}

fn binary_op(op: &BinaryOp, l: Value, r: Value, span: SourceSpan) -> Result<Value, ZephyrError> {
    use BinaryOp::*;
    match op {
        Add => match (&l, &r) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{}{}", a, b))),
            _ => numeric_binop(&l, &r, span, |a, b| a.checked_add(b), |a, b| a + b),
        },
        Sub => numeric_binop(&l, &r, span, |a, b| a.checked_sub(b), |a, b| a - b),
        Mul => numeric_binop(&l, &r, span, |a, b| a.checked_mul(b), |a, b| a * b),
        Div => numeric_binop(&l, &r, span, |a, b| a.checked_div(b), |a, b| a / b),
        Mod => numeric_binop(&l, &r, span, |a, b| a.checked_rem(b), |a, b| a % b),
        Pow => numeric_binop(&l, &r, span, |a, b| a.checked_pow(b), |a, b| a.powf(b)),
        Eq => Ok(Value::Bool(value_equals(&l, &r))),
        NotEq => Ok(Value::Bool(!value_equals(&l, &r))),
        Lt => Ok(Value::Bool(numeric_compare(&l, &r, span)?.is_lt())),
        LtEq => Ok(Value::Bool(numeric_compare(&l, &r, span)?.is_le())),
        Gt => Ok(Value::Bool(numeric_compare(&l, &r, span)?.is_gt())),
        GtEq => Ok(Value::Bool(numeric_compare(&l, &r, span)?.is_ge())),
        Is => Ok(Value::Bool(l.is_identical(&r))),
        In => membership(&l, &r, span),
        BitAnd => int_binop(&l, &r, span, |a, b| Ok(a.bitand(b))),
        BitOr => int_binop(&l, &r, span, |a, b| Ok(a.bitor(b))),
        BitXor => int_binop(&l, &r, span, |a, b| Ok(a.bitxor(b))),
        Shl => int_binop(&l, &r, span, |a, b| Ok(a.shl(b))),
        Shr => int_binop(&l, &r, span, |a, b| Ok(a.shr(b))),
    }
}

fn numeric_binop(
    l: &Value,
    r: &Value,
    span: SourceSpan,
    int_op: impl Fn(&Integer, &Integer) -> Result<Integer, ZephyrError>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, ZephyrError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => int_op(a, b).map(Value::Int).map_err(|e| ZephyrError::new(e.kind, e.message, span)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(a.as_f64(), *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, b.as_f64()))),
        _ => Err(ZephyrError::type_error(
            format!("unsupported operand types '{}' and '{}'", l.type_name(), r.type_name()),
            span,
        )),
    }
}

fn int_binop(
    l: &Value,
    r: &Value,
    span: SourceSpan,
    op: impl Fn(&Integer, &Integer) -> Result<Integer, ZephyrError>,
) -> Result<Value, ZephyrError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => op(a, b).map(Value::Int),
        _ => Err(ZephyrError::type_error(
            format!("bitwise operators require integers, found '{}' and '{}'", l.type_name(), r.type_name()),
            span,
        )),
    }
}

fn membership(l: &Value, r: &Value, span: SourceSpan) -> Result<Value, ZephyrError> {
    match r {
        Value::List(list) => Ok(Value::Bool(list.borrow().iter().any(|item| value_equals(l, item)))),
        Value::Dict(dict) => {
            let Value::Str(key) = l else { return Ok(Value::Bool(false)) };
            Ok(Value::Bool(dict.borrow().iter().any(|(k, _)| k == key)))
        }
        Value::Str(haystack) => {
            let Value::Str(needle) = l else {
                return Err(ZephyrError::type_error("'in' on a string requires a string", span));
            };
            Ok(Value::Bool(haystack.contains(needle.as_ref())))
        }
        other => Err(ZephyrError::type_error(format!("'in' is not supported on '{}'", other.type_name()), span)),
    }
}

fn unary_op(op: &UnaryOp, value: Value, span: SourceSpan) -> Result<Value, ZephyrError> {
    match op {
        UnaryOp::Neg => match value {
            Value::Int(i) => Integer::new(0, i.kind())
                .and_then(|zero| zero.checked_sub(&i))
                .map(Value::Int)
                .map_err(|e| ZephyrError::new(e.kind, e.message, span)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(ZephyrError::type_error(format!("cannot negate '{}'", other.type_name()), span)),
        },
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::BitNot => match value {
            Value::Int(i) => Ok(Value::Int(i.bitnot())),
            other => Err(ZephyrError::type_error(format!("cannot bitwise-negate '{}'", other.type_name()), span)),
        },
    }
}

fn step_value(current: &Value, increment: bool, span: SourceSpan) -> Result<Value, ZephyrError> {
    match current {
        Value::Int(i) => {
            let one = Integer::new(1, i.kind()).map_err(|e| ZephyrError::new(e.kind, e.message, span))?;
            let result = if increment { i.checked_add(&one) } else { i.checked_sub(&one) };
            result.map(Value::Int).map_err(|e| ZephyrError::new(e.kind, e.message, span))
        }
        Value::Float(f) => Ok(Value::Float(if increment { f + 1.0 } else { f - 1.0 })),
        other => Err(ZephyrError::type_error(format!("cannot increment/decrement '{}'", other.type_name()), span)),
    }
}

/// Resolves a possibly-negative index against `len`, per common scripting
/// convention.
fn resolve_index(raw: i64, len: usize, span: SourceSpan) -> Result<usize, ZephyrError> {
    let len_i = len as i64;
    let idx = if raw < 0 { raw + len_i } else { raw };
    if idx < 0 || idx >= len_i {
        return Err(ZephyrError::index(format!("index {} out of range for length {}", raw, len), span));
    }
    Ok(idx as usize)
}

fn index_get(obj: &Value, idx: &Value, span: SourceSpan) -> Result<Value, ZephyrError> {
    match obj {
        Value::List(list) => {
            let Value::Int(i) = idx else { return Err(ZephyrError::type_error("list index must be an integer", span)) };
            let list = list.borrow();
            let i = resolve_index(i.value(), list.len(), span)?;
            Ok(list[i].clone())
        }
        Value::Str(s) => {
            let Value::Int(i) = idx else { return Err(ZephyrError::type_error("string index must be an integer", span)) };
            let chars: Vec<char> = s.chars().collect();
            let i = resolve_index(i.value(), chars.len(), span)?;
            Ok(Value::str(chars[i].to_string()))
        }
        Value::Dict(dict) => {
            let Value::Str(key) = idx else { return Err(ZephyrError::type_error("dict key must be a string", span)) };
            dict.borrow()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| ZephyrError::key(format!("key '{}' not found", key), span))
        }
        other => Err(ZephyrError::type_error(format!("'{}' is not indexable", other.type_name()), span)),
    }
}

fn index_set(obj: &Value, idx: &Value, value: Value, span: SourceSpan) -> Result<(), ZephyrError> {
    match obj {
        Value::List(list) => {
            let Value::Int(i) = idx else { return Err(ZephyrError::type_error("list index must be an integer", span)) };
            let mut list = list.borrow_mut();
            let i = resolve_index(i.value(), list.len(), span)?;
            list[i] = value;
            Ok(())
        }
        Value::Dict(dict) => {
            let Value::Str(key) = idx else { return Err(ZephyrError::type_error("dict key must be a string", span)) };
            let mut dict = dict.borrow_mut();
            if let Some(entry) = dict.iter_mut().find(|(k, _)| k == key) {
                entry.1 = value;
            } else {
                dict.push((key.clone(), value));
            }
            Ok(())
        }
        other => Err(ZephyrError::type_error(format!("cannot index-assign into a '{}'", other.type_name()), span)),
    }
}

fn slice_bound(value: Option<Value>, len: usize, default: usize, span: SourceSpan) -> Result<usize, ZephyrError> {
    match value {
        None => Ok(default),
        Some(Value::Int(i)) => {
            let raw = i.value();
            let len_i = len as i64;
            let clamped = if raw < 0 { (raw + len_i).max(0) } else { raw.min(len_i) };
            Ok(clamped as usize)
        }
        Some(other) => Err(ZephyrError::type_error(format!("slice bound must be an integer, found '{}'", other.type_name()), span)),
    }
}

fn slice_bounds(start: Option<Value>, end: Option<Value>, len: usize, step: i64, span: SourceSpan) -> Result<(usize, i64), ZephyrError> {
    if step > 0 {
        let lo = slice_bound(start, len, 0, span)?;
        let hi = slice_bound(end, len, len, span)?;
        Ok((lo, hi as i64))
    } else {
        let lo = slice_bound(start, len, len.saturating_sub(1), span)?;
        let hi = match end {
            None => -1,
            Some(_) => slice_bound(end, len, 0, span)? as i64,
        };
        Ok((lo, hi))
    }
}

fn eval_slice(obj: &Value, start: Option<Value>, end: Option<Value>, step: Option<Value>, span: SourceSpan) -> Result<Value, ZephyrError> {
    if let Some(step) = &step {
        if !matches!(step, Value::Int(_)) {
            return Err(ZephyrError::type_error("slice step must be an integer", span));
        }
    }
    let step_n = match &step {
        Some(Value::Int(i)) => i.value(),
        _ => 1,
    };
    if step_n == 0 {
        return Err(ZephyrError::value("slice step cannot be zero", span));
    }

    match obj {
        Value::List(list) => {
            let items = list.borrow();
            let len = items.len();
            let (lo, hi) = slice_bounds(start, end, len, step_n, span)?;
            let mut result = Vec::new();
            let mut i = lo as i64;
            while (step_n > 0 && i < hi) || (step_n < 0 && i > hi) {
                if i >= 0 && (i as usize) < len {
                    result.push(items[i as usize].clone());
                }
                i += step_n;
            }
            Ok(Value::list(result))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len();
            let (lo, hi) = slice_bounds(start, end, len, step_n, span)?;
            let mut result = String::new();
            let mut i = lo as i64;
            while (step_n > 0 && i < hi) || (step_n < 0 && i > hi) {
                if i >= 0 && (i as usize) < len {
                    result.push(chars[i as usize]);
                }
                i += step_n;
            }
            Ok(Value::str(result))
        }
        other => Err(ZephyrError::type_error(format!("'{}' cannot be sliced", other.type_name()), span)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn run(source: &str) -> Result<Value, ZephyrError> {
        let program = crate::parser::parse(source)?;
        let evaluator = Evaluator::new(ModuleLoader::new(vec![]));
        let env = Environment::new();
        evaluator.eval_program(&program, &env)
    }

    #[test]
    fn arithmetic_and_precedence() {
        let v = run("1 + 2 * 3;").unwrap();
        assert_eq!(v.to_string(), "7");
    }

    #[test]
    fn integer_overflow_on_narrowing_declaration() {
        let err = run("const x : u8 = 300;").unwrap_err();
        assert_eq!(err.kind, ErrorKind::OverflowError);
    }

    #[test]
    fn string_concatenation() {
        let v = run("\"a\" + \"b\";").unwrap();
        assert_eq!(v.to_string(), "ab");
    }

    #[test]
    fn if_else_branches() {
        let v = run("var x = 0; if (true) { x = 1; } else { x = 2; } x;").unwrap();
        assert_eq!(v.to_string(), "1");
    }

    #[test]
    fn while_loop_accumulates() {
        let v = run("var i = 0; var sum = 0; while (i < 5) { sum = sum + i; i = i + 1; } sum;").unwrap();
        assert_eq!(v.to_string(), "10");
    }

    #[test]
    fn function_call_and_overload_resolution() {
        let v = run(
            "func add(x : int, y : int) { return x + y; } func add(x : float, y : float) { return x + y; } add(1, 2);",
        )
        .unwrap();
        assert_eq!(v.to_string(), "3");
    }

    #[test]
    fn class_instantiation_and_method_dispatch() {
        let v = run(
            "class Counter { var n = 0; func inc() { this.n = this.n + 1; return this.n; } } var c = Counter(); c.inc(); c.inc();",
        )
        .unwrap();
        assert_eq!(v.to_string(), "2");
    }

    #[test]
    fn inheritance_and_super_call() {
        let v = run(
            "class Animal { func speak() { return \"...\"; } } class Dog : Animal { func speak() { return super.speak() + \"woof\"; } } var d = Dog(); d.speak();",
        )
        .unwrap();
        assert_eq!(v.to_string(), "...woof");
    }

    #[test]
    fn abstract_class_cannot_be_instantiated() {
        let err = run("abstract class Shape { abstract func area(); } var s = Shape();").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn abstract_method_must_be_overridden() {
        let err = run("abstract class Shape { abstract func area(); } class Circle : Shape { } var c = Circle();").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn final_class_cannot_be_inherited() {
        let err = run("final class Sealed { } class Sub : Sealed { }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn optional_chaining_short_circuits_on_none() {
        let v = run("var x = none; x?.field;").unwrap();
        assert!(matches!(v, Value::None));
    }

    #[test]
    fn for_each_over_dict_with_key_value_destructure() {
        let v = run("var d = {\"a\": 1, \"b\": 2}; var out = \"\"; for (k, val in d) { out = out + k; } out;").unwrap();
        assert_eq!(v.to_string(), "ab");
    }

    #[test]
    fn spawn_and_await_resolve_to_spawned_value() {
        let v = run("func work() { return 42; } var p = spawn work(); await p;").unwrap();
        assert_eq!(v.to_string(), "42");
    }

    #[test]
    fn cooperative_tasks_do_not_interleave_within_one_statement() {
        let v = run(
            "var log = []; func a() { log = log + [1]; return 1; } func b() { log = log + [2]; return 2; } var p1 = spawn a(); var p2 = spawn b(); await p1; await p2; log;",
        )
        .unwrap();
        assert_eq!(v.to_string(), "[1, 2]");
    }

    #[test]
    fn promise_all_resolves_in_input_order() {
        let v = run(
            "func a() { return 1; } func b() { return 2; } var p1 = spawn a(); var p2 = spawn b(); Promise.all([p1, p2]);",
        )
        .unwrap();
        assert_eq!(v.to_string(), "[1, 2]");
    }

    #[test]
    fn promise_all_rejects_with_first_rejection() {
        let err = run(
            "func a() { throw \"boom\"; } func b() { return 2; } var p1 = spawn a(); var p2 = spawn b(); Promise.all([p1, p2]);",
        )
        .unwrap_err();
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn try_catch_binds_error_message() {
        let v = run("var msg = \"\"; try { throw \"boom\"; } catch (e) { msg = e; } msg;").unwrap();
        assert_eq!(v.to_string(), "boom");
    }

    #[test]
    fn try_finally_runs_on_success_and_failure() {
        let v = run("var ran = false; try { 1; } finally { ran = true; } ran;").unwrap();
        assert_eq!(v.to_string(), "true");
    }

    #[test]
    fn list_destructure_assignment() {
        let v = run("var a = 0; var b = 0; [a, b] = [1, 2]; a + b;").unwrap();
        assert_eq!(v.to_string(), "3");
    }

    #[test]
    fn lambda_captures_are_independent_per_call() {
        let v = run("func make(x : int) { return () -> x; } var f1 = make(1); var f2 = make(2); f1() + f2();").unwrap();
        assert_eq!(v.to_string(), "3");
    }

    #[test]
    fn switch_fallthrough_without_break() {
        let v = run(
            "var out = 0; switch (1) { case 1: out = out + 1; case 2: out = out + 10; break; case 3: out = out + 100; } out;",
        )
        .unwrap();
        assert_eq!(v.to_string(), "11");
    }

    #[test]
    fn assignment_to_unbound_name_declares_in_current_scope() {
        let v = run("x = 5; x;").unwrap();
        assert_eq!(v.to_string(), "5");
    }

    #[test]
    fn value_equals_handles_int_float_cross_comparison() {
        assert!(value_equals(&Value::Int(Integer::default_int(3)), &Value::Float(3.0)));
    }

    #[test]
    fn bare_enum_variant_is_a_singleton_value() {
        let v = run("enum Color { Red, Green, Blue } type_of(Color.Red);").unwrap();
        assert_eq!(v.to_string(), "Color");
    }

    #[test]
    fn bare_enum_variants_of_the_same_name_are_equal_and_identical() {
        let v = run("enum Color { Red, Green } Color.Red == Color.Red;").unwrap();
        assert_eq!(v.to_string(), "true");
        let v = run("enum Color { Red, Green } Color.Red is Color.Red;").unwrap();
        assert_eq!(v.to_string(), "true");
        let v = run("enum Color { Red, Green } Color.Red == Color.Green;").unwrap();
        assert_eq!(v.to_string(), "false");
    }

    #[test]
    fn data_carrying_variant_constructs_and_prints_its_fields() {
        let v = run("enum Shape { Circle(radius), Square(side) } str(Shape.Circle(2));").unwrap();
        assert_eq!(v.to_string(), "Shape.Circle(2)");
    }

    #[test]
    fn data_carrying_variant_enforces_arity() {
        let err = run("enum Shape { Circle(radius) } Shape.Circle(1, 2);").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }

    #[test]
    fn data_carrying_variants_compare_structurally() {
        let v = run("enum Shape { Circle(radius) } Shape.Circle(2) == Shape.Circle(2);").unwrap();
        assert_eq!(v.to_string(), "true");
        let v = run("enum Shape { Circle(radius) } Shape.Circle(2) == Shape.Circle(3);").unwrap();
        assert_eq!(v.to_string(), "false");
    }

    #[test]
    fn unknown_variant_name_is_an_attribute_error() {
        let err = run("enum Color { Red } Color.Purple;").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AttributeError);
    }
}
