//! Tree-walking evaluator
//!
//! Every attribute read goes through the environment's gate, every loop and
//! unpacking through the guarded iterator, and every `print` into the
//! output capture of the current run.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::SandboxPolicy;
use crate::lang::ExecutableUnit;
use crate::lang::ast::{
    Arg, BinOp, BoolOp, CmpOp, Comprehension, Const, ExceptHandler, Expr, ExprKind, FStringPart,
    FunctionDef, Stmt, StmtKind, Target, UnaryOp,
};
use crate::sandbox::Environment;
use crate::sandbox::exception::{
    ExcKind, Exception, index_error, memory_error, overflow, type_error, value_error,
};
use crate::sandbox::format::{format_value, percent_format};
use crate::sandbox::gate::{Access, collect, guarded_iter, unpack};
use crate::sandbox::output::OutputCapture;
use crate::sandbox::value::{Args, BoundMethod, Dict, Function, Range, Value};
use crate::sandbox::{builtins, methods, modules};

/// A variable scope; function calls and comprehensions get a child scope
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn global() -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    pub fn set(&self, name: &str, value: Value) {
        let old = self.vars.borrow_mut().insert(name.to_owned(), value);
        drop(old);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars.borrow_mut().remove(name)
    }

    /// Drop every binding, breaking reference cycles through closures
    pub fn clear(&self) {
        let vars = std::mem::take(&mut *self.vars.borrow_mut());
        drop(vars);
    }
}

/// Control flow out of a block
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

type Eval<T> = Result<T, Exception>;

pub struct Interpreter {
    env: Environment,
    globals: Rc<Scope>,
    output: OutputCapture,
    rng: StdRng,
    depth: u32,
    modules: HashMap<String, Value>,
    handling: Vec<Exception>,
}

impl Interpreter {
    pub fn new(env: Environment) -> Self {
        let output = OutputCapture::new(env.policy().max_output);
        Self {
            env,
            globals: Scope::global(),
            output,
            rng: StdRng::from_entropy(),
            depth: 0,
            modules: HashMap::new(),
            handling: Vec::new(),
        }
    }

    /// Run a unit to completion, returning everything it printed
    pub fn run(mut self, unit: &ExecutableUnit) -> Result<String, Exception> {
        let globals = self.globals.clone();
        let result = self.exec_block(&unit.program().body, &globals);
        globals.clear();
        self.modules.clear();
        result.map(|_| self.output.finish())
    }

    pub fn policy(&self) -> &SandboxPolicy {
        self.env.policy()
    }

    pub fn output(&mut self) -> &mut OutputCapture {
        &mut self.output
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn reseed(&mut self, rng: StdRng) {
        self.rng = rng;
    }

    /// Refuse sequences longer than the policy allows
    pub fn check_len(&self, len: usize) -> Eval<()> {
        let limit = self.policy().max_sequence;
        if len > limit {
            return Err(memory_error(format!(
                "sequence of {len} items exceeds the limit of {limit}"
            )));
        }
        Ok(())
    }

    pub fn collect(&self, value: &Value) -> Eval<Vec<Value>> {
        collect(value, self.policy().max_sequence)
    }

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> Eval<Flow> {
        for stmt in body {
            match self.exec(stmt, scope).map_err(|e| e.at_line(stmt.line))? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Eval<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                self.aug_assign(target, *op, value, scope)?;
            }
            StmtKind::If { test, body, orelse } => {
                return if self.eval(test, scope)?.truthy() {
                    self.exec_block(body, scope)
                } else {
                    self.exec_block(orelse, scope)
                };
            }
            StmtKind::While { test, body, orelse } => {
                loop {
                    if !self.eval(test, scope)?.truthy() {
                        return self.exec_block(orelse, scope);
                    }
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter, scope)?;
                for item in guarded_iter(&iterable)? {
                    self.assign(target, item, scope)?;
                    match self.exec_block(body, scope)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                return self.exec_block(orelse, scope);
            }
            StmtKind::FunctionDef(def) => {
                let function = self.make_function(def, scope)?;
                scope.set(&def.name, function);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Import(names) => {
                for alias in names {
                    let module = self.import(&alias.name)?;
                    scope.set(alias.bound_name(), module);
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let module_value = self.import(module)?;
                for alias in names {
                    let value = self.get_attr(&module_value, &alias.name).map_err(|_| {
                        Exception::new(
                            ExcKind::ImportError,
                            format!("cannot import name '{}' from '{module}'", alias.name),
                        )
                    })?;
                    scope.set(alias.bound_name(), value);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, scope),
            StmtKind::Raise(exc) => return Err(self.raise(exc.as_ref(), scope)?),
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, scope)?.truthy() {
                    let message = match msg {
                        Some(msg) => self.eval(msg, scope)?.to_str(),
                        None => String::new(),
                    };
                    return Err(Exception::new(ExcKind::AssertionError, message));
                }
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        scope: &Rc<Scope>,
    ) -> Eval<Flow> {
        let outcome = match self.exec_block(body, scope) {
            Ok(Flow::Normal) => self.exec_block(orelse, scope),
            Ok(flow) => Ok(flow),
            Err(exc) => self.handle(exc, handlers, scope),
        };
        if finalbody.is_empty() {
            return outcome;
        }
        match self.exec_block(finalbody, scope)? {
            Flow::Normal => outcome,
            flow => Ok(flow),
        }
    }

    fn handle(
        &mut self,
        exc: Exception,
        handlers: &[ExceptHandler],
        scope: &Rc<Scope>,
    ) -> Eval<Flow> {
        for handler in handlers {
            let matched = match &handler.kind {
                None => true,
                Some(kind) => {
                    let kind = self.eval(kind, scope).map_err(|e| e.at_line(handler.line))?;
                    exception_matches(&exc, &kind)?
                }
            };
            if !matched {
                continue;
            }
            if let Some(name) = &handler.name {
                scope.set(name, Value::Exception(Rc::new(exc.clone())));
            }
            self.handling.push(exc);
            let result = self.exec_block(&handler.body, scope);
            self.handling.pop();
            if let Some(name) = &handler.name {
                scope.remove(name);
            }
            return result;
        }
        Err(exc)
    }

    fn raise(&mut self, exc: Option<&Expr>, scope: &Rc<Scope>) -> Eval<Exception> {
        let Some(expr) = exc else {
            return Ok(self.handling.last().cloned().unwrap_or_else(|| {
                Exception::new(ExcKind::RuntimeError, "No active exception to reraise")
            }));
        };
        match self.eval(expr, scope)? {
            Value::ExcType(kind) => Ok(Exception::new(kind, "")),
            Value::Exception(exc) => Ok((*exc).clone()),
            _ => Err(type_error("exceptions must derive from BaseException")),
        }
    }

    fn make_function(&mut self, def: &Rc<FunctionDef>, scope: &Rc<Scope>) -> Eval<Value> {
        let defaults = def
            .params
            .iter()
            .map(|param| {
                param
                    .default
                    .as_ref()
                    .map(|expr| self.eval(expr, scope))
                    .transpose()
            })
            .collect::<Eval<Vec<_>>>()?;
        Ok(Value::Function(Rc::new(Function {
            def: def.clone(),
            defaults,
            closure: scope.clone(),
        })))
    }

    fn import(&mut self, name: &str) -> Eval<Value> {
        if !self.policy().allows_module(name) {
            return Err(Exception::new(
                ExcKind::ImportError,
                format!("import of module '{name}' is not allowed"),
            ));
        }
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }
        let module = modules::load(name).ok_or_else(|| {
            Exception::new(ExcKind::ImportError, format!("No module named '{name}'"))
        })?;
        let module = Value::Module(Rc::new(module));
        self.modules.insert(name.to_owned(), module.clone());
        Ok(module)
    }

    fn assign(&mut self, target: &Target, value: Value, scope: &Rc<Scope>) -> Eval<()> {
        match target {
            Target::Name(name) => {
                scope.set(name, value);
                Ok(())
            }
            Target::Subscript {
                value: object,
                index,
            } => {
                let object = self.eval(object, scope)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let bounds = self.slice_bounds(lower, upper, step, scope)?;
                    return self.set_slice(&object, bounds, value);
                }
                let index = self.eval(index, scope)?;
                self.set_item(&object, index, value)
            }
            Target::Attribute {
                value: object,
                name,
            } => {
                let object = self.eval(object, scope)?;
                self.set_attr(&object, name)
            }
            Target::Tuple(targets) => {
                let items = unpack(&value, targets.len())?;
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, scope)?;
                }
                Ok(())
            }
        }
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr, scope: &Rc<Scope>) -> Eval<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name, scope)?;
                let rhs = self.eval(value, scope)?;
                let result = self.inplace(op, current, rhs)?;
                scope.set(name, result);
                Ok(())
            }
            Target::Subscript {
                value: object,
                index,
            } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                let current = self.get_item(&object, &index)?;
                let rhs = self.eval(value, scope)?;
                let result = self.inplace(op, current, rhs)?;
                self.set_item(&object, index, result)
            }
            Target::Attribute {
                value: object,
                name,
            } => {
                let object = self.eval(object, scope)?;
                self.get_attr(&object, name)?;
                self.set_attr(&object, name)
            }
            Target::Tuple(_) => Err(type_error(
                "illegal expression for augmented assignment",
            )),
        }
    }

    /// `+=` on a list extends it in place; everything else rebinds
    fn inplace(&mut self, op: BinOp, current: Value, rhs: Value) -> Eval<Value> {
        if op == BinOp::Add
            && let Value::List(list) = &current
        {
            let items = self.collect(&rhs)?;
            self.check_len(list.borrow().len() + items.len())?;
            list.borrow_mut().extend(items);
            return Ok(current);
        }
        self.binary(op, current, rhs)
    }

    fn delete(&mut self, target: &Target, scope: &Rc<Scope>) -> Eval<()> {
        match target {
            Target::Name(name) => scope.remove(name).map(|_| ()).ok_or_else(|| {
                Exception::new(
                    ExcKind::NameError,
                    format!("name '{name}' is not defined"),
                )
            }),
            Target::Subscript {
                value: object,
                index,
            } => {
                let object = self.eval(object, scope)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let bounds = self.slice_bounds(lower, upper, step, scope)?;
                    return self.delete_slice(&object, bounds);
                }
                let index = self.eval(index, scope)?;
                self.delete_item(&object, &index)
            }
            Target::Attribute {
                value: object,
                name,
            } => {
                let object = self.eval(object, scope)?;
                self.set_attr(&object, name)
            }
            Target::Tuple(targets) => targets.iter().try_for_each(|t| self.delete(t, scope)),
        }
    }

    fn lookup(&self, name: &str, scope: &Rc<Scope>) -> Eval<Value> {
        if let Some(value) = scope.lookup(name) {
            return Ok(value);
        }
        self.env.builtin(name).cloned().ok_or_else(|| {
            Exception::new(ExcKind::NameError, format!("name '{name}' is not defined"))
        })
    }

    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Eval<Value> {
        match &expr.kind {
            ExprKind::Name(name) => self.lookup(name, scope),
            ExprKind::Const(c) => Ok(match c {
                Const::None => Value::None,
                Const::Bool(b) => Value::Bool(*b),
                Const::Int(i) => Value::Int(*i),
                Const::Float(f) => Value::Float(*f),
                Const::Str(s) => Value::Str(s.clone()),
            }),
            ExprKind::FString(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        FStringPart::Literal(literal) => text.push_str(literal),
                        FStringPart::Field {
                            expr,
                            conversion,
                            spec,
                        } => {
                            let mut value = self.eval(expr, scope)?;
                            match conversion {
                                Some('r') | Some('a') => value = Value::from(value.repr()),
                                Some('s') => value = Value::from(value.to_str()),
                                _ => {}
                            }
                            text.push_str(&format_value(&value, spec.as_deref().unwrap_or(""))?);
                        }
                    }
                    self.check_len(text.len())?;
                }
                Ok(Value::from(text))
            }
            ExprKind::List(items) => {
                let items = self.eval_all(items, scope)?;
                Ok(Value::list(items))
            }
            ExprKind::Tuple(items) => {
                let items = self.eval_all(items, scope)?;
                Ok(Value::tuple(items))
            }
            ExprKind::Dict(pairs) => {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    let key = self.eval(key, scope)?;
                    let value = self.eval(value, scope)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::dict(dict))
            }
            ExprKind::ListComp { elt, generators } => {
                let comp_scope = Scope::child(scope);
                let mut out = Vec::new();
                self.comprehension(elt, generators, &comp_scope, &mut out)?;
                Ok(Value::list(out))
            }
            ExprKind::BinOp { left, op, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary(*op, left, right)
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.eval(operand, scope)?;
                unary(*op, operand)
            }
            ExprKind::BoolOp { op, left, right } => {
                let left = self.eval(left, scope)?;
                match (op, left.truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                    _ => self.eval(right, scope),
                }
            }
            ExprKind::Compare { left, ops } => {
                let mut left = self.eval(left, scope)?;
                for (op, right) in ops {
                    let right = self.eval(right, scope)?;
                    if !self.compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(body, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
            ExprKind::Call { func, args } => {
                let func = self.eval(func, scope)?;
                let args = self.eval_args(args, scope)?;
                self.call(&func, args)
            }
            ExprKind::Attribute { value, name } => {
                let value = self.eval(value, scope)?;
                self.get_attr(&value, name)
            }
            ExprKind::Subscript { value, index } => {
                let value = self.eval(value, scope)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let bounds = self.slice_bounds(lower, upper, step, scope)?;
                    return self.get_slice(&value, bounds);
                }
                let index = self.eval(index, scope)?;
                self.get_item(&value, &index)
            }
            ExprKind::Slice { .. } => Err(type_error("slices are only valid inside subscripts")),
            ExprKind::Lambda(def) => self.make_function(def, scope),
        }
    }

    fn eval_all(&mut self, items: &[Expr], scope: &Rc<Scope>) -> Eval<Vec<Value>> {
        items.iter().map(|item| self.eval(item, scope)).collect()
    }

    fn eval_args(&mut self, args: &[Arg], scope: &Rc<Scope>) -> Eval<Args> {
        let mut out = Args::default();
        for arg in args {
            match arg {
                Arg::Positional(expr) => {
                    let value = self.eval(expr, scope)?;
                    out.positional.push(value);
                }
                Arg::Star(expr) => {
                    let value = self.eval(expr, scope)?;
                    let items = self.collect(&value)?;
                    out.positional.extend(items);
                }
                Arg::Keyword(name, expr) => {
                    let value = self.eval(expr, scope)?;
                    if out.keywords.iter().any(|(k, _)| k == name) {
                        return Err(type_error(format!(
                            "keyword argument repeated: {name}"
                        )));
                    }
                    out.keywords.push((name.clone(), value));
                }
            }
        }
        Ok(out)
    }

    fn comprehension(
        &mut self,
        elt: &Expr,
        generators: &[Comprehension],
        scope: &Rc<Scope>,
        out: &mut Vec<Value>,
    ) -> Eval<()> {
        let Some((generator, rest)) = generators.split_first() else {
            let value = self.eval(elt, scope)?;
            self.check_len(out.len() + 1)?;
            out.push(value);
            return Ok(());
        };
        let iterable = self.eval(&generator.iter, scope)?;
        'items: for item in guarded_iter(&iterable)? {
            self.assign(&generator.target, item, scope)?;
            for cond in &generator.ifs {
                if !self.eval(cond, scope)?.truthy() {
                    continue 'items;
                }
            }
            self.comprehension(elt, rest, scope, out)?;
        }
        Ok(())
    }

    /// Call any callable value
    pub fn call(&mut self, func: &Value, args: Args) -> Eval<Value> {
        match func {
            Value::Function(function) => {
                self.depth += 1;
                let result = if self.depth > self.policy().max_recursion {
                    Err(Exception::new(
                        ExcKind::RecursionError,
                        "maximum recursion depth exceeded",
                    ))
                } else {
                    self.invoke(function, args)
                };
                self.depth -= 1;
                result
            }
            Value::Builtin(builtin) => (builtin.func)(self, args),
            Value::BoundMethod(method) => methods::call(self, &method.receiver, method.name, args),
            Value::Type(kind) => builtins::construct(self, *kind, args),
            Value::ExcType(kind) => {
                args.check(kind.name(), 0, usize::MAX)?;
                let message = match args.positional.as_slice() {
                    [] => String::new(),
                    [single] => single.to_str(),
                    many => Value::tuple(many.to_vec()).repr(),
                };
                Ok(Value::Exception(Rc::new(Exception::new(*kind, message))))
            }
            other => Err(type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn invoke(&mut self, function: &Function, args: Args) -> Eval<Value> {
        let def = &function.def;
        let params = &def.params;
        let scope = Scope::child(&function.closure);

        let mut bound: Vec<Option<Value>> = vec![None; params.len()];
        let mut positional = args.positional.into_iter();
        for (slot, value) in bound.iter_mut().zip(positional.by_ref()) {
            *slot = Some(value);
        }
        let extra: Vec<Value> = positional.collect();
        if !extra.is_empty() && def.vararg.is_none() {
            let given = params.len() + extra.len();
            let plural = if params.len() == 1 { "" } else { "s" };
            return Err(type_error(format!(
                "{}() takes {} positional argument{plural} but {given} were given",
                def.name,
                params.len()
            )));
        }

        for (name, value) in args.keywords {
            let Some(i) = params.iter().position(|p| p.name == name) else {
                return Err(type_error(format!(
                    "{}() got an unexpected keyword argument '{name}'",
                    def.name
                )));
            };
            if bound[i].is_some() {
                return Err(type_error(format!(
                    "{}() got multiple values for argument '{name}'",
                    def.name
                )));
            }
            bound[i] = Some(value);
        }

        for ((param, slot), default) in params.iter().zip(bound).zip(&function.defaults) {
            let value = match slot.or_else(|| default.clone()) {
                Some(value) => value,
                None => {
                    return Err(type_error(format!(
                        "{}() missing required argument: '{}'",
                        def.name, param.name
                    )));
                }
            };
            scope.set(&param.name, value);
        }
        if let Some(vararg) = &def.vararg {
            scope.set(vararg, Value::tuple(extra));
        }

        match self.exec_block(&def.body, &scope)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    pub fn get_attr(&mut self, object: &Value, name: &str) -> Eval<Value> {
        if let Access::Denied(reason) = self.env.gate().check(object, name) {
            return Err(Exception::new(ExcKind::AttributeError, reason));
        }
        match object {
            Value::Module(module) => module.attrs.get(name).cloned().ok_or_else(|| {
                Exception::new(
                    ExcKind::AttributeError,
                    format!("module '{}' has no attribute '{name}'", module.name),
                )
            }),
            Value::Exception(exc) if name == "args" => Ok(if exc.message.is_empty() {
                Value::tuple(Vec::new())
            } else {
                Value::tuple(vec![Value::from(exc.message.as_str())])
            }),
            _ => match methods::lookup(object, name) {
                Some(method) => Ok(Value::BoundMethod(Rc::new(BoundMethod {
                    receiver: object.clone(),
                    name: method,
                }))),
                None => Err(Exception::new(
                    ExcKind::AttributeError,
                    format!("'{}' object has no attribute '{name}'", object.type_name()),
                )),
            },
        }
    }

    /// No value a script can reach has writable attributes
    fn set_attr(&mut self, object: &Value, name: &str) -> Eval<()> {
        if let Access::Denied(reason) = self.env.gate().check(object, name) {
            return Err(Exception::new(ExcKind::AttributeError, reason));
        }
        Err(Exception::new(
            ExcKind::AttributeError,
            format!(
                "'{}' object attribute '{name}' is read-only",
                object.type_name()
            ),
        ))
    }

    pub fn binary(&mut self, op: BinOp, left: Value, right: Value) -> Eval<Value> {
        if let Some(result) = numeric(op, &left, &right) {
            return result;
        }
        match (op, &left, &right) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                self.check_len(a.len() + b.len())?;
                Ok(Value::from(format!("{a}{b}")))
            }
            (BinOp::Add, Value::Str(_), other) => Err(type_error(format!(
                "can only concatenate str (not \"{}\") to str",
                other.type_name()
            ))),
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                self.check_len(items.len())?;
                Ok(Value::list(items))
            }
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                self.check_len(a.len() + b.len())?;
                Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
            }
            (BinOp::Mul, seq, count) | (BinOp::Mul, count, seq)
                if count.as_int().is_some()
                    && matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_)) =>
            {
                let times = usize::try_from(count.as_int().unwrap_or_default()).unwrap_or(0);
                self.repeat(seq, times)
            }
            (BinOp::Mod, Value::Str(template), args) => {
                let text = percent_format(template, args)?;
                self.check_len(text.len())?;
                Ok(Value::from(text))
            }
            _ => Err(type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn repeat(&self, seq: &Value, times: usize) -> Eval<Value> {
        let len = match seq {
            Value::Str(s) => s.len(),
            Value::List(items) => items.borrow().len(),
            Value::Tuple(items) => items.len(),
            _ => 0,
        };
        self.check_len(len.saturating_mul(times))?;
        Ok(match seq {
            Value::Str(s) => Value::from(s.repeat(times)),
            Value::List(items) => Value::list(repeat_items(&items.borrow(), times)),
            Value::Tuple(items) => Value::tuple(repeat_items(items, times)),
            other => other.clone(),
        })
    }

    fn compare(&mut self, op: CmpOp, left: &Value, right: &Value) -> Eval<bool> {
        let ordering = |wanted: &[Ordering]| -> Eval<bool> {
            Ok(left
                .compare(right, op.symbol())?
                .is_some_and(|ord| wanted.contains(&ord)))
        };
        match op {
            CmpOp::Eq => left.equals(right),
            CmpOp::NotEq => left.equals(right).map(|equal| !equal),
            CmpOp::Lt => ordering(&[Ordering::Less]),
            CmpOp::LtE => ordering(&[Ordering::Less, Ordering::Equal]),
            CmpOp::Gt => ordering(&[Ordering::Greater]),
            CmpOp::GtE => ordering(&[Ordering::Greater, Ordering::Equal]),
            CmpOp::In => contains(right, left),
            CmpOp::NotIn => contains(right, left).map(|found| !found),
            CmpOp::Is => Ok(left.is(right)),
            CmpOp::IsNot => Ok(!left.is(right)),
        }
    }

    pub fn get_item(&mut self, object: &Value, index: &Value) -> Eval<Value> {
        match object {
            Value::List(items) => {
                let items = items.borrow();
                let i = sequence_index(index, items.len(), "list")?;
                Ok(items[i].clone())
            }
            Value::Tuple(items) => {
                let i = sequence_index(index, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = sequence_index(index, chars.len(), "string")?;
                Ok(Value::from(chars[i].to_string()))
            }
            Value::Range(range) => {
                let i = sequence_index(index, range.len(), "range object")?;
                range.get(i).map(Value::Int).ok_or_else(overflow)
            }
            Value::Dict(dict) => dict
                .borrow()
                .get(index)?
                .ok_or_else(|| Exception::new(ExcKind::KeyError, index.repr())),
            other => Err(type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn set_item(&mut self, object: &Value, index: Value, value: Value) -> Eval<()> {
        match object {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let i = sequence_index(&index, items.len(), "list assignment")?;
                items[i] = value;
                Ok(())
            }
            Value::Dict(dict) => {
                let len = dict.borrow().len();
                self.check_len(len + 1)?;
                dict.borrow_mut().insert(index, value)
            }
            other => Err(type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    fn delete_item(&mut self, object: &Value, index: &Value) -> Eval<()> {
        match object {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let i = sequence_index(index, items.len(), "list assignment")?;
                items.remove(i);
                Ok(())
            }
            Value::Dict(dict) => dict
                .borrow_mut()
                .remove(index)?
                .map(|_| ())
                .ok_or_else(|| Exception::new(ExcKind::KeyError, index.repr())),
            other => Err(type_error(format!(
                "'{}' object does not support item deletion",
                other.type_name()
            ))),
        }
    }

    fn slice_bounds(
        &mut self,
        lower: &Option<Box<Expr>>,
        upper: &Option<Box<Expr>>,
        step: &Option<Box<Expr>>,
        scope: &Rc<Scope>,
    ) -> Eval<SliceBounds> {
        let mut bound = |expr: &Option<Box<Expr>>| -> Eval<Option<i64>> {
            let Some(expr) = expr else { return Ok(None) };
            match self.eval(expr, scope)? {
                Value::None => Ok(None),
                value => value.as_int().map(Some).ok_or_else(|| {
                    type_error("slice indices must be integers or None")
                }),
            }
        };
        Ok(SliceBounds {
            lower: bound(lower)?,
            upper: bound(upper)?,
            step: bound(step)?,
        })
    }

    fn get_slice(&mut self, object: &Value, bounds: SliceBounds) -> Eval<Value> {
        match object {
            Value::List(items) => {
                let items = items.borrow();
                let picked = bounds.indices(items.len())?;
                Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Tuple(items) => {
                let picked = bounds.indices(items.len())?;
                Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = bounds.indices(chars.len())?;
                Ok(Value::from(picked.into_iter().map(|i| chars[i]).collect::<String>()))
            }
            Value::Range(range) => {
                let (start, stop, step) = bounds.resolve(range.len())?;
                let at = |i: i64| -> Eval<i64> {
                    let value = range.start as i128 + i as i128 * range.step as i128;
                    i64::try_from(value).map_err(|_| overflow())
                };
                Ok(Value::Range(Range {
                    start: at(start)?,
                    stop: at(stop)?,
                    step: range.step.checked_mul(step).ok_or_else(overflow)?,
                }))
            }
            other => Err(type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn set_slice(&mut self, object: &Value, bounds: SliceBounds, value: Value) -> Eval<()> {
        let Value::List(items) = object else {
            return Err(type_error(format!(
                "'{}' object does not support slice assignment",
                object.type_name()
            )));
        };
        let replacement = self.collect(&value)?;
        let mut items = items.borrow_mut();
        let len = items.len();
        if bounds.step.unwrap_or(1) == 1 {
            let (start, stop, _) = bounds.resolve(len)?;
            let start = start.clamp(0, len as i64) as usize;
            let stop = (stop.clamp(0, len as i64) as usize).max(start);
            self.check_len(len - (stop - start) + replacement.len())?;
            items.splice(start..stop, replacement);
            return Ok(());
        }
        let picked = bounds.indices(len)?;
        if picked.len() != replacement.len() {
            return Err(value_error(format!(
                "attempt to assign sequence of size {} to extended slice of size {}",
                replacement.len(),
                picked.len()
            )));
        }
        for (i, item) in picked.into_iter().zip(replacement) {
            items[i] = item;
        }
        Ok(())
    }

    fn delete_slice(&mut self, object: &Value, bounds: SliceBounds) -> Eval<()> {
        let Value::List(items) = object else {
            return Err(type_error(format!(
                "'{}' object does not support item deletion",
                object.type_name()
            )));
        };
        let mut items = items.borrow_mut();
        let mut picked = bounds.indices(items.len())?;
        picked.sort_unstable();
        for i in picked.into_iter().rev() {
            items.remove(i);
        }
        Ok(())
    }
}

/// Evaluated `lower:upper:step`
#[derive(Debug, Clone, Copy)]
pub struct SliceBounds {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub step: Option<i64>,
}

impl SliceBounds {
    /// Clamp to a sequence length: (start, stop, step)
    fn resolve(&self, len: usize) -> Eval<(i64, i64, i64)> {
        let len = len as i64;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(value_error("slice step cannot be zero"));
        }
        let clamp = |value: Option<i64>, default: i64| -> i64 {
            let Some(mut v) = value else { return default };
            if v < 0 {
                v = v.saturating_add(len);
            }
            if step > 0 {
                v.clamp(0, len)
            } else {
                v.clamp(-1, len - 1)
            }
        };
        Ok(if step > 0 {
            (clamp(self.lower, 0), clamp(self.upper, len), step)
        } else {
            (clamp(self.lower, len - 1), clamp(self.upper, -1), step)
        })
    }

    fn indices(&self, len: usize) -> Eval<Vec<usize>> {
        let (start, stop, step) = self.resolve(len)?;
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(out)
    }
}

/// Index of the first element equal to `item`
pub(crate) fn position(items: &[Value], item: &Value) -> Eval<Option<usize>> {
    for (i, candidate) in items.iter().enumerate() {
        if candidate.equals(item)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

fn repeat_items(items: &[Value], times: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len().saturating_mul(times));
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    out
}

fn sequence_index(index: &Value, len: usize, what: &str) -> Eval<usize> {
    let Some(i) = index.as_int() else {
        let noun = what.split(' ').next().unwrap_or(what);
        return Err(type_error(format!(
            "{noun} indices must be integers or slices, not {}",
            index.type_name()
        )));
    };
    let len = len as i64;
    let resolved = if i < 0 { i + len } else { i };
    if resolved < 0 || resolved >= len {
        return Err(index_error(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

fn exception_matches(exc: &Exception, kind: &Value) -> Eval<bool> {
    match kind {
        Value::ExcType(kind) => Ok(exc.kind.is_subclass_of(*kind)),
        Value::Tuple(kinds) => {
            for kind in kinds.iter() {
                if exception_matches(exc, kind)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn contains(container: &Value, item: &Value) -> Eval<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => Err(type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => position(&items.borrow(), item).map(|at| at.is_some()),
        Value::Tuple(items) => position(items, item).map(|at| at.is_some()),
        Value::Dict(dict) => dict.borrow().contains(item),
        Value::Range(range) => Ok(match item {
            Value::Float(f) if f.fract() == 0.0 => range.contains(*f as i64),
            other => other.as_int().is_some_and(|i| range.contains(i)),
        }),
        other => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn unary(op: UnaryOp, operand: Value) -> Eval<Value> {
    match (op, &operand) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, v) if v.as_int().is_some() => v
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(overflow),
        (UnaryOp::Pos, v) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or_default())),
        (UnaryOp::Invert, v) if v.as_int().is_some() => {
            Ok(Value::Int(!v.as_int().unwrap_or_default()))
        }
        (op, v) => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                _ => "~",
            };
            Err(type_error(format!(
                "bad operand type for unary {symbol}: '{}'",
                v.type_name()
            )))
        }
    }
}

/// Arithmetic on ints, bools and floats; `None` when an operand is not a number
fn numeric(op: BinOp, left: &Value, right: &Value) -> Option<Eval<Value>> {
    if let (Value::Bool(a), Value::Bool(b)) = (left, right) {
        match op {
            BinOp::BitAnd => return Some(Ok(Value::Bool(a & b))),
            BinOp::BitOr => return Some(Ok(Value::Bool(a | b))),
            BinOp::BitXor => return Some(Ok(Value::Bool(a ^ b))),
            _ => {}
        }
    }
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return Some(int_arith(op, a, b));
    }
    let (a, b) = (left.as_float()?, right.as_float()?);
    Some(float_arith(op, a, b, left.type_name(), right.type_name()))
}

fn zero_division(message: &str) -> Exception {
    Exception::new(ExcKind::ZeroDivisionError, message)
}

fn int_arith(op: BinOp, a: i64, b: i64) -> Eval<Value> {
    let int = |v: Option<i64>| v.map(Value::Int).ok_or_else(overflow);
    match op {
        BinOp::Add => int(a.checked_add(b)),
        BinOp::Sub => int(a.checked_sub(b)),
        BinOp::Mul => int(a.checked_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return Err(zero_division("division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            Ok(Value::Int(if adjust { q - 1 } else { q }))
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            let r = a.checked_rem(b).unwrap_or(0);
            Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(zero_division("0.0 cannot be raised to a negative power"));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            int(a.checked_pow(exp))
        }
        BinOp::LShift => {
            if b < 0 {
                return Err(value_error("negative shift count"));
            }
            if a == 0 {
                return Ok(Value::Int(0));
            }
            if b >= 63 {
                return Err(overflow());
            }
            let shifted = a << b;
            if shifted >> b != a {
                return Err(overflow());
            }
            Ok(Value::Int(shifted))
        }
        BinOp::RShift => {
            if b < 0 {
                return Err(value_error("negative shift count"));
            }
            Ok(Value::Int(if b >= 64 {
                if a < 0 { -1 } else { 0 }
            } else {
                a >> b
            }))
        }
        BinOp::BitAnd => Ok(Value::Int(a & b)),
        BinOp::BitOr => Ok(Value::Int(a | b)),
        BinOp::BitXor => Ok(Value::Int(a ^ b)),
    }
}

fn float_arith(op: BinOp, a: f64, b: f64, left: &str, right: &str) -> Eval<Value> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(value_error(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            let result = a.powf(b);
            if result.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(Exception::new(
                    ExcKind::OverflowError,
                    "numerical result out of range",
                ));
            }
            result
        }
        _ => {
            return Err(type_error(format!(
                "unsupported operand type(s) for {}: '{left}' and '{right}'",
                op.symbol()
            )));
        }
    };
    Ok(Value::Float(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::compile;

    fn run_with(policy: SandboxPolicy, source: &str) -> Result<String, Exception> {
        let source = source.to_owned();
        std::thread::Builder::new()
            .stack_size(crate::engine::STACK_SIZE)
            .spawn(move || {
                let unit = compile(&source, &policy).unwrap();
                Interpreter::new(Environment::new(&policy)).run(&unit)
            })
            .unwrap()
            .join()
            .unwrap()
    }

    fn run(source: &str) -> Result<String, Exception> {
        run_with(SandboxPolicy::default(), source)
    }

    fn output(source: &str) -> String {
        run(source).unwrap()
    }

    fn error(source: &str) -> Exception {
        run(source).unwrap_err()
    }

    #[test]
    fn arithmetic_follows_floor_semantics() {
        assert_eq!(output("print(7 // 2, -7 // 2, 7 % -3, -7 % 3)"), "3 -4 -2 2\n");
        assert_eq!(output("print(7 / 2, 2 ** 10, 2 ** -1)"), "3.5 1024 0.5\n");
        assert_eq!(output("print(-7.5 // 2, 7.5 % 2)"), "-4.0 1.5\n");
    }

    #[test]
    fn integer_overflow_raises() {
        let err = error("x = 2 ** 100");
        assert_eq!(err.kind, ExcKind::OverflowError);
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn division_by_zero() {
        let err = error("x = 1\ny = x / 0");
        assert_eq!(err.kind, ExcKind::ZeroDivisionError);
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero (line 2)");
    }

    #[test]
    fn functions_defaults_varargs_and_closures() {
        let source = "\
def make(n):
    def add(x, y=1, *rest):
        return x + y + n + sum(rest)
    return add

f = make(10)
print(f(1), f(1, 2), f(1, 2, 3, 4), f(x=5, y=0))
";
        assert_eq!(output(source), "12 13 20 15\n");
    }

    #[test]
    fn argument_errors() {
        let err = error("def f(a):\n    return a\nf()");
        assert!(err.message.contains("missing required argument: 'a'"));
        let err = error("def f(a):\n    return a\nf(1, 2)");
        assert!(err.message.contains("takes 1 positional argument but 2 were given"));
        let err = error("def f(a):\n    return a\nf(b=1)");
        assert!(err.message.contains("unexpected keyword argument 'b'"));
    }

    #[test]
    fn recursion_limit() {
        let err = error("def f(n):\n    return f(n + 1)\nf(0)");
        assert_eq!(err.kind, ExcKind::RecursionError);
        assert_eq!(output("def fact(n):\n    return 1 if n < 2 else n * fact(n - 1)\nprint(fact(20))"), "2432902008176640000\n");
    }

    #[test]
    fn loops_with_else_break_continue() {
        let source = "\
for i in range(5):
    if i == 1:
        continue
    if i == 3:
        break
    print(i)
else:
    print('not reached')
n = 0
while n < 3:
    n += 1
else:
    print('done', n)
";
        assert_eq!(output(source), "0\n2\ndone 3\n");
    }

    #[test]
    fn try_except_finally() {
        let source = "\
def f(x):
    try:
        return 10 / x
    except ZeroDivisionError as e:
        print('caught', e)
        return -1
    finally:
        print('finally')

print(f(2))
print(f(0))
try:
    [][1]
except (KeyError, IndexError) as e:
    print(type(e), e.args)
try:
    raise ValueError('bad')
except Exception:
    print('base caught')
";
        assert_eq!(
            output(source),
            "finally\n5.0\ncaught division by zero\nfinally\n-1\n<class 'IndexError'> ('list index out of range',)\nbase caught\n"
        );
    }

    #[test]
    fn bare_raise_reraises() {
        let err = error("try:\n    1/0\nexcept ZeroDivisionError:\n    raise");
        assert_eq!(err.kind, ExcKind::ZeroDivisionError);
    }

    #[test]
    fn unpacking_and_comprehensions() {
        let source = "\
a, (b, c) = 1, [2, 3]
print(a, b, c)
print([x * y for x in range(3) for y in range(3) if x != y])
print(sum(x for x in range(5)))
d = {'a': 1} if True else {}
print(d)
";
        assert_eq!(output(source), "1 2 3\n[0, 0, 0, 2, 0, 2]\n10\n{'a': 1}\n");
    }

    #[test]
    fn slicing() {
        let source = "\
s = 'abcdef'
l = list(range(10))
print(s[::-1], s[1:3], s[-2:], l[::3], l[8:2:-2])
l[1:3] = ['x']
del l[5:]
print(l)
print(range(10)[2:8:2])
";
        assert_eq!(
            output(source),
            "fedcba bc ef [0, 3, 6, 9] [8, 6, 4]\n[0, 'x', 3, 4, 5]\nrange(2, 8, 2)\n"
        );
    }

    #[test]
    fn fstrings_and_percent_formatting() {
        let source = "\
name = 'duck'
x = 3.14159
print(f'{name!r} {x:.2f} {len(name):>4}|')
print('%s has %d letters' % (name, len(name)))
";
        assert_eq!(output(source), "'duck' 3.14    4|\nduck has 4 letters\n");
    }

    #[test]
    fn name_errors() {
        let err = error("print(undefined)");
        assert_eq!(err.kind, ExcKind::NameError);
        assert_eq!(err.message, "name 'undefined' is not defined");
    }

    #[test]
    fn gate_blocks_dunder_attributes() {
        let err = error("x = 'a'\ny = x.__class__");
        assert_eq!(err.kind, ExcKind::AttributeError);
        assert!(err.message.contains("'__class__'"));
        let err = error("'{0.__class__}'.format(1)");
        assert_eq!(err.kind, ExcKind::AttributeError);
    }

    #[test]
    fn attributes_are_read_only() {
        let err = error("import math\nmath.pi = 3");
        assert_eq!(err.kind, ExcKind::AttributeError);
    }

    #[test]
    fn custom_gate_is_consulted() {
        let policy = SandboxPolicy::default();
        let unit = compile("print('a'.upper())", &policy).unwrap();
        let gate = |_: &Value, name: &str| {
            if name == "upper" {
                Access::Denied("no shouting".to_owned())
            } else {
                Access::Allowed
            }
        };
        let err = Interpreter::new(Environment::with_gate(&policy, gate))
            .run(&unit)
            .unwrap_err();
        assert_eq!(err.message, "no shouting");
    }

    #[test]
    fn runtime_import_gate() {
        let restricted = SandboxPolicy::default().with_modules(["random"]);
        let unit = compile("import random", &restricted).unwrap();
        assert!(Interpreter::new(Environment::new(&restricted)).run(&unit).is_ok());
        let unit = compile("import math", &SandboxPolicy::default()).unwrap();
        let err = Interpreter::new(Environment::new(&restricted))
            .run(&unit)
            .unwrap_err();
        assert_eq!(err.kind, ExcKind::ImportError);
        assert!(err.message.contains("'math'"));
    }

    #[test]
    fn sequence_limit() {
        let policy = SandboxPolicy::default().with_max_sequence(100);
        let err = run_with(policy.clone(), "x = [0] * 1000").unwrap_err();
        assert_eq!(err.kind, ExcKind::MemoryError);
        let err = run_with(policy, "x = []\nwhile True:\n    x.append(1)").unwrap_err();
        assert_eq!(err.kind, ExcKind::MemoryError);
    }

    #[test]
    fn output_limit() {
        let policy = SandboxPolicy::default().with_max_output(10);
        let err = run_with(policy, "while True:\n    print('spam')").unwrap_err();
        assert_eq!(err.to_string(), "MemoryError: output limit exceeded (line 2)");
    }

    #[test]
    fn list_aliasing_and_inplace_add() {
        assert_eq!(output("a = [1]\nb = a\nb += [2]\nprint(a)"), "[1, 2]\n");
    }

    #[test]
    fn chained_comparison_and_membership() {
        assert_eq!(
            output("print(1 < 2 < 3, 1 < 3 < 2, 'a' in 'cat', 3 not in [1, 2], 2 in range(0, 4, 2))"),
            "True False True True True\n"
        );
    }

    #[test]
    fn dict_errors() {
        let err = error("d = {}\nd['missing']");
        assert_eq!(err.kind, ExcKind::KeyError);
        assert_eq!(err.message, "'missing'");
        let err = error("d = {[1]: 2}");
        assert_eq!(err.kind, ExcKind::TypeError);
    }

    #[test]
    fn lambdas_take_parameters() {
        assert_eq!(output("f = lambda x: -x\nprint(f(2))"), "-2\n");
        assert_eq!(output("add = lambda a, b: a + b\nprint(add(2, 3))"), "5\n");
        assert_eq!(
            output("print(sorted([3, 1, 2], key=lambda x: -x))"),
            "[3, 2, 1]\n"
        );
        assert_eq!(
            output("print(max(['aa', 'b', 'ccc'], key=lambda s: len(s)))"),
            "ccc\n"
        );
        assert_eq!(
            output("print(list(map(lambda x: x * 2, [1, 2])))"),
            "[2, 4]\n"
        );
    }

    #[test]
    fn sequence_repetition() {
        assert_eq!(
            output("print([0] * 3, (1, 2) * 2, [[1]] * 0, 2 * 'ab')"),
            "[0, 0, 0] (1, 2, 1, 2) [] abab\n"
        );
        assert_eq!(output("a = [[]] * 2\na[0].append(1)\nprint(a)"), "[[1], [1]]\n");
    }

    #[test]
    fn sorting_unordered_floats_completes() {
        assert_eq!(
            output("print(sorted([3.0, float('nan'), 1.0]))"),
            "[3.0, nan, 1.0]\n"
        );
        let source = "\
xs = [float('nan')] + [float(i % 7) for i in range(30)] + [float('nan')]
ys = sorted(xs)
xs.sort(reverse=True)
print(len(ys), len(xs))
";
        assert_eq!(output(source), "32 32\n");
    }

    #[test]
    fn sorting_is_stable_in_both_directions() {
        assert_eq!(
            output("print(sorted(['bb', 'a', 'cc', 'd'], key=len, reverse=True))"),
            "['bb', 'cc', 'a', 'd']\n"
        );
        assert_eq!(
            output("print(sorted(['bb', 'a', 'cc', 'd'], key=len))"),
            "['a', 'd', 'bb', 'cc']\n"
        );
    }

    #[test]
    fn sorting_mixed_types_raises() {
        let err = error("sorted([1, 'a', 2])");
        assert_eq!(err.kind, ExcKind::TypeError);
    }

    #[test]
    fn comparing_cyclic_lists_raises() {
        let setup = "a = []\na.append(a)\nb = []\nb.append(b)\n";
        for check in ["print(a == b)", "print(a < b)", "print(a in [b])", "print([a].count(b))"] {
            let err = error(&format!("{setup}{check}"));
            assert_eq!(err.kind, ExcKind::RecursionError, "{check}");
        }
        assert_eq!(output(&format!("{setup}print(a == a)")), "True\n");
    }
}
