use std::{collections::HashMap, future::Future, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use serde::Serialize;
use serde_json::Value;

use crate::{
    args::Args,
    context::Context,
    error::{CallError, DefinitionError},
};

// -------------------------------------------------------------------------------------------------------

/// Types whose annotated methods have been registered. Usually implemented by `#[worker_class::methods]`.
pub trait Routed: Sized + Send + Sync + 'static {
    fn register(methods: &mut MethodTableBuilder<Self>);

    fn method_table() -> Result<MethodTable<Self>, DefinitionError> {
        let mut builder = MethodTableBuilder::new();
        Self::register(&mut builder);
        builder.build()
    }
}

/// invokes the undecorated method on the receiving instance, with the positional arguments of a request
pub type Handler<T> =
    Arc<dyn Fn(Arc<T>, Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

pub struct MethodEntry<T> {
    pub home: Context,
    pub handler: Handler<T>,
}

impl<T> Clone for MethodEntry<T> {
    fn clone(&self) -> Self {
        Self {
            home: self.home,
            handler: self.handler.clone(),
        }
    }
}

/// Statically registered mapping from wire name to handler, one per instance type.
pub struct MethodTable<T> {
    methods: HashMap<&'static str, MethodEntry<T>>,
}

impl<T> MethodTable<T> {
    pub fn get(&self, name: &str) -> Option<&MethodEntry<T>> {
        self.methods.get(name)
    }

    pub fn home_of(&self, name: &str) -> Option<Context> {
        self.methods.get(name).map(|entry| entry.home)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl<T> Clone for MethodTable<T> {
    fn clone(&self) -> Self {
        Self {
            methods: self.methods.clone(),
        }
    }
}

// -------------------------------------------------------------------------------------------------------

pub struct MethodTableBuilder<T> {
    methods: HashMap<&'static str, MethodEntry<T>>,
    errors: Vec<DefinitionError>,
}

impl<T: Send + Sync + 'static> MethodTableBuilder<T> {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// registers a method that always runs on the coordinator
    pub fn coordinator<A, R, F, Fut>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        A: Args,
        R: Serialize + 'static,
        F: Fn(Arc<T>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.method(Context::Coordinator, name, f)
    }

    /// registers a method that always runs on the worker
    pub fn worker<A, R, F, Fut>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        A: Args,
        R: Serialize + 'static,
        F: Fn(Arc<T>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.method(Context::Worker, name, f)
    }

    pub fn method<A, R, F, Fut>(&mut self, home: Context, name: &'static str, f: F) -> &mut Self
    where
        A: Args,
        R: Serialize + 'static,
        F: Fn(Arc<T>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        if name.is_empty() {
            self.errors.push(DefinitionError::EmptyMethodName);
            return self;
        }
        if self.methods.contains_key(name) {
            self.errors.push(DefinitionError::DuplicateMethod(name.to_string()));
            return self;
        }

        let handler: Handler<T> = Arc::new(move |this: Arc<T>, values: Vec<Value>| {
            match A::from_values(values) {
                Ok(args) => {
                    let fut = f(this, args);
                    async move {
                        let result = fut.await?;
                        let value = serde_json::to_value(result).map_err(CallError::Encode)?;
                        Ok::<Value, anyhow::Error>(value)
                    }
                    .boxed()
                }
                Err(err) => futures::future::ready(Err(anyhow::Error::new(err))).boxed(),
            }
        });

        self.methods.insert(name, MethodEntry { home, handler });
        self
    }

    pub fn build(self) -> Result<MethodTable<T>, DefinitionError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        Ok(MethodTable {
            methods: self.methods,
        })
    }
}

impl<T: Send + Sync + 'static> Default for MethodTableBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
