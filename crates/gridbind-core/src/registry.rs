use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::sync::Arc;

use dashmap::DashMap;
use gridbind_spec::{BindingManifest, TypeBinding};
use once_cell::sync::Lazy;
use parking_lot::ReentrantMutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::compiler::{CompileOptions, compile};
use crate::error::CompileError;
use crate::mapping::{CompiledMapping, MAX_NESTING_DEPTH};
use crate::schema::Record;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

#[derive(Default)]
struct PendingState {
    bindings: FxHashMap<TypeId, TypeBinding>,
    compiling: FxHashSet<TypeId>,
}

/// Type → compiled mapping cache.
///
/// Bindings are stored under a single re-entrant lock so nested item types
/// can be compiled recursively. Published mappings live in a concurrent map
/// and are read without taking the lock.
pub struct Registry {
    compiled: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    pending: ReentrantMutex<RefCell<PendingState>>,
    options: CompileOptions,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_options(CompileOptions::default())
    }

    pub fn with_options(options: CompileOptions) -> Self {
        Self {
            compiled: DashMap::new(),
            pending: ReentrantMutex::new(RefCell::new(PendingState::default())),
            options,
        }
    }

    /// Process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    pub fn options(&self) -> CompileOptions {
        self.options
    }

    /// Store the binding for `T`, replacing any previous one. Compiled plans
    /// are dropped so nested types pick up the change.
    pub fn configure<T: Record>(&self, binding: TypeBinding) -> Result<(), CompileError> {
        binding.validate()?;
        let guard = self.pending.lock();
        guard
            .borrow_mut()
            .bindings
            .insert(TypeId::of::<T>(), binding);
        self.compiled.clear();
        Ok(())
    }

    /// Build the binding for `T` starting from an empty one named after the schema.
    pub fn configure_with<T: Record>(
        &self,
        build: impl FnOnce(TypeBinding) -> TypeBinding,
    ) -> Result<(), CompileError> {
        let binding = build(TypeBinding::new(T::schema().type_name()));
        self.configure::<T>(binding)
    }

    /// Take `T`'s binding from a manifest, matching on the schema's type name.
    pub fn configure_manifest<T: Record>(
        &self,
        manifest: &BindingManifest,
    ) -> Result<(), CompileError> {
        manifest.validate()?;
        let type_name = T::schema().type_name();
        let binding = manifest
            .binding_for(type_name)
            .cloned()
            .ok_or_else(|| CompileError::NotConfigured {
                type_name: type_name.to_string(),
            })?;
        self.configure::<T>(binding)
    }

    pub fn has_mapping<T: Record>(&self) -> bool {
        let id = TypeId::of::<T>();
        if self.compiled.contains_key(&id) {
            return true;
        }
        let guard = self.pending.lock();
        let has = guard.borrow().bindings.contains_key(&id);
        has
    }

    pub fn binding<T: Record>(&self) -> Option<TypeBinding> {
        let guard = self.pending.lock();
        let binding = guard.borrow().bindings.get(&TypeId::of::<T>()).cloned();
        binding
    }

    /// Compiled plan for `T`, compiling on first use.
    pub fn mapping<T: Record>(&self) -> Result<Arc<CompiledMapping<T>>, CompileError> {
        let id = TypeId::of::<T>();
        if let Some(found) = self.published::<T>() {
            return Ok(found);
        }

        let guard = self.pending.lock();
        if let Some(found) = self.published::<T>() {
            return Ok(found);
        }
        let binding = {
            let mut state = guard.borrow_mut();
            let binding = state.bindings.get(&id).cloned().ok_or_else(|| {
                CompileError::NotConfigured {
                    type_name: T::schema().type_name().to_string(),
                }
            })?;
            if !state.compiling.insert(id) {
                return Err(CompileError::NestingTooDeep {
                    type_name: T::schema().type_name().to_string(),
                    max: MAX_NESTING_DEPTH,
                });
            }
            binding
        };

        // The RefCell borrow is released here: compiling re-enters for nested types.
        let result = compile::<T>(&binding, self, self.options);
        guard.borrow_mut().compiling.remove(&id);

        let mapping = Arc::new(result?);
        self.compiled
            .insert(id, Arc::clone(&mapping) as Arc<dyn Any + Send + Sync>);
        Ok(mapping)
    }

    /// Like [`mapping`](Self::mapping) but yields `None` when `T` is not
    /// configured or fails to compile.
    pub fn compiled_mapping<T: Record>(&self) -> Option<Arc<CompiledMapping<T>>> {
        match self.mapping::<T>() {
            Ok(mapping) => Some(mapping),
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "no compiled mapping available");
                None
            }
        }
    }

    fn published<T: Record>(&self) -> Option<Arc<CompiledMapping<T>>> {
        let entry = self.compiled.get(&TypeId::of::<T>())?;
        let any = Arc::clone(entry.value());
        drop(entry);
        any.downcast::<CompiledMapping<T>>().ok()
    }
}
