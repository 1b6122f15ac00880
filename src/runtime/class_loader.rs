use std::fmt::Debug;
use std::sync::Arc;

use crate::{
    consts::CONSTRUCTOR_NAME,
    descriptor::{ReturnType, parse_method_descriptor},
    runtime::{
        Class, ClassState, ConstantPoolInfo, Field, LoaderId, Method, VmEnv, VmError, VmResult,
        inheritance::is_same_or_sub_class_of, lookup::find_method_local,
    },
};

mod registry;
pub use registry::ClassRegistry;

/// Finds or defines classes by name. Must hand out one canonical class per
/// (name, loader) pair no matter how often it is asked.
pub trait ClassLoader: Debug + Send + Sync {
    fn load_class(&self, name: &str, loader: LoaderId) -> VmResult<Arc<Class>>;
    /// `name` is an array descriptor such as `[I` or `[Ljava/lang/String;`.
    fn load_array_class(&self, name: &str, loader: LoaderId) -> VmResult<Arc<Class>>;
}

/// Drives a class through its lifecycle states.
pub trait ClassLinker: Debug + Send + Sync {
    fn prepare(&self, class: &Arc<Class>, target: ClassState) -> VmResult<()>;
}

pub trait FieldLookup: Debug + Send + Sync {
    fn find_field(&self, class: &Arc<Class>, name: &str, is_static: bool) -> VmResult<Arc<Field>>;
}

/// Looks in the class, then in each superclass.
#[derive(Debug, Default, Clone, Copy)]
pub struct HierarchyFieldLookup;

impl FieldLookup for HierarchyFieldLookup {
    fn find_field(&self, class: &Arc<Class>, name: &str, is_static: bool) -> VmResult<Arc<Field>> {
        class
            .hierarchy()
            .flat_map(|class| class.fields.iter())
            .find(|field| field.name.as_ref() == name && field.is_static() == is_static)
            .cloned()
            .ok_or_else(|| VmError::NoSuchField(name.to_string()))
    }
}

/// Result of resolving a Methodref or InterfaceMethodref.
#[derive(Debug, Clone)]
pub struct CallInfo {
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    /// Class the search started from, after special-invoke rebinding.
    pub class: Option<Arc<Class>>,
    /// `None` if nothing in the hierarchy matched, or the class was not loaded.
    pub method: Option<Arc<Method>>,
    /// Argument slots, excluding `this`.
    pub ins: usize,
    pub outs: usize,
    pub return_type: ReturnType,
}

impl VmEnv {
    /// Resolves the Class entry at `index` in `this`'s constant pool, loading
    /// the class on first use and caching it in the pool.
    ///
    /// The pool lock is only held to check and publish the slot, never while
    /// loading, so racing threads may each load the class; they all publish
    /// the loader's canonical instance.
    pub fn resolve_class(&self, this: &Arc<Class>, index: u16) -> VmResult<Arc<Class>> {
        let pool = &this.constant_pool;
        let entry = match pool.get(index)? {
            ConstantPoolInfo::Class(entry) => entry,
            other => {
                log::debug!(
                    "no Class found for idx={index} in {}, got {:?}",
                    this.class_name,
                    other.tag()
                );
                return Err(VmError::ClassFormat(format!(
                    "constant pool entry {index} of {} is not a class",
                    this.class_name
                )));
            }
        };

        if let Some(class) = entry.resolved() {
            return Ok(Arc::clone(class));
        }

        let name = {
            let _guard = this.pool_lock.lock();
            if let Some(class) = entry.resolved() {
                return Ok(Arc::clone(class));
            }
            pool.get_utf8(entry.name_index).cloned()
        };
        let Some(name) = name else {
            return Err(VmError::ClassFormat(format!(
                "class entry {index} of {} has no Utf8 name",
                this.class_name
            )));
        };

        let loaded = if name.starts_with('[') {
            self.class_loader.load_array_class(&name, this.loader)?
        } else {
            self.class_loader.load_class(&name, this.loader)?
        };

        let _guard = this.pool_lock.lock();
        Ok(Arc::clone(entry.publish(loaded)))
    }

    /// Resolves the Fieldref at `index` to the referenced class and the field
    /// found by the field lookup.
    pub fn resolve_field(
        &self,
        this: &Arc<Class>,
        index: u16,
        is_static: bool,
    ) -> VmResult<(Arc<Class>, Arc<Field>)> {
        let pool = &this.constant_pool;
        let Ok(&ConstantPoolInfo::Fieldref {
            class_index,
            name_and_type_index,
        }) = pool.get(index)
        else {
            log::debug!("no Fieldref found for idx={index} in {}", this.class_name);
            return Err(VmError::NoSuchField(format!(
                "no Fieldref at index {index} of {}",
                this.class_name
            )));
        };

        let class = self.resolve_class(this, class_index)?;

        let Some((name, descriptor)) = pool.get_name_and_type(name_and_type_index) else {
            return Err(VmError::NoSuchField(format!(
                "malformed Fieldref at index {index} of {}",
                this.class_name
            )));
        };
        log::debug!("resolve_field({}, {name}, {descriptor})", class.class_name);

        let field = self.field_lookup.find_field(&class, name, is_static)?;
        Ok((class, field))
    }

    /// Resolves the Methodref or InterfaceMethodref at `index`.
    ///
    /// Slot counts are always computed. With `load_class` the owning class is
    /// resolved and searched (without linking it); a method that cannot be
    /// found is reported as `CallInfo::method == None`, not as an error.
    ///
    /// For a special invoke of a non-constructor through an ancestor of
    /// `this`, the search starts at `this`'s superclass instead of the named
    /// class.
    pub fn resolve_method_ref(
        &self,
        this: &Arc<Class>,
        index: u16,
        load_class: bool,
        is_special: bool,
    ) -> VmResult<CallInfo> {
        let pool = &this.constant_pool;
        let (class_index, name_and_type_index) = match pool.get(index) {
            Ok(
                &ConstantPoolInfo::Methodref {
                    class_index,
                    name_and_type_index,
                }
                | &ConstantPoolInfo::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                },
            ) => (class_index, name_and_type_index),
            _ => {
                log::debug!("no Methodref found for idx={index} in {}", this.class_name);
                return Err(VmError::NoSuchMethod("method name unknown".to_string()));
            }
        };

        let Some((name, signature)) = pool.get_name_and_type(name_and_type_index) else {
            return Err(VmError::NoSuchMethod(format!(
                "malformed method reference at index {index} of {}",
                this.class_name
            )));
        };
        let (_, descriptor) = parse_method_descriptor(signature)?;

        let mut call = CallInfo {
            name: Arc::clone(name),
            descriptor: Arc::clone(signature),
            class: None,
            method: None,
            ins: descriptor.parameter_slots(),
            outs: descriptor.return_slots(),
            return_type: descriptor.return_type,
        };
        if !load_class {
            return Ok(call);
        }

        let mut class = self.resolve_class(this, class_index)?;
        if is_special
            && name.as_ref() != CONSTRUCTOR_NAME
            && !Arc::ptr_eq(&class, this)
            && is_same_or_sub_class_of(this, &class)
        {
            if let Some(super_class) = this.super_class() {
                class = Arc::clone(super_class);
            }
        }

        // linking here would also initialise the class, so only search
        call.method = class
            .hierarchy()
            .find_map(|class| find_method_local(class, name, signature));

        log::debug!(
            "resolve_method_ref({}, {name}, {signature}) -> {}",
            class.class_name,
            if call.method.is_some() { "success" } else { "failure" }
        );
        call.class = Some(class);
        Ok(call)
    }
}
