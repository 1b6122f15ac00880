use std::{
    fmt::{self, Debug},
    sync::{
        Arc, Weak,
        atomic::{AtomicU8, Ordering},
    },
};

use parking_lot::Mutex;

pub use constant_pool::*;
pub use exception::*;
pub use method::*;

use crate::consts::ClassAccessFlag;

mod constant_pool;
mod exception;
mod method;

/// Lifecycle of a class. Only ever moves forward.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ClassState {
    Loaded = 1,
    Linked = 2,
    Usable = 3,
    Complete = 4,
}

impl ClassState {
    fn from_u8(state: u8) -> Self {
        match state {
            1 => ClassState::Loaded,
            2 => ClassState::Linked,
            3 => ClassState::Usable,
            _ => ClassState::Complete,
        }
    }
}

/// Identity of the loader that defined a class.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LoaderId(pub u32);

impl LoaderId {
    pub const BOOTSTRAP: LoaderId = LoaderId(0);
}

pub struct Class {
    pub(crate) class_name: Arc<str>,
    pub(crate) access_flags: ClassAccessFlag,
    pub(crate) loader: LoaderId,
    pub(crate) super_class: Option<Arc<Class>>,
    // only for arrays of reference type
    pub(crate) array_element_type: Option<Arc<Class>>,
    pub(crate) methods: Vec<Arc<Method>>,
    pub(crate) fields: Vec<Arc<Field>>,
    pub(crate) constant_pool: ConstantPool,
    state: AtomicU8,
    // serializes class slot rewrites in `constant_pool`
    pub(in crate::runtime) pool_lock: Mutex<()>,
}

impl Class {
    pub fn name(&self) -> &Arc<str> {
        &self.class_name
    }

    pub fn access_flags(&self) -> ClassAccessFlag {
        self.access_flags
    }

    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    pub fn super_class(&self) -> Option<&Arc<Class>> {
        self.super_class.as_ref()
    }

    pub fn array_element_type(&self) -> Option<&Arc<Class>> {
        self.array_element_type.as_ref()
    }

    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }

    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constant_pool
    }

    pub fn state(&self) -> ClassState {
        ClassState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the class to `state` unless it is already there or further along.
    pub fn advance_state(&self, state: ClassState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    pub fn is_array(&self) -> bool {
        self.class_name.starts_with('[')
    }

    /// This class followed by its superclasses, nearest first.
    pub fn hierarchy(self: &Arc<Self>) -> impl Iterator<Item = &Arc<Class>> {
        std::iter::successors(Some(self), |class| class.super_class.as_ref())
    }
}

impl Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.class_name)
            .field("loader", &self.loader)
            .field("state", &self.state())
            .field(
                "super_class",
                &self.super_class.as_ref().map(|s| Arc::clone(&s.class_name)),
            )
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Class`] from the declarations a class file loader produces.
#[derive(Debug)]
pub struct ClassBuilder {
    class_name: Arc<str>,
    access_flags: ClassAccessFlag,
    loader: LoaderId,
    super_class: Option<Arc<Class>>,
    array_element_type: Option<Arc<Class>>,
    methods: Vec<MethodInfo>,
    fields: Vec<FieldInfo>,
    constant_pool: ConstantPool,
    state: ClassState,
}

impl ClassBuilder {
    pub fn new(class_name: &str) -> Self {
        ClassBuilder {
            class_name: Arc::from(class_name),
            access_flags: ClassAccessFlag::PUBLIC | ClassAccessFlag::SUPER,
            loader: LoaderId::BOOTSTRAP,
            super_class: None,
            array_element_type: None,
            methods: vec![],
            fields: vec![],
            constant_pool: ConstantPool::default(),
            state: ClassState::Loaded,
        }
    }

    pub fn name(&self) -> &str {
        &self.class_name
    }

    pub fn get_loader(&self) -> LoaderId {
        self.loader
    }

    pub fn access_flags(mut self, access_flags: ClassAccessFlag) -> Self {
        self.access_flags = access_flags;
        self
    }

    pub fn loader(mut self, loader: LoaderId) -> Self {
        self.loader = loader;
        self
    }

    pub fn super_class(mut self, super_class: &Arc<Class>) -> Self {
        self.super_class = Some(Arc::clone(super_class));
        self
    }

    pub fn array_element_type(mut self, element: &Arc<Class>) -> Self {
        self.array_element_type = Some(Arc::clone(element));
        self
    }

    pub fn constant_pool(mut self, constant_pool: ConstantPool) -> Self {
        self.constant_pool = constant_pool;
        self
    }

    pub fn method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    pub fn state(mut self, state: ClassState) -> Self {
        self.state = state;
        self
    }

    pub fn build(self) -> Arc<Class> {
        let ClassBuilder {
            class_name,
            access_flags,
            loader,
            super_class,
            array_element_type,
            methods,
            fields,
            constant_pool,
            state,
        } = self;

        Arc::new_cyclic(|this: &Weak<Class>| Class {
            methods: methods
                .into_iter()
                .map(|info| Arc::new(Method::new(Weak::clone(this), info)))
                .collect(),
            fields: fields
                .into_iter()
                .map(|info| Arc::new(Field::new(Weak::clone(this), info)))
                .collect(),
            class_name,
            access_flags,
            loader,
            super_class,
            array_element_type,
            constant_pool,
            state: AtomicU8::new(state as u8),
            pool_lock: Mutex::new(()),
        })
    }
}
