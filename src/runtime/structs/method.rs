use std::sync::{
    Arc, Weak,
    atomic::{AtomicU16, Ordering},
};

use once_cell::sync::OnceCell;

use crate::consts::{FieldAccessFlag, MethodAccessFlag};
use crate::runtime::{Class, NativeFunction, VmError, VmResult, native};

/// Method declaration as produced by the class file loader.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub(crate) access_flags: MethodAccessFlag,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
    pub(crate) exception_table: Vec<ExceptionTableItem>,
}

impl MethodInfo {
    pub fn new(access_flags: MethodAccessFlag, name: &str, descriptor: &str) -> Self {
        MethodInfo {
            access_flags,
            name: Arc::from(name),
            descriptor: Arc::from(descriptor),
            exception_table: vec![],
        }
    }

    /// Appends an exception table entry; `catch_type` 0 catches everything.
    pub fn handler(mut self, start_pc: usize, end_pc: usize, handler_pc: usize, catch_type: u16) -> Self {
        self.exception_table.push(ExceptionTableItem {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        });
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExceptionTableItem {
    pub(crate) start_pc: usize,
    pub(crate) end_pc: usize,
    pub(crate) handler_pc: usize,
    pub(crate) catch_type: u16,
}

/// A protected range of a method. `catch_class` is filled the first time the
/// catch type is resolved and never changes afterwards.
#[derive(Debug)]
pub struct ExceptionTableEntry {
    pub(crate) start_pc: usize,
    pub(crate) end_pc: usize,
    pub(crate) handler_pc: usize,
    pub(crate) catch_index: u16,
    pub(in crate::runtime) catch_class: OnceCell<Arc<Class>>,
}

impl ExceptionTableEntry {
    pub fn start_pc(&self) -> usize {
        self.start_pc
    }

    pub fn end_pc(&self) -> usize {
        self.end_pc
    }

    pub fn handler_pc(&self) -> usize {
        self.handler_pc
    }

    pub fn catch_index(&self) -> u16 {
        self.catch_index
    }

    pub fn is_catch_all(&self) -> bool {
        self.catch_index == 0
    }

    pub fn catch_class(&self) -> Option<&Arc<Class>> {
        self.catch_class.get()
    }

    /// Inclusive on both ends.
    pub fn covers(&self, pc: usize) -> bool {
        (self.start_pc..=self.end_pc).contains(&pc)
    }
}

impl From<ExceptionTableItem> for ExceptionTableEntry {
    fn from(item: ExceptionTableItem) -> Self {
        ExceptionTableEntry {
            start_pc: item.start_pc,
            end_pc: item.end_pc,
            handler_pc: item.handler_pc,
            catch_index: item.catch_type,
            catch_class: OnceCell::new(),
        }
    }
}

#[derive(Debug)]
pub struct Method {
    class: Weak<Class>,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
    access_flags: AtomicU16,
    native_code: OnceCell<NativeFunction>,
    pub(crate) exception_table: Vec<ExceptionTableEntry>,
}

impl Method {
    pub(super) fn new(class: Weak<Class>, info: MethodInfo) -> Self {
        Method {
            class,
            name: info.name,
            descriptor: info.descriptor,
            access_flags: AtomicU16::new(info.access_flags.bits()),
            native_code: OnceCell::new(),
            exception_table: info.exception_table.into_iter().map(Into::into).collect(),
        }
    }

    /// Owning class; `None` only once the class registry has dropped it.
    pub fn class(&self) -> Option<Arc<Class>> {
        self.class.upgrade()
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<str> {
        &self.descriptor
    }

    pub fn access_flags(&self) -> MethodAccessFlag {
        MethodAccessFlag::from_bits_retain(self.access_flags.load(Ordering::Acquire))
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags().contains(MethodAccessFlag::ABSTRACT)
    }

    pub fn is_native(&self) -> bool {
        self.access_flags().contains(MethodAccessFlag::NATIVE)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags().contains(MethodAccessFlag::STATIC)
    }

    pub fn exception_table(&self) -> &[ExceptionTableEntry] {
        &self.exception_table
    }

    pub fn native_code(&self) -> Option<NativeFunction> {
        self.native_code.get().copied()
    }

    /// Installs the entry point of a native method. Returns false if one is
    /// already installed.
    pub fn bind_native(&self, code: NativeFunction) -> bool {
        self.native_code.set(code).is_ok()
    }

    /// Routes an abstract method to the AbstractMethodError stub. Safe to
    /// repeat from any number of threads; every caller writes the same stub.
    pub(in crate::runtime) fn patch_abstract(&self) {
        if self.is_native() {
            return;
        }
        let _ = self.native_code.set(native::throw_abstract_method_error);
        self.access_flags
            .fetch_or(MethodAccessFlag::NATIVE.bits(), Ordering::AcqRel);
        log::debug!(
            "patched abstract method {}.{}{}",
            self.class_name(),
            self.name,
            self.descriptor
        );
    }

    pub fn invoke_native(&self) -> VmResult<()> {
        let Some(code) = self.native_code() else {
            return Err(VmError::new_thrown(
                "java/lang/UnsatisfiedLinkError",
                format!("{}.{}{}", self.class_name(), self.name, self.descriptor),
            ));
        };
        code(self)
    }

    pub(crate) fn class_name(&self) -> Arc<str> {
        self.class()
            .map(|class| Arc::clone(&class.class_name))
            .unwrap_or_else(|| Arc::from("<unloaded>"))
    }
}

/// Field declaration as produced by the class file loader.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub(crate) access_flags: FieldAccessFlag,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
}

impl FieldInfo {
    pub fn new(access_flags: FieldAccessFlag, name: &str, descriptor: &str) -> Self {
        FieldInfo {
            access_flags,
            name: Arc::from(name),
            descriptor: Arc::from(descriptor),
        }
    }
}

#[derive(Debug)]
pub struct Field {
    class: Weak<Class>,
    pub(crate) access_flags: FieldAccessFlag,
    pub(crate) name: Arc<str>,
    pub(crate) descriptor: Arc<str>,
}

impl Field {
    pub(super) fn new(class: Weak<Class>, info: FieldInfo) -> Self {
        Field {
            class,
            access_flags: info.access_flags,
            name: info.name,
            descriptor: info.descriptor,
        }
    }

    pub fn class(&self) -> Option<Arc<Class>> {
        self.class.upgrade()
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn descriptor(&self) -> &Arc<str> {
        &self.descriptor
    }

    pub fn access_flags(&self) -> FieldAccessFlag {
        self.access_flags
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlag::STATIC)
    }
}
