use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::runtime::{Class, VmError, VmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantTag {
    Utf8,
    Integer,
    Float,
    Long,
    Double,
    Class,
    ResolvedClass,
    String,
    Fieldref,
    Methodref,
    InterfaceMethodref,
    NameAndType,
    MethodHandle,
    MethodType,
    Dynamic,
    InvokeDynamic,
    Module,
    Package,
    Empty,
}

impl ConstantTag {
    pub fn is_resolved(self) -> bool {
        self == ConstantTag::ResolvedClass
    }
}

#[derive(Debug)]
pub enum ConstantPoolInfo {
    Utf8(Arc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(CpClassInfo),
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle,
    MethodType,
    Dynamic,
    InvokeDynamic,
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    // second slot of a Long or Double
    Empty,
}

impl ConstantPoolInfo {
    pub fn tag(&self) -> ConstantTag {
        match self {
            ConstantPoolInfo::Utf8(_) => ConstantTag::Utf8,
            ConstantPoolInfo::Integer(_) => ConstantTag::Integer,
            ConstantPoolInfo::Float(_) => ConstantTag::Float,
            ConstantPoolInfo::Long(_) => ConstantTag::Long,
            ConstantPoolInfo::Double(_) => ConstantTag::Double,
            ConstantPoolInfo::Class(info) if info.resolved().is_some() => {
                ConstantTag::ResolvedClass
            }
            ConstantPoolInfo::Class(_) => ConstantTag::Class,
            ConstantPoolInfo::String { .. } => ConstantTag::String,
            ConstantPoolInfo::Fieldref { .. } => ConstantTag::Fieldref,
            ConstantPoolInfo::Methodref { .. } => ConstantTag::Methodref,
            ConstantPoolInfo::InterfaceMethodref { .. } => ConstantTag::InterfaceMethodref,
            ConstantPoolInfo::NameAndType { .. } => ConstantTag::NameAndType,
            ConstantPoolInfo::MethodHandle => ConstantTag::MethodHandle,
            ConstantPoolInfo::MethodType => ConstantTag::MethodType,
            ConstantPoolInfo::Dynamic => ConstantTag::Dynamic,
            ConstantPoolInfo::InvokeDynamic => ConstantTag::InvokeDynamic,
            ConstantPoolInfo::Module { .. } => ConstantTag::Module,
            ConstantPoolInfo::Package { .. } => ConstantTag::Package,
            ConstantPoolInfo::Empty => ConstantTag::Empty,
        }
    }
}

/// A `CONSTANT_Class` entry. The slot starts empty and is filled exactly once
/// with the loaded class; it never reverts.
#[derive(Debug)]
pub struct CpClassInfo {
    pub(crate) name_index: u16,
    class: OnceCell<Arc<Class>>,
}

impl CpClassInfo {
    pub fn new(name_index: u16) -> Self {
        CpClassInfo {
            name_index,
            class: OnceCell::new(),
        }
    }

    pub fn resolved(&self) -> Option<&Arc<Class>> {
        self.class.get()
    }

    /// Stores `class` unless a racing writer got there first, and returns the
    /// value that ended up in the slot. Callers must hold the owning class's
    /// pool lock.
    pub(in crate::runtime) fn publish(&self, class: Arc<Class>) -> &Arc<Class> {
        match self.class.try_insert(class) {
            Ok(stored) => stored,
            Err((stored, loser)) => {
                if !Arc::ptr_eq(stored, &loser) {
                    log::warn!(
                        "class slot already holds {:p} for {}, dropping non-canonical {:p}",
                        Arc::as_ptr(stored),
                        stored.name(),
                        Arc::as_ptr(&loser)
                    );
                }
                stored
            }
        }
    }
}

/// Literal value of an Integer, Float, Long, Double or String entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(Arc<str>),
}

/// Per-class constant pool, addressed by the 1-based indices used in class files.
///
/// The only mutation permitted after construction is filling class slots, see
/// [`CpClassInfo`].
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<ConstantPoolInfo>,
}

impl ConstantPool {
    pub fn new(entries: Vec<ConstantPoolInfo>) -> Self {
        ConstantPool { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u16) -> VmResult<&ConstantPoolInfo> {
        if index == 0 {
            return Err(VmError::ClassFormat(
                "constant pool index 0 is not usable".to_string(),
            ));
        }
        self.entries.get(index as usize - 1).ok_or_else(|| {
            VmError::ClassFormat(format!(
                "constant pool index {index} out of range (size {})",
                self.entries.len()
            ))
        })
    }

    pub fn tag(&self, index: u16) -> VmResult<ConstantTag> {
        self.get(index).map(ConstantPoolInfo::tag)
    }

    pub fn get_utf8(&self, index: u16) -> Option<&Arc<str>> {
        match self.get(index) {
            Ok(ConstantPoolInfo::Utf8(string)) => Some(string),
            _ => None,
        }
    }

    /// (name, descriptor) of a NameAndType entry, if both point at Utf8 entries.
    pub fn get_name_and_type(&self, index: u16) -> Option<(&Arc<str>, &Arc<str>)> {
        let Ok(ConstantPoolInfo::NameAndType {
            name_index,
            descriptor_index,
        }) = self.get(index)
        else {
            return None;
        };
        Some((self.get_utf8(*name_index)?, self.get_utf8(*descriptor_index)?))
    }

    pub(in crate::runtime) fn class_entry(&self, index: u16) -> VmResult<&CpClassInfo> {
        match self.get(index)? {
            ConstantPoolInfo::Class(info) => Ok(info),
            other => Err(VmError::ClassFormat(format!(
                "constant pool entry {index} is {:?}, expected Class",
                other.tag()
            ))),
        }
    }

    /// Symbolic name of a Class entry, resolved or not.
    pub fn class_name(&self, index: u16) -> VmResult<&Arc<str>> {
        let info = self.class_entry(index)?;
        self.get_utf8(info.name_index).ok_or_else(|| {
            VmError::ClassFormat(format!("class entry {index} has no Utf8 name"))
        })
    }

    pub fn constant_value(&self, index: u16) -> VmResult<Const> {
        match self.get(index)? {
            ConstantPoolInfo::Integer(i) => Ok(Const::Int(*i)),
            ConstantPoolInfo::Float(f) => Ok(Const::Float(*f)),
            ConstantPoolInfo::Long(l) => Ok(Const::Long(*l)),
            ConstantPoolInfo::Double(d) => Ok(Const::Double(*d)),
            ConstantPoolInfo::String { string_index } => self
                .get_utf8(*string_index)
                .map(|string| Const::String(Arc::clone(string)))
                .ok_or_else(|| {
                    VmError::ClassFormat(format!("string entry {index} has no Utf8 value"))
                }),
            other => Err(VmError::ClassFormat(format!(
                "constant pool entry {index} is {:?}, not a literal",
                other.tag()
            ))),
        }
    }
}

/// Assembles a [`ConstantPool`] for classes synthesized at runtime, handing
/// back the 1-based index of every entry it adds.
#[derive(Debug, Default)]
pub struct ConstantPoolBuilder {
    entries: Vec<ConstantPoolInfo>,
    utf8: HashMap<Arc<str>, u16>,
}

impl ConstantPoolBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Panics once an index would pass 65534, the largest a class file can hold.
    pub fn push(&mut self, info: ConstantPoolInfo) -> u16 {
        let wide = matches!(info, ConstantPoolInfo::Long(_) | ConstantPoolInfo::Double(_));
        let last = self.entries.len() + if wide { 2 } else { 1 };
        // constant_pool_count is a u16 and counts the unusable slot 0
        let index = match u16::try_from(self.entries.len() + 1) {
            Ok(index) if last < usize::from(u16::MAX) => index,
            _ => panic!("constant pool full: index {last} exceeds {}", u16::MAX - 1),
        };
        self.entries.push(info);
        if wide {
            self.entries.push(ConstantPoolInfo::Empty);
        }
        index
    }

    pub fn utf8(&mut self, string: &str) -> u16 {
        if let Some(&index) = self.utf8.get(string) {
            return index;
        }
        let string: Arc<str> = Arc::from(string);
        let index = self.push(ConstantPoolInfo::Utf8(Arc::clone(&string)));
        self.utf8.insert(string, index);
        index
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.push(ConstantPoolInfo::Class(CpClassInfo::new(name_index)))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.push(ConstantPoolInfo::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.push(ConstantPoolInfo::Methodref {
            class_index,
            name_and_type_index,
        })
    }

    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.push(ConstantPoolInfo::InterfaceMethodref {
            class_index,
            name_and_type_index,
        })
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.push(ConstantPoolInfo::Fieldref {
            class_index,
            name_and_type_index,
        })
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let string_index = self.utf8(value);
        self.push(ConstantPoolInfo::String { string_index })
    }

    pub fn build(self) -> ConstantPool {
        ConstantPool::new(self.entries)
    }
}
