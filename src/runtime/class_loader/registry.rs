use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    consts::{ClassAccessFlag, OBJECT_CLASS_NAME},
    descriptor::{FieldDescriptor, FieldType, parse_field_descriptor},
    runtime::{
        Class, ClassBuilder, ClassLinker, ClassLoader, ClassState, LoaderId, VmError, VmResult,
    },
};

type Key = (LoaderId, String);

/// In-memory class loader and linker.
///
/// Classes are registered up front with [`ClassRegistry::define`]; lookups
/// that miss under a user loader fall back to the bootstrap loader. Array
/// classes are synthesized on demand, once per name and defining loader.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    class_registry: DashMap<Key, Arc<OnceCell<Arc<Class>>>>,
    loads: AtomicUsize,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn define(&self, builder: ClassBuilder) -> VmResult<Arc<Class>> {
        let key = (builder.get_loader(), builder.name().to_string());
        let class_cell = Arc::clone(self.class_registry.entry(key).or_default().value());

        let class = builder.build();
        if class_cell.set(Arc::clone(&class)).is_err() {
            return Err(VmError::new_thrown(
                "java/lang/LinkageError",
                format!("duplicate class definition: {}", class.class_name),
            ));
        }
        log::debug!("defined {} in {:?}", class.class_name, class.loader);
        Ok(class)
    }

    /// Number of load requests served so far, hits and misses alike.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    fn lookup(&self, name: &str, loader: LoaderId) -> Option<Arc<Class>> {
        [loader, LoaderId::BOOTSTRAP].into_iter().find_map(|loader| {
            self.class_registry
                .get(&(loader, name.to_string()))
                .and_then(|cell| cell.value().get().cloned())
        })
    }

    fn resolve_array_class_with_field_type(
        &self,
        field_type: FieldType,
        loader: LoaderId,
    ) -> VmResult<Arc<Class>> {
        let FieldType::Array(element) = &field_type else {
            return Err(VmError::ClassFormat(format!(
                "{} is not an array type",
                field_type.to_descriptor()
            )));
        };
        let element_class = match element.as_ref() {
            FieldType::Object(class_name) => Some(self.load_class(class_name, loader)?),
            FieldType::Array(_) => {
                Some(self.resolve_array_class_with_field_type(element.as_ref().clone(), loader)?)
            }
            _ => None,
        };
        // arrays belong to the loader of their element type
        let defining_loader = element_class
            .as_ref()
            .map_or(LoaderId::BOOTSTRAP, |class| class.loader);

        let class_name = field_type.to_descriptor();
        let class_cell = Arc::clone(
            self.class_registry
                .entry((defining_loader, class_name.clone()))
                .or_default()
                .value(),
        );
        let class = class_cell.get_or_try_init(|| {
            self.define_array(&class_name, defining_loader, element_class.as_ref())
        })?;
        Ok(Arc::clone(class))
    }

    fn define_array(
        &self,
        class_name: &str,
        loader: LoaderId,
        element_class: Option<&Arc<Class>>,
    ) -> VmResult<Arc<Class>> {
        let object = self.load_class(OBJECT_CLASS_NAME, LoaderId::BOOTSTRAP)?;
        let mut builder = ClassBuilder::new(class_name)
            .access_flags(ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL | ClassAccessFlag::ABSTRACT)
            .loader(loader)
            .super_class(&object)
            // array has nothing to link
            .state(ClassState::Complete);
        if let Some(element_class) = element_class {
            builder = builder.array_element_type(element_class);
        }
        log::debug!("defined array class {class_name} in {loader:?}");
        Ok(builder.build())
    }
}

impl ClassLoader for ClassRegistry {
    fn load_class(&self, name: &str, loader: LoaderId) -> VmResult<Arc<Class>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let class = self
            .lookup(name, loader)
            .ok_or_else(|| VmError::NoClassDefFound(name.to_string()))?;
        self.prepare(&class, ClassState::Linked)?;
        Ok(class)
    }

    fn load_array_class(&self, name: &str, loader: LoaderId) -> VmResult<Arc<Class>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let (_, FieldDescriptor(field_type)) = parse_field_descriptor(name)?;
        self.resolve_array_class_with_field_type(field_type, loader)
    }
}

impl ClassLinker for ClassRegistry {
    fn prepare(&self, class: &Arc<Class>, target: ClassState) -> VmResult<()> {
        if class.state() >= target {
            return Ok(());
        }
        if let Some(super_class) = class.super_class() {
            self.prepare(super_class, target)?;
        }
        class.advance_state(target);
        log::debug!("prepared {} to {target:?}", class.class_name);
        Ok(())
    }
}
