use std::sync::Arc;

use crate::runtime::{
    ClassLinker, ClassLoader, ClassRegistry, FieldLookup, HierarchyFieldLookup, MethodRangeIndex,
    PcIndex,
};

/// The collaborators resolution and dispatch call out to.
///
/// Cheap to clone; every collaborator is shared.
#[derive(Debug, Clone)]
pub struct VmEnv {
    pub(in crate::runtime) class_loader: Arc<dyn ClassLoader>,
    pub(in crate::runtime) linker: Arc<dyn ClassLinker>,
    pub(in crate::runtime) field_lookup: Arc<dyn FieldLookup>,
    pub(in crate::runtime) pc_index: Arc<dyn PcIndex>,
}

impl VmEnv {
    pub fn new(class_loader: Arc<dyn ClassLoader>, linker: Arc<dyn ClassLinker>) -> Self {
        VmEnv {
            class_loader,
            linker,
            field_lookup: Arc::new(HierarchyFieldLookup),
            pc_index: Arc::new(MethodRangeIndex::new()),
        }
    }

    /// Loads and links through `registry`.
    pub fn with_registry(registry: &Arc<ClassRegistry>) -> Self {
        VmEnv::new(
            Arc::clone(registry) as Arc<dyn ClassLoader>,
            Arc::clone(registry) as Arc<dyn ClassLinker>,
        )
    }

    pub fn with_field_lookup(mut self, field_lookup: Arc<dyn FieldLookup>) -> Self {
        self.field_lookup = field_lookup;
        self
    }

    pub fn with_pc_index(mut self, pc_index: Arc<dyn PcIndex>) -> Self {
        self.pc_index = pc_index;
        self
    }
}
