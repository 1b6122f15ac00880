use std::sync::Arc;

use crate::consts::{ClassAccessFlag, OBJECT_CLASS_NAME};
use crate::runtime::{ClassBuilder, ClassRegistry};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A registry that already defines `java/lang/Object`.
pub(crate) fn registry() -> Arc<ClassRegistry> {
    let registry = ClassRegistry::new();
    registry
        .define(ClassBuilder::new(OBJECT_CLASS_NAME).access_flags(ClassAccessFlag::PUBLIC))
        .unwrap();
    Arc::new(registry)
}
