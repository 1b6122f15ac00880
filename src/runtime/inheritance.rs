use crate::runtime::Class;
use std::sync::Arc;

/// Whether `target` is `source` itself or one of its superclasses.
///
/// Classes are compared by identity, so same-named classes from different
/// loaders are unrelated.
pub fn is_same_or_sub_class_of(source: &Arc<Class>, target: &Arc<Class>) -> bool {
    source.hierarchy().any(|class| Arc::ptr_eq(class, target))
}
