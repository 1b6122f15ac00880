use std::sync::Arc;

use crate::runtime::{Class, ClassState, Method, VmEnv, VmError, VmResult};

/// Looks up a method declared by `class` itself.
///
/// No attempt is made to honour access flags. An abstract match is routed to
/// the AbstractMethodError stub before it is handed out.
pub fn find_method_local(class: &Class, name: &str, descriptor: &str) -> Option<Arc<Method>> {
    let method = class
        .methods
        .iter()
        .find(|method| method.name.as_ref() == name && method.descriptor.as_ref() == descriptor)?;
    if method.is_abstract() {
        method.patch_abstract();
    }
    Some(Arc::clone(method))
}

impl VmEnv {
    /// Finds `name` + `descriptor` in `class` or its nearest superclass
    /// declaring it, linking `class` first if it is not usable yet.
    pub fn find_method(
        &self,
        class: &Arc<Class>,
        name: &str,
        descriptor: &str,
    ) -> VmResult<Arc<Method>> {
        if class.state() < ClassState::Usable {
            self.linker.prepare(class, ClassState::Complete)?;
        }

        class
            .hierarchy()
            .find_map(|class| find_method_local(class, name, descriptor))
            .ok_or_else(|| VmError::NoSuchMethod(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::MethodAccessFlag;
    use crate::runtime::{ClassBuilder, ClassLinker, ClassRegistry, MethodInfo, test_support};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug, Default)]
    struct CountingLinker {
        registry: ClassRegistry,
        prepared: AtomicUsize,
    }

    impl ClassLinker for CountingLinker {
        fn prepare(&self, class: &Arc<Class>, target: ClassState) -> VmResult<()> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            self.registry.prepare(class, target)
        }
    }

    #[derive(Debug)]
    struct FailingLinker;

    impl ClassLinker for FailingLinker {
        fn prepare(&self, class: &Arc<Class>, _: ClassState) -> VmResult<()> {
            Err(VmError::new_thrown(
                "java/lang/VerifyError",
                class.name().to_string(),
            ))
        }
    }

    #[test]
    fn test_find_local_ignores_superclass() {
        let a = ClassBuilder::new("A")
            .method(MethodInfo::new(MethodAccessFlag::PUBLIC, "m", "()V"))
            .build();
        let b = ClassBuilder::new("B").super_class(&a).build();

        assert!(find_method_local(&a, "m", "()V").is_some());
        assert!(find_method_local(&a, "m", "(I)V").is_none());
        assert!(find_method_local(&b, "m", "()V").is_none());
    }

    #[test]
    fn test_find_local_patches_abstract() {
        let a = ClassBuilder::new("A")
            .method(MethodInfo::new(
                MethodAccessFlag::PUBLIC | MethodAccessFlag::ABSTRACT,
                "m",
                "()V",
            ))
            .build();
        assert!(!a.methods()[0].is_native());

        let method = find_method_local(&a, "m", "()V").unwrap();
        assert!(method.is_native());
        assert!(method.is_abstract());
        for _ in 0..3 {
            let err = method.invoke_native().unwrap_err();
            assert_eq!(err, VmError::AbstractMethod("A.m()V".to_string()));
        }
    }

    #[test]
    fn test_concurrent_abstract_patch() {
        let a = ClassBuilder::new("A")
            .method(MethodInfo::new(MethodAccessFlag::ABSTRACT, "m", "()V"))
            .build();
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    let method = find_method_local(&a, "m", "()V").unwrap();
                    assert!(matches!(
                        method.invoke_native(),
                        Err(VmError::AbstractMethod(_))
                    ));
                });
            }
        });
        let flags = a.methods()[0].access_flags();
        assert_eq!(flags, MethodAccessFlag::ABSTRACT | MethodAccessFlag::NATIVE);
    }

    #[test]
    fn test_concrete_method_left_alone() {
        let a = ClassBuilder::new("A")
            .method(MethodInfo::new(MethodAccessFlag::PUBLIC, "m", "()V"))
            .build();
        let method = find_method_local(&a, "m", "()V").unwrap();
        assert!(!method.is_native());
        assert!(method.native_code().is_none());
    }

    #[test]
    fn test_find_method_links_first() {
        let linker = Arc::new(CountingLinker::default());
        let registry = test_support::registry();
        let env = VmEnv::new(registry, Arc::clone(&linker) as Arc<dyn ClassLinker>);

        let a = ClassBuilder::new("A")
            .method(MethodInfo::new(MethodAccessFlag::PUBLIC, "m", "()V"))
            .build();
        let b = ClassBuilder::new("B").super_class(&a).build();

        let method = env.find_method(&b, "m", "()V").unwrap();
        assert!(Arc::ptr_eq(&method, &a.methods()[0]));
        assert_eq!(b.state(), ClassState::Complete);
        assert_eq!(linker.prepared.load(Ordering::SeqCst), 1);

        // already usable, no more linking
        env.find_method(&b, "m", "()V").unwrap();
        assert_eq!(linker.prepared.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_find_method_missing() {
        let registry = test_support::registry();
        let env = VmEnv::with_registry(&registry);
        let a = registry.define(ClassBuilder::new("A")).unwrap();
        assert_eq!(
            env.find_method(&a, "nope", "()V").unwrap_err(),
            VmError::NoSuchMethod("nope".to_string())
        );
    }

    #[test]
    fn test_find_method_propagates_link_failure() {
        let env = VmEnv::new(test_support::registry(), Arc::new(FailingLinker));
        let a = ClassBuilder::new("A")
            .method(MethodInfo::new(MethodAccessFlag::PUBLIC, "m", "()V"))
            .build();
        let err = env.find_method(&a, "m", "()V").unwrap_err();
        assert_eq!(err.class_name(), "java/lang/VerifyError");

        // a usable class is searched without asking the linker
        a.advance_state(ClassState::Usable);
        assert!(env.find_method(&a, "m", "()V").is_ok());
    }
}
