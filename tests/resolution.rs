use std::sync::Arc;
use std::thread;

use jvm_link::consts::{CONSTRUCTOR_NAME, MethodAccessFlag, OBJECT_CLASS_NAME};
use jvm_link::runtime::{
    Class, ClassBuilder, ClassRegistry, ClassState, ConstantPoolBuilder, Method, MethodInfo,
    MethodRangeIndex, PcIndex, VmEnv, VmError, find_method_local,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn method(name: &str) -> MethodInfo {
    MethodInfo::new(MethodAccessFlag::PUBLIC, name, "()V")
}

/// `A <- B`, both defining `foo` and a constructor.
fn hierarchy(registry: &ClassRegistry) -> (Arc<Class>, Arc<Class>) {
    let object = registry.define(ClassBuilder::new(OBJECT_CLASS_NAME)).unwrap();
    let a = registry
        .define(
            ClassBuilder::new("A")
                .super_class(&object)
                .method(method(CONSTRUCTOR_NAME))
                .method(method("foo")),
        )
        .unwrap();
    let b = registry
        .define(
            ClassBuilder::new("B")
                .super_class(&a)
                .method(method(CONSTRUCTOR_NAME))
                .method(method("foo")),
        )
        .unwrap();
    (a, b)
}

fn find<'a>(class: &'a Class, name: &str) -> &'a Arc<Method> {
    class
        .methods()
        .iter()
        .find(|method| method.name().as_ref() == name)
        .unwrap()
}

#[test]
fn special_invoke_of_direct_ancestor() {
    init_logger();
    let registry = Arc::new(ClassRegistry::new());
    let env = VmEnv::with_registry(&registry);
    let (a, _) = hierarchy(&registry);

    let mut pool = ConstantPoolBuilder::new();
    let foo = pool.method_ref("A", "foo", "()V");
    let b2 = registry
        .define(
            ClassBuilder::new("B2")
                .super_class(&a)
                .method(method("foo"))
                .constant_pool(pool.build()),
        )
        .unwrap();

    let call = env.resolve_method_ref(&b2, foo, true, true).unwrap();
    assert!(Arc::ptr_eq(call.class.as_ref().unwrap(), &a));
    assert!(Arc::ptr_eq(call.method.as_ref().unwrap(), find(&a, "foo")));
}

#[test]
fn special_invoke_starts_at_callers_superclass() {
    let registry = Arc::new(ClassRegistry::new());
    let env = VmEnv::with_registry(&registry);
    let (a, b) = hierarchy(&registry);

    let mut pool = ConstantPoolBuilder::new();
    let foo = pool.method_ref("A", "foo", "()V");
    let init = pool.method_ref("A", CONSTRUCTOR_NAME, "()V");
    let own = pool.method_ref("C", "foo", "()V");
    let c = registry
        .define(
            ClassBuilder::new("C")
                .super_class(&b)
                .method(method("foo"))
                .constant_pool(pool.build()),
        )
        .unwrap();

    // special invoke of an inherited method rebinds to C's superclass
    let call = env.resolve_method_ref(&c, foo, true, true).unwrap();
    assert!(Arc::ptr_eq(call.class.as_ref().unwrap(), &b));
    assert!(Arc::ptr_eq(call.method.as_ref().unwrap(), find(&b, "foo")));

    // a plain invoke searches from the named class
    let call = env.resolve_method_ref(&c, foo, true, false).unwrap();
    assert!(Arc::ptr_eq(call.method.as_ref().unwrap(), find(&a, "foo")));

    // constructors are never rebound
    let call = env.resolve_method_ref(&c, init, true, true).unwrap();
    assert!(Arc::ptr_eq(
        call.method.as_ref().unwrap(),
        find(&a, CONSTRUCTOR_NAME)
    ));

    // nor is a reference to the caller itself
    let call = env.resolve_method_ref(&c, own, true, true).unwrap();
    assert!(Arc::ptr_eq(call.method.as_ref().unwrap(), find(&c, "foo")));
}

#[test]
fn special_invoke_of_unrelated_class() {
    let registry = Arc::new(ClassRegistry::new());
    let env = VmEnv::with_registry(&registry);
    let (a, _) = hierarchy(&registry);

    let mut pool = ConstantPoolBuilder::new();
    let foo = pool.method_ref("A", "foo", "()V");
    let other = registry
        .define(ClassBuilder::new("Other").constant_pool(pool.build()))
        .unwrap();

    let call = env.resolve_method_ref(&other, foo, true, true).unwrap();
    assert!(Arc::ptr_eq(call.class.as_ref().unwrap(), &a));
    assert!(Arc::ptr_eq(call.method.as_ref().unwrap(), find(&a, "foo")));
}

#[test]
fn hierarchy_search_finds_ancestor_method() {
    let registry = Arc::new(ClassRegistry::new());
    let env = VmEnv::with_registry(&registry);
    let a = registry
        .define(ClassBuilder::new("A").method(method("m")))
        .unwrap();
    let b = registry.define(ClassBuilder::new("B").super_class(&a)).unwrap();
    let c = registry.define(ClassBuilder::new("C").super_class(&b)).unwrap();

    let found = env.find_method(&c, "m", "()V").unwrap();
    assert!(Arc::ptr_eq(&found, &a.methods()[0]));
    assert_eq!(c.state(), ClassState::Complete);
    assert_eq!(a.state(), ClassState::Complete);

    assert_eq!(
        env.find_method(&c, "m", "(I)V").unwrap_err(),
        VmError::NoSuchMethod("m".to_string())
    );
}

#[test]
fn abstract_method_raises_on_every_call() {
    let registry = Arc::new(ClassRegistry::new());
    let env = VmEnv::with_registry(&registry);
    let a = registry
        .define(ClassBuilder::new("A").method(MethodInfo::new(
            MethodAccessFlag::PUBLIC | MethodAccessFlag::ABSTRACT,
            "m",
            "()V",
        )))
        .unwrap();
    let b = registry.define(ClassBuilder::new("B").super_class(&a)).unwrap();

    let stub = find_method_local(&a, "m", "()V").unwrap();
    let via_b = env.find_method(&b, "m", "()V").unwrap();
    assert!(Arc::ptr_eq(&stub, &via_b));

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..10 {
                    assert_eq!(
                        stub.invoke_native().unwrap_err(),
                        VmError::AbstractMethod("A.m()V".to_string())
                    );
                }
            });
        }
    });
    assert_eq!(
        stub.invoke_native().unwrap_err().class_name(),
        "java/lang/AbstractMethodError"
    );
}

#[test]
fn unwinding_through_pc_index() {
    init_logger();
    let registry = Arc::new(ClassRegistry::new());
    let index = Arc::new(MethodRangeIndex::new());
    let pc_index: Arc<dyn PcIndex> = index.clone();
    let env = VmEnv::with_registry(&registry).with_pc_index(pc_index);

    let throwable = registry
        .define(ClassBuilder::new("java/lang/Throwable"))
        .unwrap();
    let exception = registry
        .define(ClassBuilder::new("java/lang/Exception").super_class(&throwable))
        .unwrap();
    let runtime_exception = registry
        .define(ClassBuilder::new("java/lang/RuntimeException").super_class(&exception))
        .unwrap();

    let mut pool = ConstantPoolBuilder::new();
    let catch_exception = pool.class("java/lang/Exception");
    let catch_runtime = pool.class("java/lang/RuntimeException");
    let main = registry
        .define(
            ClassBuilder::new("Main").constant_pool(pool.build()).method(
                MethodInfo::new(MethodAccessFlag::STATIC, "main", "()V")
                    .handler(0, 10, 20, catch_exception)
                    .handler(0, 10, 30, catch_runtime),
            ),
        )
        .unwrap();
    let run = &main.methods()[0];
    index.register(0, 40, run);

    let info = env.locate_handler_at(5, &runtime_exception);
    assert_eq!(info.handler, Some(20));
    assert!(Arc::ptr_eq(info.class.as_ref().unwrap(), &main));
    assert!(Arc::ptr_eq(info.method.as_ref().unwrap(), run));

    let info = env.locate_handler_at(15, &runtime_exception);
    assert!(!info.is_handled());
    let info = env.locate_handler_at(5, &throwable);
    assert!(!info.is_handled());
    // unhandled, but the frame being left is still known
    assert!(Arc::ptr_eq(info.method.as_ref().unwrap(), run));
    assert!(Arc::ptr_eq(info.class.as_ref().unwrap(), &main));

    assert!(env.locate_handler_at(40, &throwable).method.is_none());
}
