use crate::runtime::{Method, VmError, VmResult};

/// Entry point of a method executed outside the interpreter.
pub type NativeFunction = fn(&Method) -> VmResult<()>;

/// Installed on abstract methods the first time they are looked up, so that an
/// invocation that reaches them raises instead of running a missing body.
pub(in crate::runtime) fn throw_abstract_method_error(method: &Method) -> VmResult<()> {
    Err(VmError::AbstractMethod(format!(
        "{}.{}{}",
        method.class_name(),
        method.name(),
        method.descriptor()
    )))
}
