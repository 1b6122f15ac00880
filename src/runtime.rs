mod class_loader;
mod env;
mod inheritance;
mod lookup;
mod native;
mod structs;
mod unwind;

#[cfg(test)]
mod test_support;

pub use class_loader::*;
pub use env::*;
pub use inheritance::is_same_or_sub_class_of;
pub use lookup::*;
pub use native::NativeFunction;
pub use structs::*;
pub use unwind::*;
