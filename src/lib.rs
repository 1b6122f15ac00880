pub mod consts;
pub mod descriptor;
pub mod runtime;
