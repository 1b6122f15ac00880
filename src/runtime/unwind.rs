use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::runtime::{
    Class, ExceptionTableEntry, Method, VmEnv, VmResult, inheritance::is_same_or_sub_class_of,
};

/// Where an in-flight exception should continue.
#[derive(Debug, Clone, Default)]
pub struct ExceptionInfo {
    /// `None` means unwind to the invoker's frame.
    pub handler: Option<usize>,
    /// Method that was searched, set whenever the pc belongs to a known method.
    pub method: Option<Arc<Method>>,
    pub class: Option<Arc<Class>>,
}

impl ExceptionInfo {
    pub fn is_handled(&self) -> bool {
        self.handler.is_some()
    }
}

/// Maps a program counter back to the method whose code contains it.
pub trait PcIndex: Debug + Send + Sync {
    fn method_containing(&self, pc: usize) -> Option<Arc<Method>>;
}

/// [`PcIndex`] over registered, non-overlapping `[start, end)` code ranges.
#[derive(Debug, Default)]
pub struct MethodRangeIndex {
    ranges: RwLock<BTreeMap<usize, (usize, Arc<Method>)>>,
}

impl MethodRangeIndex {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register(&self, start: usize, end: usize, method: &Arc<Method>) {
        log::trace!(
            "code of {}.{}{} at [{start:#x}, {end:#x})",
            method.class_name(),
            method.name,
            method.descriptor
        );
        let mut ranges = self.ranges.write();
        debug_assert!(start < end, "empty code range [{start:#x}, {end:#x})");
        debug_assert!(
            ranges
                .range(..end)
                .next_back()
                .is_none_or(|(_, (prev_end, _))| *prev_end <= start),
            "code range [{start:#x}, {end:#x}) overlaps a registered method"
        );
        ranges.insert(start, (end, Arc::clone(method)));
    }
}

impl PcIndex for MethodRangeIndex {
    fn method_containing(&self, pc: usize) -> Option<Arc<Method>> {
        let ranges = self.ranges.read();
        let (_, (end, method)) = ranges.range(..=pc).next_back()?;
        (pc < *end).then(|| Arc::clone(method))
    }
}

impl VmEnv {
    /// Finds the handler of `method` that catches `thrown` at `pc`.
    ///
    /// Entries are tried in table order and the first match wins, even if a
    /// later entry names a more specific type. A catch type that fails to
    /// resolve makes its entry a non-match.
    pub fn locate_handler(&self, method: &Arc<Method>, pc: usize, thrown: &Arc<Class>) -> ExceptionInfo {
        let owner = method.class();
        for entry in method.exception_table() {
            if !entry.covers(pc) {
                continue;
            }
            if !entry.is_catch_all() {
                let Some(owner) = owner.as_ref() else {
                    continue;
                };
                let catch_class = match self.resolve_catch_class(owner, entry) {
                    Ok(catch_class) => catch_class,
                    Err(e) => {
                        log::debug!(
                            "skipping handler at {} in {}.{}: {e}",
                            entry.handler_pc,
                            owner.class_name,
                            method.name
                        );
                        continue;
                    }
                };
                if !is_same_or_sub_class_of(thrown, catch_class) {
                    continue;
                }
            }

            log::trace!(
                "{} at pc {pc} caught by handler at {}",
                thrown.class_name,
                entry.handler_pc
            );
            return ExceptionInfo {
                handler: Some(entry.handler_pc),
                method: Some(Arc::clone(method)),
                class: owner,
            };
        }

        // the unwinder still needs to know which frame it is leaving
        ExceptionInfo {
            handler: None,
            method: Some(Arc::clone(method)),
            class: owner,
        }
    }

    /// Like [`VmEnv::locate_handler`], for the method whose code contains `pc`.
    /// Only a pc outside every known method yields an empty result.
    pub fn locate_handler_at(&self, pc: usize, thrown: &Arc<Class>) -> ExceptionInfo {
        match self.pc_index.method_containing(pc) {
            Some(method) => self.locate_handler(&method, pc, thrown),
            None => ExceptionInfo::default(),
        }
    }

    fn resolve_catch_class<'a>(
        &self,
        owner: &Arc<Class>,
        entry: &'a ExceptionTableEntry,
    ) -> VmResult<&'a Arc<Class>> {
        if let Some(catch_class) = entry.catch_class.get() {
            return Ok(catch_class);
        }
        let resolved = self.resolve_class(owner, entry.catch_index)?;
        // racing writers resolve through the same pool slot
        Ok(entry.catch_class.get_or_init(|| resolved))
    }
}
