use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{HashMap, hash_map::Entry};
use std::path::{Path, PathBuf};

use object::{Object, ObjectSegment};
use tracing::debug;

use crate::symbolize::ResolveSymbol;

enum ModuleSymbolizerState {
    Ready {
        loader: Box<addr2line::Loader>,
        linked_image_base: u64,
    },
    Failed,
}

/// Resolves addresses in the current process.
///
/// `dladdr` identifies the containing module, whose debug info is loaded
/// with `addr2line` and kept for the lifetime of the resolver; reuse one
/// resolver when symbolizing several traces. When debug info has no answer,
/// the dynamic symbol reported by `dladdr` is used.
#[derive(Default)]
pub struct DebugInfoResolver {
    modules: RefCell<HashMap<PathBuf, ModuleSymbolizerState>>,
}

impl DebugInfoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve_with_debug_info(&self, module: &platform::ModuleInfo, pc: usize) -> Option<String> {
        let mut modules = self.modules.borrow_mut();
        let state = match modules.entry(module.path.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(load_module(&module.path)),
        };

        let ModuleSymbolizerState::Ready {
            loader,
            linked_image_base,
        } = state
        else {
            return None;
        };

        let offset = (pc as u64).checked_sub(module.runtime_base)?;
        let probe = linked_image_base.checked_add(offset)?;

        // Inlined frames come innermost first; the last one is the function
        // that actually owns the code at `probe`.
        let mut function_name = None::<String>;
        if let Ok(mut frames) = loader.find_frames(probe) {
            while let Ok(Some(frame)) = frames.next() {
                let Some(function) = frame.function else {
                    continue;
                };
                if let Ok(name) = function.demangle() {
                    function_name = Some(name.into_owned());
                } else if let Ok(name) = function.raw_name() {
                    function_name = Some(name.into_owned());
                }
            }
        }

        if function_name.is_none()
            && let Some(symbol) = loader.find_symbol(probe)
        {
            function_name = Some(demangle(symbol));
        }

        function_name.map(|name| strip_rust_hash_suffix(&name).to_owned())
    }
}

impl ResolveSymbol for DebugInfoResolver {
    fn resolve(&self, pc: usize) -> Option<String> {
        let module = platform::module_for_pc(pc)?;
        if let Some(name) = self.resolve_with_debug_info(&module, pc) {
            return Some(name);
        }
        module
            .symbol_name
            .map(|name| strip_rust_hash_suffix(&demangle(&name)).to_owned())
    }
}

fn load_module(path: &Path) -> ModuleSymbolizerState {
    let loader = match addr2line::Loader::new(path) {
        Ok(loader) => loader,
        Err(error) => {
            debug!(module = %path.display(), %error, "failed to open debug object");
            return ModuleSymbolizerState::Failed;
        }
    };

    match linked_image_base_for_file(path) {
        Ok(linked_image_base) => ModuleSymbolizerState::Ready {
            loader: Box::new(loader),
            linked_image_base,
        },
        Err(reason) => {
            debug!(module = %path.display(), %reason, "failed to determine linked image base");
            ModuleSymbolizerState::Failed
        }
    }
}

fn demangle(name: &str) -> String {
    addr2line::demangle_auto(Cow::Borrowed(name), None).into_owned()
}

fn strip_rust_hash_suffix(name: &str) -> &str {
    if let Some(index) = name.rfind("::h") {
        let suffix = &name[index + 3..];
        if !suffix.is_empty()
            && suffix
                .chars()
                .all(|character| character.is_ascii_hexdigit())
        {
            return &name[..index];
        }
    }
    name
}

fn linked_image_base_for_file(path: &Path) -> Result<u64, String> {
    let data = std::fs::read(path)
        .map_err(|error| format!("read debug object '{}': {error}", path.display()))?;
    let object = object::File::parse(&*data)
        .map_err(|error| format!("parse debug object '{}': {error}", path.display()))?;
    object
        .segments()
        .filter_map(|segment| {
            let (_, file_size) = segment.file_range();
            if file_size == 0 {
                return None;
            }
            Some(segment.address())
        })
        .min()
        .ok_or_else(|| {
            format!(
                "no file-backed segments in debug object '{}'",
                path.display()
            )
        })
}

#[cfg(unix)]
mod platform {
    use std::ffi::{CStr, c_void};
    use std::path::{Path, PathBuf};
    use std::sync::OnceLock;

    pub(super) struct ModuleInfo {
        pub path: PathBuf,
        pub runtime_base: u64,
        pub symbol_name: Option<String>,
    }

    pub(super) fn module_for_pc(pc: usize) -> Option<ModuleInfo> {
        let mut info = std::mem::MaybeUninit::<libc::Dl_info>::zeroed();
        let ok = unsafe { libc::dladdr(pc as *const c_void, info.as_mut_ptr()) };
        if ok == 0 {
            return None;
        }

        let info = unsafe { info.assume_init() };
        if info.dli_fbase.is_null() {
            return None;
        }
        let runtime_base = info.dli_fbase as usize as u64;

        let reported_path = if info.dli_fname.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(info.dli_fname) }
                .to_string_lossy()
                .into_owned()
        };

        let symbol_name = if info.dli_sname.is_null() {
            None
        } else {
            Some(
                unsafe { CStr::from_ptr(info.dli_sname) }
                    .to_string_lossy()
                    .into_owned(),
            )
        };

        Some(ModuleInfo {
            path: module_path(reported_path, runtime_base)?,
            runtime_base,
            symbol_name,
        })
    }

    fn module_path(reported: String, runtime_base: u64) -> Option<PathBuf> {
        if Path::new(&reported).is_absolute() {
            return Some(PathBuf::from(reported));
        }
        // The main executable is reported by argv[0], or not named at all.
        if executable_base() == Some(runtime_base) {
            return std::env::current_exe().ok();
        }
        if reported.is_empty() {
            None
        } else {
            Some(PathBuf::from(reported))
        }
    }

    fn executable_base() -> Option<u64> {
        static EXECUTABLE_BASE: OnceLock<Option<u64>> = OnceLock::new();
        *EXECUTABLE_BASE.get_or_init(|| {
            let mut info = std::mem::MaybeUninit::<libc::Dl_info>::zeroed();
            let marker = executable_base as fn() -> Option<u64> as usize;
            let ok = unsafe { libc::dladdr(marker as *const c_void, info.as_mut_ptr()) };
            if ok == 0 {
                return None;
            }
            let info = unsafe { info.assume_init() };
            (!info.dli_fbase.is_null()).then(|| info.dli_fbase as usize as u64)
        })
    }
}

#[cfg(not(unix))]
mod platform {
    use std::path::PathBuf;

    pub(super) struct ModuleInfo {
        pub path: PathBuf,
        pub runtime_base: u64,
        pub symbol_name: Option<String>,
    }

    pub(super) fn module_for_pc(_pc: usize) -> Option<ModuleInfo> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StackTrace, UNKNOWN_SYMBOL};

    #[inline(never)]
    fn distinctly_named_target_function(x: u64) -> u64 {
        std::hint::black_box(x.wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(17))
    }

    #[test]
    fn strips_rust_hash_suffix() {
        assert_eq!(
            strip_rust_hash_suffix("peeps::thing::h0123456789abcdef"),
            "peeps::thing"
        );
        assert_eq!(strip_rust_hash_suffix("peeps::hello"), "peeps::hello");
        assert_eq!(strip_rust_hash_suffix("plain"), "plain");
    }

    #[test]
    fn resolves_function_inside_running_binary() {
        let start = distinctly_named_target_function as fn(u64) -> u64 as usize;
        std::hint::black_box(distinctly_named_target_function(3));

        // `start + 1` is adjusted back to the entry byte of the function.
        let text = StackTrace::from_frames(&[start + 1]).symbolize();
        assert!(
            text.contains("distinctly_named_target_function") || text.contains(UNKNOWN_SYMBOL),
            "got: {text}"
        );
    }

    #[test]
    fn entry_address_is_not_attributed_to_the_function_itself() {
        // A return address equal to a function's first byte belongs to
        // whatever precedes it.
        let start = distinctly_named_target_function as fn(u64) -> u64 as usize;
        let text = StackTrace::from_frames(&[start]).symbolize();
        assert!(
            !text.contains("distinctly_named_target_function"),
            "got: {text}"
        );
    }

    #[test]
    fn address_outside_any_module_is_unknown() {
        let text = StackTrace::from_frames(&[0x10]).symbolize();
        assert!(text.trim_end().ends_with(UNKNOWN_SYMBOL), "got: {text}");
    }

    #[test]
    fn resolver_is_reusable_across_traces() {
        let resolver = DebugInfoResolver::new();
        let start = distinctly_named_target_function as fn(u64) -> u64 as usize;
        let first = StackTrace::from_frames(&[start + 1]).symbolize_with(&resolver);
        let second = StackTrace::from_frames(&[start + 1]).symbolize_with(&resolver);
        assert_eq!(first, second);
    }
}
