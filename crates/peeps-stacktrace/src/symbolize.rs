use std::fmt::Write as _;

use crate::hex::HEX_FIELD_WIDTH;
use crate::{DebugInfoResolver, StackTrace};

/// Placeholder emitted for frames no resolver could name.
pub const UNKNOWN_SYMBOL: &str = "(unknown)";

/// Maps a program counter to a human-readable symbol name.
pub trait ResolveSymbol {
    fn resolve(&self, pc: usize) -> Option<String>;
}

impl<F> ResolveSymbol for F
where
    F: Fn(usize) -> Option<String>,
{
    fn resolve(&self, pc: usize) -> Option<String> {
        self(pc)
    }
}

impl StackTrace {
    /// Symbolizes every frame using the debug info of the running process.
    pub fn symbolize(&self) -> String {
        self.symbolize_with(&DebugInfoResolver::new())
    }

    /// Renders one `    @ <address>  <symbol>` line per frame.
    ///
    /// Each frame is a return address, which points at the instruction after
    /// the call. When the callee never returns, that instruction can be the
    /// first byte of the next function, so resolution uses `address - 1`,
    /// which always lies inside the calling instruction. The printed address
    /// is the unadjusted one.
    pub fn symbolize_with<R>(&self, resolver: &R) -> String
    where
        R: ResolveSymbol + ?Sized,
    {
        let mut out = String::new();
        for &frame in self.frames() {
            let symbol = resolver.resolve(frame.wrapping_sub(1));
            let symbol = symbol.as_deref().unwrap_or(UNKNOWN_SYMBOL);
            let address = format!("{frame:#x}");
            let _ = writeln!(out, "    @ {address:>HEX_FIELD_WIDTH$}  {symbol}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two adjacent synthetic functions: `caller` ends with a call that never
    /// returns, so its return address is the first byte of `next_function`.
    const CALLER_START: usize = 0x1000;
    const NEXT_FUNCTION_START: usize = 0x1040;
    const NEXT_FUNCTION_END: usize = 0x1080;

    fn synthetic_layout(pc: usize) -> Option<String> {
        match pc {
            CALLER_START..NEXT_FUNCTION_START => Some("caller".to_owned()),
            NEXT_FUNCTION_START..NEXT_FUNCTION_END => Some("next_function".to_owned()),
            _ => None,
        }
    }

    #[test]
    fn return_address_after_noreturn_call_is_attributed_to_caller() {
        let trace = StackTrace::from_frames(&[NEXT_FUNCTION_START]);
        let text = trace.symbolize_with(&synthetic_layout);

        assert!(text.contains("caller"), "got: {text}");
        assert!(!text.contains("next_function"), "got: {text}");
    }

    #[test]
    fn unresolved_frames_use_placeholder() {
        let trace = StackTrace::from_frames(&[0x10, NEXT_FUNCTION_START + 1]);
        let text = trace.symbolize_with(&synthetic_layout);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(UNKNOWN_SYMBOL));
        assert!(lines[1].ends_with("next_function"));
    }

    #[test]
    fn lines_pad_address_to_pointer_width() {
        let trace = StackTrace::from_frames(&[0xabc]);
        let text = trace.symbolize_with(&|_: usize| -> Option<String> { None });

        let expected = format!("    @ {:>width$}  (unknown)\n", "0xabc", width = HEX_FIELD_WIDTH);
        assert_eq!(text, expected);
    }

    #[test]
    fn printed_address_is_unadjusted() {
        let trace = StackTrace::from_frames(&[NEXT_FUNCTION_START]);
        let text = trace.symbolize_with(&synthetic_layout);
        assert!(text.contains(&format!("{NEXT_FUNCTION_START:#x}")));
    }

    #[test]
    fn empty_trace_symbolizes_to_nothing() {
        assert_eq!(StackTrace::new().symbolize_with(&synthetic_layout), "");
    }

    #[test]
    fn zero_frame_does_not_underflow() {
        let trace = StackTrace::from_frames(&[0]);
        let text = trace.symbolize_with(&|pc: usize| Some(format!("pc={pc:#x}")));
        assert!(text.contains(&format!("pc={:#x}", usize::MAX)));
    }
}
