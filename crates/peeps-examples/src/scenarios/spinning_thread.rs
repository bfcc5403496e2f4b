use peeps_threads::capture_thread_stack;

use super::{Spinner, report};
use crate::{AnyResult, Options};

pub fn run(options: &Options) -> AnyResult<()> {
    let spinner = Spinner::spawn("spinner")?;
    report(options, spinner.tid, capture_thread_stack(spinner.tid))
}
