//! A single optional external handler that can override any stage's
//! compute, one method per stage kind. Grounded on the opt-in-via-default-methods
//! shape used for custom processing stages elsewhere in this codebase: every
//! method defaults to "did not handle it", so a plugin only needs to
//! implement the hooks it cares about.

use crate::stage_io::{StageInput, StageOutput};

/// `true` means the plugin produced `output` and the stage's built-in kernel
/// must be skipped; `false` means fall through to the kernel.
pub trait Plugin: Send + Sync {
    fn on_rectify(&self, _input: &StageInput, _output: &mut StageOutput) -> bool {
        false
    }

    fn on_disparity(&self, _input: &StageInput, _output: &mut StageOutput) -> bool {
        false
    }

    fn on_disparity_normalized(&self, _input: &StageInput, _output: &mut StageOutput) -> bool {
        false
    }

    fn on_points(&self, _input: &StageInput, _output: &mut StageOutput) -> bool {
        false
    }

    fn on_depth(&self, _input: &StageInput, _output: &mut StageOutput) -> bool {
        false
    }
}
