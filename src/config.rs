//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

/// Sizes and limits for one [`Vm`](crate::vm::Vm).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Slots allocated for the shared stack up front.
    pub initial_stack_size: usize,
    /// The stack never grows past this many slots.
    pub max_stack_size: usize,
    /// Live objects allowed before the first collection.
    pub gc_threshold: usize,
    /// Added to the threshold after every collection.
    pub gc_threshold_increment: usize,
    /// Also write native output to stdout, not only the capture buffer.
    pub echo_output: bool,
}

pub const DEFAULT_GC_THRESHOLD: usize = 256 * 1024;

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            initial_stack_size: 1024,
            max_stack_size: 1024 * 1024,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            gc_threshold_increment: DEFAULT_GC_THRESHOLD,
            echo_output: false,
        }
    }
}

impl VmConfig {
    pub fn with_gc_threshold(mut self, threshold: usize, increment: usize) -> Self {
        self.gc_threshold = threshold;
        self.gc_threshold_increment = increment;
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }
}
