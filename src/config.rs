//! Analysis options.

/// Options read once when an analysis is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Maximal call string length, `None` for unbounded.
    pub call_string_bound: Option<usize>,
    /// Always evaluate the pending point with the lowest address first.
    pub process_addresses_in_order: bool,
    /// Decode whole basic blocks instead of single instructions.
    pub disassemble_block_wise: bool,
    /// Drop successors whose target cannot be decoded instead of failing.
    pub ignore_unknown_jump_targets: bool,
    pub use_widening: bool,
    /// Largest number of concrete targets an indirect branch may resolve to.
    pub max_target_enumeration: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            call_string_bound: None,
            process_addresses_in_order: true,
            disassemble_block_wise: false,
            ignore_unknown_jump_targets: false,
            use_widening: true,
            max_target_enumeration: 16,
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        AnalysisConfig::default()
    }

    pub fn with_call_string_bound(mut self, k: usize) -> Self {
        self.call_string_bound = Some(k);
        self
    }

    pub fn with_in_order(mut self, in_order: bool) -> Self {
        self.process_addresses_in_order = in_order;
        self
    }

    pub fn with_block_wise(mut self, block_wise: bool) -> Self {
        self.disassemble_block_wise = block_wise;
        self
    }

    pub fn with_ignore_unknown_jump_targets(mut self, ignore: bool) -> Self {
        self.ignore_unknown_jump_targets = ignore;
        self
    }

    pub fn with_widening(mut self, use_widening: bool) -> Self {
        self.use_widening = use_widening;
        self
    }

    pub fn with_max_target_enumeration(mut self, limit: u64) -> Self {
        self.max_target_enumeration = limit;
        self
    }
}
