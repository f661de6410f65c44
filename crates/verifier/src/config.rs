#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Diagnostic cap; 0 means unlimited.
    pub max_diagnostics: usize,
    /// The post dominator check is a bounded depth-first search per block
    /// that declares one; it dominates the cost of a full verification run.
    pub check_postdominators: bool,
    /// Loop forest checks walk every member and exit of every loop.
    pub check_loops: bool,
}

impl VerifierConfig {
    /// Block and dominator tree checks only.
    pub fn fast() -> Self {
        Self {
            check_postdominators: false,
            check_loops: false,
            ..Self::default()
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_diagnostics: 200,
            check_postdominators: true,
            check_loops: true,
        }
    }
}
