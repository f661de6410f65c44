mod config;
mod diagnostic;
mod report;
mod verify;

pub use config::VerifierConfig;
pub use diagnostic::{Diagnostic, DiagnosticCode, Location, Note, Severity};
pub use report::VerificationReport;
pub use verify::{verify_graph, verify_graph_or_panic};

/// Asserts the structural invariants of a graph in debug builds (or with the
/// `verify-cfg` feature) and compiles to nothing otherwise. The checks cost
/// O(blocks * dominator depth) over the whole graph, so release builds skip
/// them.
#[macro_export]
macro_rules! debug_verify_cfg {
    ($cfg:expr) => {{
        if cfg!(debug_assertions) || cfg!(feature = "verify-cfg") {
            let config = $crate::VerifierConfig::default();
            let report = $crate::verify_graph($cfg, &config);
            if report.has_errors() {
                eprintln!("TOCCATA_CFG_VERIFY_FAILURE");
                eprintln!("{report}");
                panic!("TOCCATA_CFG_VERIFY_FAILURE");
            }
        }
    }};
}
