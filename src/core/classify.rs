use std::collections::HashSet;

/// Whether a connection failure should abort startup or be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Fatal,
    Transient,
}

/// Classifies transport failures against the configured set of
/// do-not-retry codes.
///
/// The asymmetry on `ever_connected` is deliberate: a service that was once
/// reachable is assumed to recover, so after the first success every failure
/// is transient. Before the first success, codes like bad credentials point
/// at a configuration bug that retrying would only hide.
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    fatal_codes: HashSet<tonic::Code>,
}

impl StatusClassifier {
    pub fn new(fatal_codes: HashSet<tonic::Code>) -> Self {
        Self { fatal_codes }
    }

    pub fn classify(&self, code: tonic::Code, ever_connected: bool) -> FailureClass {
        if ever_connected {
            return FailureClass::Transient;
        }

        if self.fatal_codes.contains(&code) {
            FailureClass::Fatal
        } else {
            FailureClass::Transient
        }
    }
}
