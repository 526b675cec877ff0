/// Classification for how the engine absorbs a provider error.
///
/// # Behavior Summary
///
/// | Class | Try Next Provider? | Failure Tracker | Quality Recorder |
/// |-------|-------------------|-----------------|------------------|
/// | `Never` | No | untouched | untouched |
/// | `FailoverWithPenalty` | Yes | failure recorded | request counted as failed |
/// | `QualityPenalty` | Yes | failure recorded | quality issue appended |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - bad request, bad configuration, or exhaustion.
    /// The error is surfaced to the caller as-is.
    Never,

    /// Transient transport-level problem (timeout, HTTP failure, throttling,
    /// unparseable body). The provider is charged a failure and the next
    /// provider in Selector order is tried.
    FailoverWithPenalty,

    /// The provider answered, but with data that failed validation.
    ///
    /// Counts as a failure for selection purposes and is additionally
    /// recorded as a quality issue, which feeds the softer priority penalty.
    QualityPenalty,
}
