//! Probe evaluation for worker health checks
//!
//! Walks the enabled sub-checks in a fixed order and stops at the first
//! failure; orchestrators treat the first diagnosis as the authoritative
//! one, and later checks must not run their side effects (network calls
//! included) once the outcome is decided.

use crate::beacon::{Beacon, Freshness, Staleness};
use crate::error::Error;
use crate::sonar::{PingStatus, Roundtrip};
use state_machines::state_machine;
use std::path::PathBuf;

/// Exit code when the event loop liveness check fails
pub const EXIT_CODE_EVENT_LOOP_BROKEN: i32 = 1;
/// Exit code when the ping roundtrip check fails
pub const EXIT_CODE_PING_FAILURE: i32 = 2;
/// Exit code when the readiness check fails
pub const EXIT_CODE_NOT_READY: i32 = 4;

state_machine! {
    name: ProbeMachine,
    dynamic: true,  // driven at runtime by check outcomes
    initial: Init,
    states: [Init, EventLoopCheck, PingCheck, ReadinessCheck, Done, Failed],
    events {
        begin {
            transition: { from: Init, to: EventLoopCheck }
        }
        alive {
            transition: { from: EventLoopCheck, to: PingCheck }
        }
        pong {
            transition: { from: PingCheck, to: ReadinessCheck }
        }
        ready {
            transition: { from: ReadinessCheck, to: Done }
        }
        fail {
            transition: { from: [EventLoopCheck, PingCheck, ReadinessCheck], to: Failed }
        }
    }
}

/// A failed sub-check, carrying its diagnostic line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    /// The event loop liveness marker is missing or stale
    EventLoopBroken(String),
    /// The ping roundtrip got no reply in time
    PingTimeout(String),
    /// The broker could not be reached at all
    BrokerUnreachable(String),
    /// The readiness marker is absent
    NotReady(String),
}

impl CheckFailure {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            CheckFailure::EventLoopBroken(_) => EXIT_CODE_EVENT_LOOP_BROKEN,
            CheckFailure::PingTimeout(_) | CheckFailure::BrokerUnreachable(_) => {
                EXIT_CODE_PING_FAILURE
            }
            CheckFailure::NotReady(_) => EXIT_CODE_NOT_READY,
        }
    }

    /// Diagnostic line for stderr
    pub fn message(&self) -> &str {
        match self {
            CheckFailure::EventLoopBroken(message)
            | CheckFailure::PingTimeout(message)
            | CheckFailure::BrokerUnreachable(message)
            | CheckFailure::NotReady(message) => message,
        }
    }
}

/// Which sub-checks run, and against what
#[derive(Debug, Clone)]
pub struct WorkerProbe {
    /// Event loop liveness marker path
    pub liveness_file: PathBuf,
    /// Maximum allowed liveness marker age in seconds (may be negative)
    pub max_age: i64,
    /// Evaluate the event loop liveness marker
    pub check_event_loop: bool,
    /// Perform the ping roundtrip
    pub check_ping: bool,
    /// Readiness marker path
    pub readiness_file: PathBuf,
    /// Evaluate the readiness marker
    pub check_readiness: bool,
}

/// Aggregated outcome: pass lines in evaluation order, then at most one failure
#[derive(Debug)]
pub struct ProbeReport {
    /// Status lines of the checks that passed, in order
    pub passed: Vec<String>,
    /// The first failing enabled check, if any
    pub failure: Option<CheckFailure>,
}

impl ProbeReport {
    /// Process exit code: 0 when every enabled check passed
    pub fn exit_code(&self) -> i32 {
        self.failure
            .as_ref()
            .map(CheckFailure::exit_code)
            .unwrap_or(0)
    }
}

impl WorkerProbe {
    /// Evaluate the enabled checks against the given ping transport
    ///
    /// Returns `Err` only for setup problems; check failures land in the
    /// report. With every check disabled the report is trivially healthy.
    pub fn evaluate(&self, roundtrip: &dyn Roundtrip) -> crate::error::Result<ProbeReport> {
        let mut machine = ProbeMachine::new(()).into_dynamic();
        let mut passed = Vec::new();

        machine
            .handle(ProbeMachineEvent::Begin)
            .map_err(transition_error)?;

        if self.check_event_loop {
            let beacon = Beacon::new(&self.liveness_file);
            match beacon.check(self.max_age) {
                Freshness::Fresh { .. } => {
                    passed.push("The event loop appears to be running.".to_string());
                }
                Freshness::Stale(staleness) => {
                    machine
                        .handle(ProbeMachineEvent::Fail)
                        .map_err(transition_error)?;
                    let message = match staleness {
                        Staleness::Missing => format!(
                            "File '{}' does not exist or is not a file.",
                            self.liveness_file.display()
                        ),
                        Staleness::Expired { .. } => format!(
                            "File '{}' is older than max-age.",
                            self.liveness_file.display()
                        ),
                    };
                    return Ok(ProbeReport {
                        passed,
                        failure: Some(CheckFailure::EventLoopBroken(message)),
                    });
                }
            }
        }
        machine
            .handle(ProbeMachineEvent::Alive)
            .map_err(transition_error)?;

        if self.check_ping {
            match roundtrip.ping()? {
                PingStatus::Pong { worker } => {
                    passed.push(format!("{}: PONG.", worker));
                }
                PingStatus::NoReply => {
                    machine
                        .handle(ProbeMachineEvent::Fail)
                        .map_err(transition_error)?;
                    return Ok(ProbeReport {
                        passed,
                        failure: Some(CheckFailure::PingTimeout(format!(
                            "No reply to ping from '{}' after {}s.",
                            roundtrip.destination(),
                            roundtrip.timeout().as_secs()
                        ))),
                    });
                }
                PingStatus::Unreachable(detail) => {
                    machine
                        .handle(ProbeMachineEvent::Fail)
                        .map_err(transition_error)?;
                    return Ok(ProbeReport {
                        passed,
                        failure: Some(CheckFailure::BrokerUnreachable(format!(
                            "Could not reach the broker: {}",
                            detail
                        ))),
                    });
                }
            }
        }
        machine
            .handle(ProbeMachineEvent::Pong)
            .map_err(transition_error)?;

        if self.check_readiness {
            let beacon = Beacon::new(&self.readiness_file);
            if beacon.is_present() {
                passed.push("The worker appears ready to process tasks.".to_string());
            } else {
                machine
                    .handle(ProbeMachineEvent::Fail)
                    .map_err(transition_error)?;
                return Ok(ProbeReport {
                    passed,
                    failure: Some(CheckFailure::NotReady(format!(
                        "File '{}' does not exist - worker is not ready.",
                        self.readiness_file.display()
                    ))),
                });
            }
        }
        machine
            .handle(ProbeMachineEvent::Ready)
            .map_err(transition_error)?;

        Ok(ProbeReport {
            passed,
            failure: None,
        })
    }
}

fn transition_error(e: state_machines::DynamicError) -> Error {
    Error::ProbeTransition(format!("{e:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::Path;
    use std::time::Duration;

    /// Ping transport that records whether it was invoked
    struct StubRoundtrip {
        status: PingStatus,
        called: Cell<bool>,
    }

    impl StubRoundtrip {
        fn new(status: PingStatus) -> Self {
            Self {
                status,
                called: Cell::new(false),
            }
        }
    }

    impl Roundtrip for StubRoundtrip {
        fn destination(&self) -> &str {
            "worker@test"
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(3)
        }

        fn ping(&self) -> crate::error::Result<PingStatus> {
            self.called.set(true);
            Ok(self.status.clone())
        }
    }

    fn pong() -> PingStatus {
        PingStatus::Pong {
            worker: "worker@test".to_string(),
        }
    }

    fn probe(liveness: &Path, readiness: &Path) -> WorkerProbe {
        WorkerProbe {
            liveness_file: liveness.to_path_buf(),
            max_age: 10,
            check_event_loop: true,
            check_ping: true,
            readiness_file: readiness.to_path_buf(),
            check_readiness: true,
        }
    }

    #[test]
    fn test_all_checks_disabled_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let mut probe = probe(&dir.path().join("live"), &dir.path().join("ready"));
        probe.check_event_loop = false;
        probe.check_ping = false;
        probe.check_readiness = false;
        let roundtrip = StubRoundtrip::new(pong());

        let report = probe.evaluate(&roundtrip).unwrap();

        assert_eq!(report.exit_code(), 0);
        assert!(report.passed.is_empty());
        assert!(!roundtrip.called.get());
    }

    #[test]
    fn test_missing_liveness_file_breaks_event_loop_check() {
        let dir = tempfile::tempdir().unwrap();
        let probe = probe(&dir.path().join("absent"), &dir.path().join("ready"));
        let roundtrip = StubRoundtrip::new(pong());

        let report = probe.evaluate(&roundtrip).unwrap();

        assert_eq!(report.exit_code(), EXIT_CODE_EVENT_LOOP_BROKEN);
        // short-circuit: the ping never went out
        assert!(!roundtrip.called.get());
    }

    #[test]
    fn test_liveness_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let probe = probe(dir.path(), &dir.path().join("ready"));
        let roundtrip = StubRoundtrip::new(pong());

        let report = probe.evaluate(&roundtrip).unwrap();

        assert_eq!(report.exit_code(), EXIT_CODE_EVENT_LOOP_BROKEN);
    }

    #[test]
    fn test_negative_max_age_breaks_event_loop_check() {
        let dir = tempfile::tempdir().unwrap();
        let liveness = dir.path().join("live");
        Beacon::new(&liveness).touch().unwrap();
        let mut probe = probe(&liveness, &dir.path().join("ready"));
        probe.max_age = -1;
        probe.check_ping = false;
        probe.check_readiness = false;
        let roundtrip = StubRoundtrip::new(pong());

        let report = probe.evaluate(&roundtrip).unwrap();

        assert_eq!(report.exit_code(), EXIT_CODE_EVENT_LOOP_BROKEN);
    }

    #[test]
    fn test_ping_timeout_exits_with_ping_code() {
        let dir = tempfile::tempdir().unwrap();
        let liveness = dir.path().join("live");
        Beacon::new(&liveness).touch().unwrap();
        let mut probe = probe(&liveness, &dir.path().join("ready"));
        probe.check_readiness = false;
        let roundtrip = StubRoundtrip::new(PingStatus::NoReply);

        let report = probe.evaluate(&roundtrip).unwrap();

        assert_eq!(report.exit_code(), EXIT_CODE_PING_FAILURE);
        assert!(roundtrip.called.get());
        let failure = report.failure.unwrap();
        assert!(failure.message().contains("worker@test"));
        assert!(failure.message().contains("3s"));
    }

    #[test]
    fn test_unreachable_broker_exits_with_ping_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut probe = probe(&dir.path().join("live"), &dir.path().join("ready"));
        probe.check_event_loop = false;
        probe.check_readiness = false;
        let roundtrip =
            StubRoundtrip::new(PingStatus::Unreachable("connection refused".to_string()));

        let report = probe.evaluate(&roundtrip).unwrap();

        assert_eq!(report.exit_code(), EXIT_CODE_PING_FAILURE);
    }

    #[test]
    fn test_missing_readiness_file_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut probe = probe(&dir.path().join("live"), &dir.path().join("absent"));
        probe.check_event_loop = false;
        probe.check_ping = false;
        let roundtrip = StubRoundtrip::new(pong());

        let report = probe.evaluate(&roundtrip).unwrap();

        assert_eq!(report.exit_code(), EXIT_CODE_NOT_READY);
        assert!(!roundtrip.called.get());
    }

    #[test]
    fn test_all_enabled_checks_pass() {
        let dir = tempfile::tempdir().unwrap();
        let liveness = dir.path().join("live");
        let readiness = dir.path().join("ready");
        Beacon::new(&liveness).touch().unwrap();
        Beacon::new(&readiness).touch().unwrap();
        let probe = probe(&liveness, &readiness);
        let roundtrip = StubRoundtrip::new(pong());

        let report = probe.evaluate(&roundtrip).unwrap();

        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.passed.len(), 3);
        assert_eq!(report.passed[1], "worker@test: PONG.");
    }

    #[test]
    fn test_event_loop_failure_wins_over_later_failures() {
        let dir = tempfile::tempdir().unwrap();
        // liveness marker absent, readiness marker absent, ping would time
        // out; the first enabled check decides
        let probe = probe(&dir.path().join("absent"), &dir.path().join("absent"));
        let roundtrip = StubRoundtrip::new(PingStatus::NoReply);

        let report = probe.evaluate(&roundtrip).unwrap();

        assert_eq!(report.exit_code(), EXIT_CODE_EVENT_LOOP_BROKEN);
        assert!(!roundtrip.called.get());
    }
}
