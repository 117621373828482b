//! Translation between framework and engine statuses.
//!
//! Five kinds map one to one: ok, unknown, failed-precondition, aborted and
//! invalid-argument. Anything else becomes unknown, keeping its message.

use core_types::{Status as EngineStatus, StatusType};

use crate::status::{errors, Code, Status};

const UNKNOWN_ERROR: &str = "Unknown error.";

fn reason_or_default(reason: &str) -> &str {
    if reason.is_empty() { UNKNOWN_ERROR } else { reason }
}

impl From<&EngineStatus> for Status {
    fn from(status: &EngineStatus) -> Self {
        let reason = status.reason();
        match status.kind() {
            StatusType::Ok => Status::ok(),
            StatusType::UnknownError => errors::unknown(reason),
            StatusType::PreconditionError => errors::failed_precondition(reason),
            StatusType::Aborted => errors::aborted(reason),
            StatusType::InvalidArgument => errors::invalid_argument(reason),
            StatusType::InProgress => errors::unknown(reason_or_default(reason)),
        }
    }
}

impl From<&Status> for EngineStatus {
    fn from(status: &Status) -> Self {
        let message = status.message();
        match status.code() {
            Code::Ok => EngineStatus::ok(),
            Code::Unknown => EngineStatus::unknown_error(message),
            Code::FailedPrecondition => EngineStatus::precondition_error(message),
            Code::Aborted => EngineStatus::aborted(message),
            Code::InvalidArgument => EngineStatus::invalid_argument(message),
            _ => EngineStatus::unknown_error(reason_or_default(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_to_framework_table() {
        let table = [
            (EngineStatus::ok(), Code::Ok, ""),
            (EngineStatus::unknown_error("boom"), Code::Unknown, "boom"),
            (EngineStatus::precondition_error("not init"), Code::FailedPrecondition, "not init"),
            (EngineStatus::aborted("shutdown"), Code::Aborted, "shutdown"),
            (EngineStatus::invalid_argument("bad shape"), Code::InvalidArgument, "bad shape"),
            (EngineStatus::in_progress(), Code::Unknown, UNKNOWN_ERROR),
        ];
        for (engine, code, message) in table {
            let status = Status::from(&engine);
            assert_eq!(status.code(), code, "{engine}");
            assert_eq!(status.message(), message, "{engine}");
        }
    }

    #[test]
    fn framework_to_engine_table() {
        let table = [
            (Status::ok(), StatusType::Ok),
            (errors::unknown("u"), StatusType::UnknownError),
            (errors::failed_precondition("p"), StatusType::PreconditionError),
            (errors::aborted("a"), StatusType::Aborted),
            (errors::invalid_argument("i"), StatusType::InvalidArgument),
            (errors::internal("i"), StatusType::UnknownError),
            (Status::new(Code::DeadlineExceeded, "late"), StatusType::UnknownError),
        ];
        for (status, kind) in table {
            assert_eq!(EngineStatus::from(&status).kind(), kind, "{status}");
        }
    }

    #[test]
    fn collapsed_kinds_keep_their_message() {
        let status = errors::resource_exhausted("OOM allocating 64 bytes");
        let engine = EngineStatus::from(&status);
        assert_eq!(engine.kind(), StatusType::UnknownError);
        assert_eq!(engine.reason(), "OOM allocating 64 bytes");
    }

    #[test]
    fn mapped_kinds_round_trip() {
        for status in [
            Status::ok(),
            errors::unknown("u"),
            errors::failed_precondition("p"),
            errors::aborted("a"),
            errors::invalid_argument("i"),
        ] {
            assert_eq!(Status::from(&EngineStatus::from(&status)), status);
        }
    }

    #[test]
    fn every_failure_stays_a_failure() {
        for kind in [
            EngineStatus::unknown_error(""),
            EngineStatus::precondition_error(""),
            EngineStatus::aborted(""),
            EngineStatus::invalid_argument(""),
            EngineStatus::in_progress(),
        ] {
            assert!(!Status::from(&kind).is_ok(), "{kind}");
        }
    }
}
