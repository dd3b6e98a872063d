use warren_core::{codes, Coded, CodedError, FailureClass, HandlerError};

#[derive(Debug, thiserror::Error)]
#[error("directory lookup failed for {0}")]
struct DirectoryError(String);

impl Coded for DirectoryError {
    fn code(&self) -> &str {
        codes::INTEGRATION
    }
}

fn fails_with_coded() -> Result<(), HandlerError> {
    let lookup: Result<(), DirectoryError> = Err(DirectoryError("ada@example.com".to_string()));
    lookup?;
    Ok(())
}

#[test]
fn coded_error_keeps_code_and_message() {
    let err = CodedError::new("VALIDATION", "bad payload");

    assert_eq!(err.code(), "VALIDATION");
    assert_eq!(err.message(), "bad payload");
    assert_eq!(err.to_string(), "VALIDATION: bad payload");
}

#[test]
fn any_coded_error_converts_with_question_mark() {
    let err = fails_with_coded().unwrap_err();

    assert_eq!(err.code(), codes::INTEGRATION);
    assert_eq!(err.class(), FailureClass::Expected(codes::INTEGRATION.to_string()));
    assert!(err.to_string().contains("ada@example.com"));
}

#[test]
fn constructors_use_stable_codes() {
    assert_eq!(CodedError::validation("x").code(), codes::VALIDATION);
    assert_eq!(CodedError::integration("x").code(), codes::INTEGRATION);
    assert_eq!(CodedError::configuration("x").code(), codes::CONFIGURATION);
    assert_eq!(CodedError::publish("nack").code(), codes::PUBLISH);
    assert_eq!(CodedError::publish("nack").to_coded(), CodedError::publish("nack"));
}

#[test]
fn foreign_errors_and_panics_are_unexpected() {
    let foreign = HandlerError::unexpected("connection reset");
    assert!(foreign.class().is_unexpected());
    assert_eq!(foreign.code(), codes::UNEXPECTED);

    let panicked = HandlerError::panicked(Box::new("boom"));
    assert!(panicked.class().is_unexpected());
    assert_eq!(panicked.to_string(), "handler panicked: boom");

    let formatted = HandlerError::panicked(Box::new(format!("index {}", 3)));
    assert_eq!(formatted.to_string(), "handler panicked: index 3");
}

#[test]
fn unrecognized_codes_fall_back_to_unexpected() {
    let err: HandlerError = CodedError::new(codes::UNEXPECTED, "who knows").into();
    assert!(err.class().is_unexpected());

    let empty: HandlerError = CodedError::new("", "no code").into();
    assert!(empty.class().is_unexpected());
    assert_eq!(empty.code(), codes::UNEXPECTED);
}

#[test]
fn coded_error_roundtrips_through_json() {
    let err = CodedError::integration("timeout");
    let json = serde_json::to_string(&err).unwrap();

    assert_eq!(json, r#"{"code":"INTEGRATION","message":"timeout"}"#);
}
