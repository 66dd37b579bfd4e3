//! Tests for error handling

use std::error::Error;
use std::io;

use ballast_core::error::{BallastError, Result};
use ballast_core::types::{Address, AddressExpression};

#[test]
fn test_resolution_error_display()
{
    let error = BallastError::resolution("mnodeman.vMasternodes", "address is not mapped");
    let message = format!("{}", error);
    assert!(message.contains("`mnodeman.vMasternodes`"));
    assert!(message.contains("not mapped"));
}

#[test]
fn test_type_lookup_display()
{
    let error = BallastError::TypeLookup("CMasternodePing".to_string());
    assert!(error.to_string().contains("CMasternodePing"));
}

#[test]
fn test_only_resolution_and_type_lookup_are_query_errors()
{
    assert!(BallastError::resolution("x", "y").is_query_error());
    assert!(BallastError::TypeLookup("T".to_string()).is_query_error());
    assert!(!BallastError::NotAttached.is_query_error());
    assert!(!BallastError::ProcessNotFound(1).is_query_error());
}

#[test]
fn test_at_expression_relabels_resolution_errors()
{
    let raw = BallastError::resolution("*0x7000", "short read");
    let expr = AddressExpression::new("mnodeman.mapSeenMasternodePing", Address::from(0x7000));

    match raw.at_expression(&expr) {
        BallastError::Resolution { expression, reason } => {
            assert_eq!(expression, "mnodeman.mapSeenMasternodePing");
            assert_eq!(reason, "short read");
        }
        other => panic!("expected a resolution error, got {other:?}"),
    }
}

#[test]
fn test_at_expression_keeps_other_variants()
{
    let error = BallastError::TypeLookup("CTxIn".to_string()).at_expression("anything");
    assert!(matches!(error, BallastError::TypeLookup(ref name) if name == "CTxIn"));
}

#[test]
fn test_process_not_found()
{
    let error = BallastError::ProcessNotFound(12345);
    let message = format!("{}", error);
    assert!(message.contains("12345"));
    assert!(message.contains("not found"));
}

#[test]
fn test_permission_denied()
{
    let error = BallastError::PermissionDenied("ptrace_scope is 1".to_string());
    let message = format!("{}", error);
    assert!(message.contains("Permission denied"));
    assert!(message.contains("ptrace_scope"));
}

#[test]
fn test_ptrace_error_keeps_its_source()
{
    let error = BallastError::Ptrace {
        operation: "PTRACE_CONT",
        source: io::Error::new(io::ErrorKind::Other, "No such process"),
    };
    assert!(error.to_string().contains("PTRACE_CONT"));
    assert!(error.source().is_some());
}

#[test]
fn test_io_error_converts()
{
    let error: BallastError = io::Error::new(io::ErrorKind::NotFound, "no such file").into();
    assert!(matches!(error, BallastError::Io(_)));
}

#[test]
fn test_result_type()
{
    let _result: Result<()> = Ok(());
    let _error_result: Result<()> = Err(BallastError::ProcessNotFound(12345));
}
