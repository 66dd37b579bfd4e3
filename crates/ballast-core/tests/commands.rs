//! Tests for the logsize, usedsize, show and memtrace commands

mod common;

use std::fs;

use ballast_core::commands::CommandRegistry;
use ballast_core::tracer::TraceConfig;
use ballast_core::types::{Address, TypeDescriptor, TypeShape};
use ballast_core::{BallastError, Session};
use common::{int, vector_of, FakeHeap, FakeInferior, FakeTypes, ScriptedTarget};

/// A session over one global `std::vector<int>` of five elements named `pool`,
/// plus a `Holder` at a known address whose `items` member is that vector.
fn session_with(target: Option<ScriptedTarget>) -> (Session, Address)
{
    let mut heap = FakeHeap::new();
    let holder = heap.alloc(32);
    heap.vector(holder + 8, 4, 5);
    let pointer = heap.alloc(8);
    heap.write_pointer(pointer, holder);

    let holder_ty = TypeDescriptor::new("Holder", 32).with_shape(TypeShape::Record);
    let mut types = FakeTypes::new();
    types.add_type(holder_ty.clone());
    types.add_field("Holder", "items", 8, vector_of(int()));
    types.add_variable("pool", holder + 8, vector_of(int()));
    types.add_variable("holder", holder, holder_ty);

    let inferior = match target {
        Some(target) => FakeInferior::traceable(heap, target),
        None => FakeInferior::new(heap),
    };
    (Session::new(Box::new(inferior), Box::new(types)), holder)
}

fn run(session: &mut Session, line: &str) -> ballast_core::Result<String>
{
    let mut out = Vec::new();
    CommandRegistry::builtin().dispatch(line, session, &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

#[test]
fn test_logsize_appends_one_line_per_call()
{
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("sizes.log");
    let (mut session, _) = session_with(None);

    let line = format!("logsize pool {}", log.display());
    assert_eq!(run(&mut session, &line).unwrap(), "");
    run(&mut session, &line).unwrap();

    assert_eq!(fs::read_to_string(&log).unwrap(), "pool: 44\npool: 44\n");
}

#[test]
fn test_logsize_records_the_expression_as_typed()
{
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("sizes.log");
    let (mut session, holder) = session_with(None);

    let line = format!("logsize \"*(Holder *){:#x}\" '{}'", holder.value(), log.display());
    run(&mut session, &line).unwrap();

    let expected = format!("*(Holder *){:#x}: 32\n", holder.value());
    assert_eq!(fs::read_to_string(&log).unwrap(), expected);
}

#[test]
fn test_logsize_failure_writes_nothing()
{
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("sizes.log");
    let (mut session, _) = session_with(None);

    let err = run(&mut session, &format!("logsize nosuchglobal {}", log.display())).unwrap_err();
    assert!(err.is_query_error());
    assert!(!log.exists());
}

#[test]
fn test_usedsize_prints_type_then_size()
{
    let (mut session, _) = session_with(None);

    let out = run(&mut session, "usedsize sz pool").unwrap();
    assert_eq!(out, "pool is std::vector<int, std::allocator<int> >\n44\n");
    assert_eq!(session.variable("sz"), Some(44));
}

#[test]
fn test_usedsize_through_members()
{
    let (mut session, _) = session_with(None);

    run(&mut session, "usedsize a holder.items").unwrap();
    run(&mut session, "usedsize b holder").unwrap();
    assert_eq!(session.variable("a"), Some(44));
    assert_eq!(session.variable("b"), Some(32));

    let names: Vec<_> = session.variables().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_usedsize_overwrites_variables()
{
    let (mut session, _) = session_with(None);
    session.set_variable("sz", 1);

    run(&mut session, "usedsize sz pool").unwrap();
    assert_eq!(session.variable("sz"), Some(44));
}

#[test]
fn test_show_reads_back_stored_sizes()
{
    let (mut session, _) = session_with(None);

    run(&mut session, "usedsize $sz pool").unwrap();
    run(&mut session, "usedsize whole holder").unwrap();

    assert_eq!(run(&mut session, "show sz").unwrap(), "44\n");
    assert_eq!(run(&mut session, "show $whole").unwrap(), "32\n");
    assert_eq!(run(&mut session, "show").unwrap(), "$sz = 44\n$whole = 32\n");
}

#[test]
fn test_show_unknown_variable_fails()
{
    let (mut session, _) = session_with(None);
    let err = run(&mut session, "show nothing").unwrap_err();
    assert!(matches!(err, BallastError::InvalidArgument(ref message) if message.contains("$nothing")));
    assert_eq!(run(&mut session, "show").unwrap(), "");
}

#[test]
fn test_usage_errors()
{
    let (mut session, _) = session_with(None);

    for line in [
        "usedsize onlyone",
        "usedsize $ pool",
        "logsize pool",
        "memtrace extra",
        "show a b",
        "help me",
    ] {
        let err = run(&mut session, line).unwrap_err();
        assert!(
            matches!(err, BallastError::InvalidArgument(ref message) if message.starts_with("usage:")),
            "{line}: {err}"
        );
    }
}

#[test]
fn test_unknown_command()
{
    let (mut session, _) = session_with(None);
    let err = run(&mut session, "sizeof pool").unwrap_err();
    assert!(err.to_string().contains("unknown command"));
}

#[test]
fn test_blank_and_comment_lines_do_nothing()
{
    let (mut session, _) = session_with(None);
    assert_eq!(run(&mut session, "   ").unwrap(), "");
    assert_eq!(run(&mut session, "# usedsize sz pool").unwrap(), "");
    assert_eq!(session.variable("sz"), None);
}

#[test]
fn test_help_lists_every_command()
{
    let (mut session, _) = session_with(None);
    let out = run(&mut session, "help").unwrap();
    for name in ["help", "logsize", "memtrace", "show", "usedsize"] {
        assert!(out.lines().any(|line| line.starts_with(name)), "{name} missing from:\n{out}");
    }
}

#[test]
fn test_memtrace_needs_a_traceable_target()
{
    let (mut session, _) = session_with(None);
    assert!(matches!(
        run(&mut session, "memtrace"),
        Err(BallastError::InvalidArgument(_))
    ));
}

#[test]
fn test_memtrace_reports_hits()
{
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("memlog.txt");
    let target = ScriptedTarget::new([
        ScriptedTarget::frame("__libc_malloc"),
        ScriptedTarget::frame("__libc_malloc"),
        ScriptedTarget::frame("exit"),
    ]);
    let (session, _) = session_with(Some(target));
    let mut session = session.with_trace_config(TraceConfig {
        log_path: log.clone(),
        ..TraceConfig::default()
    });

    let out = run(&mut session, "memtrace").unwrap();
    assert_eq!(out, "__libc_malloc: 2\nexit: 1\n");
    assert_eq!(fs::read_to_string(&log).unwrap(), "__libc_malloc\n__libc_malloc\nexit\n\n");
}
