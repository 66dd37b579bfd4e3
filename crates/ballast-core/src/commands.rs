//! # Commands
//!
//! The user-facing verbs, shared by the command line and the interactive
//! prompt. A [`CommandRegistry`] is built once at start-up and never changes
//! afterwards; each command is a plain function over its arguments, the
//! [`Session`] and an output sink.
//!
//! Arguments are split like a shell would: on whitespace, with single or
//! double quotes grouping an expression that contains spaces, e.g.
//!
//! ```text
//! logsize "*(CMasternode *)0x55d1c0a0" sizes.log
//! ```

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::{BallastError, Result};
use crate::session::Session;

const LOGSIZE_USAGE: &str = "logsize <expression> <logfile>";
const USEDSIZE_USAGE: &str = "usedsize <variable> <expression>";
const MEMTRACE_USAGE: &str = "memtrace";
const SHOW_USAGE: &str = "show [variable]";

/// Signature shared by every command that works on a session.
pub type CommandFn = fn(&[String], &mut Session, &mut dyn Write) -> Result<()>;

#[derive(Clone, Copy)]
enum Action
{
    Run(CommandFn),
    /// Lists the registry the command was found in.
    Help,
}

#[derive(Clone, Copy)]
pub struct Command
{
    pub name: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
    action: Action,
}

impl Command
{
    pub const fn new(name: &'static str, usage: &'static str, summary: &'static str, run: CommandFn) -> Self
    {
        Self {
            name,
            usage,
            summary,
            action: Action::Run(run),
        }
    }

    const fn help() -> Self
    {
        Self {
            name: "help",
            usage: "help",
            summary: "list the available commands",
            action: Action::Help,
        }
    }
}

/// Name → command table.
#[derive(Default)]
pub struct CommandRegistry
{
    commands: BTreeMap<&'static str, Command>,
}

impl CommandRegistry
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Registry holding `logsize`, `usedsize`, `show`, `memtrace` and `help`.
    pub fn builtin() -> Self
    {
        let mut registry = Self::new();
        for command in [
            Command::new(
                "logsize",
                LOGSIZE_USAGE,
                "append the used size of a value to a log file",
                log_size,
            ),
            Command::new(
                "usedsize",
                USEDSIZE_USAGE,
                "print the used size of a value and store it in a variable",
                used_size,
            ),
            Command::new(
                "memtrace",
                MEMTRACE_USAGE,
                "log every allocator call until the process exits",
                mem_trace,
            ),
            Command::new(
                "show",
                SHOW_USAGE,
                "print one stored variable, or all of them",
                show,
            ),
            Command::help(),
        ] {
            registry.commands.insert(command.name, command);
        }
        registry
    }

    pub fn register(&mut self, command: Command) -> Result<()>
    {
        if self.commands.contains_key(command.name) {
            return Err(BallastError::InvalidArgument(format!(
                "command `{}` is already registered",
                command.name
            )));
        }
        self.commands.insert(command.name, command);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Command>
    {
        self.commands.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command>
    {
        self.commands.values()
    }

    /// Run command `name` with already split arguments.
    pub fn run(&self, name: &str, args: &[String], session: &mut Session, out: &mut dyn Write) -> Result<()>
    {
        let command = self
            .get(name)
            .ok_or_else(|| BallastError::InvalidArgument(format!("unknown command `{name}` (try `help`)")))?;

        match command.action {
            Action::Run(run) => run(args, session, out),
            Action::Help if args.is_empty() => self.print_help(out),
            Action::Help => Err(usage(command.usage)),
        }
    }

    /// Split and run one line of input. Blank lines and `#` comments do nothing.
    pub fn dispatch(&self, line: &str, session: &mut Session, out: &mut dyn Write) -> Result<()>
    {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let words = split_args(line)?;
        let Some((name, args)) = words.split_first() else {
            return Ok(());
        };
        self.run(name, args, session, out)
    }

    fn print_help(&self, out: &mut dyn Write) -> Result<()>
    {
        let width = self.iter().map(|command| command.usage.len()).max().unwrap_or(0);
        for command in self.iter() {
            writeln!(out, "{:width$}  {}", command.usage, command.summary)?;
        }
        Ok(())
    }
}

/// Split a command line into words, honouring quotes and backslash escapes.
pub fn split_args(line: &str) -> Result<Vec<String>>
{
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (_, '\\') => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| BallastError::InvalidArgument("trailing backslash".to_string()))?;
                current.push(escaped);
                in_word = true;
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(BallastError::InvalidArgument("unterminated quote".to_string()));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn append_line(path: &Path, line: &str) -> Result<()>
{
    let mut log = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(log, "{line}")?;
    Ok(())
}

fn log_size(args: &[String], session: &mut Session, _out: &mut dyn Write) -> Result<()>
{
    let [expression, logfile] = args else {
        return Err(usage(LOGSIZE_USAGE));
    };
    let measurement = session.measure(expression)?;
    append_line(Path::new(logfile), &format!("{expression}: {}", measurement.bytes))?;
    info!("{} uses {} bytes, logged to {}", expression, measurement.bytes, logfile);
    Ok(())
}

fn used_size(args: &[String], session: &mut Session, out: &mut dyn Write) -> Result<()>
{
    let [variable, expression] = args else {
        return Err(usage(USEDSIZE_USAGE));
    };
    let variable = variable_name(variable);
    if variable.is_empty() {
        return Err(usage(USEDSIZE_USAGE));
    }
    let (value, ty) = session.evaluator().evaluate(expression)?;
    writeln!(out, "{expression} is {ty}")?;

    let bytes = session.calculator().used_size(&value, &ty)?;
    session.set_variable(variable, bytes);
    writeln!(out, "{bytes}")?;
    Ok(())
}

fn mem_trace(args: &[String], session: &mut Session, out: &mut dyn Write) -> Result<()>
{
    if !args.is_empty() {
        return Err(usage(MEMTRACE_USAGE));
    }
    let summary = session.trace()?;
    for (symbol, hits) in &summary.hits {
        writeln!(out, "{symbol}: {hits}")?;
    }
    if let Some(status) = summary.exit_status {
        writeln!(out, "process exited with status {status}")?;
    }
    Ok(())
}

fn show(args: &[String], session: &mut Session, out: &mut dyn Write) -> Result<()>
{
    match args {
        [] => {
            for (name, value) in session.variables() {
                writeln!(out, "${name} = {value}")?;
            }
        }
        [variable] => {
            let name = variable_name(variable);
            let value = session
                .variable(name)
                .ok_or_else(|| BallastError::InvalidArgument(format!("no variable named `${name}`")))?;
            writeln!(out, "{value}")?;
        }
        _ => return Err(usage(SHOW_USAGE)),
    }
    Ok(())
}

/// Variables may be written gdb-style, with a leading `$`.
fn variable_name(word: &str) -> &str
{
    word.strip_prefix('$').unwrap_or(word)
}

fn usage(usage: &str) -> BallastError
{
    BallastError::InvalidArgument(format!("usage: {usage}"))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_split_args_plain()
    {
        assert_eq!(split_args("usedsize  sz mnodeman").unwrap(), vec!["usedsize", "sz", "mnodeman"]);
    }

    #[test]
    fn test_split_args_quotes()
    {
        let words = split_args(r#"logsize "*(CMasternode *)0x1000" 'my log.txt'"#).unwrap();
        assert_eq!(words, vec!["logsize", "*(CMasternode *)0x1000", "my log.txt"]);
    }

    #[test]
    fn test_split_args_errors()
    {
        assert!(split_args("logsize \"unterminated").is_err());
        assert!(split_args("trailing\\").is_err());
    }

    #[test]
    fn test_variable_name_strips_dollar()
    {
        assert_eq!(variable_name("$sz"), "sz");
        assert_eq!(variable_name("sz"), "sz");
        assert_eq!(variable_name("$"), "");
    }

    #[test]
    fn test_builtin_registry()
    {
        let registry = CommandRegistry::builtin();
        let names: Vec<_> = registry.iter().map(|command| command.name).collect();
        assert_eq!(names, vec!["help", "logsize", "memtrace", "show", "usedsize"]);
    }

    #[test]
    fn test_register_rejects_duplicates()
    {
        let mut registry = CommandRegistry::builtin();
        let duplicate = Command::new("logsize", "logsize", "again", show);
        assert!(registry.register(duplicate).is_err());
    }
}
