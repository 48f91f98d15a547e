//! Purpose: Line-oriented terminal front end for `rowrelay ui`.
//! Exports: `run_console`, `Command`, `parse_command`.
//! Role: Reads commands, drives `ui::Session`, prints `ui::render` output.
//! Invariants: The screen is redrawn after every command that touches the table.
//! Invariants: Row numbers typed by the user are 1-based.
//! Invariants: A loading frame is printed before every page request goes out.
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use std::time::Instant;

use rowrelay::api::{Error, ErrorKind};
use rowrelay::ui::{RecordsBackend, Session, render};

const HELP: &str = "\
commands:
  next | prev               move between pages
  search <term>             filter by name
  reset                     clear the search
  reload                    reload the current page
  new                       create a record (prompts for fields)
  edit <n>                  start editing row n
  set <n> <field> <value>   change nome, email or telefone in the draft
  save <n> | cancel <n>     finish editing row n
  delete <n>                delete row n (asks for confirmation)
  help | quit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Next,
    Prev,
    Search(String),
    Reset,
    Reload,
    New,
    Edit(usize),
    Set {
        row: usize,
        field: String,
        value: String,
    },
    Save(usize),
    Cancel(usize),
    Delete(usize),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>, Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word {
        "next" | "n" => Command::Next,
        "prev" | "p" => Command::Prev,
        "search" | "/" => Command::Search(rest.to_string()),
        "reset" => Command::Reset,
        "reload" | "r" => Command::Reload,
        "new" => Command::New,
        "edit" => Command::Edit(parse_row(rest)?),
        "save" => Command::Save(parse_row(rest)?),
        "cancel" => Command::Cancel(parse_row(rest)?),
        "delete" | "del" => Command::Delete(parse_row(rest)?),
        "set" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let row = parse_row(parts.next().unwrap_or(""))?;
            let field = parts.next().unwrap_or("").to_string();
            if field.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("set needs a field name")
                    .with_hint("Usage: set <n> <field> <value>"));
            }
            let value = parts.next().unwrap_or("").to_string();
            Command::Set { row, field, value }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown command: {other}"))
                .with_hint("Type `help` for the command list."));
        }
    };
    Ok(Some(command))
}

fn parse_row(value: &str) -> Result<usize, Error> {
    match value.trim().parse::<usize>() {
        Ok(row) if row > 0 => Ok(row - 1),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("expected a row number, got `{}`", value.trim()))
            .with_hint("Rows are numbered from 1 in the # column.")),
    }
}

/// Console output shared with the session's loading hook.
struct Screen<W>(Rc<RefCell<W>>);

impl<W> Clone for Screen<W> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<W: Write> Write for Screen<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

pub fn run_console<B, R, W>(session: &mut Session<B>, input: R, output: W) -> Result<(), Error>
where
    B: RecordsBackend,
    R: BufRead,
    W: Write + 'static,
{
    let screen = Screen(Rc::new(RefCell::new(output)));
    let mut loading_screen = screen.clone();
    session.set_loading_hook(move |view, state| {
        let frame = render(view, state, Instant::now());
        let drawn = writeln!(loading_screen, "{frame}").and_then(|()| loading_screen.flush());
        if let Err(err) = drawn {
            tracing::warn!(error = %err, "failed to draw loading screen");
        }
    });
    let result = command_loop(session, input, screen);
    session.clear_loading_hook();
    result
}

fn command_loop<B, R, W>(session: &mut Session<B>, mut input: R, mut output: W) -> Result<(), Error>
where
    B: RecordsBackend,
    R: BufRead,
    W: Write,
{
    session.start();
    draw(session, &mut output)?;

    loop {
        write!(output, "> ").map_err(io_error)?;
        output.flush().map_err(io_error)?;
        let Some(line) = read_line(&mut input)? else {
            break;
        };
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                print_error(&mut output, &err)?;
                continue;
            }
        };

        let outcome = match command {
            Command::Quit => break,
            Command::Help => {
                writeln!(output, "{HELP}").map_err(io_error)?;
                continue;
            }
            Command::Next => {
                if !session.view().pagination().next_enabled {
                    writeln!(output, "already on the last page").map_err(io_error)?;
                    continue;
                }
                session.next();
                Ok(())
            }
            Command::Prev => {
                if !session.view().pagination().prev_enabled {
                    writeln!(output, "already on the first page").map_err(io_error)?;
                    continue;
                }
                session.previous();
                Ok(())
            }
            Command::Search(term) => {
                session.search(&term);
                Ok(())
            }
            Command::Reset => {
                session.reset();
                Ok(())
            }
            Command::Reload => {
                session.reload();
                Ok(())
            }
            Command::New => prompt_create(session, &mut input, &mut output),
            Command::Edit(row) => session.begin_edit(row),
            Command::Set { row, field, value } => session.edit_field(row, &field, &value),
            Command::Save(row) => session.save_edit(row).map(|_| ()),
            Command::Cancel(row) => session.cancel_edit(row).map(|_| ()),
            Command::Delete(row) => {
                let mut confirm_error = None;
                let result = session.delete(row, |record| {
                    match confirm(
                        &mut input,
                        &mut output,
                        &format!("Delete {} <{}>?", record.fields.nome, record.fields.email),
                    ) {
                        Ok(answer) => answer,
                        Err(err) => {
                            confirm_error = Some(err);
                            false
                        }
                    }
                });
                if let Some(err) = confirm_error {
                    return Err(err);
                }
                result.map(|_| ())
            }
        };

        if let Err(err) = outcome {
            print_error(&mut output, &err)?;
            continue;
        }
        if let Some(alert) = session.view_mut().take_alert() {
            writeln!(output, "! {alert}").map_err(io_error)?;
        }
        draw(session, &mut output)?;
    }
    Ok(())
}

fn prompt_create<B, R, W>(session: &mut Session<B>, input: &mut R, output: &mut W) -> Result<(), Error>
where
    B: RecordsBackend,
    R: BufRead,
    W: Write,
{
    let nome = prompt(input, output, "nome")?;
    let email = prompt(input, output, "email")?;
    let telefone = prompt(input, output, "telefone (optional)")?;
    let form = session.view_mut().form_mut();
    form.nome = nome;
    form.email = email;
    form.telefone = telefone;
    session.create();
    Ok(())
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, label: &str) -> Result<String, Error> {
    write!(output, "{label}: ").map_err(io_error)?;
    output.flush().map_err(io_error)?;
    Ok(read_line(input)?.unwrap_or_default())
}

fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<bool, Error> {
    write!(output, "{question} [y/N] ").map_err(io_error)?;
    output.flush().map_err(io_error)?;
    let answer = read_line(input)?.unwrap_or_default();
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>, Error> {
    let mut line = String::new();
    let read = input.read_line(&mut line).map_err(io_error)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

fn draw<B: RecordsBackend, W: Write>(session: &mut Session<B>, output: &mut W) -> Result<(), Error> {
    let now = Instant::now();
    session.view_mut().expire_flash(now);
    let screen = render(session.view(), session.state(), now);
    writeln!(output, "{screen}").map_err(io_error)
}

fn print_error<W: Write>(output: &mut W, err: &Error) -> Result<(), Error> {
    let message = err.message().unwrap_or("command failed");
    match err.hint() {
        Some(hint) => writeln!(output, "error: {message} ({hint})"),
        None => writeln!(output, "error: {message}"),
    }
    .map_err(io_error)
}

fn io_error(err: std::io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("console i/o failed")
        .with_source(err)
}
