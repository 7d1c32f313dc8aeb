//! The interactive session.

use anyhow::{Context, Result};
use hololisp_playground::{ForeignVm, Playground};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};

use crate::view::{self, TerminalView};

const HELP: &str = "\
commands:
  :examples        list examples (* marks the selected one)
  :select <label>  load an example into the editor
  :edit            replace the editor; end input with a line containing only '.'
  :show            print the editor
  :run             run the editor in a fresh interpreter
  :output          print the output of the last run
  :help            show this help
  :quit            leave";

/// A parsed input line.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Examples,
    Select(&'a str),
    Edit,
    Show,
    Run,
    Output,
    Help,
    Quit,
    Empty,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        match word {
            "" => Self::Empty,
            ":examples" | ":e" => Self::Examples,
            ":select" | ":s" if !rest.is_empty() => Self::Select(rest),
            ":edit" => Self::Edit,
            ":show" => Self::Show,
            ":run" | ":r" => Self::Run,
            ":output" | ":o" => Self::Output,
            ":help" | ":h" | ":?" => Self::Help,
            ":quit" | ":q" | ":exit" => Self::Quit,
            _ => Self::Unknown(line),
        }
    }
}

/// Read commands from stdin until `:quit` or end of input.
pub async fn run<F: ForeignVm>(mut playground: Playground<F, TerminalView>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("hololisp playground. :help for commands");

    loop {
        prompt("hll> ").await?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Examples => {
                let selected = playground
                    .selected()
                    .and_then(|label| playground.examples().position(label));
                view::print_examples(playground.examples(), selected);
            }
            Command::Select(label) => {
                if let Err(error) = playground.select_example(label) {
                    eprintln!("{error}");
                }
            }
            Command::Edit => {
                let text = read_block(&mut lines).await?;
                playground.set_editor(text);
            }
            Command::Show => {
                println!("{}", playground.editor().trim_end());
            }
            Command::Run => match playground.run().await {
                Ok(report) if report.status.is_ok() => {
                    println!("[ok in {:.1?}]", report.duration);
                }
                Ok(report) => {
                    println!("[{:?} in {:.1?}]", report.status, report.duration);
                }
                // Already shown on the output panel.
                Err(error) => tracing::debug!(%error, "run failed"),
            },
            Command::Output => {
                for line in playground.output().lines() {
                    println!("{line}");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Unknown(input) => {
                eprintln!("unknown command: {input} (:help for commands)");
            }
        }
    }

    Ok(())
}

async fn prompt(text: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// Collect lines up to a lone `.` (or end of input).
async fn read_block<R>(lines: &mut Lines<R>) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut text = String::new();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        if line.trim_end() == "." {
            break;
        }
        text.push_str(&line);
        text.push('\n');
    }
    Ok(text)
}
