//! Line-based REPL with rustyline
//!
//! Reads command scripts line by line; input with an open brace, bracket or
//! quote continues on the next line. Lines starting with `:` are REPL
//! commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::{CompletionType, EditMode, Editor};
use tracing::debug;

use crate::runtime::command::parser::is_complete;
use crate::util::config::get_config_dir;
use crate::{Session, NAME, VERSION};

/// Line REPL configuration
#[derive(Debug, Clone)]
pub struct LineReplConfig {
    /// Prompt to display
    pub prompt: String,
    /// Multi-line prompt
    pub continuation_prompt: String,
    /// Enable VI mode
    pub vi_mode: bool,
    /// History file path
    pub history_file: Option<PathBuf>,
}

impl Default for LineReplConfig {
    fn default() -> Self {
        Self {
            prompt: "% ".into(),
            continuation_prompt: "> ".into(),
            vi_mode: false,
            history_file: get_config_dir().map(|dir| dir.join("history")),
        }
    }
}

/// What a `:` command asks the loop to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    Output(String),
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            ":quit" | ":q" | ":exit" => ReplCommand::Exit,
            ":help" | ":h" => ReplCommand::Output(
                "Enter command scripts; `guest call|eval|import ...` reaches the object runtime.\n\
                 :help  show this text\n\
                 :quit  leave the REPL"
                    .into(),
            ),
            other => ReplCommand::Unknown(other.to_string()),
        }
    }
}

/// Line REPL over a bridge session
pub struct LineRepl {
    config: LineReplConfig,
    editor: Editor<(), rustyline::history::FileHistory>,
    session: Session,
}

impl LineRepl {
    pub fn new(session: Session) -> Result<Self> {
        Self::with_config(session, LineReplConfig::default())
    }

    pub fn with_config(
        session: Session,
        config: LineReplConfig,
    ) -> Result<Self> {
        let rl_config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(if config.vi_mode {
                EditMode::Vi
            } else {
                EditMode::Emacs
            })
            .build();

        let mut editor = Editor::with_config(rl_config).context("Failed to start line editor")?;

        if let Some(history_file) = &config.history_file {
            if history_file.exists() {
                let _ = editor.load_history(history_file);
            }
        }

        Ok(Self {
            config,
            editor,
            session,
        })
    }

    /// Run until end of input or `:quit`
    pub fn run(&mut self) -> Result<()> {
        println!("{} {} - type :help for assistance", NAME, VERSION);

        let mut buffer = String::new();
        loop {
            let prompt = if buffer.is_empty() {
                &self.config.prompt
            } else {
                &self.config.continuation_prompt
            };

            match self.editor.readline(prompt) {
                Ok(line) => {
                    if buffer.is_empty() && line.trim_start().starts_with(':') {
                        match ReplCommand::parse(&line) {
                            ReplCommand::Exit => break,
                            ReplCommand::Output(text) => println!("{}", text),
                            ReplCommand::Unknown(name) => {
                                println!("{} unknown REPL command {}", "error:".red(), name)
                            }
                        }
                        continue;
                    }

                    if !buffer.is_empty() {
                        buffer.push('\n');
                    }
                    buffer.push_str(&line);
                    if !is_complete(&buffer) {
                        continue;
                    }

                    let script = std::mem::take(&mut buffer);
                    let _ = self.editor.add_history_entry(script.as_str());
                    self.eval(&script);
                }
                Err(ReadlineError::Eof) => break,
                Err(ReadlineError::Interrupted) => {
                    buffer.clear();
                    println!("(Interrupted)");
                }
                Err(e) => return Err(e).context("Failed to read input"),
            }
        }

        if let Some(history_file) = &self.config.history_file {
            if let Some(dir) = history_file.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            let _ = self.editor.save_history(history_file);
        }
        debug!("repl finished");
        Ok(())
    }

    fn eval(
        &self,
        script: &str,
    ) {
        let result = self.session.eval(script);
        print!("{}", self.session.take_output());
        match result {
            Ok(value) if value.is_empty() => {}
            Ok(value) => println!("{}", value),
            Err(err) => println!("{} {}", "error:".red(), err),
        }
    }
}
