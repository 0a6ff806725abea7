use crate::commands::{render_outcome, QueryQueue, Segmenter, SessionState};
use crate::completion::{AdaSqlHelper, KeywordStore};
use anyhow::Result;
use parking_lot::Mutex;
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use rustyline::{CompletionType, Config, Editor, ExternalPrinter};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

const HISTORY_FILE: &str = ".adasql_history";
const CONTINUATION_PROMPT: &str = "    -> ";

type SharedPrinter = Arc<Mutex<Box<dyn ExternalPrinter + Send>>>;

/// What the shell is connected to, for `\status`.
#[derive(Clone, Debug)]
pub struct ShellTarget {
    pub cluster_id: String,
    pub secret_name: String,
}

/// Commands the terminal handles itself, between statements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaCommand {
    Quit,
    Help,
    Status,
}

impl MetaCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().trim_end_matches(';').trim_end() {
            "\\q" | "\\quit" | "exit" | "quit" => Some(MetaCommand::Quit),
            "\\h" | "\\help" | "help" => Some(MetaCommand::Help),
            "\\s" | "\\status" => Some(MetaCommand::Status),
            _ => None,
        }
    }
}

pub struct Cli {
    editor: Editor<AdaSqlHelper, FileHistory>,
    segmenter: Segmenter,
    queue: QueryQueue,
    session: watch::Receiver<SessionState>,
    printer: SharedPrinter,
    target: ShellTarget,
    history_path: Option<PathBuf>,
}

impl Cli {
    pub fn new(
        keywords: KeywordStore,
        queue: QueryQueue,
        session: watch::Receiver<SessionState>,
        target: ShellTarget,
    ) -> Result<Self> {
        let config = Config::builder()
            .completion_type(CompletionType::List)
            .auto_add_history(true)
            .edit_mode(rustyline::EditMode::Emacs)
            .build();

        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(AdaSqlHelper::new(keywords)));

        let history_path = dirs::home_dir().map(|home| home.join(HISTORY_FILE));
        if let Some(path) = &history_path {
            if let Err(err) = editor.load_history(path) {
                debug!("no history loaded from {}: {}", path.display(), err);
            }
        }

        let printer: Box<dyn ExternalPrinter + Send> = Box::new(editor.create_external_printer()?);

        println!("Type '\\h' for help. Statements end with ';'.");
        println!();

        Ok(Self {
            editor,
            segmenter: Segmenter::new(),
            queue,
            session,
            printer: Arc::new(Mutex::new(printer)),
            target,
            history_path,
        })
    }

    /// Read lines until `\q` or Ctrl-D. Queued statements keep running after this returns.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let prompt = prompt_for(&self.session.borrow(), self.segmenter.is_pending());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    if !self.segmenter.is_pending() {
                        match MetaCommand::parse(&line) {
                            Some(MetaCommand::Quit) => break,
                            Some(MetaCommand::Help) => {
                                self.show_help();
                                continue;
                            }
                            Some(MetaCommand::Status) => {
                                self.show_status();
                                continue;
                            }
                            None => {}
                        }
                    }

                    for statement in self.segmenter.push(&format!("{}\n", line)) {
                        self.submit(statement)?;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    self.segmenter.reset();
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    println!("Error: {:?}", err);
                    break;
                }
            }
        }

        if self.segmenter.is_pending() {
            debug!("discarding unterminated input");
            self.segmenter.reset();
        }
        self.save_history();
        Ok(())
    }

    fn submit(&self, statement: String) -> Result<()> {
        let printer = self.printer.clone();
        self.queue.submit(statement, move |outcome| {
            if let Err(err) = printer.lock().print(render_outcome(&outcome)) {
                warn!("failed to print result: {}", err);
            }
        })
    }

    fn save_history(&mut self) {
        if let Some(path) = &self.history_path {
            if let Err(err) = self.editor.save_history(path) {
                warn!("failed to save history to {}: {}", path.display(), err);
            }
        }
    }

    fn show_help(&self) {
        println!("Statements end with ';' and run in the order they were entered.");
        println!();
        println!("use <db> (\\c <db>)    Switch database (no ';' needed).");
        println!("begin                 Start a transaction.");
        println!("commit / rollback     End the current transaction.");
        println!("\\h (\\help)            Display this help.");
        println!("\\s (\\status)          Show connection and transaction status.");
        println!("\\q (\\quit, exit)      Leave after queued statements finish.");
        println!();
        println!("Ctrl-C discards the statement being typed. Tab completes names.");
        println!();
    }

    fn show_status(&self) {
        let session = self.session.borrow();
        println!("--------------");
        println!("Cluster:\t\t{}", self.target.cluster_id);
        println!("Secret:\t\t\t{}", self.target.secret_name);
        println!(
            "Current database:\t{}",
            session.database.as_deref().unwrap_or("(none)")
        );
        println!("Transaction:\t\t{}", session.transaction);
        println!("--------------");
    }
}

pub fn prompt_for(session: &SessionState, pending: bool) -> String {
    if pending {
        return CONTINUATION_PROMPT.to_string();
    }
    match &session.database {
        Some(db) => format!("adasql [{}]> ", db),
        None => "adasql> ".to_string(),
    }
}

/// Feed piped input through the segmenter and queue every statement, flushing
/// the unterminated remainder at end of input. Stops early once the queue is closed.
pub fn run_script<R, F>(input: R, queue: &QueryQueue, output: F) -> Result<()>
where
    R: BufRead,
    F: Fn(String) + Clone + Send + 'static,
{
    let mut segmenter = Segmenter::new();
    let submit = |statement: String| {
        let output = output.clone();
        queue.submit(statement, move |outcome| output(render_outcome(&outcome)))
    };

    for line in input.lines() {
        let line = line?;
        for statement in segmenter.push(&format!("{}\n", line)) {
            if submit(statement).is_err() {
                debug!("queue closed, ignoring remaining input");
                return Ok(());
            }
        }
    }

    if let Some(rest) = segmenter.finish() {
        if submit(rest).is_err() {
            debug!("queue closed, dropping final statement");
        }
    }
    Ok(())
}
