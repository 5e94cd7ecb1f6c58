//! Replays recorded IMAP transcripts through the response interpreter.
//!
//! Each client command in the transcript selects the context for the
//! server lines that follow it, so the parser sees exactly what a live
//! client would have seen.

mod transcript;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mailwire_imap::config::DEFAULT_MAX_LITERAL_SIZE;
use mailwire_imap::{
    BufferedLines, CommandContext, Completion, LoggingHandler, MessageSink, ParserConfig,
    ResponseParser, ResponseSummary,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::transcript::Entry;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Transcript file: server output with client lines prefixed by `C: `
    transcript: PathBuf,

    /// Key naming the server in body structure cache entries
    #[clap(long, env = "MAILWIRE_SERVER_KEY", default_value = "replay")]
    server_key: String,

    /// Largest literal accepted, in octets
    #[clap(long, default_value_t = DEFAULT_MAX_LITERAL_SIZE)]
    max_literal_size: u32,

    /// Write every downloaded message into this directory
    #[clap(long)]
    save_bodies: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailwire=info,mailwire_imap=debug".into()),
        )
        .with(fmt::layer())
        .init();

    let args = Args::parse();
    let data = fs::read(&args.transcript)
        .with_context(|| format!("reading {}", args.transcript.display()))?;

    if let Some(dir) = &args.save_bodies {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let config = ParserConfig::builder(args.server_key)
        .max_literal_size(args.max_literal_size)
        .build();
    let mut replay = Replay::new(config, BodyFiles::new(args.save_bodies));
    replay.run(transcript::split(&data))?;

    let tracker = replay.parser.tracker();
    println!(
        "final state {:?}, capabilities {:?}, {} syntax errors, {} downloads",
        tracker.state(),
        tracker.capabilities(),
        replay.parser.syntax_errors(),
        replay.sink.written
    );
    if let Some(err) = replay.sink.error.take() {
        return Err(err).context("saving message bodies");
    }
    Ok(())
}

/// Drives the parser through a split transcript.
struct Replay {
    parser: ResponseParser,
    observer: LoggingHandler,
    sink: BodyFiles,
}

impl Replay {
    fn new(config: ParserConfig, sink: BodyFiles) -> Self {
        Self {
            parser: ResponseParser::new(config),
            observer: LoggingHandler,
            sink,
        }
    }

    fn run(&mut self, entries: Vec<Entry>) -> Result<()> {
        let mut entries = entries.into_iter().peekable();

        if let Some(Entry::Server(greeting)) =
            entries.next_if(|entry| matches!(entry, Entry::Server(_)))
        {
            let mut lines = BufferedLines::new(greeting);
            let greeting = self
                .parser
                .parse_greeting(&mut lines, &mut self.observer)
                .context("reading greeting")?;
            println!("greeting {} {}", greeting.status, greeting.text);
        }

        let mut current: Option<CommandContext> = None;
        for entry in entries {
            match entry {
                Entry::Client(line) => current = self.client_line(current.take(), &line)?,
                Entry::Server(buffer) => {
                    let Some(cmd) = current.clone() else {
                        warn!("server output with no command outstanding");
                        continue;
                    };
                    if self.server_output(&cmd, BufferedLines::new(buffer))? {
                        current = None;
                    }
                }
            }
        }

        if let Some(cmd) = current {
            warn!(tag = %cmd.tag, "transcript ended before the command completed");
        }
        Ok(())
    }

    /// Returns the command the next server output belongs to.
    fn client_line(
        &mut self,
        current: Option<CommandContext>,
        line: &str,
    ) -> Result<Option<CommandContext>> {
        let idling = self.parser.tracker().is_idling();
        let awaiting = self.parser.tracker().awaiting_client_input();
        match current {
            Some(cmd) if idling => {
                if line.eq_ignore_ascii_case("DONE") {
                    self.parser.end_idle();
                } else {
                    warn!(line, "client line during IDLE");
                }
                Ok(Some(cmd))
            }
            // SASL response or literal data for the outstanding command.
            Some(cmd) if awaiting => Ok(Some(cmd)),
            _ => CommandContext::parse(line)
                .map(Some)
                .with_context(|| format!("not a command: {line}")),
        }
    }

    /// Feeds one stretch of server output. Returns true once the command completed.
    fn server_output(&mut self, cmd: &CommandContext, mut lines: BufferedLines) -> Result<bool> {
        while !lines.is_empty() {
            let summary = if self.parser.tracker().is_idling() {
                self.parser
                    .parse_idle_update(&mut lines, &mut self.observer, &mut self.sink)
            } else {
                self.parser
                    .parse_response(cmd, &mut lines, &mut self.observer, &mut self.sink)
            };
            let summary = match summary {
                Ok(summary) => summary,
                Err(err) if err.is_fatal() => {
                    bail!("{} {}: connection lost: {err}", cmd.tag, cmd.kind.name());
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("{} {}", cmd.tag, cmd.kind.name()));
                }
            };
            report(&summary);

            if matches!(summary.completion, Completion::Tagged | Completion::LoggedOut) {
                if !lines.is_empty() {
                    warn!(bytes = lines.len(), "output after tagged completion ignored");
                }
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn report(summary: &ResponseSummary) {
    match &summary.completion {
        Completion::Tagged => {
            let status = summary
                .status
                .as_ref()
                .map_or_else(|| "?".to_string(), |status| status.to_string());
            println!(
                "{} {} {status} {} ({} syntax errors)",
                summary.tag,
                summary.command.name(),
                summary.text,
                summary.syntax_errors
            );
            if let Some(bad) = &summary.untagged_bad {
                println!("  untagged BAD: {bad}");
            }
            if let Some((validity, uid)) = summary.append_uid {
                println!("  appended as UID {uid} in UIDVALIDITY {validity}");
            }
            if let Some((validity, from, to)) = &summary.copy_uid {
                println!("  copied {from} to {to} in UIDVALIDITY {validity}");
            }
            if !summary.zero_length_uids.is_empty() {
                println!("  zero-length messages: {:?}", summary.zero_length_uids);
            }
        }
        Completion::ContinuationRequested { text } => {
            println!("{} {} + {text}", summary.tag, summary.command.name());
        }
        Completion::LoggedOut => println!("{} logged out", summary.tag),
        Completion::IdleUpdate => info!(syntax_errors = summary.syntax_errors, "idle update"),
    }
}

/// Message sink that optionally writes each download to its own file.
struct BodyFiles {
    dir: Option<PathBuf>,
    current: Vec<u8>,
    written: usize,
    error: Option<std::io::Error>,
}

impl BodyFiles {
    const fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            current: Vec::new(),
            written: 0,
            error: None,
        }
    }
}

impl MessageSink for BodyFiles {
    fn begin_download(&mut self, size_hint: u32, content_type: &str) {
        LoggingHandler.begin_download(size_hint, content_type);
        self.current.clear();
    }

    fn append_bytes(&mut self, bytes: &[u8], is_final_chunk: bool) {
        LoggingHandler.append_bytes(bytes, is_final_chunk);
        self.current.extend_from_slice(bytes);
    }

    fn end_download(&mut self) {
        LoggingHandler.end_download();
        self.written += 1;
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.join(format!("{}.eml", self.written));
        if let Err(err) = fs::write(&path, &self.current) {
            warn!(path = %path.display(), %err, "could not save body");
            self.error.get_or_insert(err);
        }
        self.current.clear();
    }

    fn abort_download(&mut self) {
        LoggingHandler.abort_download();
        self.current.clear();
    }
}
