use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use anyhow::Result;

use crate::app::{App, SummaryRequest};
use crate::model::{Guide, LogKey};
use crate::output;
use crate::session::{Mode, Outcome, TickOutcome};
use crate::ticker::Ticker;

/// Everything the focus-session loop reacts to. All sources (ticker, stdin
/// reader, AI workers) funnel into one channel so state is only ever touched
/// from this thread.
enum Event {
    Tick,
    Input(String),
    StdinClosed,
    GuideReady { seq: u64, guide: Guide },
    ChatReply { seq: u64, text: String },
    SummaryReady { key: LogKey, text: String },
}

/// Run an interactive focus session for a board task.
pub fn run(app: &mut App, task_id: i64) -> Result<()> {
    let request = app.select_task(task_id)?;
    let coach = app.coach().clone();
    let context = app.context.clone();
    let timeout = Duration::from_secs(app.settings.timeout_secs + 5);

    let (tx, rx) = mpsc::channel::<Event>();

    let mut ticker = Ticker::spawn(Duration::from_secs(1), tx.clone(), || Event::Tick);
    spawn_stdin_reader(tx.clone());

    // Guide generation must not block entry into the session.
    {
        let coach = coach.clone();
        let context = context.clone();
        let tx = tx.clone();
        let seq = request.seq;
        let task = request.task.clone();
        std::thread::spawn(move || {
            let guide = coach.guide(&task, &context);
            let _ = tx.send(Event::GuideReady { seq, guide });
        });
    }

    println!("Selected: {}", request.task.title);
    if !request.task.pre_action_note.is_empty() {
        println!("Pre-action note: {}", request.task.pre_action_note);
    }
    println!("Generating guide... (type 'help' for commands)");

    let outcome = event_loop(app, &rx, &tx, &coach, &context)?;
    ticker.stop();

    if let Some(outcome) = outcome {
        let summary_request = app.finalize_session(outcome)?;
        match outcome {
            Outcome::Complete => {
                eprintln!("Logged completion");
                if let Some(req) = summary_request {
                    await_summary(app, req, &rx, &tx, &coach, &context, timeout)?;
                }
            }
            Outcome::Drop => eprintln!("Dropped task (no log entry)"),
            Outcome::Defer => eprintln!("Deferred; task stays on the board"),
        }
    }
    Ok(())
}

fn spawn_stdin_reader(tx: Sender<Event>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Event::Input(line)).is_err() {
                        return;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = tx.send(Event::StdinClosed);
    });
}

/// Main session loop. Returns the finalize outcome, or None when the caller
/// should exit without finalizing (cannot happen today, but the type keeps
/// quit paths explicit).
fn event_loop(
    app: &mut App,
    rx: &Receiver<Event>,
    tx: &Sender<Event>,
    coach: &crate::coach::Coach,
    context: &crate::model::PersonalContext,
) -> Result<Option<Outcome>> {
    loop {
        let event = match rx.recv() {
            Ok(event) => event,
            Err(_) => return Ok(Some(Outcome::Defer)),
        };
        match event {
            Event::Tick => {
                let Some(session) = app.session.as_mut() else {
                    continue;
                };
                match session.tick() {
                    TickOutcome::Counted => {
                        let remaining = session.time_remaining;
                        if remaining % 60 == 0 {
                            println!("{} min remaining", remaining / 60);
                        } else if remaining < 10 {
                            println!("{remaining}s");
                        }
                    }
                    TickOutcome::AutoCompleted => {
                        println!("Time's up. Add a 'note <text>' if you like, then 'complete' or 'drop'.");
                    }
                    TickOutcome::Idle => {}
                }
            }
            Event::Input(line) => {
                if let Some(outcome) = handle_command(app, tx, coach, context, &line)? {
                    return Ok(Some(outcome));
                }
            }
            Event::StdinClosed => return Ok(Some(Outcome::Defer)),
            Event::GuideReady { seq, guide } => {
                if app.apply_guide(seq, guide) {
                    let session = app.session.as_ref().expect("guide applied to live session");
                    if let Some(guide) = &session.guide {
                        print!("{}", output::format_guide(guide));
                        println!("Start the timer with 'start [minutes]'.");
                    }
                }
            }
            Event::ChatReply { seq, text } => {
                if app.apply_chat_reply(seq, &text) {
                    println!("coach: {text}");
                }
            }
            Event::SummaryReady { key, text } => {
                // Can arrive here only if a previous session's summary was
                // still in flight; guarded apply handles it either way.
                app.apply_summary(&key, &text)?;
            }
        }
    }
}

/// Parse and apply one command line. Returns the outcome when the session
/// should finalize.
fn handle_command(
    app: &mut App,
    tx: &Sender<Event>,
    coach: &crate::coach::Coach,
    context: &crate::model::PersonalContext,
    line: &str,
) -> Result<Option<Outcome>> {
    let words = shlex::split(line).unwrap_or_default();
    let Some(command) = words.first().map(String::as_str) else {
        return Ok(None);
    };
    let Some(session) = app.session.as_mut() else {
        return Ok(None);
    };

    match command {
        "help" => {
            println!("commands: start [minutes], pause, resume, done, note <text>, chat <message>, complete, drop, defer, quit");
        }
        "start" => {
            let minutes = match words.get(1) {
                Some(m) => m.parse::<u32>().unwrap_or(session.selected_duration),
                None => session.selected_duration,
            };
            match session.start_timer(minutes, crate::model::now_millis()) {
                Ok(()) => println!("Timer started: {minutes} min. 'pause', 'done', or 'chat <msg>'."),
                Err(e) => eprintln!("{e}"),
            }
        }
        "pause" | "resume" => match session.toggle_pause() {
            Ok(true) => println!("Paused"),
            Ok(false) => println!("Resumed"),
            Err(e) => eprintln!("{e}"),
        },
        "done" => match session.manual_complete() {
            Ok(()) => println!("Stopped. Add a 'note <text>' if you like, then 'complete' or 'drop'."),
            Err(e) => eprintln!("{e}"),
        },
        "note" => {
            session.post_action_note = words[1..].join(" ");
            println!("Noted");
        }
        "chat" => {
            let message = words[1..].join(" ");
            if message.is_empty() {
                eprintln!("chat needs a message");
                return Ok(None);
            }
            session.push_user_message(&message);
            let seq = session.seq;
            let snapshot = session.snapshot();
            let history = session.chat.clone();
            let coach = coach.clone();
            let context = context.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                let text = coach.chat(&message, &snapshot, &history, &context);
                let _ = tx.send(Event::ChatReply { seq, text });
            });
        }
        "complete" => {
            if session.mode == Mode::Timer {
                session.manual_complete()?;
            }
            return Ok(Some(Outcome::Complete));
        }
        "drop" => return Ok(Some(Outcome::Drop)),
        "defer" | "quit" | "q" => return Ok(Some(Outcome::Defer)),
        other => eprintln!("unknown command '{other}' (try 'help')"),
    }
    Ok(None)
}

/// The log entry is already visible with its provisional note; wait a
/// bounded time for the background summary and patch it in.
fn await_summary(
    app: &mut App,
    request: SummaryRequest,
    rx: &Receiver<Event>,
    tx: &Sender<Event>,
    coach: &crate::coach::Coach,
    context: &crate::model::PersonalContext,
    timeout: Duration,
) -> Result<()> {
    let SummaryRequest {
        key,
        task,
        actual_duration,
    } = request;
    {
        let coach = coach.clone();
        let context = context.clone();
        let tx = tx.clone();
        let key = key.clone();
        std::thread::spawn(move || {
            let text = coach.summary(&task, actual_duration, &context);
            let _ = tx.send(Event::SummaryReady { key, text });
        });
    }
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now()) else {
            return Ok(());
        };
        match rx.recv_timeout(remaining) {
            Ok(Event::SummaryReady { key: got, text }) => {
                if app.apply_summary(&got, &text)? && got == key {
                    eprintln!("Summary: {text}");
                }
                return Ok(());
            }
            Ok(_) => continue, // drain leftover ticks/input
            Err(_) => return Ok(()),
        }
    }
}
