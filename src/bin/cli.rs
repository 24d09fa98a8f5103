// File: src/bin/cli.rs
use livelist::config::Config;
use livelist::{
    FileCollection, ItemId, Session, SessionContext, SessionEvent, SessionHandle, SyncError,
    logging,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

const HELP: &str = "add <task> | toggle <n> | rm <n> | ls | help | quit";

#[derive(Debug, PartialEq)]
enum Action {
    Add(String),
    Toggle(usize),
    Delete(usize),
    List,
    Help,
    Quit,
}

fn parse_action(line: &str) -> Result<Action, String> {
    let (cmd, rest) = line
        .split_once(char::is_whitespace)
        .map(|(c, r)| (c, r.trim()))
        .unwrap_or((line, ""));

    let index = || -> Result<usize, String> {
        rest.parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("Expected a row number, got '{}'", rest))
    };

    match cmd {
        "add" | "a" => Ok(Action::Add(rest.to_string())),
        "toggle" | "t" | "x" => Ok(Action::Toggle(index()?)),
        "rm" | "delete" | "d" => Ok(Action::Delete(index()?)),
        "ls" | "l" => Ok(Action::List),
        "help" | "?" => Ok(Action::Help),
        "quit" | "q" | "exit" => Ok(Action::Quit),
        other => Err(format!("Unknown command '{}'. {}", other, HELP)),
    }
}

fn row_id(session: &SessionHandle, row: usize) -> Result<ItemId, String> {
    session
        .snapshot()
        .get(row - 1)
        .map(|i| i.id)
        .ok_or_else(|| format!("No row {}", row))
}

fn print_list(session: &SessionHandle) {
    let items = session.snapshot();
    if items.is_empty() {
        println!("(nothing to do)");
    }
    for (n, item) in items.iter().enumerate() {
        let check = if item.done { "[x]" } else { "[ ]" };
        println!("{:>3}. {} {}", n + 1, check, item.task);
    }
}

async fn run_action(session: &SessionHandle, action: Action) -> Result<(), String> {
    let result: Result<(), SyncError> = match action {
        Action::Add(task) => session.add(&task).await.map(|_| ()),
        Action::Toggle(row) => session.toggle(row_id(session, row)?).await.map(|_| ()),
        Action::Delete(row) => session.delete(row_id(session, row)?).await,
        Action::List => Ok(()),
        Action::Help => {
            println!("{}", HELP);
            return Ok(());
        }
        Action::Quit => return Ok(()),
    };

    match result {
        Ok(()) => {}
        Err(e) if e.is_benign() => log::info!("{}", e),
        Err(e) => return Err(e.to_string()),
    }
    print_list(session);
    Ok(())
}

async fn open_session(
    context: &SessionContext,
    remote: &Arc<FileCollection>,
) -> Result<SessionHandle, SyncError> {
    Session::new(context.clone(), remote.clone()).start().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_or_init()?;
    logging::init(&config.log_level);

    let remote = Arc::new(FileCollection::open(config.data_path()?)?);
    let context = SessionContext::new(&config.owner_id);
    let mut session = open_session(&context, &remote).await?;
    println!("Signed in as {}", session.context().owner_id);
    let mut events = session.events();

    print_list(&session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_action(line) {
                    Ok(Action::Quit) => break,
                    Ok(action) => {
                        if let Err(e) = run_action(&session, action).await {
                            println!("Error: {}", e);
                        }
                    }
                    Err(msg) => println!("{}", msg),
                }
            }
            event = events.recv() => {
                // Any gap in the change stream means the list may be stale,
                // so start over with a fresh subscription and fetch.
                let reason = match event {
                    Ok(SessionEvent::StreamOpened) => continue,
                    Ok(SessionEvent::SubscriptionError(e)) => e.to_string(),
                    Ok(SessionEvent::StreamClosed) => "change stream closed".to_string(),
                    Err(RecvError::Lagged(n)) => format!("missed {} session events", n),
                    Err(RecvError::Closed) => "session stopped".to_string(),
                };
                log::warn!("Restarting session: {}", reason);
                session.end().await;
                session = open_session(&context, &remote).await?;
                events = session.events();
                print_list(&session);
            }
        }
    }

    session.end().await;
    Ok(())
}
