//! Terminal session for one counter
//!
//! Reads single-line commands from stdin and prints agent events. The
//! terminal bell stands in for haptics.

use std::io::Write;

use tasbih_core::Counter;
use tasbih_net::{CounterApi, JoinLink};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::agent::{AgentCommand, AgentConfig, AgentEvent, AgentHandle, Identity, SessionPhase, SyncAgent};
use crate::state::AppState;

const BELL: &str = "\x07";

const HELP: &str =
    "Enter = count, r = reset (creator only), s = share link, n NAME = set name, q = quit. * marks the creator";

const RESET_PROMPT: &str = "Reset the count to zero for everyone? [y/N]";

/// Whether a line answers a confirmation prompt with yes
pub fn confirms(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// What a line typed by the user asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Increment,
    Reset,
    Share,
    Name(String),
    Refresh,
    Help,
    Quit,
}

impl Input {
    pub fn parse(line: &str) -> Input {
        let line = line.trim();
        match line {
            "" | "+" => Input::Increment,
            "r" | "reset" => Input::Reset,
            "s" | "share" => Input::Share,
            "p" | "refresh" => Input::Refresh,
            "q" | "quit" | "exit" => Input::Quit,
            _ => match line.strip_prefix("n ") {
                Some(name) => Input::Name(name.trim().to_string()),
                None => Input::Help,
            },
        }
    }
}

/// One-line progress summary. The ledger runs highest count first; the
/// creator is starred and `me` is tagged.
pub fn progress_line(counter: &Counter, me: Option<&str>) -> String {
    let mut ranked: Vec<_> = counter.participants.iter().collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    let ledger = ranked
        .iter()
        .map(|p| {
            let creator = if p.name == counter.created_by { "*" } else { "" };
            let you = if me == Some(p.name.as_str()) { "(you)" } else { "" };
            format!("{}{}{}:{}", p.name, creator, you, p.count)
        })
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{}/{} ({:.0}%)  {}",
        counter.current_count,
        counter.goal,
        counter.progress_percent(),
        ledger
    )
}

/// Text to print for an event, if any
pub fn render(event: &AgentEvent, me: Option<&str>) -> Option<String> {
    match event {
        AgentEvent::PhaseChanged(SessionPhase::Active) => Some("Joined.".to_string()),
        AgentEvent::PhaseChanged(SessionPhase::Closed) => Some("Session closed.".to_string()),
        AgentEvent::PhaseChanged(_) => None,
        AgentEvent::Updated(counter) => Some(progress_line(counter, me)),
        AgentEvent::ParticipantJoined(name) => Some(format!("{} joined", name)),
        AgentEvent::Feedback { haptic: true } => Some(BELL.to_string()),
        AgentEvent::Feedback { haptic: false } => None,
        AgentEvent::Completed { haptic } => Some(format!(
            "{}Goal reached! May it be accepted.",
            if *haptic { BELL } else { "" }
        )),
        AgentEvent::ResetObserved => Some("Counter was reset.".to_string()),
        AgentEvent::GoalAlreadyReached => Some("The goal is already reached.".to_string()),
        AgentEvent::Rejected(reason) => Some(format!("Refused: {}", reason)),
        AgentEvent::ConnectionTrouble { failures } => Some(format!(
            "Having trouble reaching the server ({} failed attempts), still trying...",
            failures
        )),
        AgentEvent::ConnectionRestored => Some("Connection restored.".to_string()),
        AgentEvent::CounterMissing => Some("This counter no longer exists.".to_string()),
    }
}

fn print_line(text: &str) {
    let mut out = std::io::stdout().lock();
    // Bells are printed without a newline so they don't scroll the view
    let _ = if text == BELL {
        write!(out, "{}", text)
    } else {
        writeln!(out, "{}", text)
    };
    let _ = out.flush();
}

/// Run an interactive session until the user quits or the counter goes away
pub async fn run<A: CounterApi + 'static>(
    api: A,
    link: JoinLink,
    identity: Option<Identity>,
    config: AgentConfig,
    state: &AppState,
) -> anyhow::Result<()> {
    if identity.is_none() {
        print_line("No display name set. Type `n YOUR NAME` to join in.");
    }
    print_line(HELP);

    let mut me = identity.as_ref().map(|i| i.name.clone());
    let mut agent = AgentHandle::spawn(SyncAgent::new(api, link.id, identity, config));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut confirming_reset = false;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let line = match line? {
                    Some(line) => line,
                    None => {
                        debug!("stdin closed");
                        stdin_open = false;
                        let _ = agent.send(AgentCommand::Leave).await;
                        continue;
                    }
                };
                if confirming_reset {
                    confirming_reset = false;
                    if !confirms(&line) {
                        print_line("Reset cancelled.");
                        continue;
                    }
                    if agent.send(AgentCommand::Reset).await.is_err() {
                        break;
                    }
                    continue;
                }
                let command = match Input::parse(&line) {
                    Input::Increment => AgentCommand::Increment,
                    Input::Reset => {
                        confirming_reset = true;
                        print_line(RESET_PROMPT);
                        continue;
                    }
                    Input::Refresh => AgentCommand::Refresh,
                    Input::Quit => AgentCommand::Leave,
                    Input::Share => {
                        print_line(&link.to_url());
                        continue;
                    }
                    Input::Help => {
                        print_line(HELP);
                        continue;
                    }
                    Input::Name(name) => match state.set_name(&name) {
                        Ok(profile) => {
                            let name = profile.participant_name.unwrap_or(name);
                            me = Some(name.clone());
                            AgentCommand::Identify(Identity {
                                name,
                                haptics: profile.haptics_enabled,
                            })
                        }
                        Err(e) => {
                            print_line(&format!("Refused: {}", e));
                            continue;
                        }
                    },
                };
                if agent.send(command).await.is_err() {
                    break;
                }
            }
            event = agent.next_event() => match event {
                Some(event) => {
                    if let Some(text) = render(&event, me.as_deref()) {
                        print_line(&text);
                    }
                }
                None => break,
            },
        }
    }
    Ok(())
}
