//! Line-oriented terminal host for a chat session.
//!
//! Typed lines go to the engine as-is. `/N` replays follow-up N, `/q N`
//! sends quick action N, `/quit` exits. Replies are flattened from HTML
//! to plain text for display.

use std::sync::LazyLock;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};

use floodsafe_chat::{ChatEngine, Rejection, SubmitOutcome, QUICK_ACTIONS};
use floodsafe_core::types::Role;

static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|h3|h4|div|ul|ol)\s*>").unwrap()
});

static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<li\b[^>]*>").unwrap());

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// A parsed line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Quit,
    /// 1-based follow-up index.
    FollowUp(usize),
    /// 1-based quick action index.
    QuickAction(usize),
    Text(String),
}

pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed == "/quit" {
        return Input::Quit;
    }
    if let Some(rest) = trimmed.strip_prefix("/q ") {
        if let Ok(n) = rest.trim().parse::<usize>() {
            return Input::QuickAction(n);
        }
    }
    if let Some(rest) = trimmed.strip_prefix('/') {
        if let Ok(n) = rest.parse::<usize>() {
            return Input::FollowUp(n);
        }
    }
    Input::Text(line.to_string())
}

/// Flatten reply HTML into readable plain text.
pub fn html_to_text(html: &str) -> String {
    let text = BREAK_RE.replace_all(html, "\n");
    let text = ITEM_RE.replace_all(&text, "\n  - ");
    let text = TAG_RE.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pick the 1-based entry `n` from `items`.
fn pick(items: &[String], n: usize) -> Option<&String> {
    n.checked_sub(1).and_then(|i| items.get(i))
}

fn print_quick_actions() {
    println!("Quick questions:");
    for (i, action) in QUICK_ACTIONS.iter().enumerate() {
        println!("  /q {}  {}", i + 1, action);
    }
}

fn print_reply(engine: &ChatEngine) {
    let snapshot = engine.snapshot();
    if let Some(reply) = snapshot
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
    {
        println!("\n{}\n", html_to_text(&reply.html));
    }
    if !snapshot.follow_ups.is_empty() {
        println!("You might also want to know:");
        for (i, question) in snapshot.follow_ups.iter().enumerate() {
            println!("  /{}  {}", i + 1, question);
        }
    }
}

/// Run the chat loop until `/quit` or end of input.
pub async fn run(engine: &ChatEngine) -> std::io::Result<()> {
    println!("FloodSafe assistant. Type a question, or /quit to exit.");
    match engine.location_context() {
        Some(ctx) => println!("Location: {}", ctx.place()),
        None => println!("Location: not available, general advice only."),
    }
    print_quick_actions();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let outcome = match parse_input(&line) {
            Input::Quit => break,
            Input::FollowUp(n) => match pick(&engine.follow_ups(), n) {
                Some(question) => engine.select_follow_up(question).await,
                None => {
                    println!("No suggestion /{}.", n);
                    continue;
                }
            },
            Input::QuickAction(n) => match n.checked_sub(1).and_then(|i| QUICK_ACTIONS.get(i)) {
                Some(action) => engine.select_quick_action(action).await,
                None => {
                    println!("No quick action {}.", n);
                    continue;
                }
            },
            Input::Text(text) => engine.submit(&text).await,
        };

        match outcome {
            SubmitOutcome::Answered | SubmitOutcome::Fallback => print_reply(engine),
            SubmitOutcome::Ignored(Rejection::InFlight) => {
                println!("Still waiting for the previous answer.")
            }
            SubmitOutcome::Ignored(Rejection::ConversationStarted) => {
                println!("Quick questions are only available before the conversation starts.")
            }
            SubmitOutcome::Ignored(Rejection::EmptyInput) => {}
        }
    }

    Ok(())
}
