//! Console command parsing and execution.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use waitlist_core::{
    CamperId, Cascade, Clock, EntryId, EventId, Priority, SystemClock, Waitlist, WaitlistEntry,
    WaitlistResult,
};

pub const HELP: &str = "\
Commands:
  add <event> <camper> [normal|high|vip] [notes...]   join the waitlist
  offer <entry>                                       offer a freed seat
  accept <entry>                                      accept an open offer
  decline <entry>                                     decline an open offer
  remove <entry>                                      delete an entry
  reorder <event> <entry> <entry> ...                 set the waiting order
  list <event>                                        waiting entries, next seat first
  all <event>                                         every entry for the event
  summary <event>                                     counts by status
  show <entry>                                        one entry as JSON
  events                                              events with a waitlist
  help                                                this text
  quit                                                exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add {
        event: EventId,
        camper: CamperId,
        priority: Priority,
        notes: Option<String>,
    },
    Offer(EntryId),
    Accept(EntryId),
    Decline(EntryId),
    Remove(EntryId),
    Reorder {
        event: EventId,
        order: Vec<EntryId>,
    },
    List(EventId),
    All(EventId),
    Summary(EventId),
    Show(EntryId),
    Events,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "add" => {
                let event = event_arg(&args, 0)?;
                let camper = args
                    .get(1)
                    .map(|c| CamperId::new(*c))
                    .ok_or_else(|| anyhow!("usage: add <event> <camper> [tier] [notes...]"))?;
                let (priority, rest) = match args.get(2).map(|t| t.parse::<Priority>()) {
                    Some(Ok(priority)) => (priority, &args[3..]),
                    Some(Err(_)) | None => (Priority::Normal, args.get(2..).unwrap_or(&[])),
                };
                let notes = (!rest.is_empty()).then(|| rest.join(" "));
                Command::Add {
                    event,
                    camper,
                    priority,
                    notes,
                }
            }
            "offer" => Command::Offer(entry_arg(&args, 0)?),
            "accept" => Command::Accept(entry_arg(&args, 0)?),
            "decline" => Command::Decline(entry_arg(&args, 0)?),
            "remove" | "rm" => Command::Remove(entry_arg(&args, 0)?),
            "reorder" => {
                let event = event_arg(&args, 0)?;
                let order = (1..args.len())
                    .map(|i| entry_arg(&args, i))
                    .collect::<Result<Vec<_>>>()?;
                Command::Reorder { event, order }
            }
            "list" | "ls" => Command::List(event_arg(&args, 0)?),
            "all" => Command::All(event_arg(&args, 0)?),
            "summary" => Command::Summary(event_arg(&args, 0)?),
            "show" => Command::Show(entry_arg(&args, 0)?),
            "events" => Command::Events,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => bail!("unknown command '{}', type 'help' for a list", other),
        };
        Ok(Some(command))
    }
}

fn event_arg(args: &[&str], index: usize) -> Result<EventId> {
    args.get(index)
        .map(|e| EventId::new(*e))
        .ok_or_else(|| anyhow!("missing event id"))
}

fn entry_arg(args: &[&str], index: usize) -> Result<EntryId> {
    let raw = args.get(index).ok_or_else(|| anyhow!("missing entry id"))?;
    raw.parse()
        .with_context(|| format!("'{}' is not an entry id", raw))
}

/// Run a parsed command and render its result for the console.
pub async fn execute(list: &Waitlist, command: Command) -> WaitlistResult<String> {
    let now = SystemClock.now();
    let output = match command {
        Command::Add {
            event,
            camper,
            priority,
            notes,
        } => {
            let entry = list.add_to_waitlist(&event, camper, priority, notes).await?;
            format!("Added {} at position {}", format_entry(&entry, now), entry.position)
        }
        Command::Offer(entry_id) => {
            let entry = list.offer_spot(&entry_id).await?;
            format!("Offered {}", format_entry(&entry, now))
        }
        Command::Accept(entry_id) => {
            let entry = list.accept_spot(&entry_id).await?;
            format_entry(&entry, now)
        }
        Command::Decline(entry_id) => {
            let outcome = list.decline_spot(&entry_id).await?;
            format!(
                "{}\n{}",
                format_entry(&outcome.entry, now),
                format_cascade(&outcome.cascade, now)
            )
        }
        Command::Remove(entry_id) => {
            let cascade = list.remove_from_waitlist(&entry_id).await?;
            format!("Removed {}\n{}", entry_id, format_cascade(&cascade, now))
        }
        Command::Reorder { event, order } => {
            let entries = list.reorder_waiting_ids(&event, &order).await?;
            format_list(&entries, now)
        }
        Command::List(event) => format_list(&list.list_waitlist(&event).await, now),
        Command::All(event) => format_list(&list.list_entries(&event).await, now),
        Command::Summary(event) => list.summary(&event).await.display(),
        Command::Show(entry_id) => {
            let entry = list.get_entry(&entry_id).await?;
            serde_json::to_string_pretty(&entry).unwrap_or_else(|e| e.to_string())
        }
        Command::Events => {
            let events = list.events().await;
            if events.is_empty() {
                "No waitlists yet".to_string()
            } else {
                events
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
    };
    Ok(output)
}

fn format_entry(entry: &WaitlistEntry, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "{} {} [{}] {}",
        entry.id, entry.camper_id, entry.priority, entry.status
    );
    match entry.time_remaining_display(now).as_deref() {
        Some("expired") => line.push_str(" (window lapsed)"),
        Some(remaining) => line.push_str(&format!(" ({} left)", remaining)),
        None => {}
    }
    line
}

fn format_list(entries: &[WaitlistEntry], now: DateTime<Utc>) -> String {
    if entries.is_empty() {
        return "(empty)".to_string();
    }
    entries
        .iter()
        .map(|e| {
            if e.is_waiting() {
                format!("{:>3}. {}", e.position, format_entry(e, now))
            } else {
                format!("   - {}", format_entry(e, now))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_cascade(cascade: &Cascade, now: DateTime<Utc>) -> String {
    match cascade {
        Cascade::Offered(next) => format!("Next offer: {}", format_entry(next, now)),
        Cascade::NoOneWaiting => "Seat is free, no one waiting".to_string(),
        Cascade::NotTriggered => "No seat freed".to_string(),
    }
}
