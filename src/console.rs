use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::engine::{BookingEngine, EngineError};
use crate::model::*;
use crate::store::{Durability, SlotStore};

/// One parsed console line.
#[derive(Debug, PartialEq)]
pub enum Command {
    Status { json: bool },
    Book { slot: String, user: String },
    Release { booking_id: String },
    Stats,
    History { slot: Option<String> },
    Find { user: String },
    Add { slot: String },
    Remove { slot: String },
    Watch { slot: String },
    Unwatch { slot: String },
    Reset,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  status [json]          show every slot
  book <slot> [name]     book a slot (name defaults to Guest)
  release <booking-id>   release a booking
  stats                  occupancy summary
  history [slot]         booking audit trail
  find <name>            active bookings for a name
  add <slot>             add a slot
  remove <slot>          remove a free slot
  watch <slot>           print changes to a slot as they happen
  unwatch <slot>         stop watching a slot
  reset                  release every occupied slot
  help | quit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let one_arg = |what: &str| -> Result<String, String> {
        match rest.as_slice() {
            [arg] => Ok((*arg).to_string()),
            [] => Err(format!("missing {what}")),
            _ => Err(format!("expected a single {what}")),
        }
    };

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "status" | "slots" => match rest.as_slice() {
            [] => Command::Status { json: false },
            ["json"] => Command::Status { json: true },
            _ => return Err("usage: status [json]".into()),
        },
        "book" => match rest.split_first() {
            Some((slot, name)) => Command::Book {
                slot: (*slot).to_string(),
                user: name.join(" "),
            },
            None => return Err("usage: book <slot> [name]".into()),
        },
        "release" => Command::Release { booking_id: one_arg("booking id")? },
        "stats" => Command::Stats,
        "history" => match rest.as_slice() {
            [] => Command::History { slot: None },
            [slot] => Command::History { slot: Some((*slot).to_string()) },
            _ => return Err("usage: history [slot]".into()),
        },
        "find" if !rest.is_empty() => Command::Find { user: rest.join(" ") },
        "find" => return Err("usage: find <name>".into()),
        "add" => Command::Add { slot: one_arg("slot id")? },
        "remove" => Command::Remove { slot: one_arg("slot id")? },
        "watch" => Command::Watch { slot: one_arg("slot id")? },
        "unwatch" => Command::Unwatch { slot: one_arg("slot id")? },
        "reset" => Command::Reset,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(cmd))
}

/// One interactive session. Runs commands and forwards changes of watched
/// slots, rendered as lines, to the receiver returned by [`Console::new`].
pub struct Console<S> {
    engine: Arc<BookingEngine<S>>,
    watches: HashMap<SlotId, JoinHandle<()>>,
    events: mpsc::UnboundedSender<String>,
}

impl<S: SlotStore> Console<S> {
    pub fn new(engine: Arc<BookingEngine<S>>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (events, rx) = mpsc::unbounded_channel();
        let console = Self {
            engine,
            watches: HashMap::new(),
            events,
        };
        (console, rx)
    }

    pub fn engine(&self) -> &Arc<BookingEngine<S>> {
        &self.engine
    }

    pub async fn run(&mut self, cmd: Command) -> String {
        match cmd {
            Command::Watch { slot } => self.watch(&slot).await,
            Command::Unwatch { slot } => self.unwatch(&slot),
            other => execute(&self.engine, other).await,
        }
    }

    async fn watch(&mut self, slot_raw: &str) -> String {
        let (slot_id, rx) = match self.engine.watch(slot_raw).await {
            Ok(watch) => watch,
            Err(e) => return render_error(&e),
        };
        if self.watches.get(&slot_id).is_some_and(|h| !h.is_finished()) {
            return format!("already watching {slot_id}");
        }
        let handle = tokio::spawn(forward_changes(slot_id.clone(), rx, self.events.clone()));
        self.watches.insert(slot_id.clone(), handle);
        format!("watching {slot_id}")
    }

    fn unwatch(&mut self, slot_raw: &str) -> String {
        let slot_id = SlotId::new(slot_raw.trim().to_uppercase());
        match self.watches.remove(&slot_id) {
            Some(handle) => {
                handle.abort();
                format!("stopped watching {slot_id}")
            }
            None => format!("not watching {slot_id}"),
        }
    }
}

impl<S> Drop for Console<S> {
    fn drop(&mut self) {
        for handle in self.watches.values() {
            handle.abort();
        }
    }
}

async fn forward_changes(
    slot_id: SlotId,
    mut rx: broadcast::Receiver<SlotChange>,
    events: mpsc::UnboundedSender<String>,
) {
    loop {
        let line = match rx.recv().await {
            Ok(change) => render_change(&change),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                format!("[{slot_id}] missed {missed} change(s)")
            }
            Err(broadcast::error::RecvError::Closed) => {
                let _ = events.send(format!("[{slot_id}] slot removed, watch ended"));
                return;
            }
        };
        if events.send(line).is_err() {
            return;
        }
    }
}

/// Run a stateless command and render its outcome as text.
async fn execute<S: SlotStore>(engine: &BookingEngine<S>, cmd: Command) -> String {
    match cmd {
        Command::Status { json: false } => render_status(&engine.list_slots().await),
        Command::Status { json: true } => serde_json::to_string_pretty(&engine.list_slots().await)
            .unwrap_or_else(|e| format!("error: {e}")),
        Command::Book { slot, user } => match engine.book(&slot, &user).await {
            Ok(b) => {
                let mut out = format!(
                    "booked slot {} for {}\nbooking id: {} (keep it to release the slot)",
                    b.slot_id, b.user_name, b.booking_id
                );
                push_durability(&mut out, &b.durability);
                out
            }
            Err(e) => render_error(&e),
        },
        Command::Release { booking_id } => match engine.release(&booking_id).await {
            Ok(r) => {
                let mut out = format!("released slot {} (booking {}, {})", r.slot_id, r.booking_id, r.user_name);
                push_durability(&mut out, &r.durability);
                out
            }
            Err(e) => render_error(&e),
        },
        Command::Stats => render_stats(&engine.occupancy().await),
        Command::History { slot: None } => render_history(&engine.bookings().await),
        Command::History { slot: Some(slot) } => match engine.bookings_for_slot(&slot).await {
            Ok(bookings) => render_history(&bookings),
            Err(e) => render_error(&e),
        },
        Command::Find { user } => {
            let found = engine.find_active_by_user(&user).await;
            if found.is_empty() {
                format!("no active booking for {user}")
            } else {
                render_history(&found)
            }
        }
        Command::Add { slot } => match engine.add_slot(&slot).await {
            Ok((id, durability)) => {
                let mut out = format!("added slot {id}");
                push_durability(&mut out, &durability);
                out
            }
            Err(e) => render_error(&e),
        },
        Command::Remove { slot } => match engine.remove_slot(&slot).await {
            Ok(durability) => {
                let mut out = format!("removed slot {}", slot.trim().to_uppercase());
                push_durability(&mut out, &durability);
                out
            }
            Err(e) => render_error(&e),
        },
        Command::Reset => match engine.release_all().await {
            Ok(released) => {
                let mut out = format!("reset: released {} booking(s)", released.len());
                for r in released.iter().filter(|r| r.is_degraded()) {
                    let _ = write!(out, "\nwarning: release of {} not confirmed durable", r.slot_id);
                }
                out
            }
            Err(e) => render_error(&e),
        },
        Command::Help => HELP.to_string(),
        // Session commands; `Console::run` handles them.
        Command::Watch { .. } | Command::Unwatch { .. } | Command::Quit => String::new(),
    }
}

fn push_durability(out: &mut String, durability: &Durability) {
    if let Durability::Unconfirmed(reason) = durability {
        let _ = write!(out, "\nwarning: change applied but not saved durably ({reason})");
    }
}

fn render_error(e: &EngineError) -> String {
    format!("error: {e}")
}

pub fn render_status(slots: &[SlotInfo]) -> String {
    if slots.is_empty() {
        return "no slots configured".to_string();
    }
    let occupied = slots.iter().filter(|s| !s.available).count();
    let mut out = format!("occupancy: {occupied}/{} slots occupied\n", slots.len());
    for slot in slots {
        let state = if slot.available { "AVAILABLE" } else { "OCCUPIED" };
        let _ = writeln!(out, "  {:<8} {state}", slot.slot_id.as_str());
    }
    out.pop();
    out
}

pub fn render_change(change: &SlotChange) -> String {
    let state = if change.available { "available" } else { "occupied" };
    match &change.booking_id {
        Some(booking_id) => format!("[{}] {state} (booking {booking_id})", change.slot_id),
        None => format!("[{}] {state}", change.slot_id),
    }
}

pub fn render_stats(o: &Occupancy) -> String {
    format!(
        "total: {}\navailable: {}\noccupied: {}\noccupancy rate: {:.1}%",
        o.total,
        o.available,
        o.occupied,
        o.rate()
    )
}

pub fn render_history(bookings: &[BookingRecord]) -> String {
    if bookings.is_empty() {
        return "no bookings".to_string();
    }
    let mut out = String::new();
    for b in bookings {
        let _ = writeln!(
            out,
            "  {}  {:<8} {:<10} {:<20} {}",
            b.booking_id, b.slot_id.as_str(), b.status.as_str(), b.user_name, b.booking_time
        );
    }
    out.pop();
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::LockRegistry;
    use crate::notify::NotifyHub;
    use crate::store::MemoryStore;

    fn engine() -> BookingEngine<MemoryStore> {
        BookingEngine::new(
            Arc::new(MemoryStore::with_slots(["A1", "A2"])),
            LockRegistry::new(),
            Arc::new(NotifyHub::new()),
        )
    }

    #[test]
    fn parse_commands() {
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(parse("STATUS"), Ok(Some(Command::Status { json: false })));
        assert_eq!(parse("status json"), Ok(Some(Command::Status { json: true })));
        assert_eq!(
            parse("book a1 Ada Lovelace"),
            Ok(Some(Command::Book { slot: "a1".into(), user: "Ada Lovelace".into() }))
        );
        assert_eq!(
            parse("book a1"),
            Ok(Some(Command::Book { slot: "a1".into(), user: String::new() }))
        );
        assert_eq!(
            parse("release 01abcdef"),
            Ok(Some(Command::Release { booking_id: "01abcdef".into() }))
        );
        assert_eq!(parse("history b2"), Ok(Some(Command::History { slot: Some("b2".into()) })));
        assert_eq!(parse("find Ada L"), Ok(Some(Command::Find { user: "Ada L".into() })));
        assert_eq!(parse("watch a1"), Ok(Some(Command::Watch { slot: "a1".into() })));
        assert_eq!(parse("unwatch A1"), Ok(Some(Command::Unwatch { slot: "A1".into() })));
        assert_eq!(parse("exit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn parse_errors() {
        assert!(parse("book").is_err());
        assert!(parse("release").is_err());
        assert!(parse("release a b").is_err());
        assert!(parse("find").is_err());
        assert!(parse("watch").is_err());
        assert!(parse("fly away").unwrap_err().contains("unknown command"));
    }

    #[tokio::test]
    async fn book_then_release_through_console() {
        let engine = engine();

        let out = execute(&engine, Command::Book { slot: "a1".into(), user: String::new() }).await;
        assert!(out.starts_with("booked slot A1 for Guest"), "{out}");
        let booking_id = engine.bookings().await[0].booking_id.to_string();
        assert!(out.contains(&booking_id));

        let out = execute(&engine, Command::Book { slot: "A1".into(), user: "Eve".into() }).await;
        assert_eq!(out, "error: slot A1 is already occupied");

        let out = execute(&engine, Command::Release { booking_id: booking_id.to_lowercase() }).await;
        assert!(out.starts_with("released slot A1"), "{out}");
    }

    #[tokio::test]
    async fn status_and_stats_render() {
        let engine = engine();
        engine.book("A2", "Bob").await.unwrap();

        let status = execute(&engine, Command::Status { json: false }).await;
        assert_eq!(
            status,
            "occupancy: 1/2 slots occupied\n  A1       AVAILABLE\n  A2       OCCUPIED"
        );

        let stats = execute(&engine, Command::Stats).await;
        assert!(stats.ends_with("occupancy rate: 50.0%"), "{stats}");

        let json = execute(&engine, Command::Status { json: true }).await;
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[1]["slot_id"], "A2");
        assert_eq!(parsed[1]["available"], false);
    }

    #[tokio::test]
    async fn reset_reports_count() {
        let engine = engine();
        engine.book("A1", "Alice").await.unwrap();
        engine.book("A2", "Bob").await.unwrap();
        assert_eq!(execute(&engine, Command::Reset).await, "reset: released 2 booking(s)");
        assert_eq!(engine.occupancy().await.occupied, 0);
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no watch event within 1s")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn watch_streams_changes_until_unwatched() {
        let (mut console, mut events) = Console::new(Arc::new(engine()));
        assert_eq!(console.run(Command::Watch { slot: "a1".into() }).await, "watching A1");
        assert_eq!(console.run(Command::Watch { slot: "A1".into() }).await, "already watching A1");

        let booked = console.engine().book("A1", "Alice").await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            format!("[A1] occupied (booking {})", booked.booking_id)
        );
        // Other slots are not forwarded.
        console.engine().book("A2", "Bob").await.unwrap();
        console.engine().release(booked.booking_id.as_str()).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            format!("[A1] available (booking {})", booked.booking_id)
        );

        assert_eq!(console.run(Command::Unwatch { slot: " a1".into() }).await, "stopped watching A1");
        assert_eq!(console.run(Command::Unwatch { slot: "A1".into() }).await, "not watching A1");
    }

    #[tokio::test]
    async fn watch_ends_when_slot_removed() {
        let (mut console, mut events) = Console::new(Arc::new(engine()));
        assert_eq!(
            console.run(Command::Watch { slot: "Z9".into() }).await,
            "error: slot 'Z9' does not exist"
        );

        console.run(Command::Watch { slot: "A2".into() }).await;
        assert_eq!(console.run(Command::Remove { slot: "A2".into() }).await, "removed slot A2");
        assert_eq!(next_event(&mut events).await, "[A2] slot removed, watch ended");
    }
}
