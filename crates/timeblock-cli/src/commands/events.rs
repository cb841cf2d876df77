use clap::Subcommand;
use timeblock_core::{ManagedEventDb, ManagedEventStore};

#[derive(Subcommand)]
pub enum EventsAction {
    /// List active managed events
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one managed event
    Show {
        /// Managed event id
        id: String,
    },
}

pub fn run(action: EventsAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = ManagedEventDb::open_default()?;

    match action {
        EventsAction::List { json } => {
            let events = store.list_active()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("no active managed events");
            } else {
                for event in events {
                    let bumps = if event.bump_count > 0 {
                        format!(" (bumped x{})", event.bump_count)
                    } else {
                        String::new()
                    };
                    println!(
                        "{}  {}  {} .. {}  [{}]{}",
                        event.id,
                        event.title,
                        event.scheduled_start,
                        event.scheduled_end,
                        event.priority,
                        bumps,
                    );
                }
            }
        }
        EventsAction::Show { id } => match store.get(&id)? {
            Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
            None => println!("no managed event {id}"),
        },
    }
    Ok(())
}
