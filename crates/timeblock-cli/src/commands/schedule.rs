use chrono::Utc;
use clap::Subcommand;
use timeblock_core::calendar::google::GoogleCalendar;
use timeblock_core::{
    BumpCoordinator, Config, ManagedEventDb, Priority, ScheduleCommitter, TaskBooking,
};

use super::parse_deadline;

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Book a task into the next workable slot
    Add {
        /// Task title
        title: String,
        /// Life domain shown as a title prefix
        #[arg(long, default_value = "General")]
        domain: String,
        /// Session length in minutes (config default when omitted)
        #[arg(long)]
        duration: Option<i64>,
        /// low | normal | high | critical
        #[arg(long, default_value = "normal")]
        priority: Priority,
        /// RFC3339 instant or YYYY-MM-DD (17:00 UTC); priority default when omitted
        #[arg(long)]
        deadline: Option<String>,
        /// Task id to record; generated when omitted
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Put a bumped event back in its original slot
    UndoBump {
        /// Managed event id
        id: String,
    },
    /// Deactivate all managed records for a task
    Clear {
        /// Task id
        task_id: String,
    },
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let windows = config.availability();
    let store = ManagedEventDb::open_default()?;
    let calendar = GoogleCalendar::new()?;
    let now = Utc::now();

    match action {
        ScheduleAction::Add {
            title,
            domain,
            duration,
            priority,
            deadline,
            task_id,
        } => {
            let deadline = deadline.as_deref().map(parse_deadline).transpose()?;
            let booking = TaskBooking {
                task_id: task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                title,
                domain,
                duration_minutes: duration.unwrap_or(config.default_duration_minutes),
                priority,
                deadline,
            };

            let committer = ScheduleCommitter::new(
                &windows,
                &calendar,
                &store,
                &config.protected_calendars,
                &config.calendar_id,
                &config.timezone,
                now,
            );
            match committer.schedule_task(&booking)? {
                Some(confirmation) => {
                    println!(
                        "scheduled {} .. {}",
                        confirmation.scheduled_start, confirmation.scheduled_end
                    );
                    if let Some(url) = &confirmation.event_url {
                        println!("event: {url}");
                    }
                    if !confirmation.bumped.is_empty() {
                        println!("bumped {} existing booking(s)", confirmation.bumped.len());
                    }
                    for id in &confirmation.stranded {
                        println!("warning: could not relocate {id}, left in place");
                    }
                    if let Some(warning) = &confirmation.cascade_warning {
                        println!("warning: {warning}");
                    }
                    if let Some(warning) = &confirmation.double_book_warning {
                        println!("warning: {warning}");
                    }
                }
                None => {
                    println!("no slot available before the deadline");
                }
            }
        }
        ScheduleAction::UndoBump { id } => {
            let coordinator = BumpCoordinator::new(
                &windows,
                &calendar,
                &store,
                &config.protected_calendars,
                &config.calendar_id,
                now,
            );
            if coordinator.undo_bump(&id)? {
                println!("restored original slot");
            } else {
                println!("nothing to undo for {id}");
            }
        }
        ScheduleAction::Clear { task_id } => {
            let committer = ScheduleCommitter::new(
                &windows,
                &calendar,
                &store,
                &config.protected_calendars,
                &config.calendar_id,
                &config.timezone,
                now,
            );
            let cleared = committer.clear_task(&task_id)?;
            println!("deactivated {cleared} record(s)");
        }
    }
    Ok(())
}
