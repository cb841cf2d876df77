use chrono::NaiveTime;
use clap::Subcommand;
use timeblock_core::{Config, SchedulingWindow, WindowTier};

#[derive(Subcommand)]
pub enum WindowsAction {
    /// Show the weekly availability grid
    List,
    /// Add a window
    Add {
        /// Window name, unique within the grid
        name: String,
        /// Weekday, 0 = Monday .. 6 = Sunday
        #[arg(long)]
        weekday: u8,
        /// Start time, HH:MM
        #[arg(long)]
        start: String,
        /// End time, HH:MM
        #[arg(long)]
        end: String,
        /// Reserve the window for critical tasks
        #[arg(long)]
        critical_only: bool,
    },
    /// Remove a window by name
    Remove { name: String },
    /// Flip a window's active flag
    Toggle { name: String },
}

fn parse_hhmm(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("bad time '{s}': {e}"))
}

pub fn run(action: WindowsAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default();

    match action {
        WindowsAction::List => {
            const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
            for window in &config.windows {
                let day = DAYS.get(window.weekday as usize).copied().unwrap_or("???");
                let tier = match window.tier {
                    WindowTier::All => "all",
                    WindowTier::CriticalOnly => "critical-only",
                };
                let state = if window.active { "" } else { " (inactive)" };
                println!(
                    "{:<16} {} {} .. {}  {}{}",
                    window.name,
                    day,
                    window.start.format("%H:%M"),
                    window.end.format("%H:%M"),
                    tier,
                    state,
                );
            }
        }
        WindowsAction::Add {
            name,
            weekday,
            start,
            end,
            critical_only,
        } => {
            if weekday > 6 {
                return Err(format!("weekday must be 0..6, got {weekday}").into());
            }
            if config.windows.iter().any(|w| w.name == name) {
                return Err(format!("window '{name}' already exists").into());
            }
            let start = parse_hhmm(&start)?;
            let end = parse_hhmm(&end)?;
            if end <= start {
                return Err("end must be after start".into());
            }
            config.windows.push(SchedulingWindow {
                name: name.clone(),
                weekday,
                start,
                end,
                tier: if critical_only {
                    WindowTier::CriticalOnly
                } else {
                    WindowTier::All
                },
                active: true,
            });
            config.save()?;
            println!("added window '{name}'");
        }
        WindowsAction::Remove { name } => {
            let before = config.windows.len();
            config.windows.retain(|w| w.name != name);
            if config.windows.len() == before {
                return Err(format!("no window named '{name}'").into());
            }
            config.save()?;
            println!("removed window '{name}'");
        }
        WindowsAction::Toggle { name } => {
            let window = config
                .windows
                .iter_mut()
                .find(|w| w.name == name)
                .ok_or_else(|| format!("no window named '{name}'"))?;
            window.active = !window.active;
            let state = if window.active { "active" } else { "inactive" };
            config.save()?;
            println!("window '{name}' is now {state}");
        }
    }
    Ok(())
}
