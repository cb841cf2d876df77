use clap::Subcommand;
use timeblock_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration as TOML
    Show,
    /// Set the target calendar id
    SetCalendar { calendar_id: String },
    /// Set the display timezone attached to created events
    SetTimezone { timezone: String },
    /// Mark a calendar name as protected
    Protect { name: String },
    /// Remove a calendar name from the protected list
    Unprotect { name: String },
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default();

    match action {
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::SetCalendar { calendar_id } => {
            config.calendar_id = calendar_id.clone();
            config.save()?;
            println!("calendar set to {calendar_id}");
        }
        ConfigAction::SetTimezone { timezone } => {
            config.timezone = timezone.clone();
            config.save()?;
            println!("timezone set to {timezone}");
        }
        ConfigAction::Protect { name } => {
            if config
                .protected_calendars
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&name))
            {
                println!("'{name}' is already protected");
            } else {
                config.protected_calendars.push(name.clone());
                config.save()?;
                println!("'{name}' is now protected");
            }
        }
        ConfigAction::Unprotect { name } => {
            let before = config.protected_calendars.len();
            config
                .protected_calendars
                .retain(|n| !n.eq_ignore_ascii_case(&name));
            if config.protected_calendars.len() == before {
                println!("'{name}' was not protected");
            } else {
                config.save()?;
                println!("'{name}' is no longer protected");
            }
        }
    }
    Ok(())
}
