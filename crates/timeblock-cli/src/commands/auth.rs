use clap::Subcommand;
use timeblock_core::calendar::google::GoogleCalendar;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Google Calendar: login / logout / status
    Google {
        #[command(subcommand)]
        action: AuthOp,
    },
}

#[derive(Subcommand)]
pub enum AuthOp {
    /// Run the browser OAuth flow
    Login {
        /// OAuth client ID
        #[arg(long)]
        client_id: String,
        /// OAuth client secret
        #[arg(long)]
        client_secret: String,
    },
    /// Remove stored tokens
    Logout,
    /// Check authentication status
    Status,
}

pub fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    let AuthAction::Google { action: op } = action;
    match op {
        AuthOp::Login {
            client_id,
            client_secret,
        } => {
            GoogleCalendar::set_credentials(&client_id, &client_secret)?;
            let calendar = GoogleCalendar::new()?;
            calendar.authenticate()?;
            println!("Google authenticated");
        }
        AuthOp::Logout => {
            GoogleCalendar::disconnect()?;
            println!("Google disconnected");
        }
        AuthOp::Status => {
            println!(
                "{}",
                if GoogleCalendar::is_authenticated() {
                    "authenticated"
                } else {
                    "not authenticated"
                }
            );
        }
    }
    Ok(())
}
