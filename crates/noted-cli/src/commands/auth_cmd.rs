use noted_core::Session;

use crate::auth::{clear_session_token, load_session_token, store_session_token};
use crate::cli::AuthCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        AuthCommands::Login { session_id, token } => {
            let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(global_profile);
            let session = Session::new(session_id)
                .ok_or_else(|| CliError::Auth("session id must not be empty".to_string()))?;

            store_session_token(&session, &token)
                .map_err(|error| CliError::Auth(error.to_string()))?;
            let profile = config.profile_mut_or_default(&profile_name);
            let previous = profile.session_id().and_then(Session::new);
            profile.session_id = Some(session.id().to_string());
            config.save().map_err(CliError::Config)?;

            if let Some(previous) = previous.filter(|previous| *previous != session) {
                clear_session_token(&previous)
                    .map_err(|error| CliError::Auth(error.to_string()))?;
            }
            tracing::info!(profile = %profile_name, "Stored session");
            println!("Signed in profile '{profile_name}' with session {}", session.id());
            Ok(())
        }
        AuthCommands::Status => {
            let config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(global_profile);
            let Some(session) = config
                .profile(&profile_name)
                .and_then(|profile| profile.session_id())
                .and_then(Session::new)
            else {
                println!("Profile '{profile_name}' is not signed in.");
                return Ok(());
            };

            let has_token = load_session_token(&session)
                .map_err(|error| CliError::Auth(error.to_string()))?
                .is_some();
            if has_token {
                println!(
                    "Profile '{profile_name}' is signed in with session {}",
                    session.id()
                );
            } else {
                println!(
                    "Profile '{profile_name}' has session {} but no stored token; run `noted auth login` again.",
                    session.id()
                );
            }
            Ok(())
        }
        AuthCommands::Logout => {
            let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(global_profile);
            let session = config
                .profiles
                .get_mut(&profile_name)
                .and_then(|profile| profile.session_id.take())
                .and_then(Session::new);

            if let Some(session) = session {
                clear_session_token(&session)
                    .map_err(|error| CliError::Auth(error.to_string()))?;
                config.save().map_err(CliError::Config)?;
            }

            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
    }
}
