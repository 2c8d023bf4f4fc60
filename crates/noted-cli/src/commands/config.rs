use noted_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            name,
            api_base_url,
            no_activate,
        } => run_config_init(
            name.as_deref().or(global_profile),
            api_base_url,
            no_activate,
        ),
        ConfigCommands::Show { json } => run_config_show(json, global_profile),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    api_base_url: Option<String>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = apply_config_init(&mut config, profile_name, api_base_url, no_activate)?;

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let signed_in = config
        .profile(&profile_name)
        .and_then(|profile| profile.session_id())
        .is_some();
    if !signed_in {
        println!(
            "Run `noted auth login --session-id <id> --token <token>` to enable sync for '{profile_name}'."
        );
    }
    Ok(())
}

/// Update `config` in place and return the initialized profile name.
pub fn apply_config_init(
    config: &mut CliProfilesConfig,
    profile_name: Option<&str>,
    api_base_url: Option<String>,
    no_activate: bool,
) -> Result<String, CliError> {
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    if let Some(url) = normalize_text_option(api_base_url) {
        profile.api_base_url = Some(url.trim_end_matches('/').to_string());
    }
    profile.validate().map_err(CliError::Config)?;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }
    Ok(profile_name)
}

fn run_config_show(as_json: bool, global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if config.profiles.is_empty() {
        println!("No profiles configured. Run `noted config init`.");
        return Ok(());
    }

    let selected = config.resolve_profile_name(global_profile);
    for (name, profile) in &config.profiles {
        let marker = if *name == selected { "*" } else { " " };
        println!(
            "{marker} {name:<12}  api={}  session={}",
            profile.api_base_url().as_deref().unwrap_or("(default)"),
            profile.session_id().as_deref().unwrap_or("(none)")
        );
    }
    Ok(())
}
