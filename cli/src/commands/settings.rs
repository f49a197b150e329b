use clap::Subcommand;

use crate::util::{ApiCall, api_request, exit_error, read_json_from_file};

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show current crisis settings
    Get,
    /// Apply a partial update (unknown fields are rejected)
    Update {
        /// JSON file with the fields to change (use '-' for stdin)
        #[arg(long, short = 'f')]
        file: String,
    },
}

pub async fn run(api_url: &str, user_id: &str, command: SettingsCommands) -> i32 {
    match command {
        SettingsCommands::Get => {
            api_request(api_url, ApiCall::get("/v1/crisis/settings").user(user_id)).await
        }
        SettingsCommands::Update { file } => {
            let patch = read_json_from_file(&file).unwrap_or_else(|e| {
                exit_error(
                    &e,
                    Some("Example: {\"sensitivity\": 0.7, \"auto_escalation_enabled\": true}"),
                )
            });
            api_request(
                api_url,
                ApiCall::patch("/v1/crisis/settings", patch).user(user_id),
            )
            .await
        }
    }
}
