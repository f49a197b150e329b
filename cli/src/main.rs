use beacon_core::analytics::Timeframe;
use beacon_core::lexicon::{Language, TimeOfDay};
use clap::{Parser, Subcommand};

mod commands;
mod util;

use commands::settings::SettingsCommands;
use util::{exit_error, parse_language, parse_time_of_day, parse_timeframe};

#[derive(Parser)]
#[command(
    name = "beacon",
    version,
    about = "Beacon CLI: crisis assessment, escalation and history through the Beacon API"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "BEACON_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// User ID sent as x-user-id
    #[arg(long, env = "BEACON_USER_ID")]
    user_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Score free text for crisis risk
    Assess {
        /// Text to assess
        #[arg(long)]
        text: String,
        /// morning, afternoon, evening or night
        #[arg(long, value_parser = parse_time_of_day)]
        time_of_day: Option<TimeOfDay>,
        /// Force a lexicon (en, es) instead of detecting one
        #[arg(long, value_parser = parse_language)]
        language: Option<Language>,
        /// IANA zone used to derive time of day (e.g. America/Chicago)
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Score structured risk factors from a JSON file
    AssessStructured {
        /// JSON file with risk factors (use '-' for stdin)
        #[arg(long, short = 'f')]
        file: String,
    },
    /// Run the escalation sequence from a JSON request file
    Escalate {
        /// JSON file with the escalation request (use '-' for stdin)
        #[arg(long, short = 'f')]
        file: String,
    },
    /// Assess text, escalate when warranted, and record the event
    Connect {
        /// Text to assess
        #[arg(long)]
        text: String,
        /// JSON file with an array of emergency contacts
        #[arg(long)]
        contacts_file: Option<String>,
        /// Escalation trigger (repeatable), e.g. plan, means, timeline
        #[arg(long = "trigger")]
        triggers: Vec<String>,
        /// Store the text (encrypted) with the event
        #[arg(long)]
        store_content: bool,
        #[arg(long, value_parser = parse_time_of_day)]
        time_of_day: Option<TimeOfDay>,
        #[arg(long, value_parser = parse_language)]
        language: Option<Language>,
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Record an already assessed event from a JSON file
    Record {
        /// JSON file with the event (use '-' for stdin)
        #[arg(long, short = 'f')]
        file: String,
    },
    /// Show crisis history, newest first
    History {
        /// Maximum number of events to return
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        limit: Option<u32>,
    },
    /// Show crisis analytics over a timeframe
    Analytics {
        /// day, week, month, quarter, year or all
        #[arg(long, value_parser = parse_timeframe)]
        timeframe: Option<Timeframe>,
    },
    /// Show trend, time-of-day and frequency patterns
    Patterns,
    /// Crisis settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

fn require_user(user_id: Option<String>) -> String {
    user_id.unwrap_or_else(|| {
        exit_error(
            "user_id is required for this command",
            Some("Set --user-id or BEACON_USER_ID env var"),
        )
    })
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let api_url = cli.api_url.trim_end_matches('/').to_string();

    let code = match cli.command {
        Commands::Health => commands::health::run(&api_url).await,
        Commands::AssessStructured { file } => commands::assess::structured(&api_url, &file).await,
        Commands::Assess {
            text,
            time_of_day,
            language,
            timezone,
        } => {
            let user_id = require_user(cli.user_id);
            commands::assess::assess(&api_url, &user_id, text, time_of_day, language, timezone)
                .await
        }
        Commands::Escalate { file } => {
            let user_id = require_user(cli.user_id);
            commands::escalation::escalate(&api_url, &user_id, &file).await
        }
        Commands::Connect {
            text,
            contacts_file,
            triggers,
            store_content,
            time_of_day,
            language,
            timezone,
        } => {
            let user_id = require_user(cli.user_id);
            let args = commands::assess::ConnectArgs {
                text,
                contacts_file,
                triggers,
                store_content,
                time_of_day,
                language,
                timezone,
            };
            commands::assess::connect(&api_url, &user_id, args).await
        }
        Commands::Record { file } => {
            let user_id = require_user(cli.user_id);
            commands::history::record(&api_url, &user_id, &file).await
        }
        Commands::History { limit } => {
            let user_id = require_user(cli.user_id);
            commands::history::history(&api_url, &user_id, limit).await
        }
        Commands::Analytics { timeframe } => {
            let user_id = require_user(cli.user_id);
            commands::history::analytics(&api_url, &user_id, timeframe).await
        }
        Commands::Patterns => {
            let user_id = require_user(cli.user_id);
            commands::history::patterns(&api_url, &user_id).await
        }
        Commands::Settings { command } => {
            let user_id = require_user(cli.user_id);
            commands::settings::run(&api_url, &user_id, command).await
        }
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn connect_collects_repeated_triggers() {
        let cli = Cli::try_parse_from([
            "beacon",
            "--user-id",
            "0190c3f2-1111-7000-8000-000000000000",
            "connect",
            "--text",
            "no way out",
            "--trigger",
            "plan",
            "--trigger",
            "means",
            "--time-of-day",
            "night",
        ])
        .unwrap();
        match cli.command {
            Commands::Connect {
                triggers,
                time_of_day,
                store_content,
                ..
            } => {
                assert_eq!(triggers, vec!["plan", "means"]);
                assert_eq!(time_of_day, Some(TimeOfDay::Night));
                assert!(!store_content);
            }
            _ => panic!("expected connect"),
        }
    }

    #[test]
    fn bad_enum_arguments_are_usage_errors() {
        assert!(Cli::try_parse_from(["beacon", "analytics", "--timeframe", "decade"]).is_err());
        assert!(Cli::try_parse_from(["beacon", "history", "--limit", "0"]).is_err());
        assert!(
            Cli::try_parse_from(["beacon", "assess", "--text", "x", "--language", "fr"]).is_err()
        );
    }
}
