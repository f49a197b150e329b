use beacon_core::lexicon::{Language, TimeOfDay};
use serde_json::{Value, json};

use crate::util::{ApiCall, api_request, exit_error, read_json_from_file};

/// Scoring context as sent in `assess` and `connect` bodies.
fn context(time_of_day: Option<TimeOfDay>, language: Option<Language>) -> Value {
    let mut context = json!({});
    if let Some(time_of_day) = time_of_day {
        context["time_of_day"] = json!(time_of_day);
    }
    if let Some(language) = language {
        context["language"] = json!(language);
    }
    context
}

fn with_timezone<'a>(call: ApiCall<'a>, timezone: Option<String>) -> ApiCall<'a> {
    match timezone {
        Some(tz) => call.header("x-timezone", tz),
        None => call,
    }
}

pub async fn assess(
    api_url: &str,
    user_id: &str,
    text: String,
    time_of_day: Option<TimeOfDay>,
    language: Option<Language>,
    timezone: Option<String>,
) -> i32 {
    let body = json!({
        "text": text,
        "context": context(time_of_day, language),
    });
    let call = ApiCall::post("/v1/crisis/assess", body).user(user_id);
    api_request(api_url, with_timezone(call, timezone)).await
}

pub async fn structured(api_url: &str, file: &str) -> i32 {
    let factors = read_json_from_file(file).unwrap_or_else(|e| exit_error(&e, None));
    api_request(api_url, ApiCall::post("/v1/crisis/assess/structured", factors)).await
}

pub struct ConnectArgs {
    pub text: String,
    pub contacts_file: Option<String>,
    pub triggers: Vec<String>,
    pub store_content: bool,
    pub time_of_day: Option<TimeOfDay>,
    pub language: Option<Language>,
    pub timezone: Option<String>,
}

pub async fn connect(api_url: &str, user_id: &str, args: ConnectArgs) -> i32 {
    let contacts = match args.contacts_file.as_deref() {
        Some(path) => {
            let contacts = read_json_from_file(path).unwrap_or_else(|e| exit_error(&e, None));
            if !contacts.is_array() {
                exit_error(
                    "contacts file must contain a JSON array",
                    Some("Each contact needs id, name and a phone or email."),
                );
            }
            contacts
        }
        None => json!([]),
    };

    let body = json!({
        "text": args.text,
        "context": context(args.time_of_day, args.language),
        "triggers": args.triggers,
        "emergency_contacts": contacts,
        "store_content": args.store_content,
    });
    let call = ApiCall::post("/v1/crisis/assess-and-connect", body).user(user_id);
    api_request(api_url, with_timezone(call, args.timezone)).await
}
