use crate::util::{ApiCall, api_request, exit_error, read_json_from_file};

const REQUEST_HINT: &str = "The file holds an escalation request, \
    e.g. {\"risk_level\": \"critical\", \"emergency_contacts\": []}";

pub async fn escalate(api_url: &str, user_id: &str, file: &str) -> i32 {
    let request =
        read_json_from_file(file).unwrap_or_else(|e| exit_error(&e, Some(REQUEST_HINT)));
    api_request(
        api_url,
        ApiCall::post("/v1/crisis/escalate", request).user(user_id),
    )
    .await
}
